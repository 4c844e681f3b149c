//! # Rank Communicator
//!
//! Point-to-point message planes between ranks, plus the two collectives
//! the driver needs (a global sum at step entry and the closing barriers).
//!
//! Each ordered rank pair carries two tagged planes: a photon plane for
//! `Vec<WirePhoton>` batches (`PHOTON_TAG`) and a count plane for single
//! unsigned 64-bit values (`COUNT_TAG`). A plane is an mpsc channel, which
//! gives the delivery guarantee the protocol relies on: messages between
//! the same pair on the same tag arrive in send order.
//!
//! Sends buffer eagerly and never block. Receives are tested with
//! `try_recv_*` during the work phase; the blocking `recv_*` variants
//! exist only for the shutdown waits. The communicator is a context value
//! handed to each rank at construction, not a process-wide global.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Barrier, Mutex};

use thiserror::Error;

use crate::photon::WirePhoton;

/// Communication failure; fatal for the step
#[derive(Debug, Error)]
pub enum CommError {
    #[error("rank {peer} is not a peer in a world of {n_ranks} ranks")]
    PeerOutOfRange { peer: usize, n_ranks: usize },
    #[error("channel to rank {peer} is closed")]
    Disconnected { peer: usize },
    #[error("collective state poisoned by a failed rank")]
    Poisoned,
}

/// One rank's endpoint of the world
///
/// Owned by exactly one rank (one thread); hand out one per rank from
/// [`CommWorld::new`].
pub struct RankComm {
    rank: usize,
    n_ranks: usize,
    photon_tx: Vec<Option<Sender<Vec<WirePhoton>>>>,
    photon_rx: Vec<Option<Receiver<Vec<WirePhoton>>>>,
    count_tx: Vec<Option<Sender<u64>>>,
    count_rx: Vec<Option<Receiver<u64>>>,
    barrier: Arc<Barrier>,
    reduce_slots: Arc<Mutex<Vec<u64>>>,
}

/// Factory for the per-rank communicators of one world
pub struct CommWorld;

impl CommWorld {
    /// Build the endpoints for an `n_ranks`-rank world
    ///
    /// The returned vector is indexed by rank; move each element onto its
    /// rank's thread.
    pub fn new(n_ranks: usize) -> Vec<RankComm> {
        assert!(n_ranks > 0, "a world needs at least one rank");

        let barrier = Arc::new(Barrier::new(n_ranks));
        let reduce_slots = Arc::new(Mutex::new(vec![0u64; n_ranks]));

        let mut photon_tx: Vec<Vec<Option<Sender<Vec<WirePhoton>>>>> =
            (0..n_ranks).map(|_| (0..n_ranks).map(|_| None).collect()).collect();
        let mut photon_rx: Vec<Vec<Option<Receiver<Vec<WirePhoton>>>>> =
            (0..n_ranks).map(|_| (0..n_ranks).map(|_| None).collect()).collect();
        let mut count_tx: Vec<Vec<Option<Sender<u64>>>> =
            (0..n_ranks).map(|_| (0..n_ranks).map(|_| None).collect()).collect();
        let mut count_rx: Vec<Vec<Option<Receiver<u64>>>> =
            (0..n_ranks).map(|_| (0..n_ranks).map(|_| None).collect()).collect();

        for from in 0..n_ranks {
            for to in 0..n_ranks {
                if from == to {
                    continue;
                }
                let (tx, rx) = channel();
                photon_tx[from][to] = Some(tx);
                photon_rx[to][from] = Some(rx);
                let (tx, rx) = channel();
                count_tx[from][to] = Some(tx);
                count_rx[to][from] = Some(rx);
            }
        }

        let mut world = Vec::with_capacity(n_ranks);
        for rank in (0..n_ranks).rev() {
            world.push(RankComm {
                rank,
                n_ranks,
                photon_tx: photon_tx.pop().unwrap_or_default(),
                photon_rx: photon_rx.pop().unwrap_or_default(),
                count_tx: count_tx.pop().unwrap_or_default(),
                count_rx: count_rx.pop().unwrap_or_default(),
                barrier: Arc::clone(&barrier),
                reduce_slots: Arc::clone(&reduce_slots),
            });
        }
        world.reverse();
        world
    }
}

impl RankComm {
    /// This endpoint's rank
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// World size
    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    fn out_of_range(&self, peer: usize) -> CommError {
        CommError::PeerOutOfRange { peer, n_ranks: self.n_ranks }
    }

    /// Post a photon-batch send to a peer (eager, never blocks)
    pub fn send_photons(&self, to: usize, batch: Vec<WirePhoton>) -> Result<(), CommError> {
        let tx = self
            .photon_tx
            .get(to)
            .and_then(Option::as_ref)
            .ok_or_else(|| self.out_of_range(to))?;
        tx.send(batch).map_err(|_| CommError::Disconnected { peer: to })
    }

    /// Test the posted photon receive from a peer
    pub fn try_recv_photons(&self, from: usize) -> Result<Option<Vec<WirePhoton>>, CommError> {
        let rx = self
            .photon_rx
            .get(from)
            .and_then(Option::as_ref)
            .ok_or_else(|| self.out_of_range(from))?;
        match rx.try_recv() {
            Ok(batch) => Ok(Some(batch)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(CommError::Disconnected { peer: from }),
        }
    }

    /// Wait for the posted photon receive from a peer (shutdown only)
    pub fn recv_photons(&self, from: usize) -> Result<Vec<WirePhoton>, CommError> {
        let rx = self
            .photon_rx
            .get(from)
            .and_then(Option::as_ref)
            .ok_or_else(|| self.out_of_range(from))?;
        rx.recv().map_err(|_| CommError::Disconnected { peer: from })
    }

    /// Post a completion-count send to a peer (eager, never blocks)
    pub fn send_count(&self, to: usize, count: u64) -> Result<(), CommError> {
        let tx = self
            .count_tx
            .get(to)
            .and_then(Option::as_ref)
            .ok_or_else(|| self.out_of_range(to))?;
        tx.send(count).map_err(|_| CommError::Disconnected { peer: to })
    }

    /// Test the posted count receive from a peer
    pub fn try_recv_count(&self, from: usize) -> Result<Option<u64>, CommError> {
        let rx = self
            .count_rx
            .get(from)
            .and_then(Option::as_ref)
            .ok_or_else(|| self.out_of_range(from))?;
        match rx.try_recv() {
            Ok(count) => Ok(Some(count)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(CommError::Disconnected { peer: from }),
        }
    }

    /// Wait for the posted count receive from a peer (shutdown only)
    pub fn recv_count(&self, from: usize) -> Result<u64, CommError> {
        let rx = self
            .count_rx
            .get(from)
            .and_then(Option::as_ref)
            .ok_or_else(|| self.out_of_range(from))?;
        rx.recv().map_err(|_| CommError::Disconnected { peer: from })
    }

    /// Block until every rank arrives
    pub fn barrier(&self) {
        self.barrier.wait();
    }

    /// Global sum over all ranks; every rank gets the total
    pub fn allreduce_sum(&self, value: u64) -> Result<u64, CommError> {
        {
            let mut slots = self.reduce_slots.lock().map_err(|_| CommError::Poisoned)?;
            slots[self.rank] = value;
        }
        self.barrier.wait();
        let total = {
            let slots = self.reduce_slots.lock().map_err(|_| CommError::Poisoned)?;
            slots.iter().sum()
        };
        self.barrier.wait();
        Ok(total)
    }
}
