//! # Transport Driver
//!
//! The per-step outer loop. Alternates batches of photon tracking with
//! neighbor-channel progress and completion-tree updates until every
//! history worldwide has terminated, then runs the closing handshake so
//! no posted message request leaks into the next step.
//!
//! Within a batch, received photons are always tracked before fresh
//! source photons, and the receive stack is LIFO: the most recently
//! received photon is tracked next. Neighbor channels are visited in
//! ascending rank order and the tree is polled once per batch, which
//! bounds the latency between a completion and its upward report to one
//! batch of tracking.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::comm::{CommError, RankComm};
use crate::constants::CUTOFF_FRACTION;
use crate::mesh::Mesh;
use crate::photon::Photon;
use crate::rng::RandomGenerator;
use crate::source::PhotonSource;
use crate::transport::channels::NeighborChannels;
use crate::transport::tracker::{track_photon, RankTally};
use crate::transport::tree::CompletionTree;
use crate::transport::MessageCounter;
use crate::types::Event;

/// Fatal transport failure; the step aborts
#[derive(Debug, Error)]
pub enum TransportError {
    /// A processor face pointed at a rank with no adjacency entry
    #[error("photon passed to cell {cell} on rank {rank}, which is not adjacent")]
    MissingAdjacency { cell: u32, rank: usize },
    /// The message layer failed
    #[error(transparent)]
    Comm(#[from] CommError),
}

/// Tunables of the transport loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Photons tracked between communication polls
    pub batch_size: u32,
    /// Preferred photon count per neighbor message
    pub max_buffer_size: u32,
    /// Russian-roulette threshold as a fraction of emission energy
    pub cutoff_fraction: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_buffer_size: 200,
            cutoff_fraction: CUTOFF_FRACTION,
        }
    }
}

/// What one rank produced in one step
#[derive(Debug)]
pub struct StepReport {
    /// Photons alive at the end of the timestep, sorted by cell id
    pub census: Vec<Photon>,
    /// Energy that left through vacuum boundaries (GJ)
    pub exit_e: f64,
    /// Energy banked with the census photons (GJ)
    pub post_census_e: f64,
    /// Histories terminated on this rank (kill, exit or census)
    pub n_completed: u64,
    /// Message diagnostics for the step
    pub counters: MessageCounter,
}

impl StepReport {
    pub fn census_size(&self) -> usize {
        self.census.len()
    }

    /// Human-readable step digest
    pub fn summary(&self) -> String {
        format!(
            "completed {} histories ({} to census), exit_E {:.6e}, census_E {:.6e}\n\
             messages: {} photon msgs / {} photons passed, \
             sends {}/{}, receives {}/{}",
            self.n_completed,
            self.census.len(),
            self.exit_e,
            self.post_census_e,
            self.counters.n_photon_messages,
            self.counters.n_photons_sent,
            self.counters.n_sends_completed,
            self.counters.n_sends_posted,
            self.counters.n_receives_completed,
            self.counters.n_receives_posted,
        )
    }
}

/// Drives one rank through the transport phase of a timestep
pub struct TransportDriver<'a> {
    mesh: &'a Mesh,
    comm: &'a RankComm,
    config: TransportConfig,
}

impl<'a> TransportDriver<'a> {
    pub fn new(mesh: &'a Mesh, comm: &'a RankComm, config: TransportConfig) -> Self {
        Self { mesh, comm, config }
    }

    /// Transport every history of the step to termination
    ///
    /// `dt` sets the census distance of freshly sourced photons, `next_dt`
    /// the census distance banked photons carry into the next step.
    /// `abs_e` is the per-cell absorption scratchpad, indexed like the
    /// mesh. Returns this rank's census photons and diagnostics.
    pub fn run_step<S: PhotonSource>(
        &self,
        source: &mut S,
        rng: &mut RandomGenerator,
        dt: f64,
        next_dt: f64,
        abs_e: &mut [f64],
    ) -> Result<StepReport, TransportError> {
        assert_eq!(
            abs_e.len(),
            self.mesh.n_local_cells(),
            "absorption scratchpad does not match the mesh"
        );

        let mut ctr = MessageCounter::default();
        let mut tally = RankTally::new(abs_e);

        let n_local = source.n_photon();
        let n_global = self.comm.allreduce_sum(n_local)?;

        let mut tree = CompletionTree::new(self.comm.rank(), self.comm.n_ranks(), n_global);
        let mut channels = NeighborChannels::from_mesh(self.mesh);
        tree.post_recvs(&mut ctr);
        channels.post_recvs(&mut ctr);

        let mut census_list: Vec<Photon> = Vec::new();
        let mut recv_stack: Vec<Photon> = Vec::new();
        let mut n_local_sourced: u64 = 0;
        let mut n_complete: u64 = 0;
        let mut n_completed_total: u64 = 0;

        let max_buffer_size = self.config.max_buffer_size as usize;

        while !tree.finished() {
            // track up to one batch, received photons first
            let mut n = self.config.batch_size;
            while n > 0 && (!recv_stack.is_empty() || n_local_sourced < n_local) {
                let mut phtn = match recv_stack.pop() {
                    Some(p) => p,
                    None => {
                        n_local_sourced += 1;
                        source.next_photon(rng, dt)
                    }
                };

                let event = track_photon(
                    &mut phtn,
                    self.mesh,
                    rng,
                    next_dt,
                    self.config.cutoff_fraction,
                    &mut tally,
                );
                match event {
                    Event::Kill | Event::Exit => n_complete += 1,
                    Event::Census => {
                        census_list.push(phtn);
                        n_complete += 1;
                    }
                    Event::Pass => {
                        let target = self.mesh.owner_rank(phtn.cell);
                        let i_b = channels.buffer_index(target).ok_or(
                            TransportError::MissingAdjacency { cell: phtn.cell, rank: target },
                        )?;
                        channels.enqueue(i_b, phtn);
                    }
                    Event::Wait => unreachable!("tracker never yields a wait event"),
                }
                n -= 1;
            }
            n_completed_total += n_complete;

            let source_exhausted = n_local_sourced == n_local;
            channels.progress(
                self.comm,
                &mut ctr,
                &mut recv_stack,
                source_exhausted,
                max_buffer_size,
            )?;
            tree.progress(
                self.comm,
                &mut ctr,
                &mut n_complete,
                source_exhausted && recv_stack.is_empty(),
            )?;
        }

        // shutdown handshake: relay the total down, synchronize, close
        // every parked count request, then drain the photon channels
        tree.broadcast_down(self.comm, &mut ctr)?;
        self.comm.barrier();
        tree.close_requests(self.comm, &mut ctr)?;
        channels.shutdown(self.comm, &mut ctr)?;
        self.comm.barrier();

        census_list.sort_by_key(|p| p.cell);

        Ok(StepReport {
            census: census_list,
            exit_e: tally.exit_e,
            post_census_e: tally.census_e,
            n_completed: n_completed_total,
            counters: ctr,
        })
    }
}
