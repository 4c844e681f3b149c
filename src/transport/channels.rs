//! # Neighbor Channels
//!
//! Per-neighbor staging and message buffers for photons leaving the rank.
//! One posted receive and at most one in-flight send per neighbor; staged
//! photons wait in an outbox until a message is worth posting.

use crate::buffer::Buffer;
use crate::comm::{CommError, RankComm};
use crate::mesh::Mesh;
use crate::photon::{pack_batch, unpack_batch, Photon, WirePhoton};
use crate::transport::MessageCounter;

struct NeighborLink {
    /// Adjacent rank this link talks to
    rank: usize,
    /// Photons waiting to leave toward `rank`
    outbox: Vec<Photon>,
    send_buf: Buffer<WirePhoton>,
    recv_buf: Buffer<WirePhoton>,
}

/// Send/receive machinery for all adjacent ranks
///
/// Links are ordered by ascending neighbor rank and visited in that order
/// every progress call, so no neighbor starves.
pub struct NeighborChannels {
    links: Vec<NeighborLink>,
}

impl NeighborChannels {
    /// One link per entry of the mesh adjacency list
    pub fn from_mesh(mesh: &Mesh) -> Self {
        let links = mesh
            .adjacency()
            .iter()
            .map(|&(rank, _)| NeighborLink {
                rank,
                outbox: Vec::new(),
                send_buf: Buffer::new(),
                recv_buf: Buffer::new(),
            })
            .collect();
        Self { links }
    }

    pub fn n_neighbors(&self) -> usize {
        self.links.len()
    }

    /// Buffer index for an adjacent rank
    pub fn buffer_index(&self, rank: usize) -> Option<usize> {
        self.links.iter().position(|l| l.rank == rank)
    }

    /// Photons currently staged for a neighbor
    pub fn outbox_len(&self, buffer_index: usize) -> usize {
        self.links[buffer_index].outbox.len()
    }

    /// Stage a passed photon for its target rank
    pub fn enqueue(&mut self, buffer_index: usize, phtn: Photon) {
        self.links[buffer_index].outbox.push(phtn);
    }

    /// Post the initial receive for every neighbor
    pub fn post_recvs(&mut self, ctr: &mut MessageCounter) {
        for link in &mut self.links {
            link.recv_buf.set_awaiting();
            ctr.n_receives_posted += 1;
        }
    }

    /// One round of send/receive processing over all neighbors
    ///
    /// A send is posted when the prior one has drained and the outbox
    /// either holds a full message or the source is exhausted (so no
    /// fuller message is coming). Completed receives refill the shared
    /// LIFO `recv_stack` and the receive is immediately re-posted.
    pub fn progress(
        &mut self,
        comm: &RankComm,
        ctr: &mut MessageCounter,
        recv_stack: &mut Vec<Photon>,
        source_exhausted: bool,
        max_buffer_size: usize,
    ) -> Result<(), CommError> {
        for link in &mut self.links {
            // retire the previous send once it has drained
            if link.send_buf.sent() {
                link.send_buf.reset();
                ctr.n_sends_completed += 1;
            }

            if link.send_buf.empty()
                && !link.outbox.is_empty()
                && (link.outbox.len() >= max_buffer_size || source_exhausted)
            {
                let n_send = link.outbox.len().min(max_buffer_size);
                let batch: Vec<Photon> = link.outbox.drain(..n_send).collect();
                link.send_buf.fill(pack_batch(&batch));
                let payload = link.send_buf.post_send();
                comm.send_photons(link.rank, payload)?;
                ctr.n_photons_sent += n_send as u32;
                ctr.n_photon_messages += 1;
                ctr.n_sends_posted += 1;
            }

            if link.recv_buf.awaiting() {
                if let Some(batch) = comm.try_recv_photons(link.rank)? {
                    ctr.n_receives_completed += 1;
                    link.recv_buf.set_received(batch);
                    recv_stack.extend(unpack_batch(link.recv_buf.take()));
                    link.recv_buf.set_awaiting();
                    ctr.n_receives_posted += 1;
                }
            }
        }
        Ok(())
    }

    /// Close every photon channel after global termination
    ///
    /// Each neighbor still has a posted receive; an empty batch unblocks
    /// it. All sends have drained by construction, all receives complete
    /// on the matching empty batch from the other side.
    pub fn shutdown(
        &mut self,
        comm: &RankComm,
        ctr: &mut MessageCounter,
    ) -> Result<(), CommError> {
        for link in &mut self.links {
            if link.send_buf.sent() {
                link.send_buf.reset();
                ctr.n_sends_completed += 1;
            }
            comm.send_photons(link.rank, Vec::new())?;
            ctr.n_sends_posted += 1;
            ctr.n_sends_completed += 1;
        }
        for link in &mut self.links {
            let batch = comm.recv_photons(link.rank)?;
            debug_assert!(batch.is_empty(), "photon batch arrived after termination");
            ctr.n_receives_completed += 1;
            link.recv_buf.set_received(batch);
            let _ = link.recv_buf.take();
        }
        Ok(())
    }
}
