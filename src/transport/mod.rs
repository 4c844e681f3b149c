//! # Particle-Pass Transport
//!
//! The domain-decomposed transport loop. Photons are tracked through
//! on-rank cells to a terminal local event; histories that cross onto
//! another rank's cells are forwarded over asynchronous neighbor
//! messages; a binary tree over the ranks aggregates completed-history
//! counts until every history worldwide is accounted for.
//!
//! ```text
//!   source ──▶ tracker ──▶ { census list │ neighbor outbox │ done }
//!     ▲                        │
//!     └── recv stack ◀─────────┘  (photon batches from adjacent ranks)
//!
//!   done counts ──▶ completion tree ──▶ global termination
//! ```
//!
//! Module layout mirrors the data flow: `tracker` walks one photon,
//! `channels` owns the per-neighbor buffers, `tree` owns the completion
//! protocol, `driver` interleaves all three.

pub mod channels;
pub mod driver;
pub mod tracker;
pub mod tree;

pub use channels::NeighborChannels;
pub use driver::{StepReport, TransportConfig, TransportDriver, TransportError};
pub use tracker::{track_photon, RankTally};
pub use tree::CompletionTree;

/// Per-step message diagnostics
///
/// Posted/completed pairs must balance at step exit; the scenario tests
/// assert it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCounter {
    /// Photon-batch messages sent
    pub n_photon_messages: u32,
    /// Photons passed to other ranks
    pub n_photons_sent: u32,
    /// Sends posted (photon and count planes)
    pub n_sends_posted: u32,
    /// Sends completed
    pub n_sends_completed: u32,
    /// Receives posted
    pub n_receives_posted: u32,
    /// Receives completed
    pub n_receives_completed: u32,
}

impl MessageCounter {
    /// No outstanding requests
    pub fn balanced(&self) -> bool {
        self.n_sends_posted == self.n_sends_completed
            && self.n_receives_posted == self.n_receives_completed
    }
}
