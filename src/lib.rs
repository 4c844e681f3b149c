//! # RADIMC-RS
//!
//! Parallel Implicit Monte Carlo thermal radiative transport with
//! domain-decomposed particle passing.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                           RADIMC-RS                                │
//! │        Implicit Monte Carlo particle-pass transport in Rust        │
//! ├────────────────────────────────────────────────────────────────────┤
//! │  MESH      cartesian cells, rank ownership, adjacency              │
//! │  PHOTONS   histories, sources, fixed-layout wire records           │
//! │  COMM      tagged rank-to-rank message planes + collectives        │
//! │  TRANSPORT tracker → neighbor channels → completion tree → driver  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each rank owns a contiguous block of cells and transports photons
//! through them one batch at a time. A history that crosses onto another
//! rank's block is forwarded over an asynchronous neighbor message; a
//! binary tree over the ranks aggregates completed-history counts and
//! declares the step finished only when every history worldwide has been
//! absorbed, has left the problem, or has reached census.
//!
//! ## Author
//! Francisco Molina-Burgos, Avermex Research Division
//!
//! ## Date
//! June 2026

pub mod buffer;
pub mod comm;
pub mod constants;
pub mod mesh;
pub mod photon;
pub mod rng;
pub mod source;
pub mod transport;
pub mod types;

// Re-exports
pub use buffer::Buffer;
pub use comm::{CommError, CommWorld, RankComm};
pub use mesh::{slab_mesh, Cell, Mesh};
pub use photon::{photon_list_energy, Photon, WirePhoton};
pub use rng::RandomGenerator;
pub use source::{EmissionSource, ListSource, PhotonSource};
pub use transport::{
    MessageCounter, NeighborChannels, StepReport, TransportConfig, TransportDriver,
    TransportError,
};
pub use types::{BcType, Event, Vec3};

/// RADIMC version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Information about the library
pub fn info() -> String {
    format!(
        "RADIMC-RS v{}\n\
         Implicit Monte Carlo thermal radiative transport\n\
         Domain-decomposed particle passing with tree termination\n\
         Author: Francisco Molina-Burgos, Avermex Research Division",
        VERSION
    )
}
