//! # Photon
//!
//! The particle tracked by the transport kernel and its fixed-layout wire
//! record. A photon has exactly one logical owner at any time: the source
//! that made it, the tracker walking it, a neighbor outbox waiting to send
//! it, or the census list at the end of the step.

use bytemuck::{Pod, Zeroable};

use crate::types::{face_axis, Vec3};

/// A photon history in flight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Photon {
    /// Current cell (global id, valid across all ranks)
    pub cell: u32,
    /// Position (cm)
    pub position: Vec3,
    /// Flight direction (unit vector)
    pub direction: Vec3,
    /// Remaining energy (GJ)
    pub e: f64,
    /// Energy at emission, the roulette reference (GJ)
    pub e0: f64,
    /// Distance left to travel before census (cm)
    pub distance_remaining: f64,
    /// Reached census this step
    pub census: bool,
    /// Still being transported
    pub alive: bool,
}

impl Photon {
    /// Create a live photon at emission
    pub fn new(cell: u32, position: Vec3, direction: Vec3, e: f64, distance_to_census: f64) -> Self {
        Self {
            cell,
            position,
            direction,
            e,
            e0: e,
            distance_remaining: distance_to_census,
            census: false,
            alive: true,
        }
    }

    /// Advance along the flight direction
    pub fn advance(&mut self, distance: f64) {
        self.position += self.direction * distance;
        self.distance_remaining -= distance;
    }

    /// Roulette test against the emission energy
    pub fn below_cutoff(&self, cutoff_fraction: f64) -> bool {
        self.e < cutoff_fraction * self.e0
    }

    /// Mirror the direction component normal to the given face
    pub fn reflect(&mut self, face: usize) {
        let axis = face_axis(face);
        self.direction[axis] = -self.direction[axis];
    }

    /// Terminate the history
    pub fn set_dead(&mut self) {
        self.alive = false;
    }
}

/// Total energy carried by a photon list (GJ)
pub fn photon_list_energy(photons: &[Photon]) -> f64 {
    photons.iter().map(|p| p.e).sum()
}

// ============================================================================
// WIRE RECORD
// ============================================================================

/// Fixed-layout photon record as sent between ranks
///
/// Field order is part of the wire contract: global cell id, position,
/// direction, remaining energy, emission energy, distance to census,
/// census flag, alive flag. 78 bytes, no padding, no variable-length
/// fields.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct WirePhoton {
    pub cell: u32,
    pub position: [f64; 3],
    pub direction: [f64; 3],
    pub e: f64,
    pub e0: f64,
    pub distance_remaining: f64,
    pub census: u8,
    pub alive: u8,
}

impl From<Photon> for WirePhoton {
    fn from(p: Photon) -> Self {
        Self {
            cell: p.cell,
            position: p.position.to_array(),
            direction: p.direction.to_array(),
            e: p.e,
            e0: p.e0,
            distance_remaining: p.distance_remaining,
            census: p.census as u8,
            alive: p.alive as u8,
        }
    }
}

impl From<WirePhoton> for Photon {
    fn from(w: WirePhoton) -> Self {
        let position = w.position;
        let direction = w.direction;
        Self {
            cell: w.cell,
            position: Vec3::from_array(position),
            direction: Vec3::from_array(direction),
            e: w.e,
            e0: w.e0,
            distance_remaining: w.distance_remaining,
            census: w.census != 0,
            alive: w.alive != 0,
        }
    }
}

/// Pack a photon batch for the wire
pub fn pack_batch(photons: &[Photon]) -> Vec<WirePhoton> {
    photons.iter().map(|&p| p.into()).collect()
}

/// Unpack a received photon batch
pub fn unpack_batch(wire: Vec<WirePhoton>) -> Vec<Photon> {
    wire.into_iter().map(Photon::from).collect()
}
