//! # Photon Sources
//!
//! Emission of the photons a rank owes for the current step. The driver
//! draws from a source one photon at a time, interleaved with photons
//! received from neighbors.

use crate::constants::C;
use crate::mesh::Mesh;
use crate::photon::Photon;
use crate::rng::RandomGenerator;

/// A per-rank photon source for one timestep
pub trait PhotonSource {
    /// Photons this source owes the rank this step (fixed at step entry)
    fn n_photon(&self) -> u64;

    /// Draw the next photon
    ///
    /// Called at most `n_photon()` times per step; `dt` sets the
    /// distance-to-census of freshly emitted photons.
    fn next_photon(&mut self, rng: &mut RandomGenerator, dt: f64) -> Photon;
}

// ============================================================================
// EMISSION SOURCE
// ============================================================================

/// Thermal emission from the rank's cells
///
/// Emits a fixed number of photons per cell, uniform in position,
/// isotropic in angle, each carrying `e_per_photon`. Cells are walked in
/// id order so the emission count is exact rather than sampled.
pub struct EmissionSource<'a> {
    mesh: &'a Mesh,
    photons_per_cell: u64,
    e_per_photon: f64,
    drawn: u64,
}

impl<'a> EmissionSource<'a> {
    pub fn new(mesh: &'a Mesh, photons_per_cell: u64, e_per_photon: f64) -> Self {
        Self {
            mesh,
            photons_per_cell,
            e_per_photon,
            drawn: 0,
        }
    }
}

impl PhotonSource for EmissionSource<'_> {
    fn n_photon(&self) -> u64 {
        self.photons_per_cell * self.mesh.n_local_cells() as u64
    }

    fn next_photon(&mut self, rng: &mut RandomGenerator, dt: f64) -> Photon {
        assert!(self.drawn < self.n_photon(), "emission source exhausted");
        let cell = &self.mesh.cells()[(self.drawn / self.photons_per_cell) as usize];
        self.drawn += 1;
        Photon::new(
            cell.id,
            cell.uniform_position_in(rng),
            rng.isotropic_direction(),
            self.e_per_photon,
            C * dt,
        )
    }
}

// ============================================================================
// LIST SOURCE
// ============================================================================

/// A source that drains a prebuilt photon list
///
/// Used to carry census photons from the previous step back into
/// transport, and by tests that need exact control over emission.
pub struct ListSource {
    photons: Vec<Photon>,
    n_total: u64,
}

impl ListSource {
    pub fn new(mut photons: Vec<Photon>) -> Self {
        // drain from the back, keep caller order
        photons.reverse();
        let n_total = photons.len() as u64;
        Self { photons, n_total }
    }
}

impl PhotonSource for ListSource {
    fn n_photon(&self) -> u64 {
        self.n_total
    }

    fn next_photon(&mut self, _rng: &mut RandomGenerator, _dt: f64) -> Photon {
        self.photons.pop().expect("list source exhausted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::slab_mesh;
    use crate::photon::photon_list_energy;
    use crate::types::Vec3;

    #[test]
    fn test_emission_source_count_and_energy() {
        let mesh = slab_mesh(0, 1, 3, 1.0, 1.0, 0.0, 1.0);
        let mut src = EmissionSource::new(&mesh, 4, 0.5);
        let mut rng = RandomGenerator::new(11);
        assert_eq!(src.n_photon(), 12);

        let mut emitted = Vec::new();
        for _ in 0..src.n_photon() {
            emitted.push(src.next_photon(&mut rng, 0.1));
        }
        assert!((photon_list_energy(&emitted) - 6.0).abs() < 1e-12);
        // four photons per cell, in cell order
        assert!(emitted[..4].iter().all(|p| p.cell == 0));
        assert!(emitted[8..].iter().all(|p| p.cell == 2));
        for p in &emitted {
            assert!((p.direction.mag() - 1.0).abs() < 1e-12);
            assert!((p.distance_remaining - C * 0.1).abs() < 1e-9);
            assert!(mesh.on_rank_cell(p.cell).in_cell(&p.position));
        }
    }

    #[test]
    fn test_list_source_preserves_order() {
        let a = Photon::new(0, Vec3::zero(), Vec3::unit_x(), 1.0, 5.0);
        let b = Photon::new(1, Vec3::zero(), Vec3::unit_y(), 2.0, 5.0);
        let mut src = ListSource::new(vec![a, b]);
        let mut rng = RandomGenerator::new(1);
        assert_eq!(src.n_photon(), 2);
        assert_eq!(src.next_photon(&mut rng, 0.1).cell, 0);
        assert_eq!(src.next_photon(&mut rng, 0.1).cell, 1);
    }
}
