//! # Photon Tracker
//!
//! Walks one photon through on-rank cells until a terminal local event.
//! The tracker owns the photon for the duration of the call; input
//! invariants (live photon, on-rank cell) are the driver's to guarantee.

use crate::constants::C;
use crate::mesh::Mesh;
use crate::photon::Photon;
use crate::rng::RandomGenerator;
use crate::types::{BcType, Event};

/// Per-rank energy accumulators for one step
#[derive(Debug)]
pub struct RankTally<'a> {
    /// Energy that left through vacuum boundaries (GJ)
    pub exit_e: f64,
    /// Energy carried by photons that reached census (GJ)
    pub census_e: f64,
    /// Energy absorbed per on-rank cell, indexed like the mesh (GJ)
    pub abs_e: &'a mut [f64],
}

impl<'a> RankTally<'a> {
    pub fn new(abs_e: &'a mut [f64]) -> Self {
        Self { exit_e: 0.0, census_e: 0.0, abs_e }
    }
}

/// Which of the three candidate distances won
enum Nearest {
    Scatter,
    Boundary,
    Census,
}

/// Track one photon to a terminal local event
///
/// Each flight samples three candidate distances and takes the minimum;
/// ties resolve scatter, then boundary, then census. Energy is deposited
/// continuously along the flight via the Fleck effective absorption, and
/// a history whose energy falls below `cutoff_fraction` of its emission
/// energy is rouletted in place.
pub fn track_photon(
    phtn: &mut Photon,
    mesh: &Mesh,
    rng: &mut RandomGenerator,
    next_dt: f64,
    cutoff_fraction: f64,
    tally: &mut RankTally<'_>,
) -> Event {
    let mut cell = mesh.on_rank_cell(phtn.cell);

    loop {
        let sigma_a = cell.op_a;
        let sigma_s = cell.op_s;
        let f = cell.f;

        // distances to the three candidate events
        let attenuation = (1.0 - f) * sigma_a + sigma_s;
        let dist_scatter = if attenuation > 0.0 {
            -rng.uniform().ln() / attenuation
        } else {
            f64::INFINITY
        };
        let (dist_boundary, out_face) =
            cell.distance_to_boundary(&phtn.position, &phtn.direction);
        let dist_census = phtn.distance_remaining;

        let mut dist = dist_scatter;
        let mut nearest = Nearest::Scatter;
        if dist_boundary < dist {
            dist = dist_boundary;
            nearest = Nearest::Boundary;
        }
        if dist_census < dist {
            dist = dist_census;
            nearest = Nearest::Census;
        }

        // deposit effectively-absorbed energy in the traversed cell
        let absorbed = phtn.e * (1.0 - (-sigma_a * f * dist).exp());
        phtn.e -= absorbed;
        tally.abs_e[mesh.local_index(phtn.cell)] += absorbed;

        phtn.advance(dist);

        // roulette before the event is applied
        if phtn.below_cutoff(cutoff_fraction) {
            tally.abs_e[mesh.local_index(phtn.cell)] += phtn.e;
            phtn.set_dead();
            return Event::Kill;
        }

        match nearest {
            Nearest::Scatter => {
                phtn.direction = rng.isotropic_direction();
            }
            Nearest::Boundary => match cell.bc[out_face] {
                BcType::Element => {
                    phtn.cell = cell.next[out_face];
                    cell = mesh.on_rank_cell(phtn.cell);
                }
                BcType::Processor => {
                    // hand off with the global id of the off-rank cell
                    phtn.cell = cell.next[out_face];
                    return Event::Pass;
                }
                BcType::Vacuum => {
                    tally.exit_e += phtn.e;
                    phtn.set_dead();
                    return Event::Exit;
                }
                BcType::Reflect => {
                    phtn.reflect(out_face);
                }
            },
            Nearest::Census => {
                phtn.census = true;
                phtn.distance_remaining = C * next_dt;
                tally.census_e += phtn.e;
                return Event::Census;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{slab_mesh, Cell, Mesh};
    use crate::types::Vec3;

    fn one_cell_mesh(op_a: f64, op_s: f64, f: f64, bc: BcType) -> Mesh {
        let mut cell = Cell::new(0, [0.0, 1000.0, 0.0, 1000.0, 0.0, 1000.0]);
        cell.op_a = op_a;
        cell.op_s = op_s;
        cell.f = f;
        cell.bc = [bc; 6];
        Mesh::new(0, vec![0, 1], vec![cell])
    }

    fn track(
        mesh: &Mesh,
        phtn: &mut Photon,
        abs_e: &mut [f64],
        next_dt: f64,
    ) -> (Event, f64, f64) {
        let mut rng = RandomGenerator::new(3);
        let mut tally = RankTally::new(abs_e);
        let event = track_photon(phtn, mesh, &mut rng, next_dt, 0.01, &mut tally);
        (event, tally.exit_e, tally.census_e)
    }

    #[test]
    fn test_pure_absorber_kills() {
        // sigma_a = 1, f = 1: no scattering, energy decays as exp(-distance)
        let mesh = one_cell_mesh(1.0, 0.0, 1.0, BcType::Vacuum);
        let mut phtn = Photon::new(0, Vec3::new(500.0, 500.0, 500.0), Vec3::unit_x(), 1.0, 10.0);
        let mut abs_e = [0.0];

        let (event, exit_e, census_e) = track(&mesh, &mut phtn, &mut abs_e, 0.1);
        assert_eq!(event, Event::Kill);
        assert!(!phtn.alive);
        // every joule ends up in the cell
        assert!((abs_e[0] - 1.0).abs() < 1e-12);
        assert_eq!(exit_e, 0.0);
        assert_eq!(census_e, 0.0);
    }

    #[test]
    fn test_vacuum_exit_carries_full_energy() {
        let mesh = one_cell_mesh(0.0, 0.0, 0.0, BcType::Vacuum);
        let mut phtn =
            Photon::new(0, Vec3::new(999.5, 500.0, 500.0), Vec3::unit_x(), 1.0, 10.0);
        let mut abs_e = [0.0];

        let (event, exit_e, _) = track(&mesh, &mut phtn, &mut abs_e, 0.1);
        assert_eq!(event, Event::Exit);
        assert!((exit_e - 1.0).abs() < 1e-12);
        assert_eq!(abs_e[0], 0.0);
    }

    #[test]
    fn test_census_resets_flight_distance() {
        let mesh = one_cell_mesh(0.0, 0.0, 0.0, BcType::Vacuum);
        let mut phtn = Photon::new(0, Vec3::new(500.0, 500.0, 500.0), Vec3::unit_x(), 1.0, 2.5);
        let mut abs_e = [0.0];

        let next_dt = 0.2;
        let (event, _, census_e) = track(&mesh, &mut phtn, &mut abs_e, next_dt);
        assert_eq!(event, Event::Census);
        assert!(phtn.census);
        assert!((census_e - 1.0).abs() < 1e-12);
        assert!((phtn.distance_remaining - C * next_dt).abs() < 1e-9);
        assert!((phtn.position.x - 502.5).abs() < 1e-9);
    }

    #[test]
    fn test_reflection_inverts_normal_component() {
        // 1.3 cm to census: 0.5 cm to the X+ face, reflect, 0.8 cm back
        let mut cell = Cell::new(0, [0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        cell.bc = [BcType::Reflect; 6];
        let mesh = Mesh::new(0, vec![0, 1], vec![cell]);

        let mut phtn = Photon::new(0, Vec3::new(0.5, 0.5, 0.5), Vec3::unit_x(), 1.0, 1.3);
        let mut abs_e = [0.0];
        let (event, exit_e, _) = track(&mesh, &mut phtn, &mut abs_e, 0.1);
        assert_ne!(event, Event::Exit);
        assert_eq!(event, Event::Census);
        assert_eq!(exit_e, 0.0);
        assert!((phtn.direction.x + 1.0).abs() < 1e-12);
        assert!((phtn.position.x - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_element_crossing_stays_on_rank() {
        let mesh = slab_mesh(0, 1, 3, 1.0, 0.0, 0.0, 0.0);
        let mut phtn = Photon::new(0, Vec3::new(0.5, 0.5, 0.5), Vec3::unit_x(), 1.0, 100.0);
        let mut abs_e = [0.0; 3];

        let (event, exit_e, _) = track(&mesh, &mut phtn, &mut abs_e, 0.1);
        // streams through cells 0, 1, 2 and leaves through the far vacuum end
        assert_eq!(event, Event::Exit);
        assert_eq!(phtn.cell, 2);
        assert!((exit_e - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_processor_crossing_returns_pass() {
        let mesh = slab_mesh(0, 2, 2, 1.0, 0.0, 0.0, 0.0);
        let mut phtn = Photon::new(1, Vec3::new(1.5, 0.5, 0.5), Vec3::unit_x(), 1.0, 100.0);
        let mut abs_e = [0.0; 2];

        let (event, _, _) = track(&mesh, &mut phtn, &mut abs_e, 0.1);
        assert_eq!(event, Event::Pass);
        // the photon now names the off-rank cell it is headed into
        assert_eq!(phtn.cell, 2);
        assert!(phtn.alive);
    }

    #[test]
    fn test_scattering_conserves_energy_without_absorption() {
        // pure scatterer: many direction changes, no deposition
        let mesh = one_cell_mesh(0.0, 5.0, 0.0, BcType::Reflect);
        let mut phtn = Photon::new(0, Vec3::new(500.0, 500.0, 500.0), Vec3::unit_x(), 1.0, 50.0);
        let mut abs_e = [0.0];

        let (event, _, census_e) = track(&mesh, &mut phtn, &mut abs_e, 0.1);
        assert_eq!(event, Event::Census);
        assert_eq!(abs_e[0], 0.0);
        assert!((census_e - 1.0).abs() < 1e-12);
        assert!((phtn.e - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_energy_balance_mixed_medium() {
        let mesh = one_cell_mesh(0.8, 1.5, 0.6, BcType::Reflect);
        let mut phtn = Photon::new(0, Vec3::new(500.0, 500.0, 500.0), Vec3::unit_x(), 2.0, 8.0);
        let mut abs_e = [0.0];

        let (event, exit_e, census_e) = track(&mesh, &mut phtn, &mut abs_e, 0.1);
        assert!(event == Event::Kill || event == Event::Census);
        // deposited plus banked energy must equal the emission energy
        let total = abs_e[0] + exit_e + census_e;
        assert!((total - 2.0).abs() < 1e-12, "unbalanced: {total}");
    }
}
