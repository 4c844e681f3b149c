//! # Mesh
//!
//! The on-rank view of a domain-decomposed Cartesian mesh. Each rank owns
//! a contiguous block of global cell ids; faces that border another rank's
//! block carry a `Processor` boundary condition and the global id of the
//! off-rank neighbor cell. The transport kernel only ever reads this data.

use std::collections::BTreeSet;

use crate::rng::RandomGenerator;
use crate::types::{BcType, Vec3, N_FACES};

// ============================================================================
// CELL
// ============================================================================

/// Basic geometry unit, read-only during transport
///
/// An axis-aligned box. `nodes` holds the six plane coordinates
/// `[x_lo, x_hi, y_lo, y_hi, z_lo, z_hi]`; faces are indexed in the same
/// order as `types::X_NEG..Z_POS`.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Global id, valid across all ranks
    pub id: u32,
    /// Plane coordinates: x_lo, x_hi, y_lo, y_hi, z_lo, z_hi (cm)
    pub nodes: [f64; 6],
    /// Boundary condition per face
    pub bc: [BcType; N_FACES],
    /// Global id of the bordering cell per face (Element/Processor faces)
    pub next: [u32; N_FACES],
    /// Absorption opacity (1/cm)
    pub op_a: f64,
    /// Physical scattering opacity (1/cm)
    pub op_s: f64,
    /// Fleck factor
    pub f: f64,
}

impl Cell {
    /// Create a cell with vacuum on every face and zero opacities
    pub fn new(id: u32, nodes: [f64; 6]) -> Self {
        Self {
            id,
            nodes,
            bc: [BcType::Vacuum; N_FACES],
            next: [0; N_FACES],
            op_a: 0.0,
            op_s: 0.0,
            f: 0.0,
        }
    }

    /// Distance to the cell boundary along a flight direction
    ///
    /// Checks only the surface on the side of travel for each axis
    /// (`face = 2*axis + (dir > 0)`). Returns the distance and the face
    /// crossed. Axes the direction is exactly parallel to are skipped.
    pub fn distance_to_boundary(&self, pos: &Vec3, dir: &Vec3) -> (f64, usize) {
        let mut min_dist = 1.0e16;
        let mut crossed = 0;
        for axis in 0..3 {
            if dir[axis] == 0.0 {
                continue;
            }
            let face = 2 * axis + usize::from(dir[axis] > 0.0);
            let dist = (self.nodes[face] - pos[axis]) / dir[axis];
            if dist < min_dist {
                min_dist = dist;
                crossed = face;
            }
        }
        (min_dist, crossed)
    }

    /// Cell volume (cm³)
    pub fn volume(&self) -> f64 {
        (self.nodes[1] - self.nodes[0])
            * (self.nodes[3] - self.nodes[2])
            * (self.nodes[5] - self.nodes[4])
    }

    /// Area of a face (cm²)
    pub fn face_area(&self, face: usize) -> f64 {
        let (dx, dy, dz) = (
            self.nodes[1] - self.nodes[0],
            self.nodes[3] - self.nodes[2],
            self.nodes[5] - self.nodes[4],
        );
        match face {
            0 | 1 => dy * dz,
            2 | 3 => dx * dz,
            4 | 5 => dx * dy,
            _ => panic!("face index out of range: {face}"),
        }
    }

    /// Containment check (diagnostics only)
    pub fn in_cell(&self, pos: &Vec3) -> bool {
        pos.x >= self.nodes[0]
            && pos.x <= self.nodes[1]
            && pos.y >= self.nodes[2]
            && pos.y <= self.nodes[3]
            && pos.z >= self.nodes[4]
            && pos.z <= self.nodes[5]
    }

    /// Sample a uniform position inside the cell
    pub fn uniform_position_in(&self, rng: &mut RandomGenerator) -> Vec3 {
        Vec3::new(
            self.nodes[0] + rng.uniform() * (self.nodes[1] - self.nodes[0]),
            self.nodes[2] + rng.uniform() * (self.nodes[3] - self.nodes[2]),
            self.nodes[4] + rng.uniform() * (self.nodes[5] - self.nodes[4]),
        )
    }
}

// ============================================================================
// MESH
// ============================================================================

/// On-rank mesh slice with partition bookkeeping
#[derive(Debug, Clone)]
pub struct Mesh {
    rank: usize,
    /// First global id owned by each rank, plus one-past-the-end sentinel
    bounds: Vec<u32>,
    /// Cells owned by this rank, ordered by global id
    cells: Vec<Cell>,
    /// `(neighbor_rank, buffer_index)` with dense indices, ascending rank
    adjacency: Vec<(usize, usize)>,
}

impl Mesh {
    /// Assemble the on-rank view
    ///
    /// `bounds[r]` is the first global id owned by rank `r`; the final
    /// entry is one past the last id in the problem. `cells` must be this
    /// rank's contiguous block in ascending id order. The adjacency list
    /// is derived from the `Processor` faces found on the block.
    pub fn new(rank: usize, bounds: Vec<u32>, cells: Vec<Cell>) -> Self {
        assert!(rank + 1 < bounds.len(), "rank {rank} outside bounds table");
        assert_eq!(
            cells.len(),
            (bounds[rank + 1] - bounds[rank]) as usize,
            "cell block does not match ownership bounds"
        );

        let mut mesh = Self {
            rank,
            bounds,
            cells,
            adjacency: Vec::new(),
        };
        let mut neighbor_ranks = BTreeSet::new();
        for cell in &mesh.cells {
            for face in 0..N_FACES {
                if cell.bc[face] == BcType::Processor {
                    neighbor_ranks.insert(mesh.owner_rank(cell.next[face]));
                }
            }
        }
        mesh.adjacency = neighbor_ranks.into_iter().enumerate().map(|(i, r)| (r, i)).collect();
        mesh
    }

    /// This rank's id
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of cells owned by this rank
    pub fn n_local_cells(&self) -> usize {
        self.cells.len()
    }

    /// Rank that owns a global cell id
    pub fn owner_rank(&self, global_id: u32) -> usize {
        debug_assert!(global_id < self.bounds[self.bounds.len() - 1]);
        match self.bounds.binary_search(&global_id) {
            Ok(r) => r.min(self.bounds.len() - 2),
            Err(r) => r - 1,
        }
    }

    /// Local index of an on-rank global id
    pub fn local_index(&self, global_id: u32) -> usize {
        let start = self.bounds[self.rank];
        assert!(
            global_id >= start && global_id < self.bounds[self.rank + 1],
            "cell {global_id} is not on rank {}",
            self.rank
        );
        (global_id - start) as usize
    }

    /// Read an on-rank cell by global id
    pub fn on_rank_cell(&self, global_id: u32) -> &Cell {
        &self.cells[self.local_index(global_id)]
    }

    /// Adjacent ranks as `(neighbor_rank, buffer_index)`, ascending rank
    pub fn adjacency(&self) -> &[(usize, usize)] {
        &self.adjacency
    }

    /// All on-rank cells in global-id order
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

// ============================================================================
// TEST PROBLEM MESH
// ============================================================================

/// Build the 1-D slab decomposition used by the standard test problems
///
/// A chain of `n_ranks * cells_per_rank` unit-section cells along x,
/// `cell_width` cm wide, split into contiguous blocks. Transverse faces
/// reflect; the two x ends are vacuum; block seams are processor faces.
pub fn slab_mesh(
    rank: usize,
    n_ranks: usize,
    cells_per_rank: usize,
    cell_width: f64,
    op_a: f64,
    op_s: f64,
    f: f64,
) -> Mesh {
    let n_total = (n_ranks * cells_per_rank) as u32;
    let bounds: Vec<u32> = (0..=n_ranks).map(|r| (r * cells_per_rank) as u32).collect();

    let start = bounds[rank];
    let end = bounds[rank + 1];
    let mut cells = Vec::with_capacity((end - start) as usize);
    for id in start..end {
        let x_lo = id as f64 * cell_width;
        let mut cell = Cell::new(id, [x_lo, x_lo + cell_width, 0.0, 1.0, 0.0, 1.0]);
        cell.op_a = op_a;
        cell.op_s = op_s;
        cell.f = f;
        cell.bc = [
            BcType::Element,
            BcType::Element,
            BcType::Reflect,
            BcType::Reflect,
            BcType::Reflect,
            BcType::Reflect,
        ];
        if id == 0 {
            cell.bc[0] = BcType::Vacuum;
        } else {
            cell.next[0] = id - 1;
            if id == start {
                cell.bc[0] = BcType::Processor;
            }
        }
        if id == n_total - 1 {
            cell.bc[1] = BcType::Vacuum;
        } else {
            cell.next[1] = id + 1;
            if id == end - 1 {
                cell.bc[1] = BcType::Processor;
            }
        }
        cells.push(cell);
    }
    Mesh::new(rank, bounds, cells)
}
