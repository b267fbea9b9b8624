use crate::{
    concurrency::par_iter_mut1, floating_type_mod::FT, simulation_parameters::NeighborhoodSearchAlgorithm, V2,
};

const MAX_NEIGHBOR_COUNT: usize = 20000;

/**
 * Per-particle neighbor lists within the kernel support radius.
 *
 * Two interchangeable build strategies: an all-pairs scan and a uniform
 * cell grid (cell size = support radius, 3x3 cell stencil). Both produce
 * identical membership: every j with |x_i - x_j| < support_radius,
 * including the particle itself.
 */
pub struct NeighborhoodCache {
    neighs: Vec<Vec<u32>>,
}

impl NeighborhoodCache {
    pub fn new(num_particles: usize) -> Self {
        NeighborhoodCache {
            neighs: (0..num_particles).map(|_| Vec::new()).collect(),
        }
    }

    pub fn iter<'a>(&'a self, i: usize) -> impl Iterator<Item = usize> + 'a {
        self.neighs[i].iter().map(|&x| x as usize)
    }

    pub fn len(&self) -> usize {
        self.neighs.len()
    }

    pub fn build(&mut self, algorithm: NeighborhoodSearchAlgorithm, positions: &[V2], support_radius: FT) {
        if self.neighs.len() != positions.len() {
            self.neighs.resize_with(positions.len(), Vec::new);
        }

        match algorithm {
            NeighborhoodSearchAlgorithm::BruteForce => self.build_brute_force(positions, support_radius),
            NeighborhoodSearchAlgorithm::Grid => self.build_grid(positions, support_radius),
        }
    }

    fn build_brute_force(&mut self, positions: &[V2], support_radius: FT) {
        let max_dist_sq = support_radius * support_radius;

        par_iter_mut1(&mut self.neighs, |i, p_neighs| {
            p_neighs.clear();

            for (j, position_j) in positions.iter().enumerate() {
                if (position_j - positions[i]).norm_squared() < max_dist_sq {
                    p_neighs.push(j as u32);
                }
            }
        });
    }

    fn build_grid(&mut self, positions: &[V2], support_radius: FT) {
        if positions.is_empty() {
            return;
        }

        let mut domain_min = positions[0];
        let mut domain_max = positions[0];
        for position in positions {
            domain_min.x = FT::min(domain_min.x, position.x);
            domain_min.y = FT::min(domain_min.y, position.y);
            domain_max.x = FT::max(domain_max.x, position.x);
            domain_max.y = FT::max(domain_max.y, position.y);
        }

        let cells_min = (
            (domain_min.x / support_radius).floor() as i32 - 1,
            (domain_min.y / support_radius).floor() as i32 - 1,
        );
        let cells_max = (
            (domain_max.x / support_radius).floor() as i32 + 2,
            (domain_max.y / support_radius).floor() as i32 + 2,
        );

        let mut grid = CellGrid::new(
            cells_min,
            (
                (cells_max.0 - cells_min.0) as usize,
                (cells_max.1 - cells_min.1) as usize,
            ),
        );

        for (particle_id, position) in positions.iter().enumerate() {
            grid.get_mut(particle_to_cell(*position, support_radius))
                .particle_ids
                .push(particle_id);
        }

        let max_dist_sq = support_radius * support_radius;

        par_iter_mut1(&mut self.neighs, |particle_id, p_neighs| {
            p_neighs.clear();

            let this_position = positions[particle_id];
            let particle_cell = particle_to_cell(this_position, support_radius);

            for offset_y in -1..=1 {
                for offset_x in -1..=1 {
                    let cell_pos = (particle_cell.0 + offset_x, particle_cell.1 + offset_y);
                    if cell_pos.0 < cells_min.0
                        || cell_pos.0 >= cells_max.0
                        || cell_pos.1 < cells_min.1
                        || cell_pos.1 >= cells_max.1
                    {
                        continue;
                    }

                    for &neigh_id in &grid.get(cell_pos).particle_ids {
                        if (positions[neigh_id] - this_position).norm_squared() >= max_dist_sq {
                            continue;
                        }

                        if p_neighs.len() == MAX_NEIGHBOR_COUNT {
                            panic!("exceeded maximum allowed number of {} neighbors", MAX_NEIGHBOR_COUNT);
                        }
                        p_neighs.push(neigh_id as u32);
                    }
                }
            }
        });
    }
}

fn particle_to_cell(position: V2, cell_size: FT) -> (i32, i32) {
    (
        (position.x / cell_size).floor() as i32,
        (position.y / cell_size).floor() as i32,
    )
}

struct Cell {
    particle_ids: Vec<usize>,
}

struct CellGrid {
    grid_min: (i32, i32),
    size: (usize, usize),
    cells: Vec<Cell>,
}

impl CellGrid {
    fn new(grid_min: (i32, i32), size: (usize, usize)) -> CellGrid {
        CellGrid {
            grid_min,
            size,
            cells: (0..size.0 * size.1).map(|_| Cell { particle_ids: Vec::new() }).collect(),
        }
    }

    fn pos_to_idx(&self, cell_pos: (i32, i32)) -> usize {
        let x = cell_pos.0 - self.grid_min.0;
        let y = cell_pos.1 - self.grid_min.1;
        assert!(0 <= x && (x as usize) < self.size.0);
        assert!(0 <= y && (y as usize) < self.size.1);
        y as usize * self.size.0 + x as usize
    }

    fn get(&self, cell_pos: (i32, i32)) -> &Cell {
        let idx = self.pos_to_idx(cell_pos);
        self.cells
            .get(idx)
            .expect("out-of-bounds access should have been catched before")
    }

    fn get_mut(&mut self, cell_pos: (i32, i32)) -> &mut Cell {
        let idx = self.pos_to_idx(cell_pos);
        self.cells
            .get_mut(idx)
            .expect("out-of-bounds access should have been catched before")
    }
}

#[cfg(test)]
fn jittered_lattice(n_x: usize, n_y: usize, spacing: FT) -> Vec<V2> {
    use crate::vec2f;

    // deterministic jitter, no RNG needed
    let mut positions = Vec::new();
    for y in 0..n_y {
        for x in 0..n_x {
            let jx = 0.31 * ((x * 7 + y * 13) as FT).sin();
            let jy = 0.27 * ((x * 3 + y * 5) as FT).cos();
            positions.push(vec2f(
                (x as FT + 0.5 * jx) * spacing,
                (y as FT + 0.5 * jy) * spacing,
            ));
        }
    }
    positions
}

#[test]
fn grid_and_brute_force_find_identical_neighbors() {
    let positions = jittered_lattice(12, 9, 0.005);
    let support_radius: FT = 0.02;

    let mut brute = NeighborhoodCache::new(positions.len());
    brute.build(NeighborhoodSearchAlgorithm::BruteForce, &positions, support_radius);

    let mut grid = NeighborhoodCache::new(positions.len());
    grid.build(NeighborhoodSearchAlgorithm::Grid, &positions, support_radius);

    for i in 0..positions.len() {
        let mut a: Vec<usize> = brute.iter(i).collect();
        let mut b: Vec<usize> = grid.iter(i).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b, "neighbor membership differs for particle {}", i);
    }
}

#[test]
fn every_particle_is_its_own_neighbor() {
    let positions = jittered_lattice(6, 6, 0.005);
    let mut neighs = NeighborhoodCache::new(positions.len());
    neighs.build(NeighborhoodSearchAlgorithm::Grid, &positions, 0.02);

    for i in 0..positions.len() {
        assert!(neighs.iter(i).any(|j| j == i));
    }
}

#[test]
fn empty_particle_set_builds_empty_cache() {
    let mut neighs = NeighborhoodCache::new(0);
    neighs.build(NeighborhoodSearchAlgorithm::Grid, &[], 0.02);
    assert_eq!(neighs.len(), 0);
    neighs.build(NeighborhoodSearchAlgorithm::BruteForce, &[], 0.02);
    assert_eq!(neighs.len(), 0);
}
