use crate::{
    concurrency::{par_iter_mut1, par_iter_mut4},
    floating_type_mod::FT,
    neighborhood_search::NeighborhoodCache,
    simulation_parameters::{NeighborhoodSearchAlgorithm, SimulationConfig},
    sph_kernels::{wendland_grad_w, wendland_laplacian_w, wendland_w},
    V2,
};

/// Fluid particle attributes, stored structure-of-arrays.
///
/// The set is filled once during initialization and its length never
/// changes afterwards. Force accumulators are transient per-step values.
pub struct FluidParticles {
    pub position: Vec<V2>,
    pub velocity: Vec<V2>,
    pub acceleration: Vec<V2>,
    pub mass: Vec<FT>,
    pub smoothing_length: Vec<FT>,
    pub density: Vec<FT>,
    pub pressure: Vec<FT>,

    pub pressure_force: Vec<V2>,
    pub viscosity_force: Vec<V2>,
    pub external_force: Vec<V2>,
}

impl FluidParticles {
    pub fn new() -> Self {
        FluidParticles {
            position: Vec::new(),
            velocity: Vec::new(),
            acceleration: Vec::new(),
            mass: Vec::new(),
            smoothing_length: Vec::new(),
            density: Vec::new(),
            pressure: Vec::new(),
            pressure_force: Vec::new(),
            viscosity_force: Vec::new(),
            external_force: Vec::new(),
        }
    }

    pub fn push(&mut self, position: V2, mass: FT, smoothing_length: FT, rest_density: FT) {
        assert!(mass > 0.);
        self.position.push(position);
        self.velocity.push(V2::zeros());
        self.acceleration.push(V2::zeros());
        self.mass.push(mass);
        self.smoothing_length.push(smoothing_length);
        self.density.push(rest_density);
        self.pressure.push(0.);
        self.pressure_force.push(V2::zeros());
        self.viscosity_force.push(V2::zeros());
        self.external_force.push(V2::zeros());
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    pub fn reset_forces(&mut self) {
        par_iter_mut4(
            &mut self.pressure_force,
            &mut self.viscosity_force,
            &mut self.external_force,
            &mut self.acceleration,
            |_, f_pressure, f_viscosity, f_external, acceleration| {
                *f_pressure = V2::zeros();
                *f_viscosity = V2::zeros();
                *f_external = V2::zeros();
                *acceleration = V2::zeros();
            },
        );
    }
}

/**
 * WCSPH solver: density summation, Tait equation of state, symmetric
 * pressure gradient and Morris viscosity.
 *
 * The four phases must run in exactly this order since each one consumes
 * the previous phase's output.
 */
pub struct SphSolver {
    h: FT,
    support_radius: FT,
    rest_density: FT,
    stiffness: FT,
    viscosity: FT,
    algorithm: NeighborhoodSearchAlgorithm,
    neighs: NeighborhoodCache,
}

const TAIT_GAMMA: i32 = 7;

impl SphSolver {
    pub fn new(config: &SimulationConfig) -> Self {
        SphSolver {
            h: config.smoothing_length,
            support_radius: config.support_radius(),
            rest_density: config.rest_density,
            stiffness: config.stiffness,
            viscosity: config.viscosity,
            algorithm: config.neighborhood_search_algorithm,
            neighs: NeighborhoodCache::new(0),
        }
    }

    /// Full SPH pass: neighbors, density, pressure, pressure force,
    /// viscosity force.
    pub fn step(&mut self, particles: &mut FluidParticles) {
        self.neighs.build(self.algorithm, &particles.position, self.support_radius);

        Self::compute_density(
            &self.neighs,
            self.h,
            self.rest_density,
            &particles.position,
            &particles.mass,
            &mut particles.density,
        );
        Self::compute_pressure(
            self.stiffness,
            self.rest_density,
            &particles.density,
            &mut particles.pressure,
        );
        Self::compute_pressure_force(
            &self.neighs,
            self.h,
            &particles.position,
            &particles.mass,
            &particles.density,
            &particles.pressure,
            &mut particles.pressure_force,
        );
        Self::compute_viscosity_force(
            &self.neighs,
            self.h,
            self.viscosity,
            &particles.position,
            &particles.velocity,
            &particles.mass,
            &particles.density,
            &mut particles.viscosity_force,
        );
    }

    /// rho_i = sum_j m_j W(|x_i - x_j|, h), floored at the rest density.
    fn compute_density(
        neighs: &NeighborhoodCache,
        h: FT,
        rest_density: FT,
        position: &[V2],
        mass: &[FT],
        density: &mut [FT],
    ) {
        par_iter_mut1(density, |i, density_i| {
            let mut sum: FT = 0.;
            for j in neighs.iter(i) {
                let r = (position[i] - position[j]).norm();
                sum += mass[j] * wendland_w(r, h);
            }

            // clamp below to avoid non-physical rarefaction
            *density_i = FT::max(sum, rest_density);
        });
    }

    /// Tait / WCSPH equation of state: p = B ((rho/rho_0)^7 - 1).
    fn compute_pressure(stiffness: FT, rest_density: FT, density: &[FT], pressure: &mut [FT]) {
        par_iter_mut1(pressure, |i, pressure_i| {
            let ratio = density[i] / rest_density;
            *pressure_i = stiffness * (ratio.powi(TAIT_GAMMA) - 1.);
        });
    }

    /// Symmetric SPH pressure gradient estimator:
    /// F_i = -m_i sum_j m_j (p_i/rho_i^2 + p_j/rho_j^2) gradW e_ij
    fn compute_pressure_force(
        neighs: &NeighborhoodCache,
        h: FT,
        position: &[V2],
        mass: &[FT],
        density: &[FT],
        pressure: &[FT],
        pressure_force: &mut [V2],
    ) {
        par_iter_mut1(pressure_force, |i, force_i| {
            let mut force = V2::zeros();
            for j in neighs.iter(i) {
                if j == i {
                    continue;
                }

                let x_ij = position[i] - position[j];
                let r = x_ij.norm();
                if r < 1e-12 {
                    continue;
                }

                let grad = wendland_grad_w(r, h);
                let direction = x_ij / r;
                let pressure_term =
                    pressure[i] / (density[i] * density[i]) + pressure[j] / (density[j] * density[j]);

                force += -mass[j] * pressure_term * grad * direction;
            }

            *force_i = mass[i] * force;
        });
    }

    /// Morris et al. 1997 viscosity:
    /// F_i = mu m_i sum_j m_j (v_j - v_i) / rho_j laplacianW
    fn compute_viscosity_force(
        neighs: &NeighborhoodCache,
        h: FT,
        viscosity: FT,
        position: &[V2],
        velocity: &[V2],
        mass: &[FT],
        density: &[FT],
        viscosity_force: &mut [V2],
    ) {
        par_iter_mut1(viscosity_force, |i, force_i| {
            let mut force = V2::zeros();
            for j in neighs.iter(i) {
                if j == i {
                    continue;
                }

                let r = (position[i] - position[j]).norm();
                let laplacian = wendland_laplacian_w(r, h);
                force += mass[j] * (velocity[j] - velocity[i]) / density[j] * laplacian;
            }

            *force_i = viscosity * mass[i] * force;
        });
    }
}

#[cfg(test)]
use crate::vec2f;

#[test]
fn isolated_particle_density_floors_at_rest_density() {
    let config = SimulationConfig::default();
    let mut solver = SphSolver::new(&config);

    let mut particles = FluidParticles::new();
    particles.push(vec2f(0., 0.), 0.025, config.smoothing_length, config.rest_density);

    solver.step(&mut particles);

    // a single particle only sees its own kernel contribution, which is
    // far below the rest density
    assert_eq!(particles.density[0], config.rest_density);
    // density ratio 1 => pressure exactly 0
    assert_eq!(particles.pressure[0], 0.);
    assert_eq!(particles.pressure_force[0], V2::zeros());
    assert_eq!(particles.viscosity_force[0], V2::zeros());
}

#[test]
fn pressure_forces_are_pairwise_antisymmetric() {
    let config = SimulationConfig::default();
    let mut solver = SphSolver::new(&config);

    // 5x5 lattice compressed to half the rest spacing, centered on the
    // origin, so densities rise well above the rest density
    let mut particles = FluidParticles::new();
    let spacing = config.particle_spacing * 0.5;
    let mass = config.rest_density * config.particle_spacing * config.particle_spacing;
    for y in -2..=2 {
        for x in -2..=2 {
            particles.push(
                vec2f(x as FT * spacing, y as FT * spacing),
                mass,
                config.smoothing_length,
                config.rest_density,
            );
        }
    }

    solver.step(&mut particles);

    let center = 12;
    assert!(particles.density[center] > config.rest_density);
    assert!(particles.pressure[center] > 0.);

    // corners mirrored through the origin see mirrored neighborhoods, so
    // their forces must be equal and opposite
    let f0 = particles.pressure_force[0];
    let f1 = particles.pressure_force[24];
    assert!(f0.norm() > 0.);
    assert!((f0 + f1).norm() < f0.norm() * 1e-3);
    // the compressed cluster pushes its corners outward
    assert!(f0.x < 0. && f0.y < 0.);
    assert!(f1.x > 0. && f1.y > 0.);
}

#[test]
fn viscosity_force_opposes_velocity_difference() {
    let config = SimulationConfig::default();
    let mut solver = SphSolver::new(&config);

    let mass = config.rest_density * config.particle_spacing * config.particle_spacing;
    let mut particles = FluidParticles::new();
    particles.push(vec2f(0., 0.), mass, config.smoothing_length, config.rest_density);
    // q = r/h = 0.25, well inside the positive lobe of the laplacian
    particles.push(
        vec2f(0.25 * config.smoothing_length, 0.),
        mass,
        config.smoothing_length,
        config.rest_density,
    );
    particles.velocity[1] = vec2f(1., 0.);

    solver.step(&mut particles);

    // particle 0 is dragged towards its faster neighbor
    assert!(particles.viscosity_force[0].x > 0.);
    assert!(particles.viscosity_force[1].x < 0.);
}

#[test]
fn empty_fluid_set_is_a_no_op() {
    let config = SimulationConfig::default();
    let mut solver = SphSolver::new(&config);
    let mut particles = FluidParticles::new();
    solver.step(&mut particles);
    assert!(particles.is_empty());
}
