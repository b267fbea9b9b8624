use serde::Serialize;

use crate::{
    coupling::SphDemCoupler,
    dem::{DemSolver, GrainParticles, GranularModel},
    floating_type_mod::{FT, PI},
    integrator::VerletIntegrator,
    measurements::Measurements,
    simulation_parameters::{ConfigError, SimulationConfig},
    sph::{FluidParticles, SphSolver},
    tank::TankGeometry,
    vec2f,
};

#[cfg(test)]
use crate::V2;

/**
 * The coupled sloshing simulation: a WCSPH fluid and a DEM granular damper
 * bed inside a swaying rigid tank.
 *
 * Particle positions live in the global (inertial) frame. The tank sway
 * enters the fluid as a pseudo-force opposing the frame acceleration and
 * the grains as the equivalent frame acceleration term, so neither phase
 * is ever integrated in the moving frame itself.
 */
pub struct Simulation {
    config: SimulationConfig,
    tank: TankGeometry,

    sph_solver: SphSolver,
    dem_solver: DemSolver,
    coupler: SphDemCoupler,
    integrator: VerletIntegrator,
    measurements: Measurements,

    fluid: FluidParticles,
    grains: GrainParticles,

    time: FT,
    step_number: usize,
    initialized: bool,
}

/// Plain-data view of the simulation state for serialization, shaped for
/// periodic polling: step index, clock, the latest sampled diagnostics and
/// the particle positions.
#[derive(Serialize)]
pub struct Snapshot {
    pub step: usize,
    pub time: FT,
    pub wall_pressure: FT,
    pub free_surface_height: FT,
    pub kinetic_energy: FT,
    pub tank_displacement: FT,
    pub fluid: Vec<FluidSample>,
    pub grains: Vec<GrainSample>,
}

#[derive(Serialize)]
pub struct FluidSample {
    pub x: FT,
    pub y: FT,
}

#[derive(Serialize)]
pub struct GrainSample {
    pub x: FT,
    pub y: FT,
    pub r: FT,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let tank = TankGeometry::new(config.tank_width, config.tank_height, config.amplitude, config.frequency);

        Ok(Simulation {
            sph_solver: SphSolver::new(&config),
            dem_solver: DemSolver::new(&config),
            coupler: SphDemCoupler::new(&config),
            integrator: VerletIntegrator::new(config.time_step),
            measurements: Measurements::new(config.support_radius()),
            tank,
            fluid: FluidParticles::new(),
            grains: GrainParticles::new(),
            time: 0.,
            step_number: 0,
            initialized: false,
            config,
        })
    }

    /// Seed both particle phases on regular lattices. Calling this twice
    /// is a no-op; particle counts never change after initialization.
    pub fn initialize(&mut self) -> (usize, usize) {
        if self.initialized {
            return (self.fluid.len(), self.grains.len());
        }

        self.initialize_fluid();
        if self.config.enable_damper {
            self.initialize_damper();
        }
        self.initialized = true;

        (self.fluid.len(), self.grains.len())
    }

    /// Square lattice of fluid particles filling the tank from the bottom
    /// up to `fill_ratio` of its height. Per-particle mass is chosen so the
    /// lattice reproduces the rest density exactly.
    fn initialize_fluid(&mut self) {
        let spacing = self.config.particle_spacing;
        let mass = self.config.rest_density * spacing * spacing;
        let fill_height = self.tank.min_y() + self.config.tank_height * self.config.fill_ratio;

        let mut y = self.tank.min_y() + spacing / 2.;
        while y < fill_height {
            let mut x = self.tank.min_x() + spacing / 2.;
            while x < self.tank.max_x() {
                self.fluid
                    .push(vec2f(x, y), mass, self.config.smoothing_length, self.config.rest_density);
                x += spacing;
            }
            y += spacing;
        }
    }

    /// Grain bed at the tank bottom. The grain count is set by the damper
    /// mass ratio relative to the total fluid mass; the lattice stops early
    /// when the configured bed height cannot hold that many grains.
    fn initialize_damper(&mut self) {
        let radius = self.config.particle_diameter / 2.;
        let grain_mass = PI * radius * radius * self.config.particle_density;
        let target_count = (self.fluid.total_mass() * self.config.damper_mass_ratio / grain_mass) as usize;

        let spacing = self.config.particle_diameter * 1.1;
        let bed_top = self.tank.min_y() + self.config.damper_height;

        let mut count = 0;
        let mut y = self.tank.min_y() + radius;
        while y < bed_top && count < target_count {
            let mut x = self.tank.min_x() + radius + (spacing - self.config.particle_diameter);
            while x < self.tank.max_x() - radius && count < target_count {
                self.grains
                    .push(vec2f(x, y), radius, self.config.particle_density, &self.config);
                count += 1;
                x += spacing;
            }
            y += spacing;
        }
    }

    /// One full time step of the coupled system.
    pub fn step(&mut self) {
        self.tank.update_motion(self.time);

        self.fluid.reset_forces();
        self.grains.reset_forces();

        self.sph_solver.step(&mut self.fluid);
        self.apply_sway_pseudo_force();

        self.dem_solver.compute_contacts(&mut self.grains);
        self.dem_solver.compute_wall_contacts(&mut self.grains, &self.tank);
        self.coupler.compute_forces(&self.fluid, &mut self.grains);

        self.integrator.integrate_fluid(&mut self.fluid, self.config.gravity);
        let frame_acceleration = self.config.gravity + vec2f(-self.tank.acceleration(), 0.);
        self.integrator.integrate_grains(&mut self.grains, frame_acceleration);

        self.apply_boundary_conditions();

        if self.step_number % self.config.output_interval == 0 {
            self.measurements.sample(self.time, &self.fluid, &self.grains, &self.tank);
        }

        self.time += self.config.time_step;
        self.step_number += 1;
    }

    /// The horizontal sway enters the fluid momentum equation as the
    /// pseudo-force F = -m a_tank in the tank frame.
    fn apply_sway_pseudo_force(&mut self) {
        let tank_acceleration = self.tank.acceleration();
        let FluidParticles {
            external_force, mass, ..
        } = &mut self.fluid;

        for i in 0..external_force.len() {
            external_force[i] = vec2f(-mass[i] * tank_acceleration, 0.);
        }
    }

    /// Clamp fluid particles to the tank interior in the local frame and
    /// reflect the offending velocity component with half its magnitude.
    fn apply_boundary_conditions(&mut self) {
        let tank = &self.tank;
        let FluidParticles {
            position, velocity, ..
        } = &mut self.fluid;

        for i in 0..position.len() {
            let mut local = tank.global_to_local(position[i]);

            if local.x < tank.min_x() {
                local.x = tank.min_x();
                velocity[i].x *= -0.5;
            } else if local.x > tank.max_x() {
                local.x = tank.max_x();
                velocity[i].x *= -0.5;
            }

            if local.y < tank.min_y() {
                local.y = tank.min_y();
                velocity[i].y *= -0.5;
            } else if local.y > tank.max_y() {
                local.y = tank.max_y();
                velocity[i].y *= -0.5;
            }

            position[i] = tank.local_to_global(local);
        }
    }

    /// Run from t = 0 to `total_time`, reporting progress roughly twenty
    /// times along the way.
    pub fn run(&mut self) {
        let (num_fluid, num_grains) = self.initialize();
        println!("initialized {} fluid particles, {} grains", num_fluid, num_grains);

        let total_steps = (self.config.total_time / self.config.time_step).round() as usize;
        let report_interval = usize::max(total_steps / 20, 1);

        for _ in 0..total_steps {
            self.step();

            if self.step_number % report_interval == 0 {
                println!(
                    "t = {:.3} s ({:3.0} %), max kinetic energy {:.6} J, dissipated {:.6} J",
                    self.time,
                    100. * self.step_number as FT / total_steps as FT,
                    self.measurements.max_kinetic_energy(),
                    self.dem_solver.total_dissipated_energy()
                );
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            step: self.step_number,
            time: self.time,
            wall_pressure: self.measurements.last_wall_pressure(),
            free_surface_height: self.measurements.last_free_surface_height(),
            kinetic_energy: self.measurements.last_kinetic_energy(),
            tank_displacement: self.tank.displacement(),
            fluid: self
                .fluid
                .position
                .iter()
                .map(|p| FluidSample { x: p.x, y: p.y })
                .collect(),
            grains: (0..self.grains.len())
                .map(|i| GrainSample {
                    x: self.grains.position[i].x,
                    y: self.grains.position[i].y,
                    r: self.grains.radius[i],
                })
                .collect(),
        }
    }

    pub fn fluid(&self) -> &FluidParticles {
        &self.fluid
    }

    pub fn grains(&self) -> &GrainParticles {
        &self.grains
    }

    pub fn tank(&self) -> &TankGeometry {
        &self.tank
    }

    pub fn measurements(&self) -> &Measurements {
        &self.measurements
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn time(&self) -> FT {
        self.time
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }
}

#[cfg(test)]
fn small_test_config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.tank_width = 0.1;
    config.tank_height = 0.1;
    config.fill_ratio = 0.5;
    config.damper_height = 0.02;
    config
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let mut config = SimulationConfig::default();
    config.time_step = -1.;
    assert!(Simulation::new(config).is_err());
}

#[test]
fn initialization_is_idempotent() {
    let mut sim = Simulation::new(small_test_config()).unwrap();
    let first = sim.initialize();
    let second = sim.initialize();
    assert_eq!(first, second);
    assert!(first.0 > 0);
    assert!(first.1 > 0);
}

#[test]
fn fluid_lattice_has_the_expected_particle_count() {
    let config = small_test_config();
    let mut sim = Simulation::new(config.clone()).unwrap();
    let (num_fluid, _) = sim.initialize();

    let per_row = (config.tank_width / config.particle_spacing).round() as usize;
    let rows = (config.tank_height * config.fill_ratio / config.particle_spacing).round() as usize;
    assert_eq!(num_fluid, per_row * rows);

    // every particle starts inside the tank
    for position in &sim.fluid().position {
        assert!(sim.tank().is_inside(*position));
    }
}

#[test]
fn damper_bed_mass_matches_the_configured_ratio() {
    let config = small_test_config();
    let mut sim = Simulation::new(config.clone()).unwrap();
    sim.initialize();

    let grain_mass = sim.grains().mass[0];
    let target_mass = sim.fluid().total_mass() * config.damper_mass_ratio;
    assert!(sim.grains().total_mass() <= target_mass + 1e-9);
    assert!(sim.grains().total_mass() > target_mass - grain_mass - 1e-9);
}

impl FluidParticles {
    fn total_mass(&self) -> FT {
        self.mass.iter().sum()
    }
}

#[test]
fn empty_fluid_configuration_steps_without_panicking() {
    let mut config = small_test_config();
    // fill height below half a particle spacing: the lattice stays empty
    config.fill_ratio = 1e-6;
    config.enable_damper = false;
    config.output_interval = 1;

    let mut sim = Simulation::new(config).unwrap();
    sim.initialize();
    assert_eq!(sim.fluid().len(), 0);

    for _ in 0..5 {
        sim.step();
    }

    // diagnostics still produce aligned zero-valued rows
    assert_eq!(sim.measurements().num_samples(), 5);
    assert_eq!(sim.measurements().max_kinetic_energy(), 0.);
}

#[test]
fn time_advances_by_one_time_step_per_step() {
    let mut config = small_test_config();
    config.enable_damper = false;
    let dt = config.time_step;

    let mut sim = Simulation::new(config).unwrap();
    sim.initialize();

    for expected_step in 0..3 {
        assert_eq!(sim.step_number(), expected_step);
        assert!((sim.time() - expected_step as FT * dt).abs() < 1e-12);
        sim.step();
    }
}

#[test]
fn zero_amplitude_sway_produces_no_pseudo_force() {
    let mut config = small_test_config();
    config.amplitude = 0.;
    config.enable_damper = false;

    let mut sim = Simulation::new(config).unwrap();
    sim.initialize();
    for _ in 0..3 {
        sim.step();
    }

    assert_eq!(sim.tank().displacement(), 0.);
    for force in &sim.fluid().external_force {
        assert_eq!(*force, V2::zeros());
    }
}

#[test]
fn snapshot_mirrors_the_particle_state() {
    let mut sim = Simulation::new(small_test_config()).unwrap();
    sim.initialize();
    sim.step();

    let snapshot = sim.snapshot();
    assert_eq!(snapshot.fluid.len(), sim.fluid().len());
    assert_eq!(snapshot.grains.len(), sim.grains().len());
    assert_eq!(snapshot.time, sim.time());
    assert_eq!(snapshot.step, sim.step_number());
    assert!(snapshot.grains.iter().all(|g| g.r > 0.));
    // the first step samples the diagnostics, so the snapshot carries them
    assert!(snapshot.kinetic_energy >= 0.);
}
