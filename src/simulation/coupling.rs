use crate::{
    concurrency::par_iter_mut1,
    dem::GrainParticles,
    floating_type_mod::{FT, PI},
    simulation_parameters::SimulationConfig,
    sph::FluidParticles,
    V2,
};

const DRAG_COEFF: FT = 0.5;

/**
 * One-way fluid-to-grain interaction: buoyancy from the locally averaged
 * fluid density and quadratic drag against the locally averaged fluid
 * velocity. The fluid feels no reaction force.
 *
 * Each grain gathers fluid particles within radius + 2h of its center by a
 * plain scan over the fluid. Grain counts are two orders of magnitude below
 * fluid counts, so a dedicated search structure buys nothing here.
 */
pub struct SphDemCoupler {
    support_radius: FT,
    gravity: V2,
}

impl SphDemCoupler {
    pub fn new(config: &SimulationConfig) -> Self {
        SphDemCoupler {
            support_radius: config.support_radius(),
            gravity: config.gravity,
        }
    }

    pub fn compute_forces(&self, fluid: &FluidParticles, grains: &mut GrainParticles) {
        let GrainParticles {
            position: grain_position,
            velocity: grain_velocity,
            radius: grain_radius,
            fluid_force,
            ..
        } = grains;

        let support_radius = self.support_radius;
        let gravity = self.gravity;

        par_iter_mut1(fluid_force, |i, force_i| {
            let search_radius = grain_radius[i] + support_radius;
            let search_radius_sq = search_radius * search_radius;

            let mut count = 0usize;
            let mut density_sum: FT = 0.;
            let mut velocity_sum = V2::zeros();
            for j in 0..fluid.len() {
                if (fluid.position[j] - grain_position[i]).norm_squared() < search_radius_sq {
                    count += 1;
                    density_sum += fluid.density[j];
                    velocity_sum += fluid.velocity[j];
                }
            }

            // a dry grain feels no fluid force at all
            if count == 0 {
                *force_i = V2::zeros();
                return;
            }

            let density_avg = density_sum / count as FT;
            let velocity_avg = velocity_sum / count as FT;

            let cross_section = PI * grain_radius[i] * grain_radius[i];
            let buoyancy = -gravity * density_avg * cross_section;

            let relative_velocity = grain_velocity[i] - velocity_avg;
            let drag = -DRAG_COEFF * relative_velocity * relative_velocity.norm() * grain_radius[i];

            *force_i = buoyancy + drag;
        });
    }
}

#[cfg(test)]
use crate::vec2f;

#[cfg(test)]
fn submerged_setup() -> (SimulationConfig, FluidParticles, GrainParticles) {
    let config = SimulationConfig::default();
    let mass = config.rest_density * config.particle_spacing * config.particle_spacing;

    // small fluid block around the origin
    let mut fluid = FluidParticles::new();
    for y in -2..=2 {
        for x in -2..=2 {
            fluid.push(
                vec2f(x as FT * config.particle_spacing, y as FT * config.particle_spacing),
                mass,
                config.smoothing_length,
                config.rest_density,
            );
        }
    }

    let mut grains = GrainParticles::new();
    grains.push(vec2f(0., 0.), 0.5 * config.particle_diameter, config.particle_density, &config);
    (config, fluid, grains)
}

#[test]
fn grain_outside_the_fluid_feels_no_force() {
    let (config, fluid, mut grains) = submerged_setup();
    grains.position[0] = vec2f(10., 10.);

    SphDemCoupler::new(&config).compute_forces(&fluid, &mut grains);
    assert_eq!(grains.fluid_force[0], V2::zeros());
}

#[test]
fn submerged_resting_grain_feels_buoyancy_only() {
    let (config, fluid, mut grains) = submerged_setup();

    SphDemCoupler::new(&config).compute_forces(&fluid, &mut grains);

    let force = grains.fluid_force[0];
    // gravity points down, buoyancy must point up
    assert!(force.y > 0.);
    assert!(force.x.abs() < 1e-10);

    let r = grains.radius[0];
    let expected = 9.81 * config.rest_density * PI * r * r;
    assert!((force.y - expected).abs() < expected * 1e-6);
}

#[test]
fn drag_opposes_relative_motion() {
    let (config, fluid, mut grains) = submerged_setup();
    grains.velocity[0] = vec2f(2., 0.);

    SphDemCoupler::new(&config).compute_forces(&fluid, &mut grains);

    // the fluid is at rest, so drag acts against the grain velocity
    assert!(grains.fluid_force[0].x < 0.);
}
