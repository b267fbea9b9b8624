use std::collections::HashMap;

use crate::{
    concurrency::par_iter_mut3,
    floating_type_mod::{FT, PI},
    normalized_or_zero,
    simulation_parameters::SimulationConfig,
    tank::TankGeometry,
    vec2f, V2,
};

// simplified wall contact: linear spring-damper, normal only
const WALL_STIFFNESS: FT = 1e5;
const WALL_DAMPING: FT = 100.;

const DISTANCE_EPS: FT = 1e-12;
const TANGENT_SPEED_EPS: FT = 1e-6;

/// Grain attributes, stored structure-of-arrays. Mass and rotational
/// inertia follow from radius and material density at creation:
/// m = pi r^2 rho (per unit depth), I = m r^2 / 2 (disk).
pub struct GrainParticles {
    pub position: Vec<V2>,
    pub velocity: Vec<V2>,
    pub acceleration: Vec<V2>,
    pub angular_velocity: Vec<FT>,
    pub angular_acceleration: Vec<FT>,

    pub radius: Vec<FT>,
    pub mass: Vec<FT>,
    pub inertia: Vec<FT>,

    pub youngs_modulus: Vec<FT>,
    pub poisson_ratio: Vec<FT>,
    pub restitution_coeff: Vec<FT>,
    pub friction_coeff: Vec<FT>,

    pub contact_force: Vec<V2>,
    pub fluid_force: Vec<V2>,
    pub contact_torque: Vec<FT>,
}

impl GrainParticles {
    pub fn new() -> Self {
        GrainParticles {
            position: Vec::new(),
            velocity: Vec::new(),
            acceleration: Vec::new(),
            angular_velocity: Vec::new(),
            angular_acceleration: Vec::new(),
            radius: Vec::new(),
            mass: Vec::new(),
            inertia: Vec::new(),
            youngs_modulus: Vec::new(),
            poisson_ratio: Vec::new(),
            restitution_coeff: Vec::new(),
            friction_coeff: Vec::new(),
            contact_force: Vec::new(),
            fluid_force: Vec::new(),
            contact_torque: Vec::new(),
        }
    }

    pub fn push(&mut self, position: V2, radius: FT, density: FT, config: &SimulationConfig) {
        assert!(radius > 0. && density > 0.);

        let mass = PI * radius * radius * density;
        self.position.push(position);
        self.velocity.push(V2::zeros());
        self.acceleration.push(V2::zeros());
        self.angular_velocity.push(0.);
        self.angular_acceleration.push(0.);
        self.radius.push(radius);
        self.mass.push(mass);
        self.inertia.push(0.5 * mass * radius * radius);
        self.youngs_modulus.push(config.youngs_modulus);
        self.poisson_ratio.push(config.poisson_ratio);
        self.restitution_coeff.push(config.restitution_coeff);
        self.friction_coeff.push(config.friction_coeff);
        self.contact_force.push(V2::zeros());
        self.fluid_force.push(V2::zeros());
        self.contact_torque.push(0.);
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    pub fn reset_forces(&mut self) {
        par_iter_mut3(
            &mut self.contact_force,
            &mut self.fluid_force,
            &mut self.contact_torque,
            |_, f_contact, f_fluid, torque| {
                *f_contact = V2::zeros();
                *f_fluid = V2::zeros();
                *torque = 0.;
            },
        );
        self.acceleration.iter_mut().for_each(|a| *a = V2::zeros());
        self.angular_acceleration.iter_mut().for_each(|a| *a = 0.);
    }

    pub fn total_mass(&self) -> FT {
        self.mass.iter().sum()
    }
}

/// Accumulated tangential (shear) displacement per unordered contact pair,
/// owned by the solver. Entries are created lazily on first overlap and
/// pruned once the overlap ends.
pub struct ContactTable {
    entries: HashMap<(u32, u32), V2>,
}

impl ContactTable {
    fn new() -> Self {
        ContactTable {
            entries: HashMap::new(),
        }
    }

    fn key(i: usize, j: usize) -> (u32, u32) {
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        (a as u32, b as u32)
    }

    fn displacement_mut(&mut self, i: usize, j: usize) -> &mut V2 {
        self.entries.entry(Self::key(i, j)).or_insert_with(V2::zeros)
    }

    fn prune(&mut self, i: usize, j: usize) {
        self.entries.remove(&Self::key(i, j));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Contact-mechanics capability of the granular damper bed. Satisfied by
/// static dispatch; `DemSolver` is the single concrete implementation.
pub trait GranularModel {
    fn compute_contacts(&mut self, grains: &mut GrainParticles);
    fn compute_wall_contacts(&mut self, grains: &mut GrainParticles, tank: &TankGeometry);

    /// Contact damping work of the last `compute_contacts` call.
    fn last_step_dissipated_energy(&self) -> FT;
    fn total_dissipated_energy(&self) -> FT;
}

/**
 * Pairwise Hertzian contact with restitution-derived normal damping and
 * persistent stick-slip (Mindlin) friction.
 *
 * The pair loop writes to both particles of a contact, so it runs
 * sequentially; parallelizing it would need a force reduction.
 */
pub struct DemSolver {
    time_step: FT,
    contacts: ContactTable,
    last_step_dissipated_energy: FT,
    total_dissipated_energy: FT,
}

impl DemSolver {
    pub fn new(config: &SimulationConfig) -> Self {
        DemSolver {
            time_step: config.time_step,
            contacts: ContactTable::new(),
            last_step_dissipated_energy: 0.,
            total_dissipated_energy: 0.,
        }
    }

    pub fn contact_table(&self) -> &ContactTable {
        &self.contacts
    }

    fn process_contact(&mut self, grains: &mut GrainParticles, i: usize, j: usize, x_ij: V2, distance: FT, overlap: FT) {
        let normal = x_ij / distance;

        // effective parameters of the pair
        let r_eff = grains.radius[i] * grains.radius[j] / (grains.radius[i] + grains.radius[j]);
        let m_eff = grains.mass[i] * grains.mass[j] / (grains.mass[i] + grains.mass[j]);
        let nu_i = grains.poisson_ratio[i];
        let nu_j = grains.poisson_ratio[j];
        let e_eff = 1.
            / ((1. - nu_i * nu_i) / grains.youngs_modulus[i] + (1. - nu_j * nu_j) / grains.youngs_modulus[j]);

        // Hertz: F_el = k_n overlap^(3/2)
        let k_n = 4. / 3. * e_eff * r_eff.sqrt();
        let stiffness = k_n * overlap.sqrt();

        // normal damping from the averaged restitution coefficient
        let e = 0.5 * (grains.restitution_coeff[i] + grains.restitution_coeff[j]);
        let beta: FT = 5. / 6.;
        let ln_e = e.ln();
        let mut c_n = -2. * beta.sqrt() * ln_e / (ln_e * ln_e + PI * PI).sqrt();
        c_n *= 2. * (m_eff * stiffness).sqrt();

        let relative_velocity = grains.velocity[j] - grains.velocity[i];
        let normal_velocity = relative_velocity.dot(&normal);

        let f_n = stiffness * overlap + c_n * normal_velocity;
        let normal_force = f_n * normal;

        // persistent tangential displacement (stick-slip)
        let tangent = relative_velocity - normal_velocity * normal;
        let tangent_speed = tangent.norm();

        let mut friction_force = V2::zeros();
        if tangent_speed > TANGENT_SPEED_EPS {
            let displacement = self.contacts.displacement_mut(i, j);
            *displacement += tangent * self.time_step;

            let k_t = 0.5 * stiffness;
            let g_t = 0.5 * c_n;
            let mut f_t = -k_t * *displacement - g_t * tangent;

            // Coulomb limit: clamp the magnitude, keep the direction
            let mu = 0.5 * (grains.friction_coeff[i] + grains.friction_coeff[j]);
            let f_t_max = mu * f_n.abs();
            if f_t.norm() > f_t_max {
                f_t = normalized_or_zero(f_t) * f_t_max;
            }

            friction_force = f_t;
            self.last_step_dissipated_energy += (g_t * tangent.norm_squared() * self.time_step).abs();
        }

        // Newton's third law
        let total_force = normal_force + friction_force;
        grains.contact_force[i] -= total_force;
        grains.contact_force[j] += total_force;

        let torque = friction_force.norm() * grains.radius[i];
        grains.contact_torque[i] += torque;
        grains.contact_torque[j] -= torque;

        self.last_step_dissipated_energy += (c_n * normal_velocity * normal_velocity * self.time_step).abs();
    }

    fn apply_wall_force(grains: &mut GrainParticles, i: usize, normal: V2, overlap: FT) {
        let normal_velocity = grains.velocity[i].dot(&normal);
        let f_n = WALL_STIFFNESS * overlap - WALL_DAMPING * normal_velocity;
        grains.contact_force[i] += f_n * normal;
    }
}

impl GranularModel for DemSolver {
    fn compute_contacts(&mut self, grains: &mut GrainParticles) {
        self.last_step_dissipated_energy = 0.;

        let n = grains.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let x_ij = grains.position[j] - grains.position[i];
                let distance = x_ij.norm();
                let overlap = grains.radius[i] + grains.radius[j] - distance;

                if overlap > 0. {
                    if distance < DISTANCE_EPS {
                        // coincident centers: no meaningful contact normal
                        continue;
                    }
                    self.process_contact(grains, i, j, x_ij, distance, overlap);
                } else {
                    self.contacts.prune(i, j);
                }
            }
        }

        self.total_dissipated_energy += self.last_step_dissipated_energy;
    }

    /// Left, right and bottom wall in tank-local coordinates; the walls are
    /// infinite-mass, zero-velocity surfaces without tangential friction.
    fn compute_wall_contacts(&mut self, grains: &mut GrainParticles, tank: &TankGeometry) {
        for i in 0..grains.len() {
            let local = tank.global_to_local(grains.position[i]);
            let r = grains.radius[i];

            let overlap_left = r - (local.x - tank.min_x());
            if overlap_left > 0. {
                Self::apply_wall_force(grains, i, vec2f(1., 0.), overlap_left);
            }

            let overlap_right = r - (tank.max_x() - local.x);
            if overlap_right > 0. {
                Self::apply_wall_force(grains, i, vec2f(-1., 0.), overlap_right);
            }

            let overlap_bottom = r - (local.y - tank.min_y());
            if overlap_bottom > 0. {
                Self::apply_wall_force(grains, i, vec2f(0., 1.), overlap_bottom);
            }
        }
    }

    fn last_step_dissipated_energy(&self) -> FT {
        self.last_step_dissipated_energy
    }

    fn total_dissipated_energy(&self) -> FT {
        self.total_dissipated_energy
    }
}

#[cfg(test)]
mod dem_test_util {
    use super::*;

    pub fn two_grains(x0: V2, x1: V2, radius: FT) -> (GrainParticles, DemSolver, SimulationConfig) {
        let config = SimulationConfig::default();
        let mut grains = GrainParticles::new();
        grains.push(x0, radius, 1000., &config);
        grains.push(x1, radius, 1000., &config);
        let solver = DemSolver::new(&config);
        (grains, solver, config)
    }
}

#[cfg(test)]
use dem_test_util::two_grains;

#[test]
fn separated_grains_feel_no_contact_force() {
    let (mut grains, mut solver, _) = two_grains(vec2f(0., 0.), vec2f(2., 0.), 0.5);

    solver.compute_contacts(&mut grains);

    assert_eq!(grains.contact_force[0], V2::zeros());
    assert_eq!(grains.contact_force[1], V2::zeros());
    assert_eq!(grains.contact_torque[0], 0.);
}

#[test]
fn touching_grains_without_overlap_feel_no_force() {
    // distance exactly r_i + r_j: overlap = 0 is not a contact
    let (mut grains, mut solver, _) = two_grains(vec2f(0., 0.), vec2f(1., 0.), 0.5);
    solver.compute_contacts(&mut grains);
    assert_eq!(grains.contact_force[0], V2::zeros());
    assert_eq!(grains.contact_force[1], V2::zeros());
}

#[test]
fn overlapping_grains_repel_with_equal_and_opposite_forces() {
    let (mut grains, mut solver, _) = two_grains(vec2f(0., 0.), vec2f(0.9, 0.), 0.5);

    solver.compute_contacts(&mut grains);

    let f0 = grains.contact_force[0];
    let f1 = grains.contact_force[1];
    assert!(f0.norm() > 0.);
    assert!(f1.norm() > 0.);
    assert_eq!(f0, -f1);

    // grain 0 is pushed towards -x, grain 1 towards +x
    assert!(f0.x < 0.);
    assert!(f1.x > 0.);
}

#[test]
fn sliding_contact_obeys_newtons_third_law_with_friction() {
    let (mut grains, mut solver, _) = two_grains(vec2f(0., 0.), vec2f(0.9, 0.), 0.5);
    grains.velocity[1] = vec2f(0., 0.4);

    solver.compute_contacts(&mut grains);

    assert_eq!(grains.contact_force[0], -grains.contact_force[1]);
    // tangential motion produces friction and opposite torques
    assert!(grains.contact_force[0].y.abs() > 0.);
    assert_eq!(grains.contact_torque[0], -grains.contact_torque[1]);
    assert!(grains.contact_torque[0] != 0.);
    assert_eq!(solver.contact_table().len(), 1);
}

#[test]
fn friction_is_clamped_by_the_coulomb_limit() {
    let (mut grains, mut solver, _) = two_grains(vec2f(0., 0.), vec2f(0.9, 0.), 0.5);
    // extreme tangential speed so the accumulated displacement saturates
    grains.velocity[1] = vec2f(0., 100.);

    solver.compute_contacts(&mut grains);

    let total = grains.contact_force[1];
    let normal_part = total.x.abs();
    let tangent_part = total.y.abs();
    let mu = grains.friction_coeff[0];
    assert!(tangent_part <= mu * normal_part * (1. + 1e-4));
}

#[test]
fn contact_state_is_pruned_when_overlap_ends() {
    let (mut grains, mut solver, _) = two_grains(vec2f(0., 0.), vec2f(0.9, 0.), 0.5);
    grains.velocity[1] = vec2f(0., 0.4);

    solver.compute_contacts(&mut grains);
    assert_eq!(solver.contact_table().len(), 1);

    grains.position[1] = vec2f(3., 0.);
    grains.reset_forces();
    solver.compute_contacts(&mut grains);
    assert_eq!(solver.contact_table().len(), 0);
}

#[test]
fn wall_contact_pushes_grain_back_into_the_tank() {
    let config = SimulationConfig::default();
    let tank = TankGeometry::new(0.3, 0.4, 0., 0.6);
    let mut grains = GrainParticles::new();
    // grain centre closer to the left wall than its radius
    grains.push(vec2f(-0.149, 0.1), 0.0025, 2500., &config);
    let mut solver = DemSolver::new(&config);

    solver.compute_wall_contacts(&mut grains, &tank);
    assert!(grains.contact_force[0].x > 0.);
    assert_eq!(grains.contact_force[0].y, 0.);
}

#[test]
fn head_on_collision_dissipates_kinetic_energy() {
    use crate::integrator::VerletIntegrator;

    let (mut grains, mut solver, config) = two_grains(vec2f(-0.51, 0.), vec2f(0.51, 0.), 0.5);
    grains.velocity[0] = vec2f(0.1, 0.);
    grains.velocity[1] = vec2f(-0.1, 0.);

    let kinetic_energy = |grains: &GrainParticles| -> FT {
        (0..grains.len())
            .map(|i| 0.5 * grains.mass[i] * grains.velocity[i].norm_squared())
            .sum()
    };
    let initial_energy = kinetic_energy(&grains);

    let integrator = VerletIntegrator::new(config.time_step);
    let mut separated = false;
    for _ in 0..400_000 {
        grains.reset_forces();
        solver.compute_contacts(&mut grains);
        integrator.integrate_grains(&mut grains, V2::zeros());

        let distance = (grains.position[1] - grains.position[0]).norm();
        if solver.total_dissipated_energy() > 0. && distance > 1.02 {
            separated = true;
            break;
        }
    }

    assert!(separated, "grains never collided and separated again");
    let final_energy = kinetic_energy(&grains);
    assert!(
        final_energy < initial_energy,
        "restitution < 1 must dissipate energy: {} -> {}",
        initial_energy,
        final_energy
    );
    assert!(solver.total_dissipated_energy() > 0.);
}
