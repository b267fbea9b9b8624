use crate::{floating_type_mod::FT, vec2f, V2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration parameter '{name}' must be positive (got {value})")]
    NonPositive { name: &'static str, value: FT },

    #[error("configuration parameter '{name}' must lie in (0, 1] (got {value})")]
    OutOfUnitRange { name: &'static str, value: FT },

    #[error("output_interval must be at least 1")]
    ZeroOutputInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighborhoodSearchAlgorithm {
    // all-pairs scan, the accepted baseline at these particle counts
    BruteForce,
    // uniform cell grid with cell size = kernel support radius
    Grid,
}

/**
 * Immutable input record of all simulation tunables. Validated once before
 * any particle is created; the engine never mutates it.
 *
 * Defaults describe a 1:50 scale Aframax ballast tank driven at its first
 * sloshing resonance.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    // time integration
    pub time_step: FT,
    pub total_time: FT,
    // diagnostics are sampled every `output_interval` steps
    pub output_interval: usize,

    // tank geometry and fill level
    pub tank_width: FT,
    pub tank_height: FT,
    pub fill_ratio: FT,

    // prescribed sway motion
    pub amplitude: FT,
    pub frequency: FT,

    // SPH fluid
    pub smoothing_length: FT,
    pub particle_spacing: FT,
    pub rest_density: FT,
    pub stiffness: FT,
    pub viscosity: FT,
    pub neighborhood_search_algorithm: NeighborhoodSearchAlgorithm,

    // DEM damper bed
    pub enable_damper: bool,
    pub particle_diameter: FT,
    pub particle_density: FT,
    // grain mass as a fraction of the total fluid mass
    pub damper_mass_ratio: FT,
    pub damper_height: FT,

    // grain material
    pub youngs_modulus: FT,
    pub poisson_ratio: FT,
    pub restitution_coeff: FT,
    pub friction_coeff: FT,

    pub gravity: V2,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            time_step: 0.0001,
            total_time: 30.,
            output_interval: 100,

            tank_width: 0.30,
            tank_height: 0.40,
            fill_ratio: 0.50,

            amplitude: 0.02,
            frequency: 0.6,

            smoothing_length: 0.01,
            particle_spacing: 0.005,
            rest_density: 1000.,
            stiffness: 20000.,
            viscosity: 0.001,
            neighborhood_search_algorithm: NeighborhoodSearchAlgorithm::Grid,

            enable_damper: true,
            particle_diameter: 0.005,
            particle_density: 2500.,
            damper_mass_ratio: 0.12,
            damper_height: 0.03,

            youngs_modulus: 1e7,
            poisson_ratio: 0.3,
            restitution_coeff: 0.5,
            friction_coeff: 0.3,

            gravity: vec2f(0., -9.81),
        }
    }
}

impl SimulationConfig {
    /// Fail fast on malformed input before any simulation state exists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("time_step", self.time_step),
            ("total_time", self.total_time),
            ("tank_width", self.tank_width),
            ("tank_height", self.tank_height),
            ("smoothing_length", self.smoothing_length),
            ("particle_spacing", self.particle_spacing),
            ("rest_density", self.rest_density),
        ];
        for (name, value) in positive {
            if !(value > 0.) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        let unit_range = [("fill_ratio", self.fill_ratio)];
        for (name, value) in unit_range {
            if !(value > 0. && value <= 1.) {
                return Err(ConfigError::OutOfUnitRange { name, value });
            }
        }

        if self.output_interval == 0 {
            return Err(ConfigError::ZeroOutputInterval);
        }

        if self.enable_damper {
            let positive = [
                ("particle_diameter", self.particle_diameter),
                ("particle_density", self.particle_density),
                ("damper_mass_ratio", self.damper_mass_ratio),
                ("damper_height", self.damper_height),
                ("youngs_modulus", self.youngs_modulus),
            ];
            for (name, value) in positive {
                if !(value > 0.) {
                    return Err(ConfigError::NonPositive { name, value });
                }
            }

            let unit_range = [
                ("poisson_ratio", self.poisson_ratio),
                ("restitution_coeff", self.restitution_coeff),
            ];
            for (name, value) in unit_range {
                if !(value > 0. && value <= 1.) {
                    return Err(ConfigError::OutOfUnitRange { name, value });
                }
            }
        }

        Ok(())
    }

    /// Kernel support radius 2h shared by the SPH phases and the coupling.
    pub fn support_radius(&self) -> FT {
        2. * self.smoothing_length
    }
}

#[test]
fn default_config_is_valid() {
    assert!(SimulationConfig::default().validate().is_ok());
}

#[test]
fn non_positive_geometry_is_rejected() {
    let mut config = SimulationConfig::default();
    config.tank_width = 0.;
    assert!(config.validate().is_err());

    let mut config = SimulationConfig::default();
    config.particle_spacing = -0.005;
    assert!(config.validate().is_err());

    let mut config = SimulationConfig::default();
    config.particle_diameter = 0.;
    assert!(config.validate().is_err());

    // a zero diameter is fine while the damper is disabled
    let mut config = SimulationConfig::default();
    config.enable_damper = false;
    config.particle_diameter = 0.;
    assert!(config.validate().is_ok());
}

#[test]
fn fill_ratio_outside_unit_range_is_rejected() {
    let mut config = SimulationConfig::default();
    config.fill_ratio = 0.;
    assert!(config.validate().is_err());

    config.fill_ratio = 1.5;
    assert!(config.validate().is_err());
}

#[test]
fn config_yaml_roundtrip() {
    let config = SimulationConfig::default();
    let yaml = serde_yaml::to_string(&config).unwrap();
    let parsed: SimulationConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed.time_step, config.time_step);
    assert_eq!(parsed.gravity, config.gravity);
    assert_eq!(
        parsed.neighborhood_search_algorithm,
        config.neighborhood_search_algorithm
    );
}

#[test]
fn partial_yaml_falls_back_to_defaults() {
    let parsed: SimulationConfig = serde_yaml::from_str("tank_width: 0.5\nenable_damper: false\n").unwrap();
    assert_eq!(parsed.tank_width, 0.5);
    assert!(!parsed.enable_damper);
    assert_eq!(parsed.tank_height, SimulationConfig::default().tank_height);
}
