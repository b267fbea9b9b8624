use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use num_traits::Float;

use crate::{
    dem::GrainParticles,
    floating_type_mod::{FT, PI},
    sph::FluidParticles,
    tank::TankGeometry,
};

/// Kinetic energy peaks below this are noise, not sloshing cycles.
const PEAK_THRESHOLD: FT = 0.01;
const MIN_SAMPLES_FOR_DAMPING: usize = 100;

/// A single sampled diagnostic column.
pub trait Diagnostic {
    fn csv_header(&self) -> &'static str;
    fn csv_cell(&self, sample: usize) -> String;
    fn len(&self) -> usize;
}

pub struct Series {
    header: &'static str,
    precision: usize,
    values: Vec<FT>,
}

impl Series {
    fn new(header: &'static str, precision: usize) -> Self {
        Series {
            header,
            precision,
            values: Vec::new(),
        }
    }

    pub fn values(&self) -> &[FT] {
        &self.values
    }

    pub fn last(&self) -> Option<FT> {
        self.values.last().copied()
    }
}

impl Diagnostic for Series {
    fn csv_header(&self) -> &'static str {
        self.header
    }

    fn csv_cell(&self, sample: usize) -> String {
        format!("{:.*}", self.precision, self.values[sample])
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

/**
 * Time-aligned diagnostic series sampled every output interval, with
 * running maxima and the logarithmic-decrement damping estimate.
 *
 * Every `sample` call appends exactly one value to every series, so all
 * columns always share the same length. Empty particle sets contribute
 * zero-valued samples rather than gaps.
 */
pub struct Measurements {
    support_radius: FT,

    time: Series,
    wall_pressure: Series,
    free_surface_height: Series,
    kinetic_energy: Series,
    tank_displacement: Series,

    max_wall_pressure: FT,
    max_free_surface_height: FT,
    max_kinetic_energy: FT,
}

impl Measurements {
    pub fn new(support_radius: FT) -> Self {
        Measurements {
            support_radius,
            time: Series::new("Time", 6),
            wall_pressure: Series::new("WallPressure", 3),
            free_surface_height: Series::new("FreeSurfaceHeight", 6),
            kinetic_energy: Series::new("KineticEnergy", 6),
            tank_displacement: Series::new("TankDisplacement", 6),
            max_wall_pressure: 0.,
            max_free_surface_height: 0.,
            max_kinetic_energy: 0.,
        }
    }

    pub fn sample(&mut self, time: FT, fluid: &FluidParticles, grains: &GrainParticles, tank: &TankGeometry) {
        let wall_pressure = Self::wall_pressure(self.support_radius, fluid, tank);
        let free_surface = Self::free_surface_height(fluid, tank);
        let kinetic_energy = Self::kinetic_energy(fluid, grains);

        self.time.values.push(time);
        self.wall_pressure.values.push(wall_pressure);
        self.free_surface_height.values.push(free_surface);
        self.kinetic_energy.values.push(kinetic_energy);
        self.tank_displacement.values.push(tank.displacement());

        self.max_wall_pressure = Float::max(self.max_wall_pressure, wall_pressure);
        self.max_free_surface_height = Float::max(self.max_free_surface_height, free_surface);
        self.max_kinetic_energy = Float::max(self.max_kinetic_energy, kinetic_energy);
    }

    /// Mean pressure of fluid particles within one support radius of the
    /// right wall, in the tank-local frame. Zero when no particle is close.
    fn wall_pressure(support_radius: FT, fluid: &FluidParticles, tank: &TankGeometry) -> FT {
        let threshold = tank.max_x() - support_radius;

        let mut sum: FT = 0.;
        let mut count = 0usize;
        for i in 0..fluid.len() {
            if tank.global_to_local(fluid.position[i]).x > threshold {
                sum += fluid.pressure[i];
                count += 1;
            }
        }

        if count == 0 {
            0.
        } else {
            sum / count as FT
        }
    }

    /// Highest fluid particle in the tank-local frame, zero for a dry tank.
    fn free_surface_height(fluid: &FluidParticles, tank: &TankGeometry) -> FT {
        let mut max_y: FT = 0.;
        for position in &fluid.position {
            max_y = Float::max(max_y, tank.global_to_local(*position).y);
        }
        max_y
    }

    /// Translational energy of both phases plus the rotational energy of
    /// the grains.
    fn kinetic_energy(fluid: &FluidParticles, grains: &GrainParticles) -> FT {
        let mut energy: FT = 0.;
        for i in 0..fluid.len() {
            energy += 0.5 * fluid.mass[i] * fluid.velocity[i].norm_squared();
        }
        for i in 0..grains.len() {
            energy += 0.5 * grains.mass[i] * grains.velocity[i].norm_squared();
            energy += 0.5 * grains.inertia[i] * grains.angular_velocity[i] * grains.angular_velocity[i];
        }
        energy
    }

    /**
     * Damping ratio by the logarithmic decrement of the first two kinetic
     * energy peaks: zeta = ln(E1 / E2) / (2 pi).
     *
     * Returns 0 until at least 100 samples exist and two peaks above the
     * noise threshold were found.
     */
    pub fn damping_ratio(&self) -> FT {
        let energy = self.kinetic_energy.values();
        if energy.len() < MIN_SAMPLES_FOR_DAMPING {
            return 0.;
        }

        let mut peaks = Vec::new();
        for i in 1..energy.len() - 1 {
            if energy[i] > energy[i - 1] && energy[i] > energy[i + 1] && energy[i] > PEAK_THRESHOLD {
                peaks.push(energy[i]);
                if peaks.len() == 2 {
                    break;
                }
            }
        }

        if peaks.len() < 2 {
            return 0.;
        }
        (peaks[0] / peaks[1]).ln() / (2. * PI)
    }

    pub fn columns(&self) -> [&Series; 5] {
        [
            &self.time,
            &self.wall_pressure,
            &self.free_surface_height,
            &self.kinetic_energy,
            &self.tank_displacement,
        ]
    }

    pub fn num_samples(&self) -> usize {
        self.time.len()
    }

    pub fn last_wall_pressure(&self) -> FT {
        self.wall_pressure.last().unwrap_or(0.)
    }

    pub fn last_free_surface_height(&self) -> FT {
        self.free_surface_height.last().unwrap_or(0.)
    }

    pub fn last_kinetic_energy(&self) -> FT {
        self.kinetic_energy.last().unwrap_or(0.)
    }

    pub fn max_wall_pressure(&self) -> FT {
        self.max_wall_pressure
    }

    pub fn max_free_surface_height(&self) -> FT {
        self.max_free_surface_height
    }

    pub fn max_kinetic_energy(&self) -> FT {
        self.max_kinetic_energy
    }

    pub fn write_csv(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);

        let columns = self.columns();
        let headers: Vec<&str> = columns.iter().map(|c| c.csv_header()).collect();
        writeln!(writer, "{}", headers.join(","))?;

        for sample in 0..self.num_samples() {
            let cells: Vec<String> = columns.iter().map(|c| c.csv_cell(sample)).collect();
            writeln!(writer, "{}", cells.join(","))?;
        }

        writer.flush()
    }
}

#[cfg(test)]
use crate::{simulation_parameters::SimulationConfig, vec2f};

#[cfg(test)]
fn measurements_with_energy_series(energy: &[FT]) -> Measurements {
    let mut measurements = Measurements::new(0.02);
    for &e in energy {
        measurements.time.values.push(0.);
        measurements.wall_pressure.values.push(0.);
        measurements.free_surface_height.values.push(0.);
        measurements.kinetic_energy.values.push(e);
        measurements.tank_displacement.values.push(0.);
    }
    measurements
}

#[test]
fn damping_ratio_from_two_synthetic_peaks() {
    // two clean peaks with E1 / E2 = 2 buried in a long flat series
    let mut energy = vec![0.; 200];
    energy[40] = 2.;
    energy[120] = 1.;

    let measurements = measurements_with_energy_series(&energy);
    let expected = (2. as FT).ln() / (2. * PI);
    assert!((measurements.damping_ratio() - expected).abs() < 1e-6);
}

#[test]
fn damping_ratio_requires_enough_samples() {
    let mut energy = vec![0.; 50];
    energy[10] = 2.;
    energy[30] = 1.;
    assert_eq!(measurements_with_energy_series(&energy).damping_ratio(), 0.);
}

#[test]
fn damping_ratio_ignores_sub_threshold_peaks() {
    let mut energy = vec![0.; 200];
    energy[40] = 0.005;
    energy[120] = 0.002;
    assert_eq!(measurements_with_energy_series(&energy).damping_ratio(), 0.);
}

#[test]
fn empty_particle_sets_sample_a_zero_row() {
    let config = SimulationConfig::default();
    let mut measurements = Measurements::new(config.support_radius());
    let tank = TankGeometry::new(0.3, 0.4, 0., 0.6);

    measurements.sample(1.5, &FluidParticles::new(), &GrainParticles::new(), &tank);

    assert_eq!(measurements.num_samples(), 1);
    assert_eq!(measurements.columns()[1].values()[0], 0.);
    assert_eq!(measurements.columns()[2].values()[0], 0.);
    assert_eq!(measurements.columns()[3].values()[0], 0.);
}

#[test]
fn csv_export_writes_header_and_aligned_rows() {
    let config = SimulationConfig::default();
    let mut measurements = Measurements::new(config.support_radius());
    let mut tank = TankGeometry::new(0.3, 0.4, 0.02, 0.6);
    tank.update_motion(0.25);

    let mut fluid = FluidParticles::new();
    fluid.push(vec2f(0.0, 0.1), 0.025, config.smoothing_length, config.rest_density);
    let grains = GrainParticles::new();

    measurements.sample(0.0, &fluid, &grains, &tank);
    measurements.sample(0.01, &fluid, &grains, &tank);

    let path = std::env::temp_dir().join("measurements_csv_export_test.csv");
    measurements.write_csv(&path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "Time,WallPressure,FreeSurfaceHeight,KineticEnergy,TankDisplacement");
    for line in &lines[1..] {
        assert_eq!(line.split(',').count(), 5);
    }
    // second row starts with the sample time at 6 decimals
    assert!(lines[2].starts_with("0.010000,"));
}
