use std::path::Path;

use clap::{App, AppSettings, Arg, SubCommand};

use crate::{Simulation, SimulationConfig};

const CARGO_PKG_AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &'static str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &'static str = env!("CARGO_PKG_DESCRIPTION");

pub fn start() {
    let matches = App::new("Ballast Tank Sloshing Simulation")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("run")
                .about("Run the simulation and export the measurement series")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("YAML file with the simulation parameters; defaults are used when omitted")
                        .required(false)
                        .index(1),
                )
                .arg(
                    Arg::with_name("OUTPUT_CSV")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .default_value("measurements.csv")
                        .help("Where to write the measurement series"),
                ),
        )
        .subcommand(
            SubCommand::with_name("print-config")
                .about("Print the default simulation parameters as YAML"),
        )
        .get_matches();

    if let Some(run_matches) = matches.subcommand_matches("run") {
        let config = match run_matches.value_of("SIMULATION_CONFIG") {
            Some(parameter_file) => {
                let params_yaml = std::fs::read_to_string(parameter_file).expect("failed reading parameter file");
                serde_yaml::from_str(&params_yaml).expect("failed parsing simulation config file")
            }
            None => SimulationConfig::default(),
        };
        println!("{:?}", config);

        let output_path = run_matches
            .value_of("OUTPUT_CSV")
            .expect("missing output path");

        let mut simulation = Simulation::new(config).expect("invalid simulation config");
        simulation.run();

        let measurements = simulation.measurements();
        measurements
            .write_csv(Path::new(output_path))
            .expect("failed writing measurement csv");

        println!();
        println!("wrote {} samples to {}", measurements.num_samples(), output_path);
        println!("max wall pressure:       {:.3} Pa", measurements.max_wall_pressure());
        println!(
            "max free surface height: {:.6} m",
            measurements.max_free_surface_height()
        );
        println!("max kinetic energy:      {:.6} J", measurements.max_kinetic_energy());
        println!("damping ratio:           {:.6}", measurements.damping_ratio());
    }

    if matches.subcommand_matches("print-config").is_some() {
        let yaml = serde_yaml::to_string(&SimulationConfig::default()).expect("failed serializing default config");
        println!("{}", yaml);
    }
}
