use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::{LevelFilter, info};
use std::path::PathBuf;

use manet_radio_simulator::config::ExperimentConfig;
use manet_radio_simulator::experiment::{LinkExperiment, LinkModel, ManetExperiment, RunOutcome, SceneOutputs, run_scene};
use manet_radio_simulator::report::flowmon::{FlowReport, flow_summary, write_flowmon_xml};
use manet_radio_simulator::simulation::SimTime;
use manet_radio_simulator::simulation::node::WifiPhy;

#[derive(Parser)]
#[command(name = "manet-radio-simulator", version, about = "Discrete-event simulator for mobile ad-hoc wireless networks")]
struct Cli {
    /// Debug logging for the simulator
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Two-node link test
    Link {
        #[arg(long, value_enum, default_value_t = LinkModel::Friis)]
        model: LinkModel,
        /// Receiver distance in meters
        #[arg(long, default_value_t = 500.0)]
        distance: f64,
        /// Let the receiver random-walk
        #[arg(long)]
        mobile: bool,
        /// Transmission power (dBm)
        #[arg(long, default_value_t = 16.0)]
        tx_power: f64,
        #[arg(long, default_value_t = 1000)]
        packet_size: u32,
        #[arg(long, default_value_t = 1000)]
        packet_count: u32,
        /// Seconds between packets
        #[arg(long, default_value_t = 0.5)]
        interval: f64,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long)]
        flowmon: Option<PathBuf>,
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Routing-protocol comparison over four buildings
    Manet {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        csv_file_name: Option<PathBuf>,
        /// Transmission power (dBm)
        #[arg(long)]
        transmission_power: Option<f64>,
        /// Seconds per protocol run
        #[arg(long)]
        simulation_time: Option<f64>,
        /// Run a single protocol (1=OLSR, 2=AODV, 3=DSDV, 4=DSR)
        #[arg(long)]
        protocol: Option<u32>,
        #[arg(long)]
        packet_size: Option<u32>,
        #[arg(long)]
        packet_count: Option<u32>,
        /// Seconds between packets
        #[arg(long)]
        packet_interval: Option<f64>,
        #[arg(long)]
        sinks: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run a JSON scene file
    Scene {
        path: String,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        flowmon: Option<PathBuf>,
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

fn print_outcome(outcome: &RunOutcome) {
    println!("=== {} ===", outcome.protocol);
    for record in &outcome.records {
        println!("{}", flow_summary(record));
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging setup
    let crate_level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("manet_radio_simulator"), crate_level)
        .parse_default_env()
        .init();

    info!("Starting up");

    match cli.command {
        Command::Link {
            model,
            distance,
            mobile,
            tx_power,
            packet_size,
            packet_count,
            interval,
            seed,
            flowmon,
            json,
        } => {
            anyhow::ensure!(interval > 0.0, "interval must be positive, got {}", interval);
            let defaults = LinkExperiment::default();
            let experiment = LinkExperiment {
                model,
                distance_m: distance,
                mobile_receiver: mobile,
                phy: WifiPhy {
                    tx_power_dbm: tx_power,
                    ..defaults.phy
                },
                packet_size,
                packet_count,
                interval: SimTime::from_secs_f64(interval),
                seed,
                ..defaults
            };
            let outcome = experiment.run().context("Link test failed")?;
            if let Some(path) = flowmon {
                write_flowmon_xml(&path, &outcome.records)?;
            }
            if let Some(path) = json {
                FlowReport::new("link", Some(outcome.protocol.as_str()), &outcome.records).write(&path)?;
            }
            print_outcome(&outcome);
        }
        Command::Manet {
            config,
            csv_file_name,
            transmission_power,
            simulation_time,
            protocol,
            packet_size,
            packet_count,
            packet_interval,
            sinks,
            seed,
        } => {
            let mut experiment_config = match config {
                Some(path) => ExperimentConfig::load(&path).map_err(anyhow::Error::msg)?,
                None => ExperimentConfig::default(),
            };
            if let Some(csv_file_name) = csv_file_name {
                experiment_config.csv_file_name = csv_file_name;
            }
            if let Some(power) = transmission_power {
                experiment_config.transmission_power = power;
            }
            if let Some(time) = simulation_time {
                experiment_config.simulation_time = time;
            }
            if let Some(protocol) = protocol {
                experiment_config.protocols = vec![protocol];
            }
            if let Some(size) = packet_size {
                experiment_config.packet_size = size;
            }
            if let Some(count) = packet_count {
                experiment_config.packet_count = count;
            }
            if let Some(interval) = packet_interval {
                experiment_config.packet_interval = interval;
            }
            if let Some(sinks) = sinks {
                experiment_config.sinks = sinks;
            }
            if let Some(seed) = seed {
                experiment_config.seed = seed;
            }
            experiment_config.validate().map_err(anyhow::Error::msg)?;

            let outcomes = ManetExperiment::new(experiment_config).run().context("MANET experiment failed")?;
            for outcome in &outcomes {
                print_outcome(outcome);
            }
        }
        Command::Scene { path, csv, flowmon, json } => {
            let outputs = SceneOutputs {
                csv: csv.as_deref(),
                flowmon: flowmon.as_deref(),
                json: json.as_deref(),
            };
            let outcome = run_scene(&path, outputs)?;
            print_outcome(&outcome);
        }
    }

    Ok(())
}
