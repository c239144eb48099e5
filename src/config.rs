//! Configuration loading for the MANET experiment.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Longest run accepted, in simulated seconds.
const MAX_SIMULATION_TIME_S: f64 = 1_000_000.0;

/// Parameters of the MANET routing comparison. Every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExperimentConfig {
    /// Receive-rate CSV written across all protocol runs
    pub csv_file_name: PathBuf,
    /// Flow-monitor XML files are written as `<prefix>-<PROTOCOL>.flowmon`
    pub flowmon_prefix: String,
    /// Optional JSON flow report per protocol, `<prefix>-<PROTOCOL>.json`
    pub json_report: bool,
    pub transmission_power: f64,
    pub rx_sensitivity: f64,
    /// Seconds per protocol run
    pub simulation_time: f64,
    pub packet_count: u32,
    pub packet_size: u32,
    /// Seconds between packets of one source
    pub packet_interval: f64,
    pub sinks: u32,
    /// Spacing (m) of the initial node grid inside each building
    pub node_separation: f64,
    pub protocols: Vec<u32>,
    pub seed: u64,
    /// Seconds before sources start sending
    pub traffic_start: f64,
    pub port: u16,
    pub building_loss: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            csv_file_name: PathBuf::from("manet.output.csv"),
            flowmon_prefix: "manet".to_string(),
            json_report: false,
            transmission_power: 30.0,
            rx_sensitivity: -96.0,
            simulation_time: 100.0,
            packet_count: 100,
            packet_size: 50,
            packet_interval: 0.1,
            sinks: 1,
            node_separation: 3.0,
            protocols: vec![1, 2, 3],
            seed: 1,
            traffic_start: 50.0,
            port: 9,
            building_loss: true,
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `config_path` - Path to the TOML file
    ///
    /// # Returns
    /// * `Ok(ExperimentConfig)` if the file was successfully loaded and parsed
    /// * `Err(String)` with a descriptive error message otherwise
    pub fn load(config_path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(config_path).map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: ExperimentConfig = toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.simulation_time > 0.0 && self.simulation_time <= MAX_SIMULATION_TIME_S) {
            return Err(format!("simulation-time must be in (0, {}] seconds, got {}", MAX_SIMULATION_TIME_S, self.simulation_time));
        }
        if !(self.packet_interval > 0.0) {
            return Err(format!("packet-interval must be positive, got {}", self.packet_interval));
        }
        if !(self.traffic_start >= 0.0) {
            return Err(format!("traffic-start must be non-negative, got {}", self.traffic_start));
        }
        if self.packet_size == 0 {
            return Err("packet-size must be positive".to_string());
        }
        if self.sinks == 0 {
            return Err("sinks must be at least 1".to_string());
        }
        if !(self.node_separation >= 0.0) {
            return Err(format!("node-separation must be non-negative, got {}", self.node_separation));
        }
        if self.protocols.is_empty() {
            return Err("protocols must name at least one routing protocol".to_string());
        }
        Ok(())
    }

    /// Path of the flow-monitor XML of one protocol run.
    pub fn flowmon_path(&self, protocol: &str) -> PathBuf {
        PathBuf::from(format!("{}-{}.flowmon", self.flowmon_prefix, protocol))
    }

    pub fn json_report_path(&self, protocol: &str) -> PathBuf {
        PathBuf::from(format!("{}-{}.json", self.flowmon_prefix, protocol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: ExperimentConfig = toml::from_str("").unwrap();
        assert_eq!(config, ExperimentConfig::default());
        assert_eq!(config.csv_file_name, PathBuf::from("manet.output.csv"));
        assert_eq!(config.protocols, vec![1, 2, 3]);
    }

    #[test]
    fn load_reads_kebab_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manet.toml");
        std::fs::write(&path, "transmission-power = 7.5\nprotocols = [2]\nflowmon-prefix = \"out/run\"\nbuilding-loss = false\n").unwrap();

        let config = ExperimentConfig::load(&path).unwrap();
        assert_eq!(config.transmission_power, 7.5);
        assert_eq!(config.protocols, vec![2]);
        assert!(!config.building_loss);
        assert_eq!(config.simulation_time, 100.0);
        assert_eq!(config.flowmon_path("AODV"), PathBuf::from("out/run-AODV.flowmon"));
    }

    #[test]
    fn load_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ExperimentConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(missing.starts_with("Failed to read config file"));

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "packet-interval = 0.0\n").unwrap();
        assert!(ExperimentConfig::load(&path).unwrap_err().contains("packet-interval"));

        std::fs::write(&path, "simulation-time = 1e300\n").unwrap();
        assert!(ExperimentConfig::load(&path).unwrap_err().contains("simulation-time"));

        std::fs::write(&path, "sinks = \"many\"\n").unwrap();
        assert!(ExperimentConfig::load(&path).unwrap_err().starts_with("Failed to parse config file"));
    }
}
