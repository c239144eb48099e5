//! Discrete-event simulator for mobile ad-hoc wireless networks.
//!
//! - `simulation`: the kernel (scheduler, channel, mobility, nodes, sockets, statistics)
//! - `common`: JSON scene files
//! - `config`: TOML experiment configuration
//! - `experiment`: link test, MANET routing comparison and scene runner
//! - `report`: CSV, flow-monitor XML and JSON output

pub mod common;
pub mod config;
pub mod error;
pub mod experiment;
pub mod report;
pub mod simulation;

pub use error::SimError;
