//! Scene loading, parsing, validation and construction.
//!
//! A scene is a JSON description of a complete run: radio parameters, the
//! propagation chain, nodes with their mobility, the routing protocol, traffic
//! flows, duration and seed. `load_scene` parses and validates it; `Scene::build`
//! turns it into a ready-to-run `Simulation`.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::SimError;
use crate::report::csv::CsvAppender;
use crate::simulation::mobility::MobilitySpec;
use crate::simulation::network::{Simulation, SimulationContext, WirelessChannel};
use crate::simulation::node::{NodeContainer, WifiPhy};
use crate::simulation::propagation::{LossModelSpec, PropagationDelayModel, build_chain, describe_chain};
use crate::simulation::random::{CHANNEL_STREAM, RngStreams};
use crate::simulation::routing::{RoutingProtocol, RoutingProtocolKind};
use crate::simulation::socket::{Delivery, RecvCallback};
use crate::simulation::throughput::{SinkCounters, ThroughputSampler, start_sampling};
use crate::simulation::traffic::TrafficGenerator;
use crate::simulation::types::{Position, SimTime};

/// Error type for scene loading failures.
#[derive(Debug)]
pub enum SceneLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
    BuildError(String),
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SceneLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SceneLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            SceneLoadError::BuildError(msg) => write!(f, "Failed to build simulation: {}", msg),
        }
    }
}

impl std::error::Error for SceneLoadError {}

impl From<SimError> for SceneLoadError {
    fn from(err: SimError) -> Self {
        SceneLoadError::BuildError(err.to_string())
    }
}

fn default_frequency() -> f64 {
    2.4e9
}

fn default_routing_protocol() -> u32 {
    1
}

fn default_address_base() -> Ipv4Addr {
    Ipv4Addr::new(10, 1, 1, 0)
}

fn default_port() -> u16 {
    9
}

/// Node entry of a scene. `node_id` values must be exactly `0..n`.
#[derive(Debug, Deserialize, Clone)]
pub struct SceneNode {
    pub node_id: u32,
    pub position: Position,
    #[serde(default)]
    pub mobility: MobilitySpec,
    /// Per-node PHY override; the scene-wide `phy` is used otherwise.
    #[serde(default)]
    pub phy: Option<WifiPhy>,
}

/// Periodic UDP flow between two nodes.
#[derive(Debug, Deserialize, Clone)]
pub struct SceneFlow {
    pub source: u32,
    pub destination: u32,
    #[serde(default = "default_port")]
    pub port: u16,
    pub packet_size: u32,
    /// Seconds between packets.
    pub interval: f64,
    pub count: u32,
    /// Seconds from the start of the run to the first packet.
    #[serde(default)]
    pub start: f64,
}

/// Root structure representing the entire scene.
#[derive(Debug, Deserialize)]
pub struct Scene {
    /// Channel carrier frequency (Hz).
    #[serde(default = "default_frequency")]
    pub frequency_hz: f64,
    /// Default radio parameters of every node.
    #[serde(default)]
    pub phy: WifiPhy,
    /// Loss chain, head first.
    pub propagation: Vec<LossModelSpec>,
    #[serde(default)]
    pub delay: PropagationDelayModel,
    pub nodes: Vec<SceneNode>,
    /// 1=OLSR, 2=AODV, 3=DSDV, 4=DSR.
    #[serde(default = "default_routing_protocol")]
    pub routing_protocol: u32,
    #[serde(default)]
    pub flows: Vec<SceneFlow>,
    /// Run length in seconds.
    pub duration: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_address_base")]
    pub address_base: Ipv4Addr,
}

/// Load and parse a scene from a file.
///
/// # Parameters
///
/// * `path` - Path to the scene JSON file
///
/// # Returns
///
/// Parsed and validated Scene or an error.
pub fn load_scene(path: &str) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path))
        .map_err(|e| SceneLoadError::FileReadError(e.to_string()))?;

    parse_scene(&data)
}

/// Parse and validate scene JSON.
pub fn parse_scene(data: &str) -> Result<Scene, SceneLoadError> {
    let scene: Scene = serde_json::from_str(data)
        .context("Invalid JSON format")
        .map_err(|e| SceneLoadError::ParseError(format!("{:#}", e)))?;

    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;

    Ok(scene)
}

/// Validate scene configuration.
///
/// # Returns
///
/// `Ok(())` if validation passes, `Err(String)` with error description otherwise.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    const MAX_NODES: usize = 10000;
    const MAX_DURATION_S: f64 = 1_000_000.0;
    const MIN_TX_POWER: f64 = -50.0;
    const MAX_TX_POWER: f64 = 50.0;

    // Check node count
    if scene.nodes.is_empty() {
        return Err("Scene must contain at least one node".to_string());
    }
    if scene.nodes.len() > MAX_NODES {
        return Err(format!("Node count {} exceeds maximum of {}", scene.nodes.len(), MAX_NODES));
    }

    // Check for duplicate node IDs, then that they cover 0..n
    let mut node_ids = HashSet::new();
    for node in &scene.nodes {
        if !node_ids.insert(node.node_id) {
            return Err(format!("Duplicate node_id found: {}", node.node_id));
        }
    }
    if let Some(id) = node_ids.iter().find(|id| **id as usize >= scene.nodes.len()) {
        return Err(format!("node_id {} out of range: ids must be 0..{}", id, scene.nodes.len()));
    }

    if !(scene.frequency_hz > 0.0 && scene.frequency_hz.is_finite()) {
        return Err(format!("Invalid frequency_hz {}, must be positive", scene.frequency_hz));
    }
    if scene.propagation.is_empty() {
        return Err("Propagation chain must contain at least one model".to_string());
    }
    if !(scene.duration > 0.0 && scene.duration <= MAX_DURATION_S) {
        return Err(format!("Invalid duration {}, must be in (0, {}] seconds", scene.duration, MAX_DURATION_S));
    }
    if let Err(err) = RoutingProtocolKind::from_code(scene.routing_protocol) {
        return Err(err.to_string());
    }
    if let Err(err) = scene.delay.validate() {
        return Err(err.to_string());
    }

    // Validate each node
    for node in &scene.nodes {
        let phy = node.phy.unwrap_or(scene.phy);
        if phy.tx_power_dbm < MIN_TX_POWER || phy.tx_power_dbm > MAX_TX_POWER {
            return Err(format!(
                "Node {} tx_power_dbm {} outside realistic range ({} to {} dBm)",
                node.node_id, phy.tx_power_dbm, MIN_TX_POWER, MAX_TX_POWER
            ));
        }
        if phy.data_rate_bps == 0 {
            return Err(format!("Node {} data_rate_bps must be positive", node.node_id));
        }
        if let Some(bounds) = node.mobility.bounds() {
            if !bounds.is_valid() {
                return Err(format!("Node {} has invalid mobility bounds {:?}", node.node_id, bounds));
            }
            if !bounds.contains(&node.position) {
                return Err(format!("Node {} position {} outside its mobility bounds {:?}", node.node_id, node.position, bounds));
            }
        }
    }

    // Validate flows
    for (idx, flow) in scene.flows.iter().enumerate() {
        for endpoint in [flow.source, flow.destination] {
            if !node_ids.contains(&endpoint) {
                return Err(format!("Flow {} references unknown node {}", idx, endpoint));
            }
        }
        if flow.source == flow.destination {
            return Err(format!("Flow {} has identical source and destination {}", idx, flow.source));
        }
        if !(flow.interval > 0.0) {
            return Err(format!("Flow {} interval {} must be positive", idx, flow.interval));
        }
        if !(flow.start >= 0.0) {
            return Err(format!("Flow {} start {} must be non-negative", idx, flow.start));
        }
        if flow.packet_size == 0 {
            return Err(format!("Flow {} packet_size must be positive", idx));
        }
    }

    Ok(())
}

impl Scene {
    pub fn duration(&self) -> SimTime {
        SimTime::from_secs_f64(self.duration)
    }

    /// Build a ready-to-run simulation: nodes, routing, channel, sinks, sources and sampling.
    ///
    /// # Parameters
    ///
    /// * `csv` - Optional receive-rate CSV file (header already written)
    pub fn build(&self, csv: Option<CsvAppender>) -> Result<Simulation, SceneLoadError> {
        let streams = RngStreams::new(self.seed);
        let protocol = RoutingProtocolKind::from_code(self.routing_protocol)?;

        let mut ordered: Vec<&SceneNode> = self.nodes.iter().collect();
        ordered.sort_by_key(|node| node.node_id);
        let mut nodes = NodeContainer::new(self.address_base);
        for node in ordered {
            let mobility = node.mobility.build(node.position, streams.mobility_stream(node.node_id))?;
            nodes.add(mobility, node.phy.unwrap_or(self.phy))?;
        }
        protocol.install(&mut nodes)?;

        let loss = build_chain(&self.propagation)?;
        let channel = WirelessChannel::new(loss, self.delay, self.frequency_hz, streams.stream(CHANNEL_STREAM))?;
        log::info!(
            "Scene: {} nodes, {} flows, chain {}, {} routing, {} s",
            nodes.len(),
            self.flows.len(),
            describe_chain(&self.propagation),
            protocol.name(),
            self.duration
        );

        let sinks = self.flows.iter().map(|f| f.destination).collect::<HashSet<_>>().len() as u32;
        let mut sampler = ThroughputSampler::new(sinks, protocol.name(), self.phy.tx_power_dbm);
        if let Some(csv) = csv {
            sampler = sampler.with_csv(csv);
        }
        let mut simulation = Simulation::new(SimulationContext::new(nodes, channel).with_throughput(sampler));

        let (scheduler, ctx) = simulation.parts_mut();
        for flow in &self.flows {
            let destination = ctx.nodes.get(flow.destination)?.address;
            if ctx.sockets.find_receiver(flow.destination, destination, flow.port).is_none() {
                let sink = ctx.create_socket(flow.destination)?;
                ctx.bind(sink, SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, flow.port))?;
                ctx.set_recv_callback(sink, counting_sink())?;
            }
            let source = ctx.create_socket(flow.source)?;
            ctx.connect(source, SocketAddrV4::new(destination, flow.port))?;
            TrafficGenerator::new(source, flow.packet_size, SimTime::from_secs_f64(flow.interval), flow.count).start(scheduler, SimTime::from_secs_f64(flow.start))?;
        }
        start_sampling(scheduler, SimTime::ZERO)?;

        Ok(simulation)
    }
}

fn counting_sink() -> RecvCallback {
    Box::new(|delivery: &Delivery, counters: &mut SinkCounters| {
        counters.record(delivery.packet.size);
        log::debug!("{} node {} received {} bytes from {}", delivery.time, delivery.node, delivery.packet.size, delivery.from.ip());
    })
}
