//! Ready-made experiments built on the simulation kernel.
//!
//! - `LinkExperiment`: one sender, one receiver at a given distance, a steady packet
//!   stream and a per-flow report. Used to probe how far a link reaches under a
//!   free-space or fading channel.
//! - `ManetExperiment`: twenty walking nodes spread over four buildings, random
//!   sink/source pairs, one run per routing protocol with a shared receive-rate CSV.
//! - `run_scene`: build and run a JSON scene file.

use anyhow::Context;
use rand::Rng;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;

use crate::common::scene::load_scene;
use crate::config::ExperimentConfig;
use crate::error::SimError;
use crate::report::csv::CsvAppender;
use crate::report::flowmon::{FlowReport, write_flowmon_xml};
use crate::simulation::flow_monitor::FlowRecord;
use crate::simulation::geometry::{BuildingBounds, Rectangle};
use crate::simulation::mobility::{ConstantPosition, MobilitySpec, RandomWalkParameters, WalkMode};
use crate::simulation::network::{PacketCounters, Simulation, SimulationContext, WirelessChannel};
use crate::simulation::node::{DEFAULT_DATA_RATE_BPS, NodeContainer, WifiPhy};
use crate::simulation::propagation::{
    Building, FriisParameters, LossModelSpec, NakagamiParameters, PropagationDelayModel, WallType, build_chain, describe_chain, free_space_range,
};
use crate::simulation::random::{CHANNEL_STREAM, RngStreams, SCENARIO_STREAM};
use crate::simulation::routing::{RoutingProtocol, RoutingProtocolKind};
use crate::simulation::socket::{Delivery, RecvCallback};
use crate::simulation::throughput::{SinkCounters, THROUGHPUT_CSV_HEADER, ThroughputSample, ThroughputSampler, start_sampling};
use crate::simulation::traffic::TrafficGenerator;
use crate::simulation::types::{NodeId, Position, SimTime};

/// Results of one finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub protocol: String,
    pub records: Vec<FlowRecord>,
    pub counters: PacketCounters,
    pub samples: Vec<ThroughputSample>,
}

impl RunOutcome {
    fn collect(protocol: &str, simulation: &mut Simulation) -> Self {
        simulation.finalize();
        let ctx = simulation.context();
        RunOutcome {
            protocol: protocol.to_string(),
            records: ctx.monitor.records(),
            counters: ctx.counters,
            samples: ctx.throughput.samples().to_vec(),
        }
    }
}

// ---------- Link test ----------

/// Channel used by the link test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LinkModel {
    /// Free-space loss only
    Friis,
    /// Nakagami fading on top of free space with a 3 dB loss floor
    Nakagami,
}

#[derive(Debug, Clone)]
pub struct LinkExperiment {
    pub model: LinkModel,
    pub distance_m: f64,
    /// Let the receiver random-walk along the x axis
    pub mobile_receiver: bool,
    pub phy: WifiPhy,
    pub frequency_hz: f64,
    pub port: u16,
    pub packet_size: u32,
    pub packet_count: u32,
    pub interval: SimTime,
    pub start: SimTime,
    pub stop: SimTime,
    pub seed: u64,
}

impl Default for LinkExperiment {
    fn default() -> Self {
        LinkExperiment {
            model: LinkModel::Friis,
            distance_m: 500.0,
            mobile_receiver: false,
            phy: WifiPhy::default(),
            frequency_hz: 2.4e9,
            port: 80,
            packet_size: 1000,
            packet_count: 1000,
            interval: SimTime::from_millis(500),
            start: SimTime::from_secs(1),
            stop: SimTime::from_secs(505),
            seed: 1,
        }
    }
}

impl LinkExperiment {
    fn loss_chain(&self) -> Vec<LossModelSpec> {
        match self.model {
            LinkModel::Friis => vec![LossModelSpec::Friis(FriisParameters::default())],
            LinkModel::Nakagami => vec![
                LossModelSpec::Nakagami(NakagamiParameters::default()),
                LossModelSpec::Friis(FriisParameters {
                    min_loss_db: 3.0,
                    ..FriisParameters::default()
                }),
            ],
        }
    }

    pub fn run(&self) -> Result<RunOutcome, SimError> {
        if !(self.distance_m >= 0.0 && self.distance_m.is_finite()) {
            return Err(SimError::invalid_argument(format!("link distance must be non-negative, got {}", self.distance_m)));
        }
        let streams = RngStreams::new(self.seed);
        let mut nodes = NodeContainer::default();
        nodes.add(Box::new(ConstantPosition::new(Position::new(0.0, 0.0, 0.0))), self.phy)?;
        let receiver_mobility = if self.mobile_receiver {
            MobilitySpec::RandomWalk(RandomWalkParameters {
                bounds: Rectangle::new(0.0, self.distance_m.max(1000.0), 0.0, 0.0),
                mode: WalkMode::Time { seconds: 2.0 },
                speed_min: 1.0,
                speed_max: 1.0,
            })
        } else {
            MobilitySpec::Constant
        };
        let receiver = receiver_mobility.build(Position::new(self.distance_m, 0.0, 0.0), streams.mobility_stream(1))?;
        nodes.add(receiver, self.phy)?;

        let protocol = RoutingProtocolKind::Olsr;
        protocol.install(&mut nodes)?;

        let chain = self.loss_chain();
        let channel = WirelessChannel::new(build_chain(&chain)?, PropagationDelayModel::default(), self.frequency_hz, streams.stream(CHANNEL_STREAM))?;
        log::info!(
            "Link test at {} m over {} (free-space range {:.0} m)",
            self.distance_m,
            describe_chain(&chain),
            free_space_range(self.phy.tx_power_dbm, self.phy.rx_sensitivity_dbm, self.frequency_hz)
        );

        let sampler = ThroughputSampler::new(1, protocol.name(), self.phy.tx_power_dbm);
        let mut simulation = Simulation::new(SimulationContext::new(nodes, channel).with_throughput(sampler));
        let (scheduler, ctx) = simulation.parts_mut();
        let sink = ctx.create_socket(1)?;
        ctx.bind(sink, SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port))?;
        ctx.set_recv_callback(sink, counting_sink(false))?;
        let destination = ctx.nodes.get(1)?.address;
        let source = ctx.create_socket(0)?;
        ctx.connect(source, SocketAddrV4::new(destination, self.port))?;
        TrafficGenerator::new(source, self.packet_size, self.interval, self.packet_count).start(scheduler, self.start)?;

        simulation.run_until(self.stop)?;
        Ok(RunOutcome::collect(protocol.name(), &mut simulation))
    }
}

// ---------- MANET routing comparison ----------

/// Footprints of the four buildings the nodes walk in.
pub const BUILDING_FOOTPRINTS: [Rectangle; 4] = [
    Rectangle::new(0.0, 100.0, 0.0, 50.0),
    Rectangle::new(125.0, 225.0, 0.0, 50.0),
    Rectangle::new(125.0, 225.0, 75.0, 125.0),
    Rectangle::new(0.0, 100.0, 75.0, 125.0),
];
pub const NODES_PER_BUILDING: u32 = 5;
const BUILDING_HEIGHT_M: f64 = 30.0;
const NODE_HEIGHT_M: f64 = 1.5;

pub struct ManetExperiment {
    config: ExperimentConfig,
}

impl ManetExperiment {
    pub fn new(config: ExperimentConfig) -> Self {
        ManetExperiment { config }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    fn loss_chain(&self) -> Vec<LossModelSpec> {
        let mut chain = Vec::new();
        if self.config.building_loss {
            let buildings = BUILDING_FOOTPRINTS
                .iter()
                .map(|footprint| Building {
                    bounds: BuildingBounds {
                        footprint: *footprint,
                        z_min: 0.0,
                        z_max: BUILDING_HEIGHT_M,
                    },
                    wall_type: WallType::ConcreteWithWindows,
                })
                .collect();
            chain.push(LossModelSpec::Buildings { buildings });
        }
        chain.push(LossModelSpec::Friis(FriisParameters::default()));
        chain
    }

    /// Run every configured protocol in turn. The CSV file is truncated once, then shared.
    pub fn run(&self) -> Result<Vec<RunOutcome>, SimError> {
        let csv = CsvAppender::create(&self.config.csv_file_name, THROUGHPUT_CSV_HEADER)?;
        self.config.protocols.iter().map(|code| self.run_protocol(*code, Some(csv.clone()))).collect()
    }

    /// One run with routing protocol `code`, always starting from the configured seed.
    pub fn run_protocol(&self, code: u32, csv: Option<CsvAppender>) -> Result<RunOutcome, SimError> {
        let protocol = RoutingProtocolKind::from_code(code)?;
        let config = &self.config;
        let streams = RngStreams::new(config.seed);
        let phy = WifiPhy {
            tx_power_dbm: config.transmission_power,
            rx_sensitivity_dbm: config.rx_sensitivity,
            data_rate_bps: DEFAULT_DATA_RATE_BPS,
        };

        let mut nodes = NodeContainer::default();
        for footprint in BUILDING_FOOTPRINTS {
            let walk = MobilitySpec::RandomWalk(RandomWalkParameters {
                bounds: footprint,
                mode: WalkMode::Time { seconds: 2.0 },
                speed_min: 1.0,
                speed_max: 1.0,
            });
            for i in 0..NODES_PER_BUILDING {
                let offset = i as f64 * config.node_separation;
                let initial = Position::new(footprint.x_min + offset % footprint.width(), footprint.y_min + offset % footprint.height(), NODE_HEIGHT_M);
                let id = nodes.len() as NodeId;
                nodes.add(walk.build(initial, streams.mobility_stream(id))?, phy)?;
            }
        }
        protocol.install(&mut nodes)?;

        let chain = self.loss_chain();
        let channel = WirelessChannel::new(build_chain(&chain)?, PropagationDelayModel::default(), 2.4e9, streams.stream(CHANNEL_STREAM))?;
        let mut sampler = ThroughputSampler::new(config.sinks, protocol.name(), config.transmission_power);
        if let Some(csv) = csv {
            sampler = sampler.with_csv(csv);
        }
        let mut simulation = Simulation::new(SimulationContext::new(nodes, channel).with_throughput(sampler));

        let (scheduler, ctx) = simulation.parts_mut();
        start_sampling(scheduler, SimTime::ZERO)?;
        let mut rng = streams.stream(SCENARIO_STREAM);
        let node_count = ctx.nodes.len() as NodeId;
        let interval = SimTime::from_secs_f64(config.packet_interval);
        let traffic_start = SimTime::from_secs_f64(config.traffic_start);
        for _ in 0..config.sinks {
            let sink_node = rng.gen_range(0..node_count);
            let mut source_node = rng.gen_range(0..node_count - 1);
            if source_node >= sink_node {
                source_node += 1;
            }
            let sink_address = ctx.nodes.get(sink_node)?.address;
            if ctx.sockets.find_receiver(sink_node, sink_address, config.port).is_none() {
                let sink = ctx.create_socket(sink_node)?;
                ctx.bind(sink, SocketAddrV4::new(sink_address, config.port))?;
                ctx.set_recv_callback(sink, counting_sink(true))?;
            }
            let source = ctx.create_socket(source_node)?;
            ctx.connect(source, SocketAddrV4::new(sink_address, config.port))?;
            TrafficGenerator::new(source, config.packet_size, interval, config.packet_count).start(scheduler, traffic_start)?;
            log::info!("Flow from node {} to sink node {} ({})", source_node, sink_node, sink_address);
        }

        log::info!(
            "Running {} with {} nodes over {}, tx power {} dBm, for {} s",
            protocol.name(),
            node_count,
            describe_chain(&chain),
            config.transmission_power,
            config.simulation_time
        );
        simulation.run_until(SimTime::from_secs_f64(config.simulation_time))?;
        let outcome = RunOutcome::collect(protocol.name(), &mut simulation);

        write_flowmon_xml(&config.flowmon_path(protocol.name()), &outcome.records)?;
        if config.json_report {
            FlowReport::new("manet", Some(protocol.name()), &outcome.records).write(&config.json_report_path(protocol.name()))?;
        }
        Ok(outcome)
    }
}

fn counting_sink(announce: bool) -> RecvCallback {
    Box::new(move |delivery: &Delivery, counters: &mut SinkCounters| {
        counters.record(delivery.packet.size);
        if announce {
            log::info!("{:.6} {} received one packet from {}", delivery.time.as_secs_f64(), delivery.node, delivery.from.ip());
        }
    })
}

// ---------- Scene files ----------

/// Output files of a scene run; each one is optional.
#[derive(Debug, Default, Clone, Copy)]
pub struct SceneOutputs<'a> {
    pub csv: Option<&'a Path>,
    pub flowmon: Option<&'a Path>,
    pub json: Option<&'a Path>,
}

/// Load, build and run a scene file to its configured duration.
pub fn run_scene(path: &str, outputs: SceneOutputs<'_>) -> anyhow::Result<RunOutcome> {
    let scene = load_scene(path)?;
    let csv = outputs
        .csv
        .map(|csv_path| CsvAppender::create(csv_path, THROUGHPUT_CSV_HEADER))
        .transpose()
        .context("Failed to create receive-rate CSV")?;
    let mut simulation = scene.build(csv)?;
    simulation.run_until(scene.duration()).with_context(|| format!("Scene {} failed", path))?;

    let protocol = RoutingProtocolKind::from_code(scene.routing_protocol)?;
    let outcome = RunOutcome::collect(protocol.name(), &mut simulation);
    if let Some(flowmon) = outputs.flowmon {
        write_flowmon_xml(flowmon, &outcome.records)?;
    }
    if let Some(json) = outputs.json {
        FlowReport::new(path, Some(protocol.name()), &outcome.records).write(json)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn friis_link_at_500_m_delivers_everything() {
        let outcome = LinkExperiment::default().run().unwrap();
        assert_eq!(outcome.records.len(), 1);
        let stats = &outcome.records[0].stats;
        assert_eq!(stats.tx_packets, 1000);
        assert_eq!(stats.rx_packets, 1000);
        assert_eq!(stats.lost_packets, 0);
        assert_eq!(stats.time_last_tx, SimTime::from_secs_f64(500.5));
        assert_eq!(outcome.records[0].tuple.destination_port, 80);
        assert_eq!(outcome.counters.delivered, 1000);
    }

    #[test]
    fn friis_link_out_of_range_loses_everything() {
        let experiment = LinkExperiment {
            distance_m: 50_000.0,
            packet_count: 20,
            ..LinkExperiment::default()
        };
        let stats = &experiment.run().unwrap().records[0].stats;
        assert_eq!(stats.tx_packets, 20);
        assert_eq!(stats.rx_packets, 0);
        assert_eq!(stats.lost_packets, 20);
        assert_eq!(stats.throughput_bps(), 0.0);
    }

    #[test]
    fn nakagami_link_loses_a_few_packets_reproducibly() {
        let experiment = LinkExperiment {
            model: LinkModel::Nakagami,
            ..LinkExperiment::default()
        };
        let first = experiment.run().unwrap();
        let rx = first.records[0].stats.rx_packets;
        assert!(rx > 850 && rx < 1000, "unexpected rx count {}", rx);
        let second = experiment.run().unwrap();
        assert_eq!(second.records, first.records);
    }

    #[test]
    fn mobile_receiver_stays_in_range() {
        let experiment = LinkExperiment {
            mobile_receiver: true,
            ..LinkExperiment::default()
        };
        let stats = &experiment.run().unwrap().records[0].stats;
        assert_eq!(stats.rx_packets, 1000);
    }

    fn manet_config(dir: &Path) -> ExperimentConfig {
        ExperimentConfig {
            csv_file_name: dir.join("manet.output.csv"),
            flowmon_prefix: dir.join("manet").display().to_string(),
            json_report: true,
            simulation_time: 60.0,
            protocols: vec![1, 2],
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn manet_runs_each_protocol_and_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = manet_config(dir.path());
        let outcomes = ManetExperiment::new(config.clone()).run().unwrap();

        assert_eq!(outcomes.iter().map(|o| o.protocol.as_str()).collect::<Vec<_>>(), vec!["OLSR", "AODV"]);
        for outcome in &outcomes {
            assert_eq!(outcome.records.len(), 1);
            let stats = &outcome.records[0].stats;
            assert_eq!(stats.tx_packets, 100);
            assert_eq!(stats.rx_packets, 100);
            assert_eq!(stats.time_first_tx, SimTime::from_secs(50));
            assert_eq!(outcome.samples.len(), 61);
            assert!(dir.path().join(format!("manet-{}.flowmon", outcome.protocol)).exists());
            assert!(dir.path().join(format!("manet-{}.json", outcome.protocol)).exists());
        }
        assert_eq!(outcomes[0].records[0].tuple, outcomes[1].records[0].tuple);

        let csv = fs::read_to_string(&config.csv_file_name).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], THROUGHPUT_CSV_HEADER);
        assert_eq!(lines.len(), 1 + 2 * 61);
        assert!(lines[1].ends_with(",OLSR,30"));
        assert!(lines[62].ends_with(",AODV,30"));
    }

    #[test]
    fn manet_samples_add_up_to_received_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig {
            sinks: 3,
            ..manet_config(dir.path())
        };
        let outcome = ManetExperiment::new(config).run_protocol(3, None).unwrap();
        let rx_bytes: u64 = outcome.records.iter().map(|r| r.stats.rx_bytes).sum();
        let sampled_kbits: f64 = outcome.samples.iter().map(|s| s.receive_rate_kbps).sum();
        assert!((sampled_kbits - rx_bytes as f64 * 8.0 / 1000.0).abs() < 1e-6);
        assert!(outcome.records.iter().all(|r| r.tuple.source != r.tuple.destination));
    }

    #[test]
    fn manet_rejects_unknown_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManetExperiment::new(manet_config(dir.path())).run_protocol(7, None).unwrap_err();
        assert!(matches!(err, SimError::UnknownProtocol(7)));
    }

    #[test]
    fn scene_file_runs_and_writes_reports() {
        let dir = tempfile::tempdir().unwrap();
        let scene_path = dir.path().join("scene.json");
        fs::write(
            &scene_path,
            r#"{
                "propagation": [{"model": "friis"}],
                "nodes": [
                    {"node_id": 0, "position": {"x": 0.0, "y": 0.0}},
                    {"node_id": 1, "position": {"x": 100.0, "y": 0.0}}
                ],
                "routing_protocol": 2,
                "flows": [{"source": 0, "destination": 1, "packet_size": 200, "interval": 1.0, "count": 5, "start": 1.0}],
                "duration": 10.0
            }"#,
        )
        .unwrap();
        let flowmon = dir.path().join("scene.flowmon");
        let csv = dir.path().join("scene.csv");
        let outputs = SceneOutputs {
            csv: Some(&csv),
            flowmon: Some(&flowmon),
            json: None,
        };

        let outcome = run_scene(scene_path.to_str().unwrap(), outputs).unwrap();
        assert_eq!(outcome.protocol, "AODV");
        assert_eq!(outcome.records[0].stats.rx_packets, 5);
        assert!(fs::read_to_string(&flowmon).unwrap().contains("destinationPort=\"9\""));
        assert_eq!(fs::read_to_string(&csv).unwrap().lines().count(), 12);
    }
}
