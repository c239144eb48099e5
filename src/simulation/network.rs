//! Simulation core: the wireless channel, the shared context and the run loop.
//!
//! This module ties the kernel together:
//! - `WirelessChannel` evaluates the propagation chain for one transmission
//! - `SimulationContext` owns every piece of shared state (nodes, sockets, channel,
//!   flow monitor, receive-rate sampler) and is handed to each event action
//! - `Simulation` pairs the context with the scheduler
//!
//! ## Packet path
//!
//! 1. A socket send records the packet in the flow monitor
//! 2. Both endpoint positions are taken from the mobility providers at the send instant
//! 3. The propagation chain yields the received power
//! 4. Below the receiver sensitivity the packet is dropped, otherwise a delivery event
//!    is scheduled after the PHY transmission time plus the propagation delay
//! 5. Delivery updates the flow monitor and hands the packet to the bound socket

use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::net::SocketAddrV4;

use super::flow_monitor::{FiveTuple, FlowMonitor, FlowStats};
use super::node::NodeContainer;
use super::propagation::{LinkEnd, ModelRef, PropagationDelayModel};
use super::scheduler::{EventHandle, Scheduler};
use super::socket::{Delivery, RecvCallback, SocketTable};
use super::throughput::ThroughputSampler;
use super::types::{NodeId, PROTOCOL_UDP, Packet, SimTime, SocketId};
use crate::error::SimError;

/// Result of evaluating one link at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkBudget {
    pub distance_m: f64,
    pub loss_db: f64,
    pub rx_power_dbm: f64,
    pub propagation_delay: SimTime,
}

/// Shared radio medium: a loss chain, a delay model and the channel's random stream.
pub struct WirelessChannel {
    loss: ModelRef,
    delay_model: PropagationDelayModel,
    frequency_hz: f64,
    rng: StdRng,
}

impl WirelessChannel {
    pub fn new(loss: ModelRef, delay_model: PropagationDelayModel, frequency_hz: f64, rng: StdRng) -> Result<Self, SimError> {
        if !(frequency_hz > 0.0 && frequency_hz.is_finite()) {
            return Err(SimError::invalid_argument(format!("channel frequency must be positive, got {}", frequency_hz)));
        }
        delay_model.validate()?;
        Ok(WirelessChannel {
            loss,
            delay_model,
            frequency_hz,
            rng,
        })
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn loss_model_name(&self) -> &'static str {
        self.loss.name()
    }

    /// Received power and delay for a transmission at `tx_power_dbm`.
    pub fn evaluate(&mut self, tx: &LinkEnd, rx: &LinkEnd, tx_power_dbm: f64) -> LinkBudget {
        let loss_db = self.loss.compute_loss(tx, rx, self.frequency_hz, &mut self.rng);
        LinkBudget {
            distance_m: tx.position.distance_to(&rx.position),
            loss_db,
            rx_power_dbm: tx_power_dbm - loss_db,
            propagation_delay: self.delay_model.delay(&tx.position, &rx.position),
        }
    }
}

/// Run-wide packet totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketCounters {
    pub sent: u64,
    pub delivered: u64,
    pub lost: u64,
}

/// Everything an event action may touch.
pub struct SimulationContext {
    pub nodes: NodeContainer,
    pub sockets: SocketTable,
    pub channel: WirelessChannel,
    pub monitor: FlowMonitor,
    pub throughput: ThroughputSampler,
    pub counters: PacketCounters,
    next_packet_uid: u64,
}

impl SimulationContext {
    pub fn new(nodes: NodeContainer, channel: WirelessChannel) -> Self {
        SimulationContext {
            nodes,
            sockets: SocketTable::new(),
            channel,
            monitor: FlowMonitor::new(),
            throughput: ThroughputSampler::default(),
            counters: PacketCounters::default(),
            next_packet_uid: 0,
        }
    }

    pub fn with_throughput(mut self, throughput: ThroughputSampler) -> Self {
        self.throughput = throughput;
        self
    }

    pub fn create_socket(&mut self, node: NodeId) -> Result<SocketId, SimError> {
        self.sockets.create(&mut self.nodes, node)
    }

    pub fn bind(&mut self, socket: SocketId, address: SocketAddrV4) -> Result<SocketAddrV4, SimError> {
        self.sockets.bind(socket, address)
    }

    pub fn connect(&mut self, socket: SocketId, remote: SocketAddrV4) -> Result<(), SimError> {
        self.sockets.connect(&self.nodes, socket, remote)
    }

    pub fn close(&mut self, socket: SocketId) -> Result<(), SimError> {
        self.sockets.close(socket)
    }

    pub fn set_recv_callback(&mut self, socket: SocketId, callback: RecvCallback) -> Result<(), SimError> {
        self.sockets.set_recv_callback(socket, callback)
    }

    pub fn recv_from(&mut self, socket: SocketId) -> Result<Option<(Packet, SocketAddrV4)>, SimError> {
        self.sockets.recv_from(socket)
    }

    fn next_uid(&mut self) -> u64 {
        let uid = self.next_packet_uid;
        self.next_packet_uid += 1;
        uid
    }

    fn record_loss(&mut self, tuple: FiveTuple, uid: u64) {
        self.monitor.on_drop(tuple, uid);
        self.counters.lost += 1;
    }

    /// Send `size` bytes through a connected socket at the current time.
    ///
    /// # Returns
    ///
    /// The packet that was put on the air. A packet the channel cannot deliver is still
    /// returned: it is accounted for as lost in the flow monitor. Sending on a closed or
    /// unconnected socket returns `InvalidState`.
    pub fn send(&mut self, scheduler: &mut Scheduler<SimulationContext>, socket: SocketId, size: u32) -> Result<Packet, SimError> {
        let now = scheduler.now();
        let (src_node, local, remote) = self.sockets.send_endpoints(socket)?;
        let src_address = if local.ip().is_unspecified() { self.nodes.get(src_node)?.address } else { *local.ip() };
        let packet = Packet { uid: self.next_uid(), size };
        let tuple = FiveTuple {
            source: src_address,
            destination: *remote.ip(),
            protocol: PROTOCOL_UDP,
            source_port: local.port(),
            destination_port: remote.port(),
        };
        self.monitor.on_tx(tuple, packet.uid, size, now);
        self.counters.sent += 1;

        let Some(dst_node) = self.nodes.node_by_address(*remote.ip()) else {
            log::debug!("t={} packet {} from node {}: no node owns {}", now, packet.uid, src_node, remote.ip());
            self.record_loss(tuple, packet.uid);
            return Ok(packet);
        };

        let tx = LinkEnd {
            node: src_node,
            position: self.nodes.position_at(src_node, now)?,
        };
        let rx = LinkEnd {
            node: dst_node,
            position: self.nodes.position_at(dst_node, now)?,
        };
        let tx_phy = self.nodes.get(src_node)?.phy;
        let sensitivity = self.nodes.get(dst_node)?.phy.rx_sensitivity_dbm;
        let budget = self.channel.evaluate(&tx, &rx, tx_phy.tx_power_dbm);

        if !(budget.rx_power_dbm >= sensitivity) {
            log::debug!(
                "t={} packet {} node {} -> node {} dropped: {:.2} dBm below sensitivity {:.2} dBm at {:.1} m",
                now,
                packet.uid,
                src_node,
                dst_node,
                budget.rx_power_dbm,
                sensitivity,
                budget.distance_m
            );
            self.record_loss(tuple, packet.uid);
            return Ok(packet);
        }

        let delay = tx_phy.tx_duration(size) + budget.propagation_delay;
        let from = SocketAddrV4::new(src_address, local.port());
        let rx_power_dbm = budget.rx_power_dbm;
        let dst_port = remote.port();
        scheduler.schedule(delay, move |scheduler: &mut Scheduler<SimulationContext>, ctx: &mut SimulationContext| {
            ctx.deliver(scheduler.now(), dst_node, dst_port, tuple, packet, from, rx_power_dbm)
        })?;
        Ok(packet)
    }

    #[allow(clippy::too_many_arguments)]
    fn deliver(&mut self, now: SimTime, node: NodeId, port: u16, tuple: FiveTuple, packet: Packet, from: SocketAddrV4, rx_power_dbm: f64) -> Result<(), SimError> {
        self.monitor.on_rx(tuple, packet.uid, packet.size, now);
        self.counters.delivered += 1;

        let address = self.nodes.get(node)?.address;
        let Some(socket) = self.sockets.find_receiver(node, address, port) else {
            log::debug!("t={} packet {} reached node {} but no socket listens on port {}", now, packet.uid, node, port);
            return Ok(());
        };
        let delivery = Delivery {
            time: now,
            node,
            socket,
            packet,
            from,
            rx_power_dbm,
        };
        self.sockets.deliver(&delivery, &mut self.throughput.sink_counters)
    }
}

/// A scheduler and the context its actions run against.
pub struct Simulation {
    scheduler: Scheduler<SimulationContext>,
    context: SimulationContext,
}

impl Simulation {
    pub fn new(context: SimulationContext) -> Self {
        Simulation {
            scheduler: Scheduler::new(),
            context,
        }
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SimulationContext {
        &mut self.context
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<SimulationContext> {
        &mut self.scheduler
    }

    /// Both halves at once, for setup code that schedules against the context.
    pub fn parts_mut(&mut self) -> (&mut Scheduler<SimulationContext>, &mut SimulationContext) {
        (&mut self.scheduler, &mut self.context)
    }

    pub fn schedule<F>(&mut self, delay: SimTime, action: F) -> Result<EventHandle, SimError>
    where
        F: FnOnce(&mut Scheduler<SimulationContext>, &mut SimulationContext) -> Result<(), SimError> + 'static,
    {
        self.scheduler.schedule(delay, action)
    }

    /// Run all events up to and including `end`.
    pub fn run_until(&mut self, end: SimTime) -> Result<(), SimError> {
        log::debug!("Running until {} with {} pending events", end, self.scheduler.pending_count());
        self.scheduler.run_until(&mut self.context, end)?;
        let counters = self.context.counters;
        log::info!(
            "Simulation reached {}: {} events, {} packets sent, {} delivered, {} lost",
            self.scheduler.now(),
            self.scheduler.executed_count(),
            counters.sent,
            counters.delivered,
            counters.lost
        );
        Ok(())
    }

    /// Settle per-flow loss counts and return the statistics.
    pub fn finalize(&mut self) -> BTreeMap<FiveTuple, FlowStats> {
        self.context.monitor.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::mobility::ConstantPosition;
    use crate::simulation::node::WifiPhy;
    use crate::simulation::propagation::{FriisParameters, LossModelSpec, build_chain};
    use crate::simulation::random::{CHANNEL_STREAM, RngStreams};
    use crate::simulation::routing::{RoutingProtocol, RoutingProtocolKind};
    use crate::simulation::socket::SocketState;
    use crate::simulation::throughput::SinkCounters;
    use crate::simulation::types::Position;
    use std::net::Ipv4Addr;

    fn two_node_simulation(distance: f64) -> Simulation {
        let mut nodes = NodeContainer::default();
        for x in [0.0, distance] {
            nodes.add(Box::new(ConstantPosition::new(Position::new(x, 0.0, 0.0))), WifiPhy::default()).unwrap();
        }
        RoutingProtocolKind::Olsr.install(&mut nodes).unwrap();
        let loss = build_chain(&[LossModelSpec::Friis(FriisParameters::default())]).unwrap();
        let channel = WirelessChannel::new(loss, PropagationDelayModel::default(), 2.4e9, RngStreams::new(1).stream(CHANNEL_STREAM)).unwrap();
        Simulation::new(SimulationContext::new(nodes, channel))
    }

    fn connect_pair(sim: &mut Simulation) -> (SocketId, SocketId) {
        let ctx = sim.context_mut();
        let sink = ctx.create_socket(1).unwrap();
        ctx.bind(sink, SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 80)).unwrap();
        ctx.set_recv_callback(sink, Box::new(|d: &Delivery, c: &mut SinkCounters| c.record(d.packet.size))).unwrap();
        let source = ctx.create_socket(0).unwrap();
        ctx.connect(source, SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 80)).unwrap();
        (source, sink)
    }

    fn send_at(sim: &mut Simulation, at: SimTime, socket: SocketId, size: u32) {
        sim.scheduler_mut()
            .schedule_at(at, move |s: &mut Scheduler<SimulationContext>, ctx: &mut SimulationContext| ctx.send(s, socket, size).map(|_| ()))
            .unwrap();
    }

    #[test]
    fn link_at_500m_is_delivered() {
        let mut sim = two_node_simulation(500.0);
        let (source, _) = connect_pair(&mut sim);
        send_at(&mut sim, SimTime::from_secs(1), source, 1000);
        sim.run_until(SimTime::from_secs(2)).unwrap();

        let flows = sim.finalize();
        let stats = flows.values().next().unwrap();
        assert_eq!(stats.tx_packets, 1);
        assert_eq!(stats.rx_packets, 1);
        assert_eq!(stats.lost_packets, 0);
        // 8000 bits at 11 Mb/s plus ~1.67 µs of flight time.
        let expected = SimTime::from_secs_f64(8000.0 / 11e6) + SimTime::from_secs_f64(500.0 / 299_792_458.0);
        assert_eq!(stats.delay_sum, expected);
        assert_eq!(sim.context().throughput.sink_counters.packets, 1);
        assert_eq!(sim.context().counters.delivered, 1);
    }

    #[test]
    fn link_at_1000km_is_lost() {
        let mut sim = two_node_simulation(1_000_000.0);
        let (source, _) = connect_pair(&mut sim);
        send_at(&mut sim, SimTime::from_secs(1), source, 1000);
        sim.run_until(SimTime::from_secs(2)).unwrap();

        let flows = sim.finalize();
        let stats = flows.values().next().unwrap();
        assert_eq!(stats.rx_packets, 0);
        assert_eq!(stats.lost_packets, 1);
        assert_eq!(stats.packets_dropped, 1);
        assert_eq!(stats.throughput_bps(), 0.0);
        assert_eq!(sim.context().counters.lost, 1);
    }

    #[test]
    fn unknown_destination_counts_as_lost() {
        let mut sim = two_node_simulation(10.0);
        let ctx = sim.context_mut();
        let source = ctx.create_socket(0).unwrap();
        ctx.connect(source, SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), 9)).unwrap();
        send_at(&mut sim, SimTime::from_secs(1), source, 64);
        sim.run_until(SimTime::from_secs(2)).unwrap();
        assert_eq!(sim.finalize().values().next().unwrap().lost_packets, 1);
    }

    #[test]
    fn packets_without_callback_are_buffered() {
        let mut sim = two_node_simulation(10.0);
        let ctx = sim.context_mut();
        let sink = ctx.create_socket(1).unwrap();
        ctx.bind(sink, SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 9)).unwrap();
        let source = ctx.create_socket(0).unwrap();
        ctx.connect(source, SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9)).unwrap();
        send_at(&mut sim, SimTime::from_secs(1), source, 64);
        sim.run_until(SimTime::from_secs(2)).unwrap();

        let (packet, from) = sim.context_mut().recv_from(sink).unwrap().unwrap();
        assert_eq!(packet.size, 64);
        assert_eq!(*from.ip(), Ipv4Addr::new(10, 1, 1, 1));
    }

    #[test]
    fn send_on_closed_socket_is_invalid_state() {
        let mut sim = two_node_simulation(10.0);
        let (source, _) = connect_pair(&mut sim);
        sim.context_mut().close(source).unwrap();
        assert_eq!(sim.context().sockets.get(source).unwrap().state(), SocketState::Closed);
        let (scheduler, ctx) = sim.parts_mut();
        assert!(matches!(ctx.send(scheduler, source, 10), Err(SimError::InvalidState(_))));
    }

    #[test]
    fn invalid_frequency_is_rejected() {
        let loss = build_chain(&[LossModelSpec::Constant { loss_db: 0.0 }]).unwrap();
        let result = WirelessChannel::new(loss, PropagationDelayModel::Zero, 0.0, RngStreams::new(1).stream(CHANNEL_STREAM));
        assert!(result.is_err());
    }
}
