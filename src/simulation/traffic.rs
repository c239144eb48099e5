//! Periodic packet source.
//!
//! A `TrafficGenerator` sends `count` packets of `packet_size` bytes through a connected
//! socket, `interval` apart. Each firing sends one packet and schedules the next; the
//! socket is closed right after the last send.

use super::network::SimulationContext;
use super::scheduler::{EventHandle, Scheduler};
use super::types::{SimTime, SocketId};
use crate::error::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficGenerator {
    socket: SocketId,
    packet_size: u32,
    interval: SimTime,
    remaining: u32,
}

impl TrafficGenerator {
    pub fn new(socket: SocketId, packet_size: u32, interval: SimTime, count: u32) -> Self {
        TrafficGenerator {
            socket,
            packet_size,
            interval,
            remaining: count,
        }
    }

    /// Schedule the first send `start_delay` from now.
    ///
    /// # Returns
    ///
    /// The handle of the first firing, or `InvalidArgument` for a negative delay or interval.
    pub fn start(self, scheduler: &mut Scheduler<SimulationContext>, start_delay: SimTime) -> Result<EventHandle, SimError> {
        if self.interval.is_negative() {
            return Err(SimError::invalid_argument(format!("traffic interval must be non-negative, got {}", self.interval)));
        }
        scheduler.schedule(start_delay, move |scheduler: &mut Scheduler<SimulationContext>, ctx: &mut SimulationContext| self.fire(scheduler, ctx))
    }

    fn fire(mut self, scheduler: &mut Scheduler<SimulationContext>, ctx: &mut SimulationContext) -> Result<(), SimError> {
        if self.remaining == 0 {
            return self.finish(scheduler, ctx);
        }
        match ctx.send(scheduler, self.socket, self.packet_size) {
            Ok(_) => {}
            Err(err) if err.is_socket_local() => {
                log::warn!("t={} traffic on {} stopped: {}", scheduler.now(), self.socket, err);
                return Ok(());
            }
            Err(err) => return Err(err),
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            return self.finish(scheduler, ctx);
        }
        scheduler.schedule(self.interval, move |scheduler: &mut Scheduler<SimulationContext>, ctx: &mut SimulationContext| self.fire(scheduler, ctx))?;
        Ok(())
    }

    fn finish(self, scheduler: &mut Scheduler<SimulationContext>, ctx: &mut SimulationContext) -> Result<(), SimError> {
        log::debug!("t={} traffic on {} finished, closing socket", scheduler.now(), self.socket);
        if let Err(err) = ctx.close(self.socket) {
            if !err.is_socket_local() {
                return Err(err);
            }
            log::warn!("Closing {} failed: {}", self.socket, err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::mobility::ConstantPosition;
    use crate::simulation::network::{Simulation, WirelessChannel};
    use crate::simulation::node::{NodeContainer, WifiPhy};
    use crate::simulation::propagation::{FriisParameters, LossModelSpec, PropagationDelayModel, build_chain};
    use crate::simulation::random::{CHANNEL_STREAM, RngStreams};
    use crate::simulation::routing::{RoutingProtocol, RoutingProtocolKind};
    use crate::simulation::socket::SocketState;
    use crate::simulation::types::Position;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn simulation() -> (Simulation, SocketId) {
        let mut nodes = NodeContainer::default();
        for x in [0.0, 500.0] {
            nodes.add(Box::new(ConstantPosition::new(Position::new(x, 0.0, 0.0))), WifiPhy::default()).unwrap();
        }
        RoutingProtocolKind::Olsr.install(&mut nodes).unwrap();
        let loss = build_chain(&[LossModelSpec::Friis(FriisParameters::default())]).unwrap();
        let channel = WirelessChannel::new(loss, PropagationDelayModel::default(), 2.4e9, RngStreams::new(1).stream(CHANNEL_STREAM)).unwrap();
        let mut sim = Simulation::new(SimulationContext::new(nodes, channel));
        let ctx = sim.context_mut();
        let sink = ctx.create_socket(1).unwrap();
        ctx.bind(sink, SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 80)).unwrap();
        let source = ctx.create_socket(0).unwrap();
        ctx.connect(source, SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 80)).unwrap();
        (sim, source)
    }

    #[test]
    fn thousand_sends_end_at_500_5_seconds_and_close() {
        let (mut sim, source) = simulation();
        TrafficGenerator::new(source, 1000, SimTime::from_millis(500), 1000)
            .start(sim.scheduler_mut(), SimTime::from_secs(1))
            .unwrap();

        sim.run_until(SimTime::from_secs_f64(500.5)).unwrap();
        let flows = sim.finalize();
        let stats = flows.values().next().unwrap();
        assert_eq!(stats.tx_packets, 1000);
        assert_eq!(stats.time_first_tx, SimTime::from_secs(1));
        assert_eq!(stats.time_last_tx, SimTime::from_secs_f64(500.5));
        assert_eq!(sim.context().sockets.get(source).unwrap().state(), SocketState::Closed);

        sim.run_until(SimTime::from_secs(505)).unwrap();
        let flows = sim.finalize();
        let stats = flows.values().next().unwrap();
        assert_eq!(stats.tx_packets, 1000);
        assert_eq!(stats.rx_packets, 1000);
        assert_eq!(stats.lost_packets, 0);
    }

    #[test]
    fn zero_count_closes_at_start() {
        let (mut sim, source) = simulation();
        TrafficGenerator::new(source, 1000, SimTime::from_millis(500), 0)
            .start(sim.scheduler_mut(), SimTime::from_secs(1))
            .unwrap();
        sim.run_until(SimTime::from_secs(2)).unwrap();
        assert_eq!(sim.context().sockets.get(source).unwrap().state(), SocketState::Closed);
        assert_eq!(sim.context().monitor.flow_count(), 0);
    }

    #[test]
    fn send_on_closed_socket_stops_generator_without_failing_run() {
        let (mut sim, source) = simulation();
        TrafficGenerator::new(source, 100, SimTime::from_secs(1), 10)
            .start(sim.scheduler_mut(), SimTime::from_secs(1))
            .unwrap();
        sim.scheduler_mut()
            .schedule(SimTime::from_millis(3500), move |_: &mut Scheduler<SimulationContext>, ctx: &mut SimulationContext| ctx.close(source))
            .unwrap();
        sim.run_until(SimTime::from_secs(20)).unwrap();

        let flows = sim.finalize();
        assert_eq!(flows.values().next().unwrap().tx_packets, 3);
        assert_eq!(sim.scheduler_mut().pending_count(), 0);
    }
}
