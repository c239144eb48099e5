//! Per-flow packet statistics.
//!
//! Packets are classified by their 5-tuple into flows numbered 1, 2, … in order of
//! first appearance. The monitor tracks every packet from transmission to reception
//! (or drop) by its uid and accumulates:
//! - transmitted / received packet and byte counts
//! - delay and jitter sums, first/last transmit and receive times
//! - drops reported by the channel
//!
//! `lost_packets` is only meaningful after `finalize()`.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use super::types::SimTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FiveTuple {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub source_port: u16,
    pub destination_port: u16,
}

impl std::fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} -> {}:{} (proto {})", self.source, self.source_port, self.destination, self.destination_port, self.protocol)
    }
}

pub type FlowId = u32;

/// Aggregated counters of one flow. Times are nanosecond `SimTime`s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub delay_sum: SimTime,
    pub jitter_sum: SimTime,
    pub last_delay: SimTime,
    pub time_first_tx: SimTime,
    pub time_last_tx: SimTime,
    pub time_first_rx: Option<SimTime>,
    pub time_last_rx: Option<SimTime>,
    pub lost_packets: u64,
    pub packets_dropped: u64,
}

impl FlowStats {
    fn new(first_tx: SimTime) -> Self {
        FlowStats {
            tx_packets: 0,
            tx_bytes: 0,
            rx_packets: 0,
            rx_bytes: 0,
            delay_sum: SimTime::ZERO,
            jitter_sum: SimTime::ZERO,
            last_delay: SimTime::ZERO,
            time_first_tx: first_tx,
            time_last_tx: first_tx,
            time_first_rx: None,
            time_last_rx: None,
            lost_packets: 0,
            packets_dropped: 0,
        }
    }

    /// Received bits per second between the first and last reception, 0 without a span.
    pub fn throughput_bps(&self) -> f64 {
        match (self.time_first_rx, self.time_last_rx) {
            (Some(first), Some(last)) if self.rx_packets > 0 && last > first => self.rx_bytes as f64 * 8.0 / (last - first).as_secs_f64(),
            _ => 0.0,
        }
    }

    /// Mean one-way delay in seconds, 0 when nothing was received.
    pub fn mean_delay(&self) -> f64 {
        if self.rx_packets == 0 {
            return 0.0;
        }
        self.delay_sum.as_secs_f64() / self.rx_packets as f64
    }

    /// Mean jitter in seconds over consecutive receptions, 0 with fewer than two.
    pub fn mean_jitter(&self) -> f64 {
        if self.rx_packets < 2 {
            return 0.0;
        }
        self.jitter_sum.as_secs_f64() / (self.rx_packets - 1) as f64
    }
}

/// One flow with its id and classifier entry, in flow-id order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRecord {
    pub flow_id: FlowId,
    pub tuple: FiveTuple,
    pub stats: FlowStats,
}

#[derive(Default)]
pub struct FlowMonitor {
    classifier: BTreeMap<FiveTuple, FlowId>,
    flows: BTreeMap<FlowId, (FiveTuple, FlowStats)>,
    in_flight: HashMap<u64, (FlowId, SimTime)>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn classify(&mut self, tuple: FiveTuple, time: SimTime) -> FlowId {
        if let Some(id) = self.classifier.get(&tuple) {
            return *id;
        }
        let id = self.classifier.len() as FlowId + 1;
        self.classifier.insert(tuple, id);
        self.flows.insert(id, (tuple, FlowStats::new(time)));
        log::debug!("New flow {}: {}", id, tuple);
        id
    }

    /// Record a transmission and start tracking `uid`.
    pub fn on_tx(&mut self, tuple: FiveTuple, uid: u64, size: u32, time: SimTime) -> FlowId {
        let id = self.classify(tuple, time);
        if let Some((_, stats)) = self.flows.get_mut(&id) {
            stats.tx_packets += 1;
            stats.tx_bytes += size as u64;
            stats.time_last_tx = time;
        }
        self.in_flight.insert(uid, (id, time));
        id
    }

    /// Record the reception of a tracked packet. Unknown or already-settled uids are ignored.
    pub fn on_rx(&mut self, tuple: FiveTuple, uid: u64, size: u32, time: SimTime) {
        let Some((id, tx_time)) = self.in_flight.remove(&uid) else {
            log::warn!("Reception of untracked packet {} on {}", uid, tuple);
            return;
        };
        let Some((_, stats)) = self.flows.get_mut(&id) else {
            return;
        };
        let delay = time - tx_time;
        if stats.rx_packets > 0 {
            let diff = delay.as_nanos() - stats.last_delay.as_nanos();
            stats.jitter_sum = stats.jitter_sum + SimTime::from_nanos(diff.abs());
        }
        stats.last_delay = delay;
        stats.delay_sum = stats.delay_sum + delay;
        stats.rx_packets += 1;
        stats.rx_bytes += size as u64;
        if stats.time_first_rx.is_none() {
            stats.time_first_rx = Some(time);
        }
        stats.time_last_rx = Some(time);
    }

    /// Record that the channel dropped a tracked packet.
    pub fn on_drop(&mut self, tuple: FiveTuple, uid: u64) {
        let Some((id, _)) = self.in_flight.remove(&uid) else {
            log::warn!("Drop of untracked packet {} on {}", uid, tuple);
            return;
        };
        if let Some((_, stats)) = self.flows.get_mut(&id) {
            stats.packets_dropped += 1;
        }
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn flow_id(&self, tuple: &FiveTuple) -> Option<FlowId> {
        self.classifier.get(tuple).copied()
    }

    /// Settle loss counts (`tx − rx`) and return the statistics keyed by 5-tuple.
    pub fn finalize(&mut self) -> BTreeMap<FiveTuple, FlowStats> {
        for (_, stats) in self.flows.values_mut() {
            stats.lost_packets = stats.tx_packets.saturating_sub(stats.rx_packets);
        }
        self.flows.values().map(|(tuple, stats)| (*tuple, stats.clone())).collect()
    }

    /// Flows in id order.
    pub fn records(&self) -> Vec<FlowRecord> {
        self.flows
            .iter()
            .map(|(id, (tuple, stats))| FlowRecord {
                flow_id: *id,
                tuple: *tuple,
                stats: stats.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::PROTOCOL_UDP;

    fn tuple(src_port: u16) -> FiveTuple {
        FiveTuple {
            source: Ipv4Addr::new(10, 1, 1, 1),
            destination: Ipv4Addr::new(10, 1, 1, 2),
            protocol: PROTOCOL_UDP,
            source_port: src_port,
            destination_port: 80,
        }
    }

    #[test]
    fn flows_numbered_in_order_of_first_packet() {
        let mut monitor = FlowMonitor::new();
        assert_eq!(monitor.on_tx(tuple(2000), 1, 100, SimTime::ZERO), 1);
        assert_eq!(monitor.on_tx(tuple(1000), 2, 100, SimTime::ZERO), 2);
        assert_eq!(monitor.on_tx(tuple(2000), 3, 100, SimTime::ZERO), 1);
        let ids: Vec<_> = monitor.records().iter().map(|r| (r.flow_id, r.tuple.source_port)).collect();
        assert_eq!(ids, vec![(1, 2000), (2, 1000)]);
    }

    #[test]
    fn delay_and_jitter_accumulate() {
        let mut monitor = FlowMonitor::new();
        let t = tuple(49153);
        monitor.on_tx(t, 1, 1000, SimTime::from_secs(1));
        monitor.on_rx(t, 1, 1000, SimTime::from_secs(1) + SimTime::from_millis(2));
        monitor.on_tx(t, 2, 1000, SimTime::from_secs(2));
        monitor.on_rx(t, 2, 1000, SimTime::from_secs(2) + SimTime::from_millis(5));
        monitor.on_tx(t, 3, 1000, SimTime::from_secs(3));
        monitor.on_rx(t, 3, 1000, SimTime::from_secs(3) + SimTime::from_millis(4));

        let flows = monitor.finalize();
        let stats = &flows[&t];
        assert_eq!(stats.rx_packets, 3);
        assert_eq!(stats.delay_sum, SimTime::from_millis(11));
        assert_eq!(stats.jitter_sum, SimTime::from_millis(4));
        assert_eq!(stats.last_delay, SimTime::from_millis(4));
        assert_eq!(stats.time_first_rx, Some(SimTime::from_millis(1002)));
        assert_eq!(stats.time_last_rx, Some(SimTime::from_millis(3004)));
        assert!((stats.mean_delay() - 0.011 / 3.0).abs() < 1e-12);
        assert!((stats.mean_jitter() - 0.002).abs() < 1e-12);
        assert!((stats.throughput_bps() - 3000.0 * 8.0 / 2.002).abs() < 1e-6);
    }

    #[test]
    fn lost_is_tx_minus_rx_after_finalize() {
        let mut monitor = FlowMonitor::new();
        let t = tuple(49153);
        for uid in 0..10 {
            monitor.on_tx(t, uid, 50, SimTime::from_secs(uid as i64));
        }
        for uid in 0..4 {
            monitor.on_rx(t, uid, 50, SimTime::from_secs(uid as i64));
        }
        monitor.on_drop(t, 4);
        assert_eq!(monitor.in_flight_count(), 5);
        assert_eq!(monitor.records()[0].stats.lost_packets, 0);

        let flows = monitor.finalize();
        let stats = &flows[&t];
        assert_eq!(stats.lost_packets, 6);
        assert_eq!(stats.packets_dropped, 1);
        assert!(stats.rx_packets <= stats.tx_packets);
    }

    #[test]
    fn zero_traffic_reports_zero() {
        let mut monitor = FlowMonitor::new();
        let t = tuple(49153);
        monitor.on_tx(t, 1, 1000, SimTime::from_secs(1));
        monitor.on_drop(t, 1);
        let flows = monitor.finalize();
        let stats = &flows[&t];
        assert_eq!(stats.throughput_bps(), 0.0);
        assert_eq!(stats.mean_delay(), 0.0);
        assert_eq!(stats.lost_packets, 1);
    }

    #[test]
    fn untracked_reception_is_ignored() {
        let mut monitor = FlowMonitor::new();
        let t = tuple(1);
        monitor.on_tx(t, 1, 10, SimTime::ZERO);
        monitor.on_rx(t, 1, 10, SimTime::from_secs(1));
        monitor.on_rx(t, 1, 10, SimTime::from_secs(2));
        assert_eq!(monitor.finalize()[&t].rx_packets, 1);
    }
}
