//! Flow statistics output: XML dump, JSON report and console summary.
//!
//! The XML layout follows the usual flow-monitor format:
//! `FlowMonitor` → `FlowStats` (one `Flow` per flow id) and `Ipv4FlowClassifier`
//! (the 5-tuple of each flow id). Times are written as `+<nanoseconds>ns`.

use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::SimError;
use crate::simulation::flow_monitor::FlowRecord;
use crate::simulation::types::SimTime;

fn ns(time: SimTime) -> String {
    format!("{:+}ns", time.as_nanos())
}

/// Render flow records as a flow-monitor XML document.
pub fn flowmon_xml(records: &[FlowRecord]) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" ?>\n<FlowMonitor>\n  <FlowStats>\n");
    for record in records {
        let s = &record.stats;
        let _ = write!(
            xml,
            "    <Flow flowId=\"{}\" timeFirstTxPacket=\"{}\" timeFirstRxPacket=\"{}\" timeLastTxPacket=\"{}\" timeLastRxPacket=\"{}\" delaySum=\"{}\" jitterSum=\"{}\" lastDelay=\"{}\" txBytes=\"{}\" rxBytes=\"{}\" txPackets=\"{}\" rxPackets=\"{}\" lostPackets=\"{}\" timesForwarded=\"0\">\n",
            record.flow_id,
            ns(s.time_first_tx),
            ns(s.time_first_rx.unwrap_or(SimTime::ZERO)),
            ns(s.time_last_tx),
            ns(s.time_last_rx.unwrap_or(SimTime::ZERO)),
            ns(s.delay_sum),
            ns(s.jitter_sum),
            ns(s.last_delay),
            s.tx_bytes,
            s.rx_bytes,
            s.tx_packets,
            s.rx_packets,
            s.lost_packets
        );
        if s.packets_dropped > 0 {
            let _ = writeln!(xml, "      <packetsDropped reasonCode=\"0\" number=\"{}\" />", s.packets_dropped);
        }
        xml.push_str("    </Flow>\n");
    }
    xml.push_str("  </FlowStats>\n  <Ipv4FlowClassifier>\n");
    for record in records {
        let t = &record.tuple;
        let _ = writeln!(
            xml,
            "    <Flow flowId=\"{}\" sourceAddress=\"{}\" destinationAddress=\"{}\" protocol=\"{}\" sourcePort=\"{}\" destinationPort=\"{}\" />",
            record.flow_id, t.source, t.destination, t.protocol, t.source_port, t.destination_port
        );
    }
    xml.push_str("  </Ipv4FlowClassifier>\n</FlowMonitor>\n");
    xml
}

pub fn write_flowmon_xml(path: &Path, records: &[FlowRecord]) -> Result<(), SimError> {
    fs::write(path, flowmon_xml(records))?;
    log::info!("Wrote {} flow records to {}", records.len(), path.display());
    Ok(())
}

/// JSON flow report of one run.
#[derive(Debug, Serialize)]
pub struct FlowReport<'a> {
    pub scenario: &'a str,
    pub protocol: Option<&'a str>,
    pub flows: Vec<FlowSummary<'a>>,
}

/// A flow record with its derived metrics.
#[derive(Debug, Serialize)]
pub struct FlowSummary<'a> {
    #[serde(flatten)]
    pub record: &'a FlowRecord,
    pub throughput_bps: f64,
    pub mean_delay_s: f64,
    pub mean_jitter_s: f64,
}

impl<'a> FlowReport<'a> {
    pub fn new(scenario: &'a str, protocol: Option<&'a str>, records: &'a [FlowRecord]) -> Self {
        FlowReport {
            scenario,
            protocol,
            flows: records
                .iter()
                .map(|record| FlowSummary {
                    record,
                    throughput_bps: record.stats.throughput_bps(),
                    mean_delay_s: record.stats.mean_delay(),
                    mean_jitter_s: record.stats.mean_jitter(),
                })
                .collect(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| SimError::Io(e.into()))?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Human-readable metrics of one flow, as printed at the end of a run.
pub fn flow_summary(record: &FlowRecord) -> String {
    let s = &record.stats;
    let mean_delay = s.mean_delay();
    let mean_jitter = s.mean_jitter();
    let mut out = String::new();
    let _ = writeln!(out, "Flow {} ({} -> {})", record.flow_id, record.tuple.source, record.tuple.destination);
    let _ = writeln!(out, "  Tx Packets:       {}", s.tx_packets);
    let _ = writeln!(out, "  Tx Bytes:         {}", s.tx_bytes);
    let _ = writeln!(out, "  Rx Packets:       {}", s.rx_packets);
    let _ = writeln!(out, "  Rx Bytes:         {}", s.rx_bytes);
    let _ = writeln!(out, "  Lost Packets:     {}", s.lost_packets);
    let _ = writeln!(out, "  Delay Sum:        {:.9}s", s.delay_sum.as_secs_f64());
    let _ = writeln!(out, "  Jitter Sum:       {:.9}s", s.jitter_sum.as_secs_f64());
    let _ = writeln!(out, "  Throughput:       {:.0} bps", s.throughput_bps());
    let _ = writeln!(out, "  Mean Delay:       {:.9}s", mean_delay);
    let _ = writeln!(out, "  Minimum Delay:    {:.9}s", (mean_delay - mean_jitter).max(0.0));
    let _ = writeln!(out, "  Maximum Delay:    {:.9}s", mean_delay + mean_jitter);
    let _ = write!(out, "  Round Trip Delay: {:.9}s", 2.0 * mean_delay);
    out
}
