//! Per-second receive-rate sampling.
//!
//! Socket receive callbacks update the `SinkCounters`; once per sampling interval the
//! sampler turns them into a row (time, kb/s, packets, sinks, protocol, tx power),
//! appends it to the CSV file if one is configured, and resets the counters.

use serde::Serialize;

use super::network::SimulationContext;
use super::scheduler::Scheduler;
use super::types::SimTime;
use crate::error::SimError;
use crate::report::csv::CsvAppender;

/// CSV header of the receive-rate file.
pub const THROUGHPUT_CSV_HEADER: &str = "SimulationSecond,ReceiveRate,PacketsReceived,NumberOfSinks,RoutingProtocol,TransmissionPower";

/// Bytes and packets received by sink sockets since the last sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkCounters {
    pub bytes: u64,
    pub packets: u64,
}

impl SinkCounters {
    pub fn record(&mut self, size: u32) {
        self.bytes += size as u64;
        self.packets += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputSample {
    pub second: f64,
    pub receive_rate_kbps: f64,
    pub packets_received: u64,
    pub sinks: u32,
    pub protocol: String,
    pub tx_power_dbm: f64,
}

impl ThroughputSample {
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.second, self.receive_rate_kbps, self.packets_received, self.sinks, self.protocol, self.tx_power_dbm
        )
    }
}

pub struct ThroughputSampler {
    pub sink_counters: SinkCounters,
    interval: SimTime,
    sinks: u32,
    protocol: String,
    tx_power_dbm: f64,
    csv: Option<CsvAppender>,
    samples: Vec<ThroughputSample>,
}

impl Default for ThroughputSampler {
    fn default() -> Self {
        Self::new(0, "none", 0.0)
    }
}

impl ThroughputSampler {
    pub fn new(sinks: u32, protocol: &str, tx_power_dbm: f64) -> Self {
        ThroughputSampler {
            sink_counters: SinkCounters::default(),
            interval: SimTime::from_secs(1),
            sinks,
            protocol: protocol.to_string(),
            tx_power_dbm,
            csv: None,
            samples: Vec::new(),
        }
    }

    /// Append every sample to `csv`.
    pub fn with_csv(mut self, csv: CsvAppender) -> Self {
        self.csv = Some(csv);
        self
    }

    pub fn interval(&self) -> SimTime {
        self.interval
    }

    pub fn samples(&self) -> &[ThroughputSample] {
        &self.samples
    }

    /// Close the current interval at `now`: emit a row and reset the counters.
    pub fn sample(&mut self, now: SimTime) -> Result<&ThroughputSample, SimError> {
        let kbits = self.sink_counters.bytes as f64 * 8.0 / 1000.0;
        let sample = ThroughputSample {
            second: now.as_secs_f64(),
            receive_rate_kbps: kbits / self.interval.as_secs_f64(),
            packets_received: self.sink_counters.packets,
            sinks: self.sinks,
            protocol: self.protocol.clone(),
            tx_power_dbm: self.tx_power_dbm,
        };
        if let Some(csv) = self.csv.as_mut() {
            csv.append_row(&sample.csv_row())?;
        }
        log::debug!("t={} receive rate {} kb/s ({} packets)", now, sample.receive_rate_kbps, sample.packets_received);
        self.sink_counters = SinkCounters::default();
        self.samples.push(sample);
        Ok(&self.samples[self.samples.len() - 1])
    }
}

/// Sample at `first` and then every interval while the run continues.
pub fn start_sampling(scheduler: &mut Scheduler<SimulationContext>, first: SimTime) -> Result<(), SimError> {
    scheduler.schedule_at(first, sample_and_reschedule)?;
    Ok(())
}

fn sample_and_reschedule(scheduler: &mut Scheduler<SimulationContext>, ctx: &mut SimulationContext) -> Result<(), SimError> {
    ctx.throughput.sample(scheduler.now())?;
    let interval = ctx.throughput.interval();
    scheduler.schedule(interval, sample_and_reschedule)?;
    Ok(())
}
