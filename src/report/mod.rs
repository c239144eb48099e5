//! Output files produced at the end of (or during) a run.
//!
//! - `csv`: append-only receive-rate file
//! - `flowmon`: flow-monitor XML, JSON flow report and console summaries

pub mod csv;
pub mod flowmon;
