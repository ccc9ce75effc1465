#![forbid(unsafe_code)]

//! Prometheus metrics exporter and atomic JSON status-file writer for
//! the pqtun tunnel core (spec §6.4, SPEC_FULL §4.11). Both consume
//! [`pqtun_core::counters::CountersSnapshot`] — this crate owns no
//! counters of its own, only their external representation.

pub mod metrics;
pub mod status;

pub use metrics::MetricsExporter;
pub use status::{format_session_id, spawn_periodic_writer, write_status_file, StatusSnapshot};
