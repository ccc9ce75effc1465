#![forbid(unsafe_code)]

//! Shared types, configuration, error taxonomy, and counters for the
//! drone/GCS secure tunnel workspace.
//!
//! This crate intentionally stays small and dependency-light: it holds
//! nothing that touches a socket or a cryptographic primitive, only the
//! value types and process-wide bookkeeping every other crate in the
//! workspace needs.

pub mod config;
pub mod counters;
pub mod error;
pub mod suites;
pub mod types;

pub use config::{DeploymentMode, TunnelConfig};
pub use counters::{Counters, CountersSnapshot, DurationStats, DurationStatsSnapshot};
pub use error::{DropReason, Error, Result};
pub use suites::{AeadToken, BackendCapabilities, Suite, UnavailableReason, DEFAULT_SUITE_ID};
pub use types::{HeaderIds, Role, SuiteId, TimestampMs};
