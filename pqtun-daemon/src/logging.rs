//! Structured logging init, grounded in the teacher daemon's
//! `init_tracing()`: an `EnvFilter` seeded from `RUST_LOG`, falling back to
//! the configured `log_level` (spec §6.1's optional `log_level` key) and
//! finally to `info`.

use tracing_subscriber::EnvFilter;

pub fn init_tracing(configured_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(configured_level.unwrap_or("info"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
