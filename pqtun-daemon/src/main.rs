//! CLI entry point: parses the role, config path, and identity directory,
//! then hands off to [`pqtun_daemon::run`].

use clap::Parser;
use pqtun_core::config::TunnelConfig;
use pqtun_core::types::Role;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "pqtun-daemon", about = "Post-quantum secure tunnel relay daemon")]
struct Args {
    /// "drone" or "gcs".
    #[arg(long)]
    role: String,

    /// Path to the TOML tunnel configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Directory holding peer public keys (`<peer>.pub`) and this
    /// process' generated signing key.
    #[arg(long, default_value = "./identity")]
    identity_dir: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let role = match Role::from_str(&args.role) {
        Ok(role) => role,
        Err(e) => {
            eprintln!("invalid --role: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = match TunnelConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    pqtun_daemon::logging::init_tracing(config.log_level.as_deref());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(pqtun_daemon::run(role, config, args.identity_dir)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("daemon exited with an error: {e}");
            ExitCode::FAILURE
        }
    }
}
