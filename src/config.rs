//! Service configuration.

use crate::generator::DEFAULT_ITERATION_CAP;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// Directory holding the ledger, cursor, rooms and template pools
    pub data_dir: PathBuf,
    /// Default log filter when RUST_LOG is unset
    pub log_filter: String,
    /// Pool scans allowed per class before it is abandoned
    pub iteration_cap: usize,
    /// Keep per-user ledgers in process memory instead of the data directory
    pub memory_kv: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            data_dir: PathBuf::from("./data"),
            log_filter: "info".to_string(),
            iteration_cap: DEFAULT_ITERATION_CAP,
            memory_kv: false,
        }
    }
}

/// Command-line arguments for the timetable server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Data directory for ledger state and catalogs
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Keep per-user ledgers in memory only
    #[arg(long)]
    pub memory_kv: bool,
}

impl From<Args> for ServiceConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.bind,
            data_dir: args.data_dir,
            log_filter: args.log_filter,
            memory_kv: args.memory_kv,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_override_defaults() {
        let args = Args::parse_from(["timetable_engine", "--bind", "0.0.0.0:9000", "--data-dir", "/tmp/tt"]);
        let config = ServiceConfig::from(args);
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/tt"));
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.iteration_cap, DEFAULT_ITERATION_CAP);
        assert!(!config.memory_kv);
    }
}
