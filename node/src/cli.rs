//! # CLI Interface
//!
//! Command-line arguments for `taco-node`, built with `clap` derive.
//! Subcommands: `run`, `init`, `keygen` and `version`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Taconomics ledger node.
///
/// Hosts the $TACO token and the crowdsale controller, persists every
/// committed call, and serves REST, JSON-RPC and Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "taco-node",
    about = "Taconomics ledger node",
    version,
    propagate_version = true
)]
pub struct TacoNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node. Deploys from genesis on first run, restores after.
    Run(RunArgs),
    /// Create a data directory with a default settings file and an owner key.
    Init(InitArgs),
    /// Generate a call-signing key.
    Keygen(KeygenArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the settings file (TOML).
    ///
    /// When omitted, the node looks for `taco.toml` in the data directory
    /// and falls back to built-in defaults.
    #[arg(long, short = 'c', env = "TACO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the ledger database.
    #[arg(long, short = 'd', env = "TACO_DATA_DIR", default_value = "./taco-data")]
    pub data_dir: PathBuf,

    /// Port for the REST and JSON-RPC API. Overrides the settings file.
    #[arg(long, env = "TACO_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint. Overrides the settings file.
    #[arg(long, env = "TACO_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Log output format. Overrides the settings file.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormatArg>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Data directory to initialize.
    #[arg(long, short = 'd', env = "TACO_DATA_DIR", default_value = "./taco-data")]
    pub data_dir: PathBuf,

    /// Use a manual clock that only moves on `dev_increaseTime`.
    #[arg(long)]
    pub devnet: bool,

    /// Overwrite an existing settings file and owner key.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Write the secret key here instead of printing it.
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
