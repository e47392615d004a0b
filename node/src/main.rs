// Copyright (c) 2026 Taconomics. MIT License.
// See LICENSE for details.

//! # Taconomics Ledger Node
//!
//! Entry point for the `taco-node` binary. Loads settings, opens the ledger
//! database, deploys from genesis or restores the last committed state, and
//! serves the API and metrics until shut down.
//!
//! - `run`     start the node
//! - `init`    create a data directory with a default settings file and owner key
//! - `keygen`  generate a call-signing key
//! - `version` print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod settings;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use taconomics_contracts::host::{LedgerState, Taconomics};
use taconomics_contracts::liquidity::LockedPool;
use taconomics_protocol::auth::CallerKey;
use taconomics_protocol::storage::LedgerDB;

use cli::{Commands, TacoNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;
use settings::{ClockMode, NodeSettings, SETTINGS_FILE};

/// Capacity of the live event channel. Slow `/ws` clients past this lag
/// and skip records.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TacoNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Keygen(args) => keygen(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

async fn run_node(args: cli::RunArgs) -> Result<()> {
    let mut settings = NodeSettings::resolve(args.config.as_deref(), &args.data_dir)?;
    if let Some(port) = args.rpc_port {
        settings.rpc_port = port;
    }
    if let Some(port) = args.metrics_port {
        settings.metrics_port = port;
    }
    let log_format = args.log_format.map(LogFormat::from).unwrap_or(settings.log_format);
    logging::init_logging(logging::DEFAULT_FILTER, log_format);

    tracing::info!(
        rpc_port = settings.rpc_port,
        metrics_port = settings.metrics_port,
        clock = ?settings.clock.mode,
        data_dir = %args.data_dir.display(),
        "starting taco-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("ledger");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = LedgerDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Ledger host ---
    let journal = db.load_journal().context("failed to load event journal")?;
    let last_call = journal.records().last().map_or(0, |r| r.timestamp);
    let node_clock = settings.clock.build(last_call);
    let oracle = Arc::new(settings.genesis.reputation.clone());
    let pool = Arc::new(LockedPool::new());

    let snapshot: Option<LedgerState> = db.load_snapshot().context("failed to load snapshot")?;
    let mut host = match snapshot {
        Some(state) => {
            let covered = db.snapshot_seq()?.unwrap_or(0);
            if covered != journal.len() as u64 {
                bail!(
                    "snapshot covers {covered} events but the journal holds {}",
                    journal.len()
                );
            }
            Taconomics::restore(state, journal, node_clock.clock.clone(), oracle, pool)
        }
        None => {
            let host = Taconomics::deploy(
                &settings.genesis,
                node_clock.clock.clone(),
                oracle,
                pool,
            )
            .context("genesis deployment failed")?;
            tracing::info!(owner = %settings.genesis.owner, "deployed from genesis");
            host
        }
    };
    host.persist(&db).context("failed to persist ledger state")?;
    host.verify_invariants()
        .context("ledger invariants do not hold")?;

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics.observe(&host);

    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        host: host.shared(),
        db: db.clone(),
        metrics: Arc::clone(&node_metrics),
        event_tx,
        manual_clock: node_clock.manual,
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", settings.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {api_addr}"))?;
    tracing::info!(addr = %api_addr, "API server listening");

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", settings.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!(addr = %metrics_addr, "metrics server listening");

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "API server error");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "metrics server error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    db.flush().context("failed to flush database")?;
    tracing::info!("taco-node stopped");
    Ok(())
}

/// Creates the data directory and writes a default settings file.
/// File in the data directory holding the genesis owner's secret key.
const OWNER_KEY_FILE: &str = "owner.key";

/// Initializes a data directory and generates the genesis owner's key.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, LogFormat::Pretty);

    let data_dir = &args.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let path = data_dir.join(SETTINGS_FILE);
    let key_path = data_dir.join(OWNER_KEY_FILE);
    if !args.force {
        for existing in [&path, &key_path] {
            if existing.exists() {
                bail!("{} already exists (use --force to overwrite)", existing.display());
            }
        }
    }

    let owner = CallerKey::generate();
    write_secret_key(&key_path, &owner)?;

    let mut settings = NodeSettings::default();
    settings.genesis.owner = owner.address();
    if args.devnet {
        settings.clock.mode = ClockMode::Manual;
    }
    std::fs::write(&path, settings.to_toml()?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        key_path = %key_path.display(),
        owner = %settings.genesis.owner,
        devnet = args.devnet,
        "settings and owner key written"
    );

    println!("Node initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Settings       : {}", path.display());
    println!("  Clock          : {:?}", settings.clock.mode);
    println!("  Owner          : {}", settings.genesis.owner);
    println!("  Owner key      : {}", key_path.display());
    Ok(())
}

/// Generates a call-signing key and prints or saves it.
fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let key = CallerKey::generate();
    println!("Address        : {}", key.address());
    println!("Public key     : {}", key.public_key_hex());
    match args.out {
        Some(path) => {
            write_secret_key(&path, &key)?;
            println!("Secret key     : {}", path.display());
        }
        None => println!("Secret key     : {}", key.secret_hex()),
    }
    Ok(())
}

/// Writes `key` as hex, readable by the owner only on Unix.
fn write_secret_key(path: &std::path::Path, key: &CallerKey) -> Result<()> {
    std::fs::write(path, key.secret_hex())
        .with_context(|| format!("failed to write key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }
    Ok(())
}

fn print_version() {
    println!("taco-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc     {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Resolves on SIGINT or SIGTERM. Non-Unix platforms only see Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
