use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use attestor::anchor::batch::AnchorBatcher;
use attestor::anchor::ethereum::{EthereumAnchor, EthereumConfig};
use attestor::anchor::ledger::StatusLedger;
use attestor::anchor::scheduler::AnchorScheduler;
use attestor::anchor::AnchorClient;
use attestor::archive::ClaimArchive;
use attestor::bundle::BundleStore;
use attestor::config::Config;
use attestor::crypto::sign::Signer;
use attestor::error::{AttestError, Result};
use attestor::server::{self, AppState};
use attestor::verify;

#[derive(Parser)]
#[command(name = "attestor")]
#[command(about = "Evidence bundle attestation and daily blockchain anchoring")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server and daily anchor scheduler
    Serve,
    /// Anchor a single UTC day out of schedule (defaults to yesterday)
    Anchor {
        /// Target day, YYYYMMDD
        day: Option<String>,
    },
    /// Verify a stored evidence bundle
    Verify {
        /// Bundle id (hex bundle hash)
        bundle_id: String,
    },
    /// Show recent anchor status and health
    Status,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Anchor { day } => anchor_once(config, day).await,
        Commands::Verify { bundle_id } => verify_bundle(config, &bundle_id),
        Commands::Status => status(config),
    }
}

fn anchor_client(config: &Config) -> Result<Option<Arc<dyn AnchorClient>>> {
    match &config.anchor {
        Some(anchor) => {
            let client = EthereumAnchor::new(EthereumConfig {
                rpc_url: anchor.rpc_url.clone(),
                private_key_hex: anchor.private_key_hex.clone(),
                chain_id: anchor.chain_id,
                contract: anchor.contract.clone(),
                timeout: anchor.rpc_timeout,
            })?;
            Ok(Some(Arc::new(client)))
        }
        None => Ok(None),
    }
}

async fn serve(config: Config) -> Result<()> {
    let signer = Signer::from_seed(config.seed);
    let store = BundleStore::new(config.bundle_dir());
    let archive = Arc::new(ClaimArchive::new(config.archive_dir()));
    let ledger = Arc::new(StatusLedger::open(config.ledger_path())?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let batcher = match anchor_client(&config)? {
        Some(client) => {
            let batcher = Arc::new(AnchorBatcher::new(archive.clone(), ledger.clone(), client));
            let scheduler = AnchorScheduler::new(
                batcher.clone(),
                config.scheduler_state_path(),
                config.anchor_time_utc,
            );
            let scheduler_shutdown = shutdown_rx.clone();
            tokio::spawn(async move { scheduler.run(scheduler_shutdown).await });
            Some(batcher)
        }
        None => {
            warn!("anchoring is not configured; claims accumulate unanchored");
            None
        }
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let state = AppState {
        signer,
        store,
        archive,
        ledger,
        batcher,
        shutdown: shutdown_rx.clone(),
    };

    server::serve(state, &config.bind_addr, shutdown_rx).await
}

async fn anchor_once(config: Config, day: Option<String>) -> Result<()> {
    let client = anchor_client(&config)?.ok_or_else(|| {
        AttestError::Validation("anchoring is not configured (set ATTEST_RPC_URL)".into())
    })?;

    let target = match day {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y%m%d")
            .map_err(|e| AttestError::Validation(format!("day must be YYYYMMDD: {e}")))?,
        None => AnchorScheduler::target_day(Utc::now()),
    };

    let archive = Arc::new(ClaimArchive::new(config.archive_dir()));
    let ledger = Arc::new(StatusLedger::open(config.ledger_path())?);
    let batcher = AnchorBatcher::new(archive, ledger, client);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let entry = batcher.run_for_day(target, shutdown_rx).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&entry).map_err(|e| AttestError::Serialization(e.to_string()))?
    );
    Ok(())
}

fn verify_bundle(config: Config, bundle_id: &str) -> Result<()> {
    let store = BundleStore::new(config.bundle_dir());
    let bundle = store.load(bundle_id)?;
    let report = verify::verify(&bundle);

    println!(
        "{}",
        serde_json::to_string_pretty(&report).map_err(|e| AttestError::Serialization(e.to_string()))?
    );
    if !report.valid {
        std::process::exit(2);
    }
    Ok(())
}

fn status(config: Config) -> Result<()> {
    let ledger = StatusLedger::open(config.ledger_path())?;
    let healthy = ledger.healthy(Utc::now());

    match ledger.latest() {
        Some(entry) => println!(
            "latest: {}",
            serde_json::to_string_pretty(&entry)
                .map_err(|e| AttestError::Serialization(e.to_string()))?
        ),
        None => println!("latest: none"),
    }
    println!("entries: {}", ledger.snapshot().len());
    println!("healthy: {healthy}");
    Ok(())
}
