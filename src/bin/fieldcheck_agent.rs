use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use fieldcheck::application::services::checkin_codec::encode_claim;
use fieldcheck::domain::entities::checkin_claim::signed_message;
use fieldcheck::domain::entities::{CheckinClaim, LocationSample};
use fieldcheck::domain::value_objects::SiteId;
use fieldcheck::infrastructure::crypto::ClaimSigner;
use fieldcheck::{AppConfig, AppState};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fieldcheck-agent")]
#[command(about = "Offline-first field check-in agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables override it)
    #[arg(short, long, env = "FIELDCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(short, long, default_value = "fieldcheck=debug,info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background sync loop until Ctrl-C
    Run,
    /// Run a single sync pass and exit
    SyncOnce,
    /// Print the check-in report as JSON
    Report,
    /// Record a check-in from a scanned QR payload and a location reading
    Checkin {
        /// Raw QR payload text
        #[arg(long)]
        qr: String,
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
        /// Accuracy radius in meters
        #[arg(long)]
        accuracy: f64,
    },
    /// Issue a signed QR payload for a site
    IssueQr {
        #[arg(long)]
        site: String,
        /// Site secret key (hex)
        #[arg(long, env = "FIELDCHECK_SITE_SECRET", hide_env_values = true)]
        secret: String,
        /// Issue time as unix seconds (defaults to now)
        #[arg(long)]
        issued_at: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    fieldcheck::init_logging_with(&cli.log_level, cli.json_logs)?;

    if let Commands::IssueQr {
        site,
        secret,
        issued_at,
    } = &cli.command
    {
        return issue_qr(site, secret, *issued_at);
    }

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::from_env(),
    };

    info!("Starting fieldcheck agent v{}", env!("CARGO_PKG_VERSION"));
    let state = AppState::initialize(config).await?;

    let result = match cli.command {
        Commands::Run => run(&state).await,
        Commands::SyncOnce => {
            state.sync_engine.recover().await?;
            let pass = state.sync_engine.run_once().await?;
            info!(?pass, "Sync pass finished");
            Ok(())
        }
        Commands::Report => {
            let report = state.reports.summarize().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Checkin {
            qr,
            latitude,
            longitude,
            accuracy,
        } => {
            let sample = LocationSample::new(latitude, longitude, accuracy, Utc::now())
                .map_err(anyhow::Error::msg)?;
            let event = state.coordinator.submit_checkin(&qr, sample).await?;
            println!("{}", event.id);
            Ok(())
        }
        Commands::IssueQr { .. } => Ok(()),
    };

    state.shutdown().await;
    result
}

async fn run(state: &AppState) -> Result<()> {
    if !state.config.sync.auto_sync {
        warn!("Automatic sync is disabled; waiting for Ctrl-C");
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let handle = state.sync_engine.clone().spawn();
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown requested; finishing in-flight batch");
    handle.stop().await?;

    let status = state.sync_engine.status().await;
    info!(pending = status.pending_events, "Sync loop stopped");
    Ok(())
}

fn issue_qr(site: &str, secret: &str, issued_at: Option<i64>) -> Result<()> {
    let site_id = SiteId::new(site.to_string()).map_err(anyhow::Error::msg)?;
    let issued_at = match issued_at {
        Some(secs) => DateTime::from_timestamp(secs, 0).context("issued_at out of range")?,
        None => Utc::now(),
    };
    let signer = ClaimSigner::from_hex(secret)?;
    let signature = signer.sign(&signed_message(&site_id, issued_at.timestamp()));
    let claim = CheckinClaim::new(site_id, issued_at, signature);
    println!("{}", encode_claim(&claim)?);
    Ok(())
}
