//! The binary coretax-fetch.
//!
//! Advances a detail fetch run by one invocation (or until completion) for
//! a list of record identifiers read from a file, persisting progress in
//! the configured SQLite database.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use coretax_fetch_lib::infrastructure::{
    ConfigManager, CoretaxClient, CoretaxClientConfig, HttpDetailFetcher, HttpSessionKeeper,
    SqliteRunStateStore, init_logging_with_config,
};
use coretax_fetch_lib::{
    ChunkScheduler, CompletionStatus, Credential, DocumentCollection, FetchContext, RecordId,
    RunIdentity, TaxPeriod,
};

#[derive(clap::Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Configuration file (JSON or TOML). Defaults to the user config
    /// directory when a config.json exists there.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bearer token of a logged-in portal session.
    #[arg(long, env = "CORETAX_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Taxpayer aggregate identifier embedded in every detail request.
    #[arg(long, env = "CORETAX_TAXPAYER_ID")]
    pub taxpayer_id: String,

    /// Document collection to fetch details from.
    #[arg(long, default_value = "output-invoice")]
    pub collection: DocumentCollection,

    /// Tax period month (1-12).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
    pub month: u8,

    #[arg(long)]
    pub year: i32,

    /// Row count requested from the list call; part of the run identity.
    #[arg(long, default_value_t = 200)]
    pub rows: u32,

    /// File with one record identifier per line.
    #[arg(long)]
    pub ids: PathBuf,

    /// Keep advancing until the run completes instead of suspending.
    #[arg(long)]
    pub until_complete: bool,

    /// Discard any saved progress for this collection before starting.
    #[arg(long)]
    pub reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = <Args as clap::Parser>::parse();

    let config = ConfigManager::new(args.config.as_deref()).load()?;
    init_logging_with_config(&config.logging)?;

    let period = TaxPeriod::new(args.month, args.year)
        .with_context(|| format!("Invalid tax period {}/{}", args.month, args.year))?;
    let identity = RunIdentity::for_period(args.collection, period, args.rows);
    let ids = read_record_ids(&args.ids).await?;

    let client = CoretaxClient::new(CoretaxClientConfig::from(&config.http))?;
    let keeper = Arc::new(HttpSessionKeeper::from_config(client.clone(), &config)?);
    let fetcher = Arc::new(HttpDetailFetcher::new(client));
    let store = SqliteRunStateStore::connect(&config.store.database_url).await?;
    let scheduler = ChunkScheduler::new(fetcher, keeper, store);

    let base_url = Url::parse(&config.portal.base_url)
        .with_context(|| format!("Invalid portal base URL: {}", config.portal.base_url))?;
    let ctx = FetchContext::for_collection(
        &base_url,
        args.collection,
        Credential::bearer(args.token),
        args.taxpayer_id,
        config.fetch.to_limits(),
    )?;

    if args.reset {
        scheduler.reset(&identity).await?;
    }

    info!(run = %identity, records = ids.len(), "Fetching {} details for {}", args.collection, period);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current chunk");
                interrupted.store(true, Ordering::SeqCst);
            }
        });
    }

    loop {
        match scheduler.advance(&identity, &ids, &ctx).await? {
            CompletionStatus::Suspended(progress) => {
                println!("{progress} [{:.1}%]", progress.fraction() * 100.0);
                if !args.until_complete || interrupted.load(Ordering::SeqCst) {
                    println!("Run suspended; invoke again to continue.");
                    return Ok(());
                }
            }
            CompletionStatus::Completed(report) => {
                let summary = json!({
                    "collection": args.collection,
                    "period": period.code(),
                    "year": period.year(),
                    "total": report.total,
                    "succeeded": report.results.len(),
                    "exhausted": report.exhausted_failures.len(),
                    "exhausted_failures": report.exhausted_failures,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
        }
    }
}

/// One identifier per line; blank lines are skipped.
async fn read_record_ids(path: &Path) -> Result<Vec<RecordId>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read record identifiers from {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(RecordId::from)
        .collect())
}
