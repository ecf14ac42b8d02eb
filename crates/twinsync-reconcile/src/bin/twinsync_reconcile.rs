//! Offline replay of one background synchronization pass.
//!
//! Reads both feeds from JSON-lines exports, answers policy revision queries
//! from a JSON map, and prints the inconsistent entity IDs.
//!
//! ## Usage
//!
//! ```bash
//! # IDs to repair, one per line
//! twinsync-reconcile --persisted persisted.jsonl --indexed indexed.jsonl --policies policies.json
//!
//! # Full report with a pinned reference time
//! twinsync-reconcile --persisted p.jsonl --indexed i.jsonl \
//!     --reference-time 2026-01-01T12:00:00Z --format json
//! ```
//!
//! Every option not given on the command line falls back to its `TWINSYNC_*`
//! environment variable, then to the built-in default.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use twinsync_core::PolicyRef;
use twinsync_core::observability::{LogFormat, init_logging};
use twinsync_reconcile::config::{SyncConfig, parse_reference_time};
use twinsync_reconcile::feed::JsonLinesFeed;
use twinsync_reconcile::report::PassReport;
use twinsync_reconcile::throttle::ThrottleConfig;
use twinsync_reconcile::verify::StaticPolicyAuthority;
use twinsync_reconcile::BackgroundSync;

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// One inconsistent entity ID per line.
    #[default]
    Ids,
    /// The full pass report as JSON.
    Json,
}

/// Replays one reconciliation pass between a persisted and an indexed feed.
#[derive(Debug, Parser)]
#[command(name = "twinsync-reconcile")]
#[command(about = "Reports entities whose search index entry has drifted from the store")]
#[command(version)]
struct Args {
    /// Persisted-side feed (JSON lines, ascending by entityId).
    #[arg(long)]
    persisted: PathBuf,

    /// Indexed-side feed (JSON lines, ascending by entityId).
    #[arg(long)]
    indexed: PathBuf,

    /// Policy revisions as a JSON object (`{"policyRef": revision}`).
    #[arg(long)]
    policies: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Ids)]
    format: OutputFormat,

    /// Tolerance window in milliseconds.
    #[arg(long)]
    tolerance_window_ms: Option<u64>,

    /// Verification request timeout in milliseconds.
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Maximum concurrent verification requests.
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Reference "now" for the tolerance window (RFC3339).
    #[arg(long, value_parser = parse_reference_arg)]
    reference_time: Option<DateTime<Utc>>,

    /// Persisted records allowed per throttle period.
    #[arg(long, requires = "throttle_period_ms")]
    throttle_throughput: Option<u32>,

    /// Throttle period in milliseconds.
    #[arg(long, requires = "throttle_throughput")]
    throttle_period_ms: Option<u64>,

    /// Fail the pass on out-of-order feed input.
    #[arg(long)]
    strict_ordering: bool,
}

impl Args {
    /// Layers command-line flags over the environment configuration.
    fn config(&self) -> Result<SyncConfig> {
        let mut config = SyncConfig::from_env().context("invalid TWINSYNC_* configuration")?;

        if let Some(ms) = self.tolerance_window_ms {
            config.tolerance_window_ms = ms;
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout_ms = ms;
        }
        if let Some(limit) = self.max_in_flight {
            config.max_in_flight_verifications = limit;
        }
        if let Some(reference_time) = self.reference_time {
            config.reference_time = Some(reference_time);
        }
        if let (Some(throughput), Some(period_ms)) =
            (self.throttle_throughput, self.throttle_period_ms)
        {
            config.throttle = Some(ThrottleConfig {
                throughput,
                period_ms,
            });
        }
        if self.strict_ordering {
            config.strict_ordering = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_reference_arg(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_reference_time("--reference-time", value).map_err(|e| e.to_string())
}

async fn load_policies(path: &Path) -> Result<StaticPolicyAuthority> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let revisions: HashMap<PolicyRef, u64> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a policy revision map", path.display()))?;
    Ok(revisions.into_iter().collect())
}

fn print_report(report: &PassReport, format: OutputFormat) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Ids => {
            for id in report.entity_ids() {
                writeln!(out, "{id}")?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, report)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LogFormat::from_env());

    let args = Args::parse();
    let config = args.config()?;

    let authority = match &args.policies {
        Some(path) => load_policies(path).await?,
        None => StaticPolicyAuthority::new(),
    };
    tracing::info!(policies = authority.len(), "policy authority loaded");

    let persisted = JsonLinesFeed::open(&args.persisted).await?;
    let indexed = JsonLinesFeed::open(&args.indexed).await?;
    let sync = BackgroundSync::new(Arc::new(authority), config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let report = sync
        .run_pass_cancellable(persisted, indexed, &cancel)
        .await?;
    print_report(&report, args.format)
}
