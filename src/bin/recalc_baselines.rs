use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yt_baseline_engine::batch_runner::{load_growth_curve, run_batch, run_channel, BatchSummary};
use yt_baseline_engine::checkpoint::BatchCheckpoint;
use yt_baseline_engine::config::{clamp_batch_size, RunnerConfig};
use yt_baseline_engine::db::{get_pool, MySqlStore};
use yt_baseline_engine::store::BaselineStore;

/// Recompute baseline and performance score for every long-form video.
#[derive(Debug, Parser)]
#[command(name = "recalc_baselines")]
struct Args {
  /// Only recompute this channel (ignores the checkpoint).
  #[arg(long)]
  channel_id: Option<String>,

  /// JSON file tracking channels already completed by an interrupted run with
  /// the same --as-of. Removed once a run finishes cleanly.
  #[arg(long, default_value = ".baseline-progress.json")]
  checkpoint: PathBuf,

  /// Start from scratch instead of resuming from the checkpoint.
  #[arg(long)]
  reset: bool,

  #[arg(long)]
  batch_size: Option<usize>,

  #[arg(long)]
  concurrency: Option<usize>,

  #[arg(long)]
  channel_timeout_secs: Option<u64>,

  /// Reference date for video ages (YYYY-MM-DD, UTC midnight). Defaults to today.
  #[arg(long, value_parser = parse_as_of)]
  as_of: Option<NaiveDate>,
}

fn parse_as_of(input: &str) -> Result<NaiveDate, String> {
  NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|e| e.to_string())
}

fn runner_config(args: &Args) -> anyhow::Result<RunnerConfig> {
  let mut cfg = RunnerConfig::from_env()?;
  if let Some(v) = args.batch_size {
    cfg.batch_size = clamp_batch_size(v);
  }
  if let Some(v) = args.concurrency {
    cfg.concurrency = v.max(1);
  }
  if let Some(v) = args.channel_timeout_secs {
    cfg.channel_timeout = Duration::from_secs(v.max(1));
  }
  if let Some(dt) = args.as_of {
    let midnight = dt.and_hms_opt(0, 0, 0).context("invalid --as-of")?;
    cfg.as_of = Utc.from_utc_datetime(&midnight);
  }
  Ok(cfg)
}

fn print_summary(summary: &BatchSummary) {
  println!(
    "ok={} channels_total={} channels_completed={} channels_skipped={} channels_failed={} videos_scored={} videos_skipped={} videos_write_failed={} videos_flagged={} cancelled={} elapsed_ms={}",
    summary.is_clean(),
    summary.channels_total,
    summary.channels_completed,
    summary.channels_skipped,
    summary.channels_failed.len(),
    summary.videos_scored,
    summary.videos_skipped.len(),
    summary.videos_write_failed.len(),
    summary.videos_flagged,
    summary.cancelled,
    summary.elapsed_ms,
  );
  for c in summary.channels_failed.iter() {
    println!("failed_channel channel_id={} reason={}", c.channel_id, c.reason);
  }
  for v in summary.videos_skipped.iter() {
    println!("skipped_video channel_id={} video_id={} reason={}", v.channel_id, v.video_id, v.reason);
  }
  for v in summary.videos_write_failed.iter() {
    println!("write_failed channel_id={} video_id={} reason={}", v.channel_id, v.video_id, v.reason);
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "yt_baseline_engine=info,recalc_baselines=info".into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let args = Args::parse();
  let cfg = runner_config(&args)?;
  info!(as_of = %cfg.as_of, batch_size = cfg.batch_size, concurrency = cfg.concurrency, "starting");

  let pool = get_pool((cfg.concurrency as u32).saturating_add(1)).await?;
  let store: Arc<dyn BaselineStore> = Arc::new(MySqlStore::new(pool.clone()));
  let curve = Arc::new(load_growth_curve(store.as_ref(), &cfg.baseline).await?);

  if let Some(channel_id) = args.channel_id.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
    let report = run_channel(store.as_ref(), curve.as_ref(), &cfg, channel_id).await?;
    println!(
      "ok={} channel_id={} videos_scored={} videos_skipped={} videos_write_failed={} videos_flagged={}",
      report.fully_committed(),
      channel_id,
      report.scored,
      report.skipped.len(),
      report.write_failed.len(),
      report.flagged,
    );
    return Ok(if report.fully_committed() {
      ExitCode::SUCCESS
    } else {
      ExitCode::from(2)
    });
  }

  let checkpoint = if args.reset {
    BatchCheckpoint::default()
  } else {
    BatchCheckpoint::load(&args.checkpoint)
      .with_context(|| format!("reading checkpoint {}", args.checkpoint.display()))?
  };
  if checkpoint.belongs_to(cfg.as_of) && !checkpoint.completed_channels.is_empty() {
    info!(completed = checkpoint.completed_channels.len(), "resuming from checkpoint");
  }

  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received; aborting in-flight channels");
      on_signal.cancel();
    }
  });

  let checkpoint_path = args.checkpoint.clone();
  let (summary, checkpoint) = run_batch(store, curve, &cfg, checkpoint, cancel, |cp| {
    if let Err(err) = cp.save(&checkpoint_path) {
      warn!(error = %err, "failed to persist checkpoint");
    }
  })
  .await?;

  if summary.is_clean() {
    BatchCheckpoint::clear(&args.checkpoint)
      .with_context(|| format!("removing checkpoint {}", args.checkpoint.display()))?;
  } else {
    checkpoint
      .save(&args.checkpoint)
      .with_context(|| format!("writing checkpoint {}", args.checkpoint.display()))?;
  }

  print_summary(&summary);
  Ok(if summary.is_clean() {
    ExitCode::SUCCESS
  } else {
    ExitCode::from(2)
  })
}
