use std::process::ExitCode;

use anyhow::Context;
use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yt_baseline_engine::batch_runner::{compute_channel, load_growth_curve, SkippedVideo};
use yt_baseline_engine::config::RunnerConfig;
use yt_baseline_engine::db::{get_pool, MySqlStore};
use yt_baseline_engine::models::BaselineResult;
use yt_baseline_engine::report::TierDistribution;
use yt_baseline_engine::score::PerformanceTier;

/// Compute a channel's scores in memory and print the tier breakdown. Writes nothing.
#[derive(Debug, Parser)]
#[command(name = "channel_score_report")]
struct Args {
  #[arg(long)]
  channel_id: String,

  /// Reference date for video ages (YYYY-MM-DD). Defaults to today.
  #[arg(long, value_parser = parse_as_of)]
  as_of: Option<NaiveDate>,

  /// Emit one JSON document instead of key=value lines.
  #[arg(long)]
  json: bool,
}

fn parse_as_of(input: &str) -> Result<NaiveDate, String> {
  NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|e| e.to_string())
}

#[derive(Serialize)]
struct ReportDoc<'a> {
  channel_id: &'a str,
  as_of: String,
  distribution: &'a TierDistribution,
  videos: &'a [BaselineResult],
  skipped: Vec<(&'a str, &'a str)>,
}

fn fmt_opt(value: Option<f64>) -> String {
  value.map(|v| format!("{v:.3}")).unwrap_or_else(|| "none".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "yt_baseline_engine=warn,channel_score_report=info".into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  let args = Args::parse();
  let channel_id = args.channel_id.trim();
  if channel_id.is_empty() {
    anyhow::bail!("--channel-id must not be empty");
  }

  let mut cfg = RunnerConfig::from_env()?;
  if let Some(dt) = args.as_of {
    let midnight = dt.and_hms_opt(0, 0, 0).context("invalid --as-of")?;
    cfg.as_of = Utc.from_utc_datetime(&midnight);
  }

  let pool = get_pool(2).await?;
  let store = MySqlStore::new(pool.clone());
  let curve = load_growth_curve(&store, &cfg.baseline).await?;
  let (computed, mut skipped) = compute_channel(&store, &curve, &cfg.baseline, cfg.as_of, channel_id).await?;
  skipped.extend(computed.unscored.iter().map(|u| SkippedVideo {
    channel_id: channel_id.to_string(),
    video_id: u.video_id.clone(),
    reason: u.reason.clone(),
  }));

  let dist = TierDistribution::from_results(&computed.results);

  if args.json {
    let doc = ReportDoc {
      channel_id,
      as_of: cfg.as_of.to_rfc3339(),
      distribution: &dist,
      videos: &computed.results,
      skipped: skipped
        .iter()
        .map(|s| (s.video_id.as_str(), s.reason.as_str()))
        .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&doc)?);
    return Ok(ExitCode::SUCCESS);
  }

  println!(
    "channel_id={} as_of={} videos={} median_score={} low_confidence={} bootstrapped={} skipped={}",
    channel_id,
    cfg.as_of.format("%Y-%m-%d"),
    dist.videos,
    fmt_opt(dist.median_score),
    dist.low_confidence,
    dist.bootstrapped,
    skipped.len(),
  );
  for tier in PerformanceTier::ALL.iter().rev() {
    println!(
      "tier={} count={} share={:.3}",
      tier,
      dist.count(*tier),
      dist.share(*tier)
    );
  }
  for s in skipped.iter() {
    println!("skipped video_id={} reason={}", s.video_id, s.reason);
  }

  Ok(ExitCode::SUCCESS)
}
