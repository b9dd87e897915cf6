use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkpoint::BatchCheckpoint;
use crate::config::{clamp_batch_size, BaselineConfig, RunnerConfig};
use crate::error::{BatchError, ChannelError, StoreError};
use crate::growth_curve::GrowthCurve;
use crate::pipeline::{prepare_history, score_channel, ChannelComputation};
use crate::store::{BaselineStore, UpsertReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedVideo {
  pub channel_id: String,
  pub video_id: String,
  pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedChannel {
  pub channel_id: String,
  pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelReport {
  pub channel_id: String,
  pub scored: usize,
  pub skipped: Vec<SkippedVideo>,
  pub write_failed: Vec<SkippedVideo>,
  pub flagged: usize,
}

impl ChannelReport {
  /// A channel may be checkpointed only when every computed row was stored.
  pub fn fully_committed(&self) -> bool {
    self.write_failed.is_empty()
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
  pub channels_total: usize,
  pub channels_completed: usize,
  pub channels_skipped: usize,
  pub channels_failed: Vec<FailedChannel>,
  pub videos_scored: usize,
  pub videos_skipped: Vec<SkippedVideo>,
  pub videos_write_failed: Vec<SkippedVideo>,
  pub videos_flagged: usize,
  pub elapsed_ms: u64,
  pub cancelled: bool,
}

impl BatchSummary {
  fn absorb(&mut self, report: ChannelReport) {
    self.videos_scored += report.scored;
    self.videos_flagged += report.flagged;
    self.videos_skipped.extend(report.skipped);
    self.videos_write_failed.extend(report.write_failed);
  }

  pub fn is_clean(&self) -> bool {
    self.channels_failed.is_empty() && self.videos_write_failed.is_empty() && !self.cancelled
  }
}

/// Loads and validates the growth curve. Any failure here aborts the run.
pub async fn load_growth_curve(
  store: &dyn BaselineStore,
  cfg: &BaselineConfig,
) -> Result<GrowthCurve, BatchError> {
  let entries = store.growth_curve().await?;
  let curve = GrowthCurve::from_entries(&entries, cfg.reference_age_days, cfg.max_curve_age_days)?;
  info!(entries = curve.entry_count(), max_age = curve.max_age(), "growth curve loaded");
  Ok(curve)
}

/// Reads one channel and computes its rows without writing anything.
pub async fn compute_channel(
  store: &dyn BaselineStore,
  curve: &GrowthCurve,
  cfg: &BaselineConfig,
  as_of: DateTime<Utc>,
  channel_id: &str,
) -> Result<(ChannelComputation, Vec<SkippedVideo>), StoreError> {
  let rows = store.videos_for_channel(channel_id).await?;

  let mut videos = Vec::with_capacity(rows.len());
  let mut skipped = Vec::new();
  for row in rows.iter() {
    match row.decode() {
      Ok(video) => videos.push(video),
      Err(err) => {
        warn!(channel_id, video_id = %row.video_id, error = %err, "skipping malformed video record");
        skipped.push(SkippedVideo {
          channel_id: channel_id.to_string(),
          video_id: row.video_id.clone(),
          reason: err.to_string(),
        });
      }
    }
  }
  let videos = prepare_history(videos);

  let mut snapshots = HashMap::with_capacity(videos.len());
  for video in videos.iter() {
    let near = store
      .snapshots_near(&video.video_id, cfg.reference_age_days, cfg.snapshot_tolerance_days)
      .await?;
    if !near.is_empty() {
      snapshots.insert(video.video_id.clone(), near);
    }
  }

  let computed = score_channel(&videos, &snapshots, curve, cfg, as_of);
  debug!(
    channel_id,
    videos = videos.len(),
    with_snapshot = snapshots.len(),
    "channel computed"
  );
  Ok((computed, skipped))
}

/// Recomputes and persists one channel. Batches already written stay written
/// if a later batch fails.
pub async fn run_channel(
  store: &dyn BaselineStore,
  curve: &GrowthCurve,
  cfg: &RunnerConfig,
  channel_id: &str,
) -> Result<ChannelReport, ChannelError> {
  let (computed, skipped) =
    compute_channel(store, curve, &cfg.baseline, cfg.as_of, channel_id).await?;

  let mut report = ChannelReport {
    channel_id: channel_id.to_string(),
    ..ChannelReport::default()
  };

  for s in skipped.iter() {
    store.flag_for_reprocess(&s.video_id, &s.reason).await?;
    report.flagged += 1;
  }
  for u in computed.unscored.iter() {
    warn!(channel_id, video_id = %u.video_id, reason = %u.reason, "video left unscored");
    store.flag_for_reprocess(&u.video_id, &u.reason).await?;
    report.flagged += 1;
  }
  report.skipped = skipped;

  let batch_size = clamp_batch_size(cfg.batch_size);
  let mut upserts = UpsertReport::default();
  for chunk in computed.results.chunks(batch_size) {
    upserts.merge(store.upsert_baselines(chunk).await?);
  }

  for (video_id, error) in upserts.failed.iter() {
    warn!(channel_id, video_id = %video_id, error = %error, "baseline upsert rejected");
  }
  report.scored = upserts.written;
  report.write_failed = upserts
    .failed
    .into_iter()
    .map(|(video_id, reason)| SkippedVideo {
      channel_id: channel_id.to_string(),
      video_id,
      reason,
    })
    .collect();

  info!(
    channel_id,
    scored = report.scored,
    skipped = report.skipped.len(),
    write_failed = report.write_failed.len(),
    "channel done"
  );
  Ok(report)
}

async fn run_channel_guarded(
  store: Arc<dyn BaselineStore>,
  curve: Arc<GrowthCurve>,
  cfg: Arc<RunnerConfig>,
  channel_id: String,
  cancel: CancellationToken,
) -> Result<ChannelReport, ChannelError> {
  let timeout_ms = cfg.channel_timeout.as_millis();
  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(ChannelError::Cancelled),
    res = tokio::time::timeout(
      cfg.channel_timeout,
      run_channel(store.as_ref(), curve.as_ref(), &cfg, &channel_id),
    ) => res.unwrap_or(Err(ChannelError::TimedOut(timeout_ms))),
  }
}

fn record_outcome(
  channel_id: String,
  outcome: Result<ChannelReport, ChannelError>,
  summary: &mut BatchSummary,
  checkpoint: &mut BatchCheckpoint,
) -> bool {
  match outcome {
    Ok(report) => {
      let committed = report.fully_committed();
      summary.absorb(report);
      if committed {
        summary.channels_completed += 1;
        checkpoint.mark_completed(&channel_id, Utc::now());
      } else {
        summary.channels_failed.push(FailedChannel {
          channel_id,
          reason: "some rows failed to persist".to_string(),
        });
      }
      committed
    }
    Err(ChannelError::Cancelled) => {
      summary.cancelled = true;
      false
    }
    Err(err) => {
      warn!(channel_id = %channel_id, error = %err, "channel failed");
      summary.channels_failed.push(FailedChannel {
        channel_id,
        reason: err.to_string(),
      });
      false
    }
  }
}

/// Scores every channel not yet in `checkpoint`, at most `cfg.concurrency`
/// channels at a time. A checkpoint recorded under a different `as_of` is
/// discarded. `on_progress` sees the checkpoint each time a channel commits,
/// so the caller can persist it incrementally.
pub async fn run_batch<F>(
  store: Arc<dyn BaselineStore>,
  curve: Arc<GrowthCurve>,
  cfg: &RunnerConfig,
  mut checkpoint: BatchCheckpoint,
  cancel: CancellationToken,
  mut on_progress: F,
) -> Result<(BatchSummary, BatchCheckpoint), BatchError>
where
  F: FnMut(&BatchCheckpoint),
{
  let started_at = Instant::now();

  if !checkpoint.belongs_to(cfg.as_of) {
    if !checkpoint.completed_channels.is_empty() {
      info!(
        checkpoint_as_of = ?checkpoint.as_of,
        as_of = %cfg.as_of,
        "checkpoint is from another run; starting fresh"
      );
    }
    checkpoint = BatchCheckpoint::for_run(cfg.as_of);
  }

  let channel_ids = store.list_channel_ids().await?;

  let mut summary = BatchSummary {
    channels_total: channel_ids.len(),
    ..BatchSummary::default()
  };

  let mut pending = VecDeque::with_capacity(channel_ids.len());
  for channel_id in channel_ids {
    if checkpoint.is_completed(&channel_id) {
      summary.channels_skipped += 1;
    } else {
      pending.push_back(channel_id);
    }
  }

  let limit = cfg.concurrency.max(1);
  let shared_cfg = Arc::new(cfg.clone());
  let mut workers = JoinSet::new();
  let mut in_flight = HashSet::new();

  loop {
    while workers.len() < limit && !cancel.is_cancelled() {
      let Some(channel_id) = pending.pop_front() else {
        break;
      };
      let task = run_channel_guarded(
        store.clone(),
        curve.clone(),
        shared_cfg.clone(),
        channel_id.clone(),
        cancel.clone(),
      );
      let id = channel_id.clone();
      workers.spawn(async move { (id, task.await) });
      in_flight.insert(channel_id);
    }

    let Some(joined) = workers.join_next().await else {
      break;
    };
    match joined {
      Ok((channel_id, outcome)) => {
        in_flight.remove(&channel_id);
        if record_outcome(channel_id, outcome, &mut summary, &mut checkpoint) {
          on_progress(&checkpoint);
        }
      }
      Err(err) => warn!(error = %err, "channel worker crashed"),
    }
  }

  if !pending.is_empty() {
    summary.cancelled = true;
    info!(not_started = pending.len(), "run cancelled before all channels started");
  }

  for channel_id in in_flight {
    summary.channels_failed.push(FailedChannel {
      channel_id,
      reason: "worker crashed".to_string(),
    });
  }

  summary.elapsed_ms = started_at.elapsed().as_millis() as u64;
  info!(
    channels_total = summary.channels_total,
    channels_completed = summary.channels_completed,
    channels_skipped = summary.channels_skipped,
    channels_failed = summary.channels_failed.len(),
    videos_scored = summary.videos_scored,
    elapsed_ms = summary.elapsed_ms,
    cancelled = summary.cancelled,
    "batch finished"
  );
  Ok((summary, checkpoint))
}
