//! Per-channel scoring: window selection, Day-30 estimates, median baseline
//! and performance score for every long-form video of one channel.
//!
//! Everything here is a pure function of (channel history, growth curve,
//! snapshots, `as_of`), so recomputing a channel always yields the same rows.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::baseline::aggregate_baseline;
use crate::config::BaselineConfig;
use crate::day30::{estimate_day30, Day30Estimate};
use crate::growth_curve::GrowthCurve;
use crate::history_window::{comparison_range, Confidence};
use crate::models::{BaselineResult, Video, ViewSnapshot};
use crate::score::{compute_score, PerformanceTier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnscoredVideo {
  pub video_id: String,
  pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelComputation {
  pub results: Vec<BaselineResult>,
  pub unscored: Vec<UnscoredVideo>,
}

/// Drops short-form videos and stable-sorts the rest by publish time.
pub fn prepare_history(mut videos: Vec<Video>) -> Vec<Video> {
  videos.retain(|v| !v.is_short_form);
  videos.sort_by_key(|v| v.published_at);
  videos
}

pub fn score_channel(
  videos: &[Video],
  snapshots: &HashMap<String, Vec<ViewSnapshot>>,
  curve: &GrowthCurve,
  cfg: &BaselineConfig,
  as_of: DateTime<Utc>,
) -> ChannelComputation {
  let estimates: Vec<Day30Estimate> = videos
    .iter()
    .map(|v| {
      let snaps = snapshots.get(&v.video_id).map(Vec::as_slice).unwrap_or(&[]);
      estimate_day30(v, snaps, curve, cfg, as_of)
    })
    .collect();

  let mut out = ChannelComputation {
    results: Vec::with_capacity(videos.len()),
    unscored: Vec::new(),
  };

  for (idx, video) in videos.iter().enumerate() {
    let own = estimates[idx];
    let range = comparison_range(videos, video.published_at, cfg);
    let comparison: Vec<f64> = estimates[range].iter().map(|e| e.views).collect();

    let baseline = aggregate_baseline(&comparison, own.views, cfg);
    let Some(score) = compute_score(own.views, baseline, cfg) else {
      out.unscored.push(UnscoredVideo {
        video_id: video.video_id.clone(),
        reason: format!("no usable baseline (baseline={})", baseline.value),
      });
      continue;
    };

    out.results.push(BaselineResult {
      video_id: video.video_id.clone(),
      channel_id: video.channel_id.clone(),
      day30_estimate: own.views,
      estimate_source: own.source,
      baseline: baseline.value,
      score,
      tier: PerformanceTier::classify(score),
      comparison_count: comparison.len(),
      confidence: Confidence::for_comparison_count(comparison.len(), cfg),
    });
  }

  out
}
