use serde::Serialize;

use crate::baseline::Baseline;
use crate::config::BaselineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
  Poor,
  Underperforming,
  OnTrack,
  Outperforming,
  Viral,
}

impl PerformanceTier {
  pub fn classify(score: f64) -> Self {
    if score > 3.0 {
      PerformanceTier::Viral
    } else if score >= 1.5 {
      PerformanceTier::Outperforming
    } else if score >= 0.5 {
      PerformanceTier::OnTrack
    } else if score >= 0.2 {
      PerformanceTier::Underperforming
    } else {
      PerformanceTier::Poor
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      PerformanceTier::Poor => "poor",
      PerformanceTier::Underperforming => "underperforming",
      PerformanceTier::OnTrack => "on_track",
      PerformanceTier::Outperforming => "outperforming",
      PerformanceTier::Viral => "viral",
    }
  }

  pub const ALL: [PerformanceTier; 5] = [
    PerformanceTier::Viral,
    PerformanceTier::Outperforming,
    PerformanceTier::OnTrack,
    PerformanceTier::Underperforming,
    PerformanceTier::Poor,
  ];
}

impl std::fmt::Display for PerformanceTier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// `None` means no usable baseline; the caller flags the video instead of
/// storing a made-up score.
pub fn compute_score(own_estimate: f64, baseline: Baseline, cfg: &BaselineConfig) -> Option<f64> {
  if baseline.value.is_nan() || baseline.value <= 0.0 || own_estimate.is_nan() {
    return None;
  }
  if baseline.bootstrapped {
    return Some(1.0);
  }

  let raw = own_estimate.max(0.0) / baseline.value;
  if raw.is_nan() {
    return None;
  }
  Some(raw.min(cfg.score_ceiling))
}
