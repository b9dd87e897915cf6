use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::BaselineConfig;
use crate::growth_curve::GrowthCurve;
use crate::models::{Video, ViewSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
  Snapshot,
  Projected,
  Passthrough,
}

impl EstimateSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      EstimateSource::Snapshot => "snapshot",
      EstimateSource::Projected => "projected",
      EstimateSource::Passthrough => "passthrough",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Day30Estimate {
  pub views: f64,
  pub source: EstimateSource,
}

/// Whole days between publish and `as_of`; never negative.
pub fn age_in_days(published_at: DateTime<Utc>, as_of: DateTime<Utc>) -> u32 {
  let days = (as_of - published_at).num_days();
  u32::try_from(days.max(0)).unwrap_or(u32::MAX)
}

/// The snapshot in the tolerance band closest to the reference age.
pub fn pick_snapshot(snapshots: &[ViewSnapshot], cfg: &BaselineConfig) -> Option<ViewSnapshot> {
  let lo = cfg.reference_age_days.saturating_sub(cfg.snapshot_tolerance_days);
  let hi = cfg.reference_age_days.saturating_add(cfg.snapshot_tolerance_days);
  snapshots
    .iter()
    .filter(|s| s.age_days >= lo && s.age_days <= hi)
    .min_by_key(|s| (s.age_days.abs_diff(cfg.reference_age_days), s.age_days))
    .copied()
}

pub fn estimate_day30(
  video: &Video,
  snapshots: &[ViewSnapshot],
  curve: &GrowthCurve,
  cfg: &BaselineConfig,
  as_of: DateTime<Utc>,
) -> Day30Estimate {
  if let Some(snapshot) = pick_snapshot(snapshots, cfg) {
    return Day30Estimate {
      views: snapshot.view_count as f64,
      source: EstimateSource::Snapshot,
    };
  }

  let current = video.view_count as f64;
  let age = curve.clamp_age(age_in_days(video.published_at, as_of).min(cfg.max_curve_age_days));
  let numerator = curve.curve_value(cfg.reference_age_days);
  let denominator = curve.curve_value(age);

  if !denominator.is_finite() || denominator <= 0.0 {
    return Day30Estimate {
      views: current,
      source: EstimateSource::Passthrough,
    };
  }

  if numerator == denominator {
    return Day30Estimate {
      views: current,
      source: EstimateSource::Passthrough,
    };
  }

  let projected = current * numerator / denominator;
  let views = if projected.is_finite() && projected >= 0.0 {
    projected
  } else {
    current
  };

  Day30Estimate {
    views,
    source: EstimateSource::Projected,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::GrowthCurveEntry;
  use chrono::{Duration, TimeZone};

  fn curve() -> GrowthCurve {
    GrowthCurve::from_entries(
      &[
        GrowthCurveEntry { age_days: 10, median_views: 8_000.0 },
        GrowthCurveEntry { age_days: 30, median_views: 20_000.0 },
        GrowthCurveEntry { age_days: 100, median_views: 50_000.0 },
        GrowthCurveEntry { age_days: 365, median_views: 80_000.0 },
      ],
      30,
      365,
    )
    .unwrap()
  }

  fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
  }

  fn video_aged(days: i64, views: u64) -> Video {
    Video {
      video_id: "v".to_string(),
      channel_id: "c".to_string(),
      published_at: as_of() - Duration::days(days),
      view_count: views,
      is_short_form: false,
    }
  }

  #[test]
  fn snapshot_in_band_takes_precedence_over_projection() {
    let snapshots = [ViewSnapshot { age_days: 29, view_count: 1_234 }];
    let est = estimate_day30(&video_aged(100, 5_000), &snapshots, &curve(), &BaselineConfig::default(), as_of());
    assert_eq!(est.source, EstimateSource::Snapshot);
    assert_eq!(est.views, 1_234.0);
  }

  #[test]
  fn snapshots_outside_band_are_ignored() {
    let snapshots = [
      ViewSnapshot { age_days: 27, view_count: 1 },
      ViewSnapshot { age_days: 33, view_count: 2 },
    ];
    let est = estimate_day30(&video_aged(100, 5_000), &snapshots, &curve(), &BaselineConfig::default(), as_of());
    assert_eq!(est.source, EstimateSource::Projected);
    assert_eq!(est.views, 2_000.0);
  }

  #[test]
  fn closest_snapshot_to_reference_age_wins() {
    let snapshots = [
      ViewSnapshot { age_days: 32, view_count: 900 },
      ViewSnapshot { age_days: 31, view_count: 800 },
      ViewSnapshot { age_days: 29, view_count: 700 },
    ];
    let picked = pick_snapshot(&snapshots, &BaselineConfig::default()).unwrap();
    assert_eq!(picked.age_days, 29);
  }

  #[test]
  fn projects_young_videos_forward() {
    let est = estimate_day30(&video_aged(10, 800), &[], &curve(), &BaselineConfig::default(), as_of());
    assert_eq!(est.source, EstimateSource::Projected);
    assert!((est.views - 2_000.0).abs() < 1e-9);
  }

  #[test]
  fn ages_beyond_supported_maximum_use_last_entry() {
    let est = estimate_day30(&video_aged(900, 80_000), &[], &curve(), &BaselineConfig::default(), as_of());
    assert!((est.views - 20_000.0).abs() < 1e-9);
  }

  #[test]
  fn ages_without_curve_entry_pass_current_views_through() {
    let est = estimate_day30(&video_aged(140, 1_000), &[], &curve(), &BaselineConfig::default(), as_of());
    assert_eq!(est.source, EstimateSource::Passthrough);
    assert_eq!(est.views, 1_000.0);
  }

  #[test]
  fn future_publish_time_counts_as_age_zero() {
    assert_eq!(age_in_days(as_of() + Duration::days(3), as_of()), 0);
  }
}
