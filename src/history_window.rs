use std::ops::Range;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::BaselineConfig;
use crate::models::Video;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
  /// No mature history; baseline bootstrapped from the video itself.
  Bootstrap,
  Low,
  Normal,
}

impl Confidence {
  pub fn as_str(&self) -> &'static str {
    match self {
      Confidence::Bootstrap => "bootstrap",
      Confidence::Low => "low",
      Confidence::Normal => "normal",
    }
  }

  pub fn for_comparison_count(count: usize, cfg: &BaselineConfig) -> Self {
    if count == 0 {
      Confidence::Bootstrap
    } else if count < cfg.low_confidence_below {
      Confidence::Low
    } else {
      Confidence::Normal
    }
  }
}

/// Index range within `history` of the up to `window_size` most recent videos
/// that were already mature when the target was published. `history` must be
/// sorted ascending by publish time.
pub fn comparison_range(
  history: &[Video],
  target_published_at: DateTime<Utc>,
  cfg: &BaselineConfig,
) -> Range<usize> {
  let cutoff = target_published_at - Duration::days(cfg.maturity_days);
  let mature_end = history.partition_point(|v| v.published_at < cutoff);
  let start = mature_end.saturating_sub(cfg.window_size);
  start..mature_end
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn video(id: &str, published_at: DateTime<Utc>) -> Video {
    Video {
      video_id: id.to_string(),
      channel_id: "c1".to_string(),
      published_at,
      view_count: 100,
      is_short_form: false,
    }
  }

  fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
  }

  fn select_comparison_videos<'a>(
    history: &'a [Video],
    target: DateTime<Utc>,
    cfg: &BaselineConfig,
  ) -> &'a [Video] {
    &history[comparison_range(history, target, cfg)]
  }

  #[test]
  fn first_video_has_no_comparison_set() {
    let history = vec![video("a", day(0))];
    let selected = select_comparison_videos(&history, day(0), &BaselineConfig::default());
    assert!(selected.is_empty());
  }

  #[test]
  fn excludes_videos_younger_than_maturity_at_target_publish() {
    let history = vec![
      video("old", day(0)),
      video("exactly_30", day(10)),
      video("recent", day(25)),
    ];
    let selected = select_comparison_videos(&history, day(40), &BaselineConfig::default());
    let ids: Vec<&str> = selected.iter().map(|v| v.video_id.as_str()).collect();
    assert_eq!(ids, vec!["old"]);
  }

  #[test]
  fn never_returns_more_than_window_size_and_keeps_most_recent() {
    let history: Vec<Video> = (0..25).map(|i| video(&format!("v{i}"), day(i))).collect();
    let target = day(24 + 31);
    let selected = select_comparison_videos(&history, target, &BaselineConfig::default());
    assert_eq!(selected.len(), 10);
    assert_eq!(selected.first().unwrap().video_id, "v15");
    assert_eq!(selected.last().unwrap().video_id, "v24");
    let cutoff = target - Duration::days(30);
    assert!(selected.iter().all(|v| v.published_at < cutoff));
  }

  #[test]
  fn confidence_tiers_follow_comparison_count() {
    let cfg = BaselineConfig::default();
    assert_eq!(Confidence::for_comparison_count(0, &cfg), Confidence::Bootstrap);
    assert_eq!(Confidence::for_comparison_count(2, &cfg), Confidence::Low);
    assert_eq!(Confidence::for_comparison_count(3, &cfg), Confidence::Normal);
  }
}
