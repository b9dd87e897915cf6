use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::day30::EstimateSource;
use crate::error::RecordError;
use crate::history_window::Confidence;
use crate::score::PerformanceTier;

#[derive(Debug, Clone, PartialEq)]
pub struct Video {
  pub video_id: String,
  pub channel_id: String,
  pub published_at: DateTime<Utc>,
  pub view_count: u64,
  pub is_short_form: bool,
}

/// A video as read from the store, before numeric/timestamp validation.
#[derive(Debug, Clone, Default)]
pub struct VideoRow {
  pub video_id: String,
  pub channel_id: String,
  pub published_at: Option<String>,
  pub view_count: Option<String>,
  pub is_short_form: bool,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.with_timezone(&Utc));
  }
  ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_view_count(raw: &str) -> Result<u64, RecordError> {
  let cleaned = raw.trim().replace(',', "");
  let value = cleaned
    .parse::<i64>()
    .map_err(|_| RecordError::NonNumericViewCount(raw.to_string()))?;
  u64::try_from(value).map_err(|_| RecordError::NegativeViewCount(value))
}

impl VideoRow {
  pub fn decode(&self) -> Result<Video, RecordError> {
    let published_raw = self
      .published_at
      .as_deref()
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .ok_or(RecordError::MissingPublishedAt)?;
    let published_at = parse_timestamp(published_raw)
      .ok_or_else(|| RecordError::MalformedPublishedAt(published_raw.to_string()))?;

    let views_raw = self
      .view_count
      .as_deref()
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .ok_or(RecordError::MissingViewCount)?;
    let view_count = parse_view_count(views_raw)?;

    Ok(Video {
      video_id: self.video_id.clone(),
      channel_id: self.channel_id.clone(),
      published_at,
      view_count,
      is_short_form: self.is_short_form,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSnapshot {
  pub age_days: u32,
  pub view_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthCurveEntry {
  pub age_days: u32,
  pub median_views: f64,
}

/// Baseline and score computed together for one video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineResult {
  pub video_id: String,
  pub channel_id: String,
  pub day30_estimate: f64,
  pub estimate_source: EstimateSource,
  pub baseline: f64,
  pub score: f64,
  pub tier: PerformanceTier,
  pub comparison_count: usize,
  pub confidence: Confidence,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(published_at: Option<&str>, view_count: Option<&str>) -> VideoRow {
    VideoRow {
      video_id: "v1".to_string(),
      channel_id: "c1".to_string(),
      published_at: published_at.map(str::to_string),
      view_count: view_count.map(str::to_string),
      is_short_form: false,
    }
  }

  #[test]
  fn decodes_mysql_and_rfc3339_timestamps() {
    let a = row(Some("2026-01-02 03:04:05"), Some("10")).decode().unwrap();
    let b = row(Some("2026-01-02T03:04:05Z"), Some("10")).decode().unwrap();
    assert_eq!(a.published_at, b.published_at);
    assert_eq!(a.published_at, Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());
  }

  #[test]
  fn accepts_thousands_separators() {
    let v = row(Some("2026-01-02 00:00:00"), Some(" 1,234 ")).decode().unwrap();
    assert_eq!(v.view_count, 1234);
  }

  #[test]
  fn rejects_malformed_records() {
    assert_eq!(row(None, Some("1")).decode(), Err(RecordError::MissingPublishedAt));
    assert_eq!(
      row(Some("yesterday"), Some("1")).decode(),
      Err(RecordError::MalformedPublishedAt("yesterday".to_string()))
    );
    assert_eq!(row(Some("2026-01-02 00:00:00"), None).decode(), Err(RecordError::MissingViewCount));
    assert_eq!(
      row(Some("2026-01-02 00:00:00"), Some("NaN")).decode(),
      Err(RecordError::NonNumericViewCount("NaN".to_string()))
    );
    assert_eq!(
      row(Some("2026-01-02 00:00:00"), Some("-5")).decode(),
      Err(RecordError::NegativeViewCount(-5))
    );
  }
}
