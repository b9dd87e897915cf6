use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::ConfigError;

pub const MIN_BATCH_SIZE: usize = 50;
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Constants of the baseline/score computation.
#[derive(Debug, Clone)]
pub struct BaselineConfig {
  /// Age (days) every view count is normalised to.
  pub reference_age_days: u32,
  /// A comparison video must be at least this old when the target is published.
  pub maturity_days: i64,
  pub window_size: usize,
  pub snapshot_tolerance_days: u32,
  pub max_curve_age_days: u32,
  pub baseline_floor: f64,
  pub score_ceiling: f64,
  pub low_confidence_below: usize,
}

impl Default for BaselineConfig {
  fn default() -> Self {
    Self {
      reference_age_days: 30,
      maturity_days: 30,
      window_size: 10,
      snapshot_tolerance_days: 2,
      max_curve_age_days: 365,
      baseline_floor: 1.0,
      score_ceiling: 99_999.999,
      low_confidence_below: 3,
    }
  }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
  pub baseline: BaselineConfig,
  pub batch_size: usize,
  pub concurrency: usize,
  pub channel_timeout: Duration,
  /// Reference instant for video ages. Fixed per run so reruns are reproducible.
  pub as_of: DateTime<Utc>,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      baseline: BaselineConfig::default(),
      batch_size: 500,
      concurrency: 4,
      channel_timeout: Duration::from_secs(300),
      as_of: start_of_utc_day(Utc::now()),
    }
  }
}

pub fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
  let midnight = now.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default();
  Utc.from_utc_datetime(&midnight)
}

pub fn clamp_batch_size(batch_size: usize) -> usize {
  batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
}

fn parse_env<T: std::str::FromStr>(
  lookup: &impl Fn(&str) -> Option<String>,
  key: &'static str,
) -> Result<Option<T>, ConfigError> {
  match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
    None => Ok(None),
    Some(raw) => raw
      .parse::<T>()
      .map(Some)
      .map_err(|_| ConfigError::InvalidEnv { key, value: raw }),
  }
}

impl RunnerConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let mut cfg = Self::default();

    if let Some(v) = parse_env::<usize>(&lookup, "BASELINE_BATCH_SIZE")? {
      cfg.batch_size = clamp_batch_size(v);
    }
    if let Some(v) = parse_env::<usize>(&lookup, "BASELINE_CONCURRENCY")? {
      cfg.concurrency = v.max(1);
    }
    if let Some(v) = parse_env::<u64>(&lookup, "BASELINE_CHANNEL_TIMEOUT_SECS")? {
      cfg.channel_timeout = Duration::from_secs(v.max(1));
    }
    if let Some(v) = parse_env::<u32>(&lookup, "BASELINE_SNAPSHOT_TOLERANCE_DAYS")? {
      cfg.baseline.snapshot_tolerance_days = v;
    }

    Ok(cfg)
  }
}

pub fn database_url() -> Result<String, ConfigError> {
  let url = std::env::var("TIDB_DATABASE_URL")
    .or_else(|_| std::env::var("DATABASE_URL"))
    .unwrap_or_default();
  validate_database_url(&url)?;
  Ok(url.trim().to_string())
}

fn validate_database_url(url: &str) -> Result<(), ConfigError> {
  let trimmed = url.trim();
  if trimmed.is_empty() {
    return Err(ConfigError::MissingDatabaseUrl);
  }
  if !trimmed.contains("://") {
    return Err(ConfigError::InvalidDatabaseUrl);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |key| map.get(key).cloned()
  }

  #[test]
  fn defaults_when_env_is_empty() {
    let cfg = RunnerConfig::from_lookup(lookup(&[])).unwrap();
    assert_eq!(cfg.batch_size, 500);
    assert_eq!(cfg.concurrency, 4);
    assert_eq!(cfg.baseline.snapshot_tolerance_days, 2);
  }

  #[test]
  fn batch_size_is_clamped_to_supported_range() {
    let cfg = RunnerConfig::from_lookup(lookup(&[("BASELINE_BATCH_SIZE", "5")])).unwrap();
    assert_eq!(cfg.batch_size, MIN_BATCH_SIZE);
    let cfg = RunnerConfig::from_lookup(lookup(&[("BASELINE_BATCH_SIZE", "250000")])).unwrap();
    assert_eq!(cfg.batch_size, MAX_BATCH_SIZE);
  }

  #[test]
  fn rejects_non_numeric_env_values() {
    let err = RunnerConfig::from_lookup(lookup(&[("BASELINE_CONCURRENCY", "many")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnv { key: "BASELINE_CONCURRENCY", .. }));
  }

  #[test]
  fn database_url_requires_scheme() {
    assert!(matches!(validate_database_url(""), Err(ConfigError::MissingDatabaseUrl)));
    assert!(matches!(
      validate_database_url("localhost:4000/db"),
      Err(ConfigError::InvalidDatabaseUrl)
    ));
    assert!(validate_database_url("mysql://u:p@localhost:4000/db").is_ok());
  }

  #[test]
  fn as_of_defaults_to_utc_midnight() {
    let now = Utc.with_ymd_and_hms(2026, 1, 20, 16, 30, 0).unwrap();
    assert_eq!(start_of_utc_day(now), Utc.with_ymd_and_hms(2026, 1, 20, 0, 0, 0).unwrap());
  }
}
