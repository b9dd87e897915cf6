use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{BaselineResult, GrowthCurveEntry, VideoRow, ViewSnapshot};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
  pub written: usize,
  /// `(video_id, error)` for rows the store rejected.
  pub failed: Vec<(String, String)>,
}

impl UpsertReport {
  pub fn merge(&mut self, other: UpsertReport) {
    self.written += other.written;
    self.failed.extend(other.failed);
  }
}

/// Everything the batch runner reads from and writes to persistent storage.
#[async_trait]
pub trait BaselineStore: Send + Sync {
  async fn list_channel_ids(&self) -> Result<Vec<String>, StoreError>;

  /// Long-form videos of a channel, ascending by publish time.
  async fn videos_for_channel(&self, channel_id: &str) -> Result<Vec<VideoRow>, StoreError>;

  async fn snapshots_near(
    &self,
    video_id: &str,
    target_age_days: u32,
    tolerance_days: u32,
  ) -> Result<Vec<ViewSnapshot>, StoreError>;

  async fn growth_curve(&self) -> Result<Vec<GrowthCurveEntry>, StoreError>;

  /// Idempotent upsert keyed by video id. Row-level failures are reported,
  /// not returned as `Err`.
  async fn upsert_baselines(&self, rows: &[BaselineResult]) -> Result<UpsertReport, StoreError>;

  async fn flag_for_reprocess(&self, video_id: &str, reason: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct InMemoryState {
  channels: BTreeMap<String, Vec<VideoRow>>,
  snapshots: HashMap<String, Vec<ViewSnapshot>>,
  curve: Vec<GrowthCurveEntry>,
  results: HashMap<String, BaselineResult>,
  flagged: HashMap<String, String>,
  upsert_batch_sizes: Vec<usize>,
  reject_rows: HashSet<String>,
  unavailable_channels: HashSet<String>,
  read_delays: HashMap<String, Duration>,
}

/// Local backend for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
  state: Mutex<InMemoryState>,
}

impl InMemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, InMemoryState> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn with_growth_curve(self, curve: Vec<GrowthCurveEntry>) -> Self {
    self.lock().curve = curve;
    self
  }

  pub fn add_video(&self, row: VideoRow) {
    self.lock().channels.entry(row.channel_id.clone()).or_default().push(row);
  }

  pub fn add_snapshot(&self, video_id: &str, snapshot: ViewSnapshot) {
    self
      .lock()
      .snapshots
      .entry(video_id.to_string())
      .or_default()
      .push(snapshot);
  }

  pub fn set_view_count(&self, video_id: &str, view_count: &str) {
    let mut state = self.lock();
    for row in state.channels.values_mut().flatten() {
      if row.video_id == video_id {
        row.view_count = Some(view_count.to_string());
      }
    }
  }

  /// Upserts of this video id are reported as failed rows.
  pub fn reject_upserts_for(&self, video_id: &str) {
    self.lock().reject_rows.insert(video_id.to_string());
  }

  /// Reads of this channel's videos fail as if the store were unreachable.
  pub fn make_unavailable(&self, channel_id: &str) {
    self.lock().unavailable_channels.insert(channel_id.to_string());
  }

  pub fn delay_reads_for(&self, channel_id: &str, delay: Duration) {
    self.lock().read_delays.insert(channel_id.to_string(), delay);
  }

  pub fn result(&self, video_id: &str) -> Option<BaselineResult> {
    self.lock().results.get(video_id).cloned()
  }

  pub fn results(&self) -> HashMap<String, BaselineResult> {
    self.lock().results.clone()
  }

  pub fn flagged(&self) -> HashMap<String, String> {
    self.lock().flagged.clone()
  }

  pub fn upsert_batch_sizes(&self) -> Vec<usize> {
    self.lock().upsert_batch_sizes.clone()
  }
}

#[async_trait]
impl BaselineStore for InMemoryStore {
  async fn list_channel_ids(&self) -> Result<Vec<String>, StoreError> {
    Ok(self.lock().channels.keys().cloned().collect())
  }

  async fn videos_for_channel(&self, channel_id: &str) -> Result<Vec<VideoRow>, StoreError> {
    let delay = self.lock().read_delays.get(channel_id).copied();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    let state = self.lock();
    if state.unavailable_channels.contains(channel_id) {
      return Err(StoreError::Unavailable(format!("channel {channel_id} unreachable")));
    }
    Ok(
      state
        .channels
        .get(channel_id)
        .map(|rows| rows.iter().filter(|r| !r.is_short_form).cloned().collect())
        .unwrap_or_default(),
    )
  }

  async fn snapshots_near(
    &self,
    video_id: &str,
    target_age_days: u32,
    tolerance_days: u32,
  ) -> Result<Vec<ViewSnapshot>, StoreError> {
    let lo = target_age_days.saturating_sub(tolerance_days);
    let hi = target_age_days.saturating_add(tolerance_days);
    Ok(
      self
        .lock()
        .snapshots
        .get(video_id)
        .map(|snaps| {
          snaps
            .iter()
            .filter(|s| s.age_days >= lo && s.age_days <= hi)
            .copied()
            .collect()
        })
        .unwrap_or_default(),
    )
  }

  async fn growth_curve(&self) -> Result<Vec<GrowthCurveEntry>, StoreError> {
    Ok(self.lock().curve.clone())
  }

  async fn upsert_baselines(&self, rows: &[BaselineResult]) -> Result<UpsertReport, StoreError> {
    let mut state = self.lock();
    state.upsert_batch_sizes.push(rows.len());

    let mut report = UpsertReport::default();
    for row in rows {
      if state.reject_rows.contains(&row.video_id) {
        report
          .failed
          .push((row.video_id.clone(), "row rejected by store".to_string()));
        continue;
      }
      state.flagged.remove(&row.video_id);
      state.results.insert(row.video_id.clone(), row.clone());
      report.written += 1;
    }
    Ok(report)
  }

  async fn flag_for_reprocess(&self, video_id: &str, reason: &str) -> Result<(), StoreError> {
    self
      .lock()
      .flagged
      .insert(video_id.to_string(), reason.to_string());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(id: &str, channel: &str, short: bool) -> VideoRow {
    VideoRow {
      video_id: id.to_string(),
      channel_id: channel.to_string(),
      published_at: Some("2026-01-01 00:00:00".to_string()),
      view_count: Some("10".to_string()),
      is_short_form: short,
    }
  }

  #[tokio::test]
  async fn in_memory_store_excludes_short_form_videos() {
    let store = InMemoryStore::new();
    store.add_video(row("long", "c1", false));
    store.add_video(row("short", "c1", true));
    let rows = store.videos_for_channel("c1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].video_id, "long");
  }

  #[tokio::test]
  async fn snapshots_near_filters_by_tolerance_band() {
    let store = InMemoryStore::new();
    for age in [27, 28, 30, 32, 33] {
      store.add_snapshot("v", ViewSnapshot { age_days: age, view_count: age as u64 });
    }
    let ages: Vec<u32> = store
      .snapshots_near("v", 30, 2)
      .await
      .unwrap()
      .iter()
      .map(|s| s.age_days)
      .collect();
    assert_eq!(ages, vec![28, 30, 32]);
  }

  #[test]
  fn upsert_reports_merge() {
    let mut a = UpsertReport { written: 2, failed: vec![] };
    a.merge(UpsertReport { written: 1, failed: vec![("x".to_string(), "boom".to_string())] });
    assert_eq!(a.written, 3);
    assert_eq!(a.failed.len(), 1);
  }
}
