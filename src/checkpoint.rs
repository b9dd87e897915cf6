use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress of a long batch run. Passed into and returned from the runner;
/// persisting it is the caller's job. Only valid for the `as_of` it was
/// recorded under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCheckpoint {
  #[serde(default)]
  pub as_of: Option<DateTime<Utc>>,
  pub completed_channels: BTreeSet<String>,
  pub last_completed_channel: Option<String>,
  pub updated_at: Option<DateTime<Utc>>,
}

impl BatchCheckpoint {
  pub fn for_run(as_of: DateTime<Utc>) -> Self {
    Self {
      as_of: Some(as_of),
      ..Self::default()
    }
  }

  pub fn belongs_to(&self, as_of: DateTime<Utc>) -> bool {
    self.as_of == Some(as_of)
  }

  pub fn is_completed(&self, channel_id: &str) -> bool {
    self.completed_channels.contains(channel_id)
  }

  pub fn mark_completed(&mut self, channel_id: &str, at: DateTime<Utc>) {
    self.completed_channels.insert(channel_id.to_string());
    self.last_completed_channel = Some(channel_id.to_string());
    self.updated_at = Some(at);
  }

  /// Missing file means a fresh run.
  pub fn load(path: &Path) -> std::io::Result<Self> {
    match std::fs::read(path) {
      Ok(bytes) => serde_json::from_slice(&bytes).map_err(std::io::Error::other),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
      Err(err) => Err(err),
    }
  }

  /// Writes to a temp file and renames it over `path`.
  pub fn save(&self, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
  }

  /// Removes the file once a run has finished cleanly.
  pub fn clear(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
      Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
      _ => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn marks_channels_completed() {
    let mut cp = BatchCheckpoint::default();
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    cp.mark_completed("UC1", at);
    assert!(cp.is_completed("UC1"));
    assert!(!cp.is_completed("UC2"));
    assert_eq!(cp.last_completed_channel.as_deref(), Some("UC1"));
    assert_eq!(cp.updated_at, Some(at));
  }

  #[test]
  fn save_then_load_restores_progress() {
    let dir = std::env::temp_dir().join(format!("baseline-checkpoint-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("progress.json");

    let mut cp = BatchCheckpoint::default();
    cp.mark_completed("UC1", Utc::now());
    cp.save(&path).unwrap();
    assert_eq!(BatchCheckpoint::load(&path).unwrap(), cp);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn checkpoint_is_bound_to_its_reference_date() {
    let day1 = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let day2 = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let cp = BatchCheckpoint::for_run(day1);
    assert!(cp.belongs_to(day1));
    assert!(!cp.belongs_to(day2));
    assert!(!BatchCheckpoint::default().belongs_to(day1));
  }

  #[test]
  fn file_without_as_of_still_loads() {
    let cp: BatchCheckpoint =
      serde_json::from_str(r#"{"completed_channels":["UC1"],"last_completed_channel":"UC1","updated_at":null}"#)
        .unwrap();
    assert_eq!(cp.as_of, None);
    assert!(cp.is_completed("UC1"));
  }

  #[test]
  fn clear_removes_file_and_tolerates_missing() {
    let dir = std::env::temp_dir().join(format!("baseline-checkpoint-clear-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("progress.json");

    BatchCheckpoint::default().save(&path).unwrap();
    BatchCheckpoint::clear(&path).unwrap();
    assert!(!path.exists());
    BatchCheckpoint::clear(&path).unwrap();

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn missing_file_loads_empty_checkpoint() {
    let path = std::env::temp_dir().join("baseline-checkpoint-does-not-exist.json");
    assert_eq!(BatchCheckpoint::load(&path).unwrap(), BatchCheckpoint::default());
  }
}
