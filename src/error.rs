#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("growth curve is empty")]
  EmptyGrowthCurve,

  #[error("growth curve has no positive entry for reference age day {0}")]
  MissingReferenceAge(u32),

  #[error("invalid value for {key}: {value}")]
  InvalidEnv { key: &'static str, value: String },

  #[error("missing TIDB_DATABASE_URL (or DATABASE_URL)")]
  MissingDatabaseUrl,

  #[error("invalid TIDB_DATABASE_URL/DATABASE_URL (expected URL scheme like mysql://...)")]
  InvalidDatabaseUrl,
}

/// Per-video decode failure. The video is skipped and left unscored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
  #[error("missing published_at")]
  MissingPublishedAt,

  #[error("malformed published_at: {0}")]
  MalformedPublishedAt(String),

  #[error("missing view_count")]
  MissingViewCount,

  #[error("non-numeric view_count: {0}")]
  NonNumericViewCount(String),

  #[error("negative view_count: {0}")]
  NegativeViewCount(i64),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("store unavailable: {0}")]
  Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("channel timed out after {0}ms")]
  TimedOut(u128),

  #[error("cancelled")]
  Cancelled,
}

/// Errors that halt a whole batch before or during scheduling.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Store(#[from] StoreError),
}
