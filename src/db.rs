use async_trait::async_trait;
use sqlx::{mysql::MySqlPoolOptions, MySql, MySqlPool, QueryBuilder};
use tokio::sync::OnceCell;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::config::database_url;
use crate::error::{ConfigError, StoreError};
use crate::models::{BaselineResult, GrowthCurveEntry, VideoRow, ViewSnapshot};
use crate::store::{BaselineStore, UpsertReport};

static POOL: OnceCell<MySqlPool> = OnceCell::const_new();

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Store(#[from] StoreError),
}

async fn ensure_schema(pool: &MySqlPool) -> Result<(), StoreError> {
  // Keep schema creation idempotent; the runner may start against a fresh TiDB.
  sqlx::query(
    r#"
      CREATE TABLE IF NOT EXISTS videos (
        video_id VARCHAR(128) PRIMARY KEY,
        channel_id VARCHAR(128) NOT NULL,
        published_at TIMESTAMP(3) NULL,
        view_count BIGINT NULL,
        is_short TINYINT(1) NOT NULL DEFAULT 0,
        day30_estimate DOUBLE NULL,
        baseline DOUBLE NULL,
        performance_score DECIMAL(8,3) NULL,
        performance_tier VARCHAR(16) NULL,
        baseline_comparison_count INT NULL,
        baseline_confidence VARCHAR(16) NULL,
        baseline_estimate_source VARCHAR(16) NULL,
        baseline_computed_at TIMESTAMP(3) NULL,
        needs_baseline_reprocess TINYINT(1) NOT NULL DEFAULT 0,
        baseline_error TEXT NULL,
        updated_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3) ON UPDATE CURRENT_TIMESTAMP(3),
        KEY idx_videos_channel_published (channel_id, published_at),
        KEY idx_videos_reprocess (needs_baseline_reprocess)
      );
    "#,
  )
  .execute(pool)
  .await?;

  sqlx::query(
    r#"
      CREATE TABLE IF NOT EXISTS video_view_snapshots (
        video_id VARCHAR(128) NOT NULL,
        age_days INT NOT NULL,
        view_count BIGINT NOT NULL,
        observed_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        PRIMARY KEY (video_id, age_days, observed_at),
        KEY idx_video_view_snapshots_age (video_id, age_days)
      );
    "#,
  )
  .execute(pool)
  .await?;

  sqlx::query(
    r#"
      CREATE TABLE IF NOT EXISTS growth_curve (
        age_days INT PRIMARY KEY,
        median_views DOUBLE NOT NULL,
        updated_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3) ON UPDATE CURRENT_TIMESTAMP(3)
      );
    "#,
  )
  .execute(pool)
  .await?;

  Ok(())
}

pub async fn connect_pool(url: &str, max_connections: u32) -> Result<MySqlPool, StoreError> {
  let pool = MySqlPoolOptions::new()
    .max_connections(max_connections.max(1))
    .connect(url)
    .await?;
  ensure_schema(&pool).await?;
  Ok(pool)
}

/// Process-wide pool built from `TIDB_DATABASE_URL` (or `DATABASE_URL`).
pub async fn get_pool(max_connections: u32) -> Result<&'static MySqlPool, ConnectError> {
  POOL
    .get_or_try_init(|| async {
      let url = database_url()?;
      let pool = connect_pool(&url, max_connections).await?;
      Ok::<_, ConnectError>(pool)
    })
    .await
}

fn snapshots_from_rows(rows: Vec<(i64, i64)>) -> Vec<ViewSnapshot> {
  rows
    .into_iter()
    .filter_map(|(age, views)| {
      Some(ViewSnapshot {
        age_days: u32::try_from(age).ok()?,
        view_count: u64::try_from(views).ok()?,
      })
    })
    .collect()
}

fn curve_from_rows(rows: Vec<(i64, f64)>) -> Vec<GrowthCurveEntry> {
  rows
    .into_iter()
    .filter_map(|(age, median_views)| {
      Some(GrowthCurveEntry {
        age_days: u32::try_from(age).ok()?,
        median_views,
      })
    })
    .collect()
}

/// Errors the server raised for a specific row (constraint, range, type).
/// Anything else means the connection itself is in trouble.
fn is_row_level(err: &sqlx::Error) -> bool {
  matches!(err, sqlx::Error::Database(_))
}

fn push_upsert_values(builder: &mut QueryBuilder<'_, MySql>, rows: &[BaselineResult]) {
  builder.push_values(rows, |mut b, r| {
    b.push_bind(r.video_id.clone())
      .push_bind(r.channel_id.clone())
      .push_bind(r.day30_estimate)
      .push_bind(r.baseline)
      .push_bind(r.score)
      .push_bind(r.tier.as_str())
      .push_bind(r.comparison_count as i64)
      .push_bind(r.confidence.as_str())
      .push_bind(r.estimate_source.as_str());
  });
}

const UPSERT_PREFIX: &str = r#"
  INSERT INTO videos
    (video_id, channel_id, day30_estimate, baseline, performance_score, performance_tier,
     baseline_comparison_count, baseline_confidence, baseline_estimate_source)
"#;

const UPSERT_SUFFIX: &str = r#"
  ON DUPLICATE KEY UPDATE
    day30_estimate = VALUES(day30_estimate),
    baseline = VALUES(baseline),
    performance_score = VALUES(performance_score),
    performance_tier = VALUES(performance_tier),
    baseline_comparison_count = VALUES(baseline_comparison_count),
    baseline_confidence = VALUES(baseline_confidence),
    baseline_estimate_source = VALUES(baseline_estimate_source),
    baseline_computed_at = CURRENT_TIMESTAMP(3),
    needs_baseline_reprocess = 0,
    baseline_error = NULL,
    updated_at = CURRENT_TIMESTAMP(3);
"#;

#[derive(Debug, Clone)]
pub struct MySqlStore {
  pool: MySqlPool,
}

impl MySqlStore {
  pub fn new(pool: MySqlPool) -> Self {
    Self { pool }
  }

  async fn upsert_chunk(&self, rows: &[BaselineResult]) -> Result<(), sqlx::Error> {
    let mut tx = self.pool.begin().await?;
    let mut builder = QueryBuilder::<MySql>::new(UPSERT_PREFIX);
    push_upsert_values(&mut builder, rows);
    builder.push(UPSERT_SUFFIX);
    builder.build().execute(&mut *tx).await?;
    tx.commit().await
  }
}

#[async_trait]
impl BaselineStore for MySqlStore {
  async fn list_channel_ids(&self) -> Result<Vec<String>, StoreError> {
    let mut rows = sqlx::query_scalar::<_, String>(
      r#"
        SELECT DISTINCT channel_id
        FROM videos
        WHERE is_short = 0
        ORDER BY channel_id;
      "#,
    )
    .fetch(&self.pool);

    let mut out = Vec::new();
    while let Some(channel_id) = rows.next().await {
      out.push(channel_id?);
    }
    Ok(out)
  }

  async fn videos_for_channel(&self, channel_id: &str) -> Result<Vec<VideoRow>, StoreError> {
    let rows = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, bool)>(
      r#"
        SELECT video_id,
               channel_id,
               DATE_FORMAT(published_at, '%Y-%m-%d %H:%i:%s.%f') AS published_at_text,
               CAST(view_count AS CHAR) AS view_count_text,
               is_short
        FROM videos
        WHERE channel_id = ?
          AND is_short = 0
        ORDER BY videos.published_at ASC, video_id ASC;
      "#,
    )
    .bind(channel_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(
      rows
        .into_iter()
        .map(|(video_id, channel_id, published_at, view_count, is_short_form)| VideoRow {
          video_id,
          channel_id,
          published_at,
          view_count,
          is_short_form,
        })
        .collect(),
    )
  }

  async fn snapshots_near(
    &self,
    video_id: &str,
    target_age_days: u32,
    tolerance_days: u32,
  ) -> Result<Vec<ViewSnapshot>, StoreError> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
      r#"
        SELECT CAST(age_days AS SIGNED) AS age_days,
               CAST(view_count AS SIGNED) AS view_count
        FROM video_view_snapshots
        WHERE video_id = ?
          AND age_days BETWEEN ? AND ?
        ORDER BY age_days ASC, observed_at ASC;
      "#,
    )
    .bind(video_id)
    .bind(target_age_days.saturating_sub(tolerance_days))
    .bind(target_age_days.saturating_add(tolerance_days))
    .fetch_all(&self.pool)
    .await?;

    Ok(snapshots_from_rows(rows))
  }

  async fn growth_curve(&self) -> Result<Vec<GrowthCurveEntry>, StoreError> {
    let rows = sqlx::query_as::<_, (i64, f64)>(
      r#"
        SELECT CAST(age_days AS SIGNED) AS age_days,
               CAST(median_views AS DOUBLE) AS median_views
        FROM growth_curve
        ORDER BY age_days ASC;
      "#,
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(curve_from_rows(rows))
  }

  async fn upsert_baselines(&self, rows: &[BaselineResult]) -> Result<UpsertReport, StoreError> {
    if rows.is_empty() {
      return Ok(UpsertReport::default());
    }

    match self.upsert_chunk(rows).await {
      Ok(()) => {
        return Ok(UpsertReport {
          written: rows.len(),
          failed: Vec::new(),
        })
      }
      Err(err) if !is_row_level(&err) => return Err(err.into()),
      Err(err) => {
        warn!(rows = rows.len(), error = %err, "batch upsert rejected; retrying row by row");
      }
    }

    let mut report = UpsertReport::default();
    for row in rows {
      match self.upsert_chunk(std::slice::from_ref(row)).await {
        Ok(()) => report.written += 1,
        Err(err) if is_row_level(&err) => report.failed.push((row.video_id.clone(), err.to_string())),
        Err(err) => return Err(err.into()),
      }
    }
    debug!(written = report.written, failed = report.failed.len(), "row-by-row upsert done");
    Ok(report)
  }

  async fn flag_for_reprocess(&self, video_id: &str, reason: &str) -> Result<(), StoreError> {
    sqlx::query(
      r#"
        UPDATE videos
        SET needs_baseline_reprocess = 1,
            baseline_error = ?,
            baseline = NULL,
            performance_score = NULL,
            performance_tier = NULL,
            updated_at = CURRENT_TIMESTAMP(3)
        WHERE video_id = ?;
      "#,
    )
    .bind(reason)
    .bind(video_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}
