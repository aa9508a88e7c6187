use crate::error::Result;
use crate::sample::ActivityRecord;
use chrono::DateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

/// Append-only sink for activity summaries.
///
/// Every flush opens a connection, performs one parameterized insert and
/// closes again; no handle is held between windows. A failed write is
/// logged and reported, never propagated. The next window retries
/// naturally when the scheduler fires again.
pub struct ActivityStore {
    database_path: PathBuf,
    stats: StoreStats,
}

/// Counters for persisted and failed flushes
#[derive(Debug, Default)]
pub struct StoreStats {
    records_written: AtomicU64,
    write_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatsSnapshot {
    pub records_written: u64,
    pub write_failures: u64,
}

impl ActivityStore {
    pub fn new<P: AsRef<Path>>(database_path: P) -> Self {
        Self {
            database_path: database_path.as_ref().to_path_buf(),
            stats: StoreStats::default(),
        }
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        let options = SqliteConnectOptions::new()
            .filename(&self.database_path)
            .create_if_missing(true);
        Ok(options.connect().await?)
    }

    /// Create the summary table when missing. The recorder calls this once
    /// at start; the table itself is append-only afterwards.
    pub async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.connect().await?;
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                avg_speed REAL,
                gyro_movement REAL,
                steps INTEGER NOT NULL CHECK (steps >= 0),
                latitude REAL,
                longitude REAL,
                timestamp TEXT NOT NULL,
                day_of_week TEXT NOT NULL
            )
            ",
        )
        .execute(&mut conn)
        .await?;
        conn.close().await?;
        debug!("Activity log schema ensured at {}", self.database_path.display());
        Ok(())
    }

    /// Persist one summary record. Returns whether the write succeeded;
    /// storage errors are logged here and never crash the scheduler.
    pub async fn flush(&self, record: &ActivityRecord) -> bool {
        match self.try_flush(record).await {
            Ok(()) => {
                self.stats.records_written.fetch_add(1, Ordering::Relaxed);
                debug!(
                    steps = record.steps,
                    avg_speed = ?record.avg_speed,
                    "Activity record persisted"
                );
                true
            }
            Err(e) => {
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                error!("Failed to persist activity record: {}", e);
                false
            }
        }
    }

    async fn try_flush(&self, record: &ActivityRecord) -> Result<()> {
        let mut conn = self.connect().await?;

        let insert = sqlx::query(
            r"
            INSERT INTO activity_log (avg_speed, gyro_movement, steps, latitude, longitude, timestamp, day_of_week)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(record.avg_speed)
        .bind(record.gyro_movement)
        .bind(record.steps)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.timestamp_iso())
        .bind(&record.day_of_week)
        .execute(&mut conn)
        .await;

        // One insert per connection; close even when the insert failed
        let close_result = conn.close().await;
        insert?;
        if let Err(e) = close_result {
            warn!("Failed to close storage connection cleanly: {}", e);
        }
        Ok(())
    }

    /// Fetch the most recent records, newest first
    pub async fn fetch_recent(&self, limit: u32) -> Result<Vec<ActivityRecord>> {
        let mut conn = self.connect().await?;

        let rows = sqlx::query(
            r"
            SELECT avg_speed, gyro_movement, steps, latitude, longitude, timestamp, day_of_week
            FROM activity_log
            ORDER BY id DESC
            LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&mut conn)
        .await?;

        conn.close().await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let timestamp_text: String = row.try_get("timestamp")?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_text)
                .map_err(|e| {
                    crate::error::FitrecError::component(
                        "storage".to_string(),
                        format!("bad timestamp '{}': {}", timestamp_text, e),
                    )
                })?
                .with_timezone(&chrono::Utc);

            records.push(ActivityRecord {
                avg_speed: row.try_get("avg_speed")?,
                gyro_movement: row.try_get("gyro_movement")?,
                steps: row.try_get("steps")?,
                latitude: row.try_get("latitude")?,
                longitude: row.try_get("longitude")?,
                timestamp,
                day_of_week: row.try_get("day_of_week")?,
            });
        }
        Ok(records)
    }

    /// Total rows in the activity log
    pub async fn record_count(&self) -> Result<u64> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM activity_log")
            .fetch_one(&mut conn)
            .await?;
        conn.close().await?;
        let count: i64 = row.try_get("n")?;
        Ok(count as u64)
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            records_written: self.stats.records_written.load(Ordering::Relaxed),
            write_failures: self.stats.write_failures.load(Ordering::Relaxed),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }
}
