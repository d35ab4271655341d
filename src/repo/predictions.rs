//! Prediction log: record of served predictions and per-location history

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use uuid::Uuid;

use crate::domain::PredictionResult;

/// One served prediction with the location it was made for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub state: String,
    pub district: String,
    pub prediction: f64,
    pub confidence: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub rainfall: f64,
    pub timestamp: DateTime<FixedOffset>,
}

impl PredictionRecord {
    pub fn from_result(state: &str, district: &str, result: &PredictionResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: state.to_string(),
            district: district.to_string(),
            prediction: result.estimate_mw,
            confidence: result.confidence,
            temperature: result.parameters.temperature,
            humidity: result.parameters.humidity,
            wind_speed: result.parameters.wind_speed,
            rainfall: result.parameters.rainfall,
            timestamp: result.timestamp,
        }
    }

    fn matches(&self, state: &str, district: &str, since: &DateTime<FixedOffset>) -> bool {
        self.state == state && self.district == district && self.timestamp >= *since
    }
}

/// History row returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub prediction: f64,
    pub confidence: f64,
    pub temperature: f64,
    pub timestamp: DateTime<FixedOffset>,
}

impl From<&PredictionRecord> for HistoryEntry {
    fn from(r: &PredictionRecord) -> Self {
        Self {
            prediction: r.prediction,
            confidence: r.confidence,
            temperature: r.temperature,
            timestamp: r.timestamp,
        }
    }
}

#[async_trait]
pub trait PredictionLog: Send + Sync {
    async fn append(&self, record: &PredictionRecord) -> Result<()>;

    /// Entries for one location at or after `since`, newest first
    async fn history(
        &self,
        state: &str,
        district: &str,
        since: DateTime<FixedOffset>,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>>;
}

fn newest_first<'a>(
    records: impl Iterator<Item = &'a PredictionRecord>,
    state: &str,
    district: &str,
    since: &DateTime<FixedOffset>,
    limit: usize,
) -> Vec<HistoryEntry> {
    let mut hits: Vec<&PredictionRecord> = records
        .filter(|r| r.matches(state, district, since))
        .collect();
    hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    hits.into_iter().take(limit).map(HistoryEntry::from).collect()
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS predictions (
    id BLOB PRIMARY KEY,
    state TEXT NOT NULL,
    district TEXT NOT NULL,
    prediction REAL NOT NULL,
    confidence REAL NOT NULL,
    temperature REAL NOT NULL,
    humidity REAL NOT NULL,
    wind_speed REAL NOT NULL,
    rainfall REAL NOT NULL,
    timestamp TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_predictions_location
    ON predictions (state, district, timestamp_ms);
"#;

/// Repository for served predictions, backed by SQLite
///
/// Rows keep the offset they were recorded with in `timestamp`; filtering and
/// ordering use the absolute instant in `timestamp_ms`.
pub struct PredictionRepository {
    pool: SqlitePool,
}

impl PredictionRepository {
    /// Open (or create) the database file and make sure the schema exists
    pub async fn connect(path: &Path, max_connections: u32) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open prediction database {}", path.display()))?;

        let repo = Self::new(pool);
        repo.init().await?;
        Ok(repo)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the predictions table and its lookup index
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to create predictions table")?;
        Ok(())
    }

    /// Insert one served prediction
    pub async fn insert(&self, record: &PredictionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions
                (id, state, district, prediction, confidence,
                 temperature, humidity, wind_speed, rainfall, timestamp, timestamp_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id)
        .bind(&record.state)
        .bind(&record.district)
        .bind(record.prediction)
        .bind(record.confidence)
        .bind(record.temperature)
        .bind(record.humidity)
        .bind(record.wind_speed)
        .bind(record.rainfall)
        .bind(record.timestamp)
        .bind(record.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert prediction")?;
        Ok(())
    }

    /// Most recent entries for one location at or after `since`
    pub async fn find_recent(
        &self,
        state: &str,
        district: &str,
        since: DateTime<FixedOffset>,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT prediction, confidence, temperature, timestamp
            FROM predictions
            WHERE state = ? AND district = ? AND timestamp_ms >= ?
            ORDER BY timestamp_ms DESC
            LIMIT ?
            "#,
        )
        .bind(state)
        .bind(district)
        .bind(since.timestamp_millis())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query prediction history")?;

        rows.iter()
            .map(|row| -> Result<HistoryEntry> {
                Ok(HistoryEntry {
                    prediction: row.try_get("prediction")?,
                    confidence: row.try_get("confidence")?,
                    temperature: row.try_get("temperature")?,
                    timestamp: row.try_get("timestamp")?,
                })
            })
            .collect()
    }

    /// Delete predictions recorded before `before`; returns the number removed
    pub async fn delete_old_data(&self, before: DateTime<FixedOffset>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM predictions WHERE timestamp_ms < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await
            .context("Failed to prune predictions")?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM predictions")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

#[async_trait]
impl PredictionLog for PredictionRepository {
    async fn append(&self, record: &PredictionRecord) -> Result<()> {
        self.insert(record).await
    }

    async fn history(
        &self,
        state: &str,
        district: &str,
        since: DateTime<FixedOffset>,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        self.find_recent(state, district, since, limit).await
    }
}

/// Process-local log, for tests and ephemeral runs
#[derive(Default)]
pub struct InMemoryPredictionLog {
    records: parking_lot::Mutex<Vec<PredictionRecord>>,
}

impl InMemoryPredictionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl PredictionLog for InMemoryPredictionLog {
    async fn append(&self, record: &PredictionRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    async fn history(
        &self,
        state: &str,
        district: &str,
        since: DateTime<FixedOffset>,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let records = self.records.lock();
        Ok(newest_first(records.iter(), state, district, &since, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(19800)
            .unwrap()
            .with_ymd_and_hms(2024, 6, day, hour, 0, 0)
            .unwrap()
    }

    fn record(state: &str, district: &str, prediction: f64, ts: DateTime<FixedOffset>) -> PredictionRecord {
        PredictionRecord {
            id: Uuid::new_v4(),
            state: state.to_string(),
            district: district.to_string(),
            prediction,
            confidence: 0.9,
            temperature: 30.0,
            humidity: 60.0,
            wind_speed: 10.0,
            rainfall: 0.0,
            timestamp: ts,
        }
    }

    async fn seed(log: &dyn PredictionLog) {
        log.append(&record("Delhi", "New Delhi", 1.0, at(1, 8))).await.unwrap();
        log.append(&record("Delhi", "New Delhi", 3.0, at(3, 8))).await.unwrap();
        log.append(&record("Delhi", "New Delhi", 2.0, at(2, 8))).await.unwrap();
        log.append(&record("Delhi", "South Delhi", 9.0, at(3, 9))).await.unwrap();
        log.append(&record("Kerala", "New Delhi", 9.0, at(3, 9))).await.unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_history_filters_and_orders() {
        let log = InMemoryPredictionLog::new();
        seed(&log).await;
        assert_eq!(log.len(), 5);

        let history = log.history("Delhi", "New Delhi", at(1, 0), 100).await.unwrap();
        let values: Vec<f64> = history.iter().map(|h| h.prediction).collect();
        assert_eq!(values, vec![3.0, 2.0, 1.0]);

        let recent = log.history("Delhi", "New Delhi", at(2, 0), 100).await.unwrap();
        assert_eq!(recent.len(), 2);

        let limited = log.history("Delhi", "New Delhi", at(1, 0), 1).await.unwrap();
        assert_eq!(limited[0].prediction, 3.0);
    }

    async fn temp_repository() -> (PredictionRepository, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("ipf-{}.db", Uuid::new_v4()));
        let repo = PredictionRepository::connect(&path, 2).await.unwrap();
        (repo, path)
    }

    async fn remove_database(path: &Path) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = path.as_os_str().to_owned();
            p.push(suffix);
            tokio::fs::remove_file(std::path::PathBuf::from(p)).await.ok();
        }
    }

    #[tokio::test]
    async fn test_repository_filters_orders_and_limits() {
        let (repo, path) = temp_repository().await;
        assert!(repo.history("Delhi", "New Delhi", at(1, 0), 10).await.unwrap().is_empty());

        seed(&repo).await;
        assert_eq!(repo.count().await.unwrap(), 5);

        let history = repo.history("Delhi", "New Delhi", at(1, 0), 100).await.unwrap();
        let values: Vec<f64> = history.iter().map(|h| h.prediction).collect();
        assert_eq!(values, vec![3.0, 2.0, 1.0]);
        assert_eq!(history[0].timestamp, at(3, 8));
        assert_eq!(history[0].timestamp.offset().local_minus_utc(), 19800);

        let recent = repo.history("Delhi", "New Delhi", at(2, 0), 100).await.unwrap();
        assert_eq!(recent.len(), 2);

        let limited = repo.history("Delhi", "New Delhi", at(1, 0), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].prediction, 3.0);

        remove_database(&path).await;
    }

    #[tokio::test]
    async fn test_repository_orders_by_instant_across_offsets() {
        let (repo, path) = temp_repository().await;
        // 03:00 UTC is later than 08:00 IST (02:30 UTC) on the same day
        let utc = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 3, 0, 0)
            .unwrap();
        repo.append(&record("Delhi", "New Delhi", 1.0, at(1, 8))).await.unwrap();
        repo.append(&record("Delhi", "New Delhi", 2.0, utc)).await.unwrap();

        let history = repo.history("Delhi", "New Delhi", at(1, 0), 10).await.unwrap();
        let values: Vec<f64> = history.iter().map(|h| h.prediction).collect();
        assert_eq!(values, vec![2.0, 1.0]);

        let after = repo.history("Delhi", "New Delhi", at(1, 8) + Duration::minutes(1), 10).await.unwrap();
        assert_eq!(after.len(), 1);

        remove_database(&path).await;
    }

    #[tokio::test]
    async fn test_repository_survives_reopen_and_prunes() {
        let (repo, path) = temp_repository().await;
        seed(&repo).await;
        drop(repo);

        let reopened = PredictionRepository::connect(&path, 1).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 5);

        let removed = reopened.delete_old_data(at(2, 12)).await.unwrap();
        assert_eq!(removed, 2);
        let history = reopened.history("Delhi", "New Delhi", at(1, 0), 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].prediction, 3.0);

        remove_database(&path).await;
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_all_recorded() {
        let (repo, path) = temp_repository().await;
        let repo = std::sync::Arc::new(repo);

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let ts = at(1, 0) + Duration::minutes(i64::from(i));
                repo.append(&record("Delhi", "New Delhi", f64::from(i), ts)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let history = repo.history("Delhi", "New Delhi", at(1, 0), 100).await.unwrap();
        assert_eq!(history.len(), 16);
        assert_eq!(history[0].prediction, 15.0);

        remove_database(&path).await;
    }

    #[test]
    fn test_history_entry_from_record() {
        let r = record("Delhi", "New Delhi", 5.0, at(1, 8));
        let h = HistoryEntry::from(&r);
        assert_eq!(h.prediction, 5.0);
        assert_eq!(h.temperature, 30.0);
        assert_eq!(h.timestamp, at(1, 8));
    }
}
