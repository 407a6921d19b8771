//! Execution log storage repository.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::model::{ExecutionRecord, LogKey};
use crate::Result;

/// `SQLite`-backed execution log.
///
/// The pool holds a single connection, so writes from a history sweep and
/// from the polling task are applied one at a time.
pub struct ExecutionLog {
    pool: SqlitePool,
}

impl ExecutionLog {
    /// Opens the log at `path`, creating the file and its parent
    /// directories on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let log = Self { pool };
        log.initialize().await?;
        debug!(path = %path.display(), "Execution log opened");
        Ok(log)
    }

    /// Create an in-memory log for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let log = Self { pool };
        log.initialize().await?;
        Ok(log)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS executions (
                rule_name TEXT NOT NULL,
                scope TEXT NOT NULL,
                matched_subject TEXT NOT NULL DEFAULT '',
                executed_at TEXT NOT NULL,
                exit_code INTEGER NOT NULL,
                error_detail TEXT,
                PRIMARY KEY (rule_name, scope)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Check whether a record exists for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn has(&self, key: &LogKey) -> Result<bool> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) as count
            FROM executions
            WHERE rule_name = ? AND scope = ?
            ",
        )
        .bind(key.rule_name())
        .bind(key.scope())
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// Get the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the stored timestamp
    /// cannot be decoded.
    pub async fn get(&self, key: &LogKey) -> Result<Option<ExecutionRecord>> {
        let row = sqlx::query(
            r"
            SELECT rule_name, matched_subject, executed_at, exit_code, error_detail
            FROM executions
            WHERE rule_name = ? AND scope = ?
            ",
        )
        .bind(key.rule_name())
        .bind(key.scope())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Insert or replace the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upsert(&self, key: &LogKey, record: &ExecutionRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO executions
                (rule_name, scope, matched_subject, executed_at, exit_code, error_detail)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(rule_name, scope) DO UPDATE SET
                matched_subject = excluded.matched_subject,
                executed_at = excluded.executed_at,
                exit_code = excluded.exit_code,
                error_detail = excluded.error_detail
            ",
        )
        .bind(key.rule_name())
        .bind(key.scope())
        .bind(&record.matched_subject)
        .bind(record.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .bind(record.exit_code)
        .bind(&record.error_detail)
        .execute(&self.pool)
        .await?;

        debug!(
            rule = %record.rule_name,
            exit_code = record.exit_code,
            "Execution recorded"
        );
        Ok(())
    }

    /// Get every record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored timestamp
    /// cannot be decoded.
    pub async fn list(&self) -> Result<Vec<ExecutionRecord>> {
        let rows = sqlx::query(
            r"
            SELECT rule_name, matched_subject, executed_at, exit_code, error_detail
            FROM executions
            ORDER BY executed_at ASC, rule_name ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Close the underlying pool, waiting for pending writes.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn record_from_row(row: &SqliteRow) -> Result<ExecutionRecord> {
    let executed_at: String = row.get("executed_at");
    let timestamp = DateTime::parse_from_rfc3339(&executed_at)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        .with_timezone(&Utc);

    Ok(ExecutionRecord {
        rule_name: row.get("rule_name"),
        matched_subject: row.get("matched_subject"),
        timestamp,
        exit_code: row.get::<i32, _>("exit_code"),
        error_detail: row.get("error_detail"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::log::LAUNCH_FAILED;

    #[tokio::test]
    async fn test_upsert_and_read_back() {
        let log = ExecutionLog::in_memory().await.unwrap();
        let key = LogKey::Rule("invoice".into());
        let record = ExecutionRecord::completed("invoice", "INVOICE #1", 0, None);

        assert!(!log.has(&key).await.unwrap());
        log.upsert(&key, &record).await.unwrap();
        assert!(log.has(&key).await.unwrap());

        let stored = log.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.rule_name, record.rule_name);
        assert_eq!(stored.exit_code, record.exit_code);
        assert_eq!(stored.timestamp, record.timestamp);
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_record() {
        let log = ExecutionLog::in_memory().await.unwrap();
        let key = LogKey::Message {
            rule: "alerts".into(),
            subject: "disk full".into(),
        };

        log.upsert(&key, &ExecutionRecord::completed("alerts", "disk full", 0, None))
            .await
            .unwrap();
        log.upsert(&key, &ExecutionRecord::failed("alerts", "disk full", "boom"))
            .await
            .unwrap();

        let all = log.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].exit_code, LAUNCH_FAILED);
        assert_eq!(all[0].error_detail.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_rule_and_message_keys_are_distinct() {
        let log = ExecutionLog::in_memory().await.unwrap();
        log.upsert(
            &LogKey::Message {
                rule: "r".into(),
                subject: "hello".into(),
            },
            &ExecutionRecord::completed("r", "hello", 0, None),
        )
        .await
        .unwrap();

        assert!(!log.has(&LogKey::Rule("r".into())).await.unwrap());
        assert!(
            !log.has(&LogKey::Message {
                rule: "r".into(),
                subject: "other".into(),
            })
            .await
            .unwrap()
        );
    }

    #[tokio::test]
    async fn test_open_creates_file_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mailhook.db");
        let key = LogKey::Rule("invoice".into());

        {
            let log = ExecutionLog::open(&path).await.unwrap();
            log.upsert(&key, &ExecutionRecord::completed("invoice", "INVOICE #1", 0, None))
                .await
                .unwrap();
            log.close().await;
        }
        assert!(path.exists());

        let reopened = ExecutionLog::open(&path).await.unwrap();
        assert!(reopened.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_log_reports_error() {
        let log = ExecutionLog::in_memory().await.unwrap();
        log.close().await;

        let result = log.has(&LogKey::Rule("r".into())).await;
        assert!(matches!(result, Err(crate::Error::LogStore(_))));
    }
}
