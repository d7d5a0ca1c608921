use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use rusqlite::types::Type;
use rusqlite::{params, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use tokio_rusqlite::Connection;

use crate::error::{PipelineError, Result};
use crate::models::{SummaryLength, SummaryRecord, UserId};

use super::schema::SCHEMA;
use super::{IdAllocator, SummaryStore};

const SUMMARY_ID_COUNTER: &str = "summaryId";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ALLOCATION_ATTEMPTS: u32 = 5;
const ALLOCATION_BACKOFF: Duration = Duration::from_millis(25);

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Counter operations

    /// Read-modify-write of a named counter inside one IMMEDIATE transaction,
    /// so the write lock is held from the read until the commit.
    async fn increment_counter(&self, name: &'static str) -> tokio_rusqlite::Result<i64> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current: i64 = tx
                    .query_row(
                        "SELECT value FROM counters WHERE name = ?1",
                        params![name],
                        |row| row.get(0),
                    )
                    .optional()?
                    .unwrap_or(0);
                let next = current + 1;
                tx.execute(
                    r#"INSERT INTO counters (name, value) VALUES (?1, ?2)
                       ON CONFLICT(name) DO UPDATE SET value = excluded.value"#,
                    params![name, next],
                )?;
                tx.commit()?;
                Ok(next)
            })
            .await
    }

    // Summary operations

    async fn insert_summary(&self, record: SummaryRecord) -> tokio_rusqlite::Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO summaries (summary_id, book_name, user_id, add_prompt, length,
                                              summary, timestamp_formatted, timestamp_raw)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                    params![
                        record.summary_id,
                        record.book_name,
                        record.user_id.as_str(),
                        record.add_prompt,
                        record.length.label(),
                        record.summary,
                        record.timestamp_formatted,
                        record.timestamp_raw.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn summaries_for_user(&self, user_id: String) -> tokio_rusqlite::Result<Vec<SummaryRecord>> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT summary_id, book_name, user_id, add_prompt, length, summary,
                              timestamp_formatted, timestamp_raw
                       FROM summaries
                       WHERE user_id = ?1
                       ORDER BY timestamp_raw DESC, summary_id DESC"#,
                )?;
                let summaries = stmt
                    .query_map(params![user_id], summary_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(summaries)
            })
            .await
    }
}

#[async_trait]
impl IdAllocator for Repository {
    async fn allocate_next_id(&self) -> std::result::Result<i64, PipelineError> {
        let mut attempt = 1;
        loop {
            match self.increment_counter(SUMMARY_ID_COUNTER).await {
                Ok(id) => {
                    tracing::debug!("Allocated summary id {}", id);
                    return Ok(id);
                }
                Err(e) if is_contention(&e) && attempt < MAX_ALLOCATION_ATTEMPTS => {
                    tracing::warn!("Counter busy (attempt {}), retrying: {}", attempt, e);
                    tokio::time::sleep(ALLOCATION_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to increment summary id counter: {}", e);
                    return Err(PipelineError::AllocationFailed(e.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl SummaryStore for Repository {
    async fn save(&self, record: &SummaryRecord) -> std::result::Result<(), PipelineError> {
        self.insert_summary(record.clone()).await.map_err(|e| {
            tracing::error!("Failed to save summary {}: {}", record.summary_id, e);
            PipelineError::PersistFailed(e.to_string())
        })
    }

    async fn fetch_by_user(
        &self,
        user_id: &UserId,
    ) -> std::result::Result<Vec<SummaryRecord>, PipelineError> {
        self.summaries_for_user(user_id.as_str().to_string())
            .await
            .map_err(|e| {
                tracing::error!("Error getting summaries for {}: {}", user_id, e);
                PipelineError::FetchFailed(e.to_string())
            })
    }
}

fn is_contention(error: &tokio_rusqlite::Error) -> bool {
    matches!(
        error,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(failure, _))
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn summary_from_row(row: &Row) -> rusqlite::Result<SummaryRecord> {
    let user_id: String = row.get(2)?;
    let user_id = UserId::new(user_id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.to_string().into())
    })?;

    let millis: i64 = row.get(7)?;
    let timestamp_raw = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            Type::Integer,
            format!("timestamp {millis} out of range").into(),
        )
    })?;

    Ok(SummaryRecord {
        summary_id: row.get(0)?,
        book_name: row.get(1)?,
        user_id,
        add_prompt: row.get(3)?,
        length: SummaryLength::from(row.get::<_, String>(4)?),
        summary: row.get(5)?,
        timestamp_formatted: row.get(6)?,
        timestamp_raw,
    })
}
