//! Propensity score repository.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::Result;
use crate::domain::{DateRange, Score};
use crate::scoring::ScoreSink;

/// A persisted score joined with its record's issue date.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ScoreDetail {
    pub record_id: String,
    pub folio: String,
    pub rule_id: String,
    pub score: f64,
    pub issued_at: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

/// SQLx implementation of [`ScoreSink`].
pub struct SqlxScoreSink {
    pool: SqlitePool,
}

impl SqlxScoreSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List persisted scores for records issued within `range`.
    pub async fn list_scores(&self, range: DateRange) -> Result<Vec<ScoreDetail>> {
        let details = sqlx::query_as::<_, ScoreDetail>(
            r#"
            SELECT s.record_id, s.folio, s.rule_id, s.score, r.issued_at, s.updated_at
            FROM propensity_scores s
            JOIN leave_records r ON r.id = s.record_id
            WHERE r.issued_at BETWEEN ? AND ?
            ORDER BY r.issued_at, s.record_id, s.rule_id
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;
        Ok(details)
    }

    /// Count stored scores.
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM propensity_scores")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ScoreSink for SqlxScoreSink {
    async fn upsert(&self, score: &Score) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO propensity_scores (record_id, rule_id, folio, score, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(record_id, rule_id) DO UPDATE SET
                folio = excluded.folio,
                score = excluded.score,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&score.record_id)
        .bind(score.rule_id.as_str())
        .bind(&score.folio)
        .bind(score.value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
