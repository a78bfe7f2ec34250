//! Leave record repository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::domain::{DateRange, LeaveRecord, RecordField};
use crate::scoring::RecordSource;
use crate::{Error, Result};

/// SQLx implementation of [`RecordSource`].
pub struct SqlxRecordSource {
    pool: SqlitePool,
}

impl SqlxRecordSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace many records in one transaction.
    pub async fn import(&self, records: &[LeaveRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            let issued_at = record.issued_at.ok_or_else(|| Error::MissingField {
                record_id: record.id.clone(),
                field: RecordField::IssuedAt.to_string(),
            })?;

            sqlx::query(
                r#"
                INSERT INTO leave_records
                    (id, folio, rest_days, issued_at, rest_start, specialty, diagnosis_code)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    folio = excluded.folio,
                    rest_days = excluded.rest_days,
                    issued_at = excluded.issued_at,
                    rest_start = excluded.rest_start,
                    specialty = excluded.specialty,
                    diagnosis_code = excluded.diagnosis_code
                "#,
            )
            .bind(&record.id)
            .bind(&record.folio)
            .bind(record.rest_days)
            .bind(issued_at)
            .bind(record.rest_start)
            .bind(&record.specialty)
            .bind(&record.diagnosis_code)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }
}

#[async_trait]
impl RecordSource for SqlxRecordSource {
    async fn fetch(&self, range: DateRange) -> Result<Vec<LeaveRecord>> {
        let records = sqlx::query_as::<_, LeaveRecord>(
            r#"
            SELECT id, folio, rest_days, issued_at, rest_start, specialty, diagnosis_code
            FROM leave_records
            WHERE issued_at BETWEEN ? AND ?
            ORDER BY issued_at, id
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Extraction(e.to_string()))?;

        debug!(
            start = %range.start,
            end = %range.end,
            count = records.len(),
            "Fetched leave records"
        );
        Ok(records)
    }
}
