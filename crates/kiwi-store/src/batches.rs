use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::{BatchStatus, DescriptionJobStatus};
use kiwi_core::domain::StatType;

impl GraphStore {
    /// Unique by `(correlation_id, batch_id)` (§3).
    pub async fn create_batch_status(
        &self,
        correlation_id: &str,
        batch_id: i32,
        total_batches: i32,
        project_id: i64,
        file_ids: &[i64],
        operation: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batch_status (correlation_id, batch_id, total_batches, project_id, file_ids, operation, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            ON CONFLICT (correlation_id, batch_id) DO NOTHING
            "#,
        )
        .bind(correlation_id)
        .bind(batch_id)
        .bind(total_batches)
        .bind(project_id)
        .bind(file_ids)
        .bind(operation)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_batch_status(
        &self,
        correlation_id: &str,
        batch_id: i32,
    ) -> Result<Option<BatchStatus>> {
        let row = sqlx::query(
            "SELECT correlation_id, batch_id, total_batches, project_id, file_ids, operation,
                    status, estimated_duration_ms, error_message, started_at, updated_at
             FROM batch_status WHERE correlation_id = $1 AND batch_id = $2",
        )
        .bind(correlation_id)
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_batch_status))
    }

    pub async fn set_batch_status(
        &self,
        correlation_id: &str,
        batch_id: i32,
        status: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE batch_status
            SET status = $3,
                updated_at = now(),
                started_at = COALESCE(started_at, now())
            WHERE correlation_id = $1 AND batch_id = $2
            "#,
        )
        .bind(correlation_id)
        .bind(batch_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_batch_status(
        &self,
        correlation_id: &str,
        batch_id: i32,
        error_message: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE batch_status SET status = 'failed', error_message = $3, updated_at = now()
             WHERE correlation_id = $1 AND batch_id = $2",
        )
        .bind(correlation_id)
        .bind(batch_id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_batch_estimated_duration(
        &self,
        correlation_id: &str,
        batch_id: i32,
        estimated_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE batch_status SET estimated_duration_ms = $3 WHERE correlation_id = $1 AND batch_id = $2",
        )
        .bind(correlation_id)
        .bind(batch_id)
        .bind(estimated_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stale-batch recovery (§4.6): batches whose `started_at` is older than
    /// `stale_after_hours` and still in an in-flight state.
    pub async fn find_stale_batches(&self, stale_after_hours: i64) -> Result<Vec<BatchStatus>> {
        let rows = sqlx::query(
            r#"
            SELECT correlation_id, batch_id, total_batches, project_id, file_ids, operation,
                   status, estimated_duration_ms, error_message, started_at, updated_at
            FROM batch_status
            WHERE status IN ('preprocessing', 'extracting', 'indexing')
              AND started_at < now() - ($1 || ' hours')::interval
            "#,
        )
        .bind(stale_after_hours.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_batch_status).collect())
    }

    /// `AreAllBatchesCompleted` (§9 open question): pure query, no side
    /// effect, consistent with the decision recorded in SPEC_FULL.md.
    pub async fn are_all_batches_completed(&self, correlation_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE status = 'completed') AS done
             FROM batch_status WHERE correlation_id = $1",
        )
        .bind(correlation_id)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.get("total");
        let done: i64 = row.get("done");
        Ok(total > 0 && total == done)
    }

    pub async fn create_description_job(
        &self,
        correlation_id: &str,
        job_id: i32,
        entity_ids: &[i64],
        relationship_ids: &[i64],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO description_job_status (correlation_id, job_id, entity_ids, relationship_ids, status)
            VALUES ($1, $2, $3, $4, 'pending')
            ON CONFLICT (correlation_id, job_id) DO NOTHING
            "#,
        )
        .bind(correlation_id)
        .bind(job_id)
        .bind(entity_ids)
        .bind(relationship_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_description_job_status(
        &self,
        correlation_id: &str,
        job_id: i32,
        status: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE description_job_status SET status = $3 WHERE correlation_id = $1 AND job_id = $2",
        )
        .bind(correlation_id)
        .bind(job_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_description_job(
        &self,
        correlation_id: &str,
        job_id: i32,
    ) -> Result<Option<DescriptionJobStatus>> {
        let row = sqlx::query(
            "SELECT correlation_id, job_id, entity_ids, relationship_ids, status
             FROM description_job_status WHERE correlation_id = $1 AND job_id = $2",
        )
        .bind(correlation_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| DescriptionJobStatus {
            correlation_id: r.get("correlation_id"),
            job_id: r.get("job_id"),
            entity_ids: r.get("entity_ids"),
            relationship_ids: r.get("relationship_ids"),
            status: r.get("status"),
        }))
    }

    /// Records one completed phase observation for ETA prediction (§4.6).
    pub async fn record_stat(&self, stat_type: StatType, amount: f64, duration_ms: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO stats (stat_type, amount, duration_ms) VALUES ($1, $2, $3)",
        )
        .bind(stat_type.as_str())
        .bind(amount)
        .bind(duration_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `predicted = (sum(duration) / sum(amount)) * current_amount` (§4.6).
    pub async fn predict_duration_ms(&self, stat_type: StatType, current_amount: f64) -> Result<Option<i64>> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(duration_ms), 0)::double precision AS total_duration,
                    COALESCE(SUM(amount), 0) AS total_amount
             FROM stats WHERE stat_type = $1",
        )
        .bind(stat_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        let total_duration: f64 = row.get("total_duration");
        let total_amount: f64 = row.get("total_amount");
        if total_amount <= 0.0 {
            return Ok(None);
        }
        Ok(Some(((total_duration / total_amount) * current_amount) as i64))
    }
}

fn row_to_batch_status(row: sqlx::postgres::PgRow) -> BatchStatus {
    BatchStatus {
        correlation_id: row.get("correlation_id"),
        batch_id: row.get("batch_id"),
        total_batches: row.get("total_batches"),
        project_id: row.get("project_id"),
        file_ids: row.get("file_ids"),
        operation: row.get("operation"),
        status: row.get("status"),
        estimated_duration_ms: row.get("estimated_duration_ms"),
        error_message: row.get("error_message"),
        started_at: row.get::<Option<DateTime<Utc>>, _>("started_at"),
        updated_at: row.get::<Option<DateTime<Utc>>, _>("updated_at"),
    }
}
