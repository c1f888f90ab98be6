use sqlx::Row;

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::{StagedEntity, StagedRelationship, StagedUnit};

const DATA_TYPE_UNIT: &str = "unit";
const DATA_TYPE_ENTITY: &str = "entity";
const DATA_TYPE_RELATIONSHIP: &str = "relationship";

impl GraphStore {
    pub async fn stage_units(
        &self,
        correlation_id: &str,
        batch_id: i32,
        project_id: i64,
        units: &[StagedUnit],
    ) -> Result<()> {
        self.stage_rows(correlation_id, batch_id, project_id, DATA_TYPE_UNIT, units)
            .await
    }

    pub async fn stage_entities(
        &self,
        correlation_id: &str,
        batch_id: i32,
        project_id: i64,
        entities: &[StagedEntity],
    ) -> Result<()> {
        self.stage_rows(correlation_id, batch_id, project_id, DATA_TYPE_ENTITY, entities)
            .await
    }

    pub async fn stage_relationships(
        &self,
        correlation_id: &str,
        batch_id: i32,
        project_id: i64,
        rels: &[StagedRelationship],
    ) -> Result<()> {
        self.stage_rows(
            correlation_id,
            batch_id,
            project_id,
            DATA_TYPE_RELATIONSHIP,
            rels,
        )
        .await
    }

    async fn stage_rows<T: serde::Serialize>(
        &self,
        correlation_id: &str,
        batch_id: i32,
        project_id: i64,
        data_type: &str,
        rows: &[T],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            let payload = serde_json::to_value(row)
                .map_err(|e| crate::error::StoreError::Validation(e.to_string()))?;
            sqlx::query(
                "INSERT INTO extraction_staging (correlation_id, batch_id, project_id, data_type, payload)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(correlation_id)
            .bind(batch_id)
            .bind(project_id)
            .bind(data_type)
            .bind(payload)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_staged_units(
        &self,
        correlation_id: &str,
        batch_id: i32,
    ) -> Result<Vec<StagedUnit>> {
        self.load_staged(correlation_id, batch_id, DATA_TYPE_UNIT)
            .await
    }

    pub async fn load_staged_entities(
        &self,
        correlation_id: &str,
        batch_id: i32,
    ) -> Result<Vec<StagedEntity>> {
        self.load_staged(correlation_id, batch_id, DATA_TYPE_ENTITY)
            .await
    }

    pub async fn load_staged_relationships(
        &self,
        correlation_id: &str,
        batch_id: i32,
    ) -> Result<Vec<StagedRelationship>> {
        self.load_staged(correlation_id, batch_id, DATA_TYPE_RELATIONSHIP)
            .await
    }

    async fn load_staged<T: serde::de::DeserializeOwned>(
        &self,
        correlation_id: &str,
        batch_id: i32,
        data_type: &str,
    ) -> Result<Vec<T>> {
        let rows = sqlx::query(
            "SELECT payload FROM extraction_staging
             WHERE correlation_id = $1 AND batch_id = $2 AND data_type = $3
             ORDER BY id ASC",
        )
        .bind(correlation_id)
        .bind(batch_id)
        .bind(data_type)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                let payload: serde_json::Value = r.get("payload");
                serde_json::from_value(payload)
                    .map_err(|e| crate::error::StoreError::Validation(e.to_string()))
            })
            .collect()
    }

    /// `DeleteStaged` (§4.3, §4.4, §4.5 step 9): drops the whole write-ahead
    /// area for a `(correlation_id, batch_id)` on success or rollback.
    pub async fn delete_staged(&self, correlation_id: &str, batch_id: i32) -> Result<()> {
        sqlx::query(
            "DELETE FROM extraction_staging WHERE correlation_id = $1 AND batch_id = $2",
        )
        .bind(correlation_id)
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Best-effort periodic sweep of staging rows with no matching
    /// `batch_status` row left (§3: "cleaned on success or periodic sweeper").
    pub async fn sweep_orphan_staging(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM extraction_staging es
            WHERE NOT EXISTS (
                SELECT 1 FROM batch_status bs
                WHERE bs.correlation_id = es.correlation_id AND bs.batch_id = es.batch_id
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
