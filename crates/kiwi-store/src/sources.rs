use std::collections::HashMap;

use pgvector::Vector;
use sqlx::Row;

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::{EntitySource, RelationshipSource};

impl GraphStore {
    /// Idempotent by `public_id` (§4.3). `sources` reference already-resolved
    /// `(entity_id, text_unit_id)` pairs.
    pub async fn upsert_entity_sources(
        &self,
        sources: &[(String, i64, i64, String, Option<Vec<f32>>)],
    ) -> Result<HashMap<String, i64>> {
        let mut out = HashMap::with_capacity(sources.len());
        let mut tx = self.pool.begin().await?;
        for (public_id, entity_id, text_unit_id, description, embedding) in sources {
            let embedding = embedding.as_ref().map(|v| Vector::from(v.clone()));
            let row = sqlx::query(
                r#"
                INSERT INTO entity_sources (public_id, entity_id, text_unit_id, description, embedding)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (public_id) DO UPDATE
                    SET description = EXCLUDED.description,
                        embedding = COALESCE(EXCLUDED.embedding, entity_sources.embedding)
                RETURNING id
                "#,
            )
            .bind(public_id)
            .bind(entity_id)
            .bind(text_unit_id)
            .bind(description)
            .bind(embedding)
            .fetch_one(&mut *tx)
            .await?;
            out.insert(public_id.clone(), row.get::<i64, _>("id"));
        }
        tx.commit().await?;
        Ok(out)
    }

    pub async fn upsert_relationship_sources(
        &self,
        sources: &[(String, i64, i64, String, Option<Vec<f32>>)],
    ) -> Result<HashMap<String, i64>> {
        let mut out = HashMap::with_capacity(sources.len());
        let mut tx = self.pool.begin().await?;
        for (public_id, relationship_id, text_unit_id, description, embedding) in sources {
            let embedding = embedding.as_ref().map(|v| Vector::from(v.clone()));
            let row = sqlx::query(
                r#"
                INSERT INTO relationship_sources (public_id, relationship_id, text_unit_id, description, embedding)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (public_id) DO UPDATE
                    SET description = EXCLUDED.description,
                        embedding = COALESCE(EXCLUDED.embedding, relationship_sources.embedding)
                RETURNING id
                "#,
            )
            .bind(public_id)
            .bind(relationship_id)
            .bind(text_unit_id)
            .bind(description)
            .bind(embedding)
            .fetch_one(&mut *tx)
            .await?;
            out.insert(public_id.clone(), row.get::<i64, _>("id"));
        }
        tx.commit().await?;
        Ok(out)
    }

    /// Moves every `entity_sources` row from `loser` to `survivor` (§4.5 step 4).
    pub async fn transfer_entity_sources(&self, loser_id: i64, survivor_id: i64) -> Result<()> {
        sqlx::query("UPDATE entity_sources SET entity_id = $2 WHERE entity_id = $1")
            .bind(loser_id)
            .bind(survivor_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Moves every `relationship_sources` row from `loser` to `survivor` (§4.5 step 5).
    pub async fn transfer_relationship_sources(
        &self,
        loser_id: i64,
        survivor_id: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE relationship_sources SET relationship_id = $2 WHERE relationship_id = $1",
        )
        .bind(loser_id)
        .bind(survivor_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cursor over id (C8 `get_entity_sources`): strictly ascending id > cursor.
    pub async fn get_entity_source_descriptions_batch(
        &self,
        entity_id: i64,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<EntitySource>> {
        let rows = sqlx::query(
            "SELECT id, public_id, entity_id, text_unit_id, description
             FROM entity_sources
             WHERE entity_id = $1 AND id > $2
             ORDER BY id ASC
             LIMIT $3",
        )
        .bind(entity_id)
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| EntitySource {
                id: r.get("id"),
                public_id: r.get("public_id"),
                entity_id: r.get("entity_id"),
                text_unit_id: r.get("text_unit_id"),
                description: r.get("description"),
            })
            .collect())
    }

    pub async fn get_relationship_source_descriptions_batch(
        &self,
        relationship_id: i64,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<RelationshipSource>> {
        let rows = sqlx::query(
            "SELECT id, public_id, relationship_id, text_unit_id, description
             FROM relationship_sources
             WHERE relationship_id = $1 AND id > $2
             ORDER BY id ASC
             LIMIT $3",
        )
        .bind(relationship_id)
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| RelationshipSource {
                id: r.get("id"),
                public_id: r.get("public_id"),
                relationship_id: r.get("relationship_id"),
                text_unit_id: r.get("text_unit_id"),
                description: r.get("description"),
            })
            .collect())
    }

    /// `GetSourceDocumentMetadata` (C8): resolves text unit public ids to
    /// `(file_name, file_key, metadata)` via the owning project file.
    pub async fn get_source_document_metadata(
        &self,
        text_unit_public_ids: &[String],
    ) -> Result<Vec<(String, String, String, Option<serde_json::Value>)>> {
        if text_unit_public_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT tu.public_id AS unit_public_id, pf.name AS file_name,
                   pf.file_key AS file_key, pf.metadata AS metadata
            FROM text_units tu
            JOIN project_files pf ON pf.id = tu.project_file_id
            WHERE tu.public_id = ANY($1)
            "#,
        )
        .bind(text_unit_public_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.get("unit_public_id"),
                    r.get("file_name"),
                    r.get("file_key"),
                    r.get("metadata"),
                )
            })
            .collect())
    }
}
