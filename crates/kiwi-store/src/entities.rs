use std::collections::HashMap;

use pgvector::Vector;
use sqlx::Row;

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::{Entity, EntityInput};

impl GraphStore {
    /// Idempotent by `public_id` (§4.3). Returns `public_id -> db id`.
    pub async fn upsert_entities(
        &self,
        project_id: i64,
        entities: &[EntityInput],
    ) -> Result<HashMap<String, i64>> {
        let mut out = HashMap::with_capacity(entities.len());
        let mut tx = self.pool.begin().await?;
        for e in entities {
            let embedding = e.embedding.as_ref().map(|v| Vector::from(v.clone()));
            let row = sqlx::query(
                r#"
                INSERT INTO entities (public_id, project_id, name, description, entity_type, embedding)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (public_id) DO UPDATE
                    SET name = EXCLUDED.name,
                        description = EXCLUDED.description,
                        entity_type = EXCLUDED.entity_type,
                        embedding = COALESCE(EXCLUDED.embedding, entities.embedding)
                RETURNING id
                "#,
            )
            .bind(&e.public_id)
            .bind(project_id)
            .bind(&e.name)
            .bind(&e.description)
            .bind(&e.entity_type)
            .bind(embedding)
            .fetch_one(&mut *tx)
            .await?;
            out.insert(e.public_id.clone(), row.get::<i64, _>("id"));
        }
        tx.commit().await?;
        Ok(out)
    }

    pub async fn get_entity(&self, id: i64) -> Result<Option<Entity>> {
        let row = sqlx::query(
            "SELECT id, public_id, project_id, name, description, entity_type
             FROM entities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_entity))
    }

    /// Used by C8 tools, which the model addresses by `public_id` rather
    /// than the internal numeric id.
    pub async fn get_entity_by_public_id(&self, project_id: i64, public_id: &str) -> Result<Option<Entity>> {
        let row = sqlx::query(
            "SELECT id, public_id, project_id, name, description, entity_type
             FROM entities WHERE project_id = $1 AND public_id = $2",
        )
        .bind(project_id)
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_entity))
    }

    /// Top-K by ascending cosine distance, filtered to `<= max_distance` (§4.3).
    pub async fn find_similar_entities(
        &self,
        project_id: i64,
        embedding: &[f32],
        k: i64,
        max_distance: f64,
    ) -> Result<Vec<(Entity, f64)>> {
        let vec = Vector::from(embedding.to_vec());
        let rows = sqlx::query(
            r#"
            SELECT id, public_id, project_id, name, description, entity_type,
                   (embedding <=> $2) AS distance
            FROM entities
            WHERE project_id = $1 AND embedding IS NOT NULL AND (embedding <=> $2) <= $3
            ORDER BY distance ASC, id ASC
            LIMIT $4
            "#,
        )
        .bind(project_id)
        .bind(vec)
        .bind(max_distance)
        .bind(k)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let d: f64 = r.get("distance");
                (row_to_entity(r), d)
            })
            .collect())
    }

    /// `[{type, count}]` descending by count (C8 `get_entity_types`).
    pub async fn get_entity_types(&self, project_id: i64) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT entity_type, COUNT(*) AS cnt FROM entities
             WHERE project_id = $1 GROUP BY entity_type ORDER BY cnt DESC, entity_type ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("entity_type"), r.get("cnt")))
            .collect())
    }

    /// Trigram similarity > 0.5, restricted to same `(project, type)`,
    /// excluding `FACT`/`FILE` (§4.3, §4.5 step 4). Returns groups of
    /// colliding entity ids (each group's survivor is the caller's job).
    pub async fn find_entities_with_similar_names_for_entity_ids(
        &self,
        project_id: i64,
        entity_ids: &[i64],
    ) -> Result<Vec<(i64, i64)>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT a.id AS a_id, b.id AS b_id
            FROM entities a
            JOIN entities b
                ON a.project_id = b.project_id
               AND a.entity_type = b.entity_type
               AND a.id < b.id
               AND similarity(a.name, b.name) > 0.5
            WHERE a.project_id = $1
              AND a.entity_type NOT IN ('FACT', 'FILE')
              AND (a.id = ANY($2) OR b.id = ANY($2))
            "#,
        )
        .bind(project_id)
        .bind(entity_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("a_id"), r.get("b_id")))
            .collect())
    }

    /// Repoints `relationships.source_id`/`target_id` from `loser` to `survivor`.
    pub async fn rewrite_relationship_endpoints(
        &self,
        loser_id: i64,
        survivor_id: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE relationships SET source_id = $2 WHERE source_id = $1")
            .bind(loser_id)
            .bind(survivor_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("UPDATE relationships SET target_id = $2 WHERE target_id = $1")
            .bind(loser_id)
            .bind(survivor_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_entity(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM entities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `DeleteEntitiesWithoutSources` (§4.5 step 7). Returns deleted ids.
    pub async fn delete_entities_without_sources(&self, project_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            DELETE FROM entities
            WHERE project_id = $1
              AND id NOT IN (SELECT DISTINCT entity_id FROM entity_sources)
            RETURNING id
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }
}

fn row_to_entity(row: sqlx::postgres::PgRow) -> Entity {
    Entity {
        id: row.get("id"),
        public_id: row.get("public_id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        description: row.get("description"),
        entity_type: row.get("entity_type"),
    }
}
