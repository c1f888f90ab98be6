use std::collections::HashMap;

use sqlx::Row;

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::{TextUnit, TextUnitInput};

impl GraphStore {
    /// Idempotent by `public_id` (§4.3). Returns `public_id -> db id`.
    pub async fn upsert_text_units(
        &self,
        project_file_id: i64,
        units: &[TextUnitInput],
    ) -> Result<HashMap<String, i64>> {
        let mut out = HashMap::with_capacity(units.len());
        let mut tx = self.pool.begin().await?;
        for unit in units {
            let row = sqlx::query(
                r#"
                INSERT INTO text_units (public_id, project_file_id, text, token_count)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (public_id) DO UPDATE
                    SET text = EXCLUDED.text, token_count = EXCLUDED.token_count
                RETURNING id
                "#,
            )
            .bind(&unit.public_id)
            .bind(project_file_id)
            .bind(&unit.text)
            .bind(unit.token_count)
            .fetch_one(&mut *tx)
            .await?;
            out.insert(unit.public_id.clone(), row.get::<i64, _>("id"));
        }
        tx.commit().await?;
        Ok(out)
    }

    pub async fn get_text_unit_id_by_public_id(&self, public_id: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id FROM text_units WHERE public_id = $1")
            .bind(public_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Full-row lookup by db id, used to resolve citation tokens back to
    /// source text during chat context assembly.
    pub async fn get_text_unit(&self, id: i64) -> Result<Option<TextUnit>> {
        let row = sqlx::query(
            "SELECT id, public_id, project_file_id, text, token_count FROM text_units WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_text_unit(&r)))
    }

    /// Full-row lookup by `public_id`, the form citation tokens carry.
    pub async fn get_text_unit_by_public_id(&self, public_id: &str) -> Result<Option<TextUnit>> {
        let row = sqlx::query(
            "SELECT id, public_id, project_file_id, text, token_count FROM text_units WHERE public_id = $1",
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_text_unit(&r)))
    }
}

fn row_to_text_unit(row: &sqlx::postgres::PgRow) -> TextUnit {
    TextUnit {
        id: row.get("id"),
        public_id: row.get("public_id"),
        project_file_id: row.get("project_file_id"),
        text: row.get("text"),
        token_count: row.get("token_count"),
    }
}
