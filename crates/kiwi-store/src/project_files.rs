use sqlx::Row;

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::ProjectFile;

impl GraphStore {
    pub async fn create_project_file(
        &self,
        project_id: i64,
        name: &str,
        file_key: &str,
    ) -> Result<ProjectFile> {
        let public_id = kiwi_core::ids::new_public_id();
        let row = sqlx::query(
            r#"
            INSERT INTO project_files (public_id, project_id, name, file_key)
            VALUES ($1, $2, $3, $4)
            RETURNING id, public_id, project_id, name, file_key, deleted, token_count, metadata
            "#,
        )
        .bind(&public_id)
        .bind(project_id)
        .bind(name)
        .bind(file_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_file(row))
    }

    pub async fn get_project_file(&self, id: i64) -> Result<Option<ProjectFile>> {
        let row = sqlx::query(
            "SELECT id, public_id, project_id, name, file_key, deleted, token_count, metadata
             FROM project_files WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_file))
    }

    /// Populated by the preprocess phase (§4.6): token count and structured
    /// metadata pulled from C2's metadata-extraction pass.
    pub async fn set_project_file_preprocessed(
        &self,
        id: i64,
        token_count: i64,
        metadata: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE project_files SET token_count = $2, metadata = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(token_count)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_file(row: sqlx::postgres::PgRow) -> ProjectFile {
    ProjectFile {
        id: row.get("id"),
        public_id: row.get("public_id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        file_key: row.get("file_key"),
        deleted: row.get("deleted"),
        token_count: row.get("token_count"),
        metadata: row.get("metadata"),
    }
}
