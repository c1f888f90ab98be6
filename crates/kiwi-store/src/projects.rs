use sqlx::Row;

use crate::error::{Result, StoreError};
use crate::store::GraphStore;
use crate::types::Project;
use kiwi_core::ids::new_public_id;

impl GraphStore {
    pub async fn create_project(
        &self,
        name: &str,
        description: &str,
        project_type: Option<&str>,
        group_id: Option<i64>,
        user_id: Option<i64>,
        graph_id: Option<i64>,
    ) -> Result<Project> {
        let owners = [group_id.is_some(), user_id.is_some(), graph_id.is_some()]
            .into_iter()
            .filter(|b| *b)
            .count();
        if owners > 1 {
            return Err(StoreError::Validation(
                "project may have at most one of {group, user, graph} as owner".into(),
            ));
        }
        let public_id = new_public_id();
        let row = sqlx::query(
            r#"
            INSERT INTO projects (public_id, name, description, state, project_type, group_id, user_id, graph_id)
            VALUES ($1, $2, $3, 'create', $4, $5, $6, $7)
            RETURNING id, public_id, name, description, state, project_type, hidden, group_id, user_id, graph_id
            "#,
        )
        .bind(&public_id)
        .bind(name)
        .bind(description)
        .bind(project_type)
        .bind(group_id)
        .bind(user_id)
        .bind(graph_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_project(row))
    }

    pub async fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, public_id, name, description, state, project_type, hidden, group_id, user_id, graph_id
             FROM projects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_project))
    }

    pub async fn get_project_by_public_id(&self, public_id: &str) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, public_id, name, description, state, project_type, hidden, group_id, user_id, graph_id
             FROM projects WHERE public_id = $1",
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_project))
    }

    /// Transitions `state` (§3, §4.5: `create`/`update` while a merge/delete
    /// holds the project's advisory lock, restored to `ready` on every exit).
    pub async fn set_project_state(&self, id: i64, state: &str) -> Result<()> {
        sqlx::query("UPDATE projects SET state = $2 WHERE id = $1")
            .bind(id)
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes the graph content (files, text units, entities, relationships,
    /// sources cascade via FK) but keeps the project row itself, used by the
    /// merge engine's project-graph-delete operation (§4.5).
    pub async fn delete_project_graph(&self, project_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM relationships WHERE project_id = $1")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM entities WHERE project_id = $1")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM text_units WHERE project_file_id IN
                (SELECT id FROM project_files WHERE project_id = $1)",
        )
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM project_files WHERE project_id = $1")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Hard-deletes a project and everything it owns; conversations
    /// reference but do not own a project, and are deleted too (§3).
    pub async fn delete_project(&self, project_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_file_deleted(&self, file_id: i64) -> Result<()> {
        sqlx::query("UPDATE project_files SET deleted = TRUE WHERE id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_deleted_files(&self, project_id: i64) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query(
            "SELECT id, file_key FROM project_files WHERE project_id = $1 AND deleted = TRUE",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| (r.get("id"), r.get("file_key"))).collect())
    }

    pub async fn purge_deleted_file(&self, file_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM project_files WHERE id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `GetAvailableExpertProjects` (§9 design note). Four disjoint OR
    /// branches: same group, fully public (no owner at all and not hidden),
    /// owned by caller, parented to the current project via `graph_id`.
    /// `hidden` is returned unfiltered — the decision in §9 defers the
    /// visibility-vs-hidden interaction to the (out-of-scope) HTTP layer.
    pub async fn find_available_expert_projects(
        &self,
        caller_user_id: i64,
        caller_group_id: Option<i64>,
        current_project_id: i64,
    ) -> Result<Vec<Project>> {
        let rows = sqlx::query(
            r#"
            SELECT id, public_id, name, description, state, project_type, hidden, group_id, user_id, graph_id
            FROM projects
            WHERE project_type = 'expert'
              AND (
                   ($2::bigint IS NOT NULL AND group_id = $2)
                OR (group_id IS NULL AND user_id IS NULL AND graph_id IS NULL)
                OR (user_id = $1)
                OR (graph_id = $3)
              )
            ORDER BY id ASC
            "#,
        )
        .bind(caller_user_id)
        .bind(caller_group_id)
        .bind(current_project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_project).collect())
    }
}

fn row_to_project(row: sqlx::postgres::PgRow) -> Project {
    Project {
        id: row.get("id"),
        public_id: row.get("public_id"),
        name: row.get("name"),
        description: row.get("description"),
        state: row.get("state"),
        project_type: row.get("project_type"),
        hidden: row.get("hidden"),
        group_id: row.get("group_id"),
        user_id: row.get("user_id"),
        graph_id: row.get("graph_id"),
    }
}
