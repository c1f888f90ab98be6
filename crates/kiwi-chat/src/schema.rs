use sqlx::PgPool;

use crate::error::Result;

/// Creates the `conversations`/`messages` tables, mirroring `kiwi-store`'s
/// `schema::init_schema` DDL-block style. Idempotent, safe to call on every
/// server boot.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id          BIGSERIAL PRIMARY KEY,
            public_id   TEXT NOT NULL UNIQUE,
            project_id  BIGINT NOT NULL,
            title       TEXT NOT NULL DEFAULT '',
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_project ON conversations(project_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              BIGSERIAL PRIMARY KEY,
            conversation_id BIGINT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL DEFAULT '',
            tool_call_id    TEXT,
            tool_name       TEXT,
            tool_arguments  JSONB,
            tool_execution  TEXT NOT NULL DEFAULT '',
            reasoning       TEXT,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, id);
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
