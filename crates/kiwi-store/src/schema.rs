use sqlx::PgPool;

use crate::error::Result;

/// Creates every table/index/extension the store needs. Idempotent — safe to
/// call on every worker/server boot, mirroring the teacher's `init_db`.
/// A real deployment drives this through the (out-of-scope) migration
/// tooling instead; kept here so `kiwi-store`'s own tests can stand up a
/// throwaway schema against a test database.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(
        r#"
        CREATE EXTENSION IF NOT EXISTS vector;
        CREATE EXTENSION IF NOT EXISTS pg_trgm;

        CREATE TABLE IF NOT EXISTS projects (
            id          BIGSERIAL PRIMARY KEY,
            public_id   TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            state       TEXT NOT NULL DEFAULT 'ready',
            project_type TEXT,
            hidden      BOOLEAN NOT NULL DEFAULT FALSE,
            group_id    BIGINT,
            user_id     BIGINT,
            graph_id    BIGINT REFERENCES projects(id),
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            CONSTRAINT one_owner CHECK (
                (CASE WHEN group_id IS NOT NULL THEN 1 ELSE 0 END) +
                (CASE WHEN user_id IS NOT NULL THEN 1 ELSE 0 END) +
                (CASE WHEN graph_id IS NOT NULL THEN 1 ELSE 0 END) <= 1
            )
        );

        CREATE TABLE IF NOT EXISTS project_files (
            id          BIGSERIAL PRIMARY KEY,
            public_id   TEXT NOT NULL UNIQUE,
            project_id  BIGINT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name        TEXT NOT NULL,
            file_key    TEXT NOT NULL,
            deleted     BOOLEAN NOT NULL DEFAULT FALSE,
            token_count BIGINT NOT NULL DEFAULT 0,
            metadata    JSONB,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_project_files_project ON project_files(project_id);

        CREATE TABLE IF NOT EXISTS text_units (
            id              BIGSERIAL PRIMARY KEY,
            public_id       TEXT NOT NULL UNIQUE,
            project_file_id BIGINT NOT NULL REFERENCES project_files(id) ON DELETE CASCADE,
            text            TEXT NOT NULL,
            token_count     BIGINT NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_text_units_file ON text_units(project_file_id);

        CREATE TABLE IF NOT EXISTS entities (
            id          BIGSERIAL PRIMARY KEY,
            public_id   TEXT NOT NULL UNIQUE,
            project_id  BIGINT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            entity_type TEXT NOT NULL,
            embedding   vector,
            search_vec  tsvector GENERATED ALWAYS AS (
                setweight(to_tsvector('simple', coalesce(name, '')), 'A') ||
                setweight(to_tsvector('simple', coalesce(description, '')), 'B')
            ) STORED
        );
        CREATE INDEX IF NOT EXISTS idx_entities_project ON entities(project_id);
        CREATE INDEX IF NOT EXISTS idx_entities_name_trgm ON entities USING gin (name gin_trgm_ops);
        CREATE INDEX IF NOT EXISTS idx_entities_search ON entities USING gin (search_vec);

        CREATE TABLE IF NOT EXISTS relationships (
            id          BIGSERIAL PRIMARY KEY,
            public_id   TEXT NOT NULL UNIQUE,
            project_id  BIGINT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            source_id   BIGINT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            target_id   BIGINT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            rank        REAL NOT NULL DEFAULT 0,
            description TEXT NOT NULL DEFAULT '',
            embedding   vector
        );
        CREATE INDEX IF NOT EXISTS idx_relationships_project ON relationships(project_id);
        CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id);
        CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id);

        CREATE TABLE IF NOT EXISTS entity_sources (
            id            BIGSERIAL PRIMARY KEY,
            public_id     TEXT NOT NULL UNIQUE,
            entity_id     BIGINT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            text_unit_id  BIGINT NOT NULL REFERENCES text_units(id) ON DELETE CASCADE,
            description   TEXT NOT NULL DEFAULT '',
            embedding     vector
        );
        CREATE INDEX IF NOT EXISTS idx_entity_sources_entity ON entity_sources(entity_id);

        CREATE TABLE IF NOT EXISTS relationship_sources (
            id               BIGSERIAL PRIMARY KEY,
            public_id        TEXT NOT NULL UNIQUE,
            relationship_id  BIGINT NOT NULL REFERENCES relationships(id) ON DELETE CASCADE,
            text_unit_id     BIGINT NOT NULL REFERENCES text_units(id) ON DELETE CASCADE,
            description      TEXT NOT NULL DEFAULT '',
            embedding        vector
        );
        CREATE INDEX IF NOT EXISTS idx_relationship_sources_rel ON relationship_sources(relationship_id);

        CREATE TABLE IF NOT EXISTS batch_status (
            correlation_id      TEXT NOT NULL,
            batch_id            INT NOT NULL,
            total_batches       INT NOT NULL,
            project_id          BIGINT NOT NULL,
            file_ids            BIGINT[] NOT NULL DEFAULT '{}',
            operation           TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'pending',
            estimated_duration_ms BIGINT,
            error_message       TEXT,
            started_at          TIMESTAMPTZ,
            updated_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (correlation_id, batch_id)
        );
        CREATE INDEX IF NOT EXISTS idx_batch_status_state ON batch_status(status, started_at);

        CREATE TABLE IF NOT EXISTS description_job_status (
            correlation_id  TEXT NOT NULL,
            job_id          INT NOT NULL,
            entity_ids      BIGINT[] NOT NULL DEFAULT '{}',
            relationship_ids BIGINT[] NOT NULL DEFAULT '{}',
            status          TEXT NOT NULL DEFAULT 'pending',
            PRIMARY KEY (correlation_id, job_id)
        );

        CREATE TABLE IF NOT EXISTS extraction_staging (
            id              BIGSERIAL PRIMARY KEY,
            correlation_id  TEXT NOT NULL,
            batch_id        INT NOT NULL,
            project_id      BIGINT NOT NULL,
            data_type       TEXT NOT NULL,
            payload         JSONB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_staging_batch
            ON extraction_staging(correlation_id, batch_id, data_type);

        CREATE TABLE IF NOT EXISTS stats (
            id          BIGSERIAL PRIMARY KEY,
            stat_type   TEXT NOT NULL,
            amount      DOUBLE PRECISION NOT NULL,
            duration_ms BIGINT NOT NULL,
            recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_stats_type ON stats(stat_type);
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
