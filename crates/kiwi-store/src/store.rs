use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::Result;

/// Owns the connection pool and exposes every store operation as a method.
/// Method-per-access-pattern, mirroring the teacher's `MemoryManager`
/// (`Mutex<Connection>` + one method per query) generalised to a pooled
/// async `PgPool` since the store now serves concurrent workers and server
/// requests rather than one single-threaded bot process.
pub struct GraphStore {
    pub(crate) pool: PgPool,
}

impl GraphStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        crate::schema::init_schema(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
