use sqlx::pool::PoolConnection;
use sqlx::{Postgres, Row};

use crate::error::Result;
use crate::store::GraphStore;

/// Reserved advisory-lock key for the stale-batch recovery leader election
/// (§3, §4.6). Chosen far from any plausible `project_id` value.
pub const RECOVERY_LEADER_LOCK_KEY: i64 = -1;

/// An advisory lock held by a dedicated connection. Dropping it runs a
/// best-effort `pg_advisory_unlock` on a fresh connection from the pool —
/// callers that need a guaranteed release should call `release` directly
/// instead of relying on `Drop`, since the unlock itself is async.
pub struct AdvisoryLockGuard {
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

impl AdvisoryLockGuard {
    pub fn key(&self) -> i64 {
        self.key
    }

    /// Releases the lock, consuming the guard. Mandatory per §4.3's
    /// "`Release(key)` mandatory" contract — callers must invoke this on
    /// every exit path (success or failure) rather than rely on drop order.
    pub async fn release(mut self) -> Result<()> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(self.key)
                .fetch_one(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

impl GraphStore {
    /// Blocks until the per-project lock is held (§4.3, §4.5, §4.6).
    pub async fn acquire_project_lock(&self, project_id: i64) -> Result<AdvisoryLockGuard> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(project_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(AdvisoryLockGuard {
            conn: Some(conn),
            key: project_id,
        })
    }

    /// Non-blocking; used for the stale-batch recovery leader election (§4.6).
    pub async fn try_acquire_lock(&self, key: i64) -> Result<Option<AdvisoryLockGuard>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("SELECT pg_try_advisory_lock($1) AS acquired")
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;
        let acquired: bool = row.get("acquired");
        if acquired {
            Ok(Some(AdvisoryLockGuard {
                conn: Some(conn),
                key,
            }))
        } else {
            Ok(None)
        }
    }
}
