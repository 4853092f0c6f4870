use crate::domain::user::Session;
use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Session-scoped Postgres advisory lock so two schedulers do not run the same
// (date, session) at once.
const LOCK_NAMESPACE: i64 = 0x5049_434B_5749; // "PICKWI"

fn lock_key(date: NaiveDate, session: Session) -> i64 {
    let session_bits = match session {
        Session::Morning => 1,
        Session::Afternoon => 2,
        Session::Evening => 3,
    };
    LOCK_NAMESPACE ^ ((i64::from(date.num_days_from_ce()) << 2) | session_bits)
}

/// Advisory lock pinned to the pooled connection that took it. Advisory locks belong to
/// the database session, so unlock must run on the same connection.
pub struct SessionLock {
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

impl SessionLock {
    /// `None` when another session already holds the lock.
    pub async fn try_acquire(
        pool: &sqlx::PgPool,
        date: NaiveDate,
        session: Session,
    ) -> anyhow::Result<Option<Self>> {
        let key = lock_key(date, session);
        let mut conn = pool
            .acquire()
            .await
            .context("failed to check out a connection for the advisory lock")?;
        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

        if !acquired.0 {
            return Ok(None);
        }
        Ok(Some(Self {
            conn: Some(conn),
            key,
        }))
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let key = self.key;
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let released: (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={key})"))?;
        anyhow::ensure!(
            released.0,
            "advisory lock (key={key}) was not held by this connection"
        );
        Ok(())
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        // An unreleased lock must not go back to the pool; closing the session frees it.
        if let Some(conn) = self.conn.take() {
            tracing::warn!(key = self.key, "session lock dropped without release; closing its connection");
            drop(conn.detach());
        }
    }
}
