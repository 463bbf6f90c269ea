use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Record, Result, StoreError, Version,
    store::{Store, Transaction},
};

/// SQLSTATE raised when `lock_timeout` elapses.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// SQLSTATE raised by the primary key on concurrent inserts.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed store.
///
/// All entities live in one `records` table keyed by `(kind, id)` with a
/// JSONB payload; row locks are plain `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: Duration::from_secs(5),
        }
    }

    /// Sets how long a transaction waits for a row lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters.
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(PostgresTransaction { tx })
    }
}

/// A unit of work backed by a PostgreSQL transaction.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    fn row_to_record(row: PgRow) -> Result<Record> {
        Ok(Record {
            kind: row.try_get("kind")?,
            id: row.try_get::<Uuid, _>("id")?,
            version: Version::new(row.try_get("version")?),
            data: row.try_get("data")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn current_version(&mut self, kind: &str, id: Uuid) -> Result<Version> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM records WHERE kind = $1 AND id = $2")
                .bind(kind)
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(version.map(Version::new).unwrap_or(Version::initial()))
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn get(&mut self, kind: &str, id: Uuid) -> Result<Option<Record>> {
        let row = sqlx::query(
            r#"
            SELECT kind, id, version, data, updated_at
            FROM records
            WHERE kind = $1 AND id = $2
            "#,
        )
        .bind(kind)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn get_for_update(&mut self, kind: &str, id: Uuid) -> Result<Option<Record>> {
        let row = sqlx::query(
            r#"
            SELECT kind, id, version, data, updated_at
            FROM records
            WHERE kind = $1 AND id = $2
            FOR UPDATE
            "#,
        )
        .bind(kind)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE)
            {
                return StoreError::LockTimeout {
                    kind: kind.to_string(),
                    id,
                };
            }
            StoreError::Database(e)
        })?;

        row.map(Self::row_to_record).transpose()
    }

    async fn find_by(
        &mut self,
        kind: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            r#"
            SELECT kind, id, version, data, updated_at
            FROM records
            WHERE kind = $1 AND data -> $2 = $3
            ORDER BY id ASC
            "#,
        )
        .bind(kind)
        .bind(field)
        .bind(value)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn put(&mut self, record: Record) -> Result<Version> {
        let expected = record.version;
        let now = Utc::now();

        if expected.is_initial() {
            sqlx::query(
                r#"
                INSERT INTO records (kind, id, version, data, updated_at)
                VALUES ($1, $2, 1, $3, $4)
                "#,
            )
            .bind(&record.kind)
            .bind(record.id)
            .bind(&record.data)
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                {
                    return StoreError::ConcurrencyConflict {
                        kind: record.kind.clone(),
                        id: record.id,
                        expected,
                        actual: Version::first(),
                    };
                }
                StoreError::Database(e)
            })?;

            return Ok(Version::first());
        }

        let result = sqlx::query(
            r#"
            UPDATE records
            SET version = version + 1, data = $3, updated_at = $4
            WHERE kind = $1 AND id = $2 AND version = $5
            "#,
        )
        .bind(&record.kind)
        .bind(record.id)
        .bind(&record.data)
        .bind(now)
        .bind(expected.as_i64())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            let actual = self.current_version(&record.kind, record.id).await?;
            return Err(StoreError::ConcurrencyConflict {
                kind: record.kind,
                id: record.id,
                expected,
                actual,
            });
        }

        Ok(expected.next())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
