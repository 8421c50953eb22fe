//! PostgreSQL message store.
//!
//! The claim runs as one transaction: lock the candidate rows with
//! `SELECT ... FOR UPDATE`, lease them with a single `UPDATE ... RETURNING`,
//! then commit. A concurrent claimer selecting overlapping rows blocks on the
//! row locks until the first transaction commits and then re-evaluates the
//! visibility predicate against the committed lease, so it never receives a
//! row that was just leased.

use crate::{
    store::{ClaimRequest, MessageStore},
    Message, MessageId, MessageRecord, QueueError, QueueName, QueueResult, Uuid,
};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const MESSAGE_COLUMNS: &str = "id, queue_name, payload, published_at, reserved_at, \
     reserved_by, reserved_count, reserved_info, reserve_expires";

/// SQLSTATE `numeric_value_out_of_range`
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// Connection pool settings for [`PostgresMessageStore::connect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresStoreOptions {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    /// Server-side limit applied to every statement on pooled connections
    pub statement_timeout: Duration,
}

impl PostgresStoreOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 25,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(300),
            statement_timeout: Duration::from_secs(30),
        }
    }
}

/// Message store backed by a PostgreSQL table
#[derive(Debug, Clone)]
pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool with the given settings
    pub async fn connect(options: &PostgresStoreOptions) -> QueueResult<Self> {
        let connect_options = PgConnectOptions::from_str(&options.url)
            .map_err(|e| QueueError::storage(format!("invalid database url: {}", e)))?
            .application_name("lean-queue")
            .options([(
                "statement_timeout",
                format!("{}", options.statement_timeout.as_millis()),
            )]);

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .min_connections(options.min_connections)
            .acquire_timeout(options.acquire_timeout)
            .idle_timeout(options.idle_timeout)
            .max_lifetime(options.max_lifetime)
            .connect_with(connect_options)
            .await
            .map_err(map_sqlx_error)?;

        info!(
            max_connections = options.max_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> QueueResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| QueueError::storage(format!("migration failed: {}", e)))?;

        info!("Database migrations applied");
        Ok(())
    }

    /// Underlying pool, for maintenance queries outside the store contract
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn insert(&self, message: &Message) -> QueueResult<()> {
        let record = message.to_record();

        sqlx::query(
            r#"
            INSERT INTO queue_messages (
                id, queue_name, payload, published_at, reserved_at,
                reserved_by, reserved_count, reserved_info, reserve_expires
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.queue_name)
        .bind(&record.payload)
        .bind(record.published_at)
        .bind(record.reserved_at)
        .bind(&record.reserved_by)
        .bind(record.reserved_count)
        .bind(&record.reserved_info)
        .bind(record.reserve_expires)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn claim_batch(&self, request: &ClaimRequest) -> QueueResult<Vec<Message>> {
        let grant = &request.grant;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM queue_messages
            WHERE queue_name = $1
              AND (reserve_expires IS NULL OR reserve_expires < $2)
            ORDER BY published_at ASC, seq ASC
            LIMIT $3
            FOR UPDATE
            "#,
        )
        .bind(request.queue_name.as_str())
        .bind(grant.granted_at.as_datetime())
        .bind(i64::from(request.limit))
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if ids.is_empty() {
            tx.commit().await.map_err(map_sqlx_error)?;
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            UPDATE queue_messages
            SET reserved_at = $1,
                reserved_by = $2,
                reserved_info = $3,
                reserve_expires = $4,
                reserved_count = reserved_count + 1
            WHERE id = ANY($5)
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let records: Vec<MessageRecord> = sqlx::query_as(&sql)
            .bind(grant.granted_at.as_datetime())
            .bind(grant.consumer.as_str())
            .bind(grant.info.as_deref())
            .bind(grant.expires_at.as_datetime())
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        // Any error from here on drops `tx`, which rolls the lease back.
        let mut messages = records
            .into_iter()
            .map(Message::restore)
            .collect::<QueueResult<Vec<_>>>()?;

        if messages.len() != ids.len() {
            warn!(
                selected = ids.len(),
                updated = messages.len(),
                "Locked rows and leased rows differ"
            );
            return Err(QueueError::storage("claim updated an unexpected row count"));
        }

        // RETURNING order is unspecified; restore the selection order.
        let position: HashMap<Uuid, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        messages.sort_by_key(|m| position.get(&m.id().as_uuid()).copied());

        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(
            queue_name = %request.queue_name,
            claimed = messages.len(),
            "PostgreSQL claim committed"
        );

        Ok(messages)
    }

    async fn list_pending(&self, queue_name: &QueueName, limit: u32) -> QueueResult<Vec<Message>> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM queue_messages
            WHERE queue_name = $1
            ORDER BY published_at ASC, seq ASC
            LIMIT $2
            "#
        );

        let records: Vec<MessageRecord> = sqlx::query_as(&sql)
            .bind(queue_name.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        records.into_iter().map(Message::restore).collect()
    }

    async fn get(&self, id: &MessageId) -> QueueResult<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM queue_messages WHERE id = $1");

        let record: Option<MessageRecord> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        record.map(Message::restore).transpose()
    }

    async fn delete(&self, id: &MessageId) -> QueueResult<bool> {
        let result = sqlx::query("DELETE FROM queue_messages WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> QueueResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

/// Translate driver errors into the queue taxonomy
fn map_sqlx_error(err: sqlx::Error) -> QueueError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            QueueError::CorruptRecord {
                message: err.to_string(),
            }
        }
        // Only `reserved_count + 1` can overflow; the count is exhausted.
        sqlx::Error::Database(db)
            if db.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE) =>
        {
            QueueError::CorruptRecord {
                message: format!("reserved_count exhausted: {}", db.message()),
            }
        }
        other => QueueError::storage(other),
    }
}
