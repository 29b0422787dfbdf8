//! Direct PostgreSQL backend.
//!
//! Calls the enqueue function with named arguments matching the RPC
//! parameter names, and inserts into the queue table with the same columns
//! the HTTP gateway would write.

use std::time::Duration;

use jobline_core::JobSubmission;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use tracing::{debug, info_span, Instrument};

use super::{
    validate_identifier, BackendResult, BoxFuture, QueueBackend, DEFAULT_QUEUE_TABLE,
    DEFAULT_RPC_FUNCTION,
};
use crate::error::{BackendError, Result};

/// Configuration for [`PgBackend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PgBackendConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Connection acquire timeout.
    pub acquire_timeout: Duration,
    /// Enqueue function, optionally schema-qualified.
    pub rpc_function: String,
    /// Queue table, optionally schema-qualified.
    pub queue_table: String,
}

impl Default for PgBackendConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/postgres".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            rpc_function: DEFAULT_RPC_FUNCTION.to_string(),
            queue_table: DEFAULT_QUEUE_TABLE.to_string(),
        }
    }
}

/// Queue backend using a pooled PostgreSQL connection.
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: PgPool,
    rpc_sql: String,
    insert_sql: String,
}

impl PgBackend {
    /// Connects a pool using `config`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Configuration` for invalid names and
    /// `QueueError::Backend` if the pool cannot connect.
    pub async fn connect(config: &PgBackendConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(BackendError::from)?;

        Self::from_pool(pool, &config.rpc_function, &config.queue_table)
    }

    /// Wraps an existing pool.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Configuration` if either name is not a valid
    /// SQL identifier.
    pub fn from_pool(pool: PgPool, rpc_function: &str, queue_table: &str) -> Result<Self> {
        validate_identifier(rpc_function)?;
        validate_identifier(queue_table)?;

        Ok(Self {
            pool,
            rpc_sql: rpc_statement(rpc_function),
            insert_sql: insert_statement(queue_table),
        })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn rpc_statement(function: &str) -> String {
    format!(
        "SELECT to_jsonb({function}(task_identifier => $1, payload => $2, run_at => $3, \
         max_attempts => $4))"
    )
}

fn insert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {table} (task_identifier, payload, run_at) VALUES ($1, $2, COALESCE($3, \
         NOW()))"
    )
}

fn max_attempts_param(job: &JobSubmission) -> Option<i32> {
    job.max_attempts.map(|n| i32::try_from(n).unwrap_or(i32::MAX))
}

impl QueueBackend for PgBackend {
    fn call_enqueue_rpc<'a>(
        &'a self,
        job: &'a JobSubmission,
    ) -> BoxFuture<'a, BackendResult<Option<Value>>> {
        let span = info_span!("pg_rpc", task = %job.task_identifier);

        Box::pin(
            async move {
                let value: Option<Value> = sqlx::query_scalar(&self.rpc_sql)
                    .bind(job.task_identifier.as_str())
                    .bind(Json(&job.payload))
                    .bind(job.run_at)
                    .bind(max_attempts_param(job))
                    .fetch_one(&self.pool)
                    .await?;

                debug!(has_value = value.is_some(), "Enqueue function returned");
                Ok(value.filter(|v| !v.is_null()))
            }
            .instrument(span),
        )
    }

    fn insert_queue_row<'a>(&'a self, job: &'a JobSubmission) -> BoxFuture<'a, BackendResult<()>> {
        let span = info_span!("pg_insert", task = %job.task_identifier);

        Box::pin(
            async move {
                let result = sqlx::query(&self.insert_sql)
                    .bind(job.task_identifier.as_str())
                    .bind(Json(&job.payload))
                    .bind(job.run_at)
                    .execute(&self.pool)
                    .await?;

                debug!(rows = result.rows_affected(), "Queue row inserted");
                Ok(())
            }
            .instrument(span),
        )
    }
}
