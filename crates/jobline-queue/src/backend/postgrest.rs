//! HTTP backend for PostgREST-style gateways (Supabase and similar).
//!
//! The enqueue procedure is reached at `POST {base}/rest/v1/rpc/{function}`
//! and the queue table at `POST {base}/rest/v1/{table}`. Bodies are the
//! submission's JSON parameters; authentication uses the project API key.

use std::time::Duration;

use jobline_core::JobSubmission;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info_span, Instrument};

use super::{
    validate_identifier, BackendResult, BoxFuture, QueueBackend, DEFAULT_QUEUE_TABLE,
    DEFAULT_RPC_FUNCTION,
};
use crate::error::{BackendError, QueueError, Result};

const MAX_ERROR_BODY_SIZE: usize = 1024;

/// Configuration for [`PostgrestBackend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgrestConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`.
    pub base_url: String,
    /// API key sent as `apikey` and as the bearer token.
    pub api_key: String,
    /// Enqueue procedure name.
    pub rpc_function: String,
    /// Queue table name.
    pub queue_table: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for PostgrestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            rpc_function: DEFAULT_RPC_FUNCTION.to_string(),
            queue_table: DEFAULT_QUEUE_TABLE.to_string(),
            timeout: Duration::from_secs(10),
            user_agent: concat!("jobline/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Queue backend speaking the PostgREST HTTP dialect.
#[derive(Debug, Clone)]
pub struct PostgrestBackend {
    client: reqwest::Client,
    config: PostgrestConfig,
    rpc_url: String,
    table_url: String,
}

impl PostgrestBackend {
    /// Creates a backend with its own pooled HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Configuration` if the procedure or table name is
    /// not a plain identifier, the base URL is empty, or the HTTP client
    /// cannot be built.
    pub fn new(config: PostgrestConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/');
        if base_url.is_empty() {
            return Err(QueueError::configuration("base_url must not be empty"));
        }
        for name in [&config.rpc_function, &config.queue_table] {
            validate_identifier(name)?;
            if name.contains('.') {
                return Err(QueueError::configuration(format!(
                    "'{name}' must not be schema-qualified for PostgREST"
                )));
            }
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| QueueError::configuration(format!("failed to build HTTP client: {e}")))?;

        let rpc_url = format!("{base_url}/rest/v1/rpc/{}", config.rpc_function);
        let table_url = format!("{base_url}/rest/v1/{}", config.queue_table);

        Ok(Self { client, config, rpc_url, table_url })
    }

    fn post(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .json(body)
    }

    fn map_request_error(&self, error: &reqwest::Error) -> BackendError {
        if error.is_timeout() {
            BackendError::Timeout { timeout_seconds: whole_seconds_ceil(self.config.timeout) }
        } else if error.is_connect() {
            BackendError::network(format!("connection failed: {error}"))
        } else {
            BackendError::network(error.to_string())
        }
    }
}

impl QueueBackend for PostgrestBackend {
    fn call_enqueue_rpc<'a>(
        &'a self,
        job: &'a JobSubmission,
    ) -> BoxFuture<'a, BackendResult<Option<Value>>> {
        let span = info_span!("postgrest_rpc", function = %self.config.rpc_function);

        Box::pin(
            async move {
                let response = self
                    .post(&self.rpc_url, &job.rpc_params())
                    .send()
                    .await
                    .map_err(|e| self.map_request_error(&e))?;

                let body = read_success_body(response).await?;
                debug!(bytes = body.len(), "RPC responded");

                if body.trim().is_empty() {
                    return Ok(None);
                }
                let value: Value = serde_json::from_str(&body)
                    .map_err(|e| BackendError::invalid_response(e.to_string()))?;
                Ok((!value.is_null()).then_some(value))
            }
            .instrument(span),
        )
    }

    fn insert_queue_row<'a>(&'a self, job: &'a JobSubmission) -> BoxFuture<'a, BackendResult<()>> {
        let span = info_span!("postgrest_insert", table = %self.config.queue_table);

        Box::pin(
            async move {
                let response = self
                    .post(&self.table_url, &job.queue_row())
                    .header("Prefer", "return=minimal")
                    .send()
                    .await
                    .map_err(|e| self.map_request_error(&e))?;

                read_success_body(response).await?;
                debug!("Queue row inserted");
                Ok(())
            }
            .instrument(span),
        )
    }
}

/// Returns the body of a 2xx response, or maps the status to an error.
async fn read_success_body(response: Response) -> BackendResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BackendError::network(format!("failed to read response body: {e}")))?;

    if status.is_success() {
        return Ok(body);
    }
    Err(BackendError::Http { status: status.as_u16(), body: truncate_body(body, status) })
}

/// Rounds up, so sub-second timeouts never report as zero.
fn whole_seconds_ceil(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn truncate_body(body: String, status: StatusCode) -> String {
    if body.len() <= MAX_ERROR_BODY_SIZE {
        return if body.is_empty() {
            status.canonical_reason().unwrap_or_default().to_string()
        } else {
            body
        };
    }

    let mut end = MAX_ERROR_BODY_SIZE;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_built_from_config() {
        let backend = PostgrestBackend::new(PostgrestConfig {
            base_url: "https://project.supabase.co/".to_string(),
            ..PostgrestConfig::default()
        })
        .unwrap();

        assert_eq!(backend.rpc_url, "https://project.supabase.co/rest/v1/rpc/enqueue_job");
        assert_eq!(backend.table_url, "https://project.supabase.co/rest/v1/job_queue");
    }

    #[test]
    fn rejects_unsafe_names() {
        let config =
            PostgrestConfig { rpc_function: "enqueue/../admin".to_string(), ..Default::default() };
        assert!(PostgrestBackend::new(config).is_err());

        let config =
            PostgrestConfig { queue_table: "graphile.jobs".to_string(), ..Default::default() };
        assert!(PostgrestBackend::new(config).is_err());

        let config = PostgrestConfig { base_url: "/".to_string(), ..Default::default() };
        assert!(PostgrestBackend::new(config).is_err());
    }

    #[test]
    fn long_error_bodies_truncated() {
        let body = "é".repeat(MAX_ERROR_BODY_SIZE);
        let truncated = truncate_body(body, StatusCode::BAD_REQUEST);

        assert!(truncated.ends_with("... (truncated)"));
        assert!(truncated.len() <= MAX_ERROR_BODY_SIZE + "... (truncated)".len());
    }

    #[test]
    fn timeout_seconds_round_up() {
        assert_eq!(whole_seconds_ceil(Duration::from_millis(250)), 1);
        assert_eq!(whole_seconds_ceil(Duration::from_secs(10)), 10);
        assert_eq!(whole_seconds_ceil(Duration::from_millis(10_001)), 11);
        assert_eq!(whole_seconds_ceil(Duration::ZERO), 0);
    }

    #[test]
    fn empty_error_body_uses_reason_phrase() {
        assert_eq!(truncate_body(String::new(), StatusCode::BAD_GATEWAY), "Bad Gateway");
    }
}
