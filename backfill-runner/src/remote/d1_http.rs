//! Cloudflare D1 REST executor.
//!
//! Posts the batch script to `/accounts/{account}/d1/database/{id}/query`.
//! D1 runs a multi-statement body as one request; a `success: false`
//! envelope or non-2xx status fails the batch.

use super::{ExecError, RemoteExecutor};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_BASE: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
}

/// Cloudflare v4 API response envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

pub struct D1HttpExecutor {
    client: reqwest::blocking::Client,
    url: String,
    api_token: String,
    label: String,
}

impl D1HttpExecutor {
    pub fn new(account_id: &str, database_id: &str, api_token: &str) -> Result<Self, ExecError> {
        Self::with_base_url(API_BASE, account_id, database_id, api_token)
    }

    /// Point at a different API root (staging, proxies, tests).
    pub fn with_base_url(
        base_url: &str,
        account_id: &str,
        database_id: &str,
        api_token: &str,
    ) -> Result<Self, ExecError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("backfill/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExecError::Http(format!("build client: {e}")))?;

        Ok(Self {
            client,
            url: format!(
                "{}/accounts/{account_id}/d1/database/{database_id}/query",
                base_url.trim_end_matches('/')
            ),
            api_token: api_token.to_string(),
            label: format!("d1 http {database_id}"),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RemoteExecutor for D1HttpExecutor {
    fn name(&self) -> &str {
        &self.label
    }

    fn execute(&self, script: &str, timeout: Duration) -> Result<(), ExecError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_token)
            .timeout(timeout)
            .json(&QueryRequest { sql: script })
            .send()
            .map_err(|e| request_error(e, timeout))?;

        let status = resp.status();
        let body = resp.text().map_err(|e| request_error(e, timeout))?;
        interpret(status.as_u16(), &body)
    }
}

fn request_error(e: reqwest::Error, timeout: Duration) -> ExecError {
    if e.is_timeout() {
        ExecError::TimedOut { after: timeout }
    } else {
        ExecError::Http(e.to_string())
    }
}

/// Decide batch success from the HTTP status and response body.
fn interpret(status: u16, body: &str) -> Result<(), ExecError> {
    match serde_json::from_str::<Envelope>(body) {
        Ok(env) if env.success && (200..300).contains(&status) => Ok(()),
        Ok(env) => {
            let messages: Vec<String> = env
                .errors
                .iter()
                .map(|m| format!("[{}] {}", m.code, m.message))
                .collect();
            let detail = if messages.is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {}", messages.join("; "))
            };
            Err(ExecError::Failed { detail })
        }
        Err(_) => Err(ExecError::Failed {
            detail: format!("HTTP {status}: {body}"),
        }),
    }
}
