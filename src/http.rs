//! HTTP transport to the metric source (spec.md §6, §9 REDESIGN FLAG iv).
//!
//! Grounded on the request/response/error-surfacing shape of the teacher's
//! `ai::openai::OpenAi::chat` (a `reqwest::blocking` POST with bearer auth
//! and an error `bail!` on non-success), generalized into a small transport
//! with connect/request timeouts, linear-backoff retry on transport errors
//! and 5xx, and an honored per-call timeout override — the source project's
//! bug of silently dropping the per-call timeout is deliberately not
//! reproduced here.

use crate::config::MetricSourceConfig;
use crate::error::{CorridorError, Result};
use std::thread;
use std::time::Duration;

pub struct HttpTransport {
    client: reqwest::blocking::Client,
    default_request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(cfg: &MetricSourceConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .danger_accept_invalid_certs(cfg.danger_accept_invalid_certs)
            .build()
            .map_err(|e| CorridorError::Internal(format!("build http client: {e}")))?;
        Ok(Self { client, default_request_timeout: Duration::from_secs(cfg.request_timeout_secs) })
    }

    /// `GET url` with up to two retries on transport errors or a `5xx`
    /// response, sleeping `retry_number * 1s` between attempts. `4xx`
    /// responses are surfaced verbatim on the first attempt — they don't
    /// retry because retrying a client error can't change the outcome.
    /// `timeout` overrides the client's default request timeout for this
    /// call only, when given.
    pub fn get_json(&self, url: &str, timeout: Option<Duration>) -> Result<serde_json::Value> {
        let effective_timeout = timeout.unwrap_or(self.default_request_timeout);
        let max_retries = 2;

        let mut last_err: Option<CorridorError> = None;
        for attempt in 0..=max_retries {
            match self.attempt(url, effective_timeout) {
                Ok(value) => return Ok(value),
                Err(CorridorError::UpstreamBadResponse { status, body }) if (400..500).contains(&status) => {
                    return Err(CorridorError::UpstreamBadResponse { status, body });
                }
                Err(e) => {
                    last_err = Some(e);
                    if attempt < max_retries {
                        thread::sleep(Duration::from_secs(attempt + 1));
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| CorridorError::UpstreamUnavailable(url.to_string())))
    }

    fn attempt(&self, url: &str, timeout: Duration) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| CorridorError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<serde_json::Value>()
                .map_err(|e| CorridorError::UpstreamBadResponse { status: status.as_u16(), body: e.to_string() })
        } else {
            let body = response.text().unwrap_or_default();
            Err(CorridorError::UpstreamBadResponse { status: status.as_u16(), body })
        }
    }
}
