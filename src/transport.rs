//! Authenticated HTTP transport for the sandbox API.
//!
//! One [`Transport`] per client: it owns the connection pool, injects the
//! bearer credential into every request, maps HTTP status codes onto the
//! crate's error taxonomy, and retries transient connection failures with
//! exponential backoff. Non-2xx responses never surface as raw reqwest
//! errors.

use std::time::Duration;

use reqwest::{Method, StatusCode, header};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Result, SandboxError};
use crate::retry::{MAX_CONNECT_RETRIES, backoff_delay, is_retryable_connect};

/// Total per-request deadline; command execution overrides it per call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// TCP connect deadline, kept short so retries kick in quickly.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const API_PREFIX: &str = "/api/v1";

/// Shared HTTP layer. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    http: reqwest::Client,
    config: ClientConfig,
}

impl Transport {
    pub(crate) fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout.unwrap_or(REQUEST_TIMEOUT))
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("sandkit/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.config.base_url, API_PREFIX, path)
    }

    fn builder(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .header(header::ACCEPT, "application/json")
    }

    /// Send a request, retrying only transient connection failures.
    ///
    /// Requests are rebuilt from scratch on every attempt so a retry never
    /// reuses a half-consumed body. Read timeouts and HTTP errors are not
    /// retried: by then the server may already have acted on the request.
    /// A fired request deadline surfaces as [`SandboxError::Timeout`], not
    /// as a raw transport error.
    async fn send<F>(&self, make: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let started = std::time::Instant::now();
        let mut last_err = None;
        for attempt in 0..=MAX_CONNECT_RETRIES {
            if attempt > 0 {
                let delay = backoff_delay(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after connect failure");
                tokio::time::sleep(delay).await;
            }
            match make().send().await {
                Ok(response) => return self.check_status(response, started.elapsed()).await,
                Err(err) if is_retryable_connect(&err) => {
                    warn!(attempt, error = %err, "connection attempt failed");
                    last_err = Some(err);
                }
                Err(err) if err.is_timeout() => {
                    return Err(SandboxError::Timeout {
                        waited: started.elapsed(),
                        last_status: None,
                    });
                }
                Err(err) => return Err(SandboxError::Http(err)),
            }
        }
        // Loop only exits via the retryable arm, so last_err is populated.
        Err(SandboxError::Http(last_err.ok_or_else(|| {
            SandboxError::InvalidResponse {
                reason: "retry loop exited without an error".to_string(),
            }
        })?))
    }

    /// Map a non-success status to a typed error, consuming the body for
    /// the server's detail message.
    async fn check_status(
        &self,
        response: reqwest::Response,
        waited: std::time::Duration,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // The server reporting its own deadline is a timeout, not a
        // generic API failure.
        if status == StatusCode::REQUEST_TIMEOUT {
            return Err(SandboxError::Timeout {
                waited,
                last_status: None,
            });
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response.text().await.unwrap_or_default();
        let message = extract_detail(&body);

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                SandboxError::Unauthorized { message }
            }
            StatusCode::PAYMENT_REQUIRED => SandboxError::PaymentRequired { message },
            StatusCode::NOT_FOUND => SandboxError::NotFound { message },
            StatusCode::TOO_MANY_REQUESTS => SandboxError::RateLimited {
                message,
                retry_after,
            },
            _ => SandboxError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(|| self.builder(Method::GET, path)).await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn get_with_query<Q, T>(&self, path: &str, query: &Q) -> Result<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(|| self.builder(Method::GET, path).query(query))
            .await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(|| self.builder(Method::POST, path).json(body))
            .await?;
        Ok(response.json().await?)
    }

    /// POST with a caller-supplied deadline overriding the pool default.
    /// Used for command execution, where the caller bounds the wait.
    pub(crate) async fn post_with_timeout<B, T>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(|| self.builder(Method::POST, path).json(body).timeout(timeout))
            .await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(|| self.builder(Method::PATCH, path).json(body))
            .await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        self.send(|| self.builder(Method::DELETE, path)).await?;
        Ok(())
    }

    /// Upload raw bytes as a multipart form file part.
    pub(crate) async fn post_file<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        file_name: String,
        bytes: bytes::Bytes,
    ) -> Result<T> {
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let response = self
            .send(|| {
                let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                    .file_name(file_name.clone())
                    .mime_str("application/octet-stream")
                    .unwrap_or_else(|_| {
                        reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name.clone())
                    });
                let form = reqwest::multipart::Form::new().part("file", part);
                self.builder(Method::POST, path)
                    .query(&query)
                    .multipart(form)
            })
            .await?;
        Ok(response.json().await?)
    }

    /// Download a file's raw bytes.
    pub(crate) async fn get_bytes(&self, path: &str, query: &[(&str, &str)]) -> Result<bytes::Bytes> {
        let response = self
            .send(|| self.builder(Method::GET, path).query(query))
            .await?;
        Ok(response.bytes().await?)
    }
}

/// Pull the human-readable message out of an error body.
///
/// The service wraps messages as `{"detail": "..."}`; fall back to the raw
/// body (truncated) when the shape is unexpected.
fn extract_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(detail) = value.get("detail") {
            return match detail {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
        if let Some(serde_json::Value::String(s)) = value.get("message") {
            return s.clone();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error detail provided".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}
