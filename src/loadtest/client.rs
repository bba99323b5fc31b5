//! HTTP client for the target endpoint.
//!
//! One [`TargetClient`] is shared by every worker of every stage. It wraps a
//! pooled [`reqwest::Client`] (cheap to clone, safe for concurrent use) plus
//! the resolved endpoint URL and the per-request timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;

use crate::loadtest::error::{LoadTestError, RequestError};
use crate::loadtest::payload::Payload;

/// Content type sent with every payload.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Something a worker can fire a payload at.
///
/// [`TargetClient`] is the HTTP implementation; the dispatcher only sees
/// this trait.
#[async_trait]
pub trait Target: Send + Sync {
    /// Deliver one payload, returning the response body on success.
    async fn fire(&self, payload: &Payload) -> Result<String, RequestError>;
}

/// POSTs payloads to the target endpoint.
#[derive(Debug, Clone)]
pub struct TargetClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl TargetClient {
    /// Build a client for `endpoint`, appending `apikey` as a query parameter.
    ///
    /// Fails with [`LoadTestError::ConfigValidation`] if the endpoint is not an
    /// absolute http(s) URL.
    pub fn new(
        endpoint: &str,
        apikey: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LoadTestError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| LoadTestError::Client {
                message: err.to_string(),
            })?;
        Self::with_client(http, endpoint, apikey, timeout)
    }

    /// Like [`TargetClient::new`] but reusing an existing [`reqwest::Client`].
    pub fn with_client(
        http: reqwest::Client,
        endpoint: &str,
        apikey: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LoadTestError> {
        let parsed = Url::parse(endpoint).map_err(|err| LoadTestError::ConfigValidation {
            message: format!("Invalid endpoint '{endpoint}': {err}"),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LoadTestError::ConfigValidation {
                message: format!("Endpoint '{endpoint}' must use http or https"),
            });
        }
        Ok(Self {
            http,
            url: endpoint_with_apikey(endpoint, apikey),
            timeout,
        })
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one payload and return the response body.
    ///
    /// Succeeds only for a 2xx response whose body was read completely within
    /// the timeout. Everything else maps to a [`RequestError`].
    pub async fn post(&self, payload: &Payload) -> Result<String, RequestError> {
        let request = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(payload.clone().into_bytes());

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|err| RequestError::classify_reqwest(&err, self.timeout))?;
            let status = response.status();
            let body = response.text().await.map_err(|err| {
                if err.is_timeout() {
                    RequestError::Timeout {
                        after: self.timeout,
                    }
                } else {
                    RequestError::Body {
                        message: err.to_string(),
                    }
                }
            })?;
            if status.is_success() {
                Ok(body)
            } else {
                Err(RequestError::Http {
                    status: status.as_u16(),
                    body,
                })
            }
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(RequestError::Timeout {
                after: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl Target for TargetClient {
    async fn fire(&self, payload: &Payload) -> Result<String, RequestError> {
        self.post(payload).await
    }
}

/// Append `apikey=<key>` to the endpoint's query string.
fn endpoint_with_apikey(endpoint: &str, apikey: Option<&str>) -> String {
    match apikey.filter(|k| !k.is_empty()) {
        Some(key) => {
            let separator = if endpoint.contains('?') { '&' } else { '?' };
            format!("{endpoint}{separator}apikey={}", urlencoding::encode(key))
        },
        None => endpoint.to_string(),
    }
}
