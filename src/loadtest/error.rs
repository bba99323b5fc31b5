//! Error types for the load generation engine.
//!
//! [`LoadTestError`] covers everything that stops a run before (or outside of)
//! request dispatch. [`RequestError`] classifies a single failed request; it
//! never aborts the worker pool and only surfaces inside an outcome.

use std::time::Duration;

/// Errors that occur during configuration, setup, or stage orchestration.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the config file contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Semantic validation failure -- the config parsed successfully but
    /// contains invalid values (e.g., a stage with zero requests).
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// A `--schedule` argument that is not a list of `requests:concurrency` pairs.
    #[error("Invalid schedule '{input}': {message}")]
    Schedule { input: String, message: String },

    /// The payload image could not be read from disk.
    #[error("Failed to read payload image '{path}': {source}")]
    PayloadIo {
        source: std::io::Error,
        path: String,
    },

    /// The payload could not be decoded, noised, or re-encoded.
    #[error("Payload error: {message}")]
    Payload { message: String },

    /// The latency log could not be opened.
    #[error("Failed to open latency log '{path}': {source}")]
    Sink {
        source: std::io::Error,
        path: String,
    },

    /// The shared HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {message}")]
    Client { message: String },

    /// The results channel closed before every outcome of a stage was drained.
    #[error("Internal engine error: {message}")]
    Internal { message: String },
}

/// Classification of a single failed request.
///
/// Each variant is a distinct category that the report counts separately.
/// The [`Display`](std::fmt::Display) text is the diagnostic placed in the
/// outcome body.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum RequestError {
    /// No response arrived within the configured per-request timeout.
    #[error("Request timed out after {after:?}")]
    Timeout { after: Duration },

    /// Transport failure while sending (DNS, TCP connect, TLS, reset).
    #[error("Error while sending the request: {message}")]
    Connection { message: String },

    /// The target answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response arrived but its body could not be read.
    #[error("Error while parsing the response: {message}")]
    Body { message: String },

    /// The worker panicked while handling the request.
    #[error("Worker panicked: {message}")]
    Internal { message: String },
}

impl RequestError {
    /// Returns the error category as a static string for report grouping.
    ///
    /// Categories: `"timeout"`, `"connection"`, `"http"`, `"body"`, `"internal"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connection { .. } => "connection",
            Self::Http { .. } => "http",
            Self::Body { .. } => "body",
            Self::Internal { .. } => "internal",
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`RequestError`] variant.
    ///
    /// `timeout` is the configured limit, echoed in the diagnostic.
    pub fn classify_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout { after: timeout }
        } else if err.is_connect() || err.is_request() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            Self::Body {
                message: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}
