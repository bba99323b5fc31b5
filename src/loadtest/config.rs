//! TOML-based load schedule configuration.
//!
//! Defines typed structs for the run settings, the payload to fire and the
//! ordered list of `[[stage]]` load levels. Every section is optional; a bare
//! file (or no file at all) yields 8 clients firing 100 requests with a 60s
//! timeout, using `example.jpg` as the payload image.
//!
//! # Example TOML
//!
//! ```toml
//! [settings]
//! num_clients = 8
//! num_requests = 100
//! timeout_secs = 60.0
//!
//! [payload]
//! image = "example.jpg"
//! regenerate = true
//! noise_iterations = 100
//! jpeg_quality = 95
//!
//! [[stage]]
//! requests = 10
//! concurrency = 2
//!
//! [[stage]]
//! requests = 50
//! concurrency = 10
//! regenerate = false
//! ```
//!
//! Note: The target endpoint is NOT part of the config file. It is given as
//! the positional argument of `cannonade run`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::loadtest::error::LoadTestError;

/// Image used when the config names neither an image nor a static body.
pub const DEFAULT_IMAGE: &str = "example.jpg";

/// One load level: fire `requests` payloads through `concurrency` workers.
///
/// `concurrency > requests` is accepted; the surplus workers find the queue
/// already drained and exit.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Stage {
    /// Number of requests fired in this stage.
    pub requests: u32,
    /// Number of concurrent workers.
    pub concurrency: u32,
    /// Build a fresh payload per request. Falls back to `[payload] regenerate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regenerate: Option<bool>,
}

impl Stage {
    /// A stage that inherits the payload regeneration setting.
    pub fn new(requests: u32, concurrency: u32) -> Self {
        Self {
            requests,
            concurrency,
            regenerate: None,
        }
    }

    /// Whether this stage regenerates payloads, given the file-wide default.
    pub fn regenerates(&self, default: bool) -> bool {
        self.regenerate.unwrap_or(default)
    }

    /// Parse a compact schedule such as `"10:2,5:5"` into stages.
    ///
    /// Each comma-separated item is `requests:concurrency`; whitespace around
    /// items and numbers is ignored. Both numbers must be positive.
    pub fn parse_schedule(input: &str) -> Result<Vec<Stage>, LoadTestError> {
        let invalid = |message: String| LoadTestError::Schedule {
            input: input.to_string(),
            message,
        };

        let mut stages = Vec::new();
        for item in input.split(',') {
            let item = item.trim();
            if item.is_empty() {
                return Err(invalid("empty stage entry".to_string()));
            }
            let (requests, concurrency) = item.split_once(':').ok_or_else(|| {
                invalid(format!("'{item}' is not of the form requests:concurrency"))
            })?;
            let requests = parse_positive(requests)
                .ok_or_else(|| invalid(format!("'{item}' has an invalid request count")))?;
            let concurrency = parse_positive(concurrency)
                .ok_or_else(|| invalid(format!("'{item}' has an invalid concurrency")))?;
            stages.push(Stage::new(requests, concurrency));
        }
        Ok(stages)
    }
}

fn parse_positive(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

/// Top-level configuration parsed from `cannonade.toml`.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoadTestConfig {
    /// General run settings.
    #[serde(default)]
    pub settings: Settings,
    /// What to fire at the target.
    #[serde(default)]
    pub payload: PayloadSettings,
    /// Ordered load levels. When empty, a single stage is built from
    /// `settings.num_requests` and `settings.num_clients`.
    ///
    /// The field name is `stage` (not `stages`) because TOML `[[stage]]`
    /// array-of-tables syntax creates a key called `stage`.
    #[serde(default)]
    pub stage: Vec<Stage>,
}

/// General settings controlling execution parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Concurrency of the implicit single stage.
    #[serde(default = "default_num_clients")]
    pub num_clients: u32,
    /// Request count of the implicit single stage.
    #[serde(default = "default_num_requests")]
    pub num_requests: u32,
    /// Per-request timeout in seconds. Fractions are allowed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// API key appended to the endpoint as `?apikey=...`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apikey: Option<String>,
}

fn default_num_clients() -> u32 {
    8
}

fn default_num_requests() -> u32 {
    100
}

fn default_timeout_secs() -> f64 {
    60.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_clients: default_num_clients(),
            num_requests: default_num_requests(),
            timeout_secs: default_timeout_secs(),
            apikey: None,
        }
    }
}

/// Payload settings: either a JPEG image to noise up, or a static body.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PayloadSettings {
    /// JPEG image to fire. Defaults to [`DEFAULT_IMAGE`] when `body` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    /// Static request body sent verbatim instead of an image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Build a fresh payload for every request.
    #[serde(default = "default_regenerate")]
    pub regenerate: bool,
    /// Number of random pixels overwritten per generated image.
    #[serde(default = "default_noise_iterations")]
    pub noise_iterations: u32,
    /// JPEG re-encoding quality, 1 to 100.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_regenerate() -> bool {
    true
}

fn default_noise_iterations() -> u32 {
    100
}

fn default_jpeg_quality() -> u8 {
    95
}

impl Default for PayloadSettings {
    fn default() -> Self {
        Self {
            image: None,
            body: None,
            regenerate: default_regenerate(),
            noise_iterations: default_noise_iterations(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl PayloadSettings {
    /// The image to load, or `None` when a static body is configured.
    pub fn image_path(&self) -> Option<PathBuf> {
        if self.body.is_some() {
            None
        } else {
            Some(
                self.image
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE)),
            )
        }
    }
}

impl LoadTestConfig {
    /// Parse a TOML string into a validated [`LoadTestConfig`].
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`LoadTestConfig`] from a file path.
    ///
    /// Returns [`LoadTestError::ConfigIo`] if the file cannot be read,
    /// [`LoadTestError::ConfigParse`] if the TOML is malformed, or
    /// [`LoadTestError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Returns `true` if the config defines explicit stages.
    pub fn has_stages(&self) -> bool {
        !self.stage.is_empty()
    }

    /// The schedule to execute, in order.
    pub fn schedule(&self) -> Vec<Stage> {
        if self.has_stages() {
            self.stage.clone()
        } else {
            vec![Stage::new(
                self.settings.num_requests,
                self.settings.num_clients,
            )]
        }
    }

    /// Total number of requests across the schedule.
    pub fn total_requests(&self) -> u64 {
        self.schedule().iter().map(|s| u64::from(s.requests)).sum()
    }

    /// Validate that the config is semantically correct.
    ///
    /// Checks:
    /// - `num_clients` and `num_requests` are positive
    /// - `timeout_secs` converts to a non-zero [`Duration`]
    /// - `jpeg_quality` is within 1..=100
    /// - `image` and `body` are not both set
    /// - every stage has positive `requests` and `concurrency`
    pub fn validate(&self) -> Result<(), LoadTestError> {
        let invalid = |message: String| Err(LoadTestError::ConfigValidation { message });

        if self.settings.num_clients == 0 {
            return invalid("settings.num_clients must be greater than 0".to_string());
        }
        if self.settings.num_requests == 0 {
            return invalid("settings.num_requests must be greater than 0".to_string());
        }
        self.settings.timeout_as_duration()?;
        if !(1..=100).contains(&self.payload.jpeg_quality) {
            return invalid(format!(
                "payload.jpeg_quality must be between 1 and 100, got {}",
                self.payload.jpeg_quality
            ));
        }
        if self.payload.image.is_some() && self.payload.body.is_some() {
            return invalid("payload.image and payload.body are mutually exclusive".to_string());
        }

        for (i, stage) in self.stage.iter().enumerate() {
            if stage.requests == 0 {
                return invalid(format!(
                    "Stage {} has requests=0; each stage must fire at least one request",
                    i + 1
                ));
            }
            if stage.concurrency == 0 {
                return invalid(format!(
                    "Stage {} has concurrency=0; each stage needs at least one worker",
                    i + 1
                ));
            }
        }

        Ok(())
    }
}

impl Settings {
    /// Convert the `timeout_secs` field to a [`Duration`].
    ///
    /// Fails for negative, non-finite or overflowing values and for values
    /// too small to survive nanosecond rounding.
    pub fn timeout_as_duration(&self) -> Result<Duration, LoadTestError> {
        match Duration::try_from_secs_f64(self.timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => Err(LoadTestError::ConfigValidation {
                message: format!(
                    "settings.timeout_secs must be a positive number of seconds, got {}",
                    self.timeout_secs
                ),
            }),
        }
    }
}
