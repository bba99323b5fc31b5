//! Payload sources: what each request carries.
//!
//! A [`PayloadSource`] hands out opaque request bodies on demand. Two sources
//! ship with the crate:
//!
//! - [`StaticPayload`]: one fixed body, cloned for every request.
//! - [`NoisyImage`]: a JPEG decoded once, then for every call a copy with
//!   random gray pixels scattered over it, re-encoded as JPEG, base64-encoded
//!   and wrapped as `{"image": "<base64>"}`.
//!
//! The noise makes every request body distinct so caches on the target side
//! cannot short-circuit the work.

use std::path::Path;

use base64::Engine;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageFormat, Rgb, RgbImage};
use rand::prelude::*;

use crate::loadtest::config::PayloadSettings;
use crate::loadtest::error::LoadTestError;

/// An immutable request body. Cloning bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Bytes);

impl Payload {
    /// Wraps raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// The body bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for an empty body.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the payload, returning the shared buffer.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

/// Supplies request bodies.
///
/// Called from the stage runner before any worker starts, once per request
/// when the stage regenerates payloads, otherwise once per stage.
pub trait PayloadSource: Send + Sync {
    /// Produce one payload.
    fn produce(&self) -> Result<Payload, LoadTestError>;
}

/// A fixed body reused for every request.
#[derive(Debug, Clone)]
pub struct StaticPayload {
    payload: Payload,
}

impl StaticPayload {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            payload: Payload::new(body),
        }
    }
}

impl PayloadSource for StaticPayload {
    fn produce(&self) -> Result<Payload, LoadTestError> {
        Ok(self.payload.clone())
    }
}

/// A JPEG image that comes back with fresh noise on every call.
#[derive(Debug, Clone)]
pub struct NoisyImage {
    image: RgbImage,
    noise_iterations: u32,
    quality: u8,
}

impl NoisyImage {
    /// Read and decode a JPEG file.
    ///
    /// Returns [`LoadTestError::PayloadIo`] if the file cannot be read and
    /// [`LoadTestError::Payload`] if it is not a decodable JPEG.
    pub fn open(path: &Path, noise_iterations: u32, quality: u8) -> Result<Self, LoadTestError> {
        let raw = std::fs::read(path).map_err(|source| LoadTestError::PayloadIo {
            source,
            path: path.display().to_string(),
        })?;
        let decoded = image::load_from_memory_with_format(&raw, ImageFormat::Jpeg).map_err(
            |err| LoadTestError::Payload {
                message: format!("'{}' is not a readable JPEG: {err}", path.display()),
            },
        )?;
        tracing::debug!(
            path = %path.display(),
            width = decoded.width(),
            height = decoded.height(),
            "payload image loaded"
        );
        Ok(Self::from_image(decoded, noise_iterations, quality))
    }

    /// Wrap an already decoded image.
    pub fn from_image(image: DynamicImage, noise_iterations: u32, quality: u8) -> Self {
        Self {
            image: image.to_rgb8(),
            noise_iterations,
            quality,
        }
    }

    /// A copy of the base image with `noise_iterations` random pixels set to
    /// random shades of gray.
    pub fn noised(&self) -> RgbImage {
        let mut img = self.image.clone();
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return img;
        }
        let mut rng = rand::rng();
        for _ in 0..self.noise_iterations {
            let x = rng.random_range(0..width);
            let y = rng.random_range(0..height);
            let shade: u8 = rng.random();
            img.put_pixel(x, y, Rgb([shade, shade, shade]));
        }
        img
    }

    fn encode_jpeg(&self, img: &RgbImage) -> Result<Vec<u8>, LoadTestError> {
        let mut jpeg = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.quality);
            encoder
                .encode(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
                .map_err(|err| LoadTestError::Payload {
                    message: format!("JPEG encoding failed: {err}"),
                })?;
        }
        Ok(jpeg)
    }
}

impl PayloadSource for NoisyImage {
    fn produce(&self) -> Result<Payload, LoadTestError> {
        let jpeg = self.encode_jpeg(&self.noised())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&jpeg);
        let body = serde_json::to_vec(&serde_json::json!({ "image": encoded })).map_err(
            |err| LoadTestError::Payload {
                message: format!("JSON encoding failed: {err}"),
            },
        )?;
        Ok(Payload::new(body))
    }
}

/// Build the payload source described by the `[payload]` section.
pub fn source_from_settings(
    settings: &PayloadSettings,
) -> Result<Box<dyn PayloadSource>, LoadTestError> {
    match settings.image_path() {
        Some(path) => Ok(Box::new(NoisyImage::open(
            &path,
            settings.noise_iterations,
            settings.jpeg_quality,
        )?)),
        None => {
            let body = settings.body.clone().unwrap_or_default();
            Ok(Box::new(StaticPayload::new(body)))
        },
    }
}
