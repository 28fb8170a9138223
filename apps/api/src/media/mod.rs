//! Media resolution: downloads the image attached to a 311 request.
//!
//! An image that cannot be resolved is a caller-side precondition violation,
//! surfaced as `AppError::Validation` before any inference call is made.

use std::time::Duration;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{Bytes, BytesMut};
use reqwest::{header::CONTENT_TYPE, Client};
use thiserror::Error;
use tracing::debug;

use crate::errors::AppError;

const SUPPORTED_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("media_url is empty")]
    MissingUrl,

    #[error("media_url '{url}' could not be fetched: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("media_url '{url}' returned status {status}")]
    Status { url: String, status: u16 },

    #[error("media_url '{url}' is {size} bytes, limit is {limit}")]
    TooLarge { url: String, size: usize, limit: usize },

    #[error("media_url '{url}' did not resolve to a supported image")]
    NotAnImage { url: String },
}

impl From<ImageError> for AppError {
    fn from(e: ImageError) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// A resolved request image. Immutable once fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub bytes: Bytes,
    pub media_type: String,
}

impl Image {
    pub fn new(bytes: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

#[derive(Clone)]
pub struct ImageFetcher {
    client: Client,
    max_bytes: usize,
}

impl ImageFetcher {
    pub fn new(timeout_secs: u64, max_bytes: usize) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build image HTTP client")?;
        Ok(Self { client, max_bytes })
    }

    /// Downloads `url` and returns the image with its media type.
    pub async fn fetch(&self, url: &str) -> Result<Image, ImageError> {
        let url = strip_fragment(url.trim());
        if url.is_empty() {
            return Err(ImageError::MissingUrl);
        }

        let fetch_err = |source| ImageError::Fetch {
            url: url.to_string(),
            source,
        };

        let mut response = self.client.get(url).send().await.map_err(fetch_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(normalize_media_type);

        let too_large = |size| ImageError::TooLarge {
            url: url.to_string(),
            size,
            limit: self.max_bytes,
        };

        if let Some(declared_len) = response.content_length() {
            if declared_len > self.max_bytes as u64 {
                return Err(too_large(declared_len as usize));
            }
        }

        // Stop reading as soon as the body passes the limit.
        let mut buf = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(fetch_err)? {
            if buf.len() + chunk.len() > self.max_bytes {
                return Err(too_large(buf.len() + chunk.len()));
            }
            buf.extend_from_slice(&chunk);
        }
        let bytes = buf.freeze();

        let media_type = declared
            .filter(|t| SUPPORTED_MEDIA_TYPES.contains(&t.as_str()))
            .or_else(|| sniff_media_type(&bytes).map(String::from))
            .ok_or_else(|| ImageError::NotAnImage {
                url: url.to_string(),
            })?;

        debug!(url, media_type = %media_type, size = bytes.len(), "Fetched request image");

        Ok(Image::new(bytes, media_type))
    }
}

/// Drops a `#fragment` suffix. Some 311 providers tag media URLs with one.
fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map(|(base, _)| base).unwrap_or(url)
}

/// `image/JPEG; charset=binary` → `image/jpeg`
fn normalize_media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Detects the image format from its magic bytes.
fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}
