//! Configuration for the upload client.
//!
//! All behaviour is controlled through [`ClientConfig`], built via its
//! [`ClientConfigBuilder`]. The retry bound and the delay between attempts
//! live here, next to the endpoint and the wire field names.

use crate::document::DOCX_MEDIA_TYPE;
use crate::error::UploadError;
use crate::observer::UploadObserver;
use reqwest::Url;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default conversion endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/generate_document";

/// Smallest accepted preview edge, in pixels.
pub const MIN_PREVIEW_PIXELS: u32 = 100;

/// Largest accepted preview edge, in pixels.
pub const MAX_PREVIEW_PIXELS: u32 = 8000;

pub(crate) fn clamp_timeout_secs(secs: u64) -> u64 {
    secs.max(1)
}

pub(crate) fn clamp_preview_pixels(px: u32) -> u32 {
    px.clamp(MIN_PREVIEW_PIXELS, MAX_PREVIEW_PIXELS)
}

/// Configuration for an [`crate::UploadController`] and its transport.
///
/// # Example
/// ```rust
/// use docgen_client::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .endpoint("http://docgen.internal:8000/generate_document")
///     .max_attempts(5)
///     .retry_delay_ms(250)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Conversion endpoint receiving the multipart POST.
    pub endpoint: String,

    /// Multipart field carrying the document. Default: `file`.
    pub file_field: String,

    /// JSON field holding the result reference. Default: `pdf_url`.
    pub result_field: String,

    /// Declared media type a selected file must carry. Default: DOCX.
    pub accepted_media_type: String,

    /// Total submission attempts per submit, including the first. Default: 3.
    pub max_attempts: u32,

    /// Fixed pause between attempts in milliseconds. Default: 0.
    ///
    /// No backoff is applied; every gap is the same length.
    pub retry_delay_ms: u64,

    /// Per-attempt request timeout. `None` leaves the transport default.
    pub request_timeout_secs: Option<u64>,

    /// Timeout for fetching the generated document. Default: 120.
    pub download_timeout_secs: u64,

    /// Longest edge of the first-page preview, in pixels. Default: 1600.
    pub preview_max_pixels: u32,

    /// Receives state transitions and per-attempt events.
    pub observer: Option<Arc<dyn UploadObserver>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            file_field: "file".to_string(),
            result_field: "pdf_url".to_string(),
            accepted_media_type: DOCX_MEDIA_TYPE.to_string(),
            max_attempts: 3,
            retry_delay_ms: 0,
            request_timeout_secs: None,
            download_timeout_secs: 120,
            preview_max_pixels: 1600,
            observer: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("file_field", &self.file_field)
            .field("result_field", &self.result_field)
            .field("accepted_media_type", &self.accepted_media_type)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("preview_max_pixels", &self.preview_max_pixels)
            .field(
                "observer",
                &self.observer.as_ref().map(|_| "<dyn UploadObserver>"),
            )
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// The endpoint parsed as a URL.
    pub fn endpoint_url(&self) -> Result<Url, UploadError> {
        parse_endpoint(&self.endpoint)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn file_field(mut self, name: impl Into<String>) -> Self {
        self.config.file_field = name.into();
        self
    }

    pub fn result_field(mut self, name: impl Into<String>) -> Self {
        self.config.result_field = name.into();
        self
    }

    pub fn accepted_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.config.accepted_media_type = media_type.into();
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(clamp_timeout_secs(secs));
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = clamp_timeout_secs(secs);
        self
    }

    pub fn preview_max_pixels(mut self, px: u32) -> Self {
        self.config.preview_max_pixels = clamp_preview_pixels(px);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn UploadObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, UploadError> {
        let c = &self.config;
        parse_endpoint(&c.endpoint)?;
        if c.file_field.trim().is_empty() {
            return Err(UploadError::InvalidConfig(
                "Multipart field name must not be empty".into(),
            ));
        }
        if c.result_field.trim().is_empty() {
            return Err(UploadError::InvalidConfig(
                "Result field name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, UploadError> {
    let url = Url::parse(endpoint).map_err(|e| UploadError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(UploadError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ClientConfig::default();
        assert_eq!(c.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.retry_delay_ms, 0);
        assert_eq!(c.file_field, "file");
        assert_eq!(c.result_field, "pdf_url");
        assert!(c.request_timeout_secs.is_none());
    }

    #[test]
    fn attempts_clamped_to_one() {
        let c = ClientConfig::builder().max_attempts(0).build().unwrap();
        assert_eq!(c.max_attempts, 1);
    }

    #[test]
    fn timeouts_and_preview_size_clamped() {
        let c = ClientConfig::builder()
            .download_timeout_secs(0)
            .request_timeout_secs(0)
            .preview_max_pixels(0)
            .build()
            .unwrap();
        assert_eq!(c.download_timeout_secs, 1);
        assert_eq!(c.request_timeout_secs, Some(1));
        assert_eq!(c.preview_max_pixels, MIN_PREVIEW_PIXELS);

        let c = ClientConfig::builder()
            .preview_max_pixels(u32::MAX)
            .build()
            .unwrap();
        assert_eq!(c.preview_max_pixels, MAX_PREVIEW_PIXELS);
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = ClientConfig::builder()
            .endpoint("ftp://example.com/upload")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"), "{err}");

        assert!(ClientConfig::builder().endpoint("not a url").build().is_err());
    }

    #[test]
    fn rejects_empty_field_names() {
        assert!(ClientConfig::builder().file_field(" ").build().is_err());
        assert!(ClientConfig::builder().result_field("").build().is_err());
    }

    #[test]
    fn debug_hides_observer() {
        let c = ClientConfig::builder()
            .observer(Arc::new(crate::observer::NoopObserver))
            .build()
            .unwrap();
        assert!(format!("{c:?}").contains("<dyn UploadObserver>"));
    }
}
