//! Network access to the conversion service.
//!
//! [`ConversionTransport`] is the seam between the controller and the
//! outside world: one call is one attempt, and the controller owns the retry
//! loop. [`HttpTransport`] is the production implementation; tests plug in
//! scripted doubles.
//!
//! ## Accepted responses
//!
//! * `2xx` with a JSON body carrying the result field (default `pdf_url`).
//!   Absolute URLs are used as-is, paths resolve against the endpoint.
//! * `2xx` with `Content-Type: application/pdf`: the document itself, kept
//!   inline. The file name comes from `Content-Disposition`.
//!
//! Anything else is an [`AttemptError`].

use crate::artifact::filename_from_disposition;
use crate::config::ClientConfig;
use crate::document::SelectedFile;
use crate::error::{AttemptError, UploadError};
use crate::state::ResultReference;
use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longest error body kept in an [`AttemptError::Status`].
const MAX_ERROR_BODY: usize = 200;

/// Fallback name for inline documents without `Content-Disposition`.
const INLINE_FALLBACK_NAME: &str = "document.pdf";

/// One submission of a document to the conversion service.
#[async_trait]
pub trait ConversionTransport: Send + Sync {
    /// Submit `file` once and return where the generated document lives.
    async fn submit(&self, file: &SelectedFile) -> Result<ResultReference, AttemptError>;
}

#[async_trait]
impl<T: ConversionTransport + ?Sized> ConversionTransport for Arc<T> {
    async fn submit(&self, file: &SelectedFile) -> Result<ResultReference, AttemptError> {
        (**self).submit(file).await
    }
}

/// `reqwest`-backed transport posting multipart forms.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    file_field: String,
    result_field: String,
}

impl HttpTransport {
    /// Build a transport from the client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, UploadError> {
        let endpoint = config.endpoint_url()?;

        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| UploadError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            file_field: config.file_field.clone(),
            result_field: config.result_field.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// `GET /` on the service origin; returns its `message` field.
    pub async fn health(&self) -> Result<String, UploadError> {
        let mut url = self.endpoint.clone();
        url.set_path("/");
        url.set_query(None);

        let unavailable = |reason: String| UploadError::ServiceUnavailable {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid body: {e}")))?;

        Ok(body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("ok")
            .to_string())
    }

    fn form(&self, file: &SelectedFile) -> Result<Form, AttemptError> {
        let part = Part::bytes(file.bytes().to_vec())
            .file_name(file.file_name().to_string())
            .mime_str(file.media_type())
            .map_err(|e| {
                AttemptError::Transport(format!(
                    "invalid media type '{}': {e}",
                    file.media_type()
                ))
            })?;
        Ok(Form::new().part(self.file_field.clone(), part))
    }

    async fn read_response(&self, response: Response) -> Result<ResultReference, AttemptError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let content_type = header_str(&response, CONTENT_TYPE)
            .unwrap_or_default()
            .to_ascii_lowercase();
        if content_type.starts_with("application/pdf") {
            let file_name = header_str(&response, CONTENT_DISPOSITION)
                .and_then(|d| filename_from_disposition(&d))
                .unwrap_or_else(|| INLINE_FALLBACK_NAME.to_string());
            let bytes = response.bytes().await?;
            debug!("Service returned {} inline bytes as '{}'", bytes.len(), file_name);
            return Ok(ResultReference::Inline {
                file_name,
                bytes: Arc::from(&bytes[..]),
            });
        }

        let body = response.text().await?;
        parse_result_body(&body, &self.result_field, &self.endpoint)
    }
}

#[async_trait]
impl ConversionTransport for HttpTransport {
    async fn submit(&self, file: &SelectedFile) -> Result<ResultReference, AttemptError> {
        debug!(
            url = %self.endpoint,
            size = file.len(),
            field = %self.file_field,
            "Posting document"
        );
        let form = self.form(file)?;
        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;
        self.read_response(response).await
    }
}

/// Extract the result reference from a JSON body.
pub fn parse_result_body(
    body: &str,
    field: &str,
    base: &Url,
) -> Result<ResultReference, AttemptError> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| AttemptError::InvalidResponse(format!("not JSON: {e}")))?;

    let value = json
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AttemptError::MissingResultField {
            field: field.to_string(),
        })?;

    let url = base
        .join(value)
        .map_err(|e| AttemptError::InvalidResponse(format!("bad reference '{value}': {e}")))?;
    Ok(ResultReference::Remote { url })
}

fn header_str(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}\u{2026}")
    }
}
