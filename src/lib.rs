//! # docgen-client
//!
//! Upload a `.docx` document to a PDF generation service, retry transient
//! failures, then preview and download the generated PDF.
//!
//! ## Flow
//!
//! ```text
//! .docx
//!  │
//!  ├─ 1. Select    declared media type must be the DOCX MIME type
//!  ├─ 2. Submit    multipart POST, up to N sequential attempts
//!  ├─ 3. State     Idle → Loading → Succeeded | Failed
//!  ├─ 4. Fetch     follow the result reference (or take inline bytes)
//!  └─ 5. Preview   rasterise page 1 (feature `preview`)
//! ```
//!
//! The [`UploadController`] owns the [`UploadState`]; every operation
//! returns a snapshot of it, with failures in its error slot rather than as
//! `Err`. Observers ([`UploadObserver`]) receive each transition.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docgen_client::{fetch_artifact, save_artifact, ClientConfig, SelectedFile, UploadController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .endpoint("http://localhost:8000/generate_document")
//!         .max_attempts(3)
//!         .build()?;
//!     let controller = UploadController::new(config)?;
//!
//!     controller.select_file(SelectedFile::from_path("brief.docx").await?);
//!     let result = controller.submit().await.into_result()?;
//!
//!     let pdf = fetch_artifact(&result, 120).await?;
//!     save_artifact(&pdf, "out/".as_ref()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `docgen` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `preview` | on      | First-page PNG preview through pdfium-render |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod observer;
#[cfg(feature = "preview")]
pub mod preview;
pub mod state;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{fetch_artifact, save_artifact, Artifact};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_ENDPOINT};
pub use controller::UploadController;
pub use document::{SelectedFile, DOCX_MEDIA_TYPE};
pub use error::{AttemptError, UploadError};
pub use observer::{NoopObserver, SharedObserver, UploadObserver};
#[cfg(feature = "preview")]
pub use preview::{render_first_page, write_preview, Preview};
pub use state::{FailureCause, ResultReference, UploadState, UploadStatus};
pub use transport::{ConversionTransport, HttpTransport};
