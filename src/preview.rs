//! First-page preview of the generated PDF via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not run on Tokio worker threads. Every call here moves the
//! work onto the blocking pool.
//!
//! ## Binding
//!
//! `PDFIUM_LIB_PATH` (a file or the directory holding the library) wins;
//! otherwise the system library search path is used. A missing library is a
//! [`UploadError::PreviewFailed`], never a panic.

use crate::config::clamp_preview_pixels;
use crate::error::UploadError;
use image::ImageFormat;
use pdfium_render::prelude::*;
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable pointing at an existing pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rendered first page plus what the document header says about itself.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    /// PNG-encoded first page.
    #[serde(skip)]
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub page_count: usize,
    pub title: Option<String>,
}

/// Rasterise the first page of `pdf` to a PNG no larger than `max_pixels`
/// on its longest edge. `max_pixels` is clamped to the same range as
/// [`ClientConfigBuilder::preview_max_pixels`](crate::ClientConfigBuilder::preview_max_pixels).
pub async fn render_first_page(pdf: &[u8], max_pixels: u32) -> Result<Preview, UploadError> {
    let bytes = pdf.to_vec();
    tokio::task::spawn_blocking(move || render_first_page_blocking(&bytes, max_pixels))
        .await
        .map_err(|e| UploadError::Internal(format!("Preview task panicked: {e}")))?
}

/// Render the preview and write the PNG to `dest`.
pub async fn write_preview(
    pdf: &[u8],
    max_pixels: u32,
    dest: &Path,
) -> Result<Preview, UploadError> {
    let preview = render_first_page(pdf, max_pixels).await?;
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| UploadError::OutputWriteFailed {
                path: dest.to_path_buf(),
                source: e,
            })?;
    }
    tokio::fs::write(dest, &preview.png)
        .await
        .map_err(|e| UploadError::OutputWriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;
    info!(
        "Preview of page 1/{} written to {} ({}x{} px)",
        preview.page_count,
        dest.display(),
        preview.width,
        preview.height
    );
    Ok(preview)
}

fn bind() -> Result<Pdfium, UploadError> {
    let bindings = match std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        Some(p) => {
            let p = PathBuf::from(p);
            let lib = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| {
        UploadError::PreviewFailed(format!(
            "pdfium library not available ({e:?}); set {PDFIUM_LIB_PATH_ENV}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn edge_pixels(max_pixels: u32) -> i32 {
    // Both bounds fit in an i32.
    clamp_preview_pixels(max_pixels) as i32
}

fn render_first_page_blocking(pdf: &[u8], max_pixels: u32) -> Result<Preview, UploadError> {
    if !pdf.starts_with(b"%PDF") {
        return Err(UploadError::PreviewFailed(
            "generated document is not a PDF".into(),
        ));
    }

    let pdfium = bind()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(|e| UploadError::PreviewFailed(format!("cannot open PDF: {e:?}")))?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    let page = pages
        .get(0)
        .map_err(|e| UploadError::PreviewFailed(format!("document has no first page: {e:?}")))?;

    let edge = edge_pixels(max_pixels);
    let render_config = PdfRenderConfig::new()
        .set_target_width(edge)
        .set_maximum_height(edge);
    let image = page
        .render_with_config(&render_config)
        .map_err(|e| UploadError::PreviewFailed(format!("rasterisation failed: {e:?}")))?
        .as_image();

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| UploadError::PreviewFailed(format!("PNG encoding failed: {e}")))?;

    let title = document
        .metadata()
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_string())
        .filter(|t| !t.is_empty());

    debug!(
        "Rendered page 1 → {}x{} px, {} bytes PNG",
        image.width(),
        image.height(),
        png.len()
    );

    Ok(Preview {
        width: image.width(),
        height: image.height(),
        png,
        page_count,
        title,
    })
}
