//! The user-selected input document.
//!
//! A browser file picker hands over a name, the bytes and a *declared*
//! media type derived from the file extension. [`SelectedFile::from_path`]
//! reproduces that for files on disk so validation behaves the same way:
//! a `.txt` renamed to `.docx` is accepted, a real `.docx` renamed to `.bin`
//! is not.

use crate::error::UploadError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Media type of an Office Open XML word-processing document.
pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Fallback for unknown extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Local file header of a ZIP archive; every `.docx` starts with it.
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// A file chosen by the user, held in memory for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    file_name: String,
    media_type: String,
    bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Build a file whose declared media type comes from its name.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let media_type = media_type_for_name(&file_name).to_string();
        Self::new(file_name, media_type, bytes)
    }

    /// Read a file from disk.
    ///
    /// Fails only when the file cannot be read; the media type is not
    /// checked here.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| read_error(path, e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let file = Self::from_bytes(file_name, bytes);
        debug!(
            "Loaded {} ({} bytes, {})",
            path.display(),
            file.len(),
            file.media_type
        );
        if file.media_type == DOCX_MEDIA_TYPE && !file.looks_like_zip() {
            warn!(
                "{} has a .docx extension but is not a ZIP container; the service may reject it",
                path.display()
            );
        }
        Ok(file)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the declared media type matches `expected` (case-insensitive,
    /// parameters such as `; charset=` ignored).
    pub fn has_media_type(&self, expected: &str) -> bool {
        essence(&self.media_type).eq_ignore_ascii_case(essence(expected))
    }

    /// Whether the content starts with a ZIP local file header.
    pub fn looks_like_zip(&self) -> bool {
        self.bytes.len() >= 4 && self.bytes[..4] == ZIP_MAGIC
    }
}

/// Declared media type for a file name, by extension.
pub fn media_type_for_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("docx") => DOCX_MEDIA_TYPE,
        Some("doc") => "application/msword",
        Some("odt") => "application/vnd.oasis.opendocument.text",
        Some("rtf") => "application/rtf",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        _ => OCTET_STREAM,
    }
}

fn essence(media_type: &str) -> &str {
    media_type.split(';').next().unwrap_or("").trim()
}

fn read_error(path: &Path, e: std::io::Error) -> UploadError {
    let path: PathBuf = path.to_path_buf();
    match e.kind() {
        std::io::ErrorKind::NotFound => UploadError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => UploadError::PermissionDenied { path },
        _ => UploadError::ReadFailed { path, source: e },
    }
}
