//! The generated document: fetch it from its result reference and save it.
//!
//! Downloads are written atomically (temp file in the target directory, then
//! rename) so an interrupted run never leaves a truncated PDF behind. The
//! saved file name comes from `Content-Disposition`, then the last URL path
//! segment, then [`DEFAULT_FILE_NAME`].

use crate::config::clamp_timeout_secs;
use crate::error::UploadError;
use crate::state::ResultReference;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_FILE_NAME: &str = "document.pdf";

static FILENAME_STAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\*\s*=\s*(?:[\w!#$&+.^`|~-]+)?'[^']*'([^;]+)"#)
        .expect("valid regex")
});

static FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).expect("valid regex")
});

/// A downloaded (or inline) generated document.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Arc<[u8]>,
}

impl Artifact {
    /// Whether the content starts with the PDF magic bytes.
    pub fn is_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF")
    }
}

/// Extract the file name from a `Content-Disposition` header value.
///
/// RFC 5987 `filename*=` wins over plain `filename=`. Path components are
/// stripped so a hostile header cannot escape the output directory.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let raw = FILENAME_STAR
        .captures(value)
        .and_then(|c| c.get(1))
        .map(|m| percent_decode(m.as_str().trim()))
        .or_else(|| {
            FILENAME.captures(value).and_then(|c| {
                c.get(1)
                    .or_else(|| c.get(2))
                    .map(|m| m.as_str().to_string())
            })
        })?;
    sanitize(&raw)
}

/// Last non-empty path segment of `url` if it looks like a file name.
pub fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() || !last.contains('.') {
        return None;
    }
    sanitize(&percent_decode(last))
}

fn sanitize(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Resolve a result reference to the document bytes.
///
/// Inline references are returned as-is; remote ones are downloaded. The
/// timeout is raised to at least one second.
pub async fn fetch_artifact(
    result: &ResultReference,
    timeout_secs: u64,
) -> Result<Artifact, UploadError> {
    match result {
        ResultReference::Inline { file_name, bytes } => Ok(Artifact {
            file_name: file_name.clone(),
            bytes: Arc::clone(bytes),
        }),
        ResultReference::Remote { url } => download(url, clamp_timeout_secs(timeout_secs)).await,
    }
}

async fn download(url: &Url, timeout_secs: u64) -> Result<Artifact, UploadError> {
    info!("Downloading generated document from: {}", url);

    let failed = |reason: String| UploadError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url.clone()).send().await.map_err(|e| {
        if e.is_timeout() {
            UploadError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let file_name = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition)
        .or_else(|| filename_from_url(url))
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

    let mut bytes = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                UploadError::DownloadTimeout {
                    url: url.to_string(),
                    secs: timeout_secs,
                }
            } else {
                failed(e.to_string())
            }
        })?;
        bytes.extend_from_slice(&chunk);
    }
    debug!("Downloaded {} bytes as '{}'", bytes.len(), file_name);

    let artifact = Artifact {
        file_name,
        bytes: Arc::from(bytes),
    };
    if !artifact.is_pdf() {
        warn!("Downloaded document from {} is not a PDF", url);
    }
    Ok(artifact)
}

/// Write `artifact` to `dest` atomically.
///
/// If `dest` is an existing directory the artifact's own file name is used
/// inside it. Returns the final path.
pub async fn save_artifact(artifact: &Artifact, dest: &Path) -> Result<PathBuf, UploadError> {
    let path = if tokio::fs::metadata(dest)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        dest.join(&artifact.file_name)
    } else {
        dest.to_path_buf()
    };

    let write_err = |source: std::io::Error| UploadError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await.map_err(write_err)?;

    let tmp = tempfile::Builder::new()
        .prefix(".docgen-")
        .suffix(".part")
        .tempfile_in(&parent)
        .map_err(write_err)?;
    let tmp_path = tmp.into_temp_path();

    tokio::fs::write(&tmp_path, &artifact.bytes[..])
        .await
        .map_err(write_err)?;
    tmp_path.persist(&path).map_err(|e| write_err(e.error))?;

    info!("Saved {} bytes to {}", artifact.bytes.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_quoted() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="processed_files.pdf""#).as_deref(),
            Some("processed_files.pdf")
        );
    }

    #[test]
    fn disposition_bare_and_case() {
        assert_eq!(
            filename_from_disposition("Attachment; FILENAME=out.pdf").as_deref(),
            Some("out.pdf")
        );
    }

    #[test]
    fn disposition_star_wins() {
        let v = r#"attachment; filename="fallback.pdf"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"#;
        assert_eq!(filename_from_disposition(v).as_deref(), Some("résumé.pdf"));
    }

    #[test]
    fn disposition_strips_paths() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="../../etc/passwd""#).as_deref(),
            Some("passwd")
        );
        assert_eq!(filename_from_disposition(r#"attachment; filename="..""#), None);
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[test]
    fn url_file_name() {
        let u = Url::parse("http://localhost:8000/files/report%201.pdf?x=1").unwrap();
        assert_eq!(filename_from_url(&u).as_deref(), Some("report 1.pdf"));

        let u = Url::parse("http://localhost:8000/files/").unwrap();
        assert_eq!(filename_from_url(&u), None);

        let u = Url::parse("http://localhost:8000/download").unwrap();
        assert_eq!(filename_from_url(&u), None);
    }

    #[test]
    fn percent_decode_leaves_malformed_sequences() {
        assert_eq!(percent_decode("a%2"), "a%2");
        assert_eq!(percent_decode("a%zz"), "a%zz");
        assert_eq!(percent_decode("%41b"), "Ab");
    }

    #[tokio::test]
    async fn inline_reference_needs_no_network() {
        let r = ResultReference::Inline {
            file_name: "processed_files.pdf".into(),
            bytes: Arc::from(&b"%PDF-1.7\n"[..]),
        };
        let a = fetch_artifact(&r, 1).await.unwrap();
        assert_eq!(a.file_name, "processed_files.pdf");
        assert!(a.is_pdf());
    }

    #[tokio::test]
    async fn save_into_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = Artifact {
            file_name: "out.pdf".into(),
            bytes: Arc::from(&b"%PDF-1.4 body"[..]),
        };

        let p = save_artifact(&a, dir.path()).await.unwrap();
        assert_eq!(p, dir.path().join("out.pdf"));
        assert_eq!(std::fs::read(&p).unwrap(), b"%PDF-1.4 body");

        let target = dir.path().join("nested/renamed.pdf");
        let p = save_artifact(&a, &target).await.unwrap();
        assert_eq!(p, target);
        assert!(target.exists());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
