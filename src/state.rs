//! The UI-visible upload state and the result reference it may carry.
//!
//! [`UploadState`] is the only mutable thing the controller owns. Making it a
//! single enum means "error and result both set" or "loading and failed at
//! once" cannot be represented at all: the error message exists only inside
//! [`UploadState::Failed`], the result only inside [`UploadState::Succeeded`].

use crate::error::{
    UploadError, EXHAUSTED_MESSAGE, INTERRUPTED_MESSAGE, NO_FILE_MESSAGE, WRONG_TYPE_MESSAGE,
};
use reqwest::Url;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Where the generated document can be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultReference {
    /// The service returned a URL (or path, already resolved) to the artifact.
    Remote {
        #[serde(serialize_with = "serialize_url")]
        url: Url,
    },
    /// The service returned the document itself.
    Inline {
        file_name: String,
        #[serde(rename = "size", serialize_with = "serialize_len")]
        bytes: Arc<[u8]>,
    },
}

impl ResultReference {
    /// A short human-readable label: the URL, or the inline file name.
    pub fn label(&self) -> String {
        match self {
            ResultReference::Remote { url } => url.to_string(),
            ResultReference::Inline { file_name, bytes } => {
                format!("{file_name} ({} bytes, inline)", bytes.len())
            }
        }
    }

    /// The remote URL, if any.
    pub fn url(&self) -> Option<&Url> {
        match self {
            ResultReference::Remote { url } => Some(url),
            ResultReference::Inline { .. } => None,
        }
    }
}

impl fmt::Display for ResultReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn serialize_url<S: Serializer>(url: &Url, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(url.as_str())
}

fn serialize_len<S: Serializer>(bytes: &Arc<[u8]>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(bytes.len() as u64)
}

/// Why an upload ended in [`UploadState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    WrongMediaType { file_name: String, media_type: String },
    NoFileSelected,
    Exhausted { attempts: u32, last_error: String },
    Interrupted,
}

impl FailureCause {
    /// The one message the view shows for this failure.
    pub fn message(&self) -> &'static str {
        match self {
            FailureCause::WrongMediaType { .. } => WRONG_TYPE_MESSAGE,
            FailureCause::NoFileSelected => NO_FILE_MESSAGE,
            FailureCause::Exhausted { .. } => EXHAUSTED_MESSAGE,
            FailureCause::Interrupted => INTERRUPTED_MESSAGE,
        }
    }

    /// Validation failures never touched the network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FailureCause::WrongMediaType { .. } | FailureCause::NoFileSelected
        )
    }
}

impl From<FailureCause> for UploadError {
    fn from(cause: FailureCause) -> Self {
        match cause {
            FailureCause::WrongMediaType {
                file_name,
                media_type,
            } => UploadError::WrongMediaType {
                file_name,
                media_type,
            },
            FailureCause::NoFileSelected => UploadError::NoFileSelected,
            FailureCause::Exhausted {
                attempts,
                last_error,
            } => UploadError::AttemptsExhausted {
                attempts,
                last_error,
            },
            FailureCause::Interrupted => UploadError::Interrupted,
        }
    }
}

/// Discriminant of [`UploadState`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStatus::Idle => "idle",
            UploadStatus::Loading => "loading",
            UploadStatus::Succeeded => "succeeded",
            UploadStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the view renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadState {
    /// Nothing submitted yet, or a validation error was cleared.
    #[default]
    Idle,
    /// An attempt sequence is in flight.
    Loading { attempt: u32, max_attempts: u32 },
    /// The service produced a document.
    Succeeded {
        result: ResultReference,
        attempts: u32,
    },
    /// Validation failed, or every attempt failed.
    Failed {
        message: String,
        #[serde(flatten)]
        cause: FailureCause,
    },
}

impl UploadState {
    pub(crate) fn failed(cause: FailureCause) -> Self {
        UploadState::Failed {
            message: cause.message().to_string(),
            cause,
        }
    }

    pub fn status(&self) -> UploadStatus {
        match self {
            UploadState::Idle => UploadStatus::Idle,
            UploadState::Loading { .. } => UploadStatus::Loading,
            UploadState::Succeeded { .. } => UploadStatus::Succeeded,
            UploadState::Failed { .. } => UploadStatus::Failed,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, UploadState::Loading { .. })
    }

    /// Succeeded or Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadState::Succeeded { .. } | UploadState::Failed { .. }
        )
    }

    /// The error slot.
    pub fn error(&self) -> Option<&str> {
        match self {
            UploadState::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// The result slot.
    pub fn result(&self) -> Option<&ResultReference> {
        match self {
            UploadState::Succeeded { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Convert a terminal state into a `Result` for callers that want `?`.
    pub fn into_result(self) -> Result<ResultReference, UploadError> {
        match self {
            UploadState::Succeeded { result, .. } => Ok(result),
            UploadState::Failed { cause, .. } => Err(cause.into()),
            other => Err(UploadError::NotFinished {
                state: other.status().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(s: &str) -> ResultReference {
        ResultReference::Remote {
            url: Url::parse(s).unwrap(),
        }
    }

    #[test]
    fn default_is_idle() {
        let s = UploadState::default();
        assert_eq!(s.status(), UploadStatus::Idle);
        assert!(s.error().is_none());
        assert!(s.result().is_none());
        assert!(!s.is_loading());
    }

    #[test]
    fn slots_are_exclusive() {
        let states = [
            UploadState::Idle,
            UploadState::Loading {
                attempt: 1,
                max_attempts: 3,
            },
            UploadState::Succeeded {
                result: remote("http://localhost:8000/out.pdf"),
                attempts: 1,
            },
            UploadState::failed(FailureCause::NoFileSelected),
        ];
        for s in &states {
            assert!(!(s.error().is_some() && s.result().is_some()), "{s:?}");
            if s.is_loading() {
                assert!(!s.is_terminal());
            }
        }
    }

    #[test]
    fn failed_carries_user_message() {
        let s = UploadState::failed(FailureCause::Exhausted {
            attempts: 3,
            last_error: "HTTP 500".into(),
        });
        assert_eq!(s.error(), Some(EXHAUSTED_MESSAGE));
    }

    #[test]
    fn into_result_maps_causes() {
        let ok = UploadState::Succeeded {
            result: remote("http://x/y.pdf"),
            attempts: 2,
        };
        assert!(ok.into_result().is_ok());

        let err = UploadState::failed(FailureCause::NoFileSelected)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, UploadError::NoFileSelected));

        let err = UploadState::Idle.into_result().unwrap_err();
        assert!(err.to_string().contains("idle"));
    }

    #[test]
    fn serialises_with_status_tag() {
        let s = UploadState::Succeeded {
            result: ResultReference::Inline {
                file_name: "processed_files.pdf".into(),
                bytes: Arc::from(&b"%PDF-1.7"[..]),
            },
            attempts: 1,
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["result"]["kind"], "inline");
        assert_eq!(json["result"]["size"], 8);

        let f = UploadState::failed(FailureCause::NoFileSelected);
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["cause"], "no_file_selected");
        assert_eq!(json["message"], NO_FILE_MESSAGE);
    }

    #[test]
    fn validation_causes() {
        assert!(FailureCause::NoFileSelected.is_validation());
        assert!(!FailureCause::Interrupted.is_validation());
    }
}
