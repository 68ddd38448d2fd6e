//! The upload controller: file selection, submission and the retry loop.
//!
//! ## State machine
//!
//! ```text
//!            select(ok) ┌──────┐ select(bad) / submit(no file)
//!         ┌────────────▶│ Idle │──────────────────────┐
//!         │             └──┬───┘                      ▼
//!         │                │ submit            ┌────────┐
//!         │                ▼                   │ Failed │
//!         │           ┌─────────┐ exhausted    └────────┘
//!         │           │ Loading │─────────────────▲  │
//!         │           └────┬────┘                 │  │ submit
//!         │                │ success              │  ▼
//!         │                ▼                      │ Loading …
//!         │          ┌───────────┐                │
//!         └──────────│ Succeeded │── submit ──▶ Loading …
//!                    └───────────┘
//! ```
//!
//! ## Loading is released by a guard
//!
//! The retry loop returns from the middle on success. Instead of resetting
//! the flag on every branch, entering Loading hands out a [`LoadingGuard`];
//! the loop settles it with the terminal state, and if the future is dropped
//! (caller cancelled, task aborted, panic) the guard's `Drop` records
//! [`FailureCause::Interrupted`]. Loading therefore never outlives the
//! attempt sequence.
//!
//! ## Single flight
//!
//! The state lock is never held across an `.await`, so a shared controller
//! can receive `submit` and `select_file` while an upload is in flight. Both
//! are ignored until the upload settles.

use crate::config::ClientConfig;
use crate::document::SelectedFile;
use crate::error::UploadError;
use crate::observer::SharedObserver;
use crate::state::{FailureCause, UploadState};
use crate::transport::{ConversionTransport, HttpTransport};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct Inner {
    state: UploadState,
    file: Option<Arc<SelectedFile>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mediates between user input, the conversion service and the view.
///
/// Every operation returns a snapshot of the resulting [`UploadState`];
/// errors end up in its error slot and are never returned as `Err`.
///
/// # Example
/// ```rust,no_run
/// use docgen_client::{ClientConfig, SelectedFile, UploadController};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let controller = UploadController::new(ClientConfig::default())?;
/// controller.select_file(SelectedFile::from_path("brief.docx").await?);
/// let state = controller.submit().await;
/// if let Some(result) = state.result() {
///     println!("PDF ready: {result}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct UploadController<T: ConversionTransport = HttpTransport> {
    transport: T,
    config: ClientConfig,
    inner: Mutex<Inner>,
}

impl UploadController<HttpTransport> {
    /// Controller talking HTTP to `config.endpoint`.
    pub fn new(config: ClientConfig) -> Result<Self, UploadError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: ConversionTransport> UploadController<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            transport,
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> UploadState {
        lock(&self.inner).state.clone()
    }

    /// The file the next submit will upload.
    pub fn selected_file(&self) -> Option<Arc<SelectedFile>> {
        lock(&self.inner).file.clone()
    }

    /// Accept a user-chosen file if it declares the accepted media type.
    ///
    /// A rejected file leaves the previous selection in place. An accepted
    /// one clears a pending error; a previous result stays visible until
    /// the next submit. Ignored while an upload is in flight.
    pub fn select_file(&self, file: SelectedFile) -> UploadState {
        let state = {
            let mut inner = lock(&self.inner);
            if inner.state.is_loading() {
                warn!(
                    "Ignoring selection of '{}': an upload is in progress",
                    file.file_name()
                );
                return inner.state.clone();
            }

            if file.has_media_type(&self.config.accepted_media_type) {
                debug!("Selected '{}' ({} bytes)", file.file_name(), file.len());
                inner.file = Some(Arc::new(file));
                if matches!(inner.state, UploadState::Failed { .. }) {
                    inner.state = UploadState::Idle;
                }
            } else {
                warn!(
                    "Rejected '{}': media type {} is not {}",
                    file.file_name(),
                    file.media_type(),
                    self.config.accepted_media_type
                );
                inner.state = UploadState::failed(FailureCause::WrongMediaType {
                    file_name: file.file_name().to_string(),
                    media_type: file.media_type().to_string(),
                });
            }
            inner.state.clone()
        };
        self.notify(&state);
        state
    }

    /// Upload the selected file with the configured attempt bound.
    pub async fn submit(&self) -> UploadState {
        self.submit_with_attempts(self.config.max_attempts).await
    }

    /// Upload the selected file, trying at most `max_attempts` times.
    ///
    /// Without a selected file the state becomes Failed and no request is
    /// made. While another upload is in flight the call is a no-op.
    pub async fn submit_with_attempts(&self, max_attempts: u32) -> UploadState {
        let max_attempts = max_attempts.max(1);

        let acquired = {
            let mut inner = lock(&self.inner);
            if inner.state.is_loading() {
                warn!("Ignoring submit: an upload is already in progress");
                return inner.state.clone();
            }
            match inner.file.clone() {
                None => {
                    inner.state = UploadState::failed(FailureCause::NoFileSelected);
                    Err(inner.state.clone())
                }
                Some(file) => {
                    inner.state = UploadState::Loading {
                        attempt: 1,
                        max_attempts,
                    };
                    Ok((file, inner.state.clone()))
                }
            }
        };

        match acquired {
            Err(state) => {
                warn!("Submit without a selected file");
                self.notify(&state);
                state
            }
            Ok((file, loading)) => {
                let guard = LoadingGuard {
                    inner: &self.inner,
                    observer: self.config.observer.as_ref(),
                    settled: false,
                };
                self.notify(&loading);
                self.upload_with_retry(guard, &file, max_attempts).await
            }
        }
    }

    /// Sequential attempts with a fixed delay and no backoff.
    async fn upload_with_retry(
        &self,
        guard: LoadingGuard<'_>,
        file: &SelectedFile,
        max_attempts: u32,
    ) -> UploadState {
        info!(
            "Uploading '{}' ({} bytes), up to {} attempts",
            file.file_name(),
            file.len(),
            max_attempts
        );

        let delay = self.config.retry_delay();
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                guard.set_attempt(attempt, max_attempts);
            }
            if let Some(o) = &self.config.observer {
                o.on_attempt_start(attempt, max_attempts);
            }

            match self.transport.submit(file).await {
                Ok(result) => {
                    info!("Attempt {}/{} succeeded: {}", attempt, max_attempts, result);
                    return guard.settle(UploadState::Succeeded {
                        result,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!("Attempt {}/{} failed: {}", attempt, max_attempts, last_error);
                    if let Some(o) = &self.config.observer {
                        o.on_attempt_failed(attempt, max_attempts, &last_error);
                    }
                }
            }
        }

        error!(
            "All {} attempts failed; last error: {}",
            max_attempts, last_error
        );
        guard.settle(UploadState::failed(FailureCause::Exhausted {
            attempts: max_attempts,
            last_error,
        }))
    }

    fn notify(&self, state: &UploadState) {
        if let Some(o) = &self.config.observer {
            o.on_state_change(state);
        }
    }
}

/// Ownership of the Loading state for one attempt sequence.
///
/// `settle` records the terminal state; dropping an unsettled guard records
/// [`FailureCause::Interrupted`].
struct LoadingGuard<'a> {
    inner: &'a Mutex<Inner>,
    observer: Option<&'a SharedObserver>,
    settled: bool,
}

impl LoadingGuard<'_> {
    fn set_attempt(&self, attempt: u32, max_attempts: u32) {
        let state = UploadState::Loading {
            attempt,
            max_attempts,
        };
        lock(self.inner).state = state.clone();
        if let Some(o) = self.observer {
            o.on_state_change(&state);
        }
    }

    fn settle(mut self, state: UploadState) -> UploadState {
        debug_assert!(state.is_terminal());
        lock(self.inner).state = state.clone();
        self.settled = true;
        if let Some(o) = self.observer {
            o.on_state_change(&state);
        }
        state
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let state = {
            let mut inner = lock(self.inner);
            if !inner.state.is_loading() {
                return;
            }
            inner.state = UploadState::failed(FailureCause::Interrupted);
            inner.state.clone()
        };
        warn!("Upload interrupted before completion");
        if let Some(o) = self.observer {
            o.on_state_change(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DOCX_MEDIA_TYPE;
    use crate::error::{AttemptError, EXHAUSTED_MESSAGE, NO_FILE_MESSAGE, WRONG_TYPE_MESSAGE};
    use crate::observer::UploadObserver;
    use crate::state::{ResultReference, UploadStatus};
    use async_trait::async_trait;
    use reqwest::Url;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Replays a fixed list of outcomes, one per call.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<ResultReference, AttemptError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<ResultReference, AttemptError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConversionTransport for ScriptedTransport {
        async fn submit(&self, _file: &SelectedFile) -> Result<ResultReference, AttemptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AttemptError::Transport("script exhausted".into())))
        }
    }

    /// Blocks every call until released.
    struct GatedTransport {
        entered: Notify,
        release: Notify,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ConversionTransport for GatedTransport {
        async fn submit(&self, _file: &SelectedFile) -> Result<ResultReference, AttemptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(reference("http://localhost:8000/gated.pdf"))
        }
    }

    #[derive(Default)]
    struct StateLog(Mutex<Vec<UploadStatus>>);

    impl UploadObserver for StateLog {
        fn on_state_change(&self, state: &UploadState) {
            self.0.lock().unwrap().push(state.status());
        }
    }

    fn reference(url: &str) -> ResultReference {
        ResultReference::Remote {
            url: Url::parse(url).unwrap(),
        }
    }

    fn fail() -> Result<ResultReference, AttemptError> {
        Err(AttemptError::Status {
            status: 500,
            body: "Error processing files".into(),
        })
    }

    fn docx(name: &str) -> SelectedFile {
        SelectedFile::new(name, DOCX_MEDIA_TYPE, b"PK\x03\x04".to_vec())
    }

    fn controller(
        script: Vec<Result<ResultReference, AttemptError>>,
    ) -> UploadController<ScriptedTransport> {
        UploadController::with_transport(ClientConfig::default(), ScriptedTransport::new(script))
    }

    #[test]
    fn rejects_wrong_type_and_keeps_previous_file() {
        let c = controller(vec![]);
        c.select_file(docx("first.docx"));

        for (name, media) in [
            ("notes.txt", "text/plain"),
            ("old.doc", "application/msword"),
            ("out.pdf", "application/pdf"),
            ("blob", ""),
        ] {
            let state = c.select_file(SelectedFile::new(name, media, vec![1, 2, 3]));
            assert_eq!(state.error(), Some(WRONG_TYPE_MESSAGE), "{name}");
            assert_eq!(c.selected_file().unwrap().file_name(), "first.docx");
        }
    }

    #[test]
    fn valid_selection_clears_error() {
        let c = controller(vec![]);
        c.select_file(SelectedFile::new("x.txt", "text/plain", vec![]));
        assert_eq!(c.state().status(), UploadStatus::Failed);

        let state = c.select_file(docx("ok.docx"));
        assert_eq!(state, UploadState::Idle);
        assert!(state.error().is_none());
    }

    #[test]
    fn submit_without_file_makes_no_call() {
        let c = controller(vec![Ok(reference("http://x/never.pdf"))]);
        let state = tokio_test::block_on(c.submit());

        assert_eq!(state.error(), Some(NO_FILE_MESSAGE));
        assert!(!state.is_loading());
        assert_eq!(c.transport().calls(), 0);
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let c = controller(vec![fail(), fail(), Ok(reference("http://localhost:8000/3.pdf"))]);
        c.select_file(docx("brief.docx"));

        let state = c.submit().await;
        assert_eq!(c.transport().calls(), 3);
        assert_eq!(state.status(), UploadStatus::Succeeded);
        assert_eq!(
            state.result(),
            Some(&reference("http://localhost:8000/3.pdf"))
        );
        assert!(state.error().is_none());
        assert!(!c.state().is_loading());
    }

    #[tokio::test]
    async fn success_stops_retrying() {
        let c = controller(vec![Ok(reference("http://x/1.pdf")), Ok(reference("http://x/2.pdf"))]);
        c.select_file(docx("brief.docx"));

        let state = c.submit().await;
        assert_eq!(c.transport().calls(), 1);
        assert_eq!(state.result(), Some(&reference("http://x/1.pdf")));
    }

    #[tokio::test]
    async fn fails_after_three_attempts() {
        let c = controller(vec![fail(), fail(), fail(), Ok(reference("http://x/late.pdf"))]);
        c.select_file(docx("brief.docx"));

        let state = c.submit().await;
        assert_eq!(c.transport().calls(), 3);
        assert_eq!(state.error(), Some(EXHAUSTED_MESSAGE));
        assert!(state.result().is_none());
        assert!(!c.state().is_loading());

        let err = state.into_result().unwrap_err();
        assert!(err.to_string().contains("HTTP 500"), "{err}");
    }

    #[tokio::test]
    async fn explicit_attempt_bound() {
        let c = controller(vec![fail(), fail(), fail(), fail(), Ok(reference("http://x/5.pdf"))]);
        c.select_file(docx("brief.docx"));

        let state = c.submit_with_attempts(5).await;
        assert_eq!(c.transport().calls(), 5);
        assert_eq!(state.status(), UploadStatus::Succeeded);
    }

    #[tokio::test]
    async fn new_submit_clears_previous_result() {
        let log = Arc::new(StateLog::default());
        let config = ClientConfig::builder()
            .max_attempts(1)
            .observer(log.clone())
            .build()
            .unwrap();
        let c = UploadController::with_transport(
            config,
            ScriptedTransport::new(vec![Ok(reference("http://x/1.pdf")), fail()]),
        );
        c.select_file(docx("brief.docx"));

        assert_eq!(c.submit().await.status(), UploadStatus::Succeeded);
        let second = c.submit().await;
        assert_eq!(second.status(), UploadStatus::Failed);
        assert!(second.result().is_none());

        assert_eq!(
            *log.0.lock().unwrap(),
            vec![
                UploadStatus::Idle,
                UploadStatus::Loading,
                UploadStatus::Succeeded,
                UploadStatus::Loading,
                UploadStatus::Failed,
            ]
        );
    }

    #[tokio::test]
    async fn retry_delay_is_applied_between_attempts() {
        let config = ClientConfig::builder().retry_delay_ms(30).build().unwrap();
        let c = UploadController::with_transport(
            config,
            ScriptedTransport::new(vec![fail(), fail(), fail()]),
        );
        c.select_file(docx("brief.docx"));

        let start = std::time::Instant::now();
        c.submit().await;
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn single_flight_while_loading() {
        let transport = GatedTransport {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicU32::new(0),
        };
        let c = Arc::new(UploadController::with_transport(
            ClientConfig::default(),
            transport,
        ));
        c.select_file(docx("first.docx"));

        let running = tokio::spawn({
            let c = Arc::clone(&c);
            async move { c.submit().await }
        });
        c.transport().entered.notified().await;
        assert!(c.state().is_loading());

        let again = c.submit().await;
        assert!(again.is_loading());
        let reselect = c.select_file(docx("second.docx"));
        assert!(reselect.is_loading());
        assert_eq!(c.selected_file().unwrap().file_name(), "first.docx");

        c.transport().release.notify_one();
        let state = running.await.unwrap();
        assert_eq!(state.status(), UploadStatus::Succeeded);
        assert_eq!(c.transport().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn aborted_upload_clears_loading() {
        let transport = GatedTransport {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicU32::new(0),
        };
        let c = Arc::new(UploadController::with_transport(
            ClientConfig::default(),
            transport,
        ));
        c.select_file(docx("brief.docx"));

        let running = tokio::spawn({
            let c = Arc::clone(&c);
            async move { c.submit().await }
        });
        c.transport().entered.notified().await;
        running.abort();
        assert!(running.await.unwrap_err().is_cancelled());

        let state = c.state();
        assert!(!state.is_loading());
        assert!(matches!(
            state,
            UploadState::Failed {
                cause: FailureCause::Interrupted,
                ..
            }
        ));
    }
}
