//! Observer trait for upload events.
//!
//! Inject an [`Arc<dyn UploadObserver>`] via
//! [`crate::config::ClientConfigBuilder::observer`] to drive a view from the
//! controller: every state transition and every attempt is reported.
//!
//! # Example
//!
//! ```rust
//! use docgen_client::{ClientConfig, UploadObserver, UploadState};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     failures: AtomicUsize,
//! }
//!
//! impl UploadObserver for CountingObserver {
//!     fn on_attempt_failed(&self, attempt: u32, max_attempts: u32, error: &str) {
//!         self.failures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("attempt {attempt}/{max_attempts} failed: {error}");
//!     }
//! }
//!
//! let config = ClientConfig::builder()
//!     .observer(Arc::new(CountingObserver { failures: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::state::UploadState;
use std::sync::Arc;

/// Called by the controller as the upload progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Methods are invoked without the controller's state
/// lock held, so implementations may read the controller.
pub trait UploadObserver: Send + Sync {
    /// Called after every state transition with the new state.
    fn on_state_change(&self, state: &UploadState) {
        let _ = state;
    }

    /// Called just before attempt `attempt` (1-indexed) is sent.
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        let _ = (attempt, max_attempts);
    }

    /// Called when an attempt fails, whether or not another follows.
    fn on_attempt_failed(&self, attempt: u32, max_attempts: u32, error: &str) {
        let _ = (attempt, max_attempts, error);
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopObserver;

impl UploadObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ClientConfig`].
pub type SharedObserver = Arc<dyn UploadObserver>;
