//! Progress-callback trait for per-request batch events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GeneratorConfigBuilder::progress_callback`] to receive
//! events as [`crate::generate_batch`] / [`crate::generate_stream`] work
//! through their requests.
//!
//! # Why callbacks instead of channels?
//!
//! A chat bot wants to edit a "3 of 10 letters ready" message, a CLI wants a
//! progress bar, a web service wants a database row. A callback lets each
//! forward events however it likes without the library knowing. The trait
//! is `Send + Sync` because requests run concurrently.
//!
//! # Example
//!
//! ```rust
//! use letterfill::{GenerationProgressCallback, GeneratorConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_request_complete(&self, index: usize, file_name: &str, bytes: u64) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("#{index}: {file_name} ({bytes} bytes), {done} done");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = GeneratorConfig::builder()
//!     .progress_callback(counter as Arc<dyn GenerationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by batch generation as each request progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_request_start`, `on_request_complete` and `on_request_error` may be
/// called concurrently from different tasks, in any order across requests.
/// Protect shared mutable state with `Mutex` / atomics.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once before any request starts.
    ///
    /// # Arguments
    /// * `total` — number of requests submitted
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a request begins.
    ///
    /// # Arguments
    /// * `index`  — 0-based position in the submitted list
    /// * `client` — the request's client name
    fn on_request_start(&self, index: usize, client: &str) {
        let _ = (index, client);
    }

    /// Called when a request produced its letter.
    ///
    /// # Arguments
    /// * `index`     — 0-based position in the submitted list
    /// * `file_name` — suggested output file name
    /// * `bytes`     — size of the produced document
    fn on_request_complete(&self, index: usize, file_name: &str, bytes: u64) {
        let _ = (index, file_name, bytes);
    }

    /// Called when a request failed.
    ///
    /// # Arguments
    /// * `index` — 0-based position in the submitted list
    /// * `error` — human-readable error description
    fn on_request_error(&self, index: usize, error: &str) {
        let _ = (index, error);
    }

    /// Called once after every request has finished (batch API only).
    ///
    /// # Arguments
    /// * `total`         — number of requests submitted
    /// * `success_count` — requests that produced a letter
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GeneratorConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
