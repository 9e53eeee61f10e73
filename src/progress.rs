//! Progress-callback trait for per-file batch events.
//!
//! Pass a [`ConversionProgressCallback`] to
//! [`crate::convert::convert_files_with_progress`] to receive events as each
//! input file is converted. The CLI drives an `indicatif` progress bar from
//! these events; a service could forward them to a channel instead.
//!
//! # Example
//!
//! ```rust
//! use mdpress::{ConversionProgressCallback, ConversionResult};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ConversionProgressCallback for Counter {
//!     fn on_file_complete(&self, result: &ConversionResult) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} done", result.input.display());
//!     }
//! }
//! ```

use crate::output::ConversionResult;
use std::path::Path;
use std::sync::Arc;

/// Called by the orchestrator as it works through a batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Files are converted one after another, so events
/// for one file never interleave with another's.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first file.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is read.
    ///
    /// # Arguments
    /// * `index`: 1-based position in the batch
    fn on_file_start(&self, path: &Path, index: usize, total_files: usize) {
        let _ = (path, index, total_files);
    }

    /// Called when a file converted successfully.
    fn on_file_complete(&self, result: &ConversionResult) {
        let _ = result;
    }

    /// Called when a file failed; the batch continues unless the error is fatal.
    fn on_file_error(&self, path: &Path, message: &str) {
        let _ = (path, message);
    }

    /// Called once after the last file was attempted.
    fn on_batch_complete(&self, total_files: usize, succeeded: usize) {
        let _ = (total_files, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Shared callback handle.
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
