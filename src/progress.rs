//! Progress-callback trait for per-page OCR events.
//!
//! Inject an [`Arc<dyn OcrProgressCallback>`] via
//! [`crate::config::OcrConfigBuilder::progress_callback`] to receive events as
//! the pipeline works through a document.
//!
//! Events are always delivered from the task that assembles the transcript,
//! in page order, so `on_progress` values are non-decreasing and the last one
//! is exactly `1.0`. Recognition may run concurrently, but callbacks do not.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfocr::{OcrConfig, OcrProgressCallback};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Recorder(Mutex<Vec<f32>>);
//!
//! impl OcrProgressCallback for Recorder {
//!     fn on_progress(&self, fraction: f32) {
//!         self.0.lock().unwrap().push(fraction);
//!     }
//! }
//!
//! let config = OcrConfig::builder()
//!     .progress_callback(Arc::new(Recorder::default()))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait OcrProgressCallback: Send + Sync {
    /// Called once before the first page.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a page is about to be resolved (extracted or recognised).
    ///
    /// # Arguments
    /// * `page_num`    : 1-indexed page number
    /// * `total_pages` : total pages in the document
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page produced text.
    ///
    /// # Arguments
    /// * `page_num`  : 1-indexed page number
    /// * `text_len`  : byte length of the page's transcript text
    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (page_num, total_pages, text_len);
    }

    /// Called when a page ended with a per-page failure.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Completed fraction of the document in `[0, 1]`, after each page.
    fn on_progress(&self, fraction: f32) {
        let _ = fraction;
    }

    /// Called once after every page has a result.
    ///
    /// # Arguments
    /// * `success_count` : pages that ended with text (extracted or recognised)
    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl OcrProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::OcrConfig`].
pub type ProgressCallback = Arc<dyn OcrProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        completes: AtomicUsize,
        errors: AtomicUsize,
        fractions: Mutex<Vec<f32>>,
    }

    impl OcrProgressCallback for TrackingCallback {
        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _text_len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_progress(&self, fraction: f32) {
            self.fractions.lock().unwrap().push(fraction);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2);
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, 10);
        cb.on_page_error(2, 2, "render failed");
        cb.on_progress(1.0);
        cb.on_run_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = Arc::new(TrackingCallback::default());
        let cb: ProgressCallback = tracker.clone();
        cb.on_page_complete(1, 2, 5);
        cb.on_progress(0.5);
        cb.on_page_error(2, 2, "empty");
        cb.on_progress(1.0);

        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.fractions.lock().unwrap(), vec![0.5, 1.0]);
    }
}
