//! Progress callbacks and the operator prompt.
//!
//! Inject an [`Arc<dyn CaptureProgressCallback>`] via
//! [`crate::config::CaptureConfigBuilder::progress_callback`] (or the build
//! equivalent) to receive events as the pipeline works through pages.
//! All methods default to no-ops so implementors override only what they
//! render.
//!
//! [`OperatorPrompt`] is the other direction: the orchestrator asks the
//! operator a question (resume or restart? is the viewer ready?). The CLI
//! answers on the terminal; tests answer with a fixed [`ResumeDecision`].
//!
//! # Example
//!
//! ```rust
//! use viewer2pdf::{CaptureProgressCallback, CaptureConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     captured: AtomicUsize,
//! }
//!
//! impl CaptureProgressCallback for CountingCallback {
//!     fn on_page_captured(&self, page: usize, total: usize, bytes: u64) {
//!         self.captured.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page}/{total}: {bytes} bytes");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { captured: AtomicUsize::new(0) });
//! let config = CaptureConfig::builder()
//!     .source_url("https://app.example.ch/#doc/1/1")
//!     .total_pages(10)
//!     .progress_callback(cb as Arc<dyn CaptureProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::CaptureSummary;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Called by the capture orchestrator for every page index it visits.
///
/// Capture is strictly sequential, so calls never overlap; the `Send + Sync`
/// bound lets the callback be shared with the CLI's progress bar.
pub trait CaptureProgressCallback: Send + Sync {
    /// Called once before the first index, with the number of indices to visit.
    fn on_capture_start(&self, pages_in_range: usize) {
        let _ = pages_in_range;
    }

    /// A page file already existed and was left untouched.
    fn on_page_skipped(&self, page: usize, total: usize) {
        let _ = (page, total);
    }

    /// A new page file was written (`bytes` is its final size).
    fn on_page_captured(&self, page: usize, total: usize, bytes: u64) {
        let _ = (page, total, bytes);
    }

    /// The page failed; the run continues with the next index.
    fn on_page_failed(&self, page: usize, total: usize, error: &str) {
        let _ = (page, total, error);
    }

    /// Called once after the last index.
    fn on_capture_complete(&self, summary: &CaptureSummary) {
        let _ = summary;
    }
}

/// The four strictly sequential build stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStage {
    Preprocess,
    Assemble,
    Recognize,
    Finalize,
}

impl BuildStage {
    /// 1-based position, for "Step n/4" displays.
    pub fn number(&self) -> usize {
        match self {
            BuildStage::Preprocess => 1,
            BuildStage::Assemble => 2,
            BuildStage::Recognize => 3,
            BuildStage::Finalize => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BuildStage::Preprocess => "Image preprocessing",
            BuildStage::Assemble => "Creating raw PDF",
            BuildStage::Recognize => "OCR text recognition",
            BuildStage::Finalize => "Finalizing PDF",
        }
    }
}

/// Called by the build orchestrator as it moves through its stages.
///
/// `on_image_processed` may fire concurrently from preprocessing workers.
pub trait BuildProgressCallback: Send + Sync {
    fn on_stage_start(&self, stage: BuildStage, images: usize) {
        let _ = (stage, images);
    }

    /// One image finished preprocessing; `done` counts completions so far.
    fn on_image_processed(&self, done: usize, total: usize) {
        let _ = (done, total);
    }

    fn on_stage_complete(&self, stage: BuildStage) {
        let _ = stage;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl CaptureProgressCallback for NoopProgressCallback {}
impl BuildProgressCallback for NoopProgressCallback {}

/// Alias matching the type stored in [`crate::config::CaptureConfig`].
pub type CaptureProgress = Arc<dyn CaptureProgressCallback>;

/// Alias matching the type stored in [`crate::config::BuildConfig`].
pub type BuildProgress = Arc<dyn BuildProgressCallback>;

// ── Operator prompt ──────────────────────────────────────────────────────

/// What to do with page files left over from an earlier run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeDecision {
    /// Delete every existing page file and capture from scratch.
    Restart,
    /// Keep existing page files; capture only the missing indices.
    Resume,
    /// Stop before any capture work.
    Cancel,
}

/// Questions the capture orchestrator puts to the operator.
pub trait OperatorPrompt: Send + Sync {
    /// `existing` page files were found and the run starts at index 1.
    fn resolve_existing(&self, existing: usize) -> ResumeDecision;

    /// The first page is loaded; block until the operator has logged in
    /// and arranged the viewer. Default: proceed immediately.
    fn confirm_ready(&self) {}
}

/// Answers every question with a fixed decision and never blocks.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub ResumeDecision);

impl OperatorPrompt for FixedDecision {
    fn resolve_existing(&self, _existing: usize) -> ResumeDecision {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        skipped: AtomicUsize,
        captured: AtomicUsize,
        failed: AtomicUsize,
    }

    impl CaptureProgressCallback for TrackingCallback {
        fn on_page_skipped(&self, _page: usize, _total: usize) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_captured(&self, _page: usize, _total: usize, _bytes: u64) {
            self.captured.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_failed(&self, _page: usize, _total: usize, _error: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        CaptureProgressCallback::on_capture_start(&cb, 5);
        cb.on_page_skipped(1, 5);
        cb.on_page_captured(2, 5, 1024);
        cb.on_page_failed(3, 5, "timeout");
        cb.on_stage_start(BuildStage::Preprocess, 5);
        cb.on_image_processed(1, 5);
        cb.on_stage_complete(BuildStage::Finalize);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            skipped: AtomicUsize::new(0),
            captured: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        };
        tracker.on_page_skipped(1, 3);
        tracker.on_page_captured(2, 3, 10);
        tracker.on_page_failed(3, 3, "HTTP 503");
        assert_eq!(tracker.skipped.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.captured.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stages_are_numbered_in_order() {
        let stages = [
            BuildStage::Preprocess,
            BuildStage::Assemble,
            BuildStage::Recognize,
            BuildStage::Finalize,
        ];
        let numbers: Vec<usize> = stages.iter().map(BuildStage::number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn fixed_decision_answers_consistently() {
        let prompt = FixedDecision(ResumeDecision::Cancel);
        assert_eq!(prompt.resolve_existing(3), ResumeDecision::Cancel);
        assert_eq!(prompt.resolve_existing(0), ResumeDecision::Cancel);
        prompt.confirm_ready();
    }
}
