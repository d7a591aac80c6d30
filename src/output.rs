//! Result types returned by capture and build runs.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Terminal state of one page index within a capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageState {
    /// A new file was written this run.
    Captured,
    /// The file already existed and was left untouched.
    Skipped,
    /// Navigation or screenshot failed; no file was written.
    Failed,
}

/// One page index as handled by a capture run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedPage {
    /// 1-indexed page number.
    pub index: usize,
    /// Where the page image lives (or would live, for failures).
    pub path: PathBuf,
    pub state: PageState,
    /// Set when `state == Failed`.
    pub error: Option<PageError>,
}

/// End-of-run bookkeeping for a capture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureSummary {
    /// Every visited index, in visiting order.
    pub pages: Vec<CapturedPage>,
    /// Page files present in the output directory after the run.
    pub files_on_disk: usize,
    /// Wall-clock duration of the page loop.
    pub duration_ms: u64,
    /// True when no document identifier was found in the source URL and
    /// every index was captured from the initially loaded view.
    pub fallback_mode: bool,
}

impl CaptureSummary {
    fn count(&self, state: PageState) -> usize {
        self.pages.iter().filter(|p| p.state == state).count()
    }

    pub fn captured(&self) -> usize {
        self.count(PageState::Captured)
    }

    pub fn skipped(&self) -> usize {
        self.count(PageState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(PageState::Failed)
    }

    /// Indices that failed, in ascending order.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|p| p.state == PageState::Failed)
            .map(|p| p.index)
            .collect()
    }

    /// The `--start-index` to re-run with, if anything failed.
    pub fn first_failure(&self) -> Option<usize> {
        self.failed_indices().into_iter().min()
    }
}

/// Result of [`crate::capture::capture`].
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// The page loop ran (possibly with per-page failures).
    Completed(CaptureSummary),
    /// The operator cancelled at the resume gate; nothing was touched.
    Cancelled,
}

/// Statistics for a finished build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildStats {
    /// Final document path.
    pub output_path: PathBuf,
    /// Pages in the final document (one per input image).
    pub page_count: usize,
    /// First and last input file names, in assembly order.
    pub first_image: Option<String>,
    pub last_image: Option<String>,
    /// Size of the assembled page-image PDF before recognition.
    pub raw_size_bytes: u64,
    /// Size of the installed final document.
    pub final_size_bytes: u64,
    pub preprocess_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub recognize_duration_ms: u64,
    pub finalize_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Whatever the recognizer printed on stderr.
    pub recognizer_output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(index: usize, state: PageState) -> CapturedPage {
        CapturedPage {
            index,
            path: PathBuf::from(format!("page_{index:04}.png")),
            state,
            error: None,
        }
    }

    #[test]
    fn summary_counts_by_state() {
        let summary = CaptureSummary {
            pages: vec![
                page(1, PageState::Skipped),
                page(2, PageState::Captured),
                page(3, PageState::Failed),
                page(4, PageState::Captured),
                page(5, PageState::Failed),
            ],
            ..Default::default()
        };
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.captured(), 2);
        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.failed_indices(), vec![3, 5]);
        assert_eq!(summary.first_failure(), Some(3));
    }

    #[test]
    fn empty_summary_has_no_first_failure() {
        assert_eq!(CaptureSummary::default().first_failure(), None);
    }

    #[test]
    fn page_state_serialises_lowercase() {
        let json = serde_json::to_string(&PageState::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
    }
}
