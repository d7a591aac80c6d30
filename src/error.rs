//! Error types for the viewer2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Viewer2PdfError`] — **Fatal**: the run cannot proceed at all
//!   (browser did not launch, no input images, a preprocessing decode error,
//!   the recognition tool exited non-zero). Returned as `Err(Viewer2PdfError)`
//!   from [`crate::capture::capture`] and [`crate::build::build`].
//!
//! * [`PageError`] — **Non-fatal**: a single page index failed to capture
//!   (navigation timeout, HTTP 5xx, screenshot exception). Recorded in
//!   [`crate::output::CaptureSummary`] and the run moves on to the next index.
//!
//! Capture tolerates per-page failures because the operator can re-run with
//! `--start-index` and resume picks up only the missing files. Build does not:
//! a document with a silently dropped page is worse than no document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the viewer2pdf library.
#[derive(Debug, Error)]
pub enum Viewer2PdfError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Capture ───────────────────────────────────────────────────────────
    /// The browser could not be started (missing executable, locked profile).
    #[error("Failed to launch browser: {reason}\nSet CHROME_PATH or run `viewer2pdf check`.")]
    BrowserLaunch { reason: String },

    /// Could not create, list or clean the page output directory.
    #[error("Output directory '{path}' is not usable: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Build ─────────────────────────────────────────────────────────────
    /// The input directory is missing or unreadable.
    #[error("Cannot read input directory '{path}': {source}")]
    InputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input directory holds no recognised raster images.
    #[error("No images found in '{dir}'\nRun `viewer2pdf capture` first or check --input.")]
    NoImages { dir: PathBuf },

    /// The target document exists and overwriting was not allowed.
    #[error("Output file '{path}' already exists (use --force to overwrite)")]
    OutputExists { path: PathBuf },

    /// Decoding or re-encoding one input image failed.
    #[error("Preprocessing '{path}' failed: {detail}")]
    Preprocess { path: PathBuf, detail: String },

    /// Packing images into the page-image PDF failed.
    #[error("PDF assembly failed: {0}")]
    Assembly(String),

    /// The recognition executable could not be found or started.
    #[error("Text recognition tool unavailable: {0}")]
    OcrUnavailable(String),

    /// The recognition executable ran and returned a non-zero status.
    #[error("Text recognition failed with exit code {exit_code:?}\n{diagnostics}")]
    OcrFailed {
        exit_code: Option<i32>,
        diagnostics: String,
    },

    /// Reading or writing the document Info dictionary failed.
    #[error("Failed to write metadata to '{path}': {detail}")]
    Metadata { path: PathBuf, detail: String },

    /// Installing the finished document at its output path failed.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page index.
///
/// Stored in [`crate::output::CapturedPage`] when a page fails. The capture
/// run continues with the next index.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Navigation raised an error or did not finish in time.
    #[error("Page {page}: navigation failed: {detail}")]
    Navigation { page: usize, detail: String },

    /// The server answered the page URL with an error status.
    #[error("Page {page}: server returned HTTP {status}")]
    HttpStatus { page: usize, status: u16 },

    /// The screenshot primitive failed or its bytes could not be written.
    #[error("Page {page}: screenshot failed: {detail}")]
    Screenshot { page: usize, detail: String },
}

impl PageError {
    /// The page index this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Navigation { page, .. }
            | PageError::HttpStatus { page, .. }
            | PageError::Screenshot { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_images_display_names_directory() {
        let e = Viewer2PdfError::NoImages {
            dir: PathBuf::from("/tmp/pages"),
        };
        let msg = e.to_string();
        assert!(msg.contains("/tmp/pages"), "got: {msg}");
    }

    #[test]
    fn ocr_failed_display_carries_diagnostics() {
        let e = Viewer2PdfError::OcrFailed {
            exit_code: Some(2),
            diagnostics: "tesseract: language 'xyz' not installed".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Some(2)"), "got: {msg}");
        assert!(msg.contains("language 'xyz'"), "got: {msg}");
    }

    #[test]
    fn page_error_reports_index() {
        let e = PageError::HttpStatus {
            page: 17,
            status: 503,
        };
        assert_eq!(e.page(), 17);
        assert!(e.to_string().contains("HTTP 503"));
    }

    #[test]
    fn navigation_display() {
        let e = PageError::Navigation {
            page: 4,
            detail: "timed out after 15s".into(),
        };
        assert!(e.to_string().contains("Page 4"));
        assert!(e.to_string().contains("timed out"));
    }
}
