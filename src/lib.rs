//! # viewer2pdf
//!
//! Turn a book shown in a web-based page viewer into a searchable PDF.
//!
//! ## Why this crate?
//!
//! Online textbook viewers render each page client-side and offer no export.
//! What they do offer is a stable per-page URL and a logged-in browser
//! session. This crate drives a real browser through every page, keeps one
//! screenshot per page on disk, and later packs those screenshots into a
//! PDF with an OCR text layer so the result is searchable and copyable.
//!
//! ## Pipeline Overview
//!
//! ```text
//! capture                                   build
//!  │                                         │
//!  ├─ 1. Gate     resume / restart / cancel  ├─ 1. Preprocess  crop + JPEG (rayon)
//!  ├─ 2. Open     persistent browser profile ├─ 2. Assemble    one page per image
//!  ├─ 3. Loop     navigate → settle → shot   ├─ 3. Recognize   ocrmypdf text layer
//!  └─ 4. Crop     optional, in place         └─ 4. Finalize    Info dict + install
//! ```
//!
//! Capture is resumable by construction: a page whose file exists is never
//! captured again, so re-running after a crash only fills the gaps. Build
//! is all-or-nothing: it either installs a complete document or leaves the
//! output path untouched.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use viewer2pdf::{build, capture, BuildConfig, CaptureConfig, CaptureOutcome, FixedDecision, ResumeDecision};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let capture_config = CaptureConfig::builder()
//!         .source_url("https://app.edubase.ch/#doc/60505/1")
//!         .total_pages(396)
//!         .output_dir("./input_pages")
//!         .build()?;
//!     if let CaptureOutcome::Completed(summary) =
//!         capture(&capture_config, &FixedDecision(ResumeDecision::Resume)).await?
//!     {
//!         eprintln!("{} captured, {} failed", summary.captured(), summary.failed());
//!     }
//!
//!     let build_config = BuildConfig::builder()
//!         .input_dir("./input_pages")
//!         .output_path("./output/book.pdf")
//!         .title("Mathematik 9")
//!         .build()?;
//!     let stats = build(&build_config).await?;
//!     eprintln!("{} pages -> {}", stats.page_count, stats.output_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `viewer2pdf` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! viewer2pdf = { version = "0.3", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Tool | Needed by | Override |
//! |------|-----------|----------|
//! | Chrome / Chromium | capture | `CHROME_PATH` |
//! | `ocrmypdf` (+ Tesseract with the language data) | build | `OCRMYPDF_PATH` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod build;
pub mod capture;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use build::{build, build_sync};
pub use capture::{capture, capture_with_session};
pub use config::{
    BuildConfig, BuildConfigBuilder, CaptureConfig, CaptureConfigBuilder, CropSettings,
    DocumentInfo, OcrOptions, OutputType,
};
pub use error::{PageError, Viewer2PdfError};
pub use output::{BuildStats, CaptureOutcome, CaptureSummary, CapturedPage, PageState};
pub use pipeline::browser::{BrowserSession, ChromiumSession, DocumentLocator, SessionError};
pub use pipeline::ocr::{OcrMyPdf, RecognitionReport, TextRecognizer};
pub use progress::{
    BuildProgress, BuildProgressCallback, BuildStage, CaptureProgress, CaptureProgressCallback,
    FixedDecision, NoopProgressCallback, OperatorPrompt, ResumeDecision,
};
