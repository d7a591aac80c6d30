//! Configuration types for capture and build runs.
//!
//! Each stage of the tool is controlled through one struct:
//! [`CaptureConfig`] for the browser-driven page capture and [`BuildConfig`]
//! for the image → PDF → OCR pipeline. Both come with a builder whose
//! `build()` rejects values that would only fail later, deep inside a run
//! (zero pages, JPEG quality 0, an optimisation level ocrmypdf rejects).
//!
//! Defaults follow the interactive CLI: crop on, threshold 248, margin 10 px,
//! 1.5 s between pages, German OCR with six jobs.

use crate::error::Viewer2PdfError;
use crate::pipeline::ocr::TextRecognizer;
use crate::progress::{BuildProgress, CaptureProgress};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// ── Shared settings ──────────────────────────────────────────────────────

/// Whitespace-crop parameters shared by capture and build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropSettings {
    /// Apply the crop at all. Default: true.
    pub enabled: bool,

    /// Luminance at or below which a pixel counts as content. Default: 248.
    ///
    /// Rendered viewers rarely paint pure white; anti-aliased page borders and
    /// off-white backgrounds sit around 250–254. Values outside 0–255 are not
    /// rejected: a negative threshold finds no content (no crop) and 255 or
    /// above treats every pixel as content (crop to the full image).
    pub threshold: i32,

    /// Pixels of breathing room kept around the content box. Default: 10.
    pub margin_px: u32,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 248,
            margin_px: 10,
        }
    }
}

impl CropSettings {
    /// Crop settings with cropping switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// ocrmypdf output flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputType {
    /// Plain PDF. (default)
    #[default]
    Pdf,
    /// PDF/A-2b archival output.
    PdfA,
}

impl OutputType {
    /// Value for ocrmypdf's `--output-type` flag.
    pub fn as_flag(&self) -> &'static str {
        match self {
            OutputType::Pdf => "pdf",
            OutputType::PdfA => "pdfa",
        }
    }
}

/// Options forwarded to the text-recognition pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrOptions {
    /// Tesseract language code(s), e.g. `deu`, `eng`, `deu+eng`. Default: `deu`.
    pub language: String,
    /// Parallel recognition jobs inside the tool. Default: 6.
    pub jobs: usize,
    /// ocrmypdf `--optimize` level, 0–3. Default: 2.
    pub optimize: u8,
    /// Output flavour. Default: [`OutputType::Pdf`].
    pub output_type: OutputType,
    /// Straighten slightly rotated pages. Default: true.
    pub deskew: bool,
    /// Leave pages that already carry text untouched. Default: true.
    pub skip_text: bool,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            language: "deu".to_string(),
            jobs: 6,
            optimize: 2,
            output_type: OutputType::default(),
            deskew: true,
            skip_text: true,
        }
    }
}

/// Descriptive metadata written into the final document's Info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Vec<String>,
}

impl DocumentInfo {
    /// Split a comma-separated keyword list, trimming and dropping blanks.
    pub fn parse_keywords(csv: &str) -> Vec<String> {
        csv.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// ── Capture ──────────────────────────────────────────────────────────────

/// Configuration for one capture run.
///
/// Built via [`CaptureConfig::builder()`].
///
/// # Example
/// ```rust
/// use viewer2pdf::CaptureConfig;
///
/// let config = CaptureConfig::builder()
///     .source_url("https://app.example.ch/#doc/60505/1")
///     .total_pages(396)
///     .output_dir("./input_pages")
///     .build()
///     .unwrap();
/// assert_eq!(config.start_index, 1);
/// ```
#[derive(Clone)]
pub struct CaptureConfig {
    /// URL of the first page as shown in the viewer.
    pub source_url: String,

    /// Last page index to capture (inclusive).
    pub total_pages: usize,

    /// First page index to capture. Default: 1.
    pub start_index: usize,

    /// Directory receiving one PNG per page. Default: `./input_pages`.
    pub output_dir: PathBuf,

    /// Persistent browser profile; keeps the viewer login between runs.
    /// Default: [`toolprobe::default_profile_dir`].
    pub profile_dir: PathBuf,

    /// Explicit browser executable. If None, located via [`toolprobe`].
    pub browser_executable: Option<PathBuf>,

    /// Run without a visible window. Default: false, because the operator
    /// usually has to log in and adjust the viewer first.
    pub headless: bool,

    /// Browser viewport size in CSS pixels. Default: 1920×1080.
    pub viewport: (u32, u32),

    /// Pause after every non-skipped page, in milliseconds. Default: 1500.
    pub page_delay_ms: u64,

    /// Fixed wait after navigation before the screenshot. Default: 1500.
    ///
    /// Client-rendered viewers fire their load event long before the page
    /// bitmap is painted.
    pub settle_delay_ms: u64,

    /// Per-page navigation timeout in seconds. Default: 15.
    pub navigation_timeout_secs: u64,

    /// Timeout for the very first load of `source_url`. Default: 30.
    pub initial_load_timeout_secs: u64,

    /// Screenshot the full scrollable page rather than the viewport. Default: true.
    pub full_page: bool,

    /// Optional whitespace crop applied in place after each screenshot.
    pub crop: CropSettings,

    /// Write `capture-manifest.json` after the run. Default: true.
    pub write_manifest: bool,

    /// Per-page progress events.
    pub progress_callback: Option<CaptureProgress>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            total_pages: 0,
            start_index: 1,
            output_dir: PathBuf::from("./input_pages"),
            profile_dir: toolprobe::default_profile_dir(),
            browser_executable: None,
            headless: false,
            viewport: (1920, 1080),
            page_delay_ms: 1500,
            settle_delay_ms: 1500,
            navigation_timeout_secs: 15,
            initial_load_timeout_secs: 30,
            full_page: true,
            crop: CropSettings::default(),
            write_manifest: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CaptureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureConfig")
            .field("source_url", &self.source_url)
            .field("total_pages", &self.total_pages)
            .field("start_index", &self.start_index)
            .field("output_dir", &self.output_dir)
            .field("profile_dir", &self.profile_dir)
            .field("browser_executable", &self.browser_executable)
            .field("headless", &self.headless)
            .field("viewport", &self.viewport)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("full_page", &self.full_page)
            .field("crop", &self.crop)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn CaptureProgressCallback>"),
            )
            .finish()
    }
}

impl CaptureConfig {
    /// Create a new builder for `CaptureConfig`.
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CaptureConfig`].
#[derive(Debug)]
pub struct CaptureConfigBuilder {
    config: CaptureConfig,
}

impl CaptureConfigBuilder {
    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.config.source_url = url.into();
        self
    }

    pub fn total_pages(mut self, n: usize) -> Self {
        self.config.total_pages = n;
        self
    }

    pub fn start_index(mut self, i: usize) -> Self {
        self.config.start_index = i;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.profile_dir = dir.into();
        self
    }

    pub fn browser_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_executable = Some(path.into());
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport = (width.max(1), height.max(1));
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.page_delay_ms = ms;
        self
    }

    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.config.settle_delay_ms = ms;
        self
    }

    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.navigation_timeout_secs = secs.max(1);
        self
    }

    pub fn initial_load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.initial_load_timeout_secs = secs.max(1);
        self
    }

    pub fn full_page(mut self, v: bool) -> Self {
        self.config.full_page = v;
        self
    }

    pub fn crop(mut self, crop: CropSettings) -> Self {
        self.config.crop = crop;
        self
    }

    pub fn write_manifest(mut self, v: bool) -> Self {
        self.config.write_manifest = v;
        self
    }

    pub fn progress_callback(mut self, cb: CaptureProgress) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CaptureConfig, Viewer2PdfError> {
        let c = &self.config;
        if c.source_url.trim().is_empty() {
            return Err(Viewer2PdfError::InvalidConfig(
                "source URL must not be empty".into(),
            ));
        }
        if c.total_pages == 0 {
            return Err(Viewer2PdfError::InvalidConfig(
                "total pages must be ≥ 1".into(),
            ));
        }
        if c.start_index == 0 {
            return Err(Viewer2PdfError::InvalidConfig(
                "pages are 1-indexed, start index must be ≥ 1".into(),
            ));
        }
        if c.start_index > c.total_pages {
            return Err(Viewer2PdfError::InvalidConfig(format!(
                "start index {} is beyond the last page {}",
                c.start_index, c.total_pages
            )));
        }
        Ok(self.config)
    }
}

// ── Build ────────────────────────────────────────────────────────────────

/// Configuration for one build run.
///
/// Built via [`BuildConfig::builder()`].
///
/// # Example
/// ```rust
/// use viewer2pdf::{BuildConfig, OcrOptions};
///
/// let config = BuildConfig::builder()
///     .input_dir("./input_pages")
///     .output_path("./output/book.pdf")
///     .ocr(OcrOptions { language: "eng".into(), ..OcrOptions::default() })
///     .title("My Book")
///     .build()
///     .unwrap();
/// assert_eq!(config.jpeg_quality, 92);
/// ```
#[derive(Clone)]
pub struct BuildConfig {
    /// Directory holding the captured page images. Default: `./input_pages`.
    pub input_dir: PathBuf,

    /// Final document path. Default: `./output/book.pdf`.
    pub output_path: PathBuf,

    /// Text-recognition options.
    pub ocr: OcrOptions,

    /// Uniform resolution tag for every page. If None, one image pixel maps
    /// to one PDF point.
    pub dpi: Option<u32>,

    /// JPEG quality for the preprocessed images, 1–100. Default: 92.
    pub jpeg_quality: u8,

    /// Whitespace crop applied during preprocessing.
    pub crop: CropSettings,

    /// Title, author, subject and keywords for the Info dictionary.
    pub info: DocumentInfo,

    /// Replace an existing output file. Default: false.
    pub overwrite: bool,

    /// Worker threads for preprocessing; 0 means one per core. Default: 0.
    pub preprocess_threads: usize,

    /// Pre-constructed recognizer. Takes precedence over locating `ocrmypdf`.
    pub recognizer: Option<Arc<dyn TextRecognizer>>,

    /// Stage and per-image progress events.
    pub progress_callback: Option<BuildProgress>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./input_pages"),
            output_path: PathBuf::from("./output/book.pdf"),
            ocr: OcrOptions::default(),
            dpi: None,
            jpeg_quality: 92,
            crop: CropSettings::default(),
            info: DocumentInfo::default(),
            overwrite: false,
            preprocess_threads: 0,
            recognizer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildConfig")
            .field("input_dir", &self.input_dir)
            .field("output_path", &self.output_path)
            .field("ocr", &self.ocr)
            .field("dpi", &self.dpi)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("crop", &self.crop)
            .field("info", &self.info)
            .field("overwrite", &self.overwrite)
            .field("preprocess_threads", &self.preprocess_threads)
            .field("recognizer", &self.recognizer.as_ref().map(|_| "<dyn TextRecognizer>"))
            .finish()
    }
}

impl BuildConfig {
    /// Create a new builder for `BuildConfig`.
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder {
            config: Self::default(),
        }
    }

    /// Effective preprocessing pool size.
    pub fn worker_threads(&self) -> usize {
        if self.preprocess_threads > 0 {
            self.preprocess_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

/// Builder for [`BuildConfig`].
#[derive(Debug)]
pub struct BuildConfigBuilder {
    config: BuildConfig,
}

impl BuildConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    pub fn ocr(mut self, ocr: OcrOptions) -> Self {
        self.config.ocr = ocr;
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr.language = lang.into();
        self
    }

    pub fn jobs(mut self, n: usize) -> Self {
        self.config.ocr.jobs = n;
        self
    }

    pub fn optimize(mut self, level: u8) -> Self {
        self.config.ocr.optimize = level;
        self
    }

    pub fn output_type(mut self, t: OutputType) -> Self {
        self.config.ocr.output_type = t;
        self
    }

    pub fn deskew(mut self, v: bool) -> Self {
        self.config.ocr.deskew = v;
        self
    }

    pub fn dpi(mut self, dpi: Option<u32>) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn crop(mut self, crop: CropSettings) -> Self {
        self.config.crop = crop;
        self
    }

    pub fn info(mut self, info: DocumentInfo) -> Self {
        self.config.info = info;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.info.title = Some(title.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.config.info.author = Some(author.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.config.info.subject = Some(subject.into());
        self
    }

    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.config.info.keywords = keywords;
        self
    }

    pub fn overwrite(mut self, v: bool) -> Self {
        self.config.overwrite = v;
        self
    }

    pub fn preprocess_threads(mut self, n: usize) -> Self {
        self.config.preprocess_threads = n;
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.config.recognizer = Some(recognizer);
        self
    }

    pub fn progress_callback(mut self, cb: BuildProgress) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BuildConfig, Viewer2PdfError> {
        let c = &self.config;
        if !(1..=100).contains(&c.jpeg_quality) {
            return Err(Viewer2PdfError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.ocr.optimize > 3 {
            return Err(Viewer2PdfError::InvalidConfig(format!(
                "optimisation level must be 0–3, got {}",
                c.ocr.optimize
            )));
        }
        if c.ocr.jobs == 0 {
            return Err(Viewer2PdfError::InvalidConfig(
                "OCR jobs must be ≥ 1".into(),
            ));
        }
        if c.ocr.language.trim().is_empty() {
            return Err(Viewer2PdfError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.dpi == Some(0) {
            return Err(Viewer2PdfError::InvalidConfig(
                "DPI override must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_defaults() {
        let c = CaptureConfig::builder()
            .source_url("https://example.org/#doc/1/1")
            .total_pages(3)
            .build()
            .unwrap();
        assert_eq!(c.start_index, 1);
        assert_eq!(c.page_delay_ms, 1500);
        assert!(c.full_page);
        assert!(c.crop.enabled);
        assert_eq!(c.crop.threshold, 248);
    }

    #[test]
    fn capture_rejects_start_beyond_total() {
        let err = CaptureConfig::builder()
            .source_url("https://example.org/")
            .total_pages(3)
            .start_index(4)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("beyond"), "got: {err}");
    }

    #[test]
    fn capture_rejects_zero_pages_and_empty_url() {
        assert!(CaptureConfig::builder()
            .source_url("https://example.org/")
            .build()
            .is_err());
        assert!(CaptureConfig::builder().total_pages(2).build().is_err());
    }

    #[test]
    fn build_rejects_bad_quality_and_optimize() {
        assert!(BuildConfig::builder().jpeg_quality(0).build().is_err());
        assert!(BuildConfig::builder().optimize(4).build().is_err());
        assert!(BuildConfig::builder().jobs(0).build().is_err());
        assert!(BuildConfig::builder().dpi(Some(0)).build().is_err());
        assert!(BuildConfig::builder().dpi(Some(300)).build().is_ok());
    }

    #[test]
    fn keywords_are_trimmed_and_blank_entries_dropped() {
        assert_eq!(
            DocumentInfo::parse_keywords(" maths, ,grade 9 ,algebra,"),
            vec!["maths", "grade 9", "algebra"]
        );
        assert!(DocumentInfo::parse_keywords("").is_empty());
    }

    #[test]
    fn worker_threads_never_zero() {
        let c = BuildConfig::default();
        assert!(c.worker_threads() >= 1);
        let c = BuildConfig::builder().preprocess_threads(3).build().unwrap();
        assert_eq!(c.worker_threads(), 3);
    }

    #[test]
    fn output_type_flags() {
        assert_eq!(OutputType::Pdf.as_flag(), "pdf");
        assert_eq!(OutputType::PdfA.as_flag(), "pdfa");
    }
}
