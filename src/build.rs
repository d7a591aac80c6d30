//! Build orchestration: page images → searchable, tagged PDF.
//!
//! Four strictly sequential stages, each consuming the previous one's
//! output from a private scratch directory:
//!
//! 1. **Preprocess** — decode, optionally crop, flatten to RGB, JPEG
//! 2. **Assemble**   — one PDF page per image, in natural file-name order
//! 3. **Recognize**  — external text recognition adds the text layer
//! 4. **Finalize**   — write the Info dictionary, install at the output path
//!
//! Unlike capture, build is all-or-nothing: the first failure aborts, the
//! scratch directory is removed and no output file appears.

use crate::config::BuildConfig;
use crate::error::Viewer2PdfError;
use crate::output::BuildStats;
use crate::pipeline::assemble::{self, PageImage};
use crate::pipeline::ocr::{OcrMyPdf, TextRecognizer};
use crate::pipeline::{metadata, normalize, store};
use crate::progress::{BuildProgress, BuildStage};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Build the final document described by `config`.
///
/// # Errors
/// - [`Viewer2PdfError::InputDir`] / [`Viewer2PdfError::NoImages`] before any
///   work is done
/// - [`Viewer2PdfError::OutputExists`] unless `config.overwrite`
/// - [`Viewer2PdfError::OcrUnavailable`] if no recognizer was injected and
///   `ocrmypdf` cannot be found
/// - any stage failure, with the page or tool output that caused it
pub async fn build(config: &BuildConfig) -> Result<BuildStats, Viewer2PdfError> {
    let total_start = Instant::now();
    let cb = config.progress_callback.clone();
    info!("Starting build: {}", config.input_dir.display());

    // ── Step 1: Collect inputs ───────────────────────────────────────────
    let images = store::list_images(&config.input_dir).map_err(|source| {
        Viewer2PdfError::InputDir {
            path: config.input_dir.clone(),
            source,
        }
    })?;
    if images.is_empty() {
        return Err(Viewer2PdfError::NoImages {
            dir: config.input_dir.clone(),
        });
    }
    info!("Found {} images", images.len());

    // ── Step 2: Guards that must fail before any work ───────────────────
    if config.output_path.exists() && !config.overwrite {
        return Err(Viewer2PdfError::OutputExists {
            path: config.output_path.clone(),
        });
    }
    let recognizer = resolve_recognizer(config)?;
    debug!("Text recognizer: {}", recognizer.name());

    let scratch = tempfile::Builder::new()
        .prefix("viewer2pdf-")
        .tempdir()
        .map_err(|e| Viewer2PdfError::Internal(format!("scratch directory: {e}")))?;

    let mut stats = BuildStats {
        output_path: config.output_path.clone(),
        first_image: file_name(images.first()),
        last_image: file_name(images.last()),
        ..BuildStats::default()
    };

    // ── Step 3: Preprocess ───────────────────────────────────────────────
    let stage_start = Instant::now();
    stage_started(&cb, BuildStage::Preprocess, images.len());
    let pages = preprocess(&images, scratch.path(), config).await?;
    stats.preprocess_duration_ms = stage_start.elapsed().as_millis() as u64;
    stage_completed(&cb, BuildStage::Preprocess);
    info!("Preprocessed {} images in {}ms", pages.len(), stats.preprocess_duration_ms);

    // ── Step 4: Assemble ─────────────────────────────────────────────────
    let stage_start = Instant::now();
    stage_started(&cb, BuildStage::Assemble, pages.len());
    let raw_pdf = scratch.path().join("raw.pdf");
    let dpi = config.dpi;
    let raw_target = raw_pdf.clone();
    stats.raw_size_bytes =
        tokio::task::spawn_blocking(move || assemble::assemble_pdf(&pages, dpi, &raw_target))
            .await
            .map_err(|e| Viewer2PdfError::Internal(format!("Assembly task panicked: {e}")))??;
    stats.assemble_duration_ms = stage_start.elapsed().as_millis() as u64;
    stage_completed(&cb, BuildStage::Assemble);
    info!("Raw PDF: {} bytes", stats.raw_size_bytes);

    // ── Step 5: Recognize ────────────────────────────────────────────────
    let stage_start = Instant::now();
    stage_started(&cb, BuildStage::Recognize, images.len());
    let recognized = scratch.path().join("recognized.pdf");
    let report = recognizer
        .recognize(&raw_pdf, &recognized, &config.ocr)
        .await?;
    if !recognized.is_file() {
        return Err(Viewer2PdfError::OcrFailed {
            exit_code: None,
            diagnostics: format!("{} reported success but wrote no output", recognizer.name()),
        });
    }
    stats.recognizer_output = report.diagnostics;
    stats.recognize_duration_ms = stage_start.elapsed().as_millis() as u64;
    stage_completed(&cb, BuildStage::Recognize);

    // ── Step 6: Finalize ─────────────────────────────────────────────────
    let stage_start = Instant::now();
    stage_started(&cb, BuildStage::Finalize, images.len());
    let info = config.info.clone();
    let output_path = config.output_path.clone();
    let overwrite = config.overwrite;
    let (page_count, final_size) = tokio::task::spawn_blocking(move || {
        finalize(&recognized, &output_path, &info, overwrite)
    })
    .await
    .map_err(|e| Viewer2PdfError::Internal(format!("Finalize task panicked: {e}")))??;
    stats.page_count = page_count;
    stats.final_size_bytes = final_size;
    stats.finalize_duration_ms = stage_start.elapsed().as_millis() as u64;
    stage_completed(&cb, BuildStage::Finalize);

    if page_count != images.len() {
        warn!(
            "Final document has {} pages but {} images went in",
            page_count,
            images.len()
        );
    }

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Build complete: {} ({} pages, {} bytes) in {}ms",
        stats.output_path.display(),
        stats.page_count,
        stats.final_size_bytes,
        stats.total_duration_ms
    );
    Ok(stats)
}

/// Synchronous wrapper around [`build`].
///
/// Creates a temporary tokio runtime internally.
pub fn build_sync(config: &BuildConfig) -> Result<BuildStats, Viewer2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Viewer2PdfError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(build(config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// An injected recognizer wins; otherwise `ocrmypdf` has to be installed.
fn resolve_recognizer(config: &BuildConfig) -> Result<Arc<dyn TextRecognizer>, Viewer2PdfError> {
    if let Some(ref recognizer) = config.recognizer {
        return Ok(Arc::clone(recognizer));
    }
    Ok(Arc::new(OcrMyPdf::locate()?))
}

/// Preprocess every image on a bounded rayon pool, off the async runtime.
///
/// Output order matches input order; the first failure stops the stage.
async fn preprocess(
    images: &[PathBuf],
    scratch: &Path,
    config: &BuildConfig,
) -> Result<Vec<PageImage>, Viewer2PdfError> {
    let images = images.to_vec();
    let scratch = scratch.to_path_buf();
    let crop = config.crop;
    let quality = config.jpeg_quality;
    let threads = config.worker_threads();
    let cb = config.progress_callback.clone();

    tokio::task::spawn_blocking(move || {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Viewer2PdfError::Internal(format!("thread pool: {e}")))?;
        let total = images.len();
        let done = AtomicUsize::new(0);

        pool.install(|| {
            images
                .par_iter()
                .enumerate()
                .map(|(i, src)| -> Result<PageImage, Viewer2PdfError> {
                    let dst = scratch.join(format!("{i:05}.jpg"));
                    let (width, height) = normalize::preprocess_to_jpeg(src, &dst, &crop, quality)
                        .map_err(|e| Viewer2PdfError::Preprocess {
                            path: src.clone(),
                            detail: e.to_string(),
                        })?;
                    let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(ref cb) = cb {
                        cb.on_image_processed(n, total);
                    }
                    Ok(PageImage {
                        path: dst,
                        width,
                        height,
                    })
                })
                .collect::<Result<Vec<_>, Viewer2PdfError>>()
        })
    })
    .await
    .map_err(|e| Viewer2PdfError::Internal(format!("Preprocess task panicked: {e}")))?
}

/// Stamp metadata on a sibling copy of the recognised document, then move it
/// into place. Returns `(page_count, size_in_bytes)`.
fn finalize(
    recognized: &Path,
    output_path: &Path,
    info: &crate::config::DocumentInfo,
    overwrite: bool,
) -> Result<(usize, u64), Viewer2PdfError> {
    let write_err = |source| Viewer2PdfError::OutputWriteFailed {
        path: output_path.to_path_buf(),
        source,
    };

    let parent = match output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_err)?;

    let staged = tempfile::Builder::new()
        .prefix(".viewer2pdf-")
        .suffix(".pdf")
        .tempfile_in(&parent)
        .map_err(write_err)?;
    std::fs::copy(recognized, staged.path()).map_err(write_err)?;

    metadata::write_info(staged.path(), info)?;
    let page_count = metadata::page_count(staged.path())?;
    let size = std::fs::metadata(staged.path()).map_err(write_err)?.len();

    if overwrite {
        staged.persist(output_path).map_err(|e| write_err(e.error))?;
    } else {
        staged
            .persist_noclobber(output_path)
            .map_err(|e| write_err(e.error))?;
    }
    Ok((page_count, size))
}

fn file_name(path: Option<&PathBuf>) -> Option<String> {
    path.and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
}

fn stage_started(cb: &Option<BuildProgress>, stage: BuildStage, images: usize) {
    info!("Step {}/4: {}", stage.number(), stage.label());
    if let Some(cb) = cb {
        cb.on_stage_start(stage, images);
    }
}

fn stage_completed(cb: &Option<BuildProgress>, stage: BuildStage) {
    if let Some(cb) = cb {
        cb.on_stage_complete(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentInfo;
    use crate::pipeline::ocr::RecognitionReport;
    use async_trait::async_trait;

    struct CopyRecognizer;

    #[async_trait]
    impl TextRecognizer for CopyRecognizer {
        async fn recognize(
            &self,
            input: &Path,
            output: &Path,
            _options: &crate::config::OcrOptions,
        ) -> Result<RecognitionReport, Viewer2PdfError> {
            std::fs::copy(input, output).map_err(|e| Viewer2PdfError::Internal(e.to_string()))?;
            Ok(RecognitionReport::default())
        }
    }

    struct SilentRecognizer;

    #[async_trait]
    impl TextRecognizer for SilentRecognizer {
        async fn recognize(
            &self,
            _input: &Path,
            _output: &Path,
            _options: &crate::config::OcrOptions,
        ) -> Result<RecognitionReport, Viewer2PdfError> {
            Ok(RecognitionReport::default())
        }
    }

    fn write_pages(dir: &Path, n: usize) {
        for i in 1..=n {
            image::RgbImage::from_pixel(40, 60, image::Rgb([200, 30, 30]))
                .save(store::page_path(dir, i))
                .unwrap();
        }
    }

    fn config(input: &Path, output: &Path, recognizer: Arc<dyn TextRecognizer>) -> BuildConfig {
        BuildConfig::builder()
            .input_dir(input)
            .output_path(output)
            .recognizer(recognizer)
            .preprocess_threads(2)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn empty_input_fails_without_output() {
        let input = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("book.pdf");

        let err = build(&config(input.path(), &output, Arc::new(CopyRecognizer)))
            .await
            .unwrap_err();
        assert!(matches!(err, Viewer2PdfError::NoImages { .. }), "got {err:?}");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn missing_input_dir_is_reported() {
        let out_dir = tempfile::tempdir().unwrap();
        let err = build(&config(
            &out_dir.path().join("nope"),
            &out_dir.path().join("book.pdf"),
            Arc::new(CopyRecognizer),
        ))
        .await
        .unwrap_err();
        assert!(matches!(err, Viewer2PdfError::InputDir { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn existing_output_is_protected() {
        let input = tempfile::tempdir().unwrap();
        write_pages(input.path(), 1);
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("book.pdf");
        std::fs::write(&output, b"precious").unwrap();

        let err = build(&config(input.path(), &output, Arc::new(CopyRecognizer)))
            .await
            .unwrap_err();
        assert!(matches!(err, Viewer2PdfError::OutputExists { .. }));
        assert_eq!(std::fs::read(&output).unwrap(), b"precious");
    }

    #[tokio::test]
    async fn builds_with_injected_recognizer() {
        let input = tempfile::tempdir().unwrap();
        write_pages(input.path(), 3);
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("nested/book.pdf");

        let mut cfg = config(input.path(), &output, Arc::new(CopyRecognizer));
        cfg.info = DocumentInfo {
            title: Some("Test".into()),
            ..DocumentInfo::default()
        };
        let stats = build(&cfg).await.unwrap();

        assert_eq!(stats.page_count, 3);
        assert_eq!(stats.first_image.as_deref(), Some("page_0001.png"));
        assert_eq!(stats.last_image.as_deref(), Some("page_0003.png"));
        assert!(stats.final_size_bytes > 0);
        assert_eq!(metadata::read_info(&output).unwrap()["Title"], "Test");
    }

    #[tokio::test]
    async fn recognizer_without_output_aborts() {
        let input = tempfile::tempdir().unwrap();
        write_pages(input.path(), 1);
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("book.pdf");

        let err = build(&config(input.path(), &output, Arc::new(SilentRecognizer)))
            .await
            .unwrap_err();
        assert!(matches!(err, Viewer2PdfError::OcrFailed { .. }), "got {err:?}");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn corrupt_image_aborts_the_build() {
        let input = tempfile::tempdir().unwrap();
        write_pages(input.path(), 2);
        std::fs::write(input.path().join("page_0003.png"), b"garbage").unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("book.pdf");

        let err = build(&config(input.path(), &output, Arc::new(CopyRecognizer)))
            .await
            .unwrap_err();
        match err {
            Viewer2PdfError::Preprocess { path, .. } => {
                assert!(path.ends_with("page_0003.png"))
            }
            other => panic!("expected Preprocess, got {other:?}"),
        }
        assert!(!output.exists());
    }
}
