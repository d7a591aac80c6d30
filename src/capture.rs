//! Capture orchestration: walk page indices, screenshot each one to disk.
//!
//! The loop is strictly sequential. One index at a time is navigated,
//! settled and screenshotted, then the run sleeps for the configured delay
//! so the viewer's backend is never hammered.
//!
//! Per-page failures (navigation error, HTTP error status, screenshot error)
//! are recorded and the run moves on. Re-running with the same arguments
//! only fills in what is missing, because an index whose file already exists
//! is skipped without touching the browser.

use crate::config::CaptureConfig;
use crate::error::{PageError, Viewer2PdfError};
use crate::output::{CaptureOutcome, CaptureSummary, CapturedPage, PageState};
use crate::pipeline::browser::{BrowserSession, ChromiumSession, DocumentLocator};
use crate::pipeline::{normalize, store};
use crate::progress::{OperatorPrompt, ResumeDecision};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// File written next to the pages after every run. Informational only;
/// resume never reads it.
pub const MANIFEST_FILE: &str = "capture-manifest.json";

/// Capture pages with a freshly launched Chromium session.
///
/// # Returns
/// `Ok(CaptureOutcome::Completed)` once the loop has visited every index,
/// even if some pages failed (see [`CaptureSummary::failed_indices`]).
/// `Ok(CaptureOutcome::Cancelled)` if the operator cancelled at the
/// existing-files prompt; in that case the browser is never started.
///
/// # Errors
/// Only whole-run failures: unusable output directory, browser launch.
pub async fn capture(
    config: &CaptureConfig,
    prompt: &dyn OperatorPrompt,
) -> Result<CaptureOutcome, Viewer2PdfError> {
    info!(
        "Starting capture: pages {}-{} into {}",
        config.start_index,
        config.total_pages,
        config.output_dir.display()
    );

    if resolve_existing_pages(config, prompt)? == ResumeDecision::Cancel {
        info!("Capture cancelled by operator");
        return Ok(CaptureOutcome::Cancelled);
    }

    let mut session = ChromiumSession::launch(config).await?;
    let result = drive(&mut session, config, prompt).await;

    if let Err(e) = session.close().await {
        warn!("Closing browser: {e}");
    }
    result.map(CaptureOutcome::Completed)
}

/// Same as [`capture`] but against a caller-provided session.
pub async fn capture_with_session(
    session: &mut dyn BrowserSession,
    config: &CaptureConfig,
    prompt: &dyn OperatorPrompt,
) -> Result<CaptureOutcome, Viewer2PdfError> {
    if resolve_existing_pages(config, prompt)? == ResumeDecision::Cancel {
        return Ok(CaptureOutcome::Cancelled);
    }
    drive(session, config, prompt)
        .await
        .map(CaptureOutcome::Completed)
}

/// Create the output directory and, on a run starting at index 1, ask the
/// operator what to do with page files that are already there.
///
/// `Restart` deletes every file matching the page naming scheme; other files
/// in the directory are left alone. Runs that start later than index 1 are
/// explicit resumes and never ask.
pub fn resolve_existing_pages(
    config: &CaptureConfig,
    prompt: &dyn OperatorPrompt,
) -> Result<ResumeDecision, Viewer2PdfError> {
    let dir = &config.output_dir;
    let dir_err = |source| Viewer2PdfError::OutputDir {
        path: dir.clone(),
        source,
    };

    store::ensure_dir(dir).map_err(dir_err)?;
    if config.start_index != 1 {
        return Ok(ResumeDecision::Resume);
    }

    let existing = store::existing_pages(dir).map_err(dir_err)?;
    if existing.is_empty() {
        return Ok(ResumeDecision::Resume);
    }

    let decision = prompt.resolve_existing(existing.len());
    debug!("{} existing pages, decision: {:?}", existing.len(), decision);
    if decision == ResumeDecision::Restart {
        for path in &existing {
            std::fs::remove_file(path).map_err(dir_err)?;
        }
        info!("Removed {} existing pages", existing.len());
    }
    Ok(decision)
}

async fn drive(
    session: &mut dyn BrowserSession,
    config: &CaptureConfig,
    prompt: &dyn OperatorPrompt,
) -> Result<CaptureSummary, Viewer2PdfError> {
    // ── Step 1: Initial load ─────────────────────────────────────────────
    if let Err(e) = session.maximize_window().await {
        debug!("Window maximize ignored: {e}");
    }
    let initial_timeout = Duration::from_secs(config.initial_load_timeout_secs);
    info!("Opening {}", config.source_url);
    let on_screen = match session.open(&config.source_url, initial_timeout).await {
        Ok(()) => Some(config.source_url.as_str()),
        Err(e) => {
            warn!("Initial load of {} did not complete: {e}", config.source_url);
            None
        }
    };
    if let Err(e) = session.center_content().await {
        debug!("Centering ignored: {e}");
    }

    // ── Step 2: Operator gets to log in and arrange the viewer ──────────
    if config.start_index == 1 {
        prompt.confirm_ready();
    }

    // ── Step 3: Page loop ────────────────────────────────────────────────
    let locator = DocumentLocator::parse(&config.source_url);
    let summary = run_capture(session, config, locator.as_ref(), on_screen).await?;

    // ── Step 4: Manifest ─────────────────────────────────────────────────
    if config.write_manifest {
        if let Err(e) = write_manifest(config, &summary) {
            warn!("Could not write {MANIFEST_FILE}: {e}");
        }
    }
    Ok(summary)
}

/// The page loop proper.
///
/// `on_screen` is the URL the session currently shows, or `None` if the
/// initial load failed. With a `locator`, every index that is not already on
/// screen is navigated to directly. Without one (fallback mode) no navigation happens and each
/// index captures whatever the viewer currently shows; only the first
/// captured index is reliably correct.
pub async fn run_capture(
    session: &mut dyn BrowserSession,
    config: &CaptureConfig,
    locator: Option<&DocumentLocator>,
    on_screen: Option<&str>,
) -> Result<CaptureSummary, Viewer2PdfError> {
    let start = Instant::now();
    let total = config.total_pages;
    let cb = config.progress_callback.as_ref();

    if locator.is_none() {
        warn!(
            "No document id in {}; every page will capture the current view",
            config.source_url
        );
    }

    if let Some(cb) = cb {
        cb.on_capture_start(total.saturating_add(1).saturating_sub(config.start_index));
    }

    let mut summary = CaptureSummary {
        fallback_mode: locator.is_none(),
        ..CaptureSummary::default()
    };
    let mut current_url = on_screen.map(str::to_string);

    for index in config.start_index..=total {
        let path = store::page_path(&config.output_dir, index);

        if store::exists(&path) {
            debug!("Page {index}: already on disk, skipping");
            if let Some(cb) = cb {
                cb.on_page_skipped(index, total);
            }
            summary.pages.push(CapturedPage {
                index,
                path,
                state: PageState::Skipped,
                error: None,
            });
            continue;
        }

        match capture_page(session, config, locator, &mut current_url, index, &path).await {
            Ok(bytes) => {
                debug!("Page {index}: {bytes} bytes");
                if let Some(cb) = cb {
                    cb.on_page_captured(index, total, bytes);
                }
                summary.pages.push(CapturedPage {
                    index,
                    path,
                    state: PageState::Captured,
                    error: None,
                });
            }
            Err(e) => {
                warn!("{e}");
                if let Some(cb) = cb {
                    cb.on_page_failed(index, total, &e.to_string());
                }
                summary.pages.push(CapturedPage {
                    index,
                    path,
                    state: PageState::Failed,
                    error: Some(e),
                });
            }
        }

        if index < total && config.page_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.page_delay_ms)).await;
        }
    }

    summary.files_on_disk = store::existing_pages(&config.output_dir)
        .map(|p| p.len())
        .unwrap_or(0);
    summary.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Capture finished: {} captured, {} skipped, {} failed in {}ms",
        summary.captured(),
        summary.skipped(),
        summary.failed(),
        summary.duration_ms
    );
    if let Some(cb) = cb {
        cb.on_capture_complete(&summary);
    }
    Ok(summary)
}

async fn capture_page(
    session: &mut dyn BrowserSession,
    config: &CaptureConfig,
    locator: Option<&DocumentLocator>,
    current_url: &mut Option<String>,
    index: usize,
    path: &Path,
) -> Result<u64, PageError> {
    if let Some(locator) = locator {
        let url = locator.page_url(index);
        if current_url.as_deref() != Some(url.as_str()) {
            *current_url = None;
            let timeout = Duration::from_secs(config.navigation_timeout_secs);
            let status = session
                .navigate(&url, timeout)
                .await
                .map_err(|e| PageError::Navigation {
                    page: index,
                    detail: e.to_string(),
                })?;
            if let Some(status) = status.filter(|s| *s >= 400) {
                return Err(PageError::HttpStatus {
                    page: index,
                    status,
                });
            }
            *current_url = Some(url);
        }
    }

    if let Err(e) = session.center_content().await {
        debug!("Page {index}: centering ignored: {e}");
    }
    session
        .settle(Duration::from_millis(config.settle_delay_ms))
        .await;

    let mut bytes = session
        .screenshot(path, config.full_page)
        .await
        .map_err(|e| PageError::Screenshot {
            page: index,
            detail: e.to_string(),
        })?;

    if config.crop.enabled {
        let crop = config.crop;
        let target = path.to_path_buf();
        match tokio::task::spawn_blocking(move || normalize::crop_file_in_place(&target, &crop))
            .await
        {
            Ok(Ok((w, h))) => {
                debug!("Page {index}: cropped to {w}x{h}");
                bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(bytes);
            }
            Ok(Err(e)) => warn!("Page {index}: crop failed, keeping uncropped image: {e}"),
            Err(e) => warn!("Page {index}: crop task failed: {e}"),
        }
    }

    Ok(bytes)
}

#[derive(Serialize)]
struct Manifest<'a> {
    tool: &'static str,
    version: &'static str,
    source_url: &'a str,
    start_index: usize,
    total_pages: usize,
    written_at_unix: u64,
    summary: &'a CaptureSummary,
}

/// Write [`MANIFEST_FILE`] into the output directory.
pub fn write_manifest(
    config: &CaptureConfig,
    summary: &CaptureSummary,
) -> Result<PathBuf, Viewer2PdfError> {
    let path = config.output_dir.join(MANIFEST_FILE);
    let manifest = Manifest {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        source_url: &config.source_url,
        start_index: config.start_index,
        total_pages: config.total_pages,
        written_at_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        summary,
    };
    let json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| Viewer2PdfError::Internal(format!("manifest serialisation: {e}")))?;
    store::write_atomic(&path, &json).map_err(|source| Viewer2PdfError::OutputDir {
        path: path.clone(),
        source,
    })?;
    debug!("Manifest written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::browser::SessionError;
    use crate::progress::{FixedDecision, NoopProgressCallback};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// A session that refuses everything.
    struct Offline;

    #[async_trait]
    impl BrowserSession for Offline {
        async fn open(&mut self, _url: &str, timeout: Duration) -> Result<(), SessionError> {
            Err(SessionError::Timeout(timeout))
        }

        async fn navigate(
            &mut self,
            _url: &str,
            timeout: Duration,
        ) -> Result<Option<u16>, SessionError> {
            Err(SessionError::Timeout(timeout))
        }

        async fn screenshot(&mut self, _path: &Path, _full_page: bool) -> Result<u64, SessionError> {
            Err(SessionError::Browser("offline".into()))
        }
    }

    fn config(dir: &Path, start: usize) -> CaptureConfig {
        CaptureConfig::builder()
            .source_url("https://viewer.example/#doc/42/1")
            .total_pages(4)
            .start_index(start)
            .output_dir(dir)
            .build()
            .unwrap()
    }

    #[test]
    fn restart_removes_only_page_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(store::page_path(dir.path(), 1), b"x").unwrap();
        std::fs::write(store::page_path(dir.path(), 2), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        let decision = resolve_existing_pages(
            &config(dir.path(), 1),
            &FixedDecision(ResumeDecision::Restart),
        )
        .unwrap();
        assert_eq!(decision, ResumeDecision::Restart);
        assert!(store::existing_pages(dir.path()).unwrap().is_empty());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn cancel_and_resume_touch_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(store::page_path(dir.path(), 1), b"x").unwrap();

        for decision in [ResumeDecision::Cancel, ResumeDecision::Resume] {
            let got =
                resolve_existing_pages(&config(dir.path(), 1), &FixedDecision(decision)).unwrap();
            assert_eq!(got, decision);
            assert_eq!(store::existing_pages(dir.path()).unwrap().len(), 1);
        }
    }

    #[test]
    fn later_start_index_never_asks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(store::page_path(dir.path(), 1), b"x").unwrap();

        // A Restart answer would wipe the file if the prompt were consulted.
        let got = resolve_existing_pages(
            &config(dir.path(), 2),
            &FixedDecision(ResumeDecision::Restart),
        )
        .unwrap();
        assert_eq!(got, ResumeDecision::Resume);
        assert!(store::page_path(dir.path(), 1).exists());
    }

    #[test]
    fn missing_output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/pages");
        resolve_existing_pages(&config(&nested, 1), &FixedDecision(ResumeDecision::Cancel))
            .unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn manifest_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(&config(dir.path(), 1), &CaptureSummary::default()).unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(value["total_pages"], 4);
        assert_eq!(value["summary"]["fallback_mode"], false);
    }

    #[tokio::test]
    async fn start_past_total_visits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig {
            source_url: "https://viewer.example/#doc/42/1".into(),
            total_pages: 1,
            start_index: 3,
            output_dir: dir.path().to_path_buf(),
            progress_callback: Some(Arc::new(NoopProgressCallback)),
            ..CaptureConfig::default()
        };
        let locator = DocumentLocator::parse(&config.source_url);
        let summary = run_capture(&mut Offline, &config, locator.as_ref(), None)
            .await
            .unwrap();
        assert!(summary.pages.is_empty());
        assert_eq!(summary.files_on_disk, 0);
    }
}
