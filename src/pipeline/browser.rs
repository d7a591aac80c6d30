//! Browser session: the narrow surface the capture loop needs from a browser.
//!
//! [`BrowserSession`] is what the orchestrator talks to. [`ChromiumSession`]
//! implements it on top of chromiumoxide with a persistent profile directory,
//! so a login done by the operator in the first run survives later runs.
//! Tests drive the same loop with an in-memory session.
//!
//! ## Document locator
//!
//! Viewer URLs of the form `<origin>/#doc/<id>[/<page>]` carry a stable
//! document id. When one is present every page index maps to its own URL
//! (`<origin>/#doc/<id>/<index>`). Without it the tool can only screenshot
//! whatever the initially loaded view shows (fallback mode).
//!
//! ## Same-document navigation
//!
//! Moving from `#doc/1/4` to `#doc/1/5` only changes the URL fragment.
//! Chromium treats that as a same-document navigation with no network
//! response to wait for, so the session assigns `window.location.href`
//! instead of issuing `Page.navigate` and reports no status.
//!
//! ## Settling
//!
//! Before every load the session subscribes to `Page.lifecycleEvent`.
//! [`BrowserSession::settle`] then waits up to [`NETWORK_IDLE_TIMEOUT`] for
//! `networkIdle` and sleeps the fixed settle delay on top. A page that never
//! goes idle (same-document moves often don't) only costs the timeout.

use crate::config::CaptureConfig;
use crate::error::Viewer2PdfError;
use crate::pipeline::store;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventLifecycleEvent, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::{Stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Failure of a single browser operation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Browser(String),

    #[error("writing screenshot: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations the capture loop performs against a live browser tab.
///
/// Errors are returned, never panicked; the orchestrator classifies them
/// into per-page failures.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load the operator-supplied entry URL.
    async fn open(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError>;

    /// Navigate to a page URL. Returns the HTTP status of the main document
    /// when the navigation produced one.
    async fn navigate(&mut self, url: &str, timeout: Duration)
        -> Result<Option<u16>, SessionError>;

    /// Give the client-side renderer time to paint.
    async fn settle(&mut self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    /// Write a PNG screenshot to `path`. Returns the number of bytes written.
    async fn screenshot(&mut self, path: &Path, full_page: bool) -> Result<u64, SessionError>;

    /// Best-effort: grow the window to the available screen.
    async fn maximize_window(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Best-effort: scroll the viewer element into the middle of the view.
    async fn center_content(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Shut the browser down.
    async fn close(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

// ── Document locator ─────────────────────────────────────────────────────

static RE_DOC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"#doc/(\d+)").unwrap());

/// Per-page URL builder recovered from a viewer URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLocator {
    /// Everything before `#doc/`, i.e. the viewer origin and path.
    pub prefix: String,
    /// Numeric document id.
    pub document_id: String,
}

impl DocumentLocator {
    /// Recover a locator from `url`, or `None` if it carries no document id.
    pub fn parse(url: &str) -> Option<Self> {
        let caps = RE_DOC_ID.captures(url)?;
        let whole = caps.get(0)?;
        Some(Self {
            prefix: url[..whole.start()].to_string(),
            document_id: caps[1].to_string(),
        })
    }

    /// URL that shows page `index` of the document.
    pub fn page_url(&self, index: usize) -> String {
        format!("{}#doc/{}/{}", self.prefix, self.document_id, index)
    }
}

/// Whether moving from `current` to `target` only changes the fragment.
pub fn is_same_document(current: &str, target: &str) -> bool {
    match (current.split_once('#'), target.split_once('#')) {
        (Some((a, _)), Some((b, _))) => a == b,
        (None, Some((b, _))) => current == b,
        _ => false,
    }
}

// ── Network idle ─────────────────────────────────────────────────────────

/// Upper bound on waiting for the page's network to go idle.
pub const NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(3);

const NETWORK_IDLE: &str = "networkIdle";

/// Consume lifecycle event names until `networkIdle` shows up or `limit`
/// elapses. Returns whether the page went idle in time.
pub async fn wait_for_network_idle<S>(names: S, limit: Duration) -> bool
where
    S: Stream<Item = String>,
{
    let mut names = std::pin::pin!(names);
    let idle = async {
        while let Some(name) = names.next().await {
            if name == NETWORK_IDLE {
                return true;
            }
        }
        false
    };
    tokio::time::timeout(limit, idle).await.unwrap_or(false)
}

// ── Chromium ─────────────────────────────────────────────────────────────

const MAXIMIZE_JS: &str = r#"(() => {
    window.moveTo(0, 0);
    window.resizeTo(screen.availWidth, screen.availHeight);
})()"#;

const CENTER_JS: &str = r#"(() => {
    const viewer = document.querySelector('[data-testid="pdfViewer"], .pdfViewer, iframe');
    if (viewer) {
        viewer.scrollIntoView({ behavior: 'auto', block: 'center' });
    }
    window.scrollTo({ left: 0, top: 0, behavior: 'auto' });
})()"#;

/// A Chromium tab driven over the DevTools protocol.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    /// Lifecycle events since the last `open`/`navigate`.
    lifecycle: Option<EventStream<EventLifecycleEvent>>,
}

impl ChromiumSession {
    /// Start a browser with the persistent profile from `config` and open a
    /// blank tab.
    pub async fn launch(config: &CaptureConfig) -> Result<Self, Viewer2PdfError> {
        let launch_err = |reason: String| Viewer2PdfError::BrowserLaunch { reason };

        std::fs::create_dir_all(&config.profile_dir).map_err(|e| {
            launch_err(format!(
                "cannot create profile directory {}: {e}",
                config.profile_dir.display()
            ))
        })?;

        let (width, height) = config.viewport;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&config.profile_dir)
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                device_scale_factor: Some(1.0),
                ..Viewport::default()
            })
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage");

        if !config.headless {
            builder = builder.with_head();
        }

        let executable = match &config.browser_executable {
            Some(path) => Some(path.clone()),
            None => match toolprobe::locate_browser() {
                Ok(path) => Some(path),
                Err(e) => {
                    debug!("{e}; leaving executable detection to chromiumoxide");
                    None
                }
            },
        };
        if let Some(path) = executable {
            debug!("Browser executable: {}", path.display());
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder.build().map_err(launch_err)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| launch_err(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {e}");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| launch_err(format!("cannot open tab: {e}")))?;
        if let Err(e) = page.execute(SetLifecycleEventsEnabledParams::new(true)).await {
            debug!("Lifecycle events unavailable, settle falls back to the fixed delay: {e}");
        }

        info!(
            "Browser started (profile {}, {}x{}, headless={})",
            config.profile_dir.display(),
            width,
            height,
            config.headless
        );
        Ok(Self {
            browser,
            page,
            handler,
            lifecycle: None,
        })
    }

    /// Subscribe to lifecycle events ahead of a load.
    async fn watch_lifecycle(&mut self) {
        self.lifecycle = match self.page.event_listener::<EventLifecycleEvent>().await {
            Ok(events) => Some(events),
            Err(e) => {
                debug!("Cannot subscribe to lifecycle events: {e}");
                None
            }
        };
    }

    async fn eval(&self, js: &str) -> Result<(), SessionError> {
        self.page
            .evaluate(js)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Browser(e.to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError> {
        self.watch_lifecycle().await;
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| SessionError::Timeout(timeout))?
            .map_err(|e| SessionError::Browser(e.to_string()))?;
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<Option<u16>, SessionError> {
        let current = self.page.url().await.ok().flatten().unwrap_or_default();
        self.watch_lifecycle().await;
        if is_same_document(&current, url) {
            debug!("Same-document navigation to {url}");
            let target = serde_json::to_string(url)
                .map_err(|e| SessionError::Browser(e.to_string()))?;
            let js = format!("window.location.href = {target};");
            tokio::time::timeout(timeout, self.eval(&js))
                .await
                .map_err(|_| SessionError::Timeout(timeout))??;
            return Ok(None);
        }

        let page = &self.page;
        let load = async move {
            page.goto(url).await?;
            let request = page.wait_for_navigation_response().await?;
            Ok::<_, chromiumoxide::error::CdpError>(
                request
                    .and_then(|r| r.response.as_ref().map(|resp| resp.status))
                    .and_then(|status| u16::try_from(status).ok()),
            )
        };
        tokio::time::timeout(timeout, load)
            .await
            .map_err(|_| SessionError::Timeout(timeout))?
            .map_err(|e| SessionError::Browser(e.to_string()))
    }

    async fn settle(&mut self, delay: Duration) {
        if let Some(events) = self.lifecycle.take() {
            let names = events.map(|event| event.name.clone());
            if wait_for_network_idle(names, NETWORK_IDLE_TIMEOUT).await {
                debug!("Network idle");
            } else {
                debug!("Network not idle after {NETWORK_IDLE_TIMEOUT:?}, continuing");
            }
        }
        tokio::time::sleep(delay).await;
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> Result<u64, SessionError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        let bytes = self
            .page
            .screenshot(params)
            .await
            .map_err(|e| SessionError::Browser(e.to_string()))?;
        store::write_atomic(path, &bytes)?;
        Ok(bytes.len() as u64)
    }

    async fn maximize_window(&mut self) -> Result<(), SessionError> {
        self.eval(MAXIMIZE_JS).await
    }

    async fn center_content(&mut self) -> Result<(), SessionError> {
        self.eval(CENTER_JS).await
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Browser(e.to_string()));
        if let Err(e) = self.browser.wait().await {
            debug!("Waiting for browser exit: {e}");
        }
        self.handler.abort();
        result
    }
}
