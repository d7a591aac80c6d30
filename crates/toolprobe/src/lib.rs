//! # toolprobe
//!
//! Locate the external programs `viewer2pdf` drives but does not bundle:
//! the `ocrmypdf` recognition pipeline, the `tesseract` engine behind it,
//! and a Chromium-family browser for page capture.
//!
//! ## How it works
//!
//! [`locate`] resolves a [`Tool`] in three steps, first match wins:
//!
//! 1. The tool's environment override (e.g. `OCRMYPDF_PATH`), if it points at
//!    an existing file.
//! 2. Each candidate executable name, looked up on `PATH`.
//! 3. Well-known absolute install locations (macOS app bundles, Windows
//!    program files).
//!
//! ```rust,no_run
//! use toolprobe::{locate, tool_version, OCRMYPDF};
//!
//! let path = locate(&OCRMYPDF).expect("ocrmypdf not installed");
//! println!("{} {:?}", path.display(), tool_version(&path));
//! ```
//!
//! ## Environment variable overrides
//!
//! - `OCRMYPDF_PATH` — explicit path to `ocrmypdf`.
//! - `TESSERACT_PATH` — explicit path to `tesseract`.
//! - `CHROME_PATH` — explicit path to a Chrome/Chromium executable.
//! - `VIEWER2PDF_PROFILE_DIR` — override [`default_profile_dir`].

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

// ── Tool descriptors ─────────────────────────────────────────────────────────

/// Static description of an external executable and where to look for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    /// Display name used in diagnostics.
    pub name: &'static str,
    /// Environment variable holding an explicit path.
    pub env_override: &'static str,
    /// Executable names tried on `PATH`, in order.
    pub candidates: &'static [&'static str],
    /// Absolute paths tried after `PATH` lookup fails.
    pub well_known: &'static [&'static str],
    /// Install hint printed when the tool cannot be found.
    pub install_hint: &'static str,
}

/// The OCR pipeline that adds the invisible text layer.
pub const OCRMYPDF: Tool = Tool {
    name: "ocrmypdf",
    env_override: "OCRMYPDF_PATH",
    candidates: &["ocrmypdf"],
    well_known: &["/opt/homebrew/bin/ocrmypdf", "/usr/local/bin/ocrmypdf"],
    install_hint: "Ubuntu/Debian: sudo apt install ocrmypdf tesseract-ocr-deu\n\
                   macOS:         brew install ocrmypdf tesseract-lang",
};

/// The recognition engine ocrmypdf calls into.
pub const TESSERACT: Tool = Tool {
    name: "tesseract",
    env_override: "TESSERACT_PATH",
    candidates: &["tesseract"],
    well_known: &["/opt/homebrew/bin/tesseract", "/usr/local/bin/tesseract"],
    install_hint: "Ubuntu/Debian: sudo apt install tesseract-ocr tesseract-ocr-deu\n\
                   macOS:         brew install tesseract tesseract-lang",
};

/// Any Chromium-family browser that speaks the DevTools protocol.
pub const CHROMIUM: Tool = Tool {
    name: "chromium",
    env_override: "CHROME_PATH",
    candidates: &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
        "msedge",
    ],
    well_known: &[
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ],
    install_hint: "Ubuntu/Debian: sudo apt install chromium-browser\n\
                   or set CHROME_PATH=/path/to/chrome",
};

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by toolprobe lookups.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// None of the lookup strategies found the tool.
    #[error("'{tool}' was not found on PATH (set {env_override} to override)\n{hint}")]
    NotFound {
        tool: &'static str,
        env_override: &'static str,
        hint: &'static str,
    },
}

// ── Lookup ───────────────────────────────────────────────────────────────────

/// Resolve `tool` to an executable path.
pub fn locate(tool: &Tool) -> Result<PathBuf, ProbeError> {
    if let Ok(env_path) = std::env::var(tool.env_override) {
        let p = PathBuf::from(env_path);
        if p.is_file() {
            return Ok(p);
        }
        // Fall through: override set but stale.
        eprintln!(
            "toolprobe: {} '{}' not found; searching PATH …",
            tool.env_override,
            p.display()
        );
    }

    for candidate in tool.candidates {
        if let Ok(p) = which::which(candidate) {
            return Ok(p);
        }
    }

    tool.well_known
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .ok_or(ProbeError::NotFound {
            tool: tool.name,
            env_override: tool.env_override,
            hint: tool.install_hint,
        })
}

/// Resolve a Chromium-family browser executable.
pub fn locate_browser() -> Result<PathBuf, ProbeError> {
    locate(&CHROMIUM)
}

/// Run `<path> --version` and return the first non-empty output line.
///
/// Some tools (older tesseract builds) print their version on stderr, so
/// stderr is consulted when stdout is empty.
pub fn tool_version(path: &Path) -> Option<String> {
    let output = Command::new(path).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    first_line(&output.stdout).or_else(|| first_line(&output.stderr))
}

fn first_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Lookup result for one tool, as reported by `viewer2pdf check`.
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub name: &'static str,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
    pub install_hint: &'static str,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.path.is_some()
    }
}

/// Locate `tool` and query its version without failing.
pub fn probe(tool: &Tool) -> ToolStatus {
    let path = locate(tool).ok();
    let version = path.as_deref().and_then(tool_version);
    ToolStatus {
        name: tool.name,
        path,
        version,
        install_hint: tool.install_hint,
    }
}

// ── Browser profile ──────────────────────────────────────────────────────────

/// Default persistent browser-profile directory.
///
/// Login cookies live here between capture runs. Resolves to
/// `~/.viewer2pdf_browser`, or `VIEWER2PDF_PROFILE_DIR` when set.
pub fn default_profile_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VIEWER2PDF_PROFILE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".viewer2pdf_browser")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING: Tool = Tool {
        name: "toolprobe-missing",
        env_override: "TOOLPROBE_TEST_MISSING_PATH",
        candidates: &["toolprobe-definitely-not-installed"],
        well_known: &["/definitely/not/here/toolprobe"],
        install_hint: "nothing to install",
    };

    #[test]
    fn missing_tool_reports_not_found() {
        let err = locate(&MISSING).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("toolprobe-missing"), "got: {msg}");
        assert!(msg.contains("TOOLPROBE_TEST_MISSING_PATH"), "got: {msg}");
    }

    #[test]
    fn env_override_wins_when_file_exists() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let tool = Tool {
            env_override: "TOOLPROBE_TEST_OVERRIDE_PATH",
            ..MISSING
        };
        std::env::set_var(tool.env_override, file.path());
        let found = locate(&tool);
        std::env::remove_var(tool.env_override);
        assert_eq!(found.unwrap(), file.path());
    }

    #[test]
    fn stale_env_override_falls_through() {
        let tool = Tool {
            env_override: "TOOLPROBE_TEST_STALE_PATH",
            ..MISSING
        };
        std::env::set_var(tool.env_override, "/definitely/not/a/file");
        let found = locate(&tool);
        std::env::remove_var(tool.env_override);
        assert!(found.is_err());
    }

    #[test]
    fn probe_of_missing_tool_is_unavailable() {
        let status = probe(&MISSING);
        assert!(!status.is_available());
        assert!(status.version.is_none());
    }

    #[test]
    fn first_line_skips_blank_lines() {
        assert_eq!(first_line(b"\n\n  ocrmypdf 16.0.4\nextra"), Some("ocrmypdf 16.0.4".into()));
        assert_eq!(first_line(b"   \n"), None);
    }

    #[test]
    fn profile_dir_is_deterministic() {
        let d1 = default_profile_dir();
        let d2 = default_profile_dir();
        assert_eq!(d1, d2);
    }
}
