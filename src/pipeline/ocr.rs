//! Text recognition: add an invisible text layer to the assembled document.
//!
//! The pass is an opaque external step. [`OcrMyPdf`] shells out to
//! `ocrmypdf` (which drives Tesseract); anything implementing
//! [`TextRecognizer`] can replace it via
//! [`crate::config::BuildConfigBuilder::recognizer`].
//!
//! All-or-nothing: a non-zero exit aborts the build with the tool's own
//! stderr attached, because a document whose text layer silently failed
//! looks fine until someone searches it.

use crate::config::OcrOptions;
use crate::error::Viewer2PdfError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

/// Lines of tool stderr kept in [`Viewer2PdfError::OcrFailed`].
const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// What a successful recognition pass reported.
#[derive(Debug, Clone, Default)]
pub struct RecognitionReport {
    /// Tool output worth showing to the operator (warnings, page notes).
    pub diagnostics: String,
}

/// Turns a page-image PDF into a searchable one.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Read `input`, write the recognised document to `output`.
    async fn recognize(
        &self,
        input: &Path,
        output: &Path,
        options: &OcrOptions,
    ) -> Result<RecognitionReport, Viewer2PdfError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// The `ocrmypdf` command-line tool.
#[derive(Debug, Clone)]
pub struct OcrMyPdf {
    executable: PathBuf,
}

impl OcrMyPdf {
    /// Find `ocrmypdf` via `OCRMYPDF_PATH`, `PATH` or well-known locations.
    pub fn locate() -> Result<Self, Viewer2PdfError> {
        toolprobe::locate(&toolprobe::OCRMYPDF)
            .map(Self::with_executable)
            .map_err(|e| Viewer2PdfError::OcrUnavailable(e.to_string()))
    }

    /// Use a specific executable.
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

/// Command-line arguments for one `ocrmypdf` run.
pub fn build_args(options: &OcrOptions, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--language".into(),
        options.language.clone().into(),
        "--jobs".into(),
        options.jobs.to_string().into(),
        format!("--optimize={}", options.optimize).into(),
        "--output-type".into(),
        options.output_type.as_flag().into(),
    ];
    if options.skip_text {
        args.push("--skip-text".into());
    }
    if options.deskew {
        args.push("--deskew".into());
    }
    args.push(input.into());
    args.push(output.into());
    args
}

/// Last `n` lines of `text`.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[async_trait]
impl TextRecognizer for OcrMyPdf {
    async fn recognize(
        &self,
        input: &Path,
        output: &Path,
        options: &OcrOptions,
    ) -> Result<RecognitionReport, Viewer2PdfError> {
        let args = build_args(options, input, output);
        info!(
            "Running {} (language {}, {} jobs, optimize {})",
            self.executable.display(),
            options.language,
            options.jobs,
            options.optimize
        );
        debug!("Arguments: {:?}", args);

        let result = tokio::process::Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Viewer2PdfError::OcrUnavailable(format!(
                    "cannot run {}: {e}",
                    self.executable.display()
                ))
            })?;

        let stderr = String::from_utf8_lossy(&result.stderr);
        if !result.status.success() {
            return Err(Viewer2PdfError::OcrFailed {
                exit_code: result.status.code(),
                diagnostics: tail(&stderr, DIAGNOSTIC_TAIL_LINES),
            });
        }

        Ok(RecognitionReport {
            diagnostics: tail(&stderr, DIAGNOSTIC_TAIL_LINES),
        })
    }

    fn name(&self) -> &str {
        "ocrmypdf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputType;

    fn args_as_strings(options: &OcrOptions) -> Vec<String> {
        build_args(options, Path::new("in.pdf"), Path::new("out.pdf"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn default_arguments() {
        let args = args_as_strings(&OcrOptions::default());
        assert_eq!(
            args,
            vec![
                "--language",
                "deu",
                "--jobs",
                "6",
                "--optimize=2",
                "--output-type",
                "pdf",
                "--skip-text",
                "--deskew",
                "in.pdf",
                "out.pdf",
            ]
        );
    }

    #[test]
    fn pdfa_without_deskew() {
        let options = OcrOptions {
            language: "deu+eng".into(),
            output_type: OutputType::PdfA,
            deskew: false,
            ..OcrOptions::default()
        };
        let args = args_as_strings(&options);
        assert!(args.contains(&"deu+eng".to_string()));
        assert!(args.contains(&"pdfa".to_string()));
        assert!(!args.contains(&"--deskew".to_string()));
        // Input and output always come last.
        assert_eq!(&args[args.len() - 2..], ["in.pdf", "out.pdf"]);
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail("only", 5), "only");
        assert_eq!(tail("", 3), "");
    }

    #[tokio::test]
    async fn missing_executable_is_unavailable() {
        let ocr = OcrMyPdf::with_executable("/nonexistent/ocrmypdf-xyz");
        let dir = tempfile::tempdir().unwrap();
        let err = ocr
            .recognize(
                &dir.path().join("in.pdf"),
                &dir.path().join("out.pdf"),
                &OcrOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Viewer2PdfError::OcrUnavailable(_)), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_fatal() {
        let false_bin = ["/bin/false", "/usr/bin/false"]
            .iter()
            .map(Path::new)
            .find(|p| p.exists());
        let Some(false_bin) = false_bin else {
            return;
        };
        let ocr = OcrMyPdf::with_executable(false_bin);
        let dir = tempfile::tempdir().unwrap();
        let err = ocr
            .recognize(
                &dir.path().join("in.pdf"),
                &dir.path().join("out.pdf"),
                &OcrOptions::default(),
            )
            .await
            .unwrap_err();
        match err {
            Viewer2PdfError::OcrFailed { exit_code, .. } => assert_eq!(exit_code, Some(1)),
            other => panic!("expected OcrFailed, got {other:?}"),
        }
    }
}
