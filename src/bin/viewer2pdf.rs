//! CLI binary for viewer2pdf.
//!
//! A thin shim over the library crate: `capture` maps flags to
//! `CaptureConfig`, `build` maps flags to `BuildConfig`, `check` reports the
//! external tools. Everything the operator sees while a run is going comes
//! from the indicatif callbacks below.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use viewer2pdf::{
    build, capture, BuildConfig, BuildProgressCallback, BuildStage, CaptureConfig,
    CaptureOutcome, CaptureProgressCallback, CaptureSummary, CropSettings, DocumentInfo,
    OperatorPrompt, OutputType, ResumeDecision,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

fn bar_style(unit: &str) -> ProgressStyle {
    ProgressStyle::with_template(&format!(
        "{{spinner:.cyan}} {{prefix:.bold}}  \
         [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  \
         ⏱ {{elapsed_precise}}  ETA {{eta_precise}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS)
}

// ── Capture progress ─────────────────────────────────────────────────────────

/// Renders one bar for the page loop plus a log line per index.
///
/// The bar stays invisible until `on_capture_start`, so the resume gate and
/// the "press Enter" prompt are not drawn over.
struct CliCaptureProgress {
    bar: ProgressBar,
    /// When the previous index finished; per-page timings include the delay.
    last_tick: Mutex<Instant>,
}

impl CliCaptureProgress {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: ProgressBar::hidden(),
            last_tick: Mutex::new(Instant::now()),
        })
    }

    fn elapsed_since_last(&self) -> f64 {
        let Ok(mut last) = self.last_tick.lock() else {
            return 0.0;
        };
        let secs = last.elapsed().as_secs_f64();
        *last = Instant::now();
        secs
    }
}

impl CaptureProgressCallback for CliCaptureProgress {
    fn on_capture_start(&self, pages_in_range: usize) {
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_length(pages_in_range as u64);
        self.bar.set_style(bar_style("pages"));
        self.bar.set_prefix("Capturing");
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.reset_eta();
        if let Ok(mut last) = self.last_tick.lock() {
            *last = Instant::now();
        }
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Visiting {pages_in_range} page indices…"))
        ));
    }

    fn on_page_skipped(&self, page: usize, total: usize) {
        self.elapsed_since_last();
        self.bar.println(format!(
            "  {} Page {:>4}/{:<4}  {}",
            dim("↷"),
            page,
            total,
            dim("exists, skipped")
        ));
        self.bar.inc(1);
    }

    fn on_page_captured(&self, page: usize, total: usize, bytes: u64) {
        let secs = self.elapsed_since_last();
        self.bar.println(format!(
            "  {} Page {:>4}/{:<4}  {:<10}  {}",
            green("✓"),
            page,
            total,
            dim(&format!("{:>6} KiB", bytes / 1024)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_failed(&self, page: usize, total: usize, error: &str) {
        let secs = self.elapsed_since_last();

        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>4}/{:<4}  {}  {}",
            red("✗"),
            page,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_capture_complete(&self, _summary: &CaptureSummary) {
        self.bar.finish_and_clear();
    }
}

// ── Build progress ───────────────────────────────────────────────────────────

/// A bar for preprocessing (the only stage with per-image progress) and a
/// spinner for the three stages that are one opaque step each.
struct CliBuildProgress {
    bar: ProgressBar,
    stage_started: Mutex<Instant>,
}

impl CliBuildProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(spinner_style());
        bar.set_prefix("Preparing");
        bar.set_message("Scanning input images…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            stage_started: Mutex::new(Instant::now()),
        })
    }
}

impl BuildProgressCallback for CliBuildProgress {
    fn on_stage_start(&self, stage: BuildStage, images: usize) {
        if let Ok(mut started) = self.stage_started.lock() {
            *started = Instant::now();
        }
        let prefix = format!("Step {}/4", stage.number());
        match stage {
            BuildStage::Preprocess => {
                self.bar.set_length(images as u64);
                self.bar.set_position(0);
                self.bar.set_style(bar_style("images"));
                self.bar.reset_eta();
            }
            _ => {
                self.bar.set_style(spinner_style());
            }
        }
        self.bar.set_prefix(prefix);
        self.bar.set_message(format!("{}…", stage.label()));
    }

    fn on_image_processed(&self, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }

    fn on_stage_complete(&self, stage: BuildStage) {
        let secs = self
            .stage_started
            .lock()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        self.bar.println(format!(
            "  {} Step {}/4  {:<22}  {}",
            green("✓"),
            stage.number(),
            stage.label(),
            dim(&format!("{secs:.1}s")),
        ));
        if stage == BuildStage::Finalize {
            self.bar.finish_and_clear();
        }
    }
}

// ── Terminal operator prompt ─────────────────────────────────────────────────

/// Answers the capture orchestrator's questions on the terminal.
///
/// `preset` short-circuits the resume gate (`--resume` / `--restart`);
/// `wait_for_ready = false` skips the "press Enter" pause (`--no-wait`).
struct TerminalPrompt {
    preset: Option<ResumeDecision>,
    wait_for_ready: bool,
}

fn read_line() -> Option<String> {
    let mut line = String::new();
    // stdin reads block; keep them off the async worker's hot path.
    let n = tokio::task::block_in_place(|| io::stdin().lock().read_line(&mut line)).ok()?;
    (n > 0).then(|| line.trim().to_lowercase())
}

impl OperatorPrompt for TerminalPrompt {
    fn resolve_existing(&self, existing: usize) -> ResumeDecision {
        if let Some(decision) = self.preset {
            return decision;
        }
        if !io::stdin().is_terminal() {
            eprintln!(
                "{} {existing} page files already exist; resuming (pass --restart to discard them)",
                cyan("⚠")
            );
            return ResumeDecision::Resume;
        }

        eprintln!(
            "{} {} page files already exist in the output directory.",
            cyan("⚠"),
            bold(&existing.to_string())
        );
        loop {
            eprint!("  [r]estart from scratch  [c]ontinue where it stopped  [a]bort  > ");
            io::stderr().flush().ok();
            match read_line().as_deref() {
                Some("r") | Some("restart") => return ResumeDecision::Restart,
                Some("c") | Some("continue") | Some("") => return ResumeDecision::Resume,
                Some("a") | Some("abort") | None => return ResumeDecision::Cancel,
                Some(other) => eprintln!("  {}", red(&format!("unknown choice '{other}'"))),
            }
        }
    }

    fn confirm_ready(&self) {
        if !self.wait_for_ready || !io::stdin().is_terminal() {
            return;
        }
        eprintln!(
            "{} Log in if needed, open the document and set the zoom level.",
            cyan("◆")
        );
        eprint!("  Press Enter to start capturing… ");
        io::stderr().flush().ok();
        read_line();
    }
}

fn confirm(question: &str) -> bool {
    if !io::stdin().is_terminal() {
        return false;
    }
    eprint!("{} {question} [y/N] ", cyan("?"));
    io::stderr().flush().ok();
    matches!(read_line().as_deref(), Some("y") | Some("yes"))
}

// ── Command line ─────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # 1. Check that ocrmypdf, tesseract and a browser are installed
  viewer2pdf check

  # 2. Capture all 396 pages (log in when the browser opens, then press Enter)
  viewer2pdf capture --url "https://app.edubase.ch/#doc/60505/1" --total 396

  # Resume after a failure at page 122, without prompts
  viewer2pdf capture --url "https://app.edubase.ch/#doc/60505/1" --total 396 \
      --start-index 122 --no-wait

  # 3. Build the searchable PDF
  viewer2pdf build --input ./input_pages -o ./output/book.pdf \
      --title "Mathematik 9" --author "Verlag" --keywords "algebra,geometrie"

  # English OCR, PDF/A output, overwrite without asking
  viewer2pdf build --lang eng --pdfa --force

  # JSON summary for scripting
  viewer2pdf --json build --force > stats.json

ENVIRONMENT VARIABLES:
  VIEWER2PDF_URL           Source viewer URL for capture
  VIEWER2PDF_TOTAL         Last page index to capture
  VIEWER2PDF_PAGES_DIR     Page image directory (capture output, build input)
  VIEWER2PDF_OUTPUT        Final PDF path
  VIEWER2PDF_LANG          OCR language(s), e.g. deu, eng, deu+eng
  VIEWER2PDF_PROFILE_DIR   Persistent browser profile (default ~/.viewer2pdf_browser)
  CHROME_PATH              Chrome/Chromium executable, skips PATH lookup
  OCRMYPDF_PATH            ocrmypdf executable, skips PATH lookup
  TESSERACT_PATH           tesseract executable, skips PATH lookup
  RUST_LOG                 Overrides the log filter (e.g. viewer2pdf=debug)

NOTES:
  Capture never re-captures a page whose file already exists, so re-running
  the same command only fills the gaps. Failed pages are listed at the end;
  re-run with --start-index set to the first failure.

  Build needs ocrmypdf with the Tesseract language data for --lang installed.
"#;

/// Capture a web-rendered document viewer page by page and build a
/// searchable PDF.
#[derive(Parser, Debug)]
#[command(
    name = "viewer2pdf",
    version,
    about = "Capture a web document viewer page by page and build a searchable OCR PDF",
    long_about = "Capture every page of a document shown in a browser-based viewer as a \
screenshot (resumable, rate-limited, with a persistent login profile), then assemble the \
screenshots into one PDF with an invisible OCR text layer and descriptive metadata.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print the run summary as JSON on stdout.
    #[arg(long, global = true, env = "VIEWER2PDF_JSON")]
    json: bool,

    /// Disable progress bars.
    #[arg(long, global = true, env = "VIEWER2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "VIEWER2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "VIEWER2PDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Screenshot pages start..=total of the viewer into a directory.
    Capture(CaptureArgs),
    /// Turn a directory of page images into a searchable PDF.
    Build(BuildArgs),
    /// Report which external tools were found.
    Check,
}

#[derive(Args, Debug)]
struct CropArgs {
    /// Do not crop white margins.
    #[arg(long, env = "VIEWER2PDF_NO_CROP")]
    no_crop: bool,

    /// Luminance at or below which a pixel counts as content.
    #[arg(long, env = "VIEWER2PDF_CROP_THRESHOLD", default_value_t = 248,
          value_parser = clap::value_parser!(i32).range(0..=255))]
    crop_threshold: i32,

    /// Pixels kept around the content box.
    #[arg(long, env = "VIEWER2PDF_CROP_MARGIN", default_value_t = 10)]
    crop_margin: u32,
}

impl CropArgs {
    fn settings(&self) -> CropSettings {
        CropSettings {
            enabled: !self.no_crop,
            threshold: self.crop_threshold,
            margin_px: self.crop_margin,
        }
    }
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Viewer URL of the document, e.g. https://app.edubase.ch/#doc/60505/1
    #[arg(long, env = "VIEWER2PDF_URL")]
    url: String,

    /// Last page index to capture.
    #[arg(short = 'n', long, env = "VIEWER2PDF_TOTAL",
          value_parser = clap::value_parser!(u32).range(1..))]
    total: u32,

    /// First page index to capture (1-indexed).
    #[arg(long, env = "VIEWER2PDF_START_INDEX", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..))]
    start_index: u32,

    /// Directory the page images are written to.
    #[arg(long, env = "VIEWER2PDF_PAGES_DIR", default_value = "./input_pages")]
    out_dir: PathBuf,

    /// Persistent browser profile; keeps the viewer login between runs.
    #[arg(long, env = "VIEWER2PDF_PROFILE_DIR")]
    profile_dir: Option<PathBuf>,

    /// Chrome/Chromium executable (default: CHROME_PATH, then PATH lookup).
    #[arg(long, env = "VIEWER2PDF_BROWSER")]
    browser: Option<PathBuf>,

    /// Run the browser without a window. Only useful with a profile that
    /// is already logged in.
    #[arg(long, env = "VIEWER2PDF_HEADLESS")]
    headless: bool,

    /// Pause between pages, in milliseconds.
    #[arg(long, env = "VIEWER2PDF_DELAY_MS", default_value_t = 1500)]
    delay_ms: u64,

    /// Wait after navigation before the screenshot, in milliseconds.
    #[arg(long, env = "VIEWER2PDF_SETTLE_MS", default_value_t = 1500)]
    settle_ms: u64,

    /// Per-page navigation timeout, in seconds.
    #[arg(long, env = "VIEWER2PDF_NAV_TIMEOUT", default_value_t = 15,
          value_parser = clap::value_parser!(u64).range(1..))]
    nav_timeout: u64,

    /// Screenshot only the visible viewport instead of the full page.
    #[arg(long, env = "VIEWER2PDF_VIEWPORT_ONLY")]
    viewport_only: bool,

    #[command(flatten)]
    crop: CropArgs,

    /// Keep existing page files without asking.
    #[arg(long, conflicts_with = "restart")]
    resume: bool,

    /// Delete existing page files without asking.
    #[arg(long)]
    restart: bool,

    /// Start capturing right after the first page loads.
    #[arg(long, env = "VIEWER2PDF_NO_WAIT")]
    no_wait: bool,
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Directory containing the page images.
    #[arg(long, env = "VIEWER2PDF_PAGES_DIR", default_value = "./input_pages")]
    input: PathBuf,

    /// Final PDF path.
    #[arg(short, long, env = "VIEWER2PDF_OUTPUT", default_value = "./output/book.pdf")]
    output: PathBuf,

    /// OCR language(s) as Tesseract codes, e.g. deu, eng, deu+eng.
    #[arg(long, env = "VIEWER2PDF_LANG", default_value = "deu")]
    lang: String,

    /// Parallel OCR jobs.
    #[arg(short, long, env = "VIEWER2PDF_JOBS", default_value_t = 6,
          value_parser = clap::value_parser!(u32).range(1..))]
    jobs: u32,

    /// ocrmypdf optimisation level (0–3).
    #[arg(long, env = "VIEWER2PDF_OPTIMIZE", default_value_t = 2,
          value_parser = clap::value_parser!(u8).range(0..=3))]
    optimize: u8,

    /// Resolution every page is tagged with (72–1200).
    #[arg(long, env = "VIEWER2PDF_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    dpi: u32,

    /// Use each image's pixel size as its page size in points.
    #[arg(long, env = "VIEWER2PDF_NATIVE_SIZE", conflicts_with = "dpi")]
    native_size: bool,

    /// JPEG quality for the page images (1–100).
    #[arg(long, env = "VIEWER2PDF_QUALITY", default_value_t = 92,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    #[command(flatten)]
    crop: CropArgs,

    /// Write PDF/A-2b instead of plain PDF.
    #[arg(long, env = "VIEWER2PDF_PDFA")]
    pdfa: bool,

    /// Do not straighten rotated pages.
    #[arg(long, env = "VIEWER2PDF_NO_DESKEW")]
    no_deskew: bool,

    /// Document title.
    #[arg(long, env = "VIEWER2PDF_TITLE")]
    title: Option<String>,

    /// Document author.
    #[arg(long, env = "VIEWER2PDF_AUTHOR")]
    author: Option<String>,

    /// Document subject.
    #[arg(long, env = "VIEWER2PDF_SUBJECT")]
    subject: Option<String>,

    /// Comma-separated keywords.
    #[arg(long, env = "VIEWER2PDF_KEYWORDS")]
    keywords: Option<String>,

    /// Overwrite the output file without asking.
    #[arg(short, long, env = "VIEWER2PDF_FORCE")]
    force: bool,

    /// Image preprocessing threads (0 = all cores).
    #[arg(long, env = "VIEWER2PDF_THREADS", default_value_t = 0)]
    threads: usize,
}

/// Flags shared by every subcommand's output handling.
#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
    quiet: bool,
    show_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the per-page feedback; library INFO lines
    // would only tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let filter = if cli.verbose { "debug" } else { filter };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let out = Output {
        json: cli.json,
        quiet: cli.quiet,
        show_progress,
    };

    match cli.command {
        Command::Capture(args) => run_capture(args, out).await,
        Command::Build(args) => run_build(args, out).await,
        Command::Check => run_check(out),
    }
}

// ── capture ──────────────────────────────────────────────────────────────────

async fn run_capture(args: CaptureArgs, out: Output) -> Result<()> {
    let mut builder = CaptureConfig::builder()
        .source_url(args.url.as_str())
        .total_pages(args.total as usize)
        .start_index(args.start_index as usize)
        .output_dir(&args.out_dir)
        .headless(args.headless)
        .page_delay_ms(args.delay_ms)
        .settle_delay_ms(args.settle_ms)
        .navigation_timeout_secs(args.nav_timeout)
        .full_page(!args.viewport_only)
        .crop(args.crop.settings());

    if let Some(dir) = &args.profile_dir {
        builder = builder.profile_dir(dir);
    }
    if let Some(exe) = &args.browser {
        builder = builder.browser_executable(exe);
    }
    let progress = out.show_progress.then(CliCaptureProgress::new);
    if let Some(cb) = &progress {
        builder = builder.progress_callback(cb.clone());
    }
    let config = builder.build().context("Invalid capture configuration")?;

    let preset = match (args.resume, args.restart) {
        (true, _) => Some(ResumeDecision::Resume),
        (_, true) => Some(ResumeDecision::Restart),
        // Nobody can answer a prompt when stdout is machine-read.
        _ if out.json => Some(ResumeDecision::Resume),
        _ => None,
    };
    let prompt = TerminalPrompt {
        preset,
        wait_for_ready: !args.no_wait && !out.json,
    };

    if !out.quiet && !out.json {
        eprintln!(
            "{} Capturing pages {}–{} of {}",
            cyan("◆"),
            config.start_index,
            config.total_pages,
            bold(&config.source_url)
        );
        eprintln!(
            "   {}",
            dim(&format!(
                "pages → {}   profile → {}",
                config.output_dir.display(),
                config.profile_dir.display()
            ))
        );
    }

    let outcome = capture(&config, &prompt).await;
    if let (Err(_), Some(cb)) = (&outcome, &progress) {
        cb.bar.finish_and_clear();
    }
    let outcome = outcome.context("Capture failed")?;

    let summary = match outcome {
        CaptureOutcome::Cancelled => {
            if !out.quiet {
                eprintln!("{} Cancelled; no page was touched.", cyan("⚠"));
            }
            return Ok(());
        }
        CaptureOutcome::Completed(summary) => summary,
    };

    if out.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
        return Ok(());
    }
    if out.quiet {
        return Ok(());
    }

    let failed = summary.failed();
    eprintln!(
        "{}  {} captured  {} skipped  {} failed  {}ms  →  {}",
        if failed == 0 { green("✔") } else { cyan("⚠") },
        bold(&summary.captured().to_string()),
        summary.skipped(),
        if failed == 0 {
            "0".to_string()
        } else {
            red(&failed.to_string())
        },
        summary.duration_ms,
        bold(&config.output_dir.display().to_string()),
    );
    eprintln!(
        "   {}",
        dim(&format!("{} page files on disk", summary.files_on_disk))
    );
    if summary.fallback_mode {
        eprintln!(
            "   {}",
            cyan("No document id in the URL: every index shows the initially loaded page.")
        );
    }
    if let Some(first) = summary.first_failure() {
        let list: Vec<String> = summary
            .failed_indices()
            .iter()
            .map(usize::to_string)
            .collect();
        eprintln!("   {} {}", red("failed:"), list.join(", "));
        eprintln!(
            "   {} re-run the same command with {}",
            dim("tip:"),
            bold(&format!("--start-index {first}"))
        );
    }
    Ok(())
}

// ── build ────────────────────────────────────────────────────────────────────

async fn run_build(args: BuildArgs, out: Output) -> Result<()> {
    let mut overwrite = args.force;
    if !overwrite && args.output.exists() {
        if out.json || out.quiet {
            anyhow::bail!(
                "{} already exists (pass --force to overwrite)",
                args.output.display()
            );
        }
        overwrite = confirm(&format!(
            "{} already exists. Overwrite?",
            args.output.display()
        ));
        if !overwrite {
            anyhow::bail!("{} already exists, not overwritten", args.output.display());
        }
    }

    let info = DocumentInfo {
        title: args.title.clone(),
        author: args.author.clone(),
        subject: args.subject.clone(),
        keywords: args
            .keywords
            .as_deref()
            .map(DocumentInfo::parse_keywords)
            .unwrap_or_default(),
    };

    let mut builder = BuildConfig::builder()
        .input_dir(&args.input)
        .output_path(&args.output)
        .language(args.lang.as_str())
        .jobs(args.jobs as usize)
        .optimize(args.optimize)
        .output_type(if args.pdfa {
            OutputType::PdfA
        } else {
            OutputType::Pdf
        })
        .deskew(!args.no_deskew)
        .dpi((!args.native_size).then_some(args.dpi))
        .jpeg_quality(args.quality)
        .crop(args.crop.settings())
        .info(info)
        .overwrite(overwrite)
        .preprocess_threads(args.threads);

    let progress = out.show_progress.then(CliBuildProgress::new);
    if let Some(cb) = &progress {
        builder = builder.progress_callback(cb.clone());
    }
    let config = builder.build().context("Invalid build configuration")?;

    if !out.quiet && !out.json {
        eprintln!(
            "{} Building {} from {}",
            cyan("◆"),
            bold(&config.output_path.display().to_string()),
            config.input_dir.display()
        );
        eprintln!(
            "   {}",
            dim(&format!(
                "lang {}  jobs {}  optimize {}  {}  {}",
                config.ocr.language,
                config.ocr.jobs,
                config.ocr.optimize,
                config
                    .dpi
                    .map(|d| format!("{d} dpi"))
                    .unwrap_or_else(|| "native size".into()),
                if config.crop.enabled {
                    format!("crop + JPEG q{}", config.jpeg_quality)
                } else {
                    format!("JPEG q{}", config.jpeg_quality)
                },
            ))
        );
    }

    let stats = build(&config).await;
    if let (Err(_), Some(cb)) = (&stats, &progress) {
        cb.bar.finish_and_clear();
    }
    let stats = stats.context("Build failed")?;

    if out.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise build stats")?
        );
        return Ok(());
    }
    if out.quiet {
        return Ok(());
    }

    eprintln!(
        "{}  {} pages  {}ms  →  {}",
        green("✔"),
        bold(&stats.page_count.to_string()),
        stats.total_duration_ms,
        bold(&stats.output_path.display().to_string()),
    );
    eprintln!(
        "   {}",
        dim(&format!(
            "{} … {}   raw {:.1} MiB  →  final {:.1} MiB",
            stats.first_image.as_deref().unwrap_or("-"),
            stats.last_image.as_deref().unwrap_or("-"),
            stats.raw_size_bytes as f64 / (1024.0 * 1024.0),
            stats.final_size_bytes as f64 / (1024.0 * 1024.0),
        ))
    );
    Ok(())
}

// ── check ────────────────────────────────────────────────────────────────────

fn run_check(out: Output) -> Result<()> {
    let statuses = [
        toolprobe::probe(&toolprobe::OCRMYPDF),
        toolprobe::probe(&toolprobe::TESSERACT),
        toolprobe::probe(&toolprobe::CHROMIUM),
    ];
    let profile = toolprobe::default_profile_dir();
    let ocr_ready = statuses[0].is_available();

    if out.json {
        let tools: Vec<serde_json::Value> = statuses
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "available": s.is_available(),
                    "path": s.path,
                    "version": s.version,
                })
            })
            .collect();
        let report = serde_json::json!({
            "tools": tools,
            "profile_dir": profile,
            "profile_exists": profile.is_dir(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !out.quiet {
        for s in &statuses {
            match &s.path {
                Some(path) => println!(
                    "{} {:<10} {}  {}",
                    green("✓"),
                    s.name,
                    path.display(),
                    dim(s.version.as_deref().unwrap_or("version unknown")),
                ),
                None => println!(
                    "{} {:<10} {}  {}",
                    red("✗"),
                    s.name,
                    red("not found"),
                    dim(s.install_hint),
                ),
            }
        }
        println!(
            "  {:<10} {}  {}",
            "profile",
            profile.display(),
            dim(if profile.is_dir() {
                "exists"
            } else {
                "created on first capture"
            }),
        );
    }

    if !ocr_ready {
        anyhow::bail!("ocrmypdf was not found; `viewer2pdf build` cannot run");
    }
    Ok(())
}
