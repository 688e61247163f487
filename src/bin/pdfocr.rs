//! CLI binary for edgequake-pdfocr.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `OcrConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_pdfocr::{
    embed_text_layer, inspect, ocr, run_post_process, strip_text_layer, write_transcript,
    ColorAdjust, ConfusionMap, ExistingTextChoice, GhostscriptTool, OcrConfig, OcrError,
    OcrOutput, OcrProgressCallback, PdfiumEngine, ProgressCallback, RecognitionLevel, Script,
    ScriptTool, StripDestination, TesseractRecognizer,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────

/// Live progress bar plus one log line per finished page.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl OcrProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix("OCR");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} chars")),
        ));
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
    }

    fn on_progress(&self, fraction: f32) {
        let len = self.bar.length().unwrap_or(0);
        self.bar
            .set_position((fraction as f64 * len as f64).round() as u64);
    }

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} pages with text",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages with text  ({} without)",
                yellow("⚠"),
                bold(&success_count.to_string()),
                total_pages,
                failed,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transcript to stdout
  pdfocr scan.pdf

  # Transcript to file, searchable PDF alongside
  pdfocr scan.pdf -o scan.txt --embed scan_searchable.pdf

  # A PDF that already has a (bad) text layer: strip it and redo OCR
  pdfocr --existing-text strip old.pdf -o old.txt

  # Only remove the text layer
  pdfocr --strip-only old.pdf

  # Japanese and English, four pages in flight, enhanced contrast
  pdfocr --languages ja-JP,en-US --concurrency 4 --enhance scan.pdf

  # Report suspect tokens with a custom confusion map
  pdfocr --suspects --confusion-map map.json scan.png

  # Post-process the searchable PDF with a script
  pdfocr scan.pdf --embed out.pdf --post-process fix.py --post-process-output final.pdf

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium (file or directory)
  RUST_LOG          Log filter (overrides -v / -q)

EXTERNAL TOOLS:
  tesseract         OCR engine           brew install tesseract tesseract-lang
  gs (ghostscript)  text-layer removal   brew install ghostscript
"#;

/// OCR scanned PDFs and images into searchable text.
#[derive(Parser, Debug)]
#[command(
    name = "pdfocr",
    version,
    about = "OCR scanned PDFs and images into text and searchable PDFs",
    long_about = "Recognise text in scanned PDFs and PNG/JPEG/TIFF images, print a page-ordered \
transcript, and optionally write the recognised words back into the PDF as an invisible, \
searchable text layer.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF or image file.
    input: PathBuf,

    /// Write the transcript to this file instead of stdout.
    #[arg(short, long, env = "PDFOCR_OUTPUT")]
    output: Option<PathBuf>,

    /// What to do when the PDF already contains text: view or strip.
    #[arg(long, env = "PDFOCR_EXISTING_TEXT", value_enum)]
    existing_text: Option<ExistingTextArg>,

    /// Write a copy of the PDF with an invisible text layer to this path.
    #[arg(long, env = "PDFOCR_EMBED")]
    embed: Option<PathBuf>,

    /// Only remove the text layer, then exit.
    #[arg(long)]
    strip_only: bool,

    /// Write stripped copies into a temporary directory instead of beside the input.
    #[arg(long, env = "PDFOCR_STRIP_TO_TEMP")]
    strip_to_temp: bool,

    /// Preferred recognition languages, most preferred first.
    #[arg(
        long,
        env = "PDFOCR_LANGUAGES",
        value_delimiter = ',',
        default_value = "ko-KR,en-US,ja-JP,zh-Hans,zh-Hant"
    )]
    languages: Vec<String>,

    /// Render upscale factor (0.5–8.0).
    #[arg(long, env = "PDFOCR_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Desaturate and raise contrast before recognition.
    #[arg(long, env = "PDFOCR_ENHANCE")]
    enhance: bool,

    /// Faster, less accurate recognition.
    #[arg(long, env = "PDFOCR_FAST")]
    fast: bool,

    /// Disable dictionary-based language correction.
    #[arg(long, env = "PDFOCR_NO_LANGUAGE_CORRECTION")]
    no_language_correction: bool,

    /// Pages recognised concurrently.
    #[arg(short, long, env = "PDFOCR_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFOCR_PASSWORD")]
    password: Option<String>,

    /// Print suspect tokens and proposed corrections to stderr.
    #[arg(long, env = "PDFOCR_SUSPECTS")]
    suspects: bool,

    /// Script whose mixing with Latin letters or digits is suspect.
    #[arg(long, env = "PDFOCR_SCRIPT", value_enum, default_value = "hangul")]
    script: ScriptArg,

    /// JSON object of confusable substrings to replacements.
    #[arg(long, env = "PDFOCR_CONFUSION_MAP")]
    confusion_map: Option<PathBuf>,

    /// Script run as `SCRIPT <input.pdf> <output.pdf>` after OCR.
    #[arg(long, requires = "post_process_output")]
    post_process: Option<PathBuf>,

    /// Output path for --post-process.
    #[arg(long)]
    post_process_output: Option<PathBuf>,

    /// Interpreter for --post-process (e.g. python3).
    #[arg(long)]
    interpreter: Option<PathBuf>,

    /// Ghostscript executable.
    #[arg(long, env = "PDFOCR_GS")]
    gs: Option<PathBuf>,

    /// Tesseract executable.
    #[arg(long, env = "PDFOCR_TESSERACT")]
    tesseract: Option<PathBuf>,

    /// TrueType font for the embedded text layer (default: Helvetica).
    #[arg(long, env = "PDFOCR_FONT")]
    font: Option<PathBuf>,

    /// Output structured JSON (OcrOutput) instead of the transcript.
    #[arg(long, env = "PDFOCR_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFOCR_NO_PROGRESS")]
    no_progress: bool,

    /// Print document metadata only, no OCR.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFOCR_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ExistingTextArg {
    View,
    Strip,
}

impl From<ExistingTextArg> for ExistingTextChoice {
    fn from(v: ExistingTextArg) -> Self {
        match v {
            ExistingTextArg::View => ExistingTextChoice::ViewExisting,
            ExistingTextArg::Strip => ExistingTextChoice::StripAndReprocess,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ScriptArg {
    Hangul,
    Han,
    Kana,
    Cyrillic,
}

impl From<ScriptArg> for Script {
    fn from(v: ScriptArg) -> Self {
        match v {
            ScriptArg::Hangul => Script::Hangul,
            ScriptArg::Han => Script::Han,
            ScriptArg::Kana => Script::Kana,
            ScriptArg::Cyrillic => Script::Cyrillic,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would fight with the progress bar; it stays quiet while shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgressCallback::new);
    let mut config = build_config(
        &cli,
        progress.clone().map(|p| p as ProgressCallback),
    )?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect input")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            for (label, value) in [
                ("Title", &meta.title),
                ("Author", &meta.author),
                ("Subject", &meta.subject),
                ("Creator", &meta.creator),
                ("Producer", &meta.producer),
            ] {
                if let Some(v) = value {
                    println!("{:<13} {}", format!("{label}:"), v);
                }
            }
            println!("Pages:        {}", meta.page_count);
            println!("Version:      {}", meta.pdf_version);
            println!(
                "Text pages:   {}",
                if meta.pages_with_text.is_empty() {
                    "none".to_string()
                } else {
                    meta.pages_with_text
                        .iter()
                        .map(|i| (i + 1).to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            );
        }
        return Ok(());
    }

    // ── Strip-only mode ──────────────────────────────────────────────────
    if cli.strip_only {
        let stripped = strip_text_layer(&cli.input, &config)
            .await
            .context("Failed to strip text layer")?;
        let path = stripped.document.source.clone();
        // A temp workspace is deleted on drop; keep it.
        if let Some(dir) = stripped.workspace {
            let _ = dir.keep();
        }
        if !cli.quiet {
            eprintln!(
                "{} text layer removed  →  {}",
                green("✔"),
                bold(&path.display().to_string())
            );
        }
        println!("{}", path.display());
        return Ok(());
    }

    // ── OCR, asking about an existing text layer when interactive ────────
    let output = match ocr(&cli.input, &config).await {
        Err(OcrError::ExistingTextLayer {
            pages_with_text, ..
        }) if io::stdin().is_terminal() && !cli.quiet => {
            let ask = || ask_existing_text(pages_with_text.len());
            let choice = match &progress {
                Some(p) => p.bar.suspend(ask),
                None => ask(),
            }?;
            let Some(choice) = choice else {
                bail!("Cancelled: the document already contains text");
            };
            config.existing_text = Some(choice);
            ocr(&cli.input, &config).await.context("OCR failed")?
        }
        other => other.context("OCR failed")?,
    };

    // ── Emit transcript ──────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if let Some(ref path) = cli.output {
        write_transcript(&output, path)
            .await
            .with_context(|| format!("Failed to write transcript to {}", path.display()))?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.text().as_bytes())
            .context("Failed to write to stdout")?;
    }

    if cli.suspects && !cli.json {
        print_suspects(&output);
    }

    // ── Embed / post-process ─────────────────────────────────────────────
    let mut pdf_for_post = output.stripped_from.as_ref().map(|_| output.document.source.clone());
    if let Some(ref dest) = cli.embed {
        embed_text_layer(&output, dest, &config)
            .await
            .context("Failed to embed text layer")?;
        if !cli.quiet {
            eprintln!(
                "{} searchable PDF  →  {}",
                green("✔"),
                bold(&dest.display().to_string())
            );
        }
        pdf_for_post = Some(dest.clone());
    }

    if let (Some(script), Some(post_out)) = (&cli.post_process, &cli.post_process_output) {
        let tool = match &cli.interpreter {
            Some(interp) => ScriptTool::new(script).with_interpreter(interp),
            None => ScriptTool::new(script),
        };
        let post_in = pdf_for_post.unwrap_or_else(|| cli.input.clone());
        let written = run_post_process(&tool, &post_in, post_out)
            .await
            .context("Post-processing failed")?;
        if !cli.quiet {
            eprintln!(
                "{} post-processed  →  {}",
                green("✔"),
                bold(&written.display().to_string())
            );
        }
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet && !cli.json {
        let s = &output.stats;
        eprintln!(
            "{}  {} extracted, {} recognised, {} empty, {} failed, {} skipped  {}",
            if s.failed_pages() == 0 { green("✔") } else { yellow("⚠") },
            s.extracted_pages,
            s.recognized_pages,
            s.empty_pages,
            s.failed_pages(),
            s.skipped_pages,
            dim(&format!("{}ms", s.total_duration_ms)),
        );
        if let Some(ref path) = cli.output {
            eprintln!("   transcript  →  {}", bold(&path.display().to_string()));
        }
    }

    Ok(())
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<OcrConfig> {
    let mut engine = PdfiumEngine::default();
    if let Some(ref font) = cli.font {
        engine = engine.with_font(font);
    }
    let recognizer = match cli.tesseract {
        Some(ref bin) => TesseractRecognizer::default().with_binary(bin),
        None => TesseractRecognizer::default(),
    };
    let stripper = match cli.gs {
        Some(ref gs) => GhostscriptTool::at(gs),
        None => GhostscriptTool::default(),
    };

    let mut builder = OcrConfig::builder()
        .scale(cli.scale)
        .languages(cli.languages.iter().map(|l| l.trim()))
        .concurrency(cli.concurrency)
        .language_correction(!cli.no_language_correction)
        .suspect_script(cli.script.into())
        .strip_destination(if cli.strip_to_temp {
            StripDestination::TempDir
        } else {
            StripDestination::Alongside
        })
        .engine(Arc::new(engine))
        .recognizer(Arc::new(recognizer))
        .stripper(Arc::new(stripper));

    if cli.fast {
        builder = builder.recognition_level(RecognitionLevel::Fast);
    }
    if cli.enhance {
        builder = builder.color_adjust(ColorAdjust::enhance());
    }
    if let Some(choice) = cli.existing_text {
        builder = builder.existing_text(choice.into());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref path) = cli.confusion_map {
        let map = ConfusionMap::load_json(path)
            .with_context(|| format!("Failed to load confusion map {}", path.display()))?;
        builder = builder.confusion_map(Arc::new(map));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Ask on the terminal how to handle a document that already has text.
/// `Ok(None)` means the user cancelled.
fn ask_existing_text(pages: usize) -> Result<Option<ExistingTextChoice>> {
    eprintln!(
        "{} This document already contains text on {} page(s).",
        yellow("?"),
        bold(&pages.to_string())
    );
    eprint!("  [v]iew existing text, [s]trip it and run OCR, [c]ancel: ");
    io::stderr().flush().ok();

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read answer")?;
    Ok(match line.trim().to_lowercase().as_str() {
        "v" | "view" => Some(ExistingTextChoice::ViewExisting),
        "s" | "strip" => Some(ExistingTextChoice::StripAndReprocess),
        _ => None,
    })
}

fn print_suspects(output: &OcrOutput) {
    let suspects = output.transcript.suspects();
    if suspects.is_empty() {
        eprintln!("{} no suspect tokens", green("✔"));
        return;
    }
    eprintln!("{} {} suspect token(s):", yellow("⚠"), suspects.len());
    for s in suspects {
        let proposals = s
            .corrections
            .iter()
            .map(|c| c.corrected.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        eprintln!(
            "  {:<24} ×{:<3} {:<28} {}",
            s.token,
            s.occurrences,
            dim(&format!("{:?}", s.reason)),
            if proposals.is_empty() {
                String::new()
            } else {
                format!("→ {proposals}")
            }
        );
    }
}
