//! Recognition: bitmap → positioned text lines.
//!
//! [`Recognizer`] is the seam to the OCR engine. An engine returns
//! [`TextObservation`]s, one per detected region, each with candidates
//! ranked best-first; [`recognize_page`] keeps only the top candidate and
//! turns what is left into [`RecognizedToken`]s plus the page's text.
//!
//! The default engine, [`TesseractRecognizer`], runs the `tesseract` CLI
//! with TSV output and groups words into lines by their
//! `(block, paragraph, line)` ids.

use crate::config::RecognitionLevel;
use crate::document::{NormalizedBox, RecognizedToken};
use crate::pipeline::encode::write_png_temp;
use crate::pipeline::postprocess::clean_recognized_text;
use crate::pipeline::render::Bitmap;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Failures reported by a [`Recognizer`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    /// The engine is not installed or cannot start.
    #[error("'{tool}' is not available.\n{hint}")]
    Unavailable { tool: String, hint: String },

    /// The engine ran and failed on this input.
    #[error("{0}")]
    Failed(String),
}

/// Per-run recognition settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionOptions {
    /// BCP-47 tags in preference order.
    pub languages: Vec<String>,
    pub level: RecognitionLevel,
    pub language_correction: bool,
    /// Resolution hint for the engine, when the bitmap came from a PDF.
    pub dpi: Option<u32>,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            languages: vec!["en-US".into()],
            level: RecognitionLevel::Accurate,
            language_correction: true,
            dpi: None,
        }
    }
}

/// One ranked reading of a region.
#[derive(Debug, Clone, PartialEq)]
pub struct TextCandidate {
    pub text: String,
    /// In `[0, 1]`.
    pub confidence: f32,
}

/// A detected text region and its candidate readings, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct TextObservation {
    /// Bottom-left-origin normalized box.
    pub bbox: NormalizedBox,
    pub candidates: Vec<TextCandidate>,
}

impl TextObservation {
    pub fn top_candidate(&self) -> Option<&TextCandidate> {
        self.candidates.first()
    }
}

/// OCR capability.
///
/// `recognize` is long-running; implementations must not block the async
/// runtime (spawn a process, or use `spawn_blocking`).
#[async_trait]
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fail fast, before any page work, when the engine is missing.
    async fn ensure_available(&self) -> Result<(), RecognitionError> {
        Ok(())
    }

    /// BCP-47 tags the engine can recognise. Empty when it cannot say.
    async fn supported_languages(&self) -> Result<Vec<String>, RecognitionError> {
        Ok(Vec::new())
    }

    async fn recognize(
        &self,
        bitmap: &Bitmap,
        options: &RecognitionOptions,
    ) -> Result<Vec<TextObservation>, RecognitionError>;
}

/// Preferred languages first, then any other supported ones, no duplicates.
pub fn resolve_languages(preferred: &[String], supported: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(preferred.len() + supported.len());
    for lang in preferred.iter().chain(supported) {
        if !out.iter().any(|l| l.eq_ignore_ascii_case(lang)) {
            out.push(lang.clone());
        }
    }
    out
}

/// Tokens and text for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecognition {
    pub tokens: Vec<RecognizedToken>,
    /// Recognised lines joined by `\n`, cleaned; empty when nothing was read.
    pub text: String,
}

/// Recognise a bitmap, keeping only the top candidate per region.
pub async fn recognize_page(
    recognizer: &dyn Recognizer,
    bitmap: &Bitmap,
    options: &RecognitionOptions,
) -> Result<PageRecognition, RecognitionError> {
    let observations = recognizer.recognize(bitmap, options).await?;

    let tokens: Vec<RecognizedToken> = observations
        .into_iter()
        .filter_map(|obs| {
            let top = obs.top_candidate()?;
            let text = top.text.trim();
            if text.is_empty() {
                return None;
            }
            Some(RecognizedToken {
                text: text.to_string(),
                bbox: obs.bbox,
                confidence: top.confidence.clamp(0.0, 1.0),
                page_index: bitmap.page_index,
            })
        })
        .collect();

    let joined = tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let text = clean_recognized_text(&joined);

    debug!(
        "Page {}: {} lines, {} chars recognised",
        bitmap.page_index + 1,
        tokens.len(),
        text.len()
    );
    Ok(PageRecognition { tokens, text })
}

// ── Tesseract ────────────────────────────────────────────────────────────

const TESSERACT_HINT: &str = "Install it with: brew install tesseract tesseract-lang (macOS) \
or apt install tesseract-ocr tesseract-ocr-kor (Debian/Ubuntu).";

/// BCP-47 tag → tesseract traineddata name.
pub fn tesseract_code(tag: &str) -> String {
    let lower = tag.to_ascii_lowercase();
    let code = match lower.as_str() {
        "zh-hans" | "zh-cn" | "zh-sg" => "chi_sim",
        "zh-hant" | "zh-tw" | "zh-hk" => "chi_tra",
        _ => match lower.split(['-', '_']).next().unwrap_or("") {
            "ko" => "kor",
            "en" => "eng",
            "ja" => "jpn",
            "zh" => "chi_sim",
            "fr" => "fra",
            "de" => "deu",
            "es" => "spa",
            "it" => "ita",
            "pt" => "por",
            "ru" => "rus",
            _ => return tag.to_string(),
        },
    };
    code.to_string()
}

/// tesseract traineddata name → BCP-47 tag (unknown names pass through).
pub fn bcp47_tag(code: &str) -> String {
    let tag = match code {
        "kor" => "ko-KR",
        "eng" => "en-US",
        "jpn" => "ja-JP",
        "chi_sim" => "zh-Hans",
        "chi_tra" => "zh-Hant",
        "fra" => "fr-FR",
        "deu" => "de-DE",
        "spa" => "es-ES",
        "ita" => "it-IT",
        "por" => "pt-PT",
        "rus" => "ru-RU",
        other => other,
    };
    tag.to_string()
}

/// [`Recognizer`] that shells out to the `tesseract` CLI.
#[derive(Debug)]
pub struct TesseractRecognizer {
    binary: PathBuf,
    psm: u32,
    max_languages: usize,
    installed: OnceCell<Vec<String>>,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            psm: 3,
            max_languages: 8,
            installed: OnceCell::new(),
        }
    }
}

impl TesseractRecognizer {
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Page segmentation mode passed as `--psm`. Default: 3 (automatic).
    pub fn with_psm(mut self, psm: u32) -> Self {
        self.psm = psm;
        self
    }

    /// Upper bound on models loaded per call; each one slows tesseract down.
    pub fn with_max_languages(mut self, n: usize) -> Self {
        self.max_languages = n.max(1);
        self
    }

    fn tool_name(&self) -> String {
        self.binary.display().to_string()
    }

    fn unavailable(&self) -> RecognitionError {
        RecognitionError::Unavailable {
            tool: self.tool_name(),
            hint: TESSERACT_HINT.into(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output, RecognitionError> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    self.unavailable()
                } else {
                    RecognitionError::Failed(format!("failed to start {}: {e}", self.tool_name()))
                }
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Failed(format!(
                "{} exited with {}: {}",
                self.tool_name(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }

    /// Installed traineddata names, excluding the OSD/equation helpers.
    async fn installed_codes(&self) -> Result<&Vec<String>, RecognitionError> {
        self.installed
            .get_or_try_init(|| async {
                let out = self.run(&["--list-langs".to_string()]).await?;
                Ok::<_, RecognitionError>(parse_list_langs(&String::from_utf8_lossy(&out.stdout)))
            })
            .await
    }

    async fn language_arg(&self, languages: &[String]) -> Result<String, RecognitionError> {
        let installed = self.installed_codes().await?;
        let mut codes: Vec<String> = Vec::new();
        for code in languages.iter().map(|l| tesseract_code(l)) {
            if codes.contains(&code) {
                continue;
            }
            if installed.is_empty() || installed.contains(&code) {
                codes.push(code);
            } else {
                debug!("tesseract has no '{}' model; skipping", code);
            }
        }
        codes.truncate(self.max_languages);
        if codes.is_empty() {
            warn!("None of {:?} are installed for tesseract; falling back to eng", languages);
            codes.push("eng".into());
        }
        Ok(codes.join("+"))
    }
}

#[async_trait]
impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn ensure_available(&self) -> Result<(), RecognitionError> {
        self.run(&["--version".to_string()]).await.map(|_| ())
    }

    async fn supported_languages(&self) -> Result<Vec<String>, RecognitionError> {
        Ok(self
            .installed_codes()
            .await?
            .iter()
            .map(|c| bcp47_tag(c))
            .collect())
    }

    async fn recognize(
        &self,
        bitmap: &Bitmap,
        options: &RecognitionOptions,
    ) -> Result<Vec<TextObservation>, RecognitionError> {
        let png = write_png_temp(&bitmap.image).map_err(RecognitionError::Failed)?;
        let langs = self.language_arg(&options.languages).await?;

        let oem = match options.level {
            RecognitionLevel::Accurate => "1",
            RecognitionLevel::Fast => "3",
        };
        let mut args = vec![
            png.path().display().to_string(),
            "stdout".into(),
            "-l".into(),
            langs,
            "--oem".into(),
            oem.into(),
            "--psm".into(),
            self.psm.to_string(),
        ];
        if let Some(dpi) = options.dpi {
            args.push("--dpi".into());
            args.push(dpi.to_string());
        }
        if !options.language_correction {
            for c in ["load_system_dawg=0", "load_freq_dawg=0"] {
                args.push("-c".into());
                args.push(c.into());
            }
        }
        args.push("tsv".into());

        let out = self.run(&args).await?;
        let tsv = String::from_utf8_lossy(&out.stdout);
        Ok(parse_tsv(&tsv, bitmap.width(), bitmap.height()))
    }
}

fn parse_list_langs(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "osd" && *l != "equ")
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default)]
struct LineAccumulator {
    words: Vec<String>,
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
    conf_sum: f32,
}

impl LineAccumulator {
    fn push(&mut self, text: &str, left: u32, top: u32, width: u32, height: u32, conf: f32) {
        if self.words.is_empty() {
            self.left = left;
            self.top = top;
            self.right = left + width;
            self.bottom = top + height;
        } else {
            self.left = self.left.min(left);
            self.top = self.top.min(top);
            self.right = self.right.max(left + width);
            self.bottom = self.bottom.max(top + height);
        }
        self.words.push(text.to_string());
        self.conf_sum += conf;
    }
}

/// Parse tesseract TSV into one observation per text line, in reading order.
fn parse_tsv(tsv: &str, image_width: u32, image_height: u32) -> Vec<TextObservation> {
    let mut lines: BTreeMap<(i32, i32, i32, i32), LineAccumulator> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        let id = |i: usize| cols[i].parse::<i32>().unwrap_or(0);
        let px = |i: usize| cols[i].parse::<u32>().unwrap_or(0);

        lines
            .entry((id(1), id(2), id(3), id(4)))
            .or_default()
            .push(text, px(6), px(7), px(8), px(9), conf);
    }

    lines
        .into_values()
        .map(|line| {
            let confidence = line.conf_sum / line.words.len() as f32 / 100.0;
            TextObservation {
                bbox: NormalizedBox::from_top_left_pixels(
                    line.left,
                    line.top,
                    line.right - line.left,
                    line.bottom - line.top,
                    image_width,
                    image_height,
                ),
                candidates: vec![TextCandidate {
                    text: line.words.join(" "),
                    confidence,
                }],
            }
        })
        .collect()
}
