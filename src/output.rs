//! Result types produced by an OCR run.
//!
//! A run yields one [`PageResult`] per page, in page order, collected into a
//! [`DocumentTranscript`]. Failures are values here, not errors: a page that
//! could not be rendered still has a `PageResult`, carrying a marker string
//! in place of text, so the transcript always has exactly one entry per page.

use crate::document::{Document, RecognizedToken};
use crate::error::PageError;
use crate::pipeline::render::Bitmap;
use crate::pipeline::suspect::SuspectToken;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tempfile::TempDir;

/// How a page's text was obtained (or why it has none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageStatus {
    /// The page's embedded text layer was used verbatim.
    ExtractedDirectly,
    /// The page was rendered and OCR produced text.
    Recognized,
    /// The page could not be rasterised.
    RenderFailed,
    /// OCR ran and found nothing.
    RecognitionEmpty,
    /// The recognizer returned an error for this page.
    RecognitionFailed,
    /// The page has no text and OCR was not requested for it
    /// (caller chose to view the existing text layer).
    Skipped,
}

/// The outcome for a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 0-based page index.
    pub page_index: usize,
    pub status: PageStatus,
    /// Recognised tokens; empty unless `status == Recognized`.
    pub tokens: Vec<RecognizedToken>,
    /// Page text, or a marker naming the page and the failure.
    pub text: String,
    /// Tokens flagged as likely misrecognitions.
    #[serde(default)]
    pub suspects: Vec<SuspectToken>,
    /// The page-level failure, if any.
    pub error: Option<PageError>,
    /// Wall-clock time spent on this page.
    pub duration_ms: u64,
    /// Rendered page, kept only when `retain_bitmaps` is enabled.
    #[serde(skip)]
    pub bitmap: Option<Bitmap>,
}

impl PageResult {
    fn base(page_index: usize, status: PageStatus, text: String) -> Self {
        Self {
            page_index,
            status,
            tokens: Vec::new(),
            text,
            suspects: Vec::new(),
            error: None,
            duration_ms: 0,
            bitmap: None,
        }
    }

    /// Embedded text taken as-is.
    pub fn extracted(page_index: usize, text: impl Into<String>) -> Self {
        Self::base(page_index, PageStatus::ExtractedDirectly, text.into())
    }

    /// OCR output for a page.
    pub fn recognized(page_index: usize, tokens: Vec<RecognizedToken>, text: String) -> Self {
        let mut r = Self::base(page_index, PageStatus::Recognized, text);
        r.tokens = tokens;
        r
    }

    pub fn render_failed(page_index: usize, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let page = page_index + 1;
        let mut r = Self::base(
            page_index,
            PageStatus::RenderFailed,
            format!("[render failed: page {page}: {detail}]"),
        );
        r.error = Some(PageError::RenderFailed { page, detail });
        r
    }

    pub fn recognition_empty(page_index: usize) -> Self {
        let page = page_index + 1;
        let mut r = Self::base(
            page_index,
            PageStatus::RecognitionEmpty,
            format!("[no text recognised on page {page}]"),
        );
        r.error = Some(PageError::RecognitionEmpty { page });
        r
    }

    pub fn recognition_failed(page_index: usize, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let page = page_index + 1;
        let mut r = Self::base(
            page_index,
            PageStatus::RecognitionFailed,
            format!("[recognition failed: page {page}: {detail}]"),
        );
        r.error = Some(PageError::RecognitionFailed { page, detail });
        r
    }

    pub fn skipped(page_index: usize) -> Self {
        let page = page_index + 1;
        Self::base(
            page_index,
            PageStatus::Skipped,
            format!("[page {page} has no embedded text; OCR skipped]"),
        )
    }

    /// 1-based page number.
    pub fn page_number(&self) -> usize {
        self.page_index + 1
    }

    /// The `[Page N]` header that precedes this page in the transcript.
    pub fn header(&self) -> String {
        page_header(self.page_number())
    }
}

/// Header line for a 1-based page number.
pub fn page_header(page_number: usize) -> String {
    format!("[Page {page_number}]")
}

/// Per-page results for a whole document, one entry per page in page order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTranscript {
    /// The document that was actually processed (the stripped copy when the
    /// text layer was removed first).
    pub source: PathBuf,
    pub pages: Vec<PageResult>,
}

impl DocumentTranscript {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Plain-text transcript: each page prefixed by its `[Page N]` header.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for page in &self.pages {
            out.push_str(&page.header());
            out.push('\n');
            out.push_str(&page.text);
            out.push_str("\n\n");
        }
        out
    }

    /// Number of pages with the given status.
    pub fn count(&self, status: PageStatus) -> usize {
        self.pages.iter().filter(|p| p.status == status).count()
    }

    /// Recognised tokens keyed by page index; pages without tokens are absent.
    pub fn tokens_by_page(&self) -> BTreeMap<usize, Vec<RecognizedToken>> {
        self.pages
            .iter()
            .filter(|p| !p.tokens.is_empty())
            .map(|p| (p.page_index, p.tokens.clone()))
            .collect()
    }

    /// Distinct suspect tokens across all pages, in page order.
    pub fn suspects(&self) -> Vec<&SuspectToken> {
        let mut seen = std::collections::HashSet::new();
        self.pages
            .iter()
            .flat_map(|p| p.suspects.iter())
            .filter(|s| seen.insert(s.token.as_str()))
            .collect()
    }

    /// Replace every occurrence of `from` with `to` in page texts and token
    /// texts. Returns the number of replacements made in page texts.
    ///
    /// This is the only way a correction reaches the transcript; detection
    /// never applies one by itself.
    pub fn apply_correction(&mut self, from: &str, to: &str) -> usize {
        if from.is_empty() {
            return 0;
        }
        let mut replaced = 0;
        for page in &mut self.pages {
            let hits = page.text.matches(from).count();
            if hits > 0 {
                page.text = page.text.replace(from, to);
                replaced += hits;
            }
            for token in &mut page.tokens {
                if token.text.contains(from) {
                    token.text = token.text.replace(from, to);
                }
            }
            page.suspects.retain(|s| !s.token.contains(from));
        }
        replaced
    }
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrStats {
    pub total_pages: usize,
    pub extracted_pages: usize,
    pub recognized_pages: usize,
    pub empty_pages: usize,
    pub render_failed_pages: usize,
    pub recognition_failed_pages: usize,
    pub skipped_pages: usize,
    pub total_tokens: usize,
    pub suspect_tokens: usize,
    /// `true` when the text layer was stripped before OCR.
    pub stripped: bool,
    pub total_duration_ms: u64,
    pub ocr_duration_ms: u64,
}

impl OcrStats {
    pub fn from_transcript(transcript: &DocumentTranscript) -> Self {
        Self {
            total_pages: transcript.len(),
            extracted_pages: transcript.count(PageStatus::ExtractedDirectly),
            recognized_pages: transcript.count(PageStatus::Recognized),
            empty_pages: transcript.count(PageStatus::RecognitionEmpty),
            render_failed_pages: transcript.count(PageStatus::RenderFailed),
            recognition_failed_pages: transcript.count(PageStatus::RecognitionFailed),
            skipped_pages: transcript.count(PageStatus::Skipped),
            total_tokens: transcript.pages.iter().map(|p| p.tokens.len()).sum(),
            suspect_tokens: transcript.suspects().len(),
            ..Default::default()
        }
    }

    /// Pages that ended with a per-page failure.
    pub fn failed_pages(&self) -> usize {
        self.render_failed_pages + self.recognition_failed_pages
    }
}

/// Everything an OCR run returns.
#[derive(Debug, Serialize)]
pub struct OcrOutput {
    pub transcript: DocumentTranscript,
    /// The document the transcript was produced from.
    pub document: Document,
    pub stats: OcrStats,
    /// Original input when the text layer was stripped first.
    pub stripped_from: Option<PathBuf>,
    /// Keeps a temporary stripped copy alive until the output is dropped.
    #[serde(skip)]
    pub(crate) workspace: Option<TempDir>,
}

impl OcrOutput {
    /// Plain-text transcript with `[Page N]` headers.
    pub fn text(&self) -> String {
        self.transcript.to_text()
    }
}

/// Metadata extracted from a PDF without running OCR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    /// 0-based indices of pages with a non-blank embedded text layer.
    pub pages_with_text: Vec<usize>,
    pub pdf_version: String,
}
