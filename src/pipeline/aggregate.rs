//! Page aggregation: one ordered [`DocumentTranscript`] out of per-page work.
//!
//! ## Shape of a run
//!
//! ```text
//! render worker ──mpsc──▶ buffered(concurrency) ──▶ page loop ──▶ TranscriptSlots
//! (spawn_blocking)         recognize_page futures     0..n, in order
//! ```
//!
//! The page loop walks indices `0..n` strictly in order. Pages with text are
//! resolved on the spot; pages needing OCR take the next item from the
//! recognition stream, which `buffered` yields in submission order (that is,
//! page order) however the futures finish. Each result is written once into
//! its slot and the transcript is only assembled after every slot is full,
//! so a slow page can never be overtaken or lost.
//!
//! Progress is reported from the loop, after each page, so it is
//! non-decreasing and hits `1.0` exactly once, at the end.

use crate::config::{ColorAdjust, OcrConfig};
use crate::document::{Document, SourceKind};
use crate::error::OcrError;
use crate::output::{DocumentTranscript, PageResult, PageStatus};
use crate::pipeline::classify::{classify, pages_needing_ocr, PageClass};
use crate::pipeline::engine::PdfEngine;
use crate::pipeline::recognize::{recognize_page, RecognitionOptions, Recognizer};
use crate::pipeline::render::{spawn_render_worker, Bitmap, RenderRequest};
use crate::pipeline::suspect::SuspectTokenDetector;
use crate::progress::ProgressCallback;
use futures::stream::{BoxStream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

// ── Slots ────────────────────────────────────────────────────────────────

/// Index-addressed, write-once storage for page results.
#[derive(Debug)]
pub struct TranscriptSlots {
    slots: Vec<Option<PageResult>>,
}

impl TranscriptSlots {
    pub fn new(page_count: usize) -> Self {
        Self {
            slots: vec![None; page_count],
        }
    }

    /// Store `result` in its page's slot. Each slot accepts exactly one write.
    pub fn fill(&mut self, result: PageResult) -> Result<(), OcrError> {
        let idx = result.page_index;
        let len = self.slots.len();
        let slot = self.slots.get_mut(idx).ok_or_else(|| {
            OcrError::Internal(format!("page index {idx} out of range ({len} slots)"))
        })?;
        if slot.is_some() {
            return Err(OcrError::Internal(format!(
                "page {} produced two results",
                idx + 1
            )));
        }
        *slot = Some(result);
        Ok(())
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Assemble the transcript. Fails if any slot is still empty.
    pub fn into_transcript(self, source: &Path) -> Result<DocumentTranscript, OcrError> {
        let pages = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| OcrError::Internal(format!("page {} has no result", i + 1)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DocumentTranscript {
            source: source.to_path_buf(),
            pages,
        })
    }
}

// ── Aggregator ───────────────────────────────────────────────────────────

/// Which pages get OCR'd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateMode {
    /// Extract pages with text, recognise the rest.
    Full,
    /// Extract pages with text, mark the rest [`PageStatus::Skipped`].
    ExistingOnly,
}

/// Everything a recognition future needs, shared across pages.
struct RecognizeContext {
    recognizer: Arc<dyn Recognizer>,
    options: RecognitionOptions,
    detector: Option<SuspectTokenDetector>,
    retain_bitmaps: bool,
}

/// Drives classification, rendering and recognition for one document.
pub struct PageAggregator {
    engine: Arc<dyn PdfEngine>,
    recognizer: Arc<dyn Recognizer>,
    base_options: RecognitionOptions,
    scale: f32,
    color_adjust: Option<ColorAdjust>,
    password: Option<String>,
    concurrency: usize,
    detector: Option<SuspectTokenDetector>,
    retain_bitmaps: bool,
    progress: ProgressCallback,
}

impl PageAggregator {
    /// `languages` is the already-resolved preference list.
    pub fn new(config: &OcrConfig, languages: Vec<String>) -> Self {
        Self {
            engine: Arc::clone(&config.engine),
            recognizer: Arc::clone(&config.recognizer),
            base_options: RecognitionOptions {
                languages,
                level: config.recognition_level,
                language_correction: config.language_correction,
                dpi: None,
            },
            scale: config.scale,
            color_adjust: config.color_adjust,
            password: config.password.clone(),
            concurrency: config.concurrency.max(1),
            detector: config.detect_suspects.then(|| {
                SuspectTokenDetector::new(config.suspect_script, Arc::clone(&config.confusion_map))
            }),
            retain_bitmaps: config.retain_bitmaps,
            progress: Arc::clone(&config.progress_callback),
        }
    }

    /// Produce one result per page of `document`, in page order.
    pub async fn aggregate(
        &self,
        document: &Document,
        mode: AggregateMode,
    ) -> Result<DocumentTranscript, OcrError> {
        let total = document.page_count();
        let ocr_pages = match mode {
            AggregateMode::Full => pages_needing_ocr(document),
            AggregateMode::ExistingOnly => Vec::new(),
        };
        info!(
            "Aggregating {} pages ({} need OCR) from {}",
            total,
            ocr_pages.len(),
            document.source.display()
        );
        self.progress.on_run_start(total);

        let (mut recognized, mut worker) = self.start_recognition(document, ocr_pages);
        let mut slots = TranscriptSlots::new(total);

        for page in &document.pages {
            let i = page.index;
            self.progress.on_page_start(i + 1, total);

            let result = match (classify(page), mode) {
                (PageClass::HasText, _) => {
                    PageResult::extracted(i, page.embedded_text.clone().unwrap_or_default())
                }
                (PageClass::NeedsOcr, AggregateMode::ExistingOnly) => PageResult::skipped(i),
                (PageClass::NeedsOcr, AggregateMode::Full) => {
                    let next = match recognized.as_mut() {
                        Some(stream) => stream.next().await,
                        None => None,
                    };
                    match next {
                        Some(r) if r.page_index == i => r,
                        Some(r) => {
                            return Err(OcrError::Internal(format!(
                                "expected page {} from recognition, got page {}",
                                i + 1,
                                r.page_index + 1
                            )))
                        }
                        None => {
                            // The worker stopped early: surface a document-level
                            // failure if it had one, otherwise mark the page.
                            if let Some(handle) = worker.take() {
                                join_worker(handle).await?;
                            }
                            PageResult::render_failed(i, "no rendering context")
                        }
                    }
                }
            };

            self.report(&result, total);
            slots.fill(result)?;
            self.progress.on_progress((i + 1) as f32 / total as f32);
        }

        drop(recognized);
        if let Some(handle) = worker {
            join_worker(handle).await?;
        }

        if total == 0 {
            self.progress.on_progress(1.0);
        }

        let transcript = slots.into_transcript(&document.source)?;
        let successes =
            transcript.count(PageStatus::ExtractedDirectly) + transcript.count(PageStatus::Recognized);
        self.progress.on_run_complete(total, successes);
        Ok(transcript)
    }

    fn start_recognition(
        &self,
        document: &Document,
        ocr_pages: Vec<usize>,
    ) -> (
        Option<BoxStream<'static, PageResult>>,
        Option<JoinHandle<Result<(), OcrError>>>,
    ) {
        if ocr_pages.is_empty() {
            return (None, None);
        }

        let request = RenderRequest::new(document, ocr_pages, self.scale)
            .password(self.password.clone())
            .color_adjust(self.color_adjust);

        let mut options = self.base_options.clone();
        if document.kind == SourceKind::Pdf {
            options.dpi = Some((72.0 * request.scale).round() as u32);
        }
        let ctx = Arc::new(RecognizeContext {
            recognizer: Arc::clone(&self.recognizer),
            options,
            detector: self.detector.clone(),
            retain_bitmaps: self.retain_bitmaps,
        });

        let (rx, handle) = spawn_render_worker(Arc::clone(&self.engine), request);
        let stream = ReceiverStream::new(rx)
            .map(move |(idx, rendered)| recognize_one(Arc::clone(&ctx), idx, rendered))
            .buffered(self.concurrency)
            .boxed();
        (Some(stream), Some(handle))
    }

    fn report(&self, result: &PageResult, total: usize) {
        let page = result.page_number();
        match (&result.status, &result.error) {
            (_, Some(err)) => {
                warn!("{}", err);
                self.progress.on_page_error(page, total, &err.to_string());
            }
            (PageStatus::Skipped, _) => debug!("Page {}: skipped", page),
            (status, None) => {
                debug!("Page {}: {:?}, {} chars", page, status, result.text.len());
                self.progress.on_page_complete(page, total, result.text.len());
            }
        }
    }
}

async fn join_worker(handle: JoinHandle<Result<(), OcrError>>) -> Result<(), OcrError> {
    handle
        .await
        .map_err(|e| OcrError::Internal(format!("Render task panicked: {e}")))?
}

async fn recognize_one(
    ctx: Arc<RecognizeContext>,
    idx: usize,
    rendered: Result<Bitmap, String>,
) -> PageResult {
    let started = Instant::now();
    let bitmap = match rendered {
        Ok(b) => b,
        Err(detail) => return PageResult::render_failed(idx, detail),
    };

    let mut result = match recognize_page(ctx.recognizer.as_ref(), &bitmap, &ctx.options).await {
        Ok(page) if page.text.is_empty() => PageResult::recognition_empty(idx),
        Ok(page) => {
            let mut r = PageResult::recognized(idx, page.tokens, page.text);
            if let Some(detector) = &ctx.detector {
                r.suspects = detector.detect(&r.text);
            }
            r
        }
        Err(e) => PageResult::recognition_failed(idx, e.to_string()),
    };

    result.duration_ms = started.elapsed().as_millis() as u64;
    if ctx.retain_bitmaps {
        result.bitmap = Some(bitmap);
    }
    result
}
