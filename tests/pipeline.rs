//! Whole-pipeline tests driven by in-memory fakes.
//!
//! `FakeEngine` stands in for pdfium, `FakeRecognizer` for tesseract and
//! `FakeStripTool` for ghostscript, so these run anywhere without native
//! libraries. Input files only need the right magic bytes.

use async_trait::async_trait;
use edgequake_pdfocr::pipeline::embed::PageLayer;
use edgequake_pdfocr::pipeline::engine::RenderSink;
use edgequake_pdfocr::pipeline::recognize::{
    RecognitionError, RecognitionOptions, TextCandidate, TextObservation,
};
use edgequake_pdfocr::pipeline::render::Bitmap;
use edgequake_pdfocr::pipeline::strip::ToolFailure;
use edgequake_pdfocr::{
    embed_text_layer, ocr, ocr_sync, ocr_to_file, strip_text_layer, Document, DocumentMetadata,
    ExistingTextChoice, ExternalTool, GhostscriptTool, NormalizedBox, OcrConfig, OcrError,
    OcrProgressCallback, Page, PageStatus, PdfEngine, Recognizer, SourceKind,
};
use image::DynamicImage;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────

/// Pages are `(width, height, embedded text)`. Paths containing
/// `_OCR_Removed` load with every text layer gone.
#[derive(Default)]
struct FakeEngine {
    pages: Vec<(f32, f32, Option<String>)>,
    failing_renders: HashSet<usize>,
    reload_broken: bool,
    rendered: AtomicUsize,
    written: Mutex<Vec<PageLayer>>,
}

impl FakeEngine {
    fn with_pages(pages: Vec<Option<&str>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|t| (612.0, 792.0, t.map(str::to_string)))
                .collect(),
            ..Default::default()
        }
    }

    fn blank(n: usize) -> Self {
        Self::with_pages(vec![None; n])
    }
}

impl PdfEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn load(&self, path: &Path, _password: Option<&str>) -> Result<Document, OcrError> {
        let stripped = path.to_string_lossy().contains("_OCR_Removed");
        if stripped && self.reload_broken {
            return Err(OcrError::CorruptPdf {
                path: path.to_path_buf(),
                detail: "trailer missing".into(),
            });
        }
        Ok(Document {
            source: path.to_path_buf(),
            kind: SourceKind::Pdf,
            pages: self
                .pages
                .iter()
                .enumerate()
                .map(|(index, (width, height, text))| Page {
                    index,
                    width: *width,
                    height: *height,
                    embedded_text: if stripped { None } else { text.clone() },
                })
                .collect(),
        })
    }

    fn metadata(&self, path: &Path, password: Option<&str>) -> Result<DocumentMetadata, OcrError> {
        let doc = self.load(path, password)?;
        Ok(DocumentMetadata {
            title: None,
            author: None,
            subject: None,
            creator: None,
            producer: None,
            page_count: doc.page_count(),
            pages_with_text: Vec::new(),
            pdf_version: "1.7".into(),
        })
    }

    fn render_pages(
        &self,
        _path: &Path,
        _password: Option<&str>,
        pages: &[usize],
        scale: f32,
        sink: &mut RenderSink<'_>,
    ) -> Result<(), OcrError> {
        for &idx in pages {
            self.rendered.fetch_add(1, Ordering::SeqCst);
            let raw = if self.failing_renders.contains(&idx) {
                Err("bitmap allocation failed".to_string())
            } else {
                let (w, h, _) = self.pages[idx];
                Ok(DynamicImage::new_rgb8(
                    (w * scale / 10.0) as u32,
                    (h * scale / 10.0) as u32,
                ))
            };
            if !sink(idx, raw) {
                break;
            }
        }
        Ok(())
    }

    fn write_text_layer(
        &self,
        _source: &Path,
        _password: Option<&str>,
        layers: &[PageLayer],
        dest: &Path,
    ) -> Result<(), OcrError> {
        self.written.lock().unwrap().extend_from_slice(layers);
        std::fs::write(dest, b"%PDF-1.7 with text layer").map_err(|e| OcrError::EmbedFailed {
            path: dest.to_path_buf(),
            detail: e.to_string(),
        })
    }
}

/// Reads "page N" off every bitmap, after a page-dependent delay.
#[derive(Default)]
struct FakeRecognizer {
    empty: HashSet<usize>,
    failing: HashSet<usize>,
    text_override: Option<String>,
    unavailable: bool,
    jitter: bool,
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn ensure_available(&self) -> Result<(), RecognitionError> {
        if self.unavailable {
            return Err(RecognitionError::Unavailable {
                tool: "tesseract".into(),
                hint: "install it".into(),
            });
        }
        Ok(())
    }

    async fn supported_languages(&self) -> Result<Vec<String>, RecognitionError> {
        Ok(vec!["en-US".into(), "ko-KR".into()])
    }

    async fn recognize(
        &self,
        bitmap: &Bitmap,
        _options: &RecognitionOptions,
    ) -> Result<Vec<TextObservation>, RecognitionError> {
        let idx = bitmap.page_index;
        if self.jitter {
            // Early pages finish last.
            tokio::time::sleep(Duration::from_millis(((8 - idx.min(8)) * 7) as u64)).await;
        }
        if self.failing.contains(&idx) {
            return Err(RecognitionError::Failed("engine crashed".into()));
        }
        if self.empty.contains(&idx) {
            return Ok(Vec::new());
        }
        let text = self
            .text_override
            .clone()
            .unwrap_or_else(|| format!("page {}", idx + 1));
        Ok(vec![TextObservation {
            bbox: NormalizedBox::new(0.1, 0.8, 0.5, 0.05),
            candidates: vec![
                TextCandidate {
                    text,
                    confidence: 0.97,
                },
                TextCandidate {
                    text: "runner-up".into(),
                    confidence: 0.4,
                },
            ],
        }])
    }
}

/// Copies the input to the output, like a text-filtering rewrite would.
struct FakeStripTool;

#[async_trait]
impl ExternalTool for FakeStripTool {
    fn name(&self) -> &'static str {
        "fake-strip"
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<PathBuf, ToolFailure> {
        tokio::fs::copy(input, output)
            .await
            .map_err(|e| ToolFailure::Failed {
                tool: "fake-strip".into(),
                diagnostic: e.to_string(),
            })?;
        Ok(output.to_path_buf())
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<f32>>);

impl OcrProgressCallback for Recorder {
    fn on_progress(&self, fraction: f32) {
        self.0.lock().unwrap().push(fraction);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Pipeline logs show up with `RUST_LOG=edgequake_pdfocr=debug cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fake_pdf(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("scan.pdf");
    std::fs::write(&path, b"%PDF-1.7\n% fake\n").unwrap();
    path
}

fn config(engine: Arc<FakeEngine>, recognizer: FakeRecognizer) -> edgequake_pdfocr::OcrConfigBuilder {
    init_tracing();
    OcrConfig::builder()
        .engine(engine)
        .recognizer(Arc::new(recognizer))
        .stripper(Arc::new(FakeStripTool))
        .languages(["en-US"])
}

fn statuses(output: &edgequake_pdfocr::OcrOutput) -> Vec<PageStatus> {
    output.transcript.pages.iter().map(|p| p.status).collect()
}

// ── Existing-text gate ───────────────────────────────────────────────────

#[tokio::test]
async fn gate_without_choice_reports_pages_with_text() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::with_pages(vec![Some("Already here"), None, None]));
    let cfg = config(Arc::clone(&engine), FakeRecognizer::default())
        .build()
        .unwrap();

    match ocr(fake_pdf(&dir), &cfg).await {
        Err(OcrError::ExistingTextLayer {
            pages_with_text, ..
        }) => assert_eq!(pages_with_text, vec![0]),
        other => panic!("expected ExistingTextLayer, got {other:?}"),
    }
    assert_eq!(engine.rendered.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn view_existing_extracts_and_skips() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::with_pages(vec![Some("Already here"), None, None]));
    let cfg = config(Arc::clone(&engine), FakeRecognizer::default())
        .existing_text(ExistingTextChoice::ViewExisting)
        .build()
        .unwrap();

    let out = ocr(fake_pdf(&dir), &cfg).await.unwrap();
    assert_eq!(
        statuses(&out),
        vec![
            PageStatus::ExtractedDirectly,
            PageStatus::Skipped,
            PageStatus::Skipped
        ]
    );
    assert_eq!(out.transcript.pages[0].text, "Already here");
    assert!(out.transcript.pages[2].text.contains("OCR skipped"));
    assert_eq!(engine.rendered.load(Ordering::SeqCst), 0);
    assert!(out.stripped_from.is_none());
}

#[tokio::test]
async fn strip_and_reprocess_recognises_every_page() {
    let dir = TempDir::new().unwrap();
    let input = fake_pdf(&dir);
    let engine = Arc::new(FakeEngine::with_pages(vec![Some("Already here"), None, None]));
    let cfg = config(Arc::clone(&engine), FakeRecognizer::default())
        .existing_text(ExistingTextChoice::StripAndReprocess)
        .build()
        .unwrap();

    let out = ocr(&input, &cfg).await.unwrap();
    assert_eq!(out.transcript.count(PageStatus::ExtractedDirectly), 0);
    assert_eq!(out.transcript.count(PageStatus::Recognized), 3);
    assert_eq!(out.transcript.pages[0].text, "page 1");
    assert!(out.stats.stripped);
    assert_eq!(out.stripped_from.as_deref(), Some(input.as_path()));
    assert_eq!(out.document.source, dir.path().join("scan_OCR_Removed.pdf"));
    assert!(out.document.source.exists());
    // The input is never touched.
    assert_eq!(std::fs::read(&input).unwrap(), b"%PDF-1.7\n% fake\n");
}

#[tokio::test]
async fn strip_with_missing_ghostscript_is_dependency_missing() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::with_pages(vec![Some("text")]));
    let cfg = config(engine, FakeRecognizer::default())
        .stripper(Arc::new(GhostscriptTool::at("/nonexistent/bin/gs")))
        .existing_text(ExistingTextChoice::StripAndReprocess)
        .build()
        .unwrap();

    let err = ocr(fake_pdf(&dir), &cfg).await.unwrap_err();
    assert!(
        matches!(err, OcrError::DependencyMissing { ref tool, .. } if tool == "gs"),
        "{err:?}"
    );
}

#[tokio::test]
async fn unloadable_strip_result_is_reload_failed() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine {
        reload_broken: true,
        ..FakeEngine::with_pages(vec![Some("text"), None])
    });
    let cfg = config(engine, FakeRecognizer::default())
        .build()
        .unwrap();

    let err = strip_text_layer(fake_pdf(&dir), &cfg).await.unwrap_err();
    assert!(matches!(err, OcrError::ReloadFailed { .. }), "{err:?}");
}

// ── Per-page outcomes ────────────────────────────────────────────────────

#[tokio::test]
async fn render_failure_is_inline_and_later_pages_continue() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine {
        failing_renders: HashSet::from([1]),
        ..FakeEngine::blank(3)
    });
    let cfg = config(engine, FakeRecognizer::default()).build().unwrap();

    let out = ocr(fake_pdf(&dir), &cfg).await.unwrap();
    assert_eq!(
        statuses(&out),
        vec![
            PageStatus::Recognized,
            PageStatus::RenderFailed,
            PageStatus::Recognized
        ]
    );
    assert!(out.transcript.pages[1]
        .text
        .starts_with("[render failed: page 2:"));
    assert_eq!(out.transcript.pages[2].text, "page 3");
    assert_eq!(out.stats.render_failed_pages, 1);
}

#[tokio::test]
async fn empty_and_failed_recognition_get_markers() {
    let dir = TempDir::new().unwrap();
    let recognizer = FakeRecognizer {
        empty: HashSet::from([0]),
        failing: HashSet::from([2]),
        ..Default::default()
    };
    let cfg = config(Arc::new(FakeEngine::blank(3)), recognizer)
        .build()
        .unwrap();

    let out = ocr(fake_pdf(&dir), &cfg).await.unwrap();
    assert_eq!(out.transcript.pages[0].text, "[no text recognised on page 1]");
    assert_eq!(out.transcript.pages[1].status, PageStatus::Recognized);
    assert_eq!(out.transcript.pages[2].status, PageStatus::RecognitionFailed);
    assert_eq!(out.stats.empty_pages, 1);
    assert_eq!(out.stats.recognition_failed_pages, 1);
}

#[tokio::test]
async fn missing_recognizer_fails_before_rendering() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::blank(2));
    let recognizer = FakeRecognizer {
        unavailable: true,
        ..Default::default()
    };
    let cfg = config(Arc::clone(&engine), recognizer).build().unwrap();

    let err = ocr(fake_pdf(&dir), &cfg).await.unwrap_err();
    assert!(matches!(err, OcrError::DependencyMissing { .. }), "{err:?}");
    assert_eq!(engine.rendered.load(Ordering::SeqCst), 0);
}

// ── Ordering and progress ────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_recognition_keeps_page_order() {
    let dir = TempDir::new().unwrap();
    let recognizer = FakeRecognizer {
        jitter: true,
        ..Default::default()
    };
    let cfg = config(Arc::new(FakeEngine::blank(8)), recognizer)
        .concurrency(4)
        .build()
        .unwrap();

    let out = ocr(fake_pdf(&dir), &cfg).await.unwrap();
    assert_eq!(out.transcript.len(), 8);
    for (i, page) in out.transcript.pages.iter().enumerate() {
        assert_eq!(page.page_index, i);
        assert_eq!(page.text, format!("page {}", i + 1));
        assert_eq!(page.tokens[0].page_index, i);
    }
}

#[tokio::test]
async fn progress_is_monotonic_under_concurrent_recognition() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let engine = Arc::new(FakeEngine::blank(6));
    let cfg = config(engine, FakeRecognizer {
        jitter: true,
        ..Default::default()
    })
    .concurrency(4)
    .progress_callback(recorder.clone())
    .build()
    .unwrap();

    let out = ocr(fake_pdf(&dir), &cfg).await.unwrap();
    assert_eq!(out.transcript.count(PageStatus::Recognized), 6);
    let seen = recorder.0.lock().unwrap().clone();
    assert_eq!(seen.len(), 6);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert!(seen[0] > 0.0);
    assert_eq!(*seen.last().unwrap(), 1.0);
}

#[tokio::test]
async fn progress_counts_skipped_pages() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let engine = Arc::new(FakeEngine::with_pages(vec![None, Some("text"), None, None, None]));
    let cfg = config(engine, FakeRecognizer::default())
        .existing_text(ExistingTextChoice::ViewExisting)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    ocr(fake_pdf(&dir), &cfg).await.unwrap();
    let seen = recorder.0.lock().unwrap().clone();
    assert_eq!(seen.len(), 5);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(*seen.last().unwrap(), 1.0);
}

#[tokio::test]
async fn zero_page_document_completes_progress_once() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let cfg = config(Arc::new(FakeEngine::blank(0)), FakeRecognizer::default())
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let out = ocr(fake_pdf(&dir), &cfg).await.unwrap();
    assert!(out.transcript.is_empty());
    assert_eq!(out.text(), "");
    assert_eq!(*recorder.0.lock().unwrap(), vec![1.0]);
}

// ── Suspects and corrections ─────────────────────────────────────────────

#[tokio::test]
async fn suspects_are_flagged_but_never_auto_applied() {
    let dir = TempDir::new().unwrap();
    let recognizer = FakeRecognizer {
        text_override: Some("ORDER 1l0O5".into()),
        ..Default::default()
    };
    let cfg = config(Arc::new(FakeEngine::blank(2)), recognizer)
        .build()
        .unwrap();

    let mut out = ocr(fake_pdf(&dir), &cfg).await.unwrap();
    let suspects = out.transcript.suspects();
    assert_eq!(suspects.len(), 1);
    assert_eq!(suspects[0].token, "1l0O5");
    assert!(!suspects[0].corrections.is_empty());
    assert_eq!(out.transcript.pages[0].text, "ORDER 1l0O5");

    let replaced = out.transcript.apply_correction("0O", "00");
    assert_eq!(replaced, 2);
    assert_eq!(out.transcript.pages[1].text, "ORDER 1l005");
    assert_eq!(out.transcript.pages[1].tokens[0].text, "ORDER 1l005");
}

// ── Outputs ──────────────────────────────────────────────────────────────

#[test]
fn sync_wrapper_runs_without_an_outer_runtime() {
    let dir = TempDir::new().unwrap();
    let cfg = config(Arc::new(FakeEngine::blank(2)), FakeRecognizer::default())
        .build()
        .unwrap();

    let out = ocr_sync(fake_pdf(&dir), &cfg).unwrap();
    assert_eq!(statuses(&out), vec![PageStatus::Recognized; 2]);
}

#[tokio::test]
async fn transcript_file_has_page_headers() {
    let dir = TempDir::new().unwrap();
    let cfg = config(Arc::new(FakeEngine::blank(2)), FakeRecognizer::default())
        .build()
        .unwrap();
    let dest = dir.path().join("out/scan.txt");

    let stats = ocr_to_file(fake_pdf(&dir), &dest, &cfg).await.unwrap();
    assert_eq!(stats.total_pages, 2);
    assert_eq!(
        std::fs::read_to_string(&dest).unwrap(),
        "[Page 1]\npage 1\n\n[Page 2]\npage 2\n\n"
    );
}

#[tokio::test]
async fn embedding_places_runs_in_page_coordinates() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::blank(2));
    let cfg = config(Arc::clone(&engine), FakeRecognizer::default())
        .build()
        .unwrap();

    let out = ocr(fake_pdf(&dir), &cfg).await.unwrap();
    let dest = dir.path().join("searchable.pdf");
    let reloaded = embed_text_layer(&out, &dest, &cfg).await.unwrap();
    assert_eq!(reloaded.page_count(), 2);
    assert!(dest.exists());

    let layers = engine.written.lock().unwrap().clone();
    assert_eq!(layers.len(), 2);
    let run = &layers[1].runs[0];
    assert_eq!(run.text, "page 2");
    // Box (0.1, 0.8, 0.5, 0.05) on a 612×792 page, top-left origin.
    assert!((run.rect.x - 61.2).abs() < 1e-3);
    assert!((run.rect.y - 0.15 * 792.0).abs() < 1e-2);
    assert!((run.rect.width - 306.0).abs() < 1e-3);
}

#[tokio::test]
async fn images_are_recognised_but_not_embedded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("photo.png");
    DynamicImage::new_rgb8(64, 32).save(&path).unwrap();

    let cfg = config(Arc::new(FakeEngine::default()), FakeRecognizer::default())
        .build()
        .unwrap();
    let out = ocr(&path, &cfg).await.unwrap();
    assert_eq!(out.transcript.len(), 1);
    assert_eq!(out.transcript.pages[0].text, "page 1");
    assert_eq!(out.document.pages[0].width, 64.0);

    let err = embed_text_layer(&out, dir.path().join("x.pdf"), &cfg)
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::EmbedUnsupported { .. }));
}

#[tokio::test]
async fn unsupported_input_is_rejected_up_front() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, b"hello world").unwrap();

    let cfg = config(Arc::new(FakeEngine::blank(1)), FakeRecognizer::default())
        .build()
        .unwrap();
    let err = ocr(&path, &cfg).await.unwrap_err();
    assert!(matches!(err, OcrError::UnsupportedInput { .. }), "{err:?}");
}
