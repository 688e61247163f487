//! Top-level entry points.
//!
//! [`ocr`] is the main one: load, apply the existing-text gate, strip if
//! asked, aggregate, and return an [`OcrOutput`]. The rest operate on its
//! result ([`embed_text_layer`]) or stand alone ([`strip_text_layer`],
//! [`run_post_process`], [`inspect`]).
//!
//! Every function here either returns a complete result or an `Err` and
//! leaves the caller's files as they were; per-page problems never surface
//! as `Err`, they are recorded in the transcript.

use crate::config::{ExistingTextChoice, OcrConfig};
use crate::document::Document;
use crate::error::OcrError;
use crate::output::{DocumentMetadata, OcrOutput, OcrStats};
use crate::pipeline::aggregate::{AggregateMode, PageAggregator};
use crate::pipeline::classify::{pages_needing_ocr, TextGate};
use crate::pipeline::embed::plan_layers;
use crate::pipeline::input::{resolve_input, InputKind};
use crate::pipeline::recognize::{resolve_languages, RecognitionError, Recognizer};
use crate::pipeline::render::load_image_document;
use crate::pipeline::strip::{ExternalTool, StrippedDocument, TextLayerStripper};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Load a PDF or raster image into a [`Document`].
pub async fn open(input: impl AsRef<Path>, config: &OcrConfig) -> Result<Document, OcrError> {
    let resolved = resolve_input(input)?;
    let path = resolved.path.clone();
    match resolved.kind {
        InputKind::Pdf => {
            let engine = Arc::clone(&config.engine);
            let password = config.password.clone();
            tokio::task::spawn_blocking(move || engine.load(&path, password.as_deref()))
                .await
                .map_err(|e| OcrError::Internal(format!("Load task panicked: {e}")))?
        }
        InputKind::Image(_) => {
            tokio::task::spawn_blocking(move || load_image_document(&path))
                .await
                .map_err(|e| OcrError::Internal(format!("Load task panicked: {e}")))?
        }
    }
}

/// OCR a PDF or image.
///
/// # Errors
/// - any load failure ([`OcrError::is_load_failure`])
/// - [`OcrError::ExistingTextLayer`] when the document already has text and
///   `config.existing_text` is `None`
/// - [`OcrError::DependencyMissing`] when the recognizer or strip tool is absent
/// - [`OcrError::ExternalProcessFailed`] / [`OcrError::ReloadFailed`] from a strip
pub async fn ocr(input: impl AsRef<Path>, config: &OcrConfig) -> Result<OcrOutput, OcrError> {
    let total_start = Instant::now();
    let input = input.as_ref();
    info!("Starting OCR: {}", input.display());

    // ── Step 1: Load ─────────────────────────────────────────────────────
    let document = open(input, config).await?;

    // ── Step 2: Existing-text gate ───────────────────────────────────────
    let gate = TextGate::evaluate(&document);
    let (document, mode, stripped) = if gate.is_triggered() {
        match config.existing_text {
            None => {
                return Err(OcrError::ExistingTextLayer {
                    path: document.source.clone(),
                    pages_with_text: gate.pages_with_text,
                })
            }
            Some(ExistingTextChoice::ViewExisting) => {
                info!(
                    "{} pages already carry text; returning them without OCR",
                    gate.pages_with_text.len()
                );
                (document, AggregateMode::ExistingOnly, None)
            }
            Some(ExistingTextChoice::StripAndReprocess) => {
                let stripped = stripper(config).strip(&document).await?;
                let still_texted = TextGate::evaluate(&stripped.document).pages_with_text;
                if !still_texted.is_empty() {
                    warn!(
                        "{} pages still carry text after stripping; they will be extracted",
                        still_texted.len()
                    );
                }
                (
                    stripped.document.clone(),
                    AggregateMode::Full,
                    Some(stripped),
                )
            }
        }
    } else {
        (document, AggregateMode::Full, None)
    };

    // ── Step 3: Recognizer readiness and languages ───────────────────────
    let needs_ocr = mode == AggregateMode::Full && !pages_needing_ocr(&document).is_empty();
    let languages = if needs_ocr {
        prepare_recognizer(config).await?
    } else {
        config.languages.clone()
    };

    // ── Step 4: Aggregate ────────────────────────────────────────────────
    let ocr_start = Instant::now();
    let transcript = PageAggregator::new(config, languages)
        .aggregate(&document, mode)
        .await?;
    let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;

    // ── Step 5: Stats ────────────────────────────────────────────────────
    let mut stats = OcrStats::from_transcript(&transcript);
    stats.stripped = stripped.is_some();
    stats.ocr_duration_ms = ocr_duration_ms;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "OCR complete: {} extracted, {} recognised, {} failed of {} pages in {}ms",
        stats.extracted_pages,
        stats.recognized_pages,
        stats.failed_pages() + stats.empty_pages,
        stats.total_pages,
        stats.total_duration_ms
    );

    let (stripped_from, workspace) = match stripped {
        Some(StrippedDocument {
            original,
            workspace,
            ..
        }) => (Some(original), workspace),
        None => (None, None),
    };

    Ok(OcrOutput {
        transcript,
        document,
        stats,
        stripped_from,
        workspace,
    })
}

/// OCR and write the `[Page N]` transcript to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn ocr_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<OcrStats, OcrError> {
    let output = ocr(input, config).await?;
    write_transcript(&output, output_path).await?;
    Ok(output.stats)
}

/// Write the `[Page N]` transcript of a finished run to `path`.
///
/// The file is written to a sibling `.tmp` and renamed into place, so a
/// reader never sees a partial transcript. Parent directories are created.
pub async fn write_transcript(output: &OcrOutput, path: impl AsRef<Path>) -> Result<(), OcrError> {
    write_atomic(path.as_ref(), output.text().as_bytes()).await
}

/// Synchronous wrapper around [`ocr`].
///
/// Creates a temporary tokio runtime internally.
pub fn ocr_sync(input: impl AsRef<Path>, config: &OcrConfig) -> Result<OcrOutput, OcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(ocr(input, config))
}

/// Write a copy of the processed PDF with every recognised token embedded as
/// invisible text at its on-page position, then load the new file.
///
/// Runs only on a finished [`OcrOutput`]: boxes are mapped with the final
/// page bounds.
pub async fn embed_text_layer(
    output: &OcrOutput,
    dest: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<Document, OcrError> {
    let dest = dest.as_ref().to_path_buf();
    let document = &output.document;
    if !document.is_pdf() {
        return Err(OcrError::EmbedUnsupported {
            path: document.source.clone(),
        });
    }

    let layers = plan_layers(document, &output.transcript.tokens_by_page())?;
    info!(
        "Embedding {} text runs on {} pages into {}",
        layers.iter().map(|l| l.runs.len()).sum::<usize>(),
        layers.len(),
        dest.display()
    );

    ensure_parent(&dest).await?;
    let tmp = tmp_sibling(&dest);
    let source = document.source.clone();
    // A stripped copy is written without encryption.
    let password = match output.stripped_from {
        Some(_) => None,
        None => config.password.clone(),
    };

    let engine = Arc::clone(&config.engine);
    let tmp_for_write = tmp.clone();
    tokio::task::spawn_blocking(move || {
        engine.write_text_layer(&source, password.as_deref(), &layers, &tmp_for_write)
    })
    .await
    .map_err(|e| OcrError::Internal(format!("Embed task panicked: {e}")))??;

    tokio::fs::rename(&tmp, &dest)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: dest.clone(),
            source: e,
        })?;

    let engine = Arc::clone(&config.engine);
    let reload_path = dest.clone();
    tokio::task::spawn_blocking(move || engine.load(&reload_path, None))
        .await
        .map_err(|e| OcrError::Internal(format!("Reload task panicked: {e}")))?
        .map_err(|e| OcrError::ReloadFailed {
            path: dest,
            detail: e.to_string(),
        })
}

/// Remove the text layer of `input` with the configured strip tool and load
/// the result. Destructive in the sense that the output replaces any earlier
/// `<stem>_OCR_Removed.pdf`; the input itself is never modified.
pub async fn strip_text_layer(
    input: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<StrippedDocument, OcrError> {
    let document = open(input, config).await?;
    stripper(config).strip(&document).await
}

/// Run an optional post-processing tool over a PDF.
///
/// A failing tool is reported as `Err` for this call only; nothing else is
/// affected.
pub async fn run_post_process(
    tool: &dyn ExternalTool,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<PathBuf, OcrError> {
    let (input, output) = (input.as_ref(), output.as_ref());
    info!(
        "Post-processing with {}: {} → {}",
        tool.name(),
        input.display(),
        output.display()
    );
    ensure_parent(output).await?;
    let written = tool.run(input, output).await?;
    Ok(written)
}

/// Document metadata without running OCR.
pub async fn inspect(
    input: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<DocumentMetadata, OcrError> {
    let resolved = resolve_input(input)?;
    match resolved.kind {
        InputKind::Pdf => {
            let engine = Arc::clone(&config.engine);
            let password = config.password.clone();
            let path = resolved.path;
            tokio::task::spawn_blocking(move || engine.metadata(&path, password.as_deref()))
                .await
                .map_err(|e| OcrError::Internal(format!("Metadata task panicked: {e}")))?
        }
        InputKind::Image(format) => Ok(DocumentMetadata {
            title: None,
            author: None,
            subject: None,
            creator: None,
            producer: None,
            page_count: 1,
            pages_with_text: Vec::new(),
            pdf_version: format!("{format:?} image"),
        }),
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn stripper(config: &OcrConfig) -> TextLayerStripper {
    TextLayerStripper::new(
        Arc::clone(&config.stripper),
        Arc::clone(&config.engine),
        config.strip_destination,
    )
}

fn recognition_error(recognizer: &dyn Recognizer, e: RecognitionError) -> OcrError {
    match e {
        RecognitionError::Unavailable { tool, hint } => OcrError::DependencyMissing { tool, hint },
        RecognitionError::Failed(diagnostic) => OcrError::ExternalProcessFailed {
            tool: recognizer.name().to_string(),
            diagnostic,
        },
    }
}

/// Check the recognizer is usable and resolve the language list against
/// what it supports.
async fn prepare_recognizer(config: &OcrConfig) -> Result<Vec<String>, OcrError> {
    let recognizer = config.recognizer.as_ref();
    recognizer
        .ensure_available()
        .await
        .map_err(|e| recognition_error(recognizer, e))?;

    let supported = match recognizer.supported_languages().await {
        Ok(langs) => langs,
        Err(e) => {
            warn!("Could not list {} languages: {}", recognizer.name(), e);
            Vec::new()
        }
    };
    let languages = resolve_languages(&config.languages, &supported);
    debug!("Recognition languages: {:?}", languages);
    Ok(languages)
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn ensure_parent(path: &Path) -> Result<(), OcrError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| OcrError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            }),
        _ => Ok(()),
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), OcrError> {
    ensure_parent(path).await?;
    let tmp = tmp_sibling(path);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}
