//! # edgequake-pdfocr
//!
//! OCR scanned PDFs and raster images into a page-ordered transcript, and
//! write the recognised words back into the PDF as an invisible text layer.
//!
//! ## Why this crate?
//!
//! A scanned PDF is a stack of pictures: nothing can be searched, selected or
//! copied. This crate renders each page that lacks text, runs a recognizer
//! over the bitmap, keeps the position of every recognised line, and can
//! place those lines back onto the page as invisible text so viewers can
//! search and select it. Pages that already carry text are read directly,
//! and a document whose text layer is wrong can be stripped and redone.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG / TIFF
//!  │
//!  ├─ 1. Input      sniff magic bytes, load page bounds + embedded text
//!  ├─ 2. Gate       document already has text? view it, or strip and redo
//!  ├─ 3. Render     rasterise pages via pdfium (spawn_blocking, bounded channel)
//!  ├─ 4. Recognize  tesseract per page, buffered(concurrency), in page order
//!  ├─ 5. Suspects   flag likely misreads, propose corrections
//!  ├─ 6. Aggregate  one result per page, `[Page N]` transcript + stats
//!  └─ 7. Embed      optional invisible text layer written to a new PDF
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfocr::{ocr, ExistingTextChoice, OcrConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrConfig::builder()
//!         .languages(["en-US"])
//!         .existing_text(ExistingTextChoice::StripAndReprocess)
//!         .concurrency(4)
//!         .build()?;
//!     let output = ocr("scan.pdf", &config).await?;
//!     print!("{}", output.text());
//!     for suspect in output.transcript.suspects() {
//!         eprintln!("suspect: {} ({:?})", suspect.token, suspect.reason);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## External Tools
//!
//! | Concern | Default | Override |
//! |---------|---------|----------|
//! | PDF engine | pdfium (`PDFIUM_LIB_PATH` or system library) | [`OcrConfigBuilder::engine`] |
//! | Recognizer | `tesseract` on `PATH` | [`OcrConfigBuilder::recognizer`] |
//! | Text-layer stripping | ghostscript `gs` | [`OcrConfigBuilder::stripper`] |
//!
//! A missing tool is reported as [`OcrError::DependencyMissing`] before any
//! page work starts.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfocr` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ColorAdjust, ExistingTextChoice, OcrConfig, OcrConfigBuilder, RecognitionLevel,
    StripDestination,
};
pub use convert::{
    embed_text_layer, inspect, ocr, ocr_sync, ocr_to_file, open, run_post_process,
    strip_text_layer, write_transcript,
};
pub use document::{Document, NormalizedBox, Page, RecognizedToken, SourceKind};
pub use error::{OcrError, PageError};
pub use output::{
    DocumentMetadata, DocumentTranscript, OcrOutput, OcrStats, PageResult, PageStatus,
};
pub use pipeline::engine::{PdfEngine, PdfiumEngine};
pub use pipeline::recognize::{Recognizer, TesseractRecognizer};
pub use pipeline::strip::{ExternalTool, GhostscriptTool, ScriptTool, StrippedDocument};
pub use pipeline::suspect::{ConfusionMap, Script, SuspectToken, SuspectTokenDetector};
pub use progress::{NoopProgressCallback, OcrProgressCallback, ProgressCallback};
