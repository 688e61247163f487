//! Error types for the edgequake-pdfocr library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OcrError`] is **fatal**: the current operation cannot proceed at all
//!   (unreadable input, missing external tool, strip result that will not
//!   reload). Returned as `Err(OcrError)` from the top-level functions; any
//!   state the caller held before the call is left untouched.
//!
//! * [`PageError`] is **non-fatal**: a single page could not be rendered or
//!   produced no text. Stored inside [`crate::output::PageResult`] and
//!   rendered inline in the transcript, so one bad page never costs the rest
//!   of the document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfocr library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Load errors ───────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file is neither a PDF nor a supported raster image.
    #[error("Unsupported input '{path}': expected a PDF, PNG, JPEG or TIFF file (first bytes: {magic:?})")]
    UnsupportedInput { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// A raster image input could not be decoded.
    #[error("Failed to load image '{path}': {detail}")]
    ImageLoadFailed { path: PathBuf, detail: String },

    // ── Gate ──────────────────────────────────────────────────────────────
    /// The document already carries a text layer and no choice was made
    /// between viewing it and stripping it before re-running OCR.
    #[error(
        "'{path}' already contains text on {} of its pages.\n\
Choose --existing-text view to read it as-is, or --existing-text strip to remove it and run OCR again.",
        pages_with_text.len()
    )]
    ExistingTextLayer {
        path: PathBuf,
        pages_with_text: Vec<usize>,
    },

    // ── External capabilities ─────────────────────────────────────────────
    /// An external tool (ghostscript, tesseract, post-process script) is not
    /// installed where it is expected.
    #[error("'{tool}' is not installed or not executable.\n{hint}")]
    DependencyMissing { tool: String, hint: String },

    /// An external tool ran but failed (nonzero exit or spawn error).
    #[error("'{tool}' failed: {diagnostic}")]
    ExternalProcessFailed { tool: String, diagnostic: String },

    /// The stripped document was produced but could not be loaded back.
    #[error("Reload error: stripped document '{path}' could not be opened: {detail}")]
    ReloadFailed { path: PathBuf, detail: String },

    // ── Text layer ────────────────────────────────────────────────────────
    /// Text layers can only be written into PDF sources.
    #[error("Cannot embed a text layer into '{path}': source is not a PDF")]
    EmbedUnsupported { path: PathBuf },

    /// Text layers can only be stripped from PDF sources.
    #[error("Cannot strip a text layer from '{path}': source is not a PDF")]
    StripUnsupported { path: PathBuf },

    /// pdfium rejected a text-layer edit or the save.
    #[error("Failed to embed text layer into '{path}': {detail}")]
    EmbedFailed { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or point PDFIUM_LIB_PATH at the\n\
directory containing it. Pre-built libraries are available from:\n\
  https://github.com/bblanchon/pdfium-binaries/releases\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// `true` for every variant that means "the input could not be loaded".
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            OcrError::FileNotFound { .. }
                | OcrError::PermissionDenied { .. }
                | OcrError::UnsupportedInput { .. }
                | OcrError::CorruptPdf { .. }
                | OcrError::PasswordRequired { .. }
                | OcrError::WrongPassword { .. }
                | OcrError::ImageLoadFailed { .. }
        )
    }
}

/// A non-fatal error for a single page.
///
/// Page numbers are 1-indexed, matching the `[Page N]` transcript headers.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The recognizer ran but found no text.
    #[error("Page {page}: no text recognised")]
    RecognitionEmpty { page: usize },

    /// The recognizer returned an error for this page.
    #[error("Page {page}: recognition failed: {detail}")]
    RecognitionFailed { page: usize, detail: String },
}
