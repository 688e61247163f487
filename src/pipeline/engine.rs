//! PDF engine capability: load, render and rewrite PDFs.
//!
//! ## Why a trait?
//!
//! The pipeline needs four things from a PDF library: page bounds plus
//! embedded text, page rasters, document metadata, and a way to write new
//! text objects into a copy of the file. [`PdfEngine`] names exactly those,
//! so the orchestration in [`crate::convert`] can be driven by an in-memory
//! fake in tests while [`PdfiumEngine`] does the real work.
//!
//! ## Why blocking?
//!
//! pdfium keeps thread-local state and is not safe to call from async code.
//! Every method here is synchronous; callers wrap them in
//! `tokio::task::spawn_blocking`.

use crate::document::{Document, Page, SourceKind};
use crate::error::OcrError;
use crate::output::DocumentMetadata;
use crate::pipeline::embed::{require_standard_font_coverage, PageLayer};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Receives rendered pages one at a time. Return `false` to stop rendering.
pub type RenderSink<'s> = dyn FnMut(usize, Result<DynamicImage, String>) -> bool + 's;

/// Blocking PDF capability used by the pipeline.
pub trait PdfEngine: Send + Sync {
    /// Short name for logs and `Debug` output.
    fn name(&self) -> &'static str;

    /// Load page bounds and embedded text.
    fn load(&self, path: &Path, password: Option<&str>) -> Result<Document, OcrError>;

    /// Document metadata without rendering.
    fn metadata(&self, path: &Path, password: Option<&str>) -> Result<DocumentMetadata, OcrError>;

    /// Render `pages` (0-based) at `scale` × point size, in the given order.
    ///
    /// A page that cannot be rendered is passed to the sink as `Err(detail)`;
    /// only failures that affect the whole document are returned as `Err`.
    fn render_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        pages: &[usize],
        scale: f32,
        sink: &mut RenderSink<'_>,
    ) -> Result<(), OcrError>;

    /// Copy `source` to `dest`, adding every run in `layers` as invisible text.
    fn write_text_layer(
        &self,
        source: &Path,
        password: Option<&str>,
        layers: &[PageLayer],
        dest: &Path,
    ) -> Result<(), OcrError>;
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// [`PdfEngine`] backed by `pdfium-render`.
///
/// Binds to the library at `PDFIUM_LIB_PATH` (a file or the directory
/// holding it) when set, otherwise to the system library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumEngine {
    library_path: Option<PathBuf>,
    font_path: Option<PathBuf>,
}

impl PdfiumEngine {
    /// Bind to a specific library file or directory instead of the
    /// `PDFIUM_LIB_PATH`/system lookup.
    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// TrueType font used for embedded text. Without one the standard
    /// Helvetica font is used, which only covers Latin text.
    pub fn with_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    fn bind(&self) -> Result<Pdfium, OcrError> {
        let configured = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match configured {
            Some(path) => {
                let lib = if path.is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&path)
                } else {
                    path.clone()
                };
                debug!("Binding pdfium from {}", lib.display());
                Pdfium::bind_to_library(&lib)
            }
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| OcrError::PdfiumBindingFailed(format!("{e:?}")))?;

        Ok(Pdfium::new(bindings))
    }
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, OcrError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let err_str = format!("{e:?}");
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                OcrError::WrongPassword {
                    path: path.to_path_buf(),
                }
            } else {
                OcrError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            }
        } else {
            OcrError::CorruptPdf {
                path: path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

fn page_text(page: &PdfPage<'_>) -> Option<String> {
    page.text().ok().map(|t| t.all())
}

impl PdfEngine for PdfiumEngine {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn load(&self, path: &Path, password: Option<&str>) -> Result<Document, OcrError> {
        let pdfium = self.bind()?;
        let document = open_document(&pdfium, path, password)?;

        let pages = document
            .pages()
            .iter()
            .enumerate()
            .map(|(index, page)| Page {
                index,
                width: page.width().value,
                height: page.height().value,
                embedded_text: page_text(&page),
            })
            .collect::<Vec<_>>();

        info!("PDF loaded: {} pages from {}", pages.len(), path.display());
        Ok(Document {
            source: path.to_path_buf(),
            kind: SourceKind::Pdf,
            pages,
        })
    }

    fn metadata(&self, path: &Path, password: Option<&str>) -> Result<DocumentMetadata, OcrError> {
        let pdfium = self.bind()?;
        let document = open_document(&pdfium, path, password)?;
        let metadata = document.metadata();

        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };

        let pages_with_text = document
            .pages()
            .iter()
            .enumerate()
            .filter(|(_, page)| {
                page_text(page)
                    .map(|t| !t.trim().is_empty())
                    .unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();

        Ok(DocumentMetadata {
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
            subject: get_meta(PdfDocumentMetadataTagType::Subject),
            creator: get_meta(PdfDocumentMetadataTagType::Creator),
            producer: get_meta(PdfDocumentMetadataTagType::Producer),
            page_count: document.pages().len() as usize,
            pages_with_text,
            pdf_version: format!("{:?}", document.version()),
        })
    }

    fn render_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        pages: &[usize],
        scale: f32,
        sink: &mut RenderSink<'_>,
    ) -> Result<(), OcrError> {
        let pdfium = self.bind()?;
        let document = open_document(&pdfium, path, password)?;
        let total = document.pages().len() as usize;
        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

        for &idx in pages {
            let rendered = if idx >= total {
                Err(format!("page index {idx} out of range (total={total})"))
            } else {
                document
                    .pages()
                    .get(idx as u16)
                    .and_then(|page| {
                        page.render_with_config(&render_config)
                            .map(|bitmap| bitmap.as_image())
                    })
                    .map_err(|e| format!("{e:?}"))
            };

            match &rendered {
                Ok(img) => debug!(
                    "Rendered page {} → {}x{} px",
                    idx + 1,
                    img.width(),
                    img.height()
                ),
                Err(detail) => warn!("Page {} failed to render: {}", idx + 1, detail),
            }

            if !sink(idx, rendered) {
                debug!("Render sink closed after page {}", idx + 1);
                break;
            }
        }
        Ok(())
    }

    fn write_text_layer(
        &self,
        source: &Path,
        password: Option<&str>,
        layers: &[PageLayer],
        dest: &Path,
    ) -> Result<(), OcrError> {
        let embed_err = |detail: String| OcrError::EmbedFailed {
            path: source.to_path_buf(),
            detail,
        };

        if self.font_path.is_none() {
            require_standard_font_coverage(source, layers)?;
        }

        let pdfium = self.bind()?;
        let mut document = open_document(&pdfium, source, password)?;

        let font = match &self.font_path {
            Some(font_path) => document
                .fonts_mut()
                .load_true_type_from_file(font_path, true)
                .map_err(|e| embed_err(format!("font {}: {e:?}", font_path.display())))?,
            None => document.fonts_mut().helvetica(),
        };

        let mut written = 0usize;
        for layer in layers {
            let mut page = document
                .pages()
                .get(layer.page_index as u16)
                .map_err(|e| embed_err(format!("page {}: {e:?}", layer.page_index + 1)))?;

            for run in &layer.runs {
                let mut object = PdfPageTextObject::new(
                    &document,
                    &run.text,
                    font,
                    PdfPoints::new(run.font_size()),
                )
                .map_err(|e| embed_err(format!("{e:?}")))?;

                object
                    .set_render_mode(PdfPageTextRenderMode::Invisible)
                    .map_err(|e| embed_err(format!("{e:?}")))?;

                // Stretch horizontally so the run covers the glyphs beneath it.
                let natural = object.width().map(|w| w.value).unwrap_or(0.0);
                if natural > 0.0 && run.rect.width > 0.0 {
                    object
                        .scale(run.rect.width / natural, 1.0)
                        .map_err(|e| embed_err(format!("{e:?}")))?;
                }

                object
                    .translate(
                        PdfPoints::new(run.rect.x),
                        PdfPoints::new(run.baseline(layer.page_height)),
                    )
                    .map_err(|e| embed_err(format!("{e:?}")))?;

                page.objects_mut()
                    .add_text_object(object)
                    .map_err(|e| embed_err(format!("{e:?}")))?;
                written += 1;
            }
        }

        document
            .save_to_file(dest)
            .map_err(|e| embed_err(format!("save to {}: {e:?}", dest.display())))?;
        info!(
            "Wrote {} invisible text runs across {} pages → {}",
            written,
            layers.len(),
            dest.display()
        );
        Ok(())
    }
}
