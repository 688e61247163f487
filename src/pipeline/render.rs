//! Rasterisation: turn pages into bitmaps for the recognizer.
//!
//! ## Why a worker and a channel?
//!
//! The PDF engine is blocking and must own its document handle on one
//! thread, so all pages of a document are rendered by a single
//! `spawn_blocking` task. It hands bitmaps over a bounded `mpsc` channel:
//! recognition starts on page 1 while page 2 is still rendering, and the
//! bound keeps at most a few full-resolution rasters alive at once.
//!
//! A page that fails to render travels down the channel as `Err(detail)` so
//! the aggregator can record it inline and carry on.

use crate::config::ColorAdjust;
use crate::document::{Document, Page, SourceKind};
use crate::error::{OcrError, PageError};
use crate::pipeline::engine::PdfEngine;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Rendered pages buffered between the render worker and recognition.
pub const RENDER_CHANNEL_CAPACITY: usize = 2;

/// A rendered page.
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub page_index: usize,
    pub image: DynamicImage,
    /// Pixels per page unit used for this render.
    pub scale: f32,
}

impl Bitmap {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// What the render worker sends for each page.
pub type RenderedPage = (usize, Result<Bitmap, String>);

/// Everything the render worker needs, detached from the caller's config.
#[derive(Clone)]
pub struct RenderRequest {
    pub source: PathBuf,
    pub kind: SourceKind,
    pub password: Option<String>,
    pub pages: Vec<usize>,
    pub scale: f32,
    pub color_adjust: Option<ColorAdjust>,
}

impl RenderRequest {
    pub fn new(document: &Document, pages: Vec<usize>, scale: f32) -> Self {
        Self {
            source: document.source.clone(),
            kind: document.kind,
            password: None,
            pages,
            // Image pages are already pixels.
            scale: match document.kind {
                SourceKind::Pdf => scale,
                SourceKind::Image => 1.0,
            },
            color_adjust: None,
        }
    }

    pub fn password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn color_adjust(mut self, adjust: Option<ColorAdjust>) -> Self {
        self.color_adjust = adjust.filter(|a| !a.is_identity());
        self
    }
}

/// Apply contrast/saturation normalisation.
pub fn apply_color_adjust(image: DynamicImage, adjust: &ColorAdjust) -> DynamicImage {
    let mut out = if adjust.desaturate {
        image.grayscale()
    } else {
        image
    };
    if adjust.contrast != 0.0 {
        out = out.adjust_contrast(adjust.contrast);
    }
    if adjust.brightness != 0 {
        out = out.brighten(adjust.brightness);
    }
    out
}

/// Load a raster image as a one-page [`Document`] with no embedded text.
pub fn load_image_document(path: &Path) -> Result<Document, OcrError> {
    let (width, height) =
        image::image_dimensions(path).map_err(|e| OcrError::ImageLoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    info!("Image loaded: {}x{} px from {}", width, height, path.display());
    Ok(Document {
        source: path.to_path_buf(),
        kind: SourceKind::Image,
        pages: vec![Page {
            index: 0,
            width: width as f32,
            height: height as f32,
            embedded_text: None,
        }],
    })
}

/// Start the render worker. Bitmaps arrive on the receiver in the order of
/// `request.pages`; the join handle reports document-level failures.
pub fn spawn_render_worker(
    engine: Arc<dyn PdfEngine>,
    request: RenderRequest,
) -> (mpsc::Receiver<RenderedPage>, JoinHandle<Result<(), OcrError>>) {
    let (tx, rx) = mpsc::channel(RENDER_CHANNEL_CAPACITY);

    let handle = tokio::task::spawn_blocking(move || {
        let scale = request.scale;
        let adjust = request.color_adjust;
        let finish = move |idx: usize, raw: Result<DynamicImage, String>| -> RenderedPage {
            let bitmap = raw.map(|image| Bitmap {
                page_index: idx,
                image: match &adjust {
                    Some(a) => apply_color_adjust(image, a),
                    None => image,
                },
                scale,
            });
            (idx, bitmap)
        };

        match request.kind {
            SourceKind::Pdf => {
                let mut sink = |idx: usize, raw: Result<DynamicImage, String>| {
                    tx.blocking_send(finish(idx, raw)).is_ok()
                };
                engine.render_pages(
                    &request.source,
                    request.password.as_deref(),
                    &request.pages,
                    scale,
                    &mut sink,
                )
            }
            SourceKind::Image => {
                for &idx in &request.pages {
                    let raw = if idx == 0 {
                        image::open(&request.source).map_err(|e| e.to_string())
                    } else {
                        Err(format!("image sources have one page, not {}", idx + 1))
                    };
                    if tx.blocking_send(finish(idx, raw)).is_err() {
                        break;
                    }
                }
                Ok(())
            }
        }
    });

    (rx, handle)
}

/// Render a single page. Failures are per-page: they come back as
/// [`PageError::RenderFailed`] rather than aborting anything.
pub async fn render_page(
    engine: Arc<dyn PdfEngine>,
    document: &Document,
    page_index: usize,
    scale: f32,
    color_adjust: Option<ColorAdjust>,
    password: Option<String>,
) -> Result<Bitmap, PageError> {
    let page = page_index + 1;
    let request = RenderRequest::new(document, vec![page_index], scale)
        .password(password)
        .color_adjust(color_adjust);
    let (mut rx, handle) = spawn_render_worker(engine, request);

    let received = rx.recv().await;
    let worker = handle.await;

    match (received, worker) {
        (Some((_, Ok(bitmap))), _) => {
            debug!("Rendered page {} at scale {}", page, bitmap.scale);
            Ok(bitmap)
        }
        (Some((_, Err(detail))), _) => Err(PageError::RenderFailed { page, detail }),
        (None, Ok(Err(e))) => Err(PageError::RenderFailed {
            page,
            detail: e.to_string(),
        }),
        (None, Err(join)) => Err(PageError::RenderFailed {
            page,
            detail: format!("render task panicked: {join}"),
        }),
        (None, Ok(Ok(()))) => Err(PageError::RenderFailed {
            page,
            detail: "no rendering context".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn checker() -> DynamicImage {
        let mut img = RgbImage::new(4, 4);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = if (x + y) % 2 == 0 {
                Rgb([200, 30, 30])
            } else {
                Rgb([20, 20, 200])
            };
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn desaturate_produces_grey_pixels() {
        let out = apply_color_adjust(checker(), &ColorAdjust::enhance());
        let rgb = out.to_rgb8();
        for px in rgb.pixels() {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    #[test]
    fn identity_adjust_is_dropped_from_request() {
        let doc = Document {
            source: "a.pdf".into(),
            kind: SourceKind::Pdf,
            pages: vec![],
        };
        let req = RenderRequest::new(&doc, vec![0], 2.0).color_adjust(Some(ColorAdjust {
            desaturate: false,
            contrast: 0.0,
            brightness: 0,
        }));
        assert!(req.color_adjust.is_none());
        assert_eq!(req.scale, 2.0);
    }

    #[test]
    fn image_sources_render_at_native_size() {
        let doc = Document {
            source: "a.png".into(),
            kind: SourceKind::Image,
            pages: vec![],
        };
        assert_eq!(RenderRequest::new(&doc, vec![0], 3.0).scale, 1.0);
    }

    #[test]
    fn load_image_document_reads_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        checker().save(&path).unwrap();

        let doc = load_image_document(&path).unwrap();
        assert_eq!(doc.kind, SourceKind::Image);
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.pages[0].width, 4.0);
        assert!(doc.pages[0].embedded_text.is_none());
    }

    #[test]
    fn broken_image_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G', 0, 0]).unwrap();
        let err = load_image_document(&path).unwrap_err();
        assert!(err.is_load_failure());
    }

    #[tokio::test]
    async fn render_page_decodes_images_and_reports_missing_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        checker().save(&path).unwrap();
        let doc = load_image_document(&path).unwrap();
        // Image sources never touch the PDF engine.
        let engine: Arc<dyn PdfEngine> = Arc::new(crate::pipeline::engine::PdfiumEngine::default());

        let bitmap = render_page(Arc::clone(&engine), &doc, 0, 2.0, None, None)
            .await
            .unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (4, 4));
        assert_eq!(bitmap.scale, 1.0);

        let err = render_page(engine, &doc, 1, 2.0, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PageError::RenderFailed { page: 2, .. }));
    }
}
