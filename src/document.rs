//! Loaded documents and the recognised tokens that refer back into them.
//!
//! A [`Document`] is an immutable snapshot of a PDF (or a single raster
//! image) taken at load time: page bounds in PDF points plus whatever text the
//! file already embeds. Stripping or embedding never mutates a `Document`;
//! both write a new file and load a new `Document` from it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What kind of file a [`Document`] was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// A PDF, possibly with an embedded text layer.
    Pdf,
    /// A PNG/JPEG/TIFF image, loaded as a single page without text.
    Image,
}

/// One page of a loaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 0-based page index.
    pub index: usize,
    /// Page width in PDF points (pixels for image sources).
    pub width: f32,
    /// Page height in PDF points (pixels for image sources).
    pub height: f32,
    /// Text already present in the page's content stream, if any.
    pub embedded_text: Option<String>,
}

impl Page {
    /// 1-based page number used in headers and log lines.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// An ordered sequence of pages identified by the path it was loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub source: PathBuf,
    pub kind: SourceKind,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn is_pdf(&self) -> bool {
        self.kind == SourceKind::Pdf
    }
}

/// A bounding box in image-normalized coordinates.
///
/// All four values are fractions of the bitmap's width/height in `[0, 1]`.
/// The origin is the **bottom-left** corner of the image and `y` grows
/// upwards, so `y` is the distance from the bottom edge to the bottom of the
/// box. Recognizers that report top-left pixel boxes convert with
/// [`NormalizedBox::from_top_left_pixels`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormalizedBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Convert a top-left-origin pixel rectangle into a normalized box.
    ///
    /// Values are clamped so boxes that spill past the image edge stay inside
    /// `[0, 1]`.
    pub fn from_top_left_pixels(
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let iw = image_width.max(1) as f32;
        let ih = image_height.max(1) as f32;
        let x = (left as f32 / iw).clamp(0.0, 1.0);
        let w = (width as f32 / iw).clamp(0.0, 1.0 - x);
        let top_n = (top as f32 / ih).clamp(0.0, 1.0);
        let h = (height as f32 / ih).clamp(0.0, 1.0 - top_n);
        Self {
            x,
            y: (1.0 - top_n - h).max(0.0),
            width: w,
            height: h,
        }
    }

    /// `true` when every edge lies inside the unit square.
    pub fn is_within_unit(&self) -> bool {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        in_unit(self.x)
            && in_unit(self.y)
            && in_unit(self.width)
            && in_unit(self.height)
            && self.x + self.width <= 1.0 + f32::EPSILON
            && self.y + self.height <= 1.0 + f32::EPSILON
    }
}

/// A recognised text region (one line for most engines) on a specific page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedToken {
    /// Top-ranked candidate string; alternatives are discarded.
    pub text: String,
    pub bbox: NormalizedBox,
    /// Confidence proxy of the top candidate in `[0, 1]`.
    pub confidence: f32,
    /// 0-based index of the page the token was read from.
    pub page_index: usize,
}
