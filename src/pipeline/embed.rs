//! Text-layer planning: recognised tokens → positioned invisible text runs.
//!
//! ## Coordinate systems
//!
//! Three frames are involved:
//!
//! | Frame | Origin | y grows | Units |
//! |-------|--------|---------|-------|
//! | [`NormalizedBox`] (recognizer) | bottom-left of the bitmap | up | fraction of bitmap |
//! | [`PageRect`] | top-left of the page | down | PDF points |
//! | pdfium object placement | bottom-left of the page | up | PDF points |
//!
//! Recognizer → page: `x = bx·W`, `y = (1 − by − bh)·H`, `w = bw·W`,
//! `h = bh·H`. The flip `1 − y − h` turns "distance from the bottom to the
//! box's bottom edge" into "distance from the top to the box's top edge".
//! Because the bitmap is the page scaled uniformly, normalized fractions
//! map straight onto page points; the scale factor cancels.
//!
//! Page → pdfium: the bottom edge sits at `H − y − h`. The text baseline is
//! raised a fifth of the box height above that so descenders stay inside.

use crate::document::{Document, NormalizedBox, RecognizedToken};
use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Share of the box height used as font size.
const FONT_HEIGHT_RATIO: f32 = 0.8;
/// Baseline offset above the box bottom, as a share of box height.
const BASELINE_RATIO: f32 = 0.2;

/// A rectangle in PDF points measured from the page's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PageRect {
    pub fn from_normalized(b: &NormalizedBox, page_width: f32, page_height: f32) -> Self {
        Self {
            x: b.x * page_width,
            y: (1.0 - b.y - b.height) * page_height,
            width: b.width * page_width,
            height: b.height * page_height,
        }
    }

    /// Inverse of [`PageRect::from_normalized`].
    pub fn to_normalized(&self, page_width: f32, page_height: f32) -> NormalizedBox {
        let h = self.height / page_height;
        NormalizedBox {
            x: self.x / page_width,
            y: 1.0 - self.y / page_height - h,
            width: self.width / page_width,
            height: h,
        }
    }

    /// Distance from the page's bottom edge to this rect's bottom edge.
    pub fn bottom(&self, page_height: f32) -> f32 {
        page_height - self.y - self.height
    }
}

/// One invisible text object to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub rect: PageRect,
}

impl TextRun {
    pub fn font_size(&self) -> f32 {
        (self.rect.height * FONT_HEIGHT_RATIO).max(1.0)
    }

    /// Baseline y in bottom-left page coordinates.
    pub fn baseline(&self, page_height: f32) -> f32 {
        self.rect.bottom(page_height) + self.rect.height * BASELINE_RATIO
    }
}

/// All runs for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayer {
    pub page_index: usize,
    pub page_width: f32,
    pub page_height: f32,
    pub runs: Vec<TextRun>,
}

/// Build one [`PageLayer`] per page that has tokens, in page order.
///
/// Tokens are keyed by page index; a key outside the document, or a token
/// whose own `page_index` disagrees with its key, is rejected.
pub fn plan_layers(
    document: &Document,
    tokens_by_page: &BTreeMap<usize, Vec<RecognizedToken>>,
) -> Result<Vec<PageLayer>, OcrError> {
    let mut layers = Vec::with_capacity(tokens_by_page.len());

    for (&index, tokens) in tokens_by_page {
        let page = document.pages.get(index).ok_or_else(|| OcrError::EmbedFailed {
            path: document.source.clone(),
            detail: format!(
                "tokens for page {} but the document has {} pages",
                index + 1,
                document.page_count()
            ),
        })?;

        let runs = tokens
            .iter()
            .map(|t| {
                if t.page_index != index {
                    return Err(OcrError::EmbedFailed {
                        path: document.source.clone(),
                        detail: format!(
                            "token from page {} filed under page {}",
                            t.page_index + 1,
                            index + 1
                        ),
                    });
                }
                Ok(TextRun {
                    text: t.text.clone(),
                    rect: PageRect::from_normalized(&t.bbox, page.width, page.height),
                })
            })
            .filter(|r| r.as_ref().map_or(true, |run| !run.text.trim().is_empty()))
            .collect::<Result<Vec<_>, _>>()?;

        if runs.is_empty() {
            continue;
        }
        debug!("Page {}: {} text runs planned", index + 1, runs.len());
        layers.push(PageLayer {
            page_index: index,
            page_width: page.width,
            page_height: page.height,
            runs,
        });
    }
    Ok(layers)
}

// ── Standard font coverage ───────────────────────────────────────────────

/// Characters outside Latin-1 that WinAnsiEncoding still maps.
const WIN_ANSI_EXTRAS: &str = "€‚ƒ„…†‡ˆ‰Š‹ŒŽ‘’“”•–—˜™š›œžŸ";

/// Whether the built-in Helvetica (WinAnsiEncoding) can encode `c`.
pub fn standard_font_encodes(c: char) -> bool {
    matches!(c, ' '..='~' | '\u{A0}'..='\u{FF}') || WIN_ANSI_EXTRAS.contains(c)
}

/// Fail when a run holds text the built-in font cannot encode. Such runs
/// would be written without their glyph codes and could not be searched.
pub fn require_standard_font_coverage(
    source: &Path,
    layers: &[PageLayer],
) -> Result<(), OcrError> {
    for layer in layers {
        for run in &layer.runs {
            if let Some(c) = run.text.chars().find(|c| !standard_font_encodes(*c)) {
                return Err(OcrError::EmbedFailed {
                    path: source.to_path_buf(),
                    detail: format!(
                        "page {} has text the built-in Helvetica cannot encode ({:?}, U+{:04X}); \
pass a TrueType font covering it with --font",
                        layer.page_index + 1,
                        c,
                        c as u32
                    ),
                });
            }
        }
    }
    Ok(())
}
