//! Page classification and the document-level "already has text" gate.
//!
//! A page *has text* when its embedded text, trimmed, is non-empty. The gate
//! is all-or-nothing: one such page anywhere flags the whole document, and
//! the caller must decide between viewing the existing text and stripping it
//! before OCR. Per-page classification still decides, afterwards, which
//! pages need recognition.

use crate::document::{Document, Page};
use serde::{Deserialize, Serialize};

/// Per-page verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageClass {
    HasText,
    NeedsOcr,
}

pub fn classify(page: &Page) -> PageClass {
    match page.embedded_text.as_deref() {
        Some(text) if !text.trim().is_empty() => PageClass::HasText,
        _ => PageClass::NeedsOcr,
    }
}

/// Outcome of the document-level gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextGate {
    /// 0-based indices of pages that already carry text.
    pub pages_with_text: Vec<usize>,
}

impl TextGate {
    pub fn evaluate(document: &Document) -> Self {
        Self {
            pages_with_text: document
                .pages
                .iter()
                .filter(|p| classify(p) == PageClass::HasText)
                .map(|p| p.index)
                .collect(),
        }
    }

    /// `true` when the caller has to choose before OCR may run.
    pub fn is_triggered(&self) -> bool {
        !self.pages_with_text.is_empty()
    }
}

/// Pages of `document` that need recognition, in page order.
pub fn pages_needing_ocr(document: &Document) -> Vec<usize> {
    document
        .pages
        .iter()
        .filter(|p| classify(p) == PageClass::NeedsOcr)
        .map(|p| p.index)
        .collect()
}
