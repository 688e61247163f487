//! Pipeline stages for OCR.
//!
//! Each submodule implements one step; [`crate::convert`] wires them
//! together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ engine.load ──▶ classify ──▶ render ──▶ recognize ──▶ suspect
//! (sniff)    (pdfium)        (gate)      (worker)   (tesseract)    (flag)
//!                                              └──────────┬──────────┘
//!                                                     aggregate ──▶ embed
//!                                                     (slots)       (text layer)
//! ```
//!
//! 1. [`input`]     : validate the path and sniff PDF vs raster image
//! 2. [`engine`]    : the PDF capability (load, metadata, render, write)
//! 3. [`classify`]  : per-page HasText/NeedsOcr and the document-level gate
//! 4. [`render`]    : rasterise pages on a blocking worker, stream bitmaps
//! 5. [`encode`]    : PNG encoding for file-based recognizers
//! 6. [`recognize`] : the OCR capability and top-candidate selection
//! 7. [`postprocess`] : deterministic cleanup of recognised text
//! 8. [`suspect`]   : flag likely misreads, propose corrections
//! 9. [`aggregate`] : ordered, write-once assembly of page results
//! 10. [`embed`]    : map token boxes to page coordinates for the text layer
//! 11. [`strip`]    : external tools, text-layer removal and reload

pub mod aggregate;
pub mod classify;
pub mod embed;
pub mod encode;
pub mod engine;
pub mod input;
pub mod postprocess;
pub mod recognize;
pub mod render;
pub mod strip;
pub mod suspect;
