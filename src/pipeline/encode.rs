//! Image encoding: `DynamicImage` → PNG for recognizers that read files.
//!
//! PNG is lossless; JPEG ringing around glyph edges measurably hurts OCR
//! accuracy on small print.

use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Write};
use tempfile::NamedTempFile;
use tracing::debug;

/// Encode a bitmap as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} PNG bytes", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Write a bitmap to a `.png` temp file that is removed when dropped.
pub fn write_png_temp(img: &DynamicImage) -> Result<NamedTempFile, String> {
    let bytes = encode_png(img).map_err(|e| format!("PNG encode failed: {e}"))?;
    let mut file = tempfile::Builder::new()
        .prefix("pdfocr-page-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| format!("temp file: {e}"))?;
    file.write_all(&bytes)
        .and_then(|_| file.flush())
        .map_err(|e| format!("temp file write: {e}"))?;
    Ok(file)
}
