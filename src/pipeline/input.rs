//! Input resolution: validate a user-supplied path and work out what it is.
//!
//! ## Why sniff magic bytes?
//!
//! Extensions lie, and pdfium reports a non-PDF as a generic format error.
//! Reading the first bytes up front lets callers get `UnsupportedInput` with
//! the offending bytes rather than a confusing load failure, and routes
//! raster images to the image loader instead of pdfium.

use crate::error::OcrError;
use image::ImageFormat;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What kind of file an input path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image(ImageFormat),
}

/// A validated local input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub path: PathBuf,
    pub kind: InputKind,
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_pdf(&self) -> bool {
        self.kind == InputKind::Pdf
    }
}

/// Classify a file from its leading bytes.
pub fn sniff(magic: &[u8]) -> Option<InputKind> {
    if magic.starts_with(b"%PDF") {
        return Some(InputKind::Pdf);
    }
    if magic.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some(InputKind::Image(ImageFormat::Png));
    }
    if magic.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(InputKind::Image(ImageFormat::Jpeg));
    }
    if magic.starts_with(b"II*\0") || magic.starts_with(b"MM\0*") {
        return Some(InputKind::Image(ImageFormat::Tiff));
    }
    None
}

/// Resolve a local path, validating existence, readability and format.
pub fn resolve_input(path: impl AsRef<Path>) -> Result<ResolvedInput, OcrError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(OcrError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(OcrError::PermissionDenied { path });
        }
        Err(_) => return Err(OcrError::FileNotFound { path }),
    };

    let mut magic = [0u8; 4];
    let read = file.read(&mut magic).unwrap_or(0);
    match sniff(&magic[..read]) {
        Some(kind) => {
            debug!("Resolved {:?} input: {}", kind, path.display());
            Ok(ResolvedInput { path, kind })
        }
        None => Err(OcrError::UnsupportedInput { path, magic }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f
    }

    #[test]
    fn sniff_recognises_supported_formats() {
        assert_eq!(sniff(b"%PDF-1.7"), Some(InputKind::Pdf));
        assert_eq!(
            sniff(&[0x89, b'P', b'N', b'G', 0x0D]),
            Some(InputKind::Image(ImageFormat::Png))
        );
        assert_eq!(
            sniff(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(InputKind::Image(ImageFormat::Jpeg))
        );
        assert_eq!(sniff(b"II*\0"), Some(InputKind::Image(ImageFormat::Tiff)));
        assert_eq!(sniff(b"GIF8"), None);
        assert_eq!(sniff(b""), None);
    }

    #[test]
    fn resolve_pdf_file() {
        let f = write_temp(b"%PDF-1.4\n%%EOF");
        let r = resolve_input(f.path()).unwrap();
        assert!(r.is_pdf());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, OcrError::FileNotFound { .. }));
        assert!(err.is_load_failure());
    }

    #[test]
    fn text_file_is_unsupported() {
        let f = write_temp(b"hello world");
        let err = resolve_input(f.path()).unwrap_err();
        match err {
            OcrError::UnsupportedInput { magic, .. } => assert_eq!(&magic, b"hell"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
