//! Configuration types for an OCR run.
//!
//! Everything a run needs is carried by [`OcrConfig`], built via its
//! [`OcrConfigBuilder`]. That includes the external capabilities (PDF engine,
//! recognizer, strip tool), so tests swap in fakes by handing different
//! `Arc<dyn …>` values to the builder instead of patching globals.
//!
//! # Example
//! ```rust
//! use edgequake_pdfocr::{ExistingTextChoice, OcrConfig};
//!
//! let config = OcrConfig::builder()
//!     .scale(3.0)
//!     .languages(["en-US", "ko-KR"])
//!     .existing_text(ExistingTextChoice::ViewExisting)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.languages[0], "en-US");
//! ```

use crate::error::OcrError;
use crate::pipeline::engine::{PdfEngine, PdfiumEngine};
use crate::pipeline::recognize::{Recognizer, TesseractRecognizer};
use crate::pipeline::strip::{ExternalTool, GhostscriptTool};
use crate::pipeline::suspect::{ConfusionMap, Script};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Languages tried first when none are configured.
pub const DEFAULT_LANGUAGES: [&str; 5] = ["ko-KR", "en-US", "ja-JP", "zh-Hans", "zh-Hant"];

/// Configuration for an OCR run.
///
/// Built via [`OcrConfig::builder()`] or [`OcrConfig::default()`].
#[derive(Clone)]
pub struct OcrConfig {
    /// Upscale factor applied to page point size when rasterising. Range:
    /// 0.5–8.0. Default: 2.0.
    ///
    /// Output pixel size is `page points × scale`. Image inputs ignore this
    /// and are decoded at their native size.
    pub scale: f32,

    /// Optional contrast/saturation normalisation applied before recognition.
    pub color_adjust: Option<ColorAdjust>,

    /// Ordered language preference as BCP-47 tags. Default:
    /// [`DEFAULT_LANGUAGES`].
    ///
    /// Languages the recognizer reports as supported but missing from this
    /// list are appended after it.
    pub languages: Vec<String>,

    /// Recognition accuracy tier. Default: [`RecognitionLevel::Accurate`].
    pub recognition_level: RecognitionLevel,

    /// Let the recognizer apply its language model to candidates. Default: true.
    pub language_correction: bool,

    /// Pages recognised concurrently. Default: 1.
    ///
    /// Results are always reassembled in page order, whatever this is set to.
    pub concurrency: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// What to do when the document already carries a text layer.
    /// `None` makes the run stop with [`OcrError::ExistingTextLayer`].
    pub existing_text: Option<ExistingTextChoice>,

    /// Where the stripped copy is written. Default: alongside the source.
    pub strip_destination: StripDestination,

    /// Flag likely misrecognitions on recognised pages. Default: true.
    pub detect_suspects: bool,

    /// Non-Latin script whose mixing with digits or Latin letters is suspect.
    /// Default: [`Script::Hangul`].
    pub suspect_script: Script,

    /// Confusable-substring corrections offered for suspect tokens.
    pub confusion_map: Arc<ConfusionMap>,

    /// Keep each rendered bitmap on its `PageResult`. Default: false.
    pub retain_bitmaps: bool,

    /// PDF parsing/rendering/writing capability.
    pub engine: Arc<dyn PdfEngine>,

    /// OCR capability.
    pub recognizer: Arc<dyn Recognizer>,

    /// External text-layer removal capability.
    pub stripper: Arc<dyn ExternalTool>,

    /// Optional progress callback. Default: no-op.
    pub progress_callback: ProgressCallback,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            color_adjust: None,
            languages: DEFAULT_LANGUAGES.iter().map(|s| s.to_string()).collect(),
            recognition_level: RecognitionLevel::default(),
            language_correction: true,
            concurrency: 1,
            password: None,
            existing_text: None,
            strip_destination: StripDestination::default(),
            detect_suspects: true,
            suspect_script: Script::default(),
            confusion_map: Arc::new(ConfusionMap::default()),
            retain_bitmaps: false,
            engine: Arc::new(PdfiumEngine::default()),
            recognizer: Arc::new(TesseractRecognizer::default()),
            stripper: Arc::new(GhostscriptTool::default()),
            progress_callback: Arc::new(NoopProgressCallback),
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("scale", &self.scale)
            .field("color_adjust", &self.color_adjust)
            .field("languages", &self.languages)
            .field("recognition_level", &self.recognition_level)
            .field("language_correction", &self.language_correction)
            .field("concurrency", &self.concurrency)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("existing_text", &self.existing_text)
            .field("strip_destination", &self.strip_destination)
            .field("detect_suspects", &self.detect_suspects)
            .field("suspect_script", &self.suspect_script)
            .field("confusion_map_entries", &self.confusion_map.len())
            .field("retain_bitmaps", &self.retain_bitmaps)
            .field("engine", &self.engine.name())
            .field("recognizer", &self.recognizer.name())
            .field("stripper", &self.stripper.name())
            .finish()
    }
}

impl OcrConfig {
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`OcrConfig`].
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl fmt::Debug for OcrConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OcrConfigBuilder").field(&self.config).finish()
    }
}

impl OcrConfigBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale.clamp(0.5, 8.0);
        self
    }

    pub fn color_adjust(mut self, adjust: ColorAdjust) -> Self {
        self.config.color_adjust = Some(adjust);
        self
    }

    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn recognition_level(mut self, level: RecognitionLevel) -> Self {
        self.config.recognition_level = level;
        self
    }

    pub fn language_correction(mut self, v: bool) -> Self {
        self.config.language_correction = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn existing_text(mut self, choice: ExistingTextChoice) -> Self {
        self.config.existing_text = Some(choice);
        self
    }

    pub fn strip_destination(mut self, dest: StripDestination) -> Self {
        self.config.strip_destination = dest;
        self
    }

    pub fn detect_suspects(mut self, v: bool) -> Self {
        self.config.detect_suspects = v;
        self
    }

    pub fn suspect_script(mut self, script: Script) -> Self {
        self.config.suspect_script = script;
        self
    }

    pub fn confusion_map(mut self, map: Arc<ConfusionMap>) -> Self {
        self.config.confusion_map = map;
        self
    }

    pub fn retain_bitmaps(mut self, v: bool) -> Self {
        self.config.retain_bitmaps = v;
        self
    }

    pub fn engine(mut self, engine: Arc<dyn PdfEngine>) -> Self {
        self.config.engine = engine;
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.config.recognizer = recognizer;
        self
    }

    pub fn stripper(mut self, stripper: Arc<dyn ExternalTool>) -> Self {
        self.config.stripper = stripper;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = cb;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if !(0.5..=8.0).contains(&c.scale) {
            return Err(OcrError::InvalidConfig(format!(
                "scale must be 0.5–8.0, got {}",
                c.scale
            )));
        }
        if c.concurrency == 0 {
            return Err(OcrError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.languages.iter().any(|l| l.trim().is_empty()) {
            return Err(OcrError::InvalidConfig(
                "language tags must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Recognition accuracy tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecognitionLevel {
    /// Faster, lower-accuracy recognition.
    Fast,
    /// Highest accuracy the recognizer offers. (default)
    #[default]
    Accurate,
}

/// The caller's answer to the "document already contains text" gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExistingTextChoice {
    /// Return the embedded text as-is; pages without text are not OCR'd.
    ViewExisting,
    /// Remove the text layer externally, reload, and OCR the stripped copy.
    StripAndReprocess,
}

/// Where [`crate::strip_text_layer`] writes its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StripDestination {
    /// `<stem>_OCR_Removed.pdf` next to the source. (default)
    #[default]
    Alongside,
    /// A private temporary directory that lives as long as the result.
    TempDir,
}

/// Pixel adjustments applied to a rendered page before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorAdjust {
    /// Convert to greyscale.
    pub desaturate: bool,
    /// Contrast change in percent; positive raises contrast.
    pub contrast: f32,
    /// Brightness offset added to every channel.
    pub brightness: i32,
}

impl ColorAdjust {
    /// Greyscale with a moderate contrast boost; a good default for scans.
    pub fn enhance() -> Self {
        Self {
            desaturate: true,
            contrast: 20.0,
            brightness: 0,
        }
    }

    pub fn is_identity(&self) -> bool {
        !self.desaturate && self.contrast == 0.0 && self.brightness == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = OcrConfig::default();
        assert_eq!(c.scale, 2.0);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.languages, DEFAULT_LANGUAGES);
        assert_eq!(c.recognition_level, RecognitionLevel::Accurate);
        assert!(c.language_correction);
        assert!(c.existing_text.is_none());
        assert_eq!(c.strip_destination, StripDestination::Alongside);
        assert!(!c.retain_bitmaps);
    }

    #[test]
    fn builder_clamps_scale_and_concurrency() {
        let c = OcrConfig::builder()
            .scale(100.0)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.scale, 8.0);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn empty_language_tag_is_rejected() {
        let err = OcrConfig::builder().languages(["en-US", " "]).build();
        assert!(matches!(err, Err(OcrError::InvalidConfig(_))));
    }

    #[test]
    fn debug_redacts_password() {
        let c = OcrConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn enhance_preset_is_not_identity() {
        assert!(!ColorAdjust::enhance().is_identity());
        let none = ColorAdjust {
            desaturate: false,
            contrast: 0.0,
            brightness: 0,
        };
        assert!(none.is_identity());
    }
}
