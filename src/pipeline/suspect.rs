//! Suspect-token detection: flag recognised words that are likely misreads.
//!
//! Three cheap rules, checked in order; the first that matches is the
//! reason reported for the token:
//!
//! 1. more than two characters from [`SPECIAL_CHARS`]
//! 2. a confusable glyph pair from [`CONFUSABLE_SUBSTRINGS`] (`0O`, `Il`, …)
//! 3. a digit or Latin letter sharing a token with the document's non-Latin
//!    script (e.g. `가1나`, `한a글`)
//!
//! Tokens are whitespace-separated and only considered when 2–30 characters
//! long. Detection never changes text: corrections from the
//! [`ConfusionMap`] are proposals that the caller applies explicitly with
//! [`crate::output::DocumentTranscript::apply_correction`].

use crate::error::OcrError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Characters counted by the special-character rule.
pub const SPECIAL_CHARS: &str = "!@#$%^&*()_+=[]{}|\\;:'\",<>/?~`";

/// Glyph pairs recognizers commonly confuse.
pub const CONFUSABLE_SUBSTRINGS: [&str; 6] = ["0O", "1l", "Il", "|I", "5S", "8B"];

const MIN_TOKEN_CHARS: usize = 2;
const MAX_TOKEN_CHARS: usize = 30;
const MAX_SPECIAL_CHARS: usize = 2;

static DEFAULT_CONFUSIONS: Lazy<BTreeMap<String, String>> = Lazy::new(|| {
    [
        ("0O", "00"),
        ("O0", "00"),
        ("1l", "11"),
        ("l1", "11"),
        ("Il", "ll"),
        ("|I", "II"),
        ("5S", "55"),
        ("8B", "88"),
        ("rn", "m"),
        ("vv", "w"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
});

// ── Script ───────────────────────────────────────────────────────────────

/// The non-Latin script whose mixing with digits or Latin letters is suspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Script {
    /// Korean syllables and jamo. (default)
    #[default]
    Hangul,
    /// CJK unified ideographs.
    Han,
    /// Hiragana and katakana.
    Kana,
    Cyrillic,
}

impl Script {
    pub fn contains(&self, c: char) -> bool {
        let u = c as u32;
        match self {
            Script::Hangul => {
                (0xAC00..=0xD7A3).contains(&u)
                    || (0x1100..=0x11FF).contains(&u)
                    || (0x3130..=0x318F).contains(&u)
            }
            Script::Han => (0x4E00..=0x9FFF).contains(&u) || (0x3400..=0x4DBF).contains(&u),
            Script::Kana => (0x3040..=0x30FF).contains(&u),
            Script::Cyrillic => (0x0400..=0x04FF).contains(&u),
        }
    }
}

// ── Confusion map ────────────────────────────────────────────────────────

/// A proposed fix for a suspect token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub from: String,
    pub to: String,
    /// The token with every `from` replaced by `to`.
    pub corrected: String,
}

/// Confusable substring → replacement. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfusionMap {
    entries: BTreeMap<String, String>,
}

impl Default for ConfusionMap {
    fn default() -> Self {
        Self {
            entries: DEFAULT_CONFUSIONS.clone(),
        }
    }
}

impl ConfusionMap {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .filter(|(k, _): &(String, String)| !k.is_empty())
                .collect(),
        }
    }

    /// Parse a JSON object of `"from": "to"` pairs.
    pub fn from_json_str(json: &str) -> Result<Self, OcrError> {
        let entries: BTreeMap<String, String> = serde_json::from_str(json)
            .map_err(|e| OcrError::InvalidConfig(format!("confusion map: {e}")))?;
        Ok(Self::new(entries))
    }

    pub fn load_json(path: &Path) -> Result<Self, OcrError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OcrError::InvalidConfig(format!("confusion map {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every correction whose `from` occurs in `token`.
    pub fn proposals(&self, token: &str) -> Vec<Correction> {
        self.entries
            .iter()
            .filter(|(from, _)| token.contains(from.as_str()))
            .map(|(from, to)| Correction {
                from: from.clone(),
                to: to.clone(),
                corrected: token.replace(from.as_str(), to),
            })
            .collect()
    }
}

// ── Detection ────────────────────────────────────────────────────────────

/// Why a token was flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspectReason {
    /// Number of special characters found (always > 2).
    SpecialCharacters(usize),
    /// The confusable substring found.
    Confusable(String),
    /// Digit or Latin letter mixed with the configured script.
    MixedScript,
}

/// A flagged token with the corrections on offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectToken {
    pub token: String,
    pub reason: SuspectReason,
    pub corrections: Vec<Correction>,
    /// How many times the token occurred in the scanned text.
    pub occurrences: usize,
}

/// Which rule, if any, flags `token`. Length limits apply.
pub fn check_suspicious(token: &str, script: Script) -> Option<SuspectReason> {
    let len = token.chars().count();
    if !(MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS).contains(&len) {
        return None;
    }

    let specials = token.chars().filter(|c| SPECIAL_CHARS.contains(*c)).count();
    if specials > MAX_SPECIAL_CHARS {
        return Some(SuspectReason::SpecialCharacters(specials));
    }

    if let Some(pair) = CONFUSABLE_SUBSTRINGS.iter().find(|p| token.contains(*p)) {
        return Some(SuspectReason::Confusable(pair.to_string()));
    }

    let has_script = token.chars().any(|c| script.contains(c));
    if has_script {
        let has_digit = token.chars().any(|c| c.is_ascii_digit());
        let has_latin = token.chars().any(|c| c.is_ascii_alphabetic());
        if has_digit || has_latin {
            return Some(SuspectReason::MixedScript);
        }
    }
    None
}

/// Flags suspect tokens in recognised text. Cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct SuspectTokenDetector {
    script: Script,
    confusion_map: Arc<ConfusionMap>,
}

impl SuspectTokenDetector {
    pub fn new(script: Script, confusion_map: Arc<ConfusionMap>) -> Self {
        Self {
            script,
            confusion_map,
        }
    }

    /// Each distinct suspect token once, in first-seen order.
    pub fn detect(&self, text: &str) -> Vec<SuspectToken> {
        let mut found: Vec<SuspectToken> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for token in text.split_whitespace() {
            if let Some(&i) = index.get(token) {
                found[i].occurrences += 1;
                continue;
            }
            if let Some(reason) = check_suspicious(token, self.script) {
                index.insert(token, found.len());
                found.push(SuspectToken {
                    token: token.to_string(),
                    reason,
                    corrections: self.confusion_map.proposals(token),
                    occurrences: 1,
                });
            }
        }
        found
    }
}
