//! Post-processing: deterministic cleanup of recognised text.
//!
//! Recognizers report text line by line; what comes back can carry CR line
//! endings, trailing spaces from right-aligned boxes, zero-width characters
//! picked up from the image, and stacks of blank lines where a page has
//! empty regions. These rules remove that noise without touching the words
//! themselves. They run before the "recognised nothing" check, so a page
//! that yields only whitespace counts as empty.
//!
//! Embedded text used for directly-extracted pages never passes through
//! here: it is returned verbatim.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the per-line rules see `\n` only;
//! invisible characters go before trimming so a line holding just a
//! zero-width space becomes blank and is collapsed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to recognised page text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF/CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
/// 3. Trim trailing whitespace per line
/// 4. Collapse runs of blank lines to a single blank line
/// 5. Trim leading and trailing blank lines
pub fn clean_recognized_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip invisible Unicode ──────────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}\u{00AD}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").to_string()
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse blank-line runs ─────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}
