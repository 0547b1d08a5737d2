//! Text preparation for prompts.
//!
//! Conversational text arrives with signatures, quoted replies, forwarded
//! chains and runs of blank lines. [`prepare`] strips that noise and bounds the
//! result so it can be embedded in a prompt. [`ThreadContextBuilder`] renders
//! the recent part of a conversation into one bounded block.

mod thread;

pub use thread::{
    DEFAULT_MAX_MESSAGES, MAX_HEADER_LENGTH, MESSAGE_SEPARATOR, ThreadContextBuilder,
};

use regex::Regex;
use std::sync::LazyLock;

/// Default character budget for prepared text.
pub const DEFAULT_MAX_LENGTH: usize = 10_000;

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// Lines quoting a previous message (`> ...`).
static QUOTED_LINE: LazyLock<Regex> = lazy_regex!(r"(?m)^[^\S\n]*>.*(?:\n|$)");

/// First line that starts a signature, forwarded chain or reply attribution.
///
/// Matches, each on a line of its own:
/// - `--` (the RFC 3676 signature delimiter)
/// - three or more hyphens
/// - `Sent from my ...`
/// - `---------- Forwarded message ----------`, `Begin forwarded message:`,
///   `-----Original Message-----`
/// - `On <date>, <person> wrote:`
static SIGNATURE_START: LazyLock<Regex> = lazy_regex!(
    r"(?mi)^[^\S\n]*(?:--[^\S\n]*|-{3,}[^\S\n]*|sent from my\s.*|-+[^\S\n]*forwarded message[^\S\n]*-+.*|begin forwarded message:.*|-+[^\S\n]*original message[^\S\n]*-+.*|on\s.+\swrote:[^\S\n]*)$"
);

/// A newline followed by two or more blank lines.
static BLANK_RUN: LazyLock<Regex> = lazy_regex!(r"\n(?:[^\S\n]*\n){2,}");

/// Prepares conversational text for a prompt.
///
/// Drops quoted lines, cuts everything from the first signature or forwarded
/// marker, collapses runs of blank lines to a single blank line, trims, and
/// truncates to `max_length` characters. Truncated output ends with
/// [`ELLIPSIS`] and never exceeds `max_length` characters (unless
/// `max_length` is shorter than the marker itself).
///
/// Applying `prepare` twice with the same bound yields the same string.
///
/// # Example
///
/// ```rust
/// use mailsage::text::prepare;
///
/// let body = "Thanks, see you Monday.\n\n--\nJane Doe\nACME Corp";
/// assert_eq!(prepare(body, 100), "Thanks, see you Monday.");
/// ```
#[must_use]
pub fn prepare(text: &str, max_length: usize) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let unquoted = QUOTED_LINE.replace_all(&normalized, "");

    let without_signature = SIGNATURE_START
        .find(&unquoted)
        .map_or(unquoted.as_ref(), |m| &unquoted[..m.start()]);

    let collapsed = BLANK_RUN.replace_all(without_signature, "\n\n");
    truncate(collapsed.trim(), max_length)
}

/// Prepares text with [`DEFAULT_MAX_LENGTH`].
#[must_use]
pub fn prepare_default(text: &str) -> String {
    prepare(text, DEFAULT_MAX_LENGTH)
}

/// Truncates to `max_length` characters, reserving room for the marker.
fn truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let keep = max_length.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
