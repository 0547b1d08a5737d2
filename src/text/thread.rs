//! Thread context rendering.

use super::{DEFAULT_MAX_LENGTH, prepare, truncate};
use crate::store::ConversationMessage;

/// Default number of recent messages included in a thread context.
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// Character budget for each of the `FROM`, `TO` and `SUBJECT` header values.
pub const MAX_HEADER_LENGTH: usize = 200;

/// Labels, line breaks and the formatted date of one message header.
const HEADER_OVERHEAD: usize = 64;

/// Line placed between rendered messages.
///
/// Uses `=` rather than `-` so that re-preparing a rendered context never
/// mistakes the separator for a signature delimiter.
pub const MESSAGE_SEPARATOR: &str = "\n\n========================================\n\n";

/// Renders the most recent messages of a conversation into a bounded block.
///
/// Each message becomes a `FROM/TO/DATE/SUBJECT` header followed by its
/// prepared body. Header values are flattened to one line and capped at
/// [`MAX_HEADER_LENGTH`], so every rendered block fits in
/// [`max_block_length`](Self::max_block_length) characters.
#[derive(Debug, Clone, Copy)]
pub struct ThreadContextBuilder {
    max_messages: usize,
    max_body_length: usize,
}

impl ThreadContextBuilder {
    /// Creates a builder with the given limits.
    #[must_use]
    pub const fn new(max_messages: usize, max_body_length: usize) -> Self {
        Self {
            max_messages,
            max_body_length,
        }
    }

    /// Sets the maximum number of messages rendered.
    #[must_use]
    pub const fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Sets the per-message body budget in characters.
    #[must_use]
    pub const fn with_max_body_length(mut self, max_body_length: usize) -> Self {
        self.max_body_length = max_body_length;
        self
    }

    /// Returns the configured message limit.
    #[must_use]
    pub const fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Upper bound, in characters, of one rendered message block.
    #[must_use]
    pub const fn max_block_length(&self) -> usize {
        self.max_body_length
            .saturating_add(3 * MAX_HEADER_LENGTH)
            .saturating_add(HEADER_OVERHEAD)
    }

    /// Renders the chronologically last `max_messages` messages.
    ///
    /// Messages are ordered by `sent_at` (stable for equal timestamps), the
    /// oldest beyond the limit are dropped, and the rest are rendered oldest
    /// first. An empty input, or a limit of zero, yields an empty string,
    /// which callers treat as "no context available".
    #[must_use]
    pub fn build_context(&self, messages: &[ConversationMessage]) -> String {
        if messages.is_empty() || self.max_messages == 0 {
            return String::new();
        }

        let mut ordered: Vec<&ConversationMessage> = messages.iter().collect();
        ordered.sort_by_key(|message| message.sent_at);

        let skip = ordered.len().saturating_sub(self.max_messages);
        ordered
            .into_iter()
            .skip(skip)
            .map(|message| self.render_message(message))
            .collect::<Vec<_>>()
            .join(MESSAGE_SEPARATOR)
    }

    fn render_message(&self, message: &ConversationMessage) -> String {
        format!(
            "FROM: {}\nTO: {}\nDATE: {}\nSUBJECT: {}\n\n{}",
            header(&message.from),
            header(&message.to.join(", ")),
            message.sent_at.format("%Y-%m-%d %H:%M UTC"),
            header(&message.subject),
            prepare(&message.body, self.max_body_length)
        )
    }
}

fn header(value: &str) -> String {
    let flattened = value.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&flattened, MAX_HEADER_LENGTH)
}

impl Default for ThreadContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES, DEFAULT_MAX_LENGTH)
    }
}
