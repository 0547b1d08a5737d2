//! # Mailsage
//!
//! Resilient LLM orchestration and structured extraction for mail and CRM
//! assistants.
//!
//! Mailsage turns domain requests ("summarize this thread", "draft a reply")
//! into reliable calls against an external completion service, and turns the
//! service's free-form or semi-structured output back into typed records.
//!
//! ## Layers
//!
//! - [`text`]: signature stripping, whitespace normalization, truncation and
//!   thread context rendering
//! - [`llm`]: response cache, concurrency limiter and the retrying
//!   [`llm::Orchestrator`]
//! - [`parsing`]: section and JSON extractors that degrade to defaults
//! - [`skills`]: the seven skill pipelines exposed through [`SkillService`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mailsage::{MailsageConfig, Orchestrator, SkillService};
//! use mailsage::skills::ReplyOptions;
//!
//! let config = MailsageConfig::load_default();
//! let orchestrator = Arc::new(Orchestrator::new(&config.orchestrator));
//! let skills = SkillService::new(orchestrator, completion, store, search)
//!     .with_settings(config.skills);
//!
//! let reply = skills
//!     .draft_reply("msg-42", "user-7", ReplyOptions::default())
//!     .await;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

/// Creates a compile-time verified regex wrapped in [`std::sync::LazyLock`].
///
/// Call sites import `LazyLock` and `Regex`.
macro_rules! lazy_regex {
    ($pattern:expr) => {
        LazyLock::new(|| Regex::new($pattern).unwrap_or_else(|_| unreachable!()))
    };
}

pub mod config;
pub mod llm;
pub mod observability;
pub mod parsing;
pub mod skills;
pub mod store;
pub mod text;

pub use config::{MailsageConfig, OrchestratorConfig, SkillSettings};
pub use llm::{CompletionService, ModelName, Orchestrator};
pub use skills::{AiResult, SkillService};
pub use store::{ConversationStore, SimilaritySearch};

/// Error type for mailsage operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotFound` | The subject message, thread or contact does not exist |
/// | `OperationFailed` | A completion call fails or times out, a store lookup fails |
/// | `InvalidInput` | Configuration cannot be read or parsed, options are unusable |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The subject of a request does not exist.
    ///
    /// Raised when the conversation store has no message, thread or contact
    /// for the requested id. Never retried and never escalated to the
    /// fallback model.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// The kind of object that was looked up.
        kind: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - The completion service returns an error
    /// - A completion attempt exceeds its deadline
    /// - A conversation store lookup fails
    /// - The concurrency limiter has been closed
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Shorthand for an [`Error::OperationFailed`].
    pub fn operation(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Returns true for errors caused by missing domain data.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for mailsage operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::operation("complete", "connection reset");
        assert_eq!(
            err.to_string(),
            "operation 'complete' failed: connection reset"
        );

        let err = Error::NotFound {
            kind: "thread",
            id: "t-1".to_string(),
        };
        assert_eq!(err.to_string(), "thread not found: t-1");
        assert!(err.is_not_found());
    }
}
