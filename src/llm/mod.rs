//! Completion service abstraction and the resilient request executor.
//!
//! The completion service itself is an external collaborator behind
//! [`CompletionService`]. Everything around it lives here: the
//! [`ResponseCache`], the [`ConcurrencyLimiter`] and the retrying
//! [`RequestExecutor`] that combines them.

mod bulkhead;
mod cache;
mod resilience;

pub use bulkhead::ConcurrencyLimiter;
pub use cache::{CacheKey, ResponseCache};
pub use resilience::{Orchestrator, RequestExecutor, RetryPolicy};

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Completion models that pipelines may select.
///
/// [`ModelName::Gpt4o`] is the primary default. [`ModelName::Gpt35Turbo`] is
/// the fallback: lower capability, higher availability. A pipeline that fails
/// on any other model is retried once on the fallback, never further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelName {
    /// GPT-4o (primary default).
    #[default]
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    /// GPT-4 Turbo.
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
    /// GPT-3.5 Turbo (fallback).
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
}

impl ModelName {
    /// The primary default model.
    pub const PRIMARY: Self = Self::Gpt4o;

    /// The fallback model.
    pub const FALLBACK: Self = Self::Gpt35Turbo;

    /// Returns the wire name of the model.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gpt4o => "gpt-4o",
            Self::Gpt4Turbo => "gpt-4-turbo",
            Self::Gpt35Turbo => "gpt-3.5-turbo",
        }
    }

    /// Parses a model name, accepting a few common spellings.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gpt-4o" | "gpt4o" => Some(Self::Gpt4o),
            "gpt-4-turbo" | "gpt-4-turbo-preview" | "gpt4-turbo" => Some(Self::Gpt4Turbo),
            "gpt-3.5-turbo" | "gpt-35-turbo" | "gpt3.5-turbo" => Some(Self::Gpt35Turbo),
            _ => None,
        }
    }

    /// Returns true if this is the fallback model.
    #[must_use]
    pub const fn is_fallback(self) -> bool {
        matches!(self, Self::Gpt35Turbo)
    }

    /// Returns the model to degrade to after this one is exhausted.
    ///
    /// `None` for the fallback model itself.
    #[must_use]
    pub const fn fallback(self) -> Option<Self> {
        if self.is_fallback() {
            None
        } else {
            Some(Self::FALLBACK)
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction.
    System,
    /// User content.
    User,
    /// Prior model output.
    Assistant,
}

/// A chat message sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: Role,
    /// Message content.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Requested output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free text.
    #[default]
    Text,
    /// A single JSON object.
    JsonObject,
}

/// A single call to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model to use.
    pub model: ModelName,
    /// Conversation sent to the model.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Requested output shape.
    pub response_format: ResponseFormat,
}

/// Token accounting reported by the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated.
    pub completion_tokens: u32,
    /// Sum of both.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Creates usage from prompt and completion counts.
    #[must_use]
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Output of a completion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text (or JSON text).
    pub text: String,
    /// Token usage, when reported.
    pub usage: Option<TokenUsage>,
}

/// External large-language-model completion service.
///
/// Any `Err` is treated as a transient failure and retried by the
/// [`RequestExecutor`].
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// The service name, used in logs.
    fn name(&self) -> &'static str;

    /// Performs one completion call.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}
