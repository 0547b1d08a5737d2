//! Skill pipelines.
//!
//! Every skill follows the same template:
//!
//! 1. Fetch the subject (message, thread or contact history) from the
//!    [`ConversationStore`]; a missing subject fails fast
//! 2. Optionally enrich the prompt through [`SimilaritySearch`]; failures are
//!    logged and ignored
//! 3. Build a bounded prompt from prepared text and thread context
//! 4. Execute through the shared [`Orchestrator`] (cache, limiter, retries)
//! 5. Parse the output with the skill's [`ResponseExtractor`], which never fails
//!
//! If steps 1-5 fail with anything but a missing subject or unusable options,
//! the whole pipeline runs once more on the fallback model (see
//! [`run_with_fallback`]). A second failure is reported as
//! [`AiResult::Failure`]; there is never a third run.

mod action_items;
mod contact_analysis;
mod minutes;
mod reply;
mod sentiment;
mod summary;
mod template;

pub use action_items::{
    ActionItem, ActionItemExtractor, ActionItemOptions, ActionItemSet, Priority,
};
pub use contact_analysis::{CommunicationAnalysis, CommunicationExtractor, ContactAnalysisOptions};
pub use minutes::{MeetingMinutes, MinutesExtractor, MinutesFormat, MinutesOptions};
pub use reply::{EmailResponse, ReplyExtractor, ReplyLength, ReplyOptions, Tone};
pub use sentiment::{
    Sentiment, SentimentAnalysis, SentimentBreakdown, SentimentExtractor, SentimentOptions,
};
pub use summary::{SummaryExtractor, SummaryOptions, ThreadSummary, Timeline};
pub use template::{EmailTemplate, TemplateExtractor, TemplateOptions};

use crate::config::SkillSettings;
use crate::llm::{
    CacheKey, ChatMessage, Completion, CompletionRequest, CompletionService, ModelName,
    Orchestrator, ResponseFormat, TokenUsage,
};
use crate::store::{ConversationStore, SimilarMessage, SimilaritySearch};
use crate::text::ThreadContextBuilder;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

/// Parses raw model output into a skill's record.
///
/// Implementations never fail: malformed or partial output yields a record
/// with default values for whatever could not be read.
pub trait ResponseExtractor {
    /// The record produced.
    type Output;

    /// Extracts a record from raw model output.
    fn extract(&self, raw: &str) -> Self::Output;
}

/// Outcome of a skill invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AiResult<T> {
    /// The skill produced data.
    Success {
        /// The skill's record.
        data: T,
        /// Token usage of the call that produced the data.
        usage: Option<TokenUsage>,
        /// The model that produced the data.
        model: ModelName,
    },
    /// The skill could not complete.
    Failure {
        /// What went wrong.
        error: SkillFailure,
    },
}

impl<T> AiResult<T> {
    /// Returns true for [`AiResult::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the data of a success.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    /// Consumes the result, returning the data of a success.
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&SkillFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error),
        }
    }

    /// Returns the model that produced a success.
    #[must_use]
    pub const fn model(&self) -> Option<ModelName> {
        match self {
            Self::Success { model, .. } => Some(*model),
            Self::Failure { .. } => None,
        }
    }

    /// Returns the token usage of a success.
    #[must_use]
    pub const fn usage(&self) -> Option<TokenUsage> {
        match self {
            Self::Success { usage, .. } => *usage,
            Self::Failure { .. } => None,
        }
    }
}

/// Why a skill failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The subject does not exist.
    NotFound,
    /// The request options cannot be used.
    InvalidRequest,
    /// The completion path failed on the requested and fallback models.
    Unavailable,
}

/// A skill failure as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable message: `could not complete <skill>: <cause>`.
    pub message: String,
}

impl SkillFailure {
    fn from_error(skill: &str, error: &Error) -> Self {
        let kind = match error {
            Error::NotFound { .. } => FailureKind::NotFound,
            Error::InvalidInput(_) => FailureKind::InvalidRequest,
            Error::OperationFailed { .. } => FailureKind::Unavailable,
        };
        Self {
            kind,
            message: format!("could not complete {skill}: {error}"),
        }
    }
}

/// Which model a pipeline run uses and how many runs preceded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Model for this run.
    pub model: ModelName,
    /// Runs made before this one (0 or 1).
    pub attempts_so_far: u32,
}

impl AttemptRecord {
    /// The first run, on the requested model.
    #[must_use]
    pub const fn first(model: ModelName) -> Self {
        Self {
            model,
            attempts_so_far: 0,
        }
    }

    /// The fallback run, or `None` if this run may not fall back.
    ///
    /// Only a first run on a non-fallback model has a successor.
    #[must_use]
    pub const fn fallback(self) -> Option<Self> {
        if self.attempts_so_far > 0 {
            return None;
        }
        match self.model.fallback() {
            Some(model) => Some(Self {
                model,
                attempts_so_far: self.attempts_so_far + 1,
            }),
            None => None,
        }
    }

    /// Returns true if this is the fallback run.
    #[must_use]
    pub const fn is_fallback_run(self) -> bool {
        self.attempts_so_far > 0
    }
}

/// Output of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillOutput<T> {
    /// Parsed record.
    pub data: T,
    /// Token usage of the completion.
    pub usage: Option<TokenUsage>,
    /// Model used.
    pub model: ModelName,
}

impl<T> SkillOutput<T> {
    fn new(data: T, completion: &Completion, model: ModelName) -> Self {
        Self {
            data,
            usage: completion.usage,
            model,
        }
    }
}

/// Runs a pipeline on `model`, then at most once more on the fallback model.
///
/// `run` receives the [`AttemptRecord`] for each run. Not-found and invalid
/// request errors never fall back; neither does a failure on the fallback
/// model itself.
pub async fn run_with_fallback<T, F, Fut>(
    skill: &'static str,
    subject_id: &str,
    model: ModelName,
    mut run: F,
) -> AiResult<T>
where
    F: FnMut(AttemptRecord) -> Fut,
    Fut: Future<Output = Result<SkillOutput<T>>>,
{
    let span = tracing::info_span!(
        "skill",
        skill,
        subject_id,
        request_id = %uuid::Uuid::new_v4(),
    );

    async move {
        let first = AttemptRecord::first(model);
        let error = match run(first).await {
            Ok(output) => return success(skill, output),
            Err(e) => e,
        };

        let fallback = match first.fallback() {
            Some(next) if !error.is_not_found() && !matches!(error, Error::InvalidInput(_)) => next,
            _ => return failure(skill, &error),
        };

        tracing::warn!(
            from = %first.model,
            to = %fallback.model,
            error = %error,
            "Skill failed, retrying on fallback model"
        );
        metrics::counter!("ai_skill_fallbacks_total", "skill" => skill).increment(1);

        match run(fallback).await {
            Ok(output) => success(skill, output),
            Err(e) => failure(skill, &e),
        }
    }
    .instrument(span)
    .await
}

fn success<T>(skill: &'static str, output: SkillOutput<T>) -> AiResult<T> {
    metrics::counter!("ai_skill_results_total", "skill" => skill, "status" => "success")
        .increment(1);
    tracing::info!(model = %output.model, "Skill completed");
    AiResult::Success {
        data: output.data,
        usage: output.usage,
        model: output.model,
    }
}

fn failure<T>(skill: &'static str, error: &Error) -> AiResult<T> {
    let failure = SkillFailure::from_error(skill, error);
    let status = match failure.kind {
        FailureKind::NotFound => "not_found",
        FailureKind::InvalidRequest => "invalid_request",
        FailureKind::Unavailable => "unavailable",
    };
    metrics::counter!("ai_skill_results_total", "skill" => skill, "status" => status).increment(1);
    tracing::error!(error = %error, kind = status, "Skill failed");
    AiResult::Failure { error: failure }
}

/// Entry point for all skills.
///
/// Holds the shared orchestrator and the external collaborators. Cheap to
/// share behind an `Arc`; every method may run concurrently.
pub struct SkillService {
    orchestrator: Arc<Orchestrator>,
    completion: Arc<dyn CompletionService>,
    store: Arc<dyn ConversationStore>,
    search: Arc<dyn SimilaritySearch>,
    settings: SkillSettings,
}

impl SkillService {
    /// Creates a service with default [`SkillSettings`].
    #[must_use]
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        completion: Arc<dyn CompletionService>,
        store: Arc<dyn ConversationStore>,
        search: Arc<dyn SimilaritySearch>,
    ) -> Self {
        Self {
            orchestrator,
            completion,
            store,
            search,
            settings: SkillSettings::default(),
        }
    }

    /// Replaces the skill settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: SkillSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the skill settings.
    #[must_use]
    pub const fn settings(&self) -> &SkillSettings {
        &self.settings
    }

    /// Returns the shared orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    fn model_for(&self, requested: Option<ModelName>) -> ModelName {
        requested.unwrap_or(self.settings.default_model)
    }

    fn context_builder(&self) -> ThreadContextBuilder {
        ThreadContextBuilder::new(
            self.settings.max_context_messages,
            self.settings.max_body_length,
        )
    }

    fn request(
        &self,
        model: ModelName,
        system: String,
        user: String,
        temperature: f32,
        response_format: ResponseFormat,
    ) -> CompletionRequest {
        CompletionRequest {
            model,
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature,
            max_tokens: self.settings.max_tokens,
            response_format,
        }
    }

    /// Executes a completion through the orchestrator under `key`.
    async fn complete(&self, key: &CacheKey, request: CompletionRequest) -> Result<Completion> {
        tracing::debug!(
            cache_key = %key,
            model = %request.model,
            service = self.completion.name(),
            "Executing completion"
        );
        self.orchestrator
            .execute(Some(key), || {
                let completion = Arc::clone(&self.completion);
                let request = request.clone();
                async move { completion.complete(&request).await }
            })
            .await
    }

    /// Looks up similar prior messages, swallowing failures.
    async fn similar_messages(
        &self,
        query: &str,
        owner_id: &str,
        exclude_id: Option<&str>,
    ) -> Vec<SimilarMessage> {
        if self.settings.similar_limit == 0 || query.trim().is_empty() {
            return Vec::new();
        }
        match self
            .search
            .find_similar(query, owner_id, exclude_id, self.settings.similar_limit)
            .await
        {
            Ok(similar) => similar,
            Err(e) => {
                tracing::warn!(error = %e, "Similarity search failed, continuing without examples");
                Vec::new()
            },
        }
    }
}

/// Renders enrichment snippets as a bounded list for a prompt.
fn render_similar(similar: &[SimilarMessage]) -> String {
    similar
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}\n{}", i + 1, s.subject, s.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn output(model: ModelName) -> SkillOutput<&'static str> {
        SkillOutput {
            data: "ok",
            usage: None,
            model,
        }
    }

    #[test]
    fn test_attempt_record_depth_is_one() {
        let first = AttemptRecord::first(ModelName::Gpt4o);
        let second = first.fallback().unwrap();
        assert_eq!(second.model, ModelName::Gpt35Turbo);
        assert!(second.is_fallback_run());
        assert!(second.fallback().is_none());

        assert!(AttemptRecord::first(ModelName::Gpt35Turbo).fallback().is_none());
    }

    #[tokio::test]
    async fn test_success_on_first_run() {
        let result = run_with_fallback("test", "s1", ModelName::Gpt4o, |attempt| async move {
            Ok(output(attempt.model))
        })
        .await;
        assert_eq!(result.model(), Some(ModelName::Gpt4o));
        assert_eq!(result.data(), Some(&"ok"));
    }

    #[tokio::test]
    async fn test_falls_back_exactly_once() {
        let runs = AtomicU32::new(0);
        let result: AiResult<&str> =
            run_with_fallback("test", "s1", ModelName::Gpt4o, |attempt| {
                runs.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(Error::operation(
                        "complete",
                        format!("{} down", attempt.model),
                    ))
                }
            })
            .await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        let error = result.error().unwrap();
        assert_eq!(error.kind, FailureKind::Unavailable);
        assert!(error.message.starts_with("could not complete test:"));
        assert!(error.message.contains("gpt-3.5-turbo down"));
    }

    #[tokio::test]
    async fn test_fallback_success_reports_fallback_model() {
        let result = run_with_fallback("test", "s1", ModelName::Gpt4Turbo, |attempt| async move {
            if attempt.is_fallback_run() {
                Ok(output(attempt.model))
            } else {
                Err(Error::operation("complete", "primary down"))
            }
        })
        .await;
        assert_eq!(result.model(), Some(ModelName::Gpt35Turbo));
    }

    #[tokio::test]
    async fn test_fallback_model_never_falls_back() {
        let runs = AtomicU32::new(0);
        let result: AiResult<&str> =
            run_with_fallback("test", "s1", ModelName::Gpt35Turbo, |_| {
                runs.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::operation("complete", "down")) }
            })
            .await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_not_found_never_falls_back() {
        let runs = AtomicU32::new(0);
        let result: AiResult<&str> = run_with_fallback("test", "m9", ModelName::Gpt4o, |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Error::NotFound {
                    kind: "message",
                    id: "m9".to_string(),
                })
            }
        })
        .await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(result.error().unwrap().kind, FailureKind::NotFound);
    }

    #[test]
    fn test_ai_result_serializes_with_status_tag() {
        let ok: AiResult<u32> = AiResult::Success {
            data: 7,
            usage: Some(TokenUsage::new(10, 5)),
            model: ModelName::Gpt4o,
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["usage"]["total_tokens"], 15);

        let failed: AiResult<u32> = AiResult::Failure {
            error: SkillFailure {
                kind: FailureKind::Unavailable,
                message: "could not complete reply: down".to_string(),
            },
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["error"]["kind"], "unavailable");
    }

    #[test]
    fn test_render_similar() {
        let rendered = render_similar(&[
            SimilarMessage {
                subject: "Renewal".to_string(),
                snippet: "Happy to renew".to_string(),
            },
            SimilarMessage {
                subject: "Pricing".to_string(),
                snippet: "Here are the tiers".to_string(),
            },
        ]);
        assert_eq!(rendered, "1. Renewal\nHappy to renew\n\n2. Pricing\nHere are the tiers");
    }
}
