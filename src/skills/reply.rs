//! Reply drafting.

use super::{
    AiResult, AttemptRecord, ResponseExtractor, SkillOutput, SkillService, render_similar,
    run_with_fallback,
};
use crate::llm::{CacheKey, ModelName, ResponseFormat};
use crate::store::{ConversationMessage, SimilarMessage};
use crate::text::prepare;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const SKILL: &str = "reply";

/// A `Subject:` line, optionally bold.
static SUBJECT_LINE: LazyLock<Regex> = lazy_regex!(
    r"(?i)^\s*(?:\*\*)?(?:suggested\s+)?subject(?:\s+line)?(?::\*\*|\*\*:|:)\s*(.+?)\s*$"
);

/// Voice of generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    /// Clear and businesslike.
    #[default]
    Professional,
    /// Warm and personable.
    Friendly,
    /// Polite and reserved.
    Formal,
    /// Relaxed and conversational.
    Casual,
}

impl Tone {
    /// Prompt guidance for the tone.
    #[must_use]
    pub const fn guidance(self) -> &'static str {
        match self {
            Self::Professional => "professional and courteous, clear and to the point",
            Self::Friendly => "warm and friendly while remaining professional",
            Self::Formal => "formal and polite, avoiding contractions and colloquialisms",
            Self::Casual => "casual and conversational, like writing to a colleague",
        }
    }
}

/// Target length of a drafted reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyLength {
    /// Two or three sentences.
    Short,
    /// One or two paragraphs.
    #[default]
    Medium,
    /// Three or four paragraphs.
    Long,
}

impl ReplyLength {
    const fn guidance(self) -> &'static str {
        match self {
            Self::Short => "2-3 sentences",
            Self::Medium => "1-2 short paragraphs",
            Self::Long => "3-4 paragraphs",
        }
    }
}

/// Options for [`SkillService::draft_reply`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyOptions {
    /// Voice of the reply.
    pub tone: Tone,
    /// Target length.
    pub length: ReplyLength,
    /// Ask for a subject suggestion on a trailing `Subject:` line.
    pub include_subject: bool,
    /// Free-form extra instructions.
    pub extra_instructions: Option<String>,
    /// Model to use (default from settings).
    pub model: Option<ModelName>,
    /// Sampling temperature (default from settings).
    pub temperature: Option<f32>,
}

/// A drafted reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmailResponse {
    /// Reply body.
    pub body: String,
    /// Suggested subject, when requested and present.
    pub suggested_subject: Option<String>,
}

/// Splits a reply into body and optional subject suggestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplyExtractor {
    /// Whether a subject line was requested.
    pub include_subject: bool,
}

impl ResponseExtractor for ReplyExtractor {
    type Output = EmailResponse;

    fn extract(&self, raw: &str) -> EmailResponse {
        let text = raw.trim();
        if !self.include_subject {
            return EmailResponse {
                body: text.to_string(),
                suggested_subject: None,
            };
        }

        let lines: Vec<&str> = text.lines().collect();
        let last = lines.iter().rposition(|l| !l.trim().is_empty());
        let first = lines.iter().position(|l| !l.trim().is_empty());

        // Prefer a trailing subject; some models lead with it instead
        for index in [last, first].into_iter().flatten() {
            if let Some(caps) = SUBJECT_LINE.captures(lines[index]) {
                let subject = caps[1].trim_matches(['"', '*', ' ']).to_string();
                if subject.is_empty() {
                    continue;
                }
                let body = lines
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != index)
                    .map(|(_, l)| *l)
                    .collect::<Vec<_>>()
                    .join("\n");
                return EmailResponse {
                    body: body.trim().to_string(),
                    suggested_subject: Some(subject),
                };
            }
        }

        EmailResponse {
            body: text.to_string(),
            suggested_subject: None,
        }
    }
}

impl SkillService {
    /// Drafts a reply to a message.
    pub async fn draft_reply(
        &self,
        message_id: &str,
        owner_id: &str,
        options: ReplyOptions,
    ) -> AiResult<EmailResponse> {
        let model = self.model_for(options.model);
        let options = &options;
        run_with_fallback(SKILL, message_id, model, |attempt| {
            self.draft_reply_once(message_id, owner_id, options, attempt)
        })
        .await
    }

    async fn draft_reply_once(
        &self,
        message_id: &str,
        owner_id: &str,
        options: &ReplyOptions,
        attempt: AttemptRecord,
    ) -> Result<SkillOutput<EmailResponse>> {
        let found = self
            .store
            .get_message(message_id, owner_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "message",
                id: message_id.to_string(),
            })?;

        let body = prepare(&found.message.body, self.settings.max_body_length);
        let similar = self.similar_messages(&body, owner_id, Some(message_id)).await;
        let context = self.context_builder().build_context(&found.thread_messages);

        let request = self.request(
            attempt.model,
            system_prompt(options),
            user_prompt(&found.message, &body, &context, &similar),
            options
                .temperature
                .unwrap_or(self.settings.default_temperature),
            ResponseFormat::Text,
        );
        let key = CacheKey::new(SKILL, &[owner_id, message_id], &(options, attempt.model));
        let completion = self.complete(&key, request).await?;

        let data = ReplyExtractor {
            include_subject: options.include_subject,
        }
        .extract(&completion.text);
        Ok(SkillOutput::new(data, &completion, attempt.model))
    }
}

fn system_prompt(options: &ReplyOptions) -> String {
    let mut prompt = format!(
        "You are an email assistant drafting replies on behalf of the user.\n\
         Write a reply that is {}.\n\
         Keep it to {}.\n\
         Write only the reply body: no greeting placeholders, no signature block.",
        options.tone.guidance(),
        options.length.guidance(),
    );
    if options.include_subject {
        prompt.push_str("\nAfter the body, add one final line of the form `Subject: <subject>`.");
    }
    if let Some(extra) = options
        .extra_instructions
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        prompt.push_str("\nAdditional instructions: ");
        prompt.push_str(extra);
    }
    prompt
}

fn user_prompt(
    message: &ConversationMessage,
    body: &str,
    context: &str,
    similar: &[SimilarMessage],
) -> String {
    let mut prompt = format!(
        "Reply to this email.\n\nFROM: {}\nSUBJECT: {}\n\n{body}",
        message.from, message.subject
    );
    if !context.is_empty() {
        prompt.push_str("\n\nConversation so far:\n\n");
        prompt.push_str(context);
    }
    if !similar.is_empty() {
        prompt.push_str("\n\nPrevious replies on similar topics, for reference:\n\n");
        prompt.push_str(&render_similar(similar));
    }
    prompt
}
