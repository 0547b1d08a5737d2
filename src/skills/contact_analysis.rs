//! Contact communication analysis.

use super::{
    AiResult, AttemptRecord, ResponseExtractor, Sentiment, SkillOutput, SkillService,
    run_with_fallback,
};
use crate::llm::{CacheKey, ModelName, ResponseFormat};
use crate::parsing::SectionParser;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const SKILL: &str = "contact_analysis";
const TEMPERATURE: f32 = 0.5;

static ANALYSIS_SECTIONS: LazyLock<SectionParser> = LazyLock::new(|| {
    SectionParser::new(&[
        (
            "overall",
            &["overall analysis", "overall", "relationship overview", "overview", "summary"],
        ),
        (
            "frequency",
            &["communication frequency", "frequency", "contact frequency"],
        ),
        ("topics", &["main topics", "key topics", "topics", "common topics"]),
        ("sentiment", &["sentiment", "overall sentiment", "tone"]),
        (
            "response_time",
            &["response time", "response times", "response patterns", "responsiveness"],
        ),
        ("suggestions", &["suggestions", "recommendations", "next steps"]),
    ])
});

/// Options for [`SkillService::analyze_contact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactAnalysisOptions {
    /// Most recent messages considered.
    pub max_messages: usize,
    /// Model to use (default from settings).
    pub model: Option<ModelName>,
}

impl Default for ContactAnalysisOptions {
    fn default() -> Self {
        Self {
            max_messages: 20,
            model: None,
        }
    }
}

/// How communication with a contact is going.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommunicationAnalysis {
    /// Overall relationship analysis.
    pub overall: String,
    /// How often the parties communicate.
    pub frequency: String,
    /// Recurring topics.
    pub topics: Vec<String>,
    /// Normalized sentiment.
    pub sentiment: Sentiment,
    /// Response-time patterns.
    pub response_time: String,
    /// Suggestions for the user.
    pub suggestions: Vec<String>,
    /// Messages the analysis was based on.
    pub message_count: usize,
}

/// Reads the six analysis sections.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommunicationExtractor;

impl ResponseExtractor for CommunicationExtractor {
    type Output = CommunicationAnalysis;

    fn extract(&self, raw: &str) -> CommunicationAnalysis {
        let sections = ANALYSIS_SECTIONS.parse(raw);

        let overall = if sections.has("overall") {
            sections.text("overall")
        } else {
            sections.preamble().to_string()
        };

        CommunicationAnalysis {
            overall,
            frequency: sections.text("frequency"),
            topics: sections.list("topics"),
            sentiment: Sentiment::from_text(&sections.text("sentiment")),
            response_time: sections.text("response_time"),
            suggestions: sections.list("suggestions"),
            message_count: 0,
        }
    }
}

impl SkillService {
    /// Analyzes communication with a contact.
    pub async fn analyze_contact(
        &self,
        contact_id: &str,
        owner_id: &str,
        options: ContactAnalysisOptions,
    ) -> AiResult<CommunicationAnalysis> {
        let model = self.model_for(options.model);
        let options = &options;
        run_with_fallback(SKILL, contact_id, model, |attempt| {
            self.analyze_contact_once(contact_id, owner_id, options, attempt)
        })
        .await
    }

    async fn analyze_contact_once(
        &self,
        contact_id: &str,
        owner_id: &str,
        options: &ContactAnalysisOptions,
        attempt: AttemptRecord,
    ) -> Result<SkillOutput<CommunicationAnalysis>> {
        let history = self
            .store
            .get_contact_history(contact_id, owner_id, options.max_messages)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "contact",
                id: contact_id.to_string(),
            })?;

        let context = self
            .context_builder()
            .with_max_messages(options.max_messages)
            .build_context(&history.messages);
        let contact = &history.contact;
        let company = contact
            .company
            .as_deref()
            .map(|c| format!(" ({c})"))
            .unwrap_or_default();

        let user = if context.is_empty() {
            format!(
                "Analyze my communication with {} <{}>{company}. There are no messages on record.",
                contact.name, contact.email
            )
        } else {
            format!(
                "Analyze my communication with {} <{}>{company} based on these {} messages.\n\n{context}",
                contact.name,
                contact.email,
                history.messages.len().min(options.max_messages)
            )
        };

        let request = self.request(
            attempt.model,
            SYSTEM_PROMPT.to_string(),
            user,
            TEMPERATURE,
            ResponseFormat::Text,
        );
        let key = CacheKey::new(SKILL, &[owner_id, contact_id], &(options, attempt.model));
        let completion = self.complete(&key, request).await?;

        let mut data = CommunicationExtractor.extract(&completion.text);
        data.message_count = history.messages.len().min(options.max_messages);
        Ok(SkillOutput::new(data, &completion, attempt.model))
    }
}

const SYSTEM_PROMPT: &str = "You analyze business relationships from email history.\n\
Answer with these labelled sections, in this order:\n\
- Overall Analysis: two or three sentences on the relationship\n\
- Communication Frequency: how often and how regularly the parties write\n\
- Main Topics: a bulleted list\n\
- Sentiment: one word, positive, neutral or negative, then a short reason\n\
- Response Time: typical response patterns on both sides\n\
- Suggestions: a bulleted list of concrete next steps";
