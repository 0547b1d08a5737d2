//! Sentiment analysis.

use super::{
    AiResult, AttemptRecord, ResponseExtractor, SkillOutput, SkillService, run_with_fallback,
};
use crate::llm::{CacheKey, ModelName, ResponseFormat};
use crate::parsing::{FieldReader, parse_object};
use crate::text::prepare;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const SKILL: &str = "sentiment";
const TEMPERATURE: f32 = 0.3;

const POSITIVE_WORDS: &[&str] = &[
    "positive", "friendly", "warm", "enthusiastic", "cordial", "constructive", "appreciative",
    "pleased", "happy", "excellent",
];
const NEGATIVE_WORDS: &[&str] = &[
    "negative", "hostile", "frustrated", "tense", "unhappy", "angry", "strained", "dissatisfied",
    "disappointed", "upset",
];

/// Overall polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    /// Favourable.
    Positive,
    /// Neither, or ambiguous.
    #[default]
    Neutral,
    /// Unfavourable.
    Negative,
}

impl Sentiment {
    /// Returns the lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    /// Parses an exact label, ignoring case and surrounding punctuation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase()
            .as_str()
        {
            "positive" => Some(Self::Positive),
            "neutral" | "mixed" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }

    /// Classifies free text by keyword.
    ///
    /// An exact label wins. Otherwise positive and negative keywords are
    /// counted; only a one-sided match is taken, anything else is neutral.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        if let Some(exact) = Self::parse(text) {
            return exact;
        }

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let positive = words.iter().filter(|w| POSITIVE_WORDS.contains(*w)).count();
        let negative = words.iter().filter(|w| NEGATIVE_WORDS.contains(*w)).count();

        match (positive, negative) {
            (p, 0) if p > 0 => Self::Positive,
            (0, n) if n > 0 => Self::Negative,
            _ => Self::Neutral,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Share of each polarity, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    /// Positive share.
    pub positive: f64,
    /// Neutral share.
    pub neutral: f64,
    /// Negative share.
    pub negative: f64,
}

impl SentimentBreakdown {
    /// The breakdown reported when nothing could be read.
    pub const NEUTRAL: Self = Self {
        positive: 0.33,
        neutral: 0.34,
        negative: 0.33,
    };
}

impl Default for SentimentBreakdown {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Options for [`SkillService::analyze_sentiment`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentOptions {
    /// Model to use (default from settings).
    pub model: Option<ModelName>,
}

/// Sentiment of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    /// Overall polarity.
    pub sentiment: Sentiment,
    /// Score in `[-1, 1]`.
    pub score: f64,
    /// Polarity shares.
    pub breakdown: SentimentBreakdown,
    /// Phrases that drove the assessment.
    pub key_phrases: Vec<String>,
    /// Set when the response could not be parsed.
    pub note: Option<String>,
}

impl SentimentAnalysis {
    /// The neutral result reported for unparseable output.
    #[must_use]
    pub fn neutral_with_note(note: impl Into<String>) -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            score: 0.0,
            breakdown: SentimentBreakdown::NEUTRAL,
            key_phrases: Vec::new(),
            note: Some(note.into()),
        }
    }
}

/// Reads the sentiment JSON contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentExtractor;

impl ResponseExtractor for SentimentExtractor {
    type Output = SentimentAnalysis;

    fn extract(&self, raw: &str) -> SentimentAnalysis {
        let object = match parse_object(raw) {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!(error = %e, "Sentiment response unparseable, using neutral default");
                return SentimentAnalysis::neutral_with_note(format!(
                    "could not parse sentiment response: {e}"
                ));
            },
        };
        let reader = FieldReader::new(&object);

        let sentiment = reader
            .opt_string(&["sentiment", "overall_sentiment", "overallSentiment"])
            .map_or(Sentiment::Neutral, |s| Sentiment::from_text(&s));

        SentimentAnalysis {
            sentiment,
            score: reader.number_clamped(&["score", "sentiment_score"], -1.0, 1.0, 0.0),
            breakdown: reader
                .object(&["breakdown", "sentiment_breakdown"])
                .map_or(SentimentBreakdown::NEUTRAL, read_breakdown),
            key_phrases: reader.string_list(&["key_phrases", "keyPhrases", "phrases"]),
            note: None,
        }
    }
}

/// Reads shares, accepting either fractions or percentages.
fn read_breakdown(reader: FieldReader<'_>) -> SentimentBreakdown {
    let raw = [
        reader.number_clamped(&["positive"], 0.0, 100.0, 0.0),
        reader.number_clamped(&["neutral"], 0.0, 100.0, 0.0),
        reader.number_clamped(&["negative"], 0.0, 100.0, 0.0),
    ];
    let scale = if raw.iter().any(|v| *v > 1.0) { 100.0 } else { 1.0 };
    let [positive, neutral, negative] = raw.map(|v| (v / scale).clamp(0.0, 1.0));
    SentimentBreakdown {
        positive,
        neutral,
        negative,
    }
}

impl SkillService {
    /// Analyzes the sentiment of a message.
    pub async fn analyze_sentiment(
        &self,
        message_id: &str,
        owner_id: &str,
        options: SentimentOptions,
    ) -> AiResult<SentimentAnalysis> {
        let model = self.model_for(options.model);
        let options = &options;
        run_with_fallback(SKILL, message_id, model, |attempt| {
            self.analyze_sentiment_once(message_id, owner_id, options, attempt)
        })
        .await
    }

    async fn analyze_sentiment_once(
        &self,
        message_id: &str,
        owner_id: &str,
        options: &SentimentOptions,
        attempt: AttemptRecord,
    ) -> Result<SkillOutput<SentimentAnalysis>> {
        let found = self
            .store
            .get_message(message_id, owner_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "message",
                id: message_id.to_string(),
            })?;

        let body = prepare(&found.message.body, self.settings.max_body_length);
        let request = self.request(
            attempt.model,
            SYSTEM_PROMPT.to_string(),
            format!(
                "Analyze the sentiment of this email.\n\nSUBJECT: {}\n\n{body}",
                found.message.subject
            ),
            TEMPERATURE,
            ResponseFormat::JsonObject,
        );
        let key = CacheKey::new(SKILL, &[owner_id, message_id], &(options, attempt.model));
        let completion = self.complete(&key, request).await?;

        let data = SentimentExtractor.extract(&completion.text);
        Ok(SkillOutput::new(data, &completion, attempt.model))
    }
}

const SYSTEM_PROMPT: &str = "You analyze the sentiment of emails. Respond with a single JSON object:\n\
{\"sentiment\": \"positive\" | \"neutral\" | \"negative\",\n \
\"score\": <number from -1 (very negative) to 1 (very positive)>,\n \
\"breakdown\": {\"positive\": <0-1>, \"neutral\": <0-1>, \"negative\": <0-1>},\n \
\"key_phrases\": [<short phrases that drove the assessment>]}";
