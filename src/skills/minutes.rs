//! Meeting minutes.

use super::{
    AiResult, AttemptRecord, ResponseExtractor, SkillOutput, SkillService, run_with_fallback,
};
use crate::llm::{CacheKey, ModelName, ResponseFormat};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

const SKILL: &str = "minutes";
const TEMPERATURE: f32 = 0.3;

/// Output markup of the minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinutesFormat {
    /// Markdown headings and bullets.
    #[default]
    Markdown,
    /// Plain text.
    Text,
    /// An HTML fragment.
    Html,
}

impl MinutesFormat {
    const fn guidance(self) -> &'static str {
        match self {
            Self::Markdown => "Format the minutes in Markdown with `##` headings and `-` bullets.",
            Self::Text => "Format the minutes as plain text with no markup.",
            Self::Html => {
                "Format the minutes as an HTML fragment using <h2>, <ul> and <p> only, \
                 without <html> or <body> tags."
            },
        }
    }
}

/// Options for [`SkillService::generate_meeting_minutes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinutesOptions {
    /// Output markup.
    pub format: MinutesFormat,
    /// Include an attendee list.
    pub include_attendees: bool,
    /// Include decisions made.
    pub include_decisions: bool,
    /// Include next steps with owners.
    pub include_next_steps: bool,
    /// Model to use (default from settings).
    pub model: Option<ModelName>,
}

impl Default for MinutesOptions {
    fn default() -> Self {
        Self {
            format: MinutesFormat::Markdown,
            include_attendees: true,
            include_decisions: true,
            include_next_steps: true,
            model: None,
        }
    }
}

/// Minutes written from a thread.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MeetingMinutes {
    /// The minutes, in `format`.
    pub content: String,
    /// Markup of `content`.
    pub format: MinutesFormat,
}

/// Takes the response verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinutesExtractor {
    /// Format that was requested.
    pub format: MinutesFormat,
}

impl ResponseExtractor for MinutesExtractor {
    type Output = MeetingMinutes;

    fn extract(&self, raw: &str) -> MeetingMinutes {
        MeetingMinutes {
            content: raw.trim().to_string(),
            format: self.format,
        }
    }
}

impl SkillService {
    /// Writes meeting minutes from a thread.
    pub async fn generate_meeting_minutes(
        &self,
        thread_id: &str,
        owner_id: &str,
        options: MinutesOptions,
    ) -> AiResult<MeetingMinutes> {
        let model = self.model_for(options.model);
        let options = &options;
        run_with_fallback(SKILL, thread_id, model, |attempt| {
            self.generate_meeting_minutes_once(thread_id, owner_id, options, attempt)
        })
        .await
    }

    async fn generate_meeting_minutes_once(
        &self,
        thread_id: &str,
        owner_id: &str,
        options: &MinutesOptions,
        attempt: AttemptRecord,
    ) -> Result<SkillOutput<MeetingMinutes>> {
        let thread = self
            .store
            .get_thread(thread_id, owner_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "thread",
                id: thread_id.to_string(),
            })?;

        let context = self.context_builder().build_context(&thread.messages);
        let mut request = self.request(
            attempt.model,
            system_prompt(options),
            format!(
                "Write meeting minutes for this email thread.\n\nTHREAD SUBJECT: {}\n\n{context}",
                thread.subject
            ),
            TEMPERATURE,
            ResponseFormat::Text,
        );
        request.max_tokens = request.max_tokens.saturating_mul(2);

        let key = CacheKey::new(SKILL, &[owner_id, thread_id], &(options, attempt.model));
        let completion = self.complete(&key, request).await?;

        let data = MinutesExtractor {
            format: options.format,
        }
        .extract(&completion.text);
        Ok(SkillOutput::new(data, &completion, attempt.model))
    }
}

fn system_prompt(options: &MinutesOptions) -> String {
    let mut sections = vec!["Summary of the discussion"];
    if options.include_attendees {
        sections.insert(0, "Attendees");
    }
    if options.include_decisions {
        sections.push("Decisions made");
    }
    if options.include_next_steps {
        sections.push("Next steps, each with an owner and a due date when known");
    }

    let mut prompt = String::from(
        "You write concise, factual meeting minutes from email discussions. \
         Do not invent facts that are not in the thread.\nInclude these sections:\n",
    );
    for section in sections {
        prompt.push_str("- ");
        prompt.push_str(section);
        prompt.push('\n');
    }
    prompt.push_str(options.format.guidance());
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_is_trimmed_verbatim() {
        let raw = "\n\n## Attendees\n- Dana\n\n## Decisions made\n- Ship on Friday\n  ";
        let minutes = MinutesExtractor {
            format: MinutesFormat::Markdown,
        }
        .extract(raw);
        assert_eq!(
            minutes.content,
            "## Attendees\n- Dana\n\n## Decisions made\n- Ship on Friday"
        );
        assert_eq!(minutes.format, MinutesFormat::Markdown);
    }

    #[test]
    fn test_format_tag_follows_request() {
        let minutes = MinutesExtractor {
            format: MinutesFormat::Html,
        }
        .extract("<h2>Attendees</h2>");
        assert_eq!(minutes.format, MinutesFormat::Html);
        assert_eq!(minutes.content, "<h2>Attendees</h2>");
    }

    #[test]
    fn test_prompt_sections_follow_options() {
        let full = system_prompt(&MinutesOptions::default());
        assert!(full.contains("Attendees"));
        assert!(full.contains("Decisions made"));
        assert!(full.contains("Next steps"));
        assert!(full.contains("Markdown"));

        let bare = system_prompt(&MinutesOptions {
            format: MinutesFormat::Text,
            include_attendees: false,
            include_decisions: false,
            include_next_steps: false,
            model: None,
        });
        assert!(!bare.contains("Attendees"));
        assert!(!bare.contains("Decisions made"));
        assert!(!bare.contains("Next steps"));
        assert!(bare.contains("plain text"));
    }

    #[test]
    fn test_format_serializes_lowercase() {
        let json = serde_json::to_string(&MinutesFormat::Html).unwrap();
        assert_eq!(json, "\"html\"");
    }
}
