//! Thread summarization.

use super::{
    AiResult, AttemptRecord, ResponseExtractor, SkillOutput, SkillService, run_with_fallback,
};
use crate::llm::{CacheKey, ModelName, ResponseFormat};
use crate::parsing::SectionParser;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const SKILL: &str = "summary";
const TEMPERATURE: f32 = 0.3;

static SUMMARY_SECTIONS: LazyLock<SectionParser> = LazyLock::new(|| {
    SectionParser::new(&[
        ("summary", &["summary", "overview", "thread summary"]),
        ("key_points", &["key points", "main points", "highlights"]),
        ("action_items", &["action items", "actions", "next steps", "to do", "todo"]),
        ("participants", &["participants", "people involved", "attendees"]),
        ("timeline", &["timeline"]),
    ])
});

static TIMELINE_FIELDS: LazyLock<SectionParser> = LazyLock::new(|| {
    SectionParser::new(&[
        ("start", &["start", "started", "first message", "began"]),
        ("end", &["end", "ended", "last message", "latest"]),
        ("duration", &["duration", "span", "length"]),
    ])
});

/// Options for [`SkillService::summarize_thread`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryOptions {
    /// Ask for action items.
    pub include_action_items: bool,
    /// Ask for the list of participants.
    pub include_participants: bool,
    /// Ask for a start/end/duration timeline.
    pub include_timeline: bool,
    /// Target summary length in words.
    pub max_length: usize,
    /// Model to use (default from settings).
    pub model: Option<ModelName>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            include_action_items: true,
            include_participants: true,
            include_timeline: false,
            max_length: 200,
            model: None,
        }
    }
}

/// Start, end and duration of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timeline {
    /// When the conversation started.
    pub start: String,
    /// When it ended or was last active.
    pub end: String,
    /// How long it ran.
    pub duration: String,
}

/// A thread summary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Summary paragraph(s).
    pub summary: String,
    /// Key points.
    pub key_points: Vec<String>,
    /// Action items (empty unless requested).
    pub action_items: Vec<String>,
    /// Participants (empty unless requested).
    pub participants: Vec<String>,
    /// Timeline (only when requested and present).
    pub timeline: Option<Timeline>,
    /// Messages in the summarized thread.
    pub message_count: usize,
}

/// Reads labelled summary sections.
#[derive(Debug, Clone, Copy)]
pub struct SummaryExtractor {
    /// Whether action items were requested.
    pub include_action_items: bool,
    /// Whether participants were requested.
    pub include_participants: bool,
    /// Whether a timeline was requested.
    pub include_timeline: bool,
}

impl From<&SummaryOptions> for SummaryExtractor {
    fn from(options: &SummaryOptions) -> Self {
        Self {
            include_action_items: options.include_action_items,
            include_participants: options.include_participants,
            include_timeline: options.include_timeline,
        }
    }
}

impl ResponseExtractor for SummaryExtractor {
    type Output = ThreadSummary;

    fn extract(&self, raw: &str) -> ThreadSummary {
        let sections = SUMMARY_SECTIONS.parse(raw);

        let summary = if sections.has("summary") {
            sections.text("summary")
        } else {
            // Unlabelled leading prose is the summary
            sections.preamble().to_string()
        };
        if summary.is_empty() {
            tracing::warn!("Summary response had no summary text");
        }

        let timeline = if self.include_timeline && sections.has("timeline") {
            let fields = TIMELINE_FIELDS.parse(&sections.text("timeline"));
            let timeline = Timeline {
                start: fields.text("start"),
                end: fields.text("end"),
                duration: fields.text("duration"),
            };
            let empty = timeline.start.is_empty()
                && timeline.end.is_empty()
                && timeline.duration.is_empty();
            (!empty).then_some(timeline)
        } else {
            None
        };

        ThreadSummary {
            summary,
            key_points: sections.list("key_points"),
            action_items: if self.include_action_items {
                sections.list("action_items")
            } else {
                Vec::new()
            },
            participants: if self.include_participants {
                sections.list("participants")
            } else {
                Vec::new()
            },
            timeline,
            message_count: 0,
        }
    }
}

impl SkillService {
    /// Summarizes a thread.
    pub async fn summarize_thread(
        &self,
        thread_id: &str,
        owner_id: &str,
        options: SummaryOptions,
    ) -> AiResult<ThreadSummary> {
        let model = self.model_for(options.model);
        let options = &options;
        run_with_fallback(SKILL, thread_id, model, |attempt| {
            self.summarize_thread_once(thread_id, owner_id, options, attempt)
        })
        .await
    }

    async fn summarize_thread_once(
        &self,
        thread_id: &str,
        owner_id: &str,
        options: &SummaryOptions,
        attempt: AttemptRecord,
    ) -> Result<SkillOutput<ThreadSummary>> {
        let thread = self
            .store
            .get_thread(thread_id, owner_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "thread",
                id: thread_id.to_string(),
            })?;

        let context = self.context_builder().build_context(&thread.messages);
        let user = format!(
            "Summarize this email thread.\n\nTHREAD SUBJECT: {}\nMESSAGES: {}\n\n{context}",
            thread.subject,
            thread.messages.len()
        );

        let request = self.request(
            attempt.model,
            system_prompt(options),
            user,
            TEMPERATURE,
            ResponseFormat::Text,
        );
        let key = CacheKey::new(SKILL, &[owner_id, thread_id], &(options, attempt.model));
        let completion = self.complete(&key, request).await?;

        let mut data = SummaryExtractor::from(options).extract(&completion.text);
        data.message_count = thread.messages.len();
        Ok(SkillOutput::new(data, &completion, attempt.model))
    }
}

fn system_prompt(options: &SummaryOptions) -> String {
    let mut sections = vec![
        format!("Summary: a summary of at most {} words", options.max_length),
        "Key Points: a bulleted list of the most important points".to_string(),
    ];
    if options.include_action_items {
        sections.push(
            "Action Items: a bulleted list of follow-ups, with owners when known".to_string(),
        );
    }
    if options.include_participants {
        sections.push("Participants: a bulleted list of the people involved".to_string());
    }
    if options.include_timeline {
        sections.push(
            "Timeline: three lines `Start: <when>`, `End: <when>` and `Duration: <how long>`"
                .to_string(),
        );
    }

    format!(
        "You summarize email threads for a busy reader. Be factual and do not invent details.\n\
         Answer with these labelled sections, in this order:\n- {}",
        sections.join("\n- ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "**Summary:** The team agreed to move the launch to May.\n\n\
        **Key Points:**\n\
        - Launch moves to May 12\n\
        - Marketing budget unchanged\n\n\
        **Action Items:**\n\
        1. Dana updates the roadmap\n\
        2. Lee informs sales\n\n\
        **Participants:** Dana, Lee, Priya\n\n\
        **Timeline:**\n\
        Start: 2024-03-01\n\
        End: 2024-03-04\n\
        Duration: 3 days";

    fn extractor(timeline: bool) -> SummaryExtractor {
        SummaryExtractor::from(&SummaryOptions {
            include_timeline: timeline,
            ..SummaryOptions::default()
        })
    }

    #[test]
    fn test_extracts_all_sections() {
        let summary = extractor(true).extract(SAMPLE);
        assert_eq!(summary.summary, "The team agreed to move the launch to May.");
        assert_eq!(
            summary.key_points,
            vec!["Launch moves to May 12", "Marketing budget unchanged"]
        );
        assert_eq!(
            summary.action_items,
            vec!["Dana updates the roadmap", "Lee informs sales"]
        );
        assert_eq!(summary.participants, vec!["Dana", "Lee", "Priya"]);
        assert_eq!(
            summary.timeline,
            Some(Timeline {
                start: "2024-03-01".to_string(),
                end: "2024-03-04".to_string(),
                duration: "3 days".to_string(),
            })
        );
    }

    #[test]
    fn test_timeline_only_when_requested() {
        assert!(extractor(false).extract(SAMPLE).timeline.is_none());
    }

    #[test]
    fn test_unrequested_lists_are_empty() {
        let extractor = SummaryExtractor {
            include_action_items: false,
            include_participants: false,
            include_timeline: false,
        };
        let summary = extractor.extract(SAMPLE);
        assert!(summary.action_items.is_empty());
        assert!(summary.participants.is_empty());
        assert_eq!(summary.key_points.len(), 2);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let summary = extractor(true).extract("The thread is about lunch plans.");
        assert_eq!(summary.summary, "The thread is about lunch plans.");
        assert!(summary.key_points.is_empty());
        assert!(summary.action_items.is_empty());
        assert!(summary.timeline.is_none());
    }

    #[test]
    fn test_system_prompt_lists_requested_sections() {
        let prompt = system_prompt(&SummaryOptions {
            include_action_items: false,
            include_timeline: true,
            max_length: 80,
            ..SummaryOptions::default()
        });
        assert!(prompt.contains("at most 80 words"));
        assert!(!prompt.contains("Action Items"));
        assert!(prompt.contains("Participants"));
        assert!(prompt.contains("Timeline"));
    }
}
