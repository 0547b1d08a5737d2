//! Action-item extraction.

use super::{
    AiResult, AttemptRecord, ResponseExtractor, SkillOutput, SkillService, run_with_fallback,
};
use crate::llm::{CacheKey, ModelName, ResponseFormat};
use crate::parsing::{FieldReader, parse_value};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SKILL: &str = "action_items";
const TEMPERATURE: f32 = 0.2;

/// Urgency of an action item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Needs attention now.
    High,
    /// Normal.
    #[default]
    Medium,
    /// Whenever convenient.
    Low,
}

impl Priority {
    /// Normalizes a free-form priority, defaulting to [`Priority::Medium`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" | "urgent" | "critical" | "p0" | "p1" => Self::High,
            "low" | "minor" | "p3" => Self::Low,
            _ => Self::Medium,
        }
    }
}

/// Options for [`SkillService::extract_action_items`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionItemOptions {
    /// Model to use (default from settings).
    pub model: Option<ModelName>,
}

/// One follow-up task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    /// What needs doing.
    pub item: String,
    /// Who should do it, when known.
    pub assignee: Option<String>,
    /// When it is due, as stated in the thread.
    pub due_date: Option<String>,
    /// Urgency.
    pub priority: Priority,
}

/// Action items found in a thread.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionItemSet {
    /// The items.
    pub items: Vec<ActionItem>,
    /// Number of items.
    pub total: usize,
    /// Set when the response could not be parsed.
    pub note: Option<String>,
}

/// Reads the action-item JSON contract.
///
/// Accepts `{"items": [...]}` as well as a bare array. Items without text are
/// dropped and `total` always equals the number of kept items.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionItemExtractor;

impl ResponseExtractor for ActionItemExtractor {
    type Output = ActionItemSet;

    fn extract(&self, raw: &str) -> ActionItemSet {
        let value = match parse_value(raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Action item response unparseable, returning no items");
                return ActionItemSet {
                    note: Some(format!("could not parse action items response: {e}")),
                    ..ActionItemSet::default()
                };
            },
        };

        let entries: &[Value] = match &value {
            Value::Array(items) => items,
            Value::Object(object) => {
                FieldReader::new(object).array(&["items", "action_items", "actionItems"])
            },
            _ => &[],
        };

        let items: Vec<ActionItem> = entries.iter().filter_map(read_item).collect();
        let dropped = entries.len() - items.len();
        if dropped > 0 {
            tracing::debug!(dropped, "Dropped action items without text");
        }

        ActionItemSet {
            total: items.len(),
            items,
            note: None,
        }
    }
}

fn read_item(value: &Value) -> Option<ActionItem> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(ActionItem {
            item: text.trim().to_string(),
            assignee: None,
            due_date: None,
            priority: Priority::Medium,
        }),
        Value::Object(object) => {
            let reader = FieldReader::new(object);
            let item = reader.opt_string(&["item", "task", "description", "title", "action"])?;
            Some(ActionItem {
                item,
                assignee: reader.opt_string(&["assignee", "owner", "assigned_to", "assignedTo"]),
                due_date: reader.opt_string(&["due_date", "dueDate", "deadline", "due"]),
                priority: Priority::parse(&reader.string(&["priority"])),
            })
        },
        _ => None,
    }
}

impl SkillService {
    /// Extracts action items from a thread.
    pub async fn extract_action_items(
        &self,
        thread_id: &str,
        owner_id: &str,
        options: ActionItemOptions,
    ) -> AiResult<ActionItemSet> {
        let model = self.model_for(options.model);
        let options = &options;
        run_with_fallback(SKILL, thread_id, model, |attempt| {
            self.extract_action_items_once(thread_id, owner_id, options, attempt)
        })
        .await
    }

    async fn extract_action_items_once(
        &self,
        thread_id: &str,
        owner_id: &str,
        options: &ActionItemOptions,
        attempt: AttemptRecord,
    ) -> Result<SkillOutput<ActionItemSet>> {
        let thread = self
            .store
            .get_thread(thread_id, owner_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "thread",
                id: thread_id.to_string(),
            })?;

        let context = self.context_builder().build_context(&thread.messages);
        let request = self.request(
            attempt.model,
            SYSTEM_PROMPT.to_string(),
            format!(
                "Extract the action items from this email thread.\n\nTHREAD SUBJECT: {}\n\n{context}",
                thread.subject
            ),
            TEMPERATURE,
            ResponseFormat::JsonObject,
        );
        let key = CacheKey::new(SKILL, &[owner_id, thread_id], &(options, attempt.model));
        let completion = self.complete(&key, request).await?;

        let data = ActionItemExtractor.extract(&completion.text);
        Ok(SkillOutput::new(data, &completion, attempt.model))
    }
}

const SYSTEM_PROMPT: &str = "You extract follow-up tasks from email threads. Only include tasks \
somebody committed to or was asked to do. Respond with a single JSON object:\n\
{\"items\": [{\"item\": <task>, \"assignee\": <name or null>, \"due_date\": <date or null>, \
\"priority\": \"high\" | \"medium\" | \"low\"}], \"total\": <number of items>}";

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_object_contract() {
        let raw = r#"```json
        {"items": [
            {"item": "Send the signed contract", "assignee": "Dana", "due_date": "Friday", "priority": "High"},
            {"item": "Book kickoff", "dueDate": "2024-05-01"},
            {"item": "", "priority": "low"},
            {"assignee": "Lee"}
        ], "total": 4}
        ```"#;
        let set = ActionItemExtractor.extract(raw);

        assert_eq!(set.total, 2);
        assert_eq!(set.items.len(), 2);
        assert_eq!(set.items[0].assignee.as_deref(), Some("Dana"));
        assert_eq!(set.items[0].priority, Priority::High);
        assert_eq!(set.items[1].due_date.as_deref(), Some("2024-05-01"));
        assert_eq!(set.items[1].priority, Priority::Medium);
        assert!(set.note.is_none());
    }

    #[test]
    fn test_bare_array_and_strings() {
        let raw = r#"["Call the bank", {"task": "Update CRM", "priority": "urgent"}]"#;
        let set = ActionItemExtractor.extract(raw);
        assert_eq!(set.total, 2);
        assert_eq!(set.items[0].item, "Call the bank");
        assert_eq!(set.items[1].priority, Priority::High);
    }

    #[test]
    fn test_invalid_json_yields_empty_set_with_note() {
        let set = ActionItemExtractor.extract("1. Call the bank\n2. Update CRM");
        assert!(set.items.is_empty());
        assert_eq!(set.total, 0);
        assert!(set.note.unwrap().contains("could not parse"));
    }

    #[test]
    fn test_object_without_items() {
        let set = ActionItemExtractor.extract(r#"{"total": 3}"#);
        assert_eq!(set.total, 0);
        assert!(set.items.is_empty());
        assert!(set.note.is_none());
    }

    #[test_case("HIGH", Priority::High)]
    #[test_case("urgent", Priority::High)]
    #[test_case("low", Priority::Low)]
    #[test_case("normal", Priority::Medium)]
    #[test_case("", Priority::Medium)]
    fn test_priority_parse(raw: &str, expected: Priority) {
        assert_eq!(Priority::parse(raw), expected);
    }
}
