//! Email template generation.

use super::{
    AiResult, AttemptRecord, ResponseExtractor, SkillOutput, SkillService, Tone, render_similar,
    run_with_fallback,
};
use crate::llm::{CacheKey, ModelName, ResponseFormat};
use crate::text::prepare;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const SKILL: &str = "template";
const TEMPERATURE: f32 = 0.7;
const MAX_NAME_CHARS: usize = 60;

static HTML_FENCE: LazyLock<Regex> = lazy_regex!(r"(?is)```html[ \t]*\n(.*?)```");
static TEXT_FENCE: LazyLock<Regex> =
    lazy_regex!(r"(?is)```(?:text|plain|plaintext|txt)[ \t]*\n(.*?)```");
static ANY_FENCE: LazyLock<Regex> = lazy_regex!(r"(?s)```.*?```");
static SUBJECT_LINE: LazyLock<Regex> =
    lazy_regex!(r"(?im)^[ \t]*(?:\*\*)?subject(?:\s+line)?(?::\*\*|\*\*:|:)[ \t]*(.+?)[ \t]*$");
static NAME_LINE: LazyLock<Regex> =
    lazy_regex!(r"(?im)^[ \t]*(?:\*\*)?(?:template\s+)?name(?::\*\*|\*\*:|:)[ \t]*(.+?)[ \t]*$");
static PLACEHOLDER: LazyLock<Regex> = lazy_regex!(r"\{\{\s*([A-Za-z][A-Za-z0-9_.]*)\s*\}\}");
static HTML_TAG: LazyLock<Regex> = lazy_regex!(r"<[^>]+>");

/// Options for [`SkillService::generate_template`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateOptions {
    /// What the template is for, e.g. "follow up after a demo".
    pub purpose: String,
    /// Optional category, e.g. "sales" or "support".
    pub category: Option<String>,
    /// Voice of the template.
    pub tone: Tone,
    /// Use `{{placeholder}}` tokens for variable parts.
    pub include_placeholders: bool,
    /// Message to use as a style and content example.
    pub source_message_id: Option<String>,
    /// Model to use (default from settings).
    pub model: Option<ModelName>,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            purpose: String::new(),
            category: None,
            tone: Tone::Professional,
            include_placeholders: true,
            source_message_id: None,
            model: None,
        }
    }
}

/// A reusable email template.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmailTemplate {
    /// Short template name.
    pub name: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
    /// Plain-text body.
    pub text_body: String,
    /// Distinct `{{placeholder}}` names, in order of first appearance.
    pub placeholders: Vec<String>,
}

/// Reads fenced HTML and text variants plus labelled name and subject lines.
#[derive(Debug, Clone, Default)]
pub struct TemplateExtractor {
    /// Name used when the response does not provide one.
    pub fallback_name: String,
}

impl ResponseExtractor for TemplateExtractor {
    type Output = EmailTemplate;

    fn extract(&self, raw: &str) -> EmailTemplate {
        let html = fenced(&HTML_FENCE, raw);
        let text = fenced(&TEXT_FENCE, raw);
        let subject = labelled(&SUBJECT_LINE, raw).unwrap_or_default();
        let name = labelled(&NAME_LINE, raw).unwrap_or_else(|| self.fallback_name.clone());

        let text_body = text.unwrap_or_else(|| {
            let stripped = strip_labels(&ANY_FENCE.replace_all(raw, ""));
            if stripped.is_empty() {
                html.as_deref().map(html_to_text).unwrap_or_default()
            } else {
                stripped
            }
        });
        let html_body = html.unwrap_or_else(|| {
            tracing::debug!("Template response had no HTML block, synthesizing from text");
            text_to_html(&text_body)
        });

        let placeholders = placeholders([subject.as_str(), text_body.as_str(), html_body.as_str()]);

        EmailTemplate {
            name,
            subject,
            html_body,
            text_body,
            placeholders,
        }
    }
}

fn fenced(pattern: &Regex, raw: &str) -> Option<String> {
    pattern
        .captures(raw)
        .map(|caps| caps[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

fn labelled(pattern: &Regex, raw: &str) -> Option<String> {
    let outside_fences = ANY_FENCE.replace_all(raw, "");
    pattern
        .captures(&outside_fences)
        .map(|caps| caps[1].trim_matches(['"', '*', ' ']).to_string())
        .filter(|s| !s.is_empty())
}

fn strip_labels(text: &str) -> String {
    let without_subject = SUBJECT_LINE.replace_all(text, "");
    NAME_LINE.replace_all(&without_subject, "").trim().to_string()
}

/// Renders plain text as HTML paragraphs.
///
/// Blank lines separate paragraphs; single newlines become `<br>`.
#[must_use]
pub fn text_to_html(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let lines: Vec<String> = p.lines().map(|l| escape_html(l.trim())).collect();
            format!("<p>{}</p>", lines.join("<br>"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn html_to_text(html: &str) -> String {
    let with_breaks = html
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n\n");
    HTML_TAG
        .replace_all(&with_breaks, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn placeholders<'a>(sources: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for source in sources {
        for caps in PLACEHOLDER.captures_iter(source) {
            let name = &caps[1];
            if !found.iter().any(|f| f == name) {
                found.push(name.to_string());
            }
        }
    }
    found
}

impl SkillService {
    /// Generates a reusable email template.
    pub async fn generate_template(
        &self,
        owner_id: &str,
        options: TemplateOptions,
    ) -> AiResult<EmailTemplate> {
        let model = self.model_for(options.model);
        let options = &options;
        let subject_id = options.source_message_id.as_deref().unwrap_or(owner_id);
        run_with_fallback(SKILL, subject_id, model, |attempt| {
            self.generate_template_once(owner_id, options, attempt)
        })
        .await
    }

    async fn generate_template_once(
        &self,
        owner_id: &str,
        options: &TemplateOptions,
        attempt: AttemptRecord,
    ) -> Result<SkillOutput<EmailTemplate>> {
        let purpose = options.purpose.trim();
        if purpose.is_empty() {
            return Err(Error::InvalidInput("template purpose is empty".to_string()));
        }

        let example = match options.source_message_id.as_deref() {
            Some(id) => {
                let found = self
                    .store
                    .get_message(id, owner_id)
                    .await?
                    .ok_or_else(|| Error::NotFound {
                        kind: "message",
                        id: id.to_string(),
                    })?;
                Some(prepare(&found.message.body, self.settings.max_body_length))
            },
            None => None,
        };
        let similar = self.similar_messages(purpose, owner_id, None).await;

        let mut user = format!("Create an email template for: {purpose}");
        if let Some(category) = options.category.as_deref() {
            user.push_str(&format!("\nCategory: {category}"));
        }
        if let Some(example) = example.as_deref().filter(|e| !e.is_empty()) {
            user.push_str("\n\nBase it on this example email:\n\n");
            user.push_str(example);
        }
        if !similar.is_empty() {
            user.push_str("\n\nRelated emails the user has sent:\n\n");
            user.push_str(&render_similar(&similar));
        }

        let mut request = self.request(
            attempt.model,
            system_prompt(options),
            user,
            TEMPERATURE,
            ResponseFormat::Text,
        );
        request.max_tokens = request.max_tokens.saturating_mul(2);

        let mut ids = vec![owner_id];
        if let Some(id) = options.source_message_id.as_deref() {
            ids.push(id);
        }
        let key = CacheKey::new(SKILL, &ids, &(options, attempt.model));
        let completion = self.complete(&key, request).await?;

        let data = TemplateExtractor {
            fallback_name: fallback_name(purpose),
        }
        .extract(&completion.text);
        Ok(SkillOutput::new(data, &completion, attempt.model))
    }
}

fn fallback_name(purpose: &str) -> String {
    let mut chars = purpose.chars();
    let mut name: String = chars.next().map(|c| c.to_uppercase().collect()).unwrap_or_default();
    name.extend(chars.take(MAX_NAME_CHARS - 1));
    name
}

fn system_prompt(options: &TemplateOptions) -> String {
    let placeholders = if options.include_placeholders {
        "Use {{placeholder_name}} tokens for every variable part (names, dates, companies)."
    } else {
        "Do not use placeholders; write complete text."
    };
    format!(
        "You write reusable email templates. The tone is {}.\n\
         {placeholders}\n\
         Answer in exactly this layout:\n\
         Name: <short template name>\n\
         Subject: <subject line>\n\
         ```html\n<HTML body>\n```\n\
         ```text\n<plain-text body>\n```",
        options.tone.guidance()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> TemplateExtractor {
        TemplateExtractor {
            fallback_name: "Demo follow-up".to_string(),
        }
    }

    #[test]
    fn test_full_response() {
        let raw = "Name: Demo Follow-up\n\
                   Subject: Great meeting you, {{first_name}}\n\n\
                   ```html\n<p>Hi {{first_name}},</p>\n<p>Thanks for joining the {{product}} demo.</p>\n```\n\n\
                   ```text\nHi {{first_name}},\n\nThanks for joining the {{product}} demo.\n```";
        let template = extractor().extract(raw);

        assert_eq!(template.name, "Demo Follow-up");
        assert_eq!(template.subject, "Great meeting you, {{first_name}}");
        assert!(template.html_body.starts_with("<p>Hi {{first_name}},</p>"));
        assert_eq!(
            template.text_body,
            "Hi {{first_name}},\n\nThanks for joining the {{product}} demo."
        );
        assert_eq!(template.placeholders, vec!["first_name", "product"]);
    }

    #[test]
    fn test_missing_html_is_synthesized() {
        let raw = "Subject: Welcome\n\n```text\nHello & welcome!\nWe're glad.\n\nCheers\n```";
        let template = extractor().extract(raw);
        assert_eq!(
            template.html_body,
            "<p>Hello &amp; welcome!<br>We&#39;re glad.</p>\n<p>Cheers</p>"
        );
        assert_eq!(template.name, "Demo follow-up");
    }

    #[test]
    fn test_unfenced_response_becomes_text_body() {
        let raw = "Subject: Checking in\n\nHi {{ name }},\n\nJust checking in.";
        let template = extractor().extract(raw);
        assert_eq!(template.subject, "Checking in");
        assert_eq!(template.text_body, "Hi {{ name }},\n\nJust checking in.");
        assert_eq!(template.html_body, "<p>Hi {{ name }},</p>\n<p>Just checking in.</p>");
        assert_eq!(template.placeholders, vec!["name"]);
    }

    #[test]
    fn test_html_only_response_derives_text() {
        let raw = "```html\n<p>Hello</p><p>Bye &amp; thanks</p>\n```";
        let template = extractor().extract(raw);
        assert_eq!(template.text_body, "Hello\n\nBye & thanks");
        assert_eq!(template.subject, "");
    }

    #[test]
    fn test_garbage_degrades_to_defaults() {
        let template = extractor().extract("");
        assert_eq!(template.name, "Demo follow-up");
        assert!(template.subject.is_empty());
        assert!(template.html_body.is_empty());
        assert!(template.text_body.is_empty());
        assert!(template.placeholders.is_empty());
    }

    #[test]
    fn test_fallback_name() {
        assert_eq!(fallback_name("welcome new customers"), "Welcome new customers");
        assert_eq!(fallback_name(&"x".repeat(100)).chars().count(), MAX_NAME_CHARS);
    }
}
