//! Labelled section extraction from free text.
//!
//! Models asked for "Summary / Key Points / Action Items" answer in many
//! dialects: plain `Summary:` lines, bold `**Summary:**` or `**Summary**`,
//! markdown `## Summary`, numbered `1. Summary:`. [`SectionParser`] accepts all
//! of them and maps each recognized label to a stable key.

use super::split_list;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// `1.` / `2)` prefix of a numbered heading.
static NUMBER_PREFIX: LazyLock<Regex> = lazy_regex!(r"^\d+[.)]\s*");

/// Maximum label length considered a heading.
const MAX_LABEL_CHARS: usize = 48;

/// Recognizes labelled sections and collects their content.
///
/// # Example
///
/// ```rust
/// use mailsage::parsing::SectionParser;
///
/// let parser = SectionParser::new(&[
///     ("summary", &["summary"]),
///     ("key_points", &["key points", "highlights"]),
/// ]);
/// let sections = parser.parse("Summary: Deal closed.\n\n## Key Points\n- signed\n- paid");
///
/// assert_eq!(sections.text("summary"), "Deal closed.");
/// assert_eq!(sections.list("key_points"), vec!["signed", "paid"]);
/// ```
#[derive(Debug, Clone)]
pub struct SectionParser {
    /// Normalized label -> section key.
    labels: HashMap<String, &'static str>,
}

impl SectionParser {
    /// Creates a parser from `(key, labels)` pairs.
    ///
    /// Labels are matched case-insensitively with whitespace collapsed.
    #[must_use]
    pub fn new(specs: &[(&'static str, &[&str])]) -> Self {
        let labels = specs
            .iter()
            .flat_map(|(key, aliases)| aliases.iter().map(move |alias| (normalize(alias), *key)))
            .collect();
        Self { labels }
    }

    /// Splits `text` into sections.
    ///
    /// Lines before the first recognized heading form the preamble. A heading
    /// with an unknown label is kept as content of the current section.
    #[must_use]
    pub fn parse(&self, text: &str) -> Sections {
        let mut sections = Sections::default();
        let mut current: Option<&'static str> = None;
        let mut buffer = String::new();

        for line in text.lines() {
            let heading = parse_heading(line)
                .and_then(|(label, rest)| self.labels.get(&normalize(&label)).map(|k| (*k, rest)));

            if let Some((key, rest)) = heading {
                sections.commit(current, &buffer);
                buffer.clear();
                current = Some(key);
                if !rest.is_empty() {
                    buffer.push_str(&rest);
                    buffer.push('\n');
                }
            } else {
                buffer.push_str(line);
                buffer.push('\n');
            }
        }
        sections.commit(current, &buffer);

        sections
    }
}

/// Sections found by a [`SectionParser`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    entries: HashMap<&'static str, String>,
    preamble: String,
}

impl Sections {
    /// Returns the trimmed content of a section, or an empty string.
    #[must_use]
    pub fn text(&self, key: &str) -> String {
        self.entries
            .get(key)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    /// Returns the content of a section as list items, or an empty list.
    #[must_use]
    pub fn list(&self, key: &str) -> Vec<String> {
        self.entries
            .get(key)
            .map(|s| split_list(s))
            .unwrap_or_default()
    }

    /// Returns true if the section was present and non-empty.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|s| !s.trim().is_empty())
    }

    /// Returns the trimmed text before the first recognized heading.
    #[must_use]
    pub fn preamble(&self) -> &str {
        self.preamble.trim()
    }

    /// Returns true if no section was recognized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn commit(&mut self, key: Option<&'static str>, content: &str) {
        match key {
            // Repeated headings append rather than overwrite
            Some(key) => {
                let entry = self.entries.entry(key).or_default();
                entry.push_str(content);
            },
            None => self.preamble.push_str(content),
        }
    }
}

/// Parses a heading line into `(label, text after the heading)`.
fn parse_heading(line: &str) -> Option<(String, String)> {
    let mut rest = line.trim();
    let is_markdown = rest.starts_with('#');
    rest = rest.trim_start_matches('#').trim_start();
    rest = NUMBER_PREFIX
        .find(rest)
        .map_or(rest, |m| &rest[m.end()..]);

    let (label, after) = if let Some(bold) = rest.strip_prefix("**") {
        // **Label:** text | **Label**: text | **Label** text
        let close = bold.find("**")?;
        let label = bold[..close].trim().trim_end_matches(':');
        let after = bold[close + 2..].trim_start().trim_start_matches(':');
        (label, after)
    } else if let Some((label, after)) = rest.split_once(':') {
        (label, after)
    } else if is_markdown {
        (rest, "")
    } else {
        return None;
    };

    let label = label.trim();
    if label.is_empty() || label.chars().count() > MAX_LABEL_CHARS {
        return None;
    }
    Some((label.to_string(), after.trim().to_string()))
}

/// Lowercases and collapses whitespace.
fn normalize(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn parser() -> SectionParser {
        SectionParser::new(&[
            ("summary", &["summary", "overview"]),
            ("key_points", &["key points"]),
            ("action_items", &["action items", "next steps"]),
        ])
    }

    #[test_case("Summary: Deal closed."; "plain colon")]
    #[test_case("**Summary:** Deal closed."; "bold with inner colon")]
    #[test_case("**Summary**: Deal closed."; "bold with outer colon")]
    #[test_case("**Summary**\nDeal closed."; "bold without colon")]
    #[test_case("## Summary\nDeal closed."; "markdown heading")]
    #[test_case("### Summary:\nDeal closed."; "markdown heading with colon")]
    #[test_case("1. Summary: Deal closed."; "numbered")]
    #[test_case("overview:\n  Deal closed.  "; "alias lowercase")]
    fn test_heading_dialects(input: &str) {
        let sections = parser().parse(input);
        assert_eq!(sections.text("summary"), "Deal closed.");
    }

    #[test]
    fn test_multiple_sections() {
        let text = "Summary: Contract renewal agreed.\n\
                    \n\
                    Key Points:\n\
                    - price fixed for 2 years\n\
                    - support upgraded\n\
                    \n\
                    **Action Items**\n\
                    1. Send contract\n\
                    2. Book kickoff";
        let sections = parser().parse(text);

        assert_eq!(sections.text("summary"), "Contract renewal agreed.");
        assert_eq!(
            sections.list("key_points"),
            vec!["price fixed for 2 years", "support upgraded"]
        );
        assert_eq!(
            sections.list("action_items"),
            vec!["Send contract", "Book kickoff"]
        );
    }

    #[test]
    fn test_unknown_heading_stays_in_section() {
        let text = "Summary: First line.\nNote: still summary.";
        let sections = parser().parse(text);
        assert_eq!(sections.text("summary"), "First line.\nNote: still summary.");
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let sections = parser().parse("Just some prose with no headings.");
        assert!(sections.is_empty());
        assert_eq!(sections.text("summary"), "");
        assert!(sections.list("key_points").is_empty());
        assert!(!sections.has("summary"));
        assert_eq!(sections.preamble(), "Just some prose with no headings.");
    }

    #[test]
    fn test_multiline_section_content() {
        let text = "Summary:\nLine one.\nLine two.\n\nKey Points: - only one";
        let sections = parser().parse(text);
        assert_eq!(sections.text("summary"), "Line one.\nLine two.");
        assert_eq!(sections.list("key_points"), vec!["only one"]);
    }

    #[test]
    fn test_parse_heading_rejects_long_labels() {
        let line = "This sentence is clearly prose and not a heading at all: really";
        assert!(parse_heading(line).is_none());
    }
}
