//! Skill pipeline settings.

use crate::llm::ModelName;
use serde::Deserialize;

/// Defaults shared by the skill pipelines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkillSettings {
    /// Model used when a request does not name one.
    pub default_model: ModelName,
    /// Messages rendered into a thread context.
    pub max_context_messages: usize,
    /// Character budget for any single prepared body.
    pub max_body_length: usize,
    /// Similar messages added to reply and template prompts.
    pub similar_limit: usize,
    /// Sampling temperature for free-text skills.
    pub default_temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

impl Default for SkillSettings {
    fn default() -> Self {
        Self {
            default_model: ModelName::PRIMARY,
            max_context_messages: 10,
            max_body_length: 10_000,
            similar_limit: 3,
            default_temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// Skills section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileSkills {
    /// Default model name.
    pub default_model: Option<String>,
    /// Messages per thread context.
    pub max_context_messages: Option<usize>,
    /// Body character budget.
    pub max_body_length: Option<usize>,
    /// Similar messages per prompt.
    pub similar_limit: Option<usize>,
    /// Default temperature.
    pub default_temperature: Option<f32>,
    /// Token ceiling.
    pub max_tokens: Option<u32>,
}

impl SkillSettings {
    pub(super) fn with_file_section(mut self, section: ConfigFileSkills) -> Self {
        if let Some(name) = section.default_model {
            match ModelName::parse(&name) {
                Some(model) => self.default_model = model,
                None => tracing::warn!(
                    model = %name,
                    "Unknown default model in config, keeping {}",
                    self.default_model
                ),
            }
        }
        if let Some(v) = section.max_context_messages {
            self.max_context_messages = v.max(1);
        }
        if let Some(v) = section.max_body_length {
            self.max_body_length = v.max(1);
        }
        if let Some(v) = section.similar_limit {
            self.similar_limit = v;
        }
        if let Some(v) = section.default_temperature {
            self.default_temperature = v.clamp(0.0, 2.0);
        }
        if let Some(v) = section.max_tokens {
            self.max_tokens = v.max(1);
        }
        self
    }

    /// Sets the default model.
    #[must_use]
    pub const fn with_default_model(mut self, model: ModelName) -> Self {
        self.default_model = model;
        self
    }

    /// Sets the number of messages per thread context.
    #[must_use]
    pub const fn with_max_context_messages(mut self, max: usize) -> Self {
        self.max_context_messages = max;
        self
    }

    /// Sets the number of similar messages per prompt.
    #[must_use]
    pub const fn with_similar_limit(mut self, limit: usize) -> Self {
        self.similar_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_keeps_default() {
        let settings = SkillSettings::default().with_file_section(ConfigFileSkills {
            default_model: Some("llama-3".to_string()),
            ..ConfigFileSkills::default()
        });
        assert_eq!(settings.default_model, ModelName::PRIMARY);
    }

    #[test]
    fn test_file_section_clamps() {
        let settings = SkillSettings::default().with_file_section(ConfigFileSkills {
            max_context_messages: Some(0),
            default_temperature: Some(9.0),
            ..ConfigFileSkills::default()
        });
        assert_eq!(settings.max_context_messages, 1);
        assert!((settings.default_temperature - 2.0).abs() < f32::EPSILON);
    }
}
