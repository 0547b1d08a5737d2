//! Logging configuration.

use serde::Deserialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default filter directive when none is configured.
pub const DEFAULT_FILTER: &str = "info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, defaulting to [`LogFormat::Pretty`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
///
/// # Environment Variables
///
/// | Variable | Description | Default |
/// |----------|-------------|---------|
/// | `MAILSAGE_LOG` | `EnvFilter` directives | `info` |
/// | `MAILSAGE_LOG_FORMAT` | `json` or `pretty` | `pretty` |
/// | `MAILSAGE_LOG_FILE` | Append log lines to this file instead of stderr | unset |
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directives, e.g. `mailsage=debug,info`.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
    /// Optional log file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Loads logging configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(filter) = lookup("MAILSAGE_LOG").filter(|v| !v.trim().is_empty()) {
            self.filter = filter;
        }
        if let Some(format) = lookup("MAILSAGE_LOG_FORMAT") {
            self.format = LogFormat::parse(&format);
        }
        if let Some(file) = lookup("MAILSAGE_LOG_FILE").filter(|v| !v.trim().is_empty()) {
            self.file = Some(PathBuf::from(file));
        }
        self
    }

    /// Builds the filter, falling back to [`DEFAULT_FILTER`] on bad directives.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.filter, "info");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MAILSAGE_LOG", "mailsage=debug"),
            ("MAILSAGE_LOG_FORMAT", "JSON"),
            ("MAILSAGE_LOG_FILE", "/tmp/mailsage.log"),
        ]
        .into_iter()
        .collect();

        let config = LoggingConfig::default()
            .with_overrides(|name| vars.get(name).map(ToString::to_string));

        assert_eq!(config.filter, "mailsage=debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/mailsage.log")));
    }

    #[test]
    fn test_blank_filter_is_ignored() {
        let config = LoggingConfig::default().with_overrides(|name| {
            (name == "MAILSAGE_LOG").then(|| "   ".to_string())
        });
        assert_eq!(config.filter, DEFAULT_FILTER);
    }

    #[test]
    fn test_unknown_format_is_pretty() {
        assert_eq!(LogFormat::parse("xml"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(" json "), LogFormat::Json);
    }
}
