//! Configuration management.
//!
//! Configuration comes from three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`[orchestrator]`, `[skills]` and `[logging]` sections, all
//!    optional)
//! 3. `MAILSAGE_*` environment variables
//!
//! ```toml
//! [orchestrator]
//! cache_capacity = 100
//! cache_ttl_secs = 3600
//! max_concurrent = 10
//! retry_attempts = 3
//! retry_delay_ms = 1000
//! attempt_timeout_ms = 60000
//!
//! [skills]
//! default_model = "gpt-4o"
//! max_context_messages = 10
//!
//! [logging]
//! filter = "mailsage=debug,info"
//! format = "json"
//! ```

mod skills;

pub use skills::{ConfigFileSkills, SkillSettings};

use crate::observability::LoggingConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration for mailsage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MailsageConfig {
    /// Cache, concurrency and retry settings.
    pub orchestrator: OrchestratorConfig,
    /// Skill pipeline defaults.
    pub skills: SkillSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Orchestrator section.
    pub orchestrator: Option<ConfigFileOrchestrator>,
    /// Skills section.
    pub skills: Option<ConfigFileSkills>,
    /// Logging section.
    pub logging: Option<LoggingConfig>,
}

/// Orchestrator section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileOrchestrator {
    /// Cache capacity.
    pub cache_capacity: Option<usize>,
    /// Cache TTL in seconds.
    pub cache_ttl_secs: Option<u64>,
    /// Concurrent completion calls.
    pub max_concurrent: Option<usize>,
    /// Attempts per call.
    pub retry_attempts: Option<u32>,
    /// Backoff base delay in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Per-attempt deadline in milliseconds.
    pub attempt_timeout_ms: Option<u64>,
}

impl MailsageConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidInput(format!("cannot read config {}: {e}", path.display()))
        })?;
        Ok(Self::from_toml(&contents)?.with_env_overrides())
    }

    /// Parses configuration from TOML text without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or contains unknown keys.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| Error::InvalidInput(format!("cannot parse config: {e}")))?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/mailsage/` on macOS)
    /// 2. XDG config dir (`~/.config/mailsage/`)
    ///
    /// Falls back to defaults (with environment overrides) when no readable
    /// file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default().with_env_overrides();
        };

        let candidates = [
            base_dirs.config_dir().join("mailsage").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("mailsage")
                .join("config.toml"),
        ];

        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring unreadable config file"
                    );
                },
            }
        }

        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides to every section.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.orchestrator = self.orchestrator.with_env_overrides();
        self.logging = self.logging.with_env_overrides();
        self
    }

    /// Converts a `ConfigFile` to `MailsageConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(section) = file.orchestrator {
            config.orchestrator = config.orchestrator.with_file_section(section);
        }
        if let Some(section) = file.skills {
            config.skills = config.skills.with_file_section(section);
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        config
    }
}

/// Settings for the shared request executor.
///
/// # Environment Variables
///
/// | Variable | Description | Default |
/// |----------|-------------|---------|
/// | `MAILSAGE_AI_CACHE_CAPACITY` | Cached responses kept | 100 |
/// | `MAILSAGE_AI_CACHE_TTL_SECS` | Cached response lifetime | 3600 |
/// | `MAILSAGE_AI_MAX_CONCURRENT` | Concurrent completion calls | 10 |
/// | `MAILSAGE_AI_RETRY_ATTEMPTS` | Attempts per call | 3 |
/// | `MAILSAGE_AI_RETRY_DELAY_MS` | Backoff base delay | 1000 |
/// | `MAILSAGE_AI_ATTEMPT_TIMEOUT_MS` | Per-attempt deadline (0 disables) | 60000 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Maximum cached responses (minimum 1).
    pub cache_capacity: usize,
    /// Lifetime of a cached response in seconds.
    pub cache_ttl_secs: u64,
    /// Maximum concurrent completion calls (minimum 1).
    pub max_concurrent: usize,
    /// Attempts per call, including the first (minimum 1).
    pub retry_attempts: u32,
    /// Backoff base delay in milliseconds.
    pub retry_delay_ms: u64,
    /// Per-attempt deadline in milliseconds (0 disables).
    pub attempt_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            cache_ttl_secs: 3600,
            max_concurrent: 10,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            attempt_timeout_ms: 60_000,
        }
    }
}

impl OrchestratorConfig {
    /// Loads orchestrator configuration from environment variables.
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
    ///
    /// Unparseable values are ignored; minimums are enforced.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse_u64 = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        let parse_u32 = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u32>().ok());
        let parse_usize = |name: &str| lookup(name).and_then(|v| v.trim().parse::<usize>().ok());

        if let Some(v) = parse_usize("MAILSAGE_AI_CACHE_CAPACITY") {
            self.cache_capacity = v.max(1);
        }
        if let Some(v) = parse_u64("MAILSAGE_AI_CACHE_TTL_SECS") {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = parse_usize("MAILSAGE_AI_MAX_CONCURRENT") {
            self.max_concurrent = v.max(1);
        }
        if let Some(v) = parse_u32("MAILSAGE_AI_RETRY_ATTEMPTS") {
            self.retry_attempts = v.max(1);
        }
        if let Some(v) = parse_u64("MAILSAGE_AI_RETRY_DELAY_MS") {
            self.retry_delay_ms = v;
        }
        if let Some(v) = parse_u64("MAILSAGE_AI_ATTEMPT_TIMEOUT_MS") {
            self.attempt_timeout_ms = v;
        }

        self
    }

    fn with_file_section(mut self, section: ConfigFileOrchestrator) -> Self {
        if let Some(v) = section.cache_capacity {
            self.cache_capacity = v.max(1);
        }
        if let Some(v) = section.cache_ttl_secs {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = section.max_concurrent {
            self.max_concurrent = v.max(1);
        }
        if let Some(v) = section.retry_attempts {
            self.retry_attempts = v.max(1);
        }
        if let Some(v) = section.retry_delay_ms {
            self.retry_delay_ms = v;
        }
        if let Some(v) = section.attempt_timeout_ms {
            self.attempt_timeout_ms = v;
        }
        self
    }

    /// Sets the cache capacity.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the cache TTL in seconds.
    #[must_use]
    pub const fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sets the number of attempts per call.
    #[must_use]
    pub const fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Sets the backoff base delay in milliseconds.
    #[must_use]
    pub const fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Sets the per-attempt deadline in milliseconds (0 disables).
    #[must_use]
    pub const fn with_attempt_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.attempt_timeout_ms = timeout_ms;
        self
    }
}
