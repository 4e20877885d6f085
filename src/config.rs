//! Configuration for `why-panic`.
//!
//! Read from `~/.config/why-panic/config.toml`; a missing or unreadable file
//! falls back to the defaults (mock backend, console sink).

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::dispatcher::Dispatcher;
use crate::providers::{self, AnalysisBackend, BackendKind, ProviderConfig, ProviderError};
use crate::sinks::{ConsoleSink, NotificationSink, SlackSink, WebhookSink};

/// Environment variable that overrides `[analysis] backend`
pub const BACKEND_ENV: &str = "WHY_PANIC_BACKEND";

/// Environment variable that turns [`crate::init`] into a no-op when set to `1`
pub const DISABLE_ENV: &str = "WHY_PANIC_DISABLE";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid {var}: {message}")]
    InvalidEnv { var: &'static str, message: String },

    #[error("{kind} sink requires a non-empty url")]
    MissingSinkUrl { kind: &'static str },

    #[error(transparent)]
    Backend(#[from] ProviderError),
}

/// `[analysis]` table
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Backend to use
    pub backend: BackendKind,
    /// Model identifier (empty = backend default)
    pub model: String,
    /// Request timeout in seconds (0 = no timeout)
    pub timeout_secs: u64,
    /// Endpoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// API key; normally taken from the environment instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Mock,
            model: String::new(),
            timeout_secs: 30,
            base_url: None,
            api_key: None,
        }
    }
}

impl AnalysisConfig {
    /// Timeout as used by the HTTP layer
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            timeout: self.timeout(),
            base_url: self.base_url.clone(),
        }
    }
}

/// One `[[sinks]]` entry
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    Console,
    Webhook { url: String },
    Slack { url: String },
}

/// Root configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub analysis: AnalysisConfig,
    /// Sinks in notification order; an empty list disables notification
    pub sinks: Vec<SinkConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            sinks: vec![SinkConfig::Console],
        }
    }
}

impl Config {
    /// Load config from file, returning default config if file doesn't exist
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load config from a specific path, falling back to defaults on any error
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        Self::try_load_from_path(&path).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring invalid config file");
            Self::default()
        })
    }

    /// Load config from a specific path, reporting read and parse errors.
    ///
    /// A file that does not exist yields the defaults.
    pub fn try_load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the config file path (~/.config/why-panic/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("why-panic").join("config.toml"))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|var| env::var(var).ok())
    }

    fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        // WHY_PANIC_BACKEND=gemini selects the backend
        if let Some(value) = lookup(BACKEND_ENV).filter(|v| !v.is_empty()) {
            self.analysis.backend = value.parse().map_err(|message| ConfigError::InvalidEnv {
                var: BACKEND_ENV,
                message,
            })?;
        }
        Ok(())
    }

    /// Check if installation is disabled via environment variable
    pub fn is_disabled() -> bool {
        env::var(DISABLE_ENV).map(|v| v == "1").unwrap_or(false)
    }

    /// Construct the configured backend; fails fast on missing credentials
    pub fn build_backend(&self) -> Result<Box<dyn AnalysisBackend>, ConfigError> {
        Ok(providers::build_backend(
            self.analysis.backend,
            self.analysis.provider_config(),
        )?)
    }

    /// Construct the configured sinks, in order
    pub fn build_sinks(&self) -> Result<Vec<Box<dyn NotificationSink>>, ConfigError> {
        let timeout = self.analysis.timeout();

        self.sinks
            .iter()
            .map(|sink| -> Result<Box<dyn NotificationSink>, ConfigError> {
                match sink {
                    SinkConfig::Console => Ok(Box::new(ConsoleSink::new())),
                    SinkConfig::Webhook { url } => {
                        require_url("webhook", url)?;
                        Ok(Box::new(WebhookSink::new(url).with_timeout(timeout)))
                    }
                    SinkConfig::Slack { url } => {
                        require_url("slack", url)?;
                        Ok(Box::new(SlackSink::new(url).with_timeout(timeout)))
                    }
                }
            })
            .collect()
    }

    /// Build a dispatcher on the real panic hook. Not installed yet.
    pub fn build_dispatcher(&self) -> Result<Dispatcher, ConfigError> {
        Ok(Dispatcher::builder()
            .boxed_backend(self.build_backend()?)
            .sinks(self.build_sinks()?)
            .build())
    }
}

fn require_url(kind: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::MissingSinkUrl { kind });
    }
    Ok(())
}

/// Generate default config as TOML string
pub fn generate_default_config() -> String {
    r#"# why-panic configuration
# Place this file at ~/.config/why-panic/config.toml

# To disable notification, uncomment the next line and remove every
# [[sinks]] entry below. It must stay above [analysis].
# sinks = []

[analysis]
# Backend used to explain panics: mock | gemini | openai
backend = "mock"

# Model identifier (empty = backend default: gemini-pro / gpt-4)
model = ""

# Request timeout in seconds for analysis and webhooks (0 = no timeout)
timeout_secs = 30

# Endpoint override, e.g. for a proxy
# base_url = "https://proxy.example.com/v1/chat/completions"

# Sinks are notified in the order listed.
[[sinks]]
kind = "console"

# [[sinks]]
# kind = "webhook"
# url = "https://example.com/hooks/panic"

# [[sinks]]
# kind = "slack"
# url = "https://hooks.slack.com/services/T000/B000/XXXX"

# Environment variables:
# GEMINI_API_KEY / OPENAI_API_KEY - credentials for the API backends
# WHY_PANIC_BACKEND=<kind>         - override [analysis] backend
# WHY_PANIC_DISABLE=1              - skip installation in why_panic::init()
"#
    .to_string()
}

/// Print the default config to stdout
pub fn print_default_config() {
    print!("{}", generate_default_config());
}
