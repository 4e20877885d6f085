//! Analysis backends that turn a crash report into an explanation.
//!
//! This module provides a unified interface over an offline mock and two
//! chat-completion APIs (Google Gemini and OpenAI).

pub mod gemini;
pub mod mock;
pub mod openai;

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::http::DEFAULT_TIMEOUT;
use crate::report::ExceptionReport;

pub use gemini::GeminiBackend;
pub use mock::MockBackend;
pub use openai::OpenAiBackend;

/// Available analysis backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Canned analysis, no network access
    #[default]
    Mock,
    /// Google Gemini API
    Gemini,
    /// OpenAI API
    #[value(name = "openai")]
    OpenAi,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Mock => write!(f, "mock"),
            BackendKind::Gemini => write!(f, "gemini"),
            BackendKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(BackendKind::Mock),
            "gemini" => Ok(BackendKind::Gemini),
            "openai" => Ok(BackendKind::OpenAi),
            _ => Err(format!(
                "Unknown backend: {}. Valid options: mock, gemini, openai",
                s
            )),
        }
    }
}

/// Backend that explains an uncaught failure.
///
/// Implementations may fail; the dispatcher replaces an error (or a panic)
/// with a substitute string so notification always goes ahead.
pub trait AnalysisBackend: Send + Sync {
    /// Backend name for logs and failure notices
    fn name(&self) -> &str;

    /// Produce a free-text analysis of the report
    fn analyze(&self, report: &ExceptionReport) -> Result<String>;
}

/// Configuration for the network-backed backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// API key; falls back to the backend's environment variable
    pub api_key: Option<String>,
    /// Model identifier; empty selects the backend default
    pub model: String,
    /// Request timeout, `None` for no bound
    pub timeout: Option<Duration>,
    /// Endpoint override (proxies, self-hosted gateways)
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: String::new(),
            timeout: Some(DEFAULT_TIMEOUT),
            base_url: None,
        }
    }
}

impl ProviderConfig {
    /// Builder: explicit API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builder: model identifier
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder: request timeout
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: endpoint override
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        if self.model.is_empty() {
            default
        } else {
            &self.model
        }
    }
}

/// Error types for provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API key not configured for {provider}. Set {env_var} environment variable.")]
    MissingApiKey { provider: String, env_var: String },

    #[error("API error from {provider}: {message}")]
    ApiError { provider: String, message: String },

    #[error("Rate limited by {provider}. Please wait and try again.")]
    RateLimited { provider: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },
}

/// Get the environment variable holding a backend's API key
pub fn api_key_env_var(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Gemini => "GEMINI_API_KEY",
        BackendKind::OpenAi => "OPENAI_API_KEY",
        BackendKind::Mock => "",
    }
}

/// Get API key from environment for a backend
pub fn get_api_key(kind: BackendKind) -> Option<String> {
    resolve_api_key(kind, None, |var| std::env::var(var).ok())
}

/// Resolve a credential: explicit value first, then the environment lookup.
///
/// Empty strings count as missing.
pub fn resolve_api_key(
    kind: BackendKind,
    explicit: Option<String>,
    lookup: impl FnOnce(&str) -> Option<String>,
) -> Option<String> {
    if let Some(key) = explicit.filter(|k| !k.is_empty()) {
        return Some(key);
    }
    let env_var = api_key_env_var(kind);
    if env_var.is_empty() {
        return None;
    }
    lookup(env_var).filter(|k| !k.is_empty())
}

/// Turn a non-success status into a [`ProviderError`]
pub(crate) fn status_error(
    provider: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> ProviderError {
    if status.as_u16() == 429 {
        return ProviderError::RateLimited {
            provider: provider.to_string(),
        };
    }
    ProviderError::ApiError {
        provider: provider.to_string(),
        message: format!("HTTP {}: {}", status, body),
    }
}

/// Construct a backend of the given kind
pub fn build_backend(
    kind: BackendKind,
    config: ProviderConfig,
) -> std::result::Result<Box<dyn AnalysisBackend>, ProviderError> {
    let backend: Box<dyn AnalysisBackend> = match kind {
        BackendKind::Mock => Box::new(MockBackend),
        BackendKind::Gemini => Box::new(GeminiBackend::new(config)?),
        BackendKind::OpenAi => Box::new(OpenAiBackend::new(config)?),
    };
    Ok(backend)
}

/// List all backends and whether they can be constructed right now
pub fn list_backends() -> Vec<(BackendKind, &'static str, bool)> {
    vec![
        (BackendKind::Mock, "Canned offline analysis", true),
        (
            BackendKind::Gemini,
            "Google Gemini API",
            get_api_key(BackendKind::Gemini).is_some(),
        ),
        (
            BackendKind::OpenAi,
            "OpenAI API",
            get_api_key(BackendKind::OpenAi).is_some(),
        ),
    ]
}
