//! OpenAI API backend.
//!
//! This backend uses the OpenAI Chat Completions API for crash analysis.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    resolve_api_key, status_error, AnalysisBackend, BackendKind, ProviderConfig, ProviderError,
};
use crate::http::JsonPost;
use crate::report::ExceptionReport;

/// OpenAI API endpoint
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gpt-4";

/// System prompt for crash analysis
const SYSTEM_PROMPT: &str = "You are a helpful debugging assistant.";

/// OpenAI backend
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    /// API key
    api_key: String,
    /// Model to use
    model: String,
    /// Endpoint
    url: String,
    /// Request timeout
    timeout: Option<Duration>,
}

impl OpenAiBackend {
    /// Create a backend, reading `OPENAI_API_KEY` when no key is configured.
    ///
    /// Fails immediately, before any network access, if no key is found.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        Self::with_env_lookup(config, |var| std::env::var(var).ok())
    }

    /// Create from environment variables and default settings
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(ProviderConfig::default())
    }

    pub(crate) fn with_env_lookup(
        config: ProviderConfig,
        lookup: impl FnOnce(&str) -> Option<String>,
    ) -> Result<Self, ProviderError> {
        let model = config.model_or(DEFAULT_MODEL).to_string();
        let api_key = resolve_api_key(BackendKind::OpenAi, config.api_key, lookup).ok_or_else(
            || ProviderError::MissingApiKey {
                provider: "OpenAI".to_string(),
                env_var: "OPENAI_API_KEY".to_string(),
            },
        )?;

        Ok(Self {
            api_key,
            model,
            url: config.base_url.unwrap_or_else(|| OPENAI_API_URL.to_string()),
            timeout: config.timeout,
        })
    }

    /// Model in use
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Build the request body
    fn build_request(&self, report: &ExceptionReport) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format_input(report),
                },
            ],
        }
    }

    /// Perform the request, surfacing every failure
    pub fn request(&self, report: &ExceptionReport) -> Result<String, ProviderError> {
        let request = self.build_request(report);
        debug!(model = %self.model, "Sending crash report to OpenAI");

        let reply = JsonPost::new(&self.url)
            .bearer(&self.api_key)
            .timeout(self.timeout)
            .send(&request)
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !reply.status.is_success() {
            return Err(status_error("OpenAI", reply.status, &reply.body));
        }

        let response: ChatCompletionResponse =
            serde_json::from_str(&reply.body).map_err(|e| ProviderError::InvalidResponse {
                provider: "OpenAI".to_string(),
                message: e.to_string(),
            })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .map(|message| message.content)
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: "OpenAI".to_string(),
                message: "response contained no choices".to_string(),
            })
    }
}

/// Format the user message
fn format_input(report: &ExceptionReport) -> String {
    format!(
        "Analyze this Rust crash:\nType: {}\nMessage: {}\nStack Trace:\n{}\n\n\
         Provide a clear explanation and 3 specific solutions.",
        report.type_name, report.message, report.formatted_trace
    )
}

impl AnalysisBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn analyze(&self, report: &ExceptionReport) -> Result<String> {
        match self.request(report) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(error = %e, "OpenAI analysis failed");
                Ok(format!("Failed to get analysis from OpenAI: {}", e))
            }
        }
    }
}

// API types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChatMessage>,
}
