//! Google Gemini API backend.
//!
//! Uses the `generateContent` endpoint; the API key travels as the `key`
//! query parameter rather than a header.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    resolve_api_key, status_error, AnalysisBackend, BackendKind, ProviderConfig, ProviderError,
};
use crate::http::JsonPost;
use crate::report::ExceptionReport;

/// Gemini API base; the model and method are appended
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gemini-pro";

/// Instruction placed ahead of the report
const INSTRUCTION: &str =
    "You are an expert Rust debugger. Explain the following crash clearly and provide 3 actionable fixes.";

/// Gemini backend
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    api_key: String,
    model: String,
    url: String,
    timeout: Option<Duration>,
}

impl GeminiBackend {
    /// Create a backend, reading `GEMINI_API_KEY` when no key is configured.
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
        let api_key = resolve_api_key(BackendKind::Gemini, config.api_key, lookup).ok_or_else(
            || ProviderError::MissingApiKey {
                provider: "Gemini".to_string(),
                env_var: "GEMINI_API_KEY".to_string(),
            },
        )?;
        let url = config
            .base_url
            .unwrap_or_else(|| format!("{}/{}:generateContent", GEMINI_API_BASE, model));

        Ok(Self {
            api_key,
            model,
            url,
            timeout: config.timeout,
        })
    }

    /// Model in use
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Endpoint the request is posted to
    pub fn endpoint(&self) -> &str {
        &self.url
    }

    fn build_request(&self, report: &ExceptionReport) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: format!("{}\n\n{}", INSTRUCTION, report.format_for_prompt()),
                }],
            }],
        }
    }

    /// Perform the request, surfacing every failure
    pub fn request(&self, report: &ExceptionReport) -> Result<String, ProviderError> {
        let request = self.build_request(report);
        debug!(model = %self.model, "Sending crash report to Gemini");

        let reply = JsonPost::new(&self.url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .send(&request)
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !reply.status.is_success() {
            return Err(status_error("Gemini", reply.status, &reply.body));
        }

        let response: GenerateContentResponse =
            serde_json::from_str(&reply.body).map_err(|e| ProviderError::InvalidResponse {
                provider: "Gemini".to_string(),
                message: e.to_string(),
            })?;

        response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: "Gemini".to_string(),
                message: "response contained no candidates".to_string(),
            })
    }
}

impl AnalysisBackend for GeminiBackend {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn analyze(&self, report: &ExceptionReport) -> Result<String> {
        match self.request(report) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(error = %e, "Gemini analysis failed");
                Ok(format!("Failed to get analysis from Gemini: {}", e))
            }
        }
    }
}

// API types

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
