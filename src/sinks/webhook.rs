//! Generic JSON webhook sink.

use anyhow::Result;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use super::{post_payload, NotificationSink, SinkError};
use crate::http::DEFAULT_TIMEOUT;
use crate::report::ExceptionContext;

/// Request body: the analysis plus the exception context
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub text: &'a str,
    pub context: &'a ExceptionContext,
}

/// POSTs `{"text": ..., "context": {...}}` to a URL.
///
/// Delivery failures are logged and swallowed.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: String,
    timeout: Option<Duration>,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Builder: request timeout (`None` waits forever)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver and return the failure instead of logging it
    pub fn try_send(&self, report: &str, context: &ExceptionContext) -> Result<(), SinkError> {
        let payload = WebhookPayload {
            text: report,
            context,
        };
        post_payload("webhook", &self.url, self.timeout, &payload)
    }
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn handle(&self, report: &str, context: &ExceptionContext) -> Result<()> {
        match self.try_send(report, context) {
            Ok(()) => debug!(url = %self.url, "Webhook notification sent"),
            Err(e) => error!(url = %self.url, error = %e, "Failed to send webhook notification"),
        }
        Ok(())
    }
}
