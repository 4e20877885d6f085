//! Slack incoming-webhook sink.

use anyhow::Result;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

use super::{post_payload, NotificationSink, SinkError};
use crate::http::DEFAULT_TIMEOUT;
use crate::report::ExceptionContext;

/// Prefix that marks the message as an alert
pub const ALERT_MARKER: &str = "🚨 *Panic Detected* 🚨";

/// POSTs `{"text": "<alert marker>\n\n<analysis>"}` to a Slack webhook URL.
///
/// Unlike [`WebhookSink`](super::WebhookSink) the context is not sent.
/// Delivery failures are logged and swallowed.
#[derive(Debug, Clone)]
pub struct SlackSink {
    webhook_url: String,
    timeout: Option<Duration>,
}

impl SlackSink {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Builder: request timeout (`None` waits forever)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    /// Message text as posted
    pub fn format_text(report: &str) -> String {
        format!("{}\n\n{}", ALERT_MARKER, report)
    }

    /// Deliver and return the failure instead of logging it
    pub fn try_send(&self, report: &str) -> Result<(), SinkError> {
        let payload = json!({ "text": Self::format_text(report) });
        post_payload("slack", &self.webhook_url, self.timeout, &payload)
    }
}

impl NotificationSink for SlackSink {
    fn name(&self) -> &str {
        "slack"
    }

    fn handle(&self, report: &str, _context: &ExceptionContext) -> Result<()> {
        match self.try_send(report) {
            Ok(()) => debug!("Slack notification sent"),
            Err(e) => error!(error = %e, "Failed to send Slack notification"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub::StubServer;

    #[test]
    fn test_format_text_prefixes_marker() {
        let text = SlackSink::format_text("Check the divisor.");
        assert_eq!(text, "🚨 *Panic Detected* 🚨\n\nCheck the divisor.");
    }

    #[test]
    fn test_payload_has_only_text() {
        let server = StubServer::respond(200, "ok", 1);
        let sink = SlackSink::new(&server.url);

        sink.handle("Check the divisor.", &ExceptionContext::default())
            .unwrap();

        let body = server.finish()[0].json();
        let object = body.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert!(body["text"].as_str().unwrap().ends_with("Check the divisor."));
    }

    #[test]
    fn test_handle_swallows_failure() {
        let server = StubServer::respond(400, "invalid_payload", 1);
        let sink = SlackSink::new(&server.url);

        assert!(sink.handle("report", &ExceptionContext::default()).is_ok());
        let unreachable =
            SlackSink::new("http://127.0.0.1:1/").with_timeout(Some(Duration::from_secs(2)));
        assert!(matches!(
            unreachable.try_send("report"),
            Err(SinkError::Transport { .. })
        ));
        server.finish();
    }
}
