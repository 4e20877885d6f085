//! Notification sinks that deliver a finished analysis.

pub mod console;
pub mod slack;
pub mod webhook;

use anyhow::Result;
use serde::Serialize;
use std::time::Duration;

use crate::http::{HttpError, JsonPost};
use crate::report::ExceptionContext;

pub use console::ConsoleSink;
pub use slack::SlackSink;
pub use webhook::WebhookSink;

/// Destination for a finished analysis.
///
/// Implementations may fail; the dispatcher reports the failure and moves on
/// to the next sink.
pub trait NotificationSink: Send + Sync {
    /// Sink name for logs and failure notices
    fn name(&self) -> &str;

    /// Deliver the analysis together with the exception context
    fn handle(&self, report: &str, context: &ExceptionContext) -> Result<()>;
}

/// Delivery failures
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{sink} returned HTTP {status}: {body}")]
    Status {
        sink: String,
        status: u16,
        body: String,
    },

    #[error("{sink} request failed: {source}")]
    Transport {
        sink: String,
        #[source]
        source: HttpError,
    },

    #[error("console write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// POST a JSON payload, treating any non-2xx status as a failure
pub(crate) fn post_payload<T: Serialize + Sync + ?Sized>(
    sink: &str,
    url: &str,
    timeout: Option<Duration>,
    payload: &T,
) -> std::result::Result<(), SinkError> {
    let reply = JsonPost::new(url)
        .timeout(timeout)
        .send(payload)
        .map_err(|source| SinkError::Transport {
            sink: sink.to_string(),
            source,
        })?;

    if !reply.status.is_success() {
        return Err(SinkError::Status {
            sink: sink.to_string(),
            status: reply.status.as_u16(),
            body: reply.body,
        });
    }
    Ok(())
}
