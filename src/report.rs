//! Per-failure report and the context handed to notification sinks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use crate::hook::UncaughtEvent;

/// Placeholder used when a field of the event cannot be formatted
pub const UNFORMATTABLE: &str = "<unformattable>";

/// Snapshot of a single uncaught failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionReport {
    /// Failure kind, e.g. `panic`
    pub type_name: String,

    /// Message carried by the failure
    pub message: String,

    /// Full formatted trace
    pub formatted_trace: String,
}

impl ExceptionReport {
    pub fn new(
        type_name: impl Into<String>,
        message: impl Into<String>,
        formatted_trace: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            formatted_trace: formatted_trace.into(),
        }
    }

    /// Build a report from an event.
    ///
    /// Never fails: an accessor that unwinds is replaced by [`UNFORMATTABLE`].
    pub fn capture(event: &dyn UncaughtEvent) -> Self {
        Self {
            type_name: best_effort(|| event.type_name()),
            message: best_effort(|| event.message()),
            formatted_trace: best_effort(|| event.trace()),
        }
    }

    /// Context map passed to sinks
    pub fn context(&self) -> ExceptionContext {
        ExceptionContext {
            exception_type: self.type_name.clone(),
            exception_value: self.message.clone(),
            traceback: self.formatted_trace.clone(),
        }
    }

    /// Format the report for inclusion in a prompt
    pub fn format_for_prompt(&self) -> String {
        format!(
            "Exception Type: {}\nMessage: {}\nStack Trace:\n{}\n",
            self.type_name, self.message, self.formatted_trace
        )
    }
}

fn best_effort(f: impl FnOnce() -> String) -> String {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| UNFORMATTABLE.to_string())
}

/// Exception metadata sent to sinks alongside the analysis.
///
/// Serializes to a JSON object with exactly the keys in [`ExceptionContext::KEYS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExceptionContext {
    pub exception_type: String,
    pub exception_value: String,
    pub traceback: String,
}

impl ExceptionContext {
    pub const KEYS: [&'static str; 3] = ["exception_type", "exception_value", "traceback"];

    /// Look a value up by key name
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "exception_type" => Some(&self.exception_type),
            "exception_value" => Some(&self.exception_value),
            "traceback" => Some(&self.traceback),
            _ => None,
        }
    }

    /// Copy the context into a plain string map
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        Self::KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value.to_string())))
            .collect()
    }
}
