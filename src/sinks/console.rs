//! Console sink: prints the analysis inside a banner.

use anyhow::Result;
use colored::Colorize;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use super::NotificationSink;
use crate::report::ExceptionContext;

/// Banner width in columns
pub const BANNER_WIDTH: usize = 80;

/// Banner title
pub const TITLE: &str = "🤖 AI Crash Report 🤖";

/// Writes reports to stdout, or to an injected writer
pub struct ConsoleSink {
    writer: Option<Mutex<Box<dyn Write + Send>>>,
    width: usize,
    color: bool,
}

impl ConsoleSink {
    /// Colored output on stdout, wrapped to the terminal (max 100 columns)
    pub fn new() -> Self {
        Self {
            writer: None,
            width: textwrap::termwidth().min(100),
            color: true,
        }
    }

    /// Plain output into `writer`, wrapped at [`BANNER_WIDTH`]
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Some(Mutex::new(Box::new(writer))),
            width: BANNER_WIDTH,
            color: false,
        }
    }

    /// Render the framed report
    pub fn render(&self, report: &str) -> String {
        let rule = "=".repeat(BANNER_WIDTH);
        let (rule, title) = if self.color {
            (rule.dimmed().to_string(), TITLE.bold().to_string())
        } else {
            (rule, TITLE.to_string())
        };

        let mut out = String::new();
        out.push('\n');
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&title);
        out.push('\n');
        out.push_str(&rule);
        out.push('\n');
        for line in wrap_report(report, self.width) {
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str(&rule);
        out.push_str("\n\n");
        out
    }
}

/// Wrap prose lines to `width`; fenced code blocks are left as-is.
fn wrap_report(report: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut in_code_block = false;

    for line in report.lines() {
        if line.trim().starts_with("```") {
            in_code_block = !in_code_block;
            lines.push(line.to_string());
            continue;
        }
        if in_code_block || line.trim().is_empty() {
            lines.push(line.to_string());
            continue;
        }
        lines.extend(
            textwrap::wrap(line, width)
                .into_iter()
                .map(|wrapped| wrapped.into_owned()),
        );
    }

    lines
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSink")
            .field("stdout", &self.writer.is_none())
            .field("width", &self.width)
            .field("color", &self.color)
            .finish()
    }
}

impl NotificationSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn handle(&self, report: &str, _context: &ExceptionContext) -> Result<()> {
        let rendered = self.render(report);
        match &self.writer {
            Some(writer) => {
                let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
                writer.write_all(rendered.as_bytes())?;
                writer.flush()?;
            }
            None => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(rendered.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }
}
