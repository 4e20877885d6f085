//! Command-line interface for the `why-panic` demo binary.

use clap::Parser;
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::{Config, SinkConfig};
use crate::providers::BackendKind;

/// Install AI crash analysis and trigger a panic to see it work
#[derive(Parser, Debug)]
#[command(
    name = "why-panic",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("WHY_PANIC_GIT_SHA"), ")"),
    about,
    long_about = None
)]
#[command(
    after_help = "EXAMPLES:\n    why-panic\n    why-panic --backend gemini\n    why-panic --webhook https://example.com/hook --slack https://hooks.slack.com/services/...\n    why-panic --print-config > ~/.config/why-panic/config.toml"
)]
pub struct Cli {
    /// Analysis backend (overrides config and WHY_PANIC_BACKEND)
    #[arg(long, short = 'b', value_enum, value_name = "BACKEND")]
    pub backend: Option<BackendKind>,

    /// Model identifier for the API backends
    #[arg(long, short = 'm', value_name = "MODEL")]
    pub model: Option<String>,

    /// Request timeout in seconds (0 = no timeout)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Also POST the analysis to this webhook (repeatable)
    #[arg(long, value_name = "URL")]
    pub webhook: Vec<String>,

    /// Also post the analysis to this Slack webhook (repeatable)
    #[arg(long, value_name = "URL")]
    pub slack: Vec<String>,

    /// Don't print the analysis banner to stdout
    #[arg(long)]
    pub no_console: bool,

    /// Path to config file (default: ~/.config/why-panic/config.toml)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output default configuration to stdout
    #[arg(long)]
    pub print_config: bool,

    /// List analysis backends and whether their credentials are set
    #[arg(long)]
    pub list_backends: bool,

    /// Generate shell completions
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<Shell>,
}

impl Cli {
    /// Layer command-line overrides on top of a loaded config
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.analysis.backend = backend;
        }
        if let Some(model) = &self.model {
            config.analysis.model = model.clone();
        }
        if let Some(timeout) = self.timeout {
            config.analysis.timeout_secs = timeout;
        }
        if self.no_console {
            config.sinks.retain(|sink| *sink != SinkConfig::Console);
        }
        config.sinks.extend(
            self.webhook
                .iter()
                .map(|url| SinkConfig::Webhook { url: url.clone() }),
        );
        config
            .sinks
            .extend(self.slack.iter().map(|url| SinkConfig::Slack { url: url.clone() }));
    }
}
