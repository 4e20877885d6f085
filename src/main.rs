use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::hint::black_box;
use std::io;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

use why_panic::cli::Cli;
use why_panic::config::{self, Config, ConfigError};
use why_panic::providers::{list_backends, ProviderError};

fn format_error(message: &str, tip: Option<&str>) -> String {
    let mut output = format!("{} {}", "Error:".red().bold(), message);
    if let Some(tip) = tip {
        output.push('\n');
        output.push_str(&format!("{} {}", "Tip:".blue().bold(), tip));
    }
    output
}

fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "why-panic", &mut io::stdout());
}

fn print_backends() {
    println!("{} {}", "▸".magenta(), "Backends".magenta().bold());
    for (kind, description, ready) in list_backends() {
        let status = if ready {
            "ready".green()
        } else {
            "no API key".yellow()
        };
        println!(
            "  {:<8} {} ({})",
            kind.to_string().bright_white(),
            description,
            status
        );
    }
}

fn tip_for(err: &ConfigError) -> Option<&'static str> {
    match err {
        ConfigError::Backend(ProviderError::MissingApiKey { .. }) => {
            Some("Export the API key, or run with --backend mock to try it offline.")
        }
        ConfigError::Parse { .. } => Some("Run why-panic --print-config for a valid example."),
        _ => None,
    }
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => Config::try_load_from_path(path)?,
        None => Config::load(),
    };
    config.apply_env_overrides()?;
    cli.apply_to(&mut config);
    Ok(config)
}

/// Deliberately crash so the installed hook has something to explain
fn divide(numerator: i32, denominator: i32) -> i32 {
    numerator / denominator
}

fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        print_completions(shell);
        return Ok(ExitCode::SUCCESS);
    }

    if cli.print_config {
        config::print_default_config();
        return Ok(ExitCode::SUCCESS);
    }

    if cli.list_backends {
        print_backends();
        return Ok(ExitCode::SUCCESS);
    }

    let dispatcher = match load_config(&cli).and_then(|config| config.build_dispatcher()) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            eprintln!("{}", format_error(&e.to_string(), tip_for(&e)));
            return Ok(ExitCode::FAILURE);
        }
    };
    dispatcher.install();

    eprintln!(
        "{} Using {} backend, notifying {}",
        "▸".magenta(),
        dispatcher.backend_name().bright_white(),
        dispatcher.sink_names().join(", ").bright_white()
    );
    eprintln!("{} Dividing 1 by 0...", "▸".magenta());

    let result = divide(1, black_box(0));
    println!("{result}");
    Ok(ExitCode::SUCCESS)
}
