//! why-panic - explain crashes with an LLM as they happen
//!
//! A [`Dispatcher`] replaces the process-wide panic hook. When a panic
//! escapes, the previous hook still prints its usual message, then the crash
//! is sent to an [`AnalysisBackend`](providers::AnalysisBackend) and the
//! resulting explanation is handed to every configured
//! [`NotificationSink`](sinks::NotificationSink).
//!
//! ```no_run
//! use why_panic::{Dispatcher, sinks::WebhookSink};
//!
//! let dispatcher = Dispatcher::builder()
//!     .sink(why_panic::sinks::ConsoleSink::new())
//!     .sink(WebhookSink::new("https://example.com/hooks/panic"))
//!     .build();
//! dispatcher.install();
//! ```

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod hook;
pub mod http;
pub mod providers;
pub mod report;
pub mod sinks;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use hook::{HookRegistry, LocalHookRegistry, PanicHookRegistry, RaisedError, UncaughtEvent};
pub use providers::{BackendKind, ProviderConfig, ProviderError};
pub use report::{ExceptionContext, ExceptionReport};

/// Load the user config, build a dispatcher from it and install it.
///
/// Returns `Ok(None)` without touching the panic hook when
/// `WHY_PANIC_DISABLE=1` is set.
pub fn init() -> Result<Option<Dispatcher>, ConfigError> {
    if Config::is_disabled() {
        tracing::debug!("why-panic disabled via {}", config::DISABLE_ENV);
        return Ok(None);
    }

    let mut config = Config::load();
    config.apply_env_overrides()?;

    let dispatcher = config.build_dispatcher()?;
    dispatcher.install();
    Ok(Some(dispatcher))
}
