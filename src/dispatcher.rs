//! The dispatcher: hook lifecycle and per-failure orchestration.
//!
//! For every uncaught failure the dispatcher
//! 1. captures an [`ExceptionReport`],
//! 2. calls the hook that was active before it (so the default crash output
//!    appears first),
//! 3. asks the [`AnalysisBackend`] for an explanation,
//! 4. hands the explanation to each [`NotificationSink`] in order.
//!
//! Each step is isolated from failures in the next one and nothing escapes
//! the hook.
//!
//! The previous hook is read from the registry exactly once, when the
//! dispatcher is built. `install` and `uninstall` only swap the slot between
//! the dispatcher's hook and that saved value, so installing twice can never
//! make the dispatcher save itself as "previous".

use colored::Colorize;
use std::fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

use crate::hook::{payload_message, Hook, HookRegistry, PanicHookRegistry, UncaughtEvent};
use crate::providers::{AnalysisBackend, MockBackend};
use crate::report::{ExceptionContext, ExceptionReport};
use crate::sinks::{ConsoleSink, NotificationSink};

/// Prefix of the analysis substituted when the backend fails
pub const ANALYSIS_FAILED_PREFIX: &str = "Error during AI analysis:";

/// Installs itself as the uncaught-failure hook and fans analyses out to sinks
pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    registry: Arc<dyn HookRegistry>,
    hook: Hook,
    installed: AtomicBool,
}

impl Dispatcher {
    /// Mock backend, console sink, real panic hook
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Make the dispatcher the active hook.
    ///
    /// Calling this again while installed re-sets the same hook.
    pub fn install(&self) {
        self.registry.set(Arc::clone(&self.hook));
        self.installed.store(true, Ordering::SeqCst);
        info!(
            backend = self.pipeline.backend.name(),
            sinks = self.pipeline.sinks.len(),
            "Crash analysis installed. Ready to catch panics."
        );
    }

    /// Put back the hook that was active when the dispatcher was built
    pub fn uninstall(&self) {
        self.registry.set(Arc::clone(&self.pipeline.previous));
        self.installed.store(false, Ordering::SeqCst);
        info!("Crash analysis uninstalled.");
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Run the full pipeline for an event without going through the hook slot
    pub fn report(&self, event: &dyn UncaughtEvent) {
        self.pipeline.on_uncaught(event);
    }

    /// Hook saved at construction
    pub fn previous_hook(&self) -> Hook {
        Arc::clone(&self.pipeline.previous)
    }

    /// Hook this dispatcher installs
    pub fn hook(&self) -> Hook {
        Arc::clone(&self.hook)
    }

    pub fn backend_name(&self) -> &str {
        self.pipeline.backend.name()
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.pipeline.sinks.iter().map(|s| s.name()).collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("backend", &self.backend_name())
            .field("sinks", &self.sink_names())
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Builder for [`Dispatcher`]
#[derive(Default)]
pub struct DispatcherBuilder {
    backend: Option<Box<dyn AnalysisBackend>>,
    sinks: Option<Vec<Box<dyn NotificationSink>>>,
    registry: Option<Arc<dyn HookRegistry>>,
    notices: Notices,
}

impl DispatcherBuilder {
    /// Backend used for analysis (default: [`MockBackend`])
    pub fn backend(self, backend: impl AnalysisBackend + 'static) -> Self {
        self.boxed_backend(Box::new(backend))
    }

    pub fn boxed_backend(mut self, backend: Box<dyn AnalysisBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Append a sink; sinks are notified in the order they are added
    pub fn sink(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sinks.get_or_insert_with(Vec::new).push(Box::new(sink));
        self
    }

    /// Replace the sink list. An empty list means no sinks at all;
    /// leaving sinks unset means a single [`ConsoleSink`].
    pub fn sinks(mut self, sinks: Vec<Box<dyn NotificationSink>>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    /// Hook slot to manage (default: [`PanicHookRegistry`])
    pub fn registry(mut self, registry: Arc<dyn HookRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Write sink failure notices to `writer` instead of stderr
    pub fn notice_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.notices.writer = Some(Mutex::new(Box::new(writer)));
        self
    }

    /// Build the dispatcher, saving the registry's current hook
    pub fn build(self) -> Dispatcher {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(PanicHookRegistry));
        let backend = self.backend.unwrap_or_else(|| Box::new(MockBackend));
        let sinks = self
            .sinks
            .unwrap_or_else(|| vec![Box::new(ConsoleSink::new())]);

        let pipeline = Arc::new(Pipeline {
            backend,
            sinks,
            previous: registry.current(),
            dispatching: AtomicBool::new(false),
            notices: self.notices,
        });

        let target = Arc::clone(&pipeline);
        let hook: Hook = Arc::new(move |event: &dyn UncaughtEvent| target.on_uncaught(event));

        Dispatcher {
            pipeline,
            registry,
            hook,
            installed: AtomicBool::new(false),
        }
    }
}

struct Pipeline {
    backend: Box<dyn AnalysisBackend>,
    sinks: Vec<Box<dyn NotificationSink>>,
    previous: Hook,
    dispatching: AtomicBool,
    notices: Notices,
}

/// Clears the dispatching flag when the pipeline finishes
struct DispatchGuard<'a>(&'a AtomicBool);

impl<'a> DispatchGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Pipeline {
    fn on_uncaught(&self, event: &dyn UncaughtEvent) {
        // A failure raised while this pipeline is already running (e.g. on an
        // HTTP worker thread) only gets the default presentation.
        let Some(_guard) = DispatchGuard::enter(&self.dispatching) else {
            debug!("Failure raised during dispatch; skipping analysis");
            self.call_previous(event);
            return;
        };

        let report = ExceptionReport::capture(event);
        self.call_previous(event);

        let analysis = self.analyze(&report);
        self.notify(&analysis, &report.context());
    }

    fn call_previous(&self, event: &dyn UncaughtEvent) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (self.previous)(event))) {
            warn!(
                error = %payload_message(payload.as_ref()),
                "Previous hook panicked"
            );
        }
    }

    fn analyze(&self, report: &ExceptionReport) -> String {
        debug!(backend = self.backend.name(), "Requesting crash analysis");

        match isolated("why-panic-analysis", || self.backend.analyze(report)) {
            Ok(analysis) => analysis,
            Err(error) => {
                warn!(backend = self.backend.name(), error = %error, "Analysis failed");
                format!("{} {}", ANALYSIS_FAILED_PREFIX, error)
            }
        }
    }

    fn notify(&self, analysis: &str, context: &ExceptionContext) {
        for sink in &self.sinks {
            if let Err(error) = isolated("why-panic-sink", || sink.handle(analysis, context)) {
                warn!(sink = sink.name(), error = %error, "Notification sink failed");
                self.notices.sink_failed(sink.name(), &error);
            }
        }
    }
}

/// Run `f` on a scoped worker thread and flatten its outcome into a message.
///
/// The hook body runs inside the std panic hook, where a second panic on the
/// same thread aborts the process. A panic on the worker only fails the join.
fn isolated<T, F>(name: &str, f: F) -> Result<T, String>
where
    T: Send,
    F: FnOnce() -> anyhow::Result<T> + Send,
{
    thread::scope(|scope| {
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn_scoped(scope, f)
            .map_err(|e| format!("failed to spawn worker: {}", e))?;

        match worker.join() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(payload) => Err(payload_message(payload.as_ref())),
        }
    })
}

/// Where sink failure notices go: stderr, or an injected writer
#[derive(Default)]
struct Notices {
    writer: Option<Mutex<Box<dyn Write + Send>>>,
}

impl Notices {
    fn sink_failed(&self, sink: &str, error: &str) {
        let notice = format!("Error in notification sink {}: {}", sink, error);
        match &self.writer {
            Some(writer) => {
                let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
                // Nowhere left to report a failed notice
                let _ = writeln!(writer, "{}", notice).and_then(|()| writer.flush());
            }
            None => eprintln!("{} {}", "✗".red(), notice),
        }
    }
}
