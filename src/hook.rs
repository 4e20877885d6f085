//! The process-wide hook slot and the events that flow through it.
//!
//! The dispatcher never talks to `std::panic` directly. It reads and writes
//! the slot through a [`HookRegistry`], which lets the install/uninstall
//! transitions run against an in-memory slot ([`LocalHookRegistry`]) as well
//! as the real panic hook ([`PanicHookRegistry`]).

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::{self, PanicHookInfo};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;

/// A failure that escaped every handler.
pub trait UncaughtEvent {
    /// Short name of the failure kind (`"panic"` for real panics)
    fn type_name(&self) -> String;

    /// Human-readable message
    fn message(&self) -> String;

    /// Full formatted trace, as the runtime would print it
    fn trace(&self) -> String;

    /// The std panic info, when this event is a real panic
    fn panic_info(&self) -> Option<&PanicHookInfo<'_>> {
        None
    }
}

/// Function stored in the hook slot.
pub type Hook = Arc<dyn Fn(&dyn UncaughtEvent) + Send + Sync>;

type StdHook = dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static;

/// Read/write access to a hook slot.
pub trait HookRegistry: Send + Sync {
    /// Hook currently occupying the slot
    fn current(&self) -> Hook;

    /// Replace the hook in the slot
    fn set(&self, hook: Hook);
}

/// Extract the message from a panic payload.
///
/// `panic!` produces either a `&'static str` or a `String`; anything else
/// (e.g. `panic_any`) is reported the way the std hook does.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

impl UncaughtEvent for PanicHookInfo<'_> {
    fn type_name(&self) -> String {
        "panic".to_string()
    }

    fn message(&self) -> String {
        payload_message(self.payload())
    }

    fn trace(&self) -> String {
        let current = thread::current();
        let name = current.name().unwrap_or("<unnamed>");
        let location = self
            .location()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());

        format!(
            "thread '{}' panicked at {}:\n{}\nstack backtrace:\n{}",
            name,
            location,
            UncaughtEvent::message(self),
            Backtrace::force_capture()
        )
    }

    fn panic_info(&self) -> Option<&PanicHookInfo<'_>> {
        Some(self)
    }
}

/// An owned failure description.
///
/// Used for failures that never went through `panic!`, such as an error
/// returned from `main`, and for exercising a dispatcher without panicking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaisedError {
    type_name: String,
    message: String,
    trace: String,
}

impl RaisedError {
    /// Create an event whose trace is just `"<type>: <message>"`
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let message = message.into();
        let trace = format!("{}: {}", type_name, message);
        Self {
            type_name,
            message,
            trace,
        }
    }

    /// Builder: set the formatted trace
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = trace.into();
        self
    }

    /// Describe an `anyhow::Error`, keeping its cause chain in the trace
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::new("error", err.to_string()).with_trace(format!("Error: {:?}", err))
    }
}

impl UncaughtEvent for RaisedError {
    fn type_name(&self) -> String {
        self.type_name.clone()
    }

    fn message(&self) -> String {
        self.message.clone()
    }

    fn trace(&self) -> String {
        self.trace.clone()
    }
}

/// Print an event the way an unhandled failure is shown when no hook is set.
pub fn default_presentation(event: &dyn UncaughtEvent) {
    eprintln!("{}", event.trace());
}

/// A hook that only prints the default presentation
pub fn default_hook() -> Hook {
    Arc::new(|event: &dyn UncaughtEvent| default_presentation(event))
}

/// The real process-wide panic hook.
///
/// [`set`](HookRegistry::set) must not be called from a panicking thread;
/// std aborts in that case.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicHookRegistry;

impl HookRegistry for PanicHookRegistry {
    fn current(&self) -> Hook {
        // take_hook empties the slot, so put the same hook straight back
        let original: Arc<StdHook> = Arc::from(panic::take_hook());
        let registered = Arc::clone(&original);
        panic::set_hook(Box::new(move |info| registered(info)));

        let hook: Hook = Arc::new(move |event: &dyn UncaughtEvent| match event.panic_info() {
            Some(info) => original(info),
            None => default_presentation(event),
        });
        hook
    }

    fn set(&self, hook: Hook) {
        panic::set_hook(Box::new(move |info| {
            let event: &dyn UncaughtEvent = info;
            hook(event);
        }));
    }
}

/// A hook slot that lives in memory instead of in the std runtime.
pub struct LocalHookRegistry {
    slot: RwLock<Hook>,
}

impl LocalHookRegistry {
    /// Create a slot holding `initial`
    pub fn new(initial: Hook) -> Self {
        Self {
            slot: RwLock::new(initial),
        }
    }

    /// Deliver an event to whatever hook currently occupies the slot
    pub fn fire(&self, event: &dyn UncaughtEvent) {
        let hook = self.current();
        hook(event);
    }
}

impl Default for LocalHookRegistry {
    fn default() -> Self {
        Self::new(default_hook())
    }
}

impl fmt::Debug for LocalHookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHookRegistry").finish_non_exhaustive()
    }
}

impl HookRegistry for LocalHookRegistry {
    fn current(&self) -> Hook {
        Arc::clone(&self.slot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn set(&self, hook: Hook) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = hook;
    }
}
