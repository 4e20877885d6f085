//! Installs the dispatcher on the real process-wide panic hook.
//!
//! The hook is shared by every test in a binary, so scenarios that need a
//! clean hook or inspect the process's own stderr re-run this test binary as
//! a child process, selecting the scenario through [`SCENARIO_ENV`].

use anyhow::{bail, Result};
use std::env;
use std::hint::black_box;
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};
use std::thread;

use why_panic::dispatcher::ANALYSIS_FAILED_PREFIX;
use why_panic::providers::{AnalysisBackend, MockBackend};
use why_panic::sinks::NotificationSink;
use why_panic::{Dispatcher, ExceptionContext, ExceptionReport};

const SCENARIO_ENV: &str = "WHY_PANIC_TEST_SCENARIO";

type Calls = Arc<Mutex<Vec<(String, ExceptionContext)>>>;

struct RecordingSink(Calls);

impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn handle(&self, report: &str, context: &ExceptionContext) -> Result<()> {
        self.0
            .lock()
            .unwrap()
            .push((report.to_string(), context.clone()));
        Ok(())
    }
}

struct PanickingBackend;

impl AnalysisBackend for PanickingBackend {
    fn name(&self) -> &str {
        "panicking"
    }

    fn analyze(&self, _report: &ExceptionReport) -> Result<String> {
        panic!("backend exploded")
    }
}

struct PanickingSink;

impl NotificationSink for PanickingSink {
    fn name(&self) -> &str {
        "panicking"
    }

    fn handle(&self, _report: &str, _context: &ExceptionContext) -> Result<()> {
        panic!("sink exploded")
    }
}

struct FailingSink;

impl NotificationSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn handle(&self, _report: &str, _context: &ExceptionContext) -> Result<()> {
        bail!("connection refused")
    }
}

fn divide_in_thread(name: &str) -> bool {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(|| 1 / black_box(0))
        .unwrap()
        .join()
        .is_err()
}

/// Re-run this binary with only [`scenario_entry`] selected
fn run_scenario(scenario: &str) -> Output {
    Command::new(env::current_exe().unwrap())
        .args([
            "--exact",
            "scenario_entry",
            "--nocapture",
            "--test-threads=1",
        ])
        .env(SCENARIO_ENV, scenario)
        .output()
        .unwrap()
}

/// Child-process side; does nothing in a normal test run
#[test]
fn scenario_entry() {
    match env::var(SCENARIO_ENV).as_deref() {
        Ok("panicking-pipeline") => panicking_pipeline(),
        Ok("default-output") => default_output(),
        _ => {}
    }
}

fn panicking_pipeline() {
    let calls: Calls = Arc::default();
    let dispatcher = Dispatcher::builder()
        .backend(PanickingBackend)
        .sink(PanickingSink)
        .sink(FailingSink)
        .sink(RecordingSink(Arc::clone(&calls)))
        .build();
    dispatcher.install();

    assert!(divide_in_thread("crashing"));

    let calls = calls.lock().unwrap();
    println!("survived sinks={}", calls.len());
    for (analysis, context) in calls.iter() {
        println!("analysis={}", analysis);
        println!("exception_value={}", context.exception_value);
    }
}

fn default_output() {
    assert!(divide_in_thread("plain"));

    let calls: Calls = Arc::default();
    let dispatcher = Dispatcher::builder()
        .backend(MockBackend)
        .sink(RecordingSink(Arc::clone(&calls)))
        .build();
    dispatcher.install();

    assert!(divide_in_thread("hooked"));
    println!("hooked sinks={}", calls.lock().unwrap().len());
}

#[test]
fn test_panicking_backend_and_sinks_do_not_abort() {
    let output = run_scenario("panicking-pipeline");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "child failed:\n{stdout}\n{stderr}");
    assert!(stdout.contains("survived sinks=1"), "{stdout}");
    assert!(stdout.contains(&format!(
        "analysis={} backend exploded",
        ANALYSIS_FAILED_PREFIX
    )));
    assert!(stdout.contains("exception_value=attempt to divide by zero"));
    assert!(stderr.contains("Error in notification sink panicking: sink exploded"));
    assert!(stderr.contains("Error in notification sink failing: connection refused"));
    assert!(!stderr.contains("aborting"));
}

#[test]
fn test_default_crash_output_is_kept() {
    let output = run_scenario("default-output");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "child failed:\n{stdout}\n{stderr}");
    assert!(stdout.contains("hooked sinks=1"), "{stdout}");
    for name in ["plain", "hooked"] {
        let header = format!("thread '{name}' panicked at");
        let start = stderr
            .find(&header)
            .unwrap_or_else(|| panic!("no panic message for {name}:\n{stderr}"));
        assert!(stderr[start..].contains("attempt to divide by zero"));
    }
}

#[test]
fn test_real_panic_hook_lifecycle() {
    let calls: Calls = Arc::default();
    let dispatcher = Dispatcher::builder()
        .backend(MockBackend)
        .sink(RecordingSink(Arc::clone(&calls)))
        .build();

    dispatcher.install();
    assert!(dispatcher.is_installed());
    assert!(divide_in_thread("worker"));

    {
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (analysis, context) = &calls[0];
        assert!(analysis.contains("attempt to divide by zero"));
        assert_eq!(context.exception_type, "panic");
        assert_eq!(context.exception_value, "attempt to divide by zero");
        assert!(context.traceback.contains("thread 'worker' panicked at"));
    }

    // Re-installing must not make the dispatcher its own previous hook
    dispatcher.install();
    assert!(divide_in_thread("again"));
    assert_eq!(calls.lock().unwrap().len(), 2);

    dispatcher.uninstall();
    assert!(!dispatcher.is_installed());
    assert!(divide_in_thread("after-uninstall"));
    assert_eq!(calls.lock().unwrap().len(), 2);
}
