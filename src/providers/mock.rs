//! Offline backend with a canned answer.

use anyhow::Result;

use super::AnalysisBackend;
use crate::report::ExceptionReport;

/// Deterministic backend for tests and offline use; performs no I/O
#[derive(Debug, Default, Clone, Copy)]
pub struct MockBackend;

impl MockBackend {
    /// Render the canned analysis for a report
    pub fn render(report: &ExceptionReport) -> String {
        format!(
            "Analysis of {}: {}\n\n\
             CAUSE:\n\
             This is a mock analysis. The failure likely occurred because an invariant was violated.\n\n\
             SUGGESTED FIX:\n\
             1. Check your logic.\n\
             2. Handle the failing case explicitly instead of panicking.\n\
             3. Verify inputs.",
            report.type_name, report.message
        )
    }
}

impl AnalysisBackend for MockBackend {
    fn name(&self) -> &str {
        "Mock"
    }

    fn analyze(&self, report: &ExceptionReport) -> Result<String> {
        Ok(Self::render(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_embeds_inputs() {
        let report = ExceptionReport::new("ZeroDivisionError", "division by zero", "tb");
        let analysis = MockBackend.analyze(&report).unwrap();

        assert!(analysis.starts_with("Analysis of ZeroDivisionError: division by zero"));
        assert!(analysis.contains("SUGGESTED FIX:"));
    }

    #[test]
    fn test_mock_is_deterministic() {
        let report = ExceptionReport::new("panic", "attempt to divide by zero", "trace");
        let first = MockBackend.analyze(&report).unwrap();
        let second = MockBackend.analyze(&report.clone()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mock_ignores_trace() {
        let a = ExceptionReport::new("panic", "boom", "trace one");
        let b = ExceptionReport::new("panic", "boom", "trace two");
        assert_eq!(MockBackend::render(&a), MockBackend::render(&b));
    }
}
