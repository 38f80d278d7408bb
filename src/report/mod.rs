//! Renders a completed `TestResult`/`SuiteResult` into the two output
//! shapes the CLI supports: a `serde_json`-serialized structured report and
//! a short human-readable text summary. Extends the shape of teacher's
//! `protocol::ExecutionReport`/`ExecutionSummary` (counts + per-step list)
//! to the Suite/Setup/Main/Teardown structure this engine adds.

use crate::engine::model::{Status, TestResult};
use crate::suite::{ElementResult, SuiteResult};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TestReport {
    pub name: String,
    pub status: Status,
    pub error: Option<String>,
    pub duration_ms: u128,
    pub checks: Vec<CheckReport>,
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub name: String,
    pub status: Status,
    pub message: Option<String>,
}

impl From<&TestResult> for TestReport {
    fn from(result: &TestResult) -> Self {
        Self {
            name: result.name.clone(),
            status: result.status,
            error: result.error.clone(),
            duration_ms: result.duration.as_millis(),
            checks: result
                .checks
                .iter()
                .map(|c| CheckReport {
                    name: c.name.clone(),
                    status: c.status,
                    message: c.message.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ElementReport {
    pub test: TestReport,
    pub mock_reports: Vec<MockReport>,
}

#[derive(Debug, Serialize)]
pub struct MockReport {
    pub label: String,
    pub status: Status,
    pub message: Option<String>,
}

impl From<&ElementResult> for ElementReport {
    fn from(result: &ElementResult) -> Self {
        Self {
            test: TestReport::from(&result.test),
            mock_reports: result
                .mock_reports
                .iter()
                .map(|r| MockReport {
                    label: r.label.clone(),
                    status: r.status,
                    message: r.message.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SuiteReport {
    pub name: String,
    pub status: Status,
    pub setup: Vec<ElementReport>,
    pub main: Vec<ElementReport>,
    pub teardown: Vec<ElementReport>,
}

impl From<&SuiteResult> for SuiteReport {
    fn from(result: &SuiteResult) -> Self {
        Self {
            name: result.name.clone(),
            status: result.status,
            setup: result.setup.iter().map(ElementReport::from).collect(),
            main: result.main.iter().map(ElementReport::from).collect(),
            teardown: result.teardown.iter().map(ElementReport::from).collect(),
        }
    }
}

impl TestReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_text(&self) -> String {
        let mut out = format!("{}: {:?} ({}ms)\n", self.name, self.status, self.duration_ms);
        if let Some(err) = &self.error {
            out.push_str(&format!("  error: {err}\n"));
        }
        for check in &self.checks {
            out.push_str(&format!(
                "  - {}: {:?}{}\n",
                check.name,
                check.status,
                check
                    .message
                    .as_ref()
                    .map(|m| format!(" ({m})"))
                    .unwrap_or_default()
            ));
        }
        out
    }
}

impl SuiteReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_text(&self) -> String {
        let mut out = format!("Suite {}: {:?}\n", self.name, self.status);
        for (phase, elements) in [
            ("Setup", &self.setup),
            ("Main", &self.main),
            ("Teardown", &self.teardown),
        ] {
            if elements.is_empty() {
                continue;
            }
            out.push_str(&format!("{phase}:\n"));
            for element in elements {
                out.push_str("  ");
                out.push_str(&element.test.to_text());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::CheckVerdict;
    use std::time::Duration;

    fn sample_result() -> TestResult {
        TestResult {
            name: "login".into(),
            status: Status::Fail,
            error: None,
            started_at: chrono::Utc::now(),
            duration: Duration::from_millis(42),
            checks: vec![CheckVerdict {
                name: "StatusCode".into(),
                status: Status::Fail,
                message: Some("expected 200, got 500".into()),
            }],
        }
    }

    #[test]
    fn json_report_round_trips_through_serde_value() {
        let report = TestReport::from(&sample_result());
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "login");
        assert_eq!(value["status"], "fail");
    }

    #[test]
    fn text_report_includes_check_message() {
        let report = TestReport::from(&sample_result());
        let text = report.to_text();
        assert!(text.contains("login"));
        assert!(text.contains("expected 200, got 500"));
    }
}
