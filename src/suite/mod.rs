//! Suite runner (spec.md §4.7): Setup → Main → Teardown, skip-on-failure
//! propagation, shared scope, and mock lifecycle bracketing per element.
//!
//! Grounded on teacher's `main.rs::execute_sequential` ordered loop, with
//! the first-non-Pass-skips-the-rest discipline generalized from "abort the
//! whole plan" to "skip remaining Setup and all of Main, still run
//! Teardown."

use crate::context::Scope;
use crate::engine::model::{Status, Test, TestResult};
use crate::engine::TestEngine;
use crate::mock::{MockDefinition, MockServer};
use std::collections::HashMap;

/// One Setup/Main/Teardown entry: a Test plus the mocks that bracket it.
pub struct Element {
    pub test: Test,
    pub mocks: Vec<MockDefinition>,
}

pub struct Suite {
    pub name: String,
    pub description: Option<String>,
    pub setup: Vec<Element>,
    pub main: Vec<Element>,
    pub teardown: Vec<Element>,
    pub variables: HashMap<String, String>,
    pub keep_cookies: bool,
    pub verbosity: u8,
}

/// Per-element result: the Test's own result, plus the mock sub-suite's
/// reconciled reports/status when the element declared mocks.
pub struct ElementResult {
    pub test: TestResult,
    pub mock_reports: Vec<crate::mock::MonitorReport>,
}

pub struct SuiteResult {
    pub name: String,
    pub status: Status,
    pub setup: Vec<ElementResult>,
    pub main: Vec<ElementResult>,
    pub teardown: Vec<ElementResult>,
}

fn skipped_result(test_name: &str) -> ElementResult {
    ElementResult {
        test: TestResult {
            name: test_name.to_string(),
            status: Status::Skipped,
            error: None,
            started_at: chrono::Utc::now(),
            duration: std::time::Duration::ZERO,
            checks: Vec::new(),
        },
        mock_reports: Vec::new(),
    }
}

pub struct SuiteRunner {
    engine: TestEngine,
}

impl Default for SuiteRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SuiteRunner {
    pub fn new() -> Self {
        Self {
            engine: TestEngine::new(),
        }
    }

    pub async fn run(&self, suite: &mut Suite) -> SuiteResult {
        let mut scope = Scope::new();
        scope.set_global("SUITE_NAME", suite.name.clone());
        scope.extend(&suite.variables);

        let mut setup_results = Vec::new();
        let mut skip_rest = false;
        for element in suite.setup.iter_mut() {
            if skip_rest {
                setup_results.push(skipped_result(&element.test.name));
                continue;
            }
            let result = self.run_element(element, &mut scope).await;
            if result.test.status != Status::Pass {
                skip_rest = true;
            }
            setup_results.push(result);
        }

        let mut main_results = Vec::new();
        for element in suite.main.iter_mut() {
            if skip_rest {
                main_results.push(skipped_result(&element.test.name));
                continue;
            }
            let result = self.run_element(element, &mut scope).await;
            main_results.push(result);
        }

        let mut teardown_results = Vec::new();
        for element in suite.teardown.iter_mut() {
            teardown_results.push(self.run_element(element, &mut scope).await);
        }

        let status = Status::worst_of(
            setup_results
                .iter()
                .chain(main_results.iter())
                .map(|r| r.test.status),
        );

        SuiteResult {
            name: suite.name.clone(),
            status,
            setup: setup_results,
            main: main_results,
            teardown: teardown_results,
        }
    }

    async fn run_element(&self, element: &mut Element, scope: &mut Scope) -> ElementResult {
        let mock_server = if element.mocks.is_empty() {
            None
        } else {
            let snapshot = scope.snapshot();
            let defs = std::mem::take(&mut element.mocks);
            match MockServer::start(defs, snapshot).await {
                Ok(server) => Some(server),
                Err(e) => {
                    tracing::warn!(test = %element.test.name, error = %e, "mock server failed to start");
                    None
                }
            }
        };
        let defs_len = mock_server.as_ref().map(|_| element_mock_count(element));

        let mut test_result = self.engine.run(&mut element.test, scope).await;

        let mock_reports = if let Some(server) = mock_server {
            let reports = server.shutdown().await;
            let (reports, mock_status) =
                MockServer::reconcile(defs_len.unwrap_or(reports.len()), reports);
            if test_result.status == Status::Pass && mock_status != Status::Pass {
                test_result.status = Status::Fail;
                test_result.error = Some("mock sub-suite reported a non-Pass outcome".into());
            }
            reports
        } else {
            Vec::new()
        };

        ElementResult {
            test: test_result,
            mock_reports,
        }
    }
}

/// `element.mocks` is drained by [`SuiteRunner::run_element`] before
/// shutdown, so the original count needs to be captured before that —
/// this helper exists only to keep that capture next to its one call site.
fn element_mock_count(element: &Element) -> usize {
    element.mocks.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Check, CheckOutcome};
    use crate::engine::model::{ExecutionParams, Request};

    struct AlwaysFail;
    impl Check for AlwaysFail {
        fn execute(&self, _response: &crate::engine::model::Response) -> CheckOutcome {
            CheckOutcome::Fail("always fails".into())
        }
        fn name(&self) -> &'static str {
            "AlwaysFail"
        }
    }

    struct AlwaysPass;
    impl Check for AlwaysPass {
        fn execute(&self, _response: &crate::engine::model::Response) -> CheckOutcome {
            CheckOutcome::Pass
        }
        fn name(&self) -> &'static str {
            "AlwaysPass"
        }
    }

    fn blank_test(name: &str, checks: Vec<Box<dyn Check>>) -> Test {
        Test {
            name: name.to_string(),
            description: None,
            request: Request {
                method: "GET".into(),
                url: "file:///dev/null".into(),
                ..Default::default()
            },
            checks,
            extractors: Vec::new(),
            params: ExecutionParams::default(),
            variables: Default::default(),
            bogus: None,
        }
    }

    fn element(name: &str, checks: Vec<Box<dyn Check>>) -> Element {
        Element {
            test: blank_test(name, checks),
            mocks: Vec::new(),
        }
    }

    #[tokio::test]
    async fn setup_failure_skips_remaining_setup_and_all_main() {
        let mut suite = Suite {
            name: "s".into(),
            description: None,
            setup: vec![
                element("setup-pass", vec![Box::new(AlwaysPass)]),
                element("setup-fail", vec![Box::new(AlwaysFail)]),
                element("setup-never-runs", vec![Box::new(AlwaysPass)]),
            ],
            main: vec![
                element("main-1", vec![Box::new(AlwaysPass)]),
                element("main-2", vec![Box::new(AlwaysPass)]),
            ],
            teardown: vec![element("teardown-1", vec![Box::new(AlwaysFail)])],
            variables: Default::default(),
            keep_cookies: false,
            verbosity: 0,
        };

        let result = SuiteRunner::new().run(&mut suite).await;

        assert_eq!(result.setup[0].test.status, Status::Pass);
        assert_eq!(result.setup[1].test.status, Status::Fail);
        assert_eq!(result.setup[2].test.status, Status::Skipped);
        assert_eq!(result.main[0].test.status, Status::Skipped);
        assert_eq!(result.main[1].test.status, Status::Skipped);
        assert_eq!(result.status, Status::Fail);
        // Teardown always runs, and its own failure does not change status.
        assert_eq!(result.teardown[0].test.status, Status::Fail);
    }

    #[tokio::test]
    async fn all_setup_pass_runs_main_in_order() {
        let mut suite = Suite {
            name: "s".into(),
            description: None,
            setup: vec![
                element("setup-1", vec![Box::new(AlwaysPass)]),
                element("setup-2", vec![Box::new(AlwaysPass)]),
            ],
            main: vec![
                element("main-1", vec![Box::new(AlwaysPass)]),
                element("main-2", vec![Box::new(AlwaysPass)]),
            ],
            teardown: vec![],
            variables: Default::default(),
            keep_cookies: false,
            verbosity: 0,
        };

        let result = SuiteRunner::new().run(&mut suite).await;
        assert!(result.main.iter().all(|r| r.test.status == Status::Pass));
        assert_eq!(result.status, Status::Pass);
    }
}
