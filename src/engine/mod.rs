//! Single-Test execution engine: the seven-step algorithm of spec §4.6
//! (Bogus short-circuit → prepare → expand → PreSleep → retry/poll →
//! extract → PostSleep). Generalizes the original `execute_step_with_retry`
//! loop in the same spirit — backoff between attempts, retry only re-runs
//! the request, final result carries the last Response — but drives the
//! full Check/Extractor pipeline instead of a single action dispatch.

pub mod model;

pub use model::*;

use crate::adapters;
use crate::context::Scope;
use crate::error::CheckError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct TestEngine;

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs `test` once (its own internal retry/poll loop notwithstanding),
    /// threading `scope` for variable expansion and extractor writes. The
    /// layer `test` pushes for its own variables is popped before returning,
    /// so only extractor writes that used `scope.set` at the caller's layer
    /// (or `set_global`) survive past this call.
    pub async fn run(&self, test: &mut Test, scope: &mut Scope) -> TestResult {
        let started_at = chrono::Utc::now();
        let start = Instant::now();

        if let Some(reason) = test.bogus.clone() {
            return self.bogus_result(test, reason, started_at, start.elapsed());
        }

        for check in test.checks.iter_mut() {
            if let Err(e) = check.prepare() {
                return self.bogus_result(test, e.to_string(), started_at, start.elapsed());
            }
        }

        let mark = scope.push_layer();
        scope.extend(&test.variables);

        let expanded = match Self::expand_request(&test.request, scope) {
            Ok(r) => r,
            Err(e) => {
                scope.pop_to(mark);
                return self.bogus_result(test, e.to_string(), started_at, start.elapsed());
            }
        };

        for check in test.checks.iter_mut() {
            if let Err(e) = check.interpolate(scope) {
                scope.pop_to(mark);
                return self.bogus_result(test, e.to_string(), started_at, start.elapsed());
            }
        }

        if test.params.pre_sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(test.params.pre_sleep_ms)).await;
        }

        let adapter = match adapters::dispatch(&expanded.url) {
            Ok(a) => a,
            Err(e) => {
                scope.pop_to(mark);
                return self.bogus_result(test, e.to_string(), started_at, start.elapsed());
            }
        };

        let tries = test.params.tries.max(1);
        let mut response = None;
        let mut verdicts = Vec::new();
        let mut status = Status::NotRun;
        let mut infra_error = None;

        for attempt in 0..tries {
            if attempt > 0 && test.params.retry_wait_ms > 0 {
                tokio::time::sleep(Duration::from_millis(test.params.retry_wait_ms)).await;
            }

            match adapter.send(&expanded).await {
                Ok(r) => {
                    let this_attempt_verdicts: Vec<CheckVerdict> = test
                        .checks
                        .iter()
                        .map(|c| CheckVerdict::from_outcome(c.name(), &c.execute(&r)))
                        .collect();
                    status = Status::worst_of(
                        this_attempt_verdicts
                            .iter()
                            .map(|v| cap(v.status, test.params.criticality)),
                    );
                    verdicts = this_attempt_verdicts;
                    response = Some(r);
                    infra_error = None;
                }
                Err(e) => {
                    warn!(test = %test.name, attempt, error = %e, "request adapter failed");
                    status = Status::Error;
                    infra_error = Some(e.to_string());
                }
            }

            if status == Status::Pass {
                break;
            }
        }

        // Extracted values are staged locally and only committed to the
        // caller's (Suite's) scope if every extractor succeeds and the test
        // stays Pass — spec invariant (b): a mapping is propagated iff the
        // producing Test's final status is Pass.
        let mut extracted = Vec::new();
        if status == Status::Pass {
            if let Some(r) = &response {
                for (name, extractor) in &test.extractors {
                    match extractor.extract(r, scope) {
                        Ok(value) => extracted.push((name.clone(), value)),
                        Err(e) => {
                            debug!(test = %test.name, extractor = %name, error = %e, "extractor failed");
                            status = Status::Error;
                            infra_error = Some(format!("extractor '{name}' failed: {e}"));
                            break;
                        }
                    }
                }
            }
        }

        if test.params.post_sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(test.params.post_sleep_ms)).await;
        }

        scope.pop_to(mark);
        if status == Status::Pass {
            for (name, value) in extracted {
                scope.set_global(name, value);
            }
        }

        TestResult {
            name: test.name.clone(),
            status,
            error: infra_error,
            started_at,
            duration: start.elapsed(),
            checks: verdicts,
        }
    }

    fn bogus_result(
        &self,
        test: &Test,
        reason: String,
        started_at: chrono::DateTime<chrono::Utc>,
        duration: Duration,
    ) -> TestResult {
        TestResult {
            name: test.name.clone(),
            status: Status::Bogus,
            error: Some(reason),
            started_at,
            duration,
            checks: Vec::new(),
        }
    }

    /// Interpolates `{{...}}` tokens across URL, headers, params, cookies,
    /// and (when the body is valid UTF-8) the body, per spec §4.6 step 3.
    /// A binary body is left untouched — there is nothing to substitute
    /// into it.
    fn expand_request(request: &Request, scope: &Scope) -> Result<Request, CheckError> {
        let mut expanded = request.clone();
        expanded.url = scope.interpolate(&expanded.url)?;

        for values in expanded.headers.values_mut() {
            for v in values.iter_mut() {
                *v = scope.interpolate(v)?;
            }
        }
        for values in expanded.params.values_mut() {
            for v in values.iter_mut() {
                *v = scope.interpolate(v)?;
            }
        }
        for (_, v) in expanded.cookies.iter_mut() {
            *v = scope.interpolate(v)?;
        }
        if let Ok(text) = std::str::from_utf8(&expanded.body) {
            expanded.body = scope.interpolate(text)?.into_bytes();
        }

        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Check, CheckOutcome};

    struct AlwaysPass;
    impl Check for AlwaysPass {
        fn prepare(&mut self) -> Result<(), CheckError> {
            Ok(())
        }
        fn execute(&self, _response: &Response) -> CheckOutcome {
            CheckOutcome::Pass
        }
        fn name(&self) -> &'static str {
            "AlwaysPass"
        }
    }

    fn blank_request(url: &str) -> Request {
        Request {
            method: "GET".into(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn bogus_test_short_circuits_without_running_checks() {
        let mut test = Test {
            name: "t".into(),
            description: None,
            request: blank_request("file:///does/not/matter"),
            checks: vec![Box::new(AlwaysPass)],
            extractors: Vec::new(),
            params: ExecutionParams::default(),
            variables: Default::default(),
            bogus: Some("missing required field".into()),
        };
        let mut scope = Scope::new();
        let result = TestEngine::new().run(&mut test, &mut scope).await;
        assert_eq!(result.status, Status::Bogus);
        assert!(result.checks.is_empty());
    }

    #[tokio::test]
    async fn unresolvable_variable_in_url_yields_bogus() {
        let mut test = Test {
            name: "t".into(),
            description: None,
            request: blank_request("file://{{missing_var}}"),
            checks: Vec::new(),
            extractors: Vec::new(),
            params: ExecutionParams::default(),
            variables: Default::default(),
            bogus: None,
        };
        let mut scope = Scope::new();
        let result = TestEngine::new().run(&mut test, &mut scope).await;
        assert_eq!(result.status, Status::Bogus);
    }
}
