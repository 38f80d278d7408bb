use super::{Check, CheckOutcome};
use crate::context::Scope;
use crate::engine::model::Response;
use crate::error::CheckError;

/// Passes iff at least one of its nested checks passes. Runs every nested
/// check unconditionally (no short-circuit) so `prepare` failures and
/// reporting stay uniform; only the pass/fail decision short-circuits.
pub struct AnyOne {
    pub checks: Vec<Box<dyn Check>>,
}

impl Check for AnyOne {
    fn prepare(&mut self) -> Result<(), CheckError> {
        for check in self.checks.iter_mut() {
            check.prepare()?;
        }
        Ok(())
    }

    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        for check in self.checks.iter_mut() {
            check.interpolate(scope)?;
        }
        Ok(())
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        if self.checks.is_empty() {
            return CheckOutcome::Fail("AnyOne has no nested checks".into());
        }
        let mut last_failure = None;
        for check in &self.checks {
            match check.execute(response) {
                CheckOutcome::Pass => return CheckOutcome::Pass,
                other => last_failure = Some(other),
            }
        }
        last_failure.unwrap_or(CheckOutcome::Fail("no nested check passed".into()))
    }

    fn name(&self) -> &'static str {
        "AnyOne"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::status_code::StatusCode;
    use crate::checks::test_support::ok;

    #[test]
    fn passes_if_any_nested_check_passes() {
        let check = AnyOne {
            checks: vec![
                Box::new(StatusCode { expected: 404 }),
                Box::new(StatusCode { expected: 200 }),
            ],
        };
        assert!(check.execute(&ok(b"")).is_pass());
    }

    #[test]
    fn fails_if_every_nested_check_fails() {
        let check = AnyOne {
            checks: vec![
                Box::new(StatusCode { expected: 404 }),
                Box::new(StatusCode { expected: 500 }),
            ],
        };
        assert!(!check.execute(&ok(b"")).is_pass());
    }

    #[test]
    fn empty_nested_set_fails() {
        let check = AnyOne { checks: vec![] };
        assert!(!check.execute(&ok(b"")).is_pass());
    }
}
