use super::{Check, CheckOutcome};
use crate::conditions::Condition;
use crate::context::Scope;
use crate::engine::model::Response;
use crate::error::{CheckError, ErrorCode};
use serde::{Deserialize, Serialize};

/// Applies a `Condition` to the raw body bytes (decoded lossily for
/// matching purposes — the same way `BodyContains` treats the body as
/// text). Fails with a distinguished `BadBody` outcome if the response
/// never finished reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    pub condition: Condition,
}

impl Check for Body {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.condition.interpolate(scope)
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        if let Some(err) = &response.body_error {
            return CheckOutcome::Error(CheckError::BadBody(ErrorCode::CHECK_BODY, err.clone()));
        }
        let text = String::from_utf8_lossy(&response.body);
        match self.condition.matches(&text) {
            Ok(true) => CheckOutcome::Pass,
            Ok(false) => CheckOutcome::Fail("body did not satisfy condition".into()),
            Err(e) => CheckOutcome::Error(e),
        }
    }

    fn name(&self) -> &'static str {
        "Body"
    }
}

/// Passes iff the body is valid UTF-8 with no byte-order mark, reporting
/// the offending byte offset on failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UTF8Encoded;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

impl Check for UTF8Encoded {
    fn execute(&self, response: &Response) -> CheckOutcome {
        if response.body.starts_with(&UTF8_BOM) {
            return CheckOutcome::Fail("body starts with a UTF-8 byte-order mark".into());
        }
        match std::str::from_utf8(&response.body) {
            Ok(_) => CheckOutcome::Pass,
            Err(e) => CheckOutcome::Fail(format!(
                "body is not valid UTF-8 at byte offset {}",
                e.valid_up_to()
            )),
        }
    }

    fn name(&self) -> &'static str {
        "UTF8Encoded"
    }
}

/// Shorthand for `Body` + `Contains` with `Count` semantics, yielding the
/// check set's distinguished `NotFound`/`FoundForbidden` outcomes rather
/// than a generic `Fail` (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyContains {
    pub text: String,
    pub count: Option<i64>,
    pub case_insensitive: bool,
}

impl Default for BodyContains {
    fn default() -> Self {
        Self {
            text: String::new(),
            count: None,
            case_insensitive: false,
        }
    }
}

impl Check for BodyContains {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.text = scope.interpolate(&self.text)?;
        Ok(())
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        if let Some(err) = &response.body_error {
            return CheckOutcome::Error(CheckError::BadBody(ErrorCode::CHECK_BODY, err.clone()));
        }
        let text = String::from_utf8_lossy(&response.body);
        let occurrences = count_occurrences(&text, &self.text, self.case_insensitive);

        let satisfied = match self.count {
            Some(-1) => occurrences == 0,
            Some(n) if n > 0 => occurrences == n as usize,
            _ => occurrences >= 1,
        };

        if satisfied {
            return CheckOutcome::Pass;
        }

        if self.count == Some(-1) {
            CheckOutcome::Error(CheckError::FoundForbidden(
                ErrorCode::CHECK_BODY,
                format!("forbidden text '{}' present", self.text),
            ))
        } else if occurrences == 0 {
            CheckOutcome::Error(CheckError::NotFound(
                ErrorCode::CHECK_BODY,
                format!("required text '{}' not found", self.text),
            ))
        } else {
            CheckOutcome::Fail(format!(
                "expected {} occurrence(s) of '{}', found {}",
                self.count.unwrap_or(1),
                self.text,
                occurrences
            ))
        }
    }

    fn name(&self) -> &'static str {
        "BodyContains"
    }
}

fn count_occurrences(haystack: &str, needle: &str, case_insensitive: bool) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let (haystack, needle) = if case_insensitive {
        (haystack.to_lowercase(), needle.to_lowercase())
    } else {
        (haystack.to_string(), needle.to_string())
    };
    haystack.matches(needle.as_str()).count()
}
