use super::{Check, CheckOutcome};
use crate::conditions::Condition;
use crate::context::Scope;
use crate::engine::model::Response;
use crate::error::CheckError;
use serde::{Deserialize, Serialize};

/// Asserts a header's presence/absence, or its first value against a
/// `Condition`. `Absent=true` passes iff the header is missing; otherwise
/// an empty `Condition` means "presence only" (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
    pub name: String,
    pub condition: Condition,
    pub absent: bool,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            name: String::new(),
            condition: Condition::default(),
            absent: false,
        }
    }
}

impl Check for Header {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.name = scope.interpolate(&self.name)?;
        self.condition.interpolate(scope)
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        let value = response.header(&self.name);

        if self.absent {
            return match value {
                None => CheckOutcome::Pass,
                Some(v) => CheckOutcome::Fail(format!(
                    "header '{}' present with value '{}', expected absent",
                    self.name, v
                )),
            };
        }

        match value {
            None => CheckOutcome::Fail(format!("header '{}' not present", self.name)),
            Some(v) => {
                if self.condition.is_empty() {
                    return CheckOutcome::Pass;
                }
                match self.condition.matches(v) {
                    Ok(true) => CheckOutcome::Pass,
                    Ok(false) => CheckOutcome::Fail(format!(
                        "header '{}' value '{}' did not satisfy condition",
                        self.name, v
                    )),
                    Err(e) => CheckOutcome::Error(e),
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "Header"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::response;
    use crate::engine::model::HeaderMap;

    #[test]
    fn absent_true_passes_when_header_missing() {
        let check = Header {
            name: "x-trace".into(),
            absent: true,
            ..Default::default()
        };
        assert!(check.execute(&response(200, HeaderMap::new(), b"")).is_pass());
    }

    #[test]
    fn presence_only_condition_passes_on_any_value() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type".into(), vec!["text/plain".into()]);
        let check = Header {
            name: "content-type".into(),
            ..Default::default()
        };
        assert!(check.execute(&response(200, headers, b"")).is_pass());
    }

    #[test]
    fn condition_checked_against_first_value() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type".into(), vec!["application/json".into()]);
        let check = Header {
            name: "content-type".into(),
            condition: Condition {
                prefix: Some("application/".into()),
                ..Default::default()
            },
            absent: false,
        };
        assert!(check.execute(&response(200, headers, b"")).is_pass());
    }
}
