use super::{Check, CheckOutcome};
use crate::engine::model::Response;
use serde::{Deserialize, Serialize};

/// Passes iff the response status code equals `expected` exactly — no
/// range matching (spec §4.3: "no range matching").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCode {
    pub expected: u16,
}

impl Check for StatusCode {
    fn execute(&self, response: &Response) -> CheckOutcome {
        if response.status_code == self.expected {
            CheckOutcome::Pass
        } else {
            CheckOutcome::Fail(format!(
                "expected status {}, got {}",
                self.expected, response.status_code
            ))
        }
    }

    fn name(&self) -> &'static str {
        "StatusCode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::response;
    use crate::engine::model::HeaderMap;

    #[test]
    fn passes_on_exact_match() {
        let check = StatusCode { expected: 200 };
        assert!(check.execute(&response(200, HeaderMap::new(), b"")).is_pass());
    }

    #[test]
    fn fails_on_mismatch_even_within_same_class() {
        let check = StatusCode { expected: 200 };
        assert!(!check
            .execute(&response(201, HeaderMap::new(), b""))
            .is_pass());
    }
}
