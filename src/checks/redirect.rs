use super::{Check, CheckOutcome};
use crate::conditions::Condition;
use crate::context::Scope;
use crate::engine::model::Response;
use crate::error::CheckError;
use serde::{Deserialize, Serialize};

/// Asserts the response followed at least one redirect (or exactly
/// `hops`, when set).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Redirect {
    pub hops: Option<usize>,
}

impl Default for Redirect {
    fn default() -> Self {
        Self { hops: None }
    }
}

impl Check for Redirect {
    fn execute(&self, response: &Response) -> CheckOutcome {
        let actual = response.redirect_chain.len();
        match self.hops {
            Some(expected) if actual != expected => CheckOutcome::Fail(format!(
                "expected {expected} redirect hop(s), got {actual}"
            )),
            Some(_) => CheckOutcome::Pass,
            None if actual == 0 => CheckOutcome::Fail("response was not redirected".into()),
            None => CheckOutcome::Pass,
        }
    }

    fn name(&self) -> &'static str {
        "Redirect"
    }
}

/// Applies a `Condition` to every URL visited along the redirect chain,
/// requiring at least one (or `condition.count`) to satisfy it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectChain {
    pub condition: Condition,
}

impl Default for RedirectChain {
    fn default() -> Self {
        Self {
            condition: Condition::default(),
        }
    }
}

impl Check for RedirectChain {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.condition.interpolate(scope)
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        match self
            .condition
            .matches_occurrences(response.redirect_chain.iter().map(String::as_str))
        {
            Ok(true) => CheckOutcome::Pass,
            Ok(false) => CheckOutcome::Fail("no hop in the redirect chain satisfied condition".into()),
            Err(e) => CheckOutcome::Error(e),
        }
    }

    fn name(&self) -> &'static str {
        "RedirectChain"
    }
}

/// Applies a `Condition` to the final URL reached (the last hop in the
/// chain, or the request URL itself if there were no redirects — the
/// engine records both in `redirect_chain`, see `adapters::HttpAdapter`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalURL {
    pub condition: Condition,
}

impl Default for FinalURL {
    fn default() -> Self {
        Self {
            condition: Condition::default(),
        }
    }
}

impl Check for FinalURL {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.condition.interpolate(scope)
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        let final_url = match response.redirect_chain.last() {
            Some(url) => url.as_str(),
            None => return CheckOutcome::Fail("no URL recorded for this response".into()),
        };
        match self.condition.matches(final_url) {
            Ok(true) => CheckOutcome::Pass,
            Ok(false) => CheckOutcome::Fail(format!(
                "final URL '{final_url}' did not satisfy condition"
            )),
            Err(e) => CheckOutcome::Error(e),
        }
    }

    fn name(&self) -> &'static str {
        "FinalURL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::{ok, response};
    use crate::engine::model::HeaderMap;

    fn redirected(chain: Vec<&str>) -> crate::engine::model::Response {
        let mut r = response(200, HeaderMap::new(), b"");
        r.redirect_chain = chain.into_iter().map(String::from).collect();
        r
    }

    #[test]
    fn redirect_requires_at_least_one_hop_by_default() {
        assert!(!Redirect::default().execute(&ok(b"")).is_pass());
        assert!(Redirect::default()
            .execute(&redirected(vec!["https://a.example/x"]))
            .is_pass());
    }

    #[test]
    fn redirect_exact_hop_count() {
        let check = Redirect { hops: Some(2) };
        assert!(check
            .execute(&redirected(vec!["https://a.example/1", "https://a.example/2"]))
            .is_pass());
        assert!(!check
            .execute(&redirected(vec!["https://a.example/1"]))
            .is_pass());
    }

    #[test]
    fn final_url_checks_last_hop() {
        let check = FinalURL {
            condition: Condition {
                suffix: Some("/done".into()),
                ..Default::default()
            },
        };
        assert!(check
            .execute(&redirected(vec!["https://a.example/start", "https://a.example/done"]))
            .is_pass());
    }
}
