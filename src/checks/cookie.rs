use super::{Check, CheckOutcome};
use crate::conditions::Condition;
use crate::context::Scope;
use crate::engine::model::Response;
use crate::error::CheckError;
use serde::{Deserialize, Serialize};

/// Asserts a `Set-Cookie` response header names `name`, optionally matching
/// its value against `condition`. Only inspects cookies the server is
/// setting on this response, not the jar carried forward by the suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetCookie {
    pub name: String,
    pub condition: Condition,
}

impl Default for SetCookie {
    fn default() -> Self {
        Self {
            name: String::new(),
            condition: Condition::default(),
        }
    }
}

impl Check for SetCookie {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.name = scope.interpolate(&self.name)?;
        self.condition.interpolate(scope)
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        match find_cookie_value(response, &self.name) {
            None => CheckOutcome::Fail(format!("no Set-Cookie for '{}'", self.name)),
            Some(value) => {
                if self.condition.is_empty() {
                    return CheckOutcome::Pass;
                }
                match self.condition.matches(&value) {
                    Ok(true) => CheckOutcome::Pass,
                    Ok(false) => CheckOutcome::Fail(format!(
                        "cookie '{}' value '{}' did not satisfy condition",
                        self.name, value
                    )),
                    Err(e) => CheckOutcome::Error(e),
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "SetCookie"
    }
}

/// Asserts the server is clearing cookie `name` — a `Set-Cookie` whose
/// `Max-Age=0` or `Expires` is in the past. We only check for the
/// conventional `Max-Age=0` marker, the same signal `reqwest`'s cookie
/// store itself treats as a deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteCookie {
    pub name: String,
}

impl Check for DeleteCookie {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.name = scope.interpolate(&self.name)?;
        Ok(())
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        match find_cookie_header(response, &self.name) {
            None => CheckOutcome::Fail(format!("no Set-Cookie for '{}'", self.name)),
            Some(header) => {
                if header.to_lowercase().contains("max-age=0") {
                    CheckOutcome::Pass
                } else {
                    CheckOutcome::Fail(format!(
                        "cookie '{}' is set but not marked for deletion: '{}'",
                        self.name, header
                    ))
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "DeleteCookie"
    }
}

fn find_cookie_header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response
        .header_all("set-cookie")
        .iter()
        .map(String::as_str)
        .find(|header| {
            header
                .split(';')
                .next()
                .and_then(|pair| pair.split_once('='))
                .map(|(k, _)| k.trim() == name)
                .unwrap_or(false)
        })
}

fn find_cookie_value(response: &Response, name: &str) -> Option<String> {
    find_cookie_header(response, name).and_then(|header| {
        header
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, v)| v.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::response;
    use crate::engine::model::HeaderMap;

    fn with_set_cookie(value: &str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert("set-cookie".into(), vec![value.to_string()]);
        response(200, headers, b"")
    }

    #[test]
    fn set_cookie_matches_value_condition() {
        let check = SetCookie {
            name: "session".into(),
            condition: Condition {
                prefix: Some("abc".into()),
                ..Default::default()
            },
        };
        assert!(check
            .execute(&with_set_cookie("session=abc123; Path=/"))
            .is_pass());
    }

    #[test]
    fn set_cookie_missing_fails() {
        let check = SetCookie {
            name: "session".into(),
            condition: Condition::default(),
        };
        assert!(!check
            .execute(&with_set_cookie("other=value"))
            .is_pass());
    }

    #[test]
    fn delete_cookie_detects_max_age_zero() {
        let check = DeleteCookie { name: "session".into() };
        assert!(check
            .execute(&with_set_cookie("session=; Max-Age=0; Path=/"))
            .is_pass());
    }

    #[test]
    fn delete_cookie_rejects_live_cookie() {
        let check = DeleteCookie { name: "session".into() };
        assert!(!check
            .execute(&with_set_cookie("session=abc; Path=/"))
            .is_pass());
    }
}
