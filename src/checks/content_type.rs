use super::{Check, CheckOutcome};
use crate::context::Scope;
use crate::engine::model::Response;
use crate::error::CheckError;
use serde::{Deserialize, Serialize};

/// Media type equals or has-prefix matching against `Content-Type`,
/// ignoring any `; charset=...` parameter when `prefix` is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentType {
    pub equals: Option<String>,
    pub prefix: Option<String>,
}

impl Default for ContentType {
    fn default() -> Self {
        Self {
            equals: None,
            prefix: None,
        }
    }
}

impl Check for ContentType {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        if let Some(v) = &mut self.equals {
            *v = scope.interpolate(v)?;
        }
        if let Some(v) = &mut self.prefix {
            *v = scope.interpolate(v)?;
        }
        Ok(())
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        let actual = match response.header("content-type") {
            Some(v) => v,
            None => return CheckOutcome::Fail("no Content-Type header present".into()),
        };
        let media_type = actual.split(';').next().unwrap_or(actual).trim();

        if let Some(expected) = &self.equals {
            if media_type != expected {
                return CheckOutcome::Fail(format!(
                    "expected Content-Type '{expected}', got '{media_type}'"
                ));
            }
        }
        if let Some(expected_prefix) = &self.prefix {
            if !media_type.starts_with(expected_prefix.as_str()) {
                return CheckOutcome::Fail(format!(
                    "Content-Type '{media_type}' does not start with '{expected_prefix}'"
                ));
            }
        }
        CheckOutcome::Pass
    }

    fn name(&self) -> &'static str {
        "ContentType"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::response;
    use crate::engine::model::HeaderMap;

    #[test]
    fn equals_ignores_charset_parameter() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type".into(),
            vec!["application/json; charset=utf-8".into()],
        );
        let check = ContentType {
            equals: Some("application/json".into()),
            prefix: None,
        };
        assert!(check.execute(&response(200, headers, b"")).is_pass());
    }

    #[test]
    fn prefix_matches_subtype_family() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type".into(), vec!["text/html".into()]);
        let check = ContentType {
            equals: None,
            prefix: Some("text/".into()),
        };
        assert!(check.execute(&response(200, headers, b"")).is_pass());
    }

    #[test]
    fn missing_header_fails() {
        let check = ContentType {
            equals: Some("text/plain".into()),
            prefix: None,
        };
        assert!(!check
            .execute(&response(200, HeaderMap::new(), b""))
            .is_pass());
    }
}
