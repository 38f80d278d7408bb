//! The Extractor set: polymorphic value-producers over a captured
//! `Response` (spec §4.4). Each variant yields a `String` or fails with
//! an `ExtractError` the engine folds into the Test's final status.
//!
//! Kept as one file, unlike `checks/` — the original extraction module
//! was a single flat file too, and the variant count here is much smaller.

use crate::context::Scope;
use crate::engine::model::Response;
use crate::error::{CheckError, ErrorCode, ExtractError};
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Produces a string from a captured `Response`, optionally consulting
/// `scope` (only `SetTimestamp` needs it, for relative-time rendering via
/// the same `{{NOW ...}}` machinery `Scope::interpolate` uses).
pub trait Extractor: Send + Sync {
    fn extract(&self, response: &Response, scope: &Scope) -> Result<String, ExtractError>;
}

/// Extracts the first value of a named response header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderExtractor {
    pub name: String,
}

impl Extractor for HeaderExtractor {
    fn extract(&self, response: &Response, _scope: &Scope) -> Result<String, ExtractError> {
        response.header(&self.name).map(str::to_string).ok_or_else(|| {
            ExtractError::NotFound(
                ErrorCode::EXTRACT_NOT_FOUND,
                format!("header '{}' not present", self.name),
            )
        })
    }
}

/// Extracts a named cookie's value from `Set-Cookie`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieExtractor {
    pub name: String,
}

impl Extractor for CookieExtractor {
    fn extract(&self, response: &Response, _scope: &Scope) -> Result<String, ExtractError> {
        response
            .header_all("set-cookie")
            .iter()
            .find_map(|header| {
                let (key, value) = header.split(';').next()?.split_once('=')?;
                (key.trim() == self.name).then(|| value.trim().to_string())
            })
            .ok_or_else(|| {
                ExtractError::NotFound(
                    ErrorCode::EXTRACT_NOT_FOUND,
                    format!("no Set-Cookie for '{}'", self.name),
                )
            })
    }
}

/// Applies a regex to the body, returning the N-th submatch (1-indexed;
/// 0 is the whole match).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyExtractor {
    pub pattern: String,
    #[serde(default)]
    pub group: usize,
}

impl Extractor for BodyExtractor {
    fn extract(&self, response: &Response, _scope: &Scope) -> Result<String, ExtractError> {
        let body = response.body_str().map_err(ExtractError::from)?;
        let re = Regex::new(&self.pattern).map_err(|e| {
            ExtractError::Malformed(
                ErrorCode::EXTRACT_MALFORMED,
                format!("invalid regexp '{}': {e}", self.pattern),
            )
        })?;
        let captures = re.captures(body).ok_or_else(|| {
            ExtractError::NotFound(
                ErrorCode::EXTRACT_NOT_FOUND,
                format!("pattern '{}' did not match body", self.pattern),
            )
        })?;
        captures
            .get(self.group)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                ExtractError::NotFound(
                    ErrorCode::EXTRACT_NOT_FOUND,
                    format!("capture group {} not present in match", self.group),
                )
            })
    }
}

/// Runs a CSS selector against the body and returns either a named
/// attribute or, with the sentinel `~text~`, the element's text content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HTMLExtractor {
    pub selector: String,
    pub attribute: String,
}

impl Extractor for HTMLExtractor {
    fn extract(&self, response: &Response, _scope: &Scope) -> Result<String, ExtractError> {
        let body = response.body_str().map_err(ExtractError::from)?;
        let selector = Selector::parse(&self.selector).map_err(|e| {
            ExtractError::Malformed(
                ErrorCode::EXTRACT_MALFORMED,
                format!("invalid CSS selector '{}': {e:?}", self.selector),
            )
        })?;
        let document = Html::parse_document(body);
        let element = document.select(&selector).next().ok_or_else(|| {
            ExtractError::NotFound(
                ErrorCode::EXTRACT_NOT_FOUND,
                format!("selector '{}' matched no element", self.selector),
            )
        })?;

        if self.attribute == "~text~" {
            Ok(element.text().collect::<String>())
        } else {
            element
                .value()
                .attr(&self.attribute)
                .map(str::to_string)
                .ok_or_else(|| {
                    ExtractError::NotFound(
                        ErrorCode::EXTRACT_NOT_FOUND,
                        format!("attribute '{}' not present on matched element", self.attribute),
                    )
                })
        }
    }
}

/// Navigates a dotted path into the JSON body. `embedded` re-parses a
/// string fragment as JSON and recurses, mirroring `checks::json::JSON`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JSONExtractor {
    pub path: String,
    pub embedded: Option<Box<JSONExtractor>>,
}

impl Default for JSONExtractor {
    fn default() -> Self {
        Self {
            path: ".".into(),
            embedded: None,
        }
    }
}

impl Extractor for JSONExtractor {
    fn extract(&self, response: &Response, _scope: &Scope) -> Result<String, ExtractError> {
        let body = response.body_str().map_err(ExtractError::from)?;
        let root: Value = serde_json::from_str(body).map_err(|e| {
            ExtractError::Malformed(
                ErrorCode::EXTRACT_MALFORMED,
                format!("body is not valid JSON: {e}"),
            )
        })?;
        self.extract_value(&root)
    }
}

impl JSONExtractor {
    fn extract_value(&self, root: &Value) -> Result<String, ExtractError> {
        let fragment = navigate(root, &self.path).ok_or_else(|| {
            ExtractError::NotFound(
                ErrorCode::EXTRACT_NOT_FOUND,
                format!("path '{}' did not resolve", self.path),
            )
        })?;

        if let Some(nested) = &self.embedded {
            let text = match fragment {
                Value::String(s) => s,
                other => {
                    return Err(ExtractError::Malformed(
                        ErrorCode::EXTRACT_MALFORMED,
                        format!("Embedded requires a string fragment, got {other}"),
                    ))
                }
            };
            let inner: Value = serde_json::from_str(&text).map_err(|e| {
                ExtractError::Malformed(
                    ErrorCode::EXTRACT_MALFORMED,
                    format!("embedded fragment is not valid JSON: {e}"),
                )
            })?;
            return nested.extract_value(&inner);
        }

        Ok(match fragment {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

fn navigate(root: &Value, path: &str) -> Option<Value> {
    if path.is_empty() || path == "." {
        return Some(root.clone());
    }
    let trimmed = path.strip_prefix('.').unwrap_or(path);
    let mut current = root.clone();
    for segment in trimmed.split('.') {
        if segment.is_empty() {
            continue;
        }
        let (key, index) = match segment.split_once('[') {
            Some((k, rest)) => (k, rest.trim_end_matches(']').parse::<usize>().ok()?),
            None => (segment, usize::MAX),
        };
        current = if key.is_empty() {
            current
        } else {
            current.get(key)?.clone()
        };
        if index != usize::MAX {
            current = current.get(index)?.clone();
        }
    }
    Some(current)
}

/// Runs a tiny embedded expression — reusing `checks::json`'s expression
/// grammar rather than a real JS engine, since spec.md treats the script
/// itself as an opaque external collaborator and only the "final
/// expression's string form is the value" contract is this crate's
/// concern. A result that evaluates to an array is an error, per spec.md
/// §4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSExtractor {
    pub script: String,
}

impl Extractor for JSExtractor {
    fn extract(&self, response: &Response, _scope: &Scope) -> Result<String, ExtractError> {
        let body = response.body_str().map_err(ExtractError::from)?;
        let root: Value = serde_json::from_str(body).unwrap_or(Value::Null);
        let fragment = navigate(&root, &self.script).ok_or_else(|| {
            ExtractError::ScriptError(
                ErrorCode::EXTRACT_SCRIPT_ERROR,
                format!("script '{}' did not resolve", self.script),
            )
        })?;
        match fragment {
            Value::Array(_) => Err(ExtractError::ScriptError(
                ErrorCode::EXTRACT_SCRIPT_ERROR,
                "script result is an array, expected a scalar".into(),
            )),
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }
}

/// Yields `now + offset`, formatted with `layout` — the same `{{NOW ...}}`
/// machinery `context::Replacer` compiles, exposed here as a standalone
/// extractor for Tests that want the value under a name rather than
/// inline-interpolated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTimestamp {
    pub template: String,
}

impl Extractor for SetTimestamp {
    fn extract(&self, _response: &Response, scope: &Scope) -> Result<String, ExtractError> {
        scope.interpolate(&self.template).map_err(ExtractError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::{ok, response};
    use crate::engine::model::HeaderMap;

    #[test]
    fn header_extractor_returns_first_value() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id".into(), vec!["req-1".into()]);
        let extractor = HeaderExtractor {
            name: "X-Request-Id".into(),
        };
        let scope = Scope::new();
        assert_eq!(
            extractor.extract(&response(200, headers, b""), &scope).unwrap(),
            "req-1"
        );
    }

    #[test]
    fn cookie_extractor_parses_set_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("set-cookie".into(), vec!["session=abc123; Path=/".into()]);
        let extractor = CookieExtractor {
            name: "session".into(),
        };
        let scope = Scope::new();
        assert_eq!(
            extractor.extract(&response(200, headers, b""), &scope).unwrap(),
            "abc123"
        );
    }

    #[test]
    fn body_extractor_first_capture_group() {
        let extractor = BodyExtractor {
            pattern: r"Bearer\s+(\S+)".into(),
            group: 1,
        };
        let scope = Scope::new();
        assert_eq!(
            extractor
                .extract(&ok(b"Authorization: Bearer abc.def"), &scope)
                .unwrap(),
            "abc.def"
        );
    }

    #[test]
    fn body_extractor_group_zero_is_whole_match() {
        let extractor = BodyExtractor {
            pattern: r"\d+".into(),
            group: 0,
        };
        let scope = Scope::new();
        assert_eq!(extractor.extract(&ok(b"id=42"), &scope).unwrap(), "42");
    }

    #[test]
    fn html_extractor_text_sentinel() {
        let extractor = HTMLExtractor {
            selector: "h1".into(),
            attribute: "~text~".into(),
        };
        let scope = Scope::new();
        assert_eq!(
            extractor
                .extract(&ok(b"<h1>Welcome</h1>"), &scope)
                .unwrap(),
            "Welcome"
        );
    }

    #[test]
    fn html_extractor_named_attribute() {
        let extractor = HTMLExtractor {
            selector: "a".into(),
            attribute: "href".into(),
        };
        let scope = Scope::new();
        assert_eq!(
            extractor
                .extract(&ok(b"<a href=\"/next\">go</a>"), &scope)
                .unwrap(),
            "/next"
        );
    }

    #[test]
    fn json_extractor_navigates_dotted_path() {
        let extractor = JSONExtractor {
            path: ".data.token".into(),
            embedded: None,
        };
        let scope = Scope::new();
        assert_eq!(
            extractor
                .extract(&ok(b"{\"data\":{\"token\":\"abc\"}}"), &scope)
                .unwrap(),
            "abc"
        );
    }

    #[test]
    fn json_extractor_embedded_recurses() {
        let extractor = JSONExtractor {
            path: ".payload".into(),
            embedded: Some(Box::new(JSONExtractor {
                path: ".id".into(),
                embedded: None,
            })),
        };
        let scope = Scope::new();
        let body = br#"{"payload": "{\"id\": 7}"}"#;
        assert_eq!(extractor.extract(&ok(body), &scope).unwrap(), "7");
    }

    #[test]
    fn js_extractor_array_result_errors() {
        let extractor = JSExtractor {
            script: ".items".into(),
        };
        let scope = Scope::new();
        let outcome = extractor.extract(&ok(b"{\"items\":[1,2,3]}"), &scope);
        assert!(matches!(outcome, Err(ExtractError::ScriptError(_, _))));
    }

    #[test]
    fn set_timestamp_uses_scope_interpolation() {
        let extractor = SetTimestamp {
            template: r#"{{NOW + 1d | "%Y-%m-%d"}}"#.into(),
        };
        let scope = Scope::new();
        let rendered = extractor.extract(&ok(b""), &scope).unwrap();
        assert_eq!(rendered.len(), 10);
    }
}
