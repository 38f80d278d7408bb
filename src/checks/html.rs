use super::{Check, CheckOutcome};
use crate::conditions::Condition;
use crate::context::Scope;
use crate::engine::model::Response;
use crate::error::{CheckError, ErrorCode};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// Selects elements with a CSS selector and requires at least one (or
/// `condition`'s `Count`) to satisfy `condition` against either the
/// element's inner text (`~text~` sentinel, spec §4.3) or its serialized
/// HTML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HTMLContains {
    pub selector: String,
    pub condition: Condition,
}

impl Default for HTMLContains {
    fn default() -> Self {
        Self {
            selector: String::new(),
            condition: Condition::default(),
        }
    }
}

impl Check for HTMLContains {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.selector = scope.interpolate(&self.selector)?;
        self.condition.interpolate(scope)
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        html_contains(response, &self.selector, &self.condition, false)
    }

    fn name(&self) -> &'static str {
        "HTMLContains"
    }
}

/// Same as `HTMLContains` but matches against the element's inner text
/// rather than its serialized HTML (the `~text~` form of the selector).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HTMLContainsText {
    pub selector: String,
    pub condition: Condition,
}

impl Default for HTMLContainsText {
    fn default() -> Self {
        Self {
            selector: String::new(),
            condition: Condition::default(),
        }
    }
}

impl Check for HTMLContainsText {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.selector = scope.interpolate(&self.selector)?;
        self.condition.interpolate(scope)
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        html_contains(response, &self.selector, &self.condition, true)
    }

    fn name(&self) -> &'static str {
        "HTMLContainsText"
    }
}

fn html_contains(
    response: &Response,
    selector: &str,
    condition: &Condition,
    text_only: bool,
) -> CheckOutcome {
    let body = match response.body_str() {
        Ok(b) => b,
        Err(e) => return CheckOutcome::Error(e),
    };
    let parsed_selector = match Selector::parse(selector) {
        Ok(s) => s,
        Err(e) => {
            return CheckOutcome::Error(CheckError::malformed(
                ErrorCode::MALFORMED_CHECK,
                format!("invalid CSS selector '{selector}': {e:?}"),
            ))
        }
    };
    let document = Html::parse_document(body);
    let candidates: Vec<String> = document
        .select(&parsed_selector)
        .map(|el| {
            if text_only {
                el.text().collect::<String>()
            } else {
                el.html()
            }
        })
        .collect();

    match condition.matches_occurrences(candidates.iter().map(String::as_str)) {
        Ok(true) => CheckOutcome::Pass,
        Ok(false) => CheckOutcome::Error(CheckError::NotFound(
            ErrorCode::CHECK_HTML,
            format!("selector '{selector}' found no element satisfying condition"),
        )),
        Err(e) => CheckOutcome::Error(e),
    }
}

/// Asserts a CSS selector matches at least one element (or exactly the
/// `count` given), without inspecting its content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HTMLTag {
    pub selector: String,
    pub count: Option<i64>,
}

impl Default for HTMLTag {
    fn default() -> Self {
        Self {
            selector: String::new(),
            count: None,
        }
    }
}

impl Check for HTMLTag {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.selector = scope.interpolate(&self.selector)?;
        Ok(())
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        let body = match response.body_str() {
            Ok(b) => b,
            Err(e) => return CheckOutcome::Error(e),
        };
        let parsed_selector = match Selector::parse(&self.selector) {
            Ok(s) => s,
            Err(e) => {
                return CheckOutcome::Error(CheckError::malformed(
                    ErrorCode::MALFORMED_CHECK,
                    format!("invalid CSS selector '{}': {e:?}", self.selector),
                ))
            }
        };
        let document = Html::parse_document(body);
        let found = document.select(&parsed_selector).count();
        let satisfied = match self.count {
            Some(-1) => found == 0,
            Some(n) if n > 0 => found == n as usize,
            _ => found >= 1,
        };
        if satisfied {
            CheckOutcome::Pass
        } else {
            CheckOutcome::Fail(format!(
                "selector '{}' matched {} element(s)",
                self.selector, found
            ))
        }
    }

    fn name(&self) -> &'static str {
        "HTMLTag"
    }
}

/// Parses the body as HTML5 and fails if the parser reported any error
/// token (`scraper`/`html5ever` are permissive, so this catches only
/// structurally broken markup, not missing-closing-tag leniency).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidHTML;

impl Check for ValidHTML {
    fn execute(&self, response: &Response) -> CheckOutcome {
        let body = match response.body_str() {
            Ok(b) => b,
            Err(e) => return CheckOutcome::Error(e),
        };
        let document = Html::parse_document(body);
        if document.errors.is_empty() {
            CheckOutcome::Pass
        } else {
            let messages: Vec<String> = document.errors.iter().map(|e| e.to_string()).collect();
            CheckOutcome::Fail(format!("HTML parse errors: {}", messages.join("; ")))
        }
    }

    fn name(&self) -> &'static str {
        "ValidHTML"
    }
}
