//! Composite predicate shared by every Check family that matches strings
//! against an expected value ("Condition" in the declarative document
//! format: `Is`/`Contains`/`Prefix`/`Suffix`/`Regexp`/`Count`/etc.).
//!
//! Modeled on the assertion-operator matching style of the original
//! `validate_assertions` (one match arm per operator, folding case-folding
//! and numeric-comparison helpers into small free functions), generalized
//! from single fixed-operator assertions into one composite struct so a
//! Check can combine several predicates against the same extracted text.

use crate::context::Scope;
use crate::error::{CheckError, ErrorCode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// One string-matching predicate. Fields are all optional; an empty
/// `Condition` (no field set) matches anything, mirroring an assertion
/// with no operator restricting it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Condition {
    pub equals: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub contains: Option<String>,
    pub regexp: Option<String>,
    /// Minimum required number of matches when this condition is used to
    /// count occurrences rather than test a single string (Links, Count
    /// family of Body/HTML checks). `-1` asserts zero occurrences;
    /// `0`/unset both mean "at least one" (see DESIGN.md open question).
    pub count: Option<i64>,
    pub case_insensitive: bool,
}

static REGEX_CACHE: Lazy<RwLock<HashMap<String, Regex>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn compiled_regex(pattern: &str) -> Result<Regex, CheckError> {
    if let Some(re) = REGEX_CACHE.read().unwrap().get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern).map_err(|e| {
        CheckError::malformed(
            ErrorCode::MALFORMED_CHECK,
            format!("invalid regexp '{pattern}': {e}"),
        )
    })?;
    REGEX_CACHE
        .write()
        .unwrap()
        .insert(pattern.to_string(), re.clone());
    Ok(re)
}

impl Condition {
    /// Expands `{{...}}` tokens across every string-valued field, called
    /// by the owning Check's own `interpolate` before `execute` so a
    /// Condition can reference a value a Setup element's extractor wrote
    /// earlier in the Suite (spec §4.6 step 3).
    pub fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        for field in [
            &mut self.equals,
            &mut self.prefix,
            &mut self.suffix,
            &mut self.contains,
            &mut self.regexp,
        ] {
            if let Some(value) = field {
                *value = scope.interpolate(value)?;
            }
        }
        Ok(())
    }

    /// Tests a single candidate string against every set field. All set
    /// fields must match (conjunction), matching how the original
    /// assertion evaluator required every named criterion in one
    /// assertion to hold before it counted as passed.
    pub fn matches(&self, candidate: &str) -> Result<bool, CheckError> {
        let (candidate, needle_case) = if self.case_insensitive {
            (candidate.to_lowercase(), true)
        } else {
            (candidate.to_string(), false)
        };
        let fold = |s: &str| if needle_case { s.to_lowercase() } else { s.to_string() };

        if let Some(expected) = &self.equals {
            if candidate != fold(expected) {
                return Ok(false);
            }
        }
        if let Some(expected) = &self.prefix {
            if !candidate.starts_with(&fold(expected)) {
                return Ok(false);
            }
        }
        if let Some(expected) = &self.suffix {
            if !candidate.ends_with(&fold(expected)) {
                return Ok(false);
            }
        }
        if let Some(expected) = &self.contains {
            if !candidate.contains(&fold(expected)) {
                return Ok(false);
            }
        }
        if let Some(pattern) = &self.regexp {
            let re = compiled_regex(pattern)?;
            if !re.is_match(&candidate) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluates this condition against a collection of candidate
    /// occurrences (e.g. every substring matched by a selector), folding
    /// `count` into the pass/fail decision.
    ///
    /// `Count: -1` requires zero matching occurrences; a positive `Count`
    /// requires exactly that many; unset requires at least one.
    pub fn matches_occurrences<'a, I>(&self, candidates: I) -> Result<bool, CheckError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut matched = 0i64;
        for candidate in candidates {
            if self.matches(candidate)? {
                matched += 1;
            }
        }
        match self.count {
            Some(-1) => Ok(matched == 0),
            Some(n) if n > 0 => Ok(matched == n),
            _ => Ok(matched >= 1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_none()
            && self.prefix.is_none()
            && self.suffix.is_none()
            && self.contains.is_none()
            && self.regexp.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_condition_matches_anything() {
        let c = Condition::default();
        assert!(c.matches("anything").unwrap());
    }

    #[test]
    fn contains_and_prefix_conjunction() {
        let c = Condition {
            prefix: Some("hello".into()),
            contains: Some("world".into()),
            ..Default::default()
        };
        assert!(c.matches("hello world").unwrap());
        assert!(!c.matches("world hello").unwrap());
    }

    #[test]
    fn case_insensitive_matching() {
        let c = Condition {
            equals: Some("OK".into()),
            case_insensitive: true,
            ..Default::default()
        };
        assert!(c.matches("ok").unwrap());
    }

    #[test]
    fn regexp_invalid_pattern_errors() {
        let c = Condition {
            regexp: Some("(unterminated".into()),
            ..Default::default()
        };
        assert!(c.matches("anything").is_err());
    }

    #[test]
    fn count_minus_one_asserts_zero_occurrences() {
        let c = Condition {
            contains: Some("bad".into()),
            count: Some(-1),
            ..Default::default()
        };
        assert!(c.matches_occurrences(vec!["good", "fine"]).unwrap());
        assert!(!c.matches_occurrences(vec!["bad thing"]).unwrap());
    }

    #[test]
    fn count_unset_requires_at_least_one() {
        let c = Condition {
            contains: Some("x".into()),
            ..Default::default()
        };
        assert!(!c.matches_occurrences(vec!["nope", "none"]).unwrap());
        assert!(c.matches_occurrences(vec!["has x"]).unwrap());
    }

    #[test]
    fn count_n_requires_exactly_n_matches() {
        let c = Condition {
            contains: Some("a".into()),
            count: Some(2),
            ..Default::default()
        };
        assert!(c.matches_occurrences(vec!["a", "a", "b"]).unwrap());
        assert!(!c.matches_occurrences(vec!["a", "b", "b"]).unwrap());
        assert!(!c.matches_occurrences(vec!["a", "a", "a"]).unwrap());
    }
}
