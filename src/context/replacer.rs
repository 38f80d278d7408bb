//! Compiles a template string into a sequence of literal/variable/NOW
//! segments once, so repeated interpolation of the same field (e.g. a
//! Test run Tries times in a retry loop) doesn't re-parse the template
//! on every pass.

use crate::error::CheckError;
use chrono::Duration as ChronoDuration;
use once_cell::sync::Lazy;
use regex::Regex;

/// `{{ ... }}` placeholder body, already split out of its braces.
#[derive(Debug, Clone)]
pub(crate) enum Token {
    Literal(String),
    Variable(String),
    Now {
        offset: ChronoDuration,
        layout: Option<String>,
    },
}

/// A compiled template: literal runs interleaved with resolved tokens.
#[derive(Debug, Clone)]
pub struct Replacer {
    tokens: Vec<Token>,
}

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid placeholder regex"));

static NOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^NOW(?:\s*([+-])\s*(\d+)\s*([smhd]))?(?:\s*\|\s*"([^"]*)")?$"#,
    )
    .expect("valid NOW regex")
});

impl Replacer {
    /// Parses `input` into a `Replacer`. Never fails: unrecognized bodies
    /// are treated as plain variable names and only error at render time
    /// if the name can't be resolved.
    pub fn compile(input: &str) -> Self {
        let mut tokens = Vec::new();
        let mut last_end = 0;

        for cap in PLACEHOLDER_RE.captures_iter(input) {
            let whole = cap.get(0).expect("group 0 always present");
            if whole.start() > last_end {
                tokens.push(Token::Literal(input[last_end..whole.start()].to_string()));
            }
            let body = cap.get(1).expect("placeholder body").as_str().trim();
            tokens.push(Self::parse_body(body));
            last_end = whole.end();
        }
        if last_end < input.len() {
            tokens.push(Token::Literal(input[last_end..].to_string()));
        }

        Self { tokens }
    }

    fn parse_body(body: &str) -> Token {
        if let Some(caps) = NOW_RE.captures(body) {
            let offset = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(sign), Some(amount), Some(unit)) => {
                    let n: i64 = amount.as_str().parse().unwrap_or(0);
                    let n = if sign.as_str() == "-" { -n } else { n };
                    match unit.as_str() {
                        "s" => ChronoDuration::seconds(n),
                        "m" => ChronoDuration::minutes(n),
                        "h" => ChronoDuration::hours(n),
                        "d" => ChronoDuration::days(n),
                        _ => ChronoDuration::zero(),
                    }
                }
                _ => ChronoDuration::zero(),
            };
            let layout = caps.get(4).map(|m| m.as_str().to_string());
            return Token::Now { offset, layout };
        }
        Token::Variable(body.to_string())
    }

    pub fn render(&self, scope: &super::Scope) -> Result<String, CheckError> {
        let mut out = String::new();
        for token in &self.tokens {
            out.push_str(&scope.resolve(token)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Scope;

    #[test]
    fn plain_literal_passes_through() {
        let r = Replacer::compile("no placeholders here");
        let scope = Scope::new();
        assert_eq!(r.render(&scope).unwrap(), "no placeholders here");
    }

    #[test]
    fn parses_now_with_offset_and_layout() {
        let r = Replacer::compile(r#"{{NOW + 2h | "%Y-%m-%d"}}"#);
        assert_eq!(r.tokens.len(), 1);
        match &r.tokens[0] {
            Token::Now { offset, layout } => {
                assert_eq!(*offset, ChronoDuration::hours(2));
                assert_eq!(layout.as_deref(), Some("%Y-%m-%d"));
            }
            _ => panic!("expected Now token"),
        }
    }

    #[test]
    fn parses_bare_now_without_offset_or_layout() {
        let r = Replacer::compile("{{NOW}}");
        match &r.tokens[0] {
            Token::Now { offset, layout } => {
                assert_eq!(*offset, ChronoDuration::zero());
                assert!(layout.is_none());
            }
            _ => panic!("expected Now token"),
        }
    }

    #[test]
    fn mixed_literal_and_variable_segments() {
        let r = Replacer::compile("id={{COUNTER}}&name={{user}}");
        assert_eq!(r.tokens.len(), 4);
    }
}
