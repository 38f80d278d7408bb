use super::{Check, CheckOutcome};
use crate::conditions::Condition;
use crate::context::Scope;
use crate::engine::model::Response;
use crate::error::{CheckError, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Navigates the body via a dotted path (`.` means "whole document") and
/// applies a `Condition` to the fragment's string form. `embedded` re-parses
/// a string fragment as JSON and recurses one level, the way the original
/// navigator lets a stringified sub-document be inspected in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JSON {
    pub path: String,
    pub separator: Option<char>,
    pub condition: Condition,
    pub embedded: Option<Box<JSON>>,
}

impl Default for JSON {
    fn default() -> Self {
        Self {
            path: ".".into(),
            separator: None,
            condition: Condition::default(),
            embedded: None,
        }
    }
}

impl Check for JSON {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        self.path = scope.interpolate(&self.path)?;
        self.condition.interpolate(scope)?;
        if let Some(nested) = &mut self.embedded {
            nested.interpolate(scope)?;
        }
        Ok(())
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        let body = match response.body_str() {
            Ok(b) => b,
            Err(e) => return CheckOutcome::Error(e),
        };
        let root: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                return CheckOutcome::Error(CheckError::CantCheck(
                    ErrorCode::CHECK_JSON,
                    format!("body is not valid JSON: {e}"),
                ))
            }
        };
        self.check_value(&root)
    }

    fn name(&self) -> &'static str {
        "JSON"
    }
}

impl JSON {
    fn check_value(&self, root: &Value) -> CheckOutcome {
        let separator = self.separator.unwrap_or('.');
        let fragment = match navigate(root, &self.path, separator) {
            Some(v) => v,
            None => {
                return CheckOutcome::Error(CheckError::NotFound(
                    ErrorCode::CHECK_JSON,
                    format!("path '{}' did not resolve", self.path),
                ))
            }
        };

        if let Some(nested) = &self.embedded {
            let text = match fragment {
                Value::String(s) => s,
                other => {
                    return CheckOutcome::Error(CheckError::malformed(
                        ErrorCode::MALFORMED_CHECK,
                        format!("Embedded requires a string fragment, got {other}"),
                    ))
                }
            };
            let inner: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    return CheckOutcome::Error(CheckError::CantCheck(
                        ErrorCode::CHECK_JSON,
                        format!("embedded fragment is not valid JSON: {e}"),
                    ))
                }
            };
            return nested.check_value(&inner);
        }

        let candidate = scalar_string(&fragment);
        match self.condition.matches(&candidate) {
            Ok(true) => CheckOutcome::Pass,
            Ok(false) => CheckOutcome::Fail(format!(
                "fragment at '{}' ('{candidate}') did not satisfy condition",
                self.path
            )),
            Err(e) => CheckOutcome::Error(e),
        }
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Splits `path` on `separator`, walking object keys and `[n]` array
/// indices. `.` (or an empty path) returns the whole document.
fn navigate(root: &Value, path: &str, separator: char) -> Option<Value> {
    if path.is_empty() || path == "." {
        return Some(root.clone());
    }
    let trimmed = path.strip_prefix(separator).unwrap_or(path);
    let mut current = root.clone();
    for segment in trimmed.split(separator) {
        if segment.is_empty() {
            continue;
        }
        current = navigate_segment(&current, segment)?;
    }
    Some(current)
}

fn navigate_segment(value: &Value, segment: &str) -> Option<Value> {
    let (key, index) = match segment.split_once('[') {
        Some((k, rest)) => {
            let idx: usize = rest.trim_end_matches(']').parse().ok()?;
            (k, Some(idx))
        }
        None => (segment, None),
    };

    let mut current = if key.is_empty() {
        value.clone()
    } else {
        value.get(key)?.clone()
    };

    if let Some(idx) = index {
        current = current.get(idx)?.clone();
    }
    Some(current)
}

/// Evaluates a boolean expression over the parsed body using `==`, `!=`,
/// `<`, `>`, `&&`, `||`, `!`, the functions `$len`/`$max`/`$min`/`$has`/`$match`,
/// and `.path.to.field` path literals. Parsed once in `prepare`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JSONExpr {
    pub expression: String,
    #[serde(skip)]
    compiled: Option<expr::Expr>,
}

impl Check for JSONExpr {
    fn interpolate(&mut self, scope: &Scope) -> Result<(), CheckError> {
        let expanded = scope.interpolate(&self.expression)?;
        if expanded != self.expression {
            self.expression = expanded;
            self.compiled = None;
        }
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), CheckError> {
        if self.compiled.is_none() {
            self.compiled = Some(expr::parse(&self.expression).map_err(|e| {
                CheckError::malformed(
                    ErrorCode::MALFORMED_CHECK,
                    format!("invalid JSONExpr '{}': {e}", self.expression),
                )
            })?);
        }
        Ok(())
    }

    fn execute(&self, response: &Response) -> CheckOutcome {
        let body = match response.body_str() {
            Ok(b) => b,
            Err(e) => return CheckOutcome::Error(e),
        };
        let root: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                return CheckOutcome::Error(CheckError::CantCheck(
                    ErrorCode::CHECK_JSON,
                    format!("body is not valid JSON: {e}"),
                ))
            }
        };
        let compiled = match &self.compiled {
            Some(e) => e.clone(),
            None => match expr::parse(&self.expression) {
                Ok(e) => e,
                Err(e) => {
                    return CheckOutcome::Error(CheckError::malformed(
                        ErrorCode::MALFORMED_CHECK,
                        e,
                    ))
                }
            },
        };
        match expr::eval_bool(&compiled, &root) {
            Ok(true) => CheckOutcome::Pass,
            Ok(false) => CheckOutcome::Fail(format!(
                "expression '{}' evaluated to false",
                self.expression
            )),
            Err(e) => CheckOutcome::Error(CheckError::CantCheck(ErrorCode::CHECK_JSON, e)),
        }
    }

    fn name(&self) -> &'static str {
        "JSONExpr"
    }
}

/// Tiny recursive-descent parser/evaluator for `JSONExpr`'s expression
/// language. Kept private to this module; `JSON`'s own dotted-path
/// navigation is reused for path literals.
mod expr {
    use super::{navigate, Value};
    use regex::Regex;

    #[derive(Debug, Clone)]
    pub enum Expr {
        Path(String),
        Number(f64),
        Str(String),
        Not(Box<Expr>),
        And(Box<Expr>, Box<Expr>),
        Or(Box<Expr>, Box<Expr>),
        Eq(Box<Expr>, Box<Expr>),
        Ne(Box<Expr>, Box<Expr>),
        Lt(Box<Expr>, Box<Expr>),
        Gt(Box<Expr>, Box<Expr>),
        Len(Box<Expr>),
        Max(Box<Expr>),
        Min(Box<Expr>),
        Has(Box<Expr>),
        Match(Box<Expr>, Box<Expr>),
    }

    pub fn parse(input: &str) -> Result<Expr, String> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(format!("unexpected trailing input near token {}", parser.pos));
        }
        Ok(expr)
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Token {
        Path(String),
        Number(f64),
        Str(String),
        Func(String),
        And,
        Or,
        Not,
        Eq,
        Ne,
        Lt,
        Gt,
        LParen,
        RParen,
        Comma,
    }

    fn tokenize(input: &str) -> Result<Vec<Token>, String> {
        let chars: Vec<char> = input.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match c {
                ' ' | '\t' | '\n' => i += 1,
                '(' => {
                    tokens.push(Token::LParen);
                    i += 1;
                }
                ')' => {
                    tokens.push(Token::RParen);
                    i += 1;
                }
                ',' => {
                    tokens.push(Token::Comma);
                    i += 1;
                }
                '&' if chars.get(i + 1) == Some(&'&') => {
                    tokens.push(Token::And);
                    i += 2;
                }
                '|' if chars.get(i + 1) == Some(&'|') => {
                    tokens.push(Token::Or);
                    i += 2;
                }
                '=' if chars.get(i + 1) == Some(&'=') => {
                    tokens.push(Token::Eq);
                    i += 2;
                }
                '!' if chars.get(i + 1) == Some(&'=') => {
                    tokens.push(Token::Ne);
                    i += 2;
                }
                '!' => {
                    tokens.push(Token::Not);
                    i += 1;
                }
                '<' => {
                    tokens.push(Token::Lt);
                    i += 1;
                }
                '>' => {
                    tokens.push(Token::Gt);
                    i += 1;
                }
                '.' => {
                    let start = i;
                    i += 1;
                    while i < chars.len()
                        && (chars[i].is_alphanumeric() || chars[i] == '.' || chars[i] == '_' || chars[i] == '[' || chars[i] == ']')
                    {
                        i += 1;
                    }
                    tokens.push(Token::Path(chars[start..i].iter().collect()));
                }
                '$' => {
                    let start = i;
                    i += 1;
                    while i < chars.len() && chars[i].is_alphanumeric() {
                        i += 1;
                    }
                    tokens.push(Token::Func(chars[start..i].iter().collect()));
                }
                '"' | '\'' => {
                    let quote = c;
                    i += 1;
                    let start = i;
                    while i < chars.len() && chars[i] != quote {
                        i += 1;
                    }
                    if i >= chars.len() {
                        return Err("unterminated string literal".into());
                    }
                    tokens.push(Token::Str(chars[start..i].iter().collect()));
                    i += 1;
                }
                c if c.is_ascii_digit() || c == '-' => {
                    let start = i;
                    i += 1;
                    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                        i += 1;
                    }
                    let text: String = chars[start..i].iter().collect();
                    let n: f64 = text
                        .parse()
                        .map_err(|_| format!("invalid number literal '{text}'"))?;
                    tokens.push(Token::Number(n));
                }
                other => return Err(format!("unexpected character '{other}'")),
            }
        }
        Ok(tokens)
    }

    struct Parser {
        tokens: Vec<Token>,
        pos: usize,
    }

    impl Parser {
        fn peek(&self) -> Option<&Token> {
            self.tokens.get(self.pos)
        }

        fn advance(&mut self) -> Option<Token> {
            let t = self.tokens.get(self.pos).cloned();
            self.pos += 1;
            t
        }

        fn parse_or(&mut self) -> Result<Expr, String> {
            let mut lhs = self.parse_and()?;
            while self.peek() == Some(&Token::Or) {
                self.advance();
                let rhs = self.parse_and()?;
                lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
            }
            Ok(lhs)
        }

        fn parse_and(&mut self) -> Result<Expr, String> {
            let mut lhs = self.parse_unary()?;
            while self.peek() == Some(&Token::And) {
                self.advance();
                let rhs = self.parse_unary()?;
                lhs = Expr::And(Box::new(lhs), Box::new(rhs));
            }
            Ok(lhs)
        }

        fn parse_unary(&mut self) -> Result<Expr, String> {
            if self.peek() == Some(&Token::Not) {
                self.advance();
                let inner = self.parse_unary()?;
                return Ok(Expr::Not(Box::new(inner)));
            }
            self.parse_comparison()
        }

        fn parse_comparison(&mut self) -> Result<Expr, String> {
            let lhs = self.parse_primary()?;
            let op = match self.peek() {
                Some(Token::Eq) => Some(Token::Eq),
                Some(Token::Ne) => Some(Token::Ne),
                Some(Token::Lt) => Some(Token::Lt),
                Some(Token::Gt) => Some(Token::Gt),
                _ => None,
            };
            match op {
                Some(Token::Eq) => {
                    self.advance();
                    Ok(Expr::Eq(Box::new(lhs), Box::new(self.parse_primary()?)))
                }
                Some(Token::Ne) => {
                    self.advance();
                    Ok(Expr::Ne(Box::new(lhs), Box::new(self.parse_primary()?)))
                }
                Some(Token::Lt) => {
                    self.advance();
                    Ok(Expr::Lt(Box::new(lhs), Box::new(self.parse_primary()?)))
                }
                Some(Token::Gt) => {
                    self.advance();
                    Ok(Expr::Gt(Box::new(lhs), Box::new(self.parse_primary()?)))
                }
                _ => Ok(lhs),
            }
        }

        fn parse_primary(&mut self) -> Result<Expr, String> {
            match self.advance() {
                Some(Token::Path(p)) => Ok(Expr::Path(p)),
                Some(Token::Number(n)) => Ok(Expr::Number(n)),
                Some(Token::Str(s)) => Ok(Expr::Str(s)),
                Some(Token::LParen) => {
                    let inner = self.parse_or()?;
                    if self.advance() != Some(Token::RParen) {
                        return Err("expected closing parenthesis".into());
                    }
                    Ok(inner)
                }
                Some(Token::Func(name)) => {
                    if self.advance() != Some(Token::LParen) {
                        return Err(format!("expected '(' after {name}"));
                    }
                    let first = self.parse_or()?;
                    let expr = match name.as_str() {
                        "$len" => Expr::Len(Box::new(first)),
                        "$max" => Expr::Max(Box::new(first)),
                        "$min" => Expr::Min(Box::new(first)),
                        "$has" => Expr::Has(Box::new(first)),
                        "$match" => {
                            if self.advance() != Some(Token::Comma) {
                                return Err("$match requires two arguments".into());
                            }
                            let second = self.parse_or()?;
                            Expr::Match(Box::new(first), Box::new(second))
                        }
                        other => return Err(format!("unknown function '{other}'")),
                    };
                    if self.advance() != Some(Token::RParen) {
                        return Err("expected closing parenthesis".into());
                    }
                    Ok(expr)
                }
                other => Err(format!("unexpected token {other:?}")),
            }
        }
    }

    fn resolve_path(path: &str, root: &Value) -> Value {
        navigate(root, path, '.').unwrap_or(Value::Null)
    }

    #[derive(Debug, Clone)]
    enum Scalar {
        Number(f64),
        Str(String),
        Bool(bool),
        Value(Value),
    }

    fn eval(expr: &Expr, root: &Value) -> Result<Scalar, String> {
        match expr {
            Expr::Path(p) => Ok(Scalar::Value(resolve_path(p, root))),
            Expr::Number(n) => Ok(Scalar::Number(*n)),
            Expr::Str(s) => Ok(Scalar::Str(s.clone())),
            Expr::Not(e) => Ok(Scalar::Bool(!as_bool(&eval(e, root)?))),
            Expr::And(a, b) => Ok(Scalar::Bool(as_bool(&eval(a, root)?) && as_bool(&eval(b, root)?))),
            Expr::Or(a, b) => Ok(Scalar::Bool(as_bool(&eval(a, root)?) || as_bool(&eval(b, root)?))),
            Expr::Eq(a, b) => Ok(Scalar::Bool(scalars_equal(&eval(a, root)?, &eval(b, root)?))),
            Expr::Ne(a, b) => Ok(Scalar::Bool(!scalars_equal(&eval(a, root)?, &eval(b, root)?))),
            Expr::Lt(a, b) => {
                let (x, y) = (as_number(&eval(a, root)?)?, as_number(&eval(b, root)?)?);
                Ok(Scalar::Bool(x < y))
            }
            Expr::Gt(a, b) => {
                let (x, y) = (as_number(&eval(a, root)?)?, as_number(&eval(b, root)?)?);
                Ok(Scalar::Bool(x > y))
            }
            Expr::Len(e) => {
                let v = eval(e, root)?;
                Ok(Scalar::Number(length_of(&v)? as f64))
            }
            Expr::Max(e) => numeric_reduce(e, root, f64::max, f64::MIN),
            Expr::Min(e) => numeric_reduce(e, root, f64::min, f64::MAX),
            Expr::Has(e) => {
                let v = eval(e, root)?;
                Ok(Scalar::Bool(!matches!(v, Scalar::Value(Value::Null))))
            }
            Expr::Match(e, pattern) => {
                let text = as_string(&eval(e, root)?);
                let pattern = as_string(&eval(pattern, root)?);
                let re = Regex::new(&pattern).map_err(|e| format!("invalid $match pattern: {e}"))?;
                Ok(Scalar::Bool(re.is_match(&text)))
            }
        }
    }

    fn numeric_reduce(
        e: &Expr,
        root: &Value,
        reduce: impl Fn(f64, f64) -> f64,
        init: f64,
    ) -> Result<Scalar, String> {
        let v = eval(e, root)?;
        let array = match v {
            Scalar::Value(Value::Array(items)) => items,
            _ => return Err("expected an array argument".into()),
        };
        let mut acc = init;
        for item in &array {
            let n = item
                .as_f64()
                .ok_or_else(|| "array element is not numeric".to_string())?;
            acc = reduce(acc, n);
        }
        Ok(Scalar::Number(acc))
    }

    fn length_of(v: &Scalar) -> Result<usize, String> {
        match v {
            Scalar::Value(Value::Array(items)) => Ok(items.len()),
            Scalar::Value(Value::String(s)) => Ok(s.chars().count()),
            Scalar::Value(Value::Object(map)) => Ok(map.len()),
            Scalar::Str(s) => Ok(s.chars().count()),
            _ => Err("$len requires an array, string, or object".into()),
        }
    }

    fn as_bool(v: &Scalar) -> bool {
        match v {
            Scalar::Bool(b) => *b,
            Scalar::Number(n) => *n != 0.0,
            Scalar::Str(s) => !s.is_empty(),
            Scalar::Value(Value::Bool(b)) => *b,
            Scalar::Value(Value::Null) => false,
            Scalar::Value(_) => true,
        }
    }

    fn as_number(v: &Scalar) -> Result<f64, String> {
        match v {
            Scalar::Number(n) => Ok(*n),
            Scalar::Value(Value::Number(n)) => n.as_f64().ok_or_else(|| "not a number".to_string()),
            Scalar::Str(s) => s.parse().map_err(|_| format!("'{s}' is not numeric")),
            _ => Err("expected a numeric operand".into()),
        }
    }

    fn as_string(v: &Scalar) -> String {
        match v {
            Scalar::Str(s) => s.clone(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Value(Value::String(s)) => s.clone(),
            Scalar::Value(other) => other.to_string(),
        }
    }

    fn scalars_equal(a: &Scalar, b: &Scalar) -> bool {
        match (a, b) {
            (Scalar::Value(Value::Number(x)), Scalar::Number(y))
            | (Scalar::Number(y), Scalar::Value(Value::Number(x))) => {
                x.as_f64() == Some(*y)
            }
            (Scalar::Value(x), Scalar::Value(y)) => x == y,
            _ => as_string(a) == as_string(b) || as_number(a).ok() == as_number(b).ok(),
        }
    }

    pub fn eval_bool(expr: &Expr, root: &Value) -> Result<bool, String> {
        Ok(as_bool(&eval(expr, root)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::ok;

    #[test]
    fn navigates_dotted_path_with_array_index() {
        let root: Value = serde_json::json!({"foo": {"bar": [1, 2, 3]}});
        let value = navigate(&root, ".foo.bar[1]", '.').unwrap();
        assert_eq!(value, Value::from(2));
    }

    #[test]
    fn whole_document_path_is_dot() {
        let root: Value = serde_json::json!({"a": 1});
        assert_eq!(navigate(&root, ".", '.').unwrap(), root);
    }

    #[test]
    fn json_check_passes_on_matching_condition() {
        let check = JSON {
            path: ".foo".into(),
            condition: Condition {
                equals: Some("5".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(check
            .check_value(&serde_json::json!({"foo": 5}))
            .is_pass());
    }

    #[test]
    fn json_check_missing_path_is_not_found() {
        let check = JSON {
            path: ".missing".into(),
            ..Default::default()
        };
        let outcome = check.execute(&ok(b"{\"foo\": 1}"));
        assert!(matches!(outcome, CheckOutcome::Error(CheckError::NotFound(_, _))));
    }

    #[test]
    fn jsonexpr_matches_the_spec_example() {
        let mut check = JSONExpr {
            expression: "(.foo == 5) && ($len(.bar)==3) && (.bar[1]==2)".into(),
            compiled: None,
        };
        check.prepare().unwrap();
        assert!(check
            .execute(&ok(b"{\"foo\":5,\"bar\":[1,2,3]}"))
            .is_pass());
    }

    #[test]
    fn jsonexpr_has_and_match_functions() {
        let mut check = JSONExpr {
            expression: "!$has(.missing) && $match(.name, \"^A\")".into(),
            compiled: None,
        };
        check.prepare().unwrap();
        assert!(check
            .execute(&ok(b"{\"name\":\"Alice\"}"))
            .is_pass());
    }
}
