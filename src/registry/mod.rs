//! Maps the tagged JSON a document uses for a `Check`/`Extractor` to the
//! concrete Rust type that implements it. `Box<dyn Check>` and
//! `Box<dyn Extractor>` can't derive `Deserialize` directly — there's no
//! `typetag` dependency in this stack — so each constructor is a plain
//! `fn(&Value) -> Result<_, DocumentError>` kept in a process-wide table,
//! filled once by `register_builtins` and never mutated again at runtime.

use crate::checks::{self, AsAny, Check};
use crate::error::{DocumentError, ErrorCode};
use crate::extractors::{self, Extractor};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

type CheckCtor = fn(&Value) -> Result<Box<dyn Check>, DocumentError>;
type ExtractorCtor = fn(&Value) -> Result<Box<dyn Extractor>, DocumentError>;
type MarshalFn = fn(&dyn Check) -> Value;

static CHECK_REGISTRY: Lazy<RwLock<HashMap<&'static str, CheckCtor>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));
static EXTRACTOR_REGISTRY: Lazy<RwLock<HashMap<&'static str, ExtractorCtor>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));
static MARSHAL_REGISTRY: Lazy<RwLock<HashMap<&'static str, MarshalFn>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn invalid(message: impl Into<String>) -> DocumentError {
    DocumentError::Invalid {
        code: ErrorCode::MALFORMED_CHECK,
        message: message.into(),
    }
}

fn plain<T>(value: &Value) -> Result<Box<dyn Check>, DocumentError>
where
    T: Check + serde::de::DeserializeOwned + 'static,
{
    let check: T = serde_json::from_value(value.clone())
        .map_err(|e| invalid(format!("malformed check body: {e}")))?;
    Ok(Box::new(check))
}

fn plain_extractor<T>(value: &Value) -> Result<Box<dyn Extractor>, DocumentError>
where
    T: Extractor + serde::de::DeserializeOwned + 'static,
{
    let extractor: T = serde_json::from_value(value.clone())
        .map_err(|e| invalid(format!("malformed extractor body: {e}")))?;
    Ok(Box::new(extractor))
}

fn any_one(value: &Value) -> Result<Box<dyn Check>, DocumentError> {
    let nested = value
        .get("checks")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("AnyOne requires a 'checks' array"))?;
    let checks = nested
        .iter()
        .map(build_check)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Box::new(checks::combinator::AnyOne { checks }))
}

/// Re-serializes a concrete `Check` type and re-embeds its registry tag as
/// `type`, so the result is exactly what `build_check` expects back.
fn marshal_plain<T>(check: &dyn Check) -> Value
where
    T: Check + serde::Serialize + 'static,
{
    let concrete = check
        .as_any()
        .downcast_ref::<T>()
        .expect("marshal dispatched to the wrong constructor");
    let mut value = serde_json::to_value(concrete).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.insert("type".to_string(), Value::String(check.name().to_string()));
    }
    value
}

/// `AnyOne` holds `Box<dyn Check>` and so can't `#[derive(Serialize)]`;
/// marshal its nested checks recursively instead.
fn marshal_any_one(check: &dyn Check) -> Value {
    let any_one = check
        .as_any()
        .downcast_ref::<checks::combinator::AnyOne>()
        .expect("marshal dispatched to the wrong constructor");
    let nested: Vec<Value> = any_one
        .checks
        .iter()
        .map(|c| marshal(c.as_ref()))
        .collect();
    serde_json::json!({"type": "AnyOne", "checks": nested})
}

/// Registers every built-in Check/Extractor tag. Idempotent — called once
/// from `main` (and from test setup), safe to call again.
pub fn register_builtins() {
    let mut checks = CHECK_REGISTRY.write().expect("registry poisoned");
    checks.insert("StatusCode", plain::<checks::status_code::StatusCode>);
    checks.insert("Header", plain::<checks::header::Header>);
    checks.insert("ContentType", plain::<checks::content_type::ContentType>);
    checks.insert("Body", plain::<checks::body::Body>);
    checks.insert("UTF8Encoded", plain::<checks::body::UTF8Encoded>);
    checks.insert("BodyContains", plain::<checks::body::BodyContains>);
    checks.insert("SetCookie", plain::<checks::cookie::SetCookie>);
    checks.insert("DeleteCookie", plain::<checks::cookie::DeleteCookie>);
    checks.insert("HTMLContains", plain::<checks::html::HTMLContains>);
    checks.insert(
        "HTMLContainsText",
        plain::<checks::html::HTMLContainsText>,
    );
    checks.insert("HTMLTag", plain::<checks::html::HTMLTag>);
    checks.insert("ValidHTML", plain::<checks::html::ValidHTML>);
    checks.insert("Identity", plain::<checks::identity::Identity>);
    checks.insert("Image", plain::<checks::image::Image>);
    checks.insert("JSON", plain::<checks::json::JSON>);
    checks.insert("JSONExpr", plain::<checks::json::JSONExpr>);
    checks.insert("XML", plain::<checks::xml::XML>);
    checks.insert("Links", plain::<checks::links::Links>);
    checks.insert("Redirect", plain::<checks::redirect::Redirect>);
    checks.insert("RedirectChain", plain::<checks::redirect::RedirectChain>);
    checks.insert("FinalURL", plain::<checks::redirect::FinalURL>);
    checks.insert("ResponseTime", plain::<checks::timing::ResponseTime>);
    checks.insert("Latency", plain::<checks::timing::Latency>);
    checks.insert("AnyOne", any_one);
    checks.insert("Resilience", plain::<checks::opaque::Resilience>);
    checks.insert("Screenshot", plain::<checks::opaque::Screenshot>);
    checks.insert("RenderedHTML", plain::<checks::opaque::RenderedHTML>);
    checks.insert("RenderingTime", plain::<checks::opaque::RenderingTime>);
    drop(checks);

    let mut extractors = EXTRACTOR_REGISTRY.write().expect("registry poisoned");
    extractors.insert("Header", plain_extractor::<extractors::HeaderExtractor>);
    extractors.insert("Cookie", plain_extractor::<extractors::CookieExtractor>);
    extractors.insert("Body", plain_extractor::<extractors::BodyExtractor>);
    extractors.insert("HTML", plain_extractor::<extractors::HTMLExtractor>);
    extractors.insert("JSON", plain_extractor::<extractors::JSONExtractor>);
    extractors.insert("JS", plain_extractor::<extractors::JSExtractor>);
    extractors.insert("SetTimestamp", plain_extractor::<extractors::SetTimestamp>);
    drop(extractors);

    let mut marshal = MARSHAL_REGISTRY.write().expect("registry poisoned");
    marshal.insert("StatusCode", marshal_plain::<checks::status_code::StatusCode>);
    marshal.insert("Header", marshal_plain::<checks::header::Header>);
    marshal.insert("ContentType", marshal_plain::<checks::content_type::ContentType>);
    marshal.insert("Body", marshal_plain::<checks::body::Body>);
    marshal.insert("UTF8Encoded", marshal_plain::<checks::body::UTF8Encoded>);
    marshal.insert("BodyContains", marshal_plain::<checks::body::BodyContains>);
    marshal.insert("SetCookie", marshal_plain::<checks::cookie::SetCookie>);
    marshal.insert("DeleteCookie", marshal_plain::<checks::cookie::DeleteCookie>);
    marshal.insert("HTMLContains", marshal_plain::<checks::html::HTMLContains>);
    marshal.insert(
        "HTMLContainsText",
        marshal_plain::<checks::html::HTMLContainsText>,
    );
    marshal.insert("HTMLTag", marshal_plain::<checks::html::HTMLTag>);
    marshal.insert("ValidHTML", marshal_plain::<checks::html::ValidHTML>);
    marshal.insert("Identity", marshal_plain::<checks::identity::Identity>);
    marshal.insert("Image", marshal_plain::<checks::image::Image>);
    marshal.insert("JSON", marshal_plain::<checks::json::JSON>);
    marshal.insert("JSONExpr", marshal_plain::<checks::json::JSONExpr>);
    marshal.insert("XML", marshal_plain::<checks::xml::XML>);
    marshal.insert("Links", marshal_plain::<checks::links::Links>);
    marshal.insert("Redirect", marshal_plain::<checks::redirect::Redirect>);
    marshal.insert(
        "RedirectChain",
        marshal_plain::<checks::redirect::RedirectChain>,
    );
    marshal.insert("FinalURL", marshal_plain::<checks::redirect::FinalURL>);
    marshal.insert(
        "ResponseTime",
        marshal_plain::<checks::timing::ResponseTime>,
    );
    marshal.insert("Latency", marshal_plain::<checks::timing::Latency>);
    marshal.insert("AnyOne", marshal_any_one);
    marshal.insert("Resilience", marshal_plain::<checks::opaque::Resilience>);
    marshal.insert("Screenshot", marshal_plain::<checks::opaque::Screenshot>);
    marshal.insert(
        "RenderedHTML",
        marshal_plain::<checks::opaque::RenderedHTML>,
    );
    marshal.insert(
        "RenderingTime",
        marshal_plain::<checks::opaque::RenderingTime>,
    );
}

/// Builds one Check from its tagged JSON (`{"type": "...", ...fields}`).
pub fn build_check(value: &Value) -> Result<Box<dyn Check>, DocumentError> {
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("check is missing a 'type' tag"))?;
    let registry = CHECK_REGISTRY.read().expect("registry poisoned");
    let ctor = registry
        .get(tag)
        .ok_or_else(|| invalid(format!("unknown check type '{tag}'")))?;
    ctor(value)
}

pub fn build_checks(values: &[Value]) -> Result<Vec<Box<dyn Check>>, DocumentError> {
    values.iter().map(build_check).collect()
}

/// Serializes a Check back to tagged JSON (`{"type": "...", ...fields}`),
/// the inverse of `build_check`, for every registered variant (spec §4.2,
/// §8's round-trip property).
pub fn marshal(check: &dyn Check) -> Value {
    let registry = MARSHAL_REGISTRY.read().expect("registry poisoned");
    match registry.get(check.name()) {
        Some(f) => f(check),
        None => panic!("no marshal function registered for check '{}'", check.name()),
    }
}

/// Builds one Extractor from its tagged JSON.
pub fn build_extractor(value: &Value) -> Result<Box<dyn Extractor>, DocumentError> {
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("extractor is missing a 'type' tag"))?;
    let registry = EXTRACTOR_REGISTRY.read().expect("registry poisoned");
    let ctor = registry
        .get(tag)
        .ok_or_else(|| invalid(format!("unknown extractor type '{tag}'")))?;
    ctor(value)
}

/// Builds the name->Extractor list a `Test` carries, from a JSON object
/// mapping variable name to tagged extractor config.
pub fn build_extractors(
    value: &Value,
) -> Result<Vec<(String, Box<dyn Extractor>)>, DocumentError> {
    let object = match value {
        Value::Object(map) => map,
        Value::Null => return Ok(Vec::new()),
        _ => return Err(invalid("extractors must be a JSON object")),
    };
    object
        .iter()
        .map(|(name, config)| Ok((name.clone(), build_extractor(config)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ensure_registered() {
        register_builtins();
    }

    #[test]
    fn builds_a_plain_check_by_tag() {
        ensure_registered();
        let value = json!({"type": "StatusCode", "equals": 200});
        let check = build_check(&value).unwrap();
        assert_eq!(check.name(), "StatusCode");
    }

    #[test]
    fn unknown_check_tag_is_an_error() {
        ensure_registered();
        let value = json!({"type": "NotARealCheck"});
        assert!(build_check(&value).is_err());
    }

    #[test]
    fn builds_any_one_recursively() {
        ensure_registered();
        let value = json!({
            "type": "AnyOne",
            "checks": [
                {"type": "StatusCode", "equals": 200},
                {"type": "StatusCode", "equals": 201},
            ]
        });
        let check = build_check(&value).unwrap();
        assert_eq!(check.name(), "AnyOne");
    }

    #[test]
    fn builds_named_extractors_from_object() {
        ensure_registered();
        let value = json!({
            "token": {"type": "Header", "name": "X-Token"}
        });
        let built = build_extractors(&value).unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].0, "token");
    }

    #[test]
    fn missing_extractors_field_is_empty() {
        ensure_registered();
        let built = build_extractors(&Value::Null).unwrap();
        assert!(built.is_empty());
    }

    /// Marshal(Unmarshal(fixture)) reaches a fixed point for every
    /// registered Check variant: marshaling twice yields the same tagged
    /// JSON, and the tag survives the round trip.
    #[test]
    fn every_registered_check_round_trips_through_marshal() {
        ensure_registered();
        let fixtures = vec![
            json!({"type": "StatusCode", "expected": 200}),
            json!({"type": "Header", "name": "X-Test"}),
            json!({"type": "ContentType", "equals": "text/html"}),
            json!({"type": "Body", "condition": {}}),
            json!({"type": "UTF8Encoded"}),
            json!({"type": "BodyContains", "text": "foo", "count": 2}),
            json!({"type": "SetCookie", "name": "session"}),
            json!({"type": "DeleteCookie", "name": "session"}),
            json!({"type": "HTMLContains", "selector": "p.X"}),
            json!({"type": "HTMLContainsText", "selector": "p.X"}),
            json!({"type": "HTMLTag", "selector": "p.X", "count": 2}),
            json!({"type": "ValidHTML"}),
            json!({"type": "Identity", "sha1_hex": "abc123"}),
            json!({"type": "Image", "format": "png"}),
            json!({"type": "JSON", "path": ".foo"}),
            json!({"type": "JSONExpr", "expression": ".foo == 1"}),
            json!({"type": "XML", "xpath": "/root/item"}),
            json!({"type": "Links", "concurrency": 4}),
            json!({"type": "Redirect", "hops": 2}),
            json!({"type": "RedirectChain", "condition": {}}),
            json!({"type": "FinalURL", "condition": {}}),
            json!({"type": "ResponseTime", "higher_ms": 5, "lower_ms": 20}),
            json!({"type": "Latency", "url": "http://x.example", "count": 1}),
            json!({
                "type": "AnyOne",
                "checks": [{"type": "StatusCode", "expected": 200}],
            }),
            json!({"type": "Resilience"}),
            json!({"type": "Screenshot"}),
            json!({"type": "RenderedHTML"}),
            json!({"type": "RenderingTime"}),
        ];

        for fixture in fixtures {
            let tag = fixture.get("type").and_then(Value::as_str).unwrap().to_string();

            let first = build_check(&fixture).unwrap_or_else(|e| {
                panic!("fixture for '{tag}' failed to build: {e}")
            });
            let marshaled_once = marshal(first.as_ref());

            let second = build_check(&marshaled_once).unwrap_or_else(|e| {
                panic!("marshaled '{tag}' failed to rebuild: {e}")
            });
            let marshaled_twice = marshal(second.as_ref());

            assert_eq!(first.name(), second.name(), "tag mismatch for '{tag}'");
            assert_eq!(
                marshaled_once, marshaled_twice,
                "marshal output did not reach a fixed point for '{tag}'"
            );
        }
    }
}
