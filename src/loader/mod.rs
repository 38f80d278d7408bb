//! Loads the declarative documents spec.md §6 describes: Test, Suite, Mock,
//! and Load. Parsing the permissive-JSON dialect itself (unquoted keys,
//! comments, multi-line strings) is delegated to the `json5` crate — this
//! module only owns the Test/Suite/Mock/Load *shape* on top of it, plus the
//! Mixin merge rules, exactly the division of labor spec.md's Non-goals
//! describe ("the parser is an external collaborator").
//!
//! The document envelope (Test/Suite/Mock/Load top-level keys, and the
//! `Request`/`Execution` sub-objects) uses `PascalCase` keys, matching the
//! casing spec.md's own prose uses for them. Individual `Check`/`Extractor`
//! bodies keep whatever field casing their own struct declares (lowercase
//! snake_case, same as the rest of the registry) — only the envelope around
//! them is PascalCase.

use crate::engine::model::{ExecutionParams, Request, Test};
use crate::error::{DocumentError, ErrorCode};
use crate::load::Scenario;
use crate::mock::MockDefinition;
use crate::registry;
use crate::suite::{Element, Suite};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

fn invalid(code: ErrorCode, message: impl Into<String>) -> DocumentError {
    DocumentError::Invalid {
        code,
        message: message.into(),
    }
}

fn read_document(path: &Path) -> Result<Value, DocumentError> {
    let content = std::fs::read_to_string(path)?;
    json5::from_str(&content)
        .map_err(|e| invalid(ErrorCode::INVALID_DOCUMENT, format!("{}: {e}", path.display())))
}

fn as_object(value: &Value) -> Option<&serde_json::Map<String, Value>> {
    value.as_object()
}

/// Loads a single Test document, resolving and merging any `Mixin` files it
/// lists (spec.md §6's Mixin merge rules) before building the `Test`.
pub fn load_test(path: impl AsRef<Path>) -> Result<Test, DocumentError> {
    let path = path.as_ref();
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut visited = HashSet::new();
    visited.insert(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
    let mut doc = read_document(path)?;
    resolve_mixins(&mut doc, base_dir, &mut visited)?;
    test_from_value(&doc)
}

/// Resolves `doc["Mixin"]` (a list of file paths, relative to `base_dir`)
/// in order, merging each into `doc` per spec.md §6: headers/params
/// union-appended, body overridden only if the mixin sets one, checks
/// appended, `FollowRedirects`/name/description keep the primary's value.
fn resolve_mixins(
    doc: &mut Value,
    base_dir: &Path,
    visited: &mut HashSet<PathBuf>,
) -> Result<(), DocumentError> {
    let mixin_paths: Vec<String> = doc
        .get("Mixin")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    for rel in mixin_paths {
        let mixin_path = base_dir.join(&rel);
        let canonical = mixin_path
            .canonicalize()
            .unwrap_or_else(|_| mixin_path.clone());
        if !visited.insert(canonical.clone()) {
            return Err(invalid(
                ErrorCode::MIXIN_CYCLE,
                format!("mixin cycle detected at {}", mixin_path.display()),
            ));
        }
        let mut mixin_doc = read_document(&mixin_path)?;
        let mixin_base = mixin_path.parent().unwrap_or(base_dir);
        resolve_mixins(&mut mixin_doc, mixin_base, visited)?;
        apply_mixin(doc, &mixin_doc);
    }
    Ok(())
}

fn apply_mixin(primary: &mut Value, mixin: &Value) {
    let Some(mixin_obj) = as_object(mixin) else {
        return;
    };

    if let Some(mixin_checks) = mixin_obj.get("Checks").and_then(Value::as_array) {
        let primary_obj = primary.as_object_mut().expect("document is an object");
        let primary_checks = primary_obj
            .entry("Checks")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(list) = primary_checks.as_array_mut() {
            list.extend(mixin_checks.iter().cloned());
        }
    }

    if let Some(mixin_vars) = mixin_obj.get("Variables").and_then(Value::as_object) {
        let primary_obj = primary.as_object_mut().expect("document is an object");
        let primary_vars = primary_obj
            .entry("Variables")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Some(map) = primary_vars.as_object_mut() {
            for (key, value) in mixin_vars {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    let mixin_request = mixin_obj.get("Request").and_then(Value::as_object).cloned();
    if let Some(mixin_request) = mixin_request {
        let primary_obj = primary.as_object_mut().expect("document is an object");
        let primary_request = primary_obj
            .entry("Request")
            .or_insert_with(|| Value::Object(Default::default()));
        let Some(primary_request) = primary_request.as_object_mut() else {
            return;
        };

        for key in ["Headers", "Params"] {
            if let Some(mixin_map) = mixin_request.get(key).and_then(Value::as_object) {
                let primary_map = primary_request
                    .entry(key)
                    .or_insert_with(|| Value::Object(Default::default()));
                if let Some(primary_map) = primary_map.as_object_mut() {
                    for (name, mixin_values) in mixin_map {
                        let entry = primary_map
                            .entry(name.clone())
                            .or_insert_with(|| Value::Array(Vec::new()));
                        if let (Some(existing), Some(added)) =
                            (entry.as_array().cloned(), mixin_values.as_array())
                        {
                            let mut combined = existing;
                            combined.extend(added.iter().cloned());
                            *entry = Value::Array(combined);
                        }
                    }
                }
            }
        }

        if let Some(body) = mixin_request.get("Body") {
            if !body.is_null() {
                primary_request.insert("Body".to_string(), body.clone());
            }
        }
    }
}

/// Builds a `Test` from an already-mixin-merged document value.
fn test_from_value(doc: &Value) -> Result<Test, DocumentError> {
    let name = doc
        .get("Name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if name.is_empty() {
        return Err(invalid(ErrorCode::EMPTY_TEST_NAME, "Test is missing a Name"));
    }

    let description = doc
        .get("Description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let request: Request = match doc.get("Request") {
        Some(v) => serde_json::from_value(v.clone())?,
        None => Request::default(),
    };

    let checks = match doc.get("Checks").and_then(Value::as_array) {
        Some(values) => registry::build_checks(values)?,
        None => Vec::new(),
    };

    let extractors = match doc.get("DataExtraction") {
        Some(v) => registry::build_extractors(v)?,
        None => Vec::new(),
    };

    let params: ExecutionParams = match doc.get("Execution") {
        Some(v) => serde_json::from_value(v.clone())?,
        None => ExecutionParams::default(),
    };

    let variables = parse_string_map(doc.get("Variables"));

    Ok(Test {
        name,
        description,
        request,
        checks,
        extractors,
        params,
        variables,
        bogus: None,
    })
}

fn parse_string_map(value: Option<&Value>) -> HashMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Loads a Suite document: Setup/Main/Teardown arrays of elements, each
/// either `{"File": "path/to/test.json5", ...}` or `{"Test": {...}, ...}`.
pub fn load_suite(path: impl AsRef<Path>) -> Result<Suite, DocumentError> {
    let path = path.as_ref();
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let doc = read_document(path)?;

    let name = doc
        .get("Name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if name.is_empty() {
        return Err(invalid(ErrorCode::EMPTY_SUITE, "Suite is missing a Name"));
    }
    let description = doc
        .get("Description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let setup = load_phase(doc.get("Setup"), base_dir)?;
    let main = load_phase(doc.get("Main"), base_dir)?;
    let teardown = load_phase(doc.get("Teardown"), base_dir)?;
    let variables = parse_string_map(doc.get("Variables"));
    let keep_cookies = doc
        .get("KeepCookies")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let verbosity = doc.get("Verbosity").and_then(Value::as_u64).unwrap_or(0) as u8;

    Ok(Suite {
        name,
        description,
        setup,
        main,
        teardown,
        variables,
        keep_cookies,
        verbosity,
    })
}

fn load_phase(value: Option<&Value>, base_dir: &Path) -> Result<Vec<Element>, DocumentError> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    entries
        .iter()
        .map(|entry| load_element(entry, base_dir))
        .collect()
}

fn load_element(entry: &Value, base_dir: &Path) -> Result<Element, DocumentError> {
    let mut test = if let Some(file) = entry.get("File").and_then(Value::as_str) {
        load_test(base_dir.join(file))?
    } else if let Some(inline) = entry.get("Test") {
        let mut inline = inline.clone();
        resolve_mixins(&mut inline, base_dir, &mut HashSet::new())?;
        test_from_value(&inline)?
    } else {
        return Err(invalid(
            ErrorCode::INVALID_DOCUMENT,
            "Suite element has neither 'File' nor 'Test'",
        ));
    };

    for (key, value) in parse_string_map(entry.get("Variables")) {
        test.variables.insert(key, value);
    }

    let mocks = match entry.get("Mocks").and_then(Value::as_array) {
        Some(values) => values
            .iter()
            .map(mock_from_value)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(Element { test, mocks })
}

/// Builds a single [`MockDefinition`] from a Mock document's inline JSON.
fn mock_from_value(value: &Value) -> Result<MockDefinition, DocumentError> {
    let name = value
        .get("Name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let method = value
        .get("Method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_string();
    let url_pattern = value
        .get("URL")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(ErrorCode::INVALID_DOCUMENT, "Mock is missing a URL pattern"))?
        .to_string();

    let checks = match value.get("Checks").and_then(Value::as_array) {
        Some(values) => registry::build_checks(values)?,
        None => Vec::new(),
    };
    let extractors = match value.get("VarEx") {
        Some(v) => registry::build_extractors(v)?,
        None => Vec::new(),
    };

    let response = value.get("Response");
    let response_status = response
        .and_then(|r| r.get("StatusCode"))
        .and_then(Value::as_u64)
        .unwrap_or(200) as u16;
    let response_body = response
        .and_then(|r| r.get("Body"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let mut response_headers = crate::engine::model::HeaderMap::new();
    if let Some(headers) = response
        .and_then(|r| r.get("Header"))
        .and_then(Value::as_object)
    {
        for (key, val) in headers {
            let values = match val {
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                Value::String(s) => vec![s.clone()],
                _ => Vec::new(),
            };
            response_headers.insert(key.to_ascii_lowercase(), values);
        }
    }

    Ok(MockDefinition {
        name,
        method,
        url_pattern,
        checks,
        extractors,
        response_status,
        response_headers,
        response_body,
    })
}

/// Loads a Load document: a name plus weighted `Scenario`s, each pointing at
/// its own Suite file. `OmitChecks` (a list of Check type names) strips
/// matching checks from every element of that scenario's Suite before it
/// runs — a load run's whole point is throughput, not per-request assertion
/// depth, so trimming expensive checks here is explicitly supported.
pub fn load_load(path: impl AsRef<Path>) -> Result<(String, Vec<Scenario>), DocumentError> {
    let path = path.as_ref();
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let doc = read_document(path)?;

    let name = doc
        .get("Name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let top_variables = parse_string_map(doc.get("Variables"));

    let scenarios_value = doc
        .get("Scenarios")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(ErrorCode::INVALID_DOCUMENT, "Load is missing Scenarios"))?;

    let mut scenarios = Vec::with_capacity(scenarios_value.len());
    for entry in scenarios_value {
        let scenario_name = entry
            .get("Name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let file = entry
            .get("File")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(ErrorCode::INVALID_DOCUMENT, "Scenario is missing a File"))?;
        let percentage = entry
            .get("Percentage")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let max_threads = entry.get("MaxThreads").and_then(Value::as_u64).unwrap_or(0) as usize;

        let mut suite = load_suite(base_dir.join(file))?;
        for (key, value) in &top_variables {
            suite
                .variables
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (key, value) in parse_string_map(entry.get("Variables")) {
            suite.variables.insert(key, value);
        }

        if let Some(omit) = entry.get("OmitChecks").and_then(Value::as_array) {
            let omit: HashSet<&str> = omit.iter().filter_map(Value::as_str).collect();
            for element in suite
                .setup
                .iter_mut()
                .chain(suite.main.iter_mut())
                .chain(suite.teardown.iter_mut())
            {
                element.test.checks.retain(|c| !omit.contains(c.name()));
            }
        }

        scenarios.push(Scenario {
            name: scenario_name,
            percentage,
            max_threads,
            suite,
        });
    }

    Ok((name, scenarios))
}
