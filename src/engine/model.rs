//! Core data model shared by every subsystem: `Request`/`Response` wire
//! shapes, the six-value `Status` lattice, `Criticality` capping, and the
//! `Test` unit that ties a request to its checks/extractors/execution
//! parameters. Generalizes the original `protocol::{Plan, Step, StepResult,
//! StepStatus}` structs into the richer shape this engine needs, keeping the
//! same "plain struct, derive Serialize/Deserialize" texture.

use crate::checks::{Check, CheckOutcome};
use crate::error::CheckError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Ordered, case-insensitive-by-convention multimap. Callers normalize keys
/// to lower case before inserting; the first-seen casing of a name is not
/// tracked separately (unlike `reqwest::header::HeaderMap`, one name maps to
/// one canonical key here).
pub type HeaderMap = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamPlacement {
    Url,
    Body,
    Multipart,
}

impl Default for ParamPlacement {
    fn default() -> Self {
        Self::Url
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: HeaderMap,
    pub params: HeaderMap,
    #[serde(with = "body_as_string")]
    pub body: Vec<u8>,
    pub cookies: Vec<(String, String)>,
    pub param_placement: ParamPlacement,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    pub timeout_ms: Option<u64>,
    pub basic_auth: Option<(String, String)>,
    pub client_pool: Option<String>,
}

impl Request {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Documents write `Body` as a plain JSON string; wire/report shapes need
/// raw bytes. Round-trips exactly for UTF-8 bodies, which covers every
/// declarative document this engine loads.
mod body_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.into_bytes())
    }
}

/// A captured HTTP response. Holds `request_id` rather than the `Request`
/// itself to avoid the cyclic `Response.Request.Response` pointer the
/// original design flagged.
#[derive(Debug, Clone)]
pub struct Response {
    pub request_id: Uuid,
    pub status_code: u16,
    pub reason_phrase: String,
    pub protocol_version: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub body_error: Option<String>,
    pub duration: Duration,
    pub redirect_chain: Vec<String>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn header_all(&self, name: &str) -> &[String] {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn body_str(&self) -> Result<&str, CheckError> {
        std::str::from_utf8(&self.body).map_err(|e| {
            CheckError::BadBody(
                crate::error::ErrorCode::CHECK_BODY,
                format!("body is not valid UTF-8: {e}"),
            )
        })
    }
}

/// `NotRun < Skipped < Pass < Fail < Error < Bogus`, matching spec §3 exactly.
/// `Ord` is derived over the explicit discriminants so `max()` across a list
/// of checks/elements gives the worst-of status directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    NotRun = 0,
    Skipped = 1,
    Pass = 2,
    Fail = 3,
    Error = 4,
    Bogus = 5,
}

impl Status {
    pub fn worst_of(statuses: impl IntoIterator<Item = Status>) -> Status {
        statuses.into_iter().max().unwrap_or(Status::NotRun)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Criticality {
    Default,
    Warn,
    Error,
    Fatal,
}

impl Default for Criticality {
    fn default() -> Self {
        Self::Default
    }
}

/// Caps a raw check/element `Status` by its declared `Criticality` before it
/// feeds into a Suite's worst-of aggregation.
///
/// `Warn` never lets a failure count as worse than `Fail` toward the overall
/// Suite status, `Default`/`Error` report the true severity, and `Fatal`
/// never caps (a Bogus Fatal check stays Bogus). This is the open question
/// from spec.md §9 resolved: criticality caps an upper bound, it never
/// demotes a result all the way back to Pass.
pub fn cap(status: Status, criticality: Criticality) -> Status {
    let ceiling = match criticality {
        Criticality::Warn => Status::Fail,
        Criticality::Default | Criticality::Error => Status::Error,
        Criticality::Fatal => Status::Bogus,
    };
    status.min(ceiling)
}

/// One Check's outcome against a particular Test run, retained for
/// reporting alongside the overall status.
#[derive(Debug, Clone, Serialize)]
pub struct CheckVerdict {
    pub name: String,
    pub status: Status,
    pub message: Option<String>,
}

impl CheckVerdict {
    pub fn from_outcome(name: &str, outcome: &CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::Pass => Self {
                name: name.to_string(),
                status: Status::Pass,
                message: None,
            },
            CheckOutcome::Fail(msg) => Self {
                name: name.to_string(),
                status: Status::Fail,
                message: Some(msg.clone()),
            },
            CheckOutcome::Error(err) => Self {
                name: name.to_string(),
                status: Status::Error,
                message: Some(err.to_string()),
            },
        }
    }
}

/// Execution parameters for a single Test run (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ExecutionParams {
    pub tries: u32,
    pub retry_wait_ms: u64,
    pub poll_count: u32,
    pub pre_sleep_ms: u64,
    pub inter_sleep_ms: u64,
    pub post_sleep_ms: u64,
    pub verbosity: u8,
    pub criticality: Criticality,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            tries: 1,
            retry_wait_ms: 0,
            poll_count: 0,
            pre_sleep_ms: 0,
            inter_sleep_ms: 0,
            post_sleep_ms: 0,
            verbosity: 0,
            criticality: Criticality::Default,
        }
    }
}

/// One declarative test unit: a Request plus the Checks/Extractors/params
/// that govern how it runs. `checks` and `extractors` hold already-registry-
/// constructed trait objects (built by `registry::build_checks` from the
/// document's tagged JSON); a freshly loaded `Test` with an unresolvable
/// check name is rejected before a `Test` value is ever produced.
pub struct Test {
    pub name: String,
    pub description: Option<String>,
    pub request: Request,
    pub checks: Vec<Box<dyn Check>>,
    pub extractors: Vec<(String, Box<dyn crate::extractors::Extractor>)>,
    pub params: ExecutionParams,
    pub variables: std::collections::HashMap<String, String>,
    pub bogus: Option<String>,
}

impl std::fmt::Debug for Test {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Test")
            .field("name", &self.name)
            .field("checks", &self.checks.len())
            .field("extractors", &self.extractors.len())
            .field("bogus", &self.bogus)
            .finish()
    }
}

/// Per-run result attached to a `Test` after `TestEngine::run` returns.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub status: Status,
    pub error: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration: Duration,
    pub checks: Vec<CheckVerdict>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ordering_matches_spec_lattice() {
        assert!(Status::NotRun < Status::Skipped);
        assert!(Status::Skipped < Status::Pass);
        assert!(Status::Pass < Status::Fail);
        assert!(Status::Fail < Status::Error);
        assert!(Status::Error < Status::Bogus);
    }

    #[test]
    fn worst_of_picks_maximum_status() {
        let statuses = vec![Status::Pass, Status::Fail, Status::Skipped];
        assert_eq!(Status::worst_of(statuses), Status::Fail);
    }

    #[test]
    fn cap_warn_limits_bogus_down_to_fail() {
        assert_eq!(cap(Status::Bogus, Criticality::Warn), Status::Fail);
        assert_eq!(cap(Status::Error, Criticality::Warn), Status::Fail);
        assert_eq!(cap(Status::Pass, Criticality::Warn), Status::Pass);
    }

    #[test]
    fn cap_fatal_never_caps() {
        assert_eq!(cap(Status::Bogus, Criticality::Fatal), Status::Bogus);
    }

    #[test]
    fn cap_default_caps_bogus_to_error() {
        assert_eq!(cap(Status::Bogus, Criticality::Default), Status::Error);
    }
}
