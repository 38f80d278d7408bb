//! Structured error codes for the engine.
//!
//! Codes are grouped by range, the same way the original runner laid them
//! out: E1xxx validation, E2xxx adapter/HTTP execution, E3xxx check
//! failures, E4xxx configuration, E5xxx internal. New ranges were appended
//! rather than renumbering the existing ones.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // E1xxx: plan / document validation
    pub const EMPTY_SUITE: Self = Self(1001);
    pub const UNSUPPORTED_SPEC_VERSION: Self = Self(1002);
    pub const UNKNOWN_SCHEME: Self = Self(1003);
    pub const MISSING_PARAM: Self = Self(1004);
    pub const UNKNOWN_MOCK_REFERENCE: Self = Self(1005);
    pub const MIXIN_CYCLE: Self = Self(1006);
    pub const INVALID_HTTP_METHOD: Self = Self(1007);
    pub const EMPTY_TEST_NAME: Self = Self(1008);
    pub const INVALID_DOCUMENT: Self = Self(1009);
    pub const MALFORMED_CHECK: Self = Self(1010);

    // E2xxx: request adapter execution
    pub const HTTP_TIMEOUT: Self = Self(2001);
    pub const HTTP_CONNECTION_ERROR: Self = Self(2002);
    pub const HTTP_TLS_ERROR: Self = Self(2003);
    pub const FILE_ADAPTER_ERROR: Self = Self(2004);
    pub const BASH_ADAPTER_ERROR: Self = Self(2005);
    pub const SQL_ADAPTER_ERROR: Self = Self(2006);
    pub const REDIRECT_LOOP: Self = Self(2007);

    // E3xxx: check failures (one family per check group)
    pub const CHECK_STATUS: Self = Self(3001);
    pub const CHECK_HEADER: Self = Self(3002);
    pub const CHECK_BODY: Self = Self(3003);
    pub const CHECK_HTML: Self = Self(3004);
    pub const CHECK_JSON: Self = Self(3005);
    pub const CHECK_XML: Self = Self(3006);
    pub const CHECK_IMAGE: Self = Self(3007);
    pub const CHECK_COOKIE: Self = Self(3008);
    pub const CHECK_LINKS: Self = Self(3009);
    pub const CHECK_LATENCY: Self = Self(3010);
    pub const CHECK_RESPONSE_TIME: Self = Self(3011);
    pub const EXTRACT_NOT_FOUND: Self = Self(3012);
    pub const EXTRACT_MALFORMED: Self = Self(3013);
    pub const EXTRACT_SCRIPT_ERROR: Self = Self(3014);

    // E4xxx: configuration / environment
    pub const ENV_VAR_NOT_FOUND: Self = Self(4001);
    pub const CONTEXT_VAR_NOT_FOUND: Self = Self(4002);
    pub const DOCUMENT_NOT_FOUND: Self = Self(4003);
    pub const MOCK_BIND_EXHAUSTED: Self = Self(4004);
    pub const MISSING_DSN: Self = Self(4005);

    // E5xxx: internal invariants
    pub const INTERNAL_ERROR: Self = Self(5001);
    pub const NO_ADAPTER_FOR_SCHEME: Self = Self(5002);
    pub const REGISTRY_DUPLICATE: Self = Self(5003);
    pub const MOCK_RECONCILIATION_INVARIANT: Self = Self(5004);

    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

/// Closed error taxonomy shared by every Check's `execute`/`prepare` step.
///
/// `NotFound`/`FoundForbidden` exist separately from `Fail` because the
/// Body/HTML "contains" family of checks needs to distinguish "assertion
/// failed" from "the thing we forbade showed up" for callers that branch on
/// it (mostly the engine's own test suite).
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("[{0}] required content not found: {1}")]
    NotFound(ErrorCode, String),

    #[error("[{0}] forbidden content present: {1}")]
    FoundForbidden(ErrorCode, String),

    #[error("[{0}] body unavailable: {1}")]
    BadBody(ErrorCode, String),

    #[error("[{0}] check could not evaluate: {1}")]
    CantCheck(ErrorCode, String),

    #[error("[{0}] malformed check: {1}")]
    MalformedCheck(ErrorCode, String),

    #[error("[{0}] this check is not implemented in this build")]
    Unsupported(ErrorCode),

    #[error("{0}")]
    Other(String),
}

impl CheckError {
    pub fn malformed(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::MalformedCheck(code, msg.into())
    }
}

/// Errors raised by an `extractors::Extractor`.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("[{0}] nothing to extract: {1}")]
    NotFound(ErrorCode, String),

    #[error("[{0}] malformed extractor: {1}")]
    Malformed(ErrorCode, String),

    #[error("[{0}] script error: {1}")]
    ScriptError(ErrorCode, String),
}

impl From<CheckError> for ExtractError {
    fn from(e: CheckError) -> Self {
        match e {
            CheckError::NotFound(code, msg) => ExtractError::NotFound(code, msg),
            CheckError::MalformedCheck(code, msg) => ExtractError::Malformed(code, msg),
            other => ExtractError::Malformed(ErrorCode::EXTRACT_MALFORMED, other.to_string()),
        }
    }
}

/// Errors raised while loading or validating a declarative document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("[{code}] {message}")]
    Invalid { code: ErrorCode, message: String },

    #[error("[{0}] document not found: {1}")]
    NotFound(ErrorCode, String),

    #[error(transparent)]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by a request adapter (`adapters::RequestAdapter`).
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("[{0}] timed out after {1:?}")]
    Timeout(ErrorCode, std::time::Duration),

    #[error("[{0}] connection error: {1}")]
    Connection(ErrorCode, String),

    #[error("[{0}] {1}")]
    Other(ErrorCode, String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(ErrorCode::HTTP_TIMEOUT, std::time::Duration::from_secs(0))
        } else if e.is_connect() {
            Self::Connection(ErrorCode::HTTP_CONNECTION_ERROR, e.to_string())
        } else {
            Self::Other(ErrorCode::HTTP_CONNECTION_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_leading_e_and_four_digits() {
        assert_eq!(ErrorCode::EMPTY_SUITE.formatted(), "E1001");
        assert_eq!(ErrorCode::CHECK_STATUS.formatted(), "E3001");
        assert_eq!(ErrorCode::INTERNAL_ERROR.formatted(), "E5001");
    }

    #[test]
    fn check_error_display_includes_code() {
        let err = CheckError::MalformedCheck(ErrorCode::MALFORMED_CHECK, "empty selector".into());
        assert!(err.to_string().contains("E1010"));
        assert!(err.to_string().contains("empty selector"));
    }
}
