//! Request adapters: the protocol-specific half of running a Test. Each
//! adapter turns a `Request` into a `Response`, grounded on teacher's
//! `executors/http.rs::HttpExecutor` (shared client, header/body
//! interpolation already done by the caller, timeout, duration capture)
//! but generalized to dispatch by URL scheme instead of one hardcoded
//! `http_request` action.

pub mod bash;
pub mod file;
pub mod http;
pub mod sql;

use crate::engine::model::{Request, Response};
use crate::error::{AdapterError, ErrorCode};
use async_trait::async_trait;

#[async_trait]
pub trait RequestAdapter: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, AdapterError>;
}

/// Picks the adapter for `url`'s scheme. `http`/`https` share one adapter;
/// `file`, `bash`, and `sql` each get their own.
pub fn dispatch(url: &str) -> Result<Box<dyn RequestAdapter>, AdapterError> {
    let scheme = url.split_once("://").map(|(s, _)| s).unwrap_or("http");
    match scheme {
        "http" | "https" => Ok(Box::new(http::HttpAdapter::new())),
        "file" => Ok(Box::new(file::FileAdapter)),
        "bash" => Ok(Box::new(bash::BashAdapter)),
        "sql" => Ok(Box::new(sql::SqlAdapter)),
        other => Err(AdapterError::Other(
            ErrorCode::NO_ADAPTER_FOR_SCHEME,
            format!("no adapter registered for scheme '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_http_and_https_to_the_same_adapter_kind() {
        assert!(dispatch("http://example.com").is_ok());
        assert!(dispatch("https://example.com").is_ok());
    }

    #[test]
    fn unknown_scheme_is_an_error() {
        assert!(dispatch("ftp://example.com").is_err());
    }

    #[test]
    fn bare_path_defaults_to_http() {
        assert!(dispatch("example.com/no-scheme").is_ok());
    }
}
