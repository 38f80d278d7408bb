//! The Check set: ~30 polymorphic assertions over a captured `Response`.
//!
//! Each concrete check lives in its own submodule and implements the
//! `Check` trait below. `prepare` compiles anything expensive once
//! (a regex, a CSS selector) and must be idempotent — the engine may call
//! it more than once if a Test is retried at a higher level. `execute`
//! never returns `Err`; evaluation failures are folded into `CheckOutcome`
//! itself so the engine can always pattern-match one shape.

use crate::context::Scope;
use crate::engine::model::Response;
use crate::error::CheckError;
use std::any::Any;

pub mod body;
pub mod combinator;
pub mod content_type;
pub mod cookie;
pub mod header;
pub mod html;
pub mod identity;
pub mod image;
pub mod json;
pub mod links;
pub mod opaque;
pub mod redirect;
pub mod status_code;
pub mod timing;
pub mod xml;

/// Outcome of one `Check::execute` call.
#[derive(Debug)]
pub enum CheckOutcome {
    Pass,
    Fail(String),
    Error(CheckError),
}

impl CheckOutcome {
    pub fn from_result(result: Result<(), CheckError>) -> Self {
        match result {
            Ok(()) => CheckOutcome::Pass,
            Err(CheckError::NotFound(_, msg))
            | Err(CheckError::FoundForbidden(_, msg))
            | Err(CheckError::Other(msg)) => CheckOutcome::Fail(msg),
            Err(e) => CheckOutcome::Error(e),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, CheckOutcome::Pass)
    }
}

/// Lets `crate::registry::marshal` recover a `&dyn Check`'s concrete type
/// to re-run its own `Serialize` impl. Blanket-implemented for every `'static`
/// type, so no concrete Check needs to implement it by hand.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A polymorphic assertion over a `Response`. Implementors carry their own
/// `#[derive(Serialize, Deserialize)]` configuration struct; the registry
/// (`crate::registry`) maps the document's `Check` tag to a constructor that
/// deserializes that configuration and returns a boxed trait object.
pub trait Check: Send + Sync + AsAny {
    /// Compiles regexes/selectors. Called once before the first attempt of
    /// a Test; must tolerate being called again without side effects.
    fn prepare(&mut self) -> Result<(), CheckError> {
        Ok(())
    }

    /// Expands `{{...}}` tokens in this check's own string fields against
    /// `scope`, mirroring the engine's `expand_request` step (spec §4.6
    /// step 3: "...and inside every Check's string fields"). Called once
    /// per attempt, after the request has been expanded and before
    /// `execute`. Checks with no templatable string fields (`StatusCode`,
    /// `ResponseTime`, ...) inherit the no-op default.
    fn interpolate(&mut self, _scope: &Scope) -> Result<(), CheckError> {
        Ok(())
    }

    fn execute(&self, response: &Response) -> CheckOutcome;

    /// Registry name, also used as the wire `Check` tag and in reports.
    fn name(&self) -> &'static str;
}

/// Shared `Response` builder for check unit tests, kept in one place so
/// every check's test module doesn't hand-roll the same boilerplate struct
/// literal.
#[cfg(test)]
pub(crate) mod test_support {
    use crate::engine::model::{HeaderMap, Response};
    use std::time::Duration;
    use uuid::Uuid;

    pub fn response(status: u16, headers: HeaderMap, body: &[u8]) -> Response {
        Response {
            request_id: Uuid::nil(),
            status_code: status,
            reason_phrase: String::new(),
            protocol_version: "HTTP/1.1".into(),
            headers,
            body: body.to_vec(),
            body_error: None,
            duration: Duration::ZERO,
            redirect_chain: Vec::new(),
        }
    }

    pub fn ok(body: &[u8]) -> Response {
        response(200, HeaderMap::new(), body)
    }
}
