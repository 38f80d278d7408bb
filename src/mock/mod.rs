//! Mock server (spec.md §4.8): an ephemeral `axum` listener bound before a
//! Test runs and torn down after, matching declared mocks in order against
//! incoming requests and feeding a monitor channel the Suite runner
//! reconciles against at Test completion.
//!
//! Grounded on the `axum` ephemeral-listener pattern used throughout the
//! rest of the pack for mock HTTP targets — one shared `AppState`, a single
//! fallback handler doing the matching by hand since `axum`'s router syntax
//! has no positional path-variable extraction the way spec.md describes.

use crate::checks::{Check, CheckOutcome};
use crate::context::Scope;
use crate::engine::model::{HeaderMap, Response, Status};
use crate::error::{AdapterError, ErrorCode};
use crate::extractors::Extractor;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use std::collections::HashMap as StdHashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One declared mock: method + path pattern, its own checks/extractors run
/// against the matched request, and a templated response.
pub struct MockDefinition {
    pub name: String,
    pub method: String,
    pub url_pattern: String,
    pub checks: Vec<Box<dyn Check>>,
    pub extractors: Vec<(String, Box<dyn Extractor>)>,
    pub response_status: u16,
    pub response_headers: HeaderMap,
    pub response_body: String,
}

/// One outcome fed into the monitor channel: either a matched mock's
/// checks ran ("Mock N: name") or an unmatched request ("Not Found").
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub label: String,
    pub status: Status,
    pub message: Option<String>,
}

struct AppState {
    defs: Vec<MockDefinition>,
    base_scope: StdHashMap<String, String>,
    invoked: Mutex<std::collections::HashSet<usize>>,
    tx: mpsc::UnboundedSender<MonitorReport>,
}

/// A started mock server instance, owned by the Suite element that
/// declared it. Dropping without calling [`MockServer::shutdown`] leaves
/// the listener task running until the process exits — callers must always
/// shut down explicitly, matching spec.md §4.7's start-before/stop-after
/// bracketing.
pub struct MockServer {
    pub addr: SocketAddr,
    state: Arc<AppState>,
    reports: Arc<Mutex<Vec<MonitorReport>>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    server_task: Option<tokio::task::JoinHandle<()>>,
    drain_task: Option<tokio::task::JoinHandle<()>>,
}

impl MockServer {
    /// Binds an ephemeral listener and starts serving `defs`. `base_scope`
    /// is a snapshot of the Suite's scope at the moment the element starts
    /// — the response template substitutes against it plus per-request
    /// path variables, not the live mutable Scope (no reader-writer lock
    /// needed, matching spec.md §5).
    pub async fn start(
        defs: Vec<MockDefinition>,
        base_scope: StdHashMap<String, String>,
    ) -> Result<Self, AdapterError> {
        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
            AdapterError::Other(
                ErrorCode::MOCK_BIND_EXHAUSTED,
                format!("failed to bind mock listener: {e}"),
            )
        })?;
        let addr = listener.local_addr().map_err(|e| {
            AdapterError::Other(ErrorCode::MOCK_BIND_EXHAUSTED, e.to_string())
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = Arc::new(AppState {
            defs,
            base_scope,
            invoked: Mutex::new(std::collections::HashSet::new()),
            tx,
        });

        let reports = Arc::new(Mutex::new(Vec::new()));
        let drain_reports = reports.clone();
        let drain_task = tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                drain_reports.lock().unwrap().push(report);
            }
        });

        let app = Router::new()
            .fallback(handle_request)
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server_task = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Self {
            addr,
            state,
            reports,
            shutdown_tx: Some(shutdown_tx),
            server_task: Some(server_task),
            drain_task: Some(drain_task),
        })
    }

    /// Stops the listener and returns every report observed so far, drained
    /// before reconciliation reads them (spec.md §9's monitor-channel note).
    pub async fn shutdown(mut self) -> Vec<MonitorReport> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.server_task.take() {
            let _ = task.await;
        }
        drop(self.state.tx.clone());
        if let Some(task) = self.drain_task.take() {
            let _ = tokio::time::timeout(Duration::from_millis(200), task).await;
        }
        self.reports.lock().unwrap().clone()
    }

    /// Reconciles the observed reports against every declared mock:
    /// missing invocations synthesize `Error` reports, and the returned
    /// status is the worst-of across the whole mock sub-suite.
    pub fn reconcile(defs_len: usize, mut reports: Vec<MonitorReport>) -> (Vec<MonitorReport>, Status) {
        let invoked_indices: std::collections::HashSet<usize> = reports
            .iter()
            .filter_map(|r| r.label.strip_prefix("Mock ").and_then(|rest| {
                rest.split(':').next().and_then(|n| n.parse::<usize>().ok())
            }))
            .map(|serial| serial - 1)
            .collect();

        for index in 0..defs_len {
            if !invoked_indices.contains(&index) {
                reports.push(MonitorReport {
                    label: format!("Mock {}: (not invoked)", index + 1),
                    status: Status::Error,
                    message: Some("declared mock was never invoked".into()),
                });
            }
        }

        let status = Status::worst_of(reports.iter().map(|r| r.status));
        (reports, status)
    }
}

async fn handle_request(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: axum::http::Uri,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let path = uri.path();

    for (index, def) in state.defs.iter().enumerate() {
        if !def.method.eq_ignore_ascii_case(method.as_str()) {
            continue;
        }
        let Some(path_vars) = match_path(&def.url_pattern, path) else {
            continue;
        };

        state.invoked.lock().unwrap().insert(index);

        let mut response_headers = HeaderMap::new();
        for (name, value) in headers.iter() {
            response_headers
                .entry(name.as_str().to_ascii_lowercase())
                .or_default()
                .push(value.to_str().unwrap_or_default().to_string());
        }
        let synthetic = Response {
            request_id: Uuid::new_v4(),
            status_code: 0,
            reason_phrase: String::new(),
            protocol_version: "mock".into(),
            headers: response_headers,
            body: body.to_vec(),
            body_error: None,
            duration: Duration::ZERO,
            redirect_chain: Vec::new(),
        };

        let mut scope = Scope::new();
        scope.extend(&state.base_scope);
        scope.extend(&path_vars);

        let mut worst = Status::Pass;
        for check in &def.checks {
            match check.execute(&synthetic) {
                CheckOutcome::Pass => {}
                CheckOutcome::Fail(_) => worst = worst.max(Status::Fail),
                CheckOutcome::Error(_) => worst = worst.max(Status::Error),
            }
        }
        for (name, extractor) in &def.extractors {
            match extractor.extract(&synthetic, &scope) {
                Ok(value) => scope.set(name.clone(), value),
                Err(_) => worst = worst.max(Status::Error),
            }
        }

        let _ = state.tx.send(MonitorReport {
            label: format!("Mock {}: {}", index + 1, def.name),
            status: worst,
            message: None,
        });

        let rendered_body = scope.interpolate(&def.response_body).unwrap_or_default();
        let status =
            StatusCode::from_u16(def.response_status).unwrap_or(StatusCode::OK);
        let mut builder = axum::response::Response::builder().status(status);
        for (name, values) in def.response_headers.iter() {
            for value in values {
                builder = builder.header(name, value);
            }
        }
        return builder.body(axum::body::Body::from(rendered_body)).unwrap();
    }

    let _ = state.tx.send(MonitorReport {
        label: "Not Found".into(),
        status: Status::Error,
        message: Some(format!("no mock matched {} {}", method, path)),
    });
    axum::response::Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(axum::body::Body::from("Not Found"))
        .unwrap()
}

/// Matches `pattern` (e.g. `/users/{id}`) against `path` positionally,
/// returning the captured `{var}` bindings on a match.
fn match_path(pattern: &str, path: &str) -> Option<StdHashMap<String, String>> {
    let pattern_segments: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if pattern_segments.len() != path_segments.len() {
        return None;
    }

    let mut vars = StdHashMap::new();
    for (p, actual) in pattern_segments.iter().zip(path_segments.iter()) {
        if let Some(name) = p.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            vars.insert(name.to_string(), actual.to_string());
        } else if p != actual {
            return None;
        }
    }
    Some(vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_positional_path_variables() {
        let vars = match_path("/users/{id}/posts/{post_id}", "/users/42/posts/7").unwrap();
        assert_eq!(vars.get("id").map(String::as_str), Some("42"));
        assert_eq!(vars.get("post_id").map(String::as_str), Some("7"));
    }

    #[test]
    fn literal_segment_mismatch_fails() {
        assert!(match_path("/users/{id}", "/accounts/42").is_none());
    }

    #[test]
    fn segment_count_mismatch_fails() {
        assert!(match_path("/users/{id}", "/users/42/extra").is_none());
    }

    #[test]
    fn reconcile_synthesizes_missing_invocations_as_error() {
        let reports = vec![MonitorReport {
            label: "Mock 1: created".into(),
            status: Status::Pass,
            message: None,
        }];
        let (reconciled, status) = MockServer::reconcile(2, reports);
        assert_eq!(reconciled.len(), 2);
        assert_eq!(status, Status::Error);
    }

    #[test]
    fn reconcile_all_invoked_and_passing_is_pass() {
        let reports = vec![MonitorReport {
            label: "Mock 1: created".into(),
            status: Status::Pass,
            message: None,
        }];
        let (_, status) = MockServer::reconcile(1, reports);
        assert_eq!(status, Status::Pass);
    }
}
