use super::RequestAdapter;
use crate::engine::model::{HeaderMap, Request, Response};
use crate::error::AdapterError;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::process::Command;
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs `request.url` (stripped of its `bash://` prefix) as a shell command
/// via `sh -c`. The command's stdout becomes the body, its exit status is
/// reported both as an `Exit-Status` header and folded into `status_code`
/// (0 -> 200, nonzero -> 500). A command that outruns the Request's timeout
/// is killed and reported as 408.
pub struct BashAdapter;

#[async_trait]
impl RequestAdapter for BashAdapter {
    async fn send(&self, request: &Request) -> Result<Response, AdapterError> {
        let script = request.url.strip_prefix("bash://").unwrap_or(&request.url);
        let timeout = request.timeout().unwrap_or(DEFAULT_TIMEOUT);

        let start = Instant::now();
        let child = Command::new("sh").arg("-c").arg(script).output();

        let (status_code, reason_phrase, body, exit_status) =
            match tokio::time::timeout(timeout, child).await {
                Ok(Ok(output)) => {
                    let code = output.status.code().unwrap_or(-1);
                    let status_code = if code == 0 { 200 } else { 500 };
                    let reason = if code == 0 { "OK" } else { "Command Failed" };
                    (status_code, reason.to_string(), output.stdout, code)
                }
                Ok(Err(e)) => {
                    return Err(AdapterError::Other(
                        crate::error::ErrorCode::BASH_ADAPTER_ERROR,
                        format!("failed to spawn command: {e}"),
                    ))
                }
                Err(_) => (408, "Request Timeout".to_string(), Vec::new(), -1),
            };

        let mut headers = HeaderMap::new();
        headers.insert("exit-status".into(), vec![exit_status.to_string()]);

        Ok(Response {
            request_id: Uuid::new_v4(),
            status_code,
            reason_phrase,
            protocol_version: "bash".into(),
            headers,
            body,
            body_error: None,
            duration: start.elapsed(),
            redirect_chain: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_is_200_with_exit_status_header() {
        let request = Request {
            method: "GET".into(),
            url: "bash://echo -n ok".into(),
            ..Default::default()
        };
        let response = BashAdapter.send(&request).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, b"ok");
        assert_eq!(response.header("exit-status"), Some("0"));
    }

    #[tokio::test]
    async fn failing_command_is_500() {
        let request = Request {
            method: "GET".into(),
            url: "bash://exit 3".into(),
            ..Default::default()
        };
        let response = BashAdapter.send(&request).await.unwrap();
        assert_eq!(response.status_code, 500);
        assert_eq!(response.header("exit-status"), Some("3"));
    }

    #[tokio::test]
    async fn timeout_is_408() {
        let request = Request {
            method: "GET".into(),
            url: "bash://sleep 2".into(),
            timeout_ms: Some(50),
            ..Default::default()
        };
        let response = BashAdapter.send(&request).await.unwrap();
        assert_eq!(response.status_code, 408);
    }
}
