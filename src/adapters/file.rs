use super::RequestAdapter;
use crate::engine::model::{HeaderMap, Request, Response};
use crate::error::{AdapterError, ErrorCode};
use async_trait::async_trait;
use std::time::Instant;
use uuid::Uuid;

/// Reads a local file and reports it as a synthetic HTTP response — 200
/// with the file's bytes as the body on success, 404 if it's missing, 500
/// on any other I/O error. `request.url` is `file://<path>`.
pub struct FileAdapter;

#[async_trait]
impl RequestAdapter for FileAdapter {
    async fn send(&self, request: &Request) -> Result<Response, AdapterError> {
        let path = request
            .url
            .strip_prefix("file://")
            .unwrap_or(&request.url);

        let start = Instant::now();
        let result = tokio::fs::read(path).await;
        let duration = start.elapsed();

        let (status_code, reason_phrase, body, body_error) = match result {
            Ok(bytes) => (200, "OK".to_string(), bytes, None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (404, "Not Found".to_string(), Vec::new(), Some(e.to_string()))
            }
            Err(e) => {
                return Err(AdapterError::Other(
                    ErrorCode::FILE_ADAPTER_ERROR,
                    format!("failed to read '{path}': {e}"),
                ))
            }
        };

        Ok(Response {
            request_id: Uuid::new_v4(),
            status_code,
            reason_phrase,
            protocol_version: "file".into(),
            headers: HeaderMap::new(),
            body,
            body_error,
            duration,
            redirect_chain: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_an_existing_file() {
        let dir = std::env::temp_dir();
        let path = dir.join("httpbench_file_adapter_test.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let request = Request {
            method: "GET".into(),
            url: format!("file://{}", path.display()),
            ..Default::default()
        };
        let response = FileAdapter.send(&request).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, b"hello");

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn missing_file_reports_404() {
        let request = Request {
            method: "GET".into(),
            url: "file:///definitely/not/a/real/path/on/disk".into(),
            ..Default::default()
        };
        let response = FileAdapter.send(&request).await.unwrap();
        assert_eq!(response.status_code, 404);
    }
}
