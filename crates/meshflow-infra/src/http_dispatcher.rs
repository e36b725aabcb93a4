//! reqwest-backed call dispatcher.
//!
//! Each attempt is a JSON `POST` of the node request to the target endpoint.
//! Failures are classified for the retry loop: timeouts, non-2xx statuses,
//! undecodable bodies and everything else (connect/IO) as transport errors.
//! Response bodies larger than the configured limit are rejected as invalid
//! responses without being buffered in full.

use std::time::Duration;

use futures_util::future::BoxFuture;
use meshflow_core::dispatch::{CallDispatcher, DispatchError};
use serde_json::Value;

/// Longest slice of an error body kept in a `Status` error.
const MAX_ERROR_BODY: usize = 512;

/// Default cap on a response body (8 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

pub struct HttpDispatcher {
    http_client: reqwest::Client,
    max_response_bytes: usize,
}

impl HttpDispatcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("meshflow/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http_client))
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    /// Override the response body cap.
    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }
}

fn classify(err: reqwest::Error) -> DispatchError {
    if err.is_timeout() {
        DispatchError::Timeout
    } else if err.is_decode() {
        DispatchError::InvalidResponse(err.to_string())
    } else {
        DispatchError::Transport(err.to_string())
    }
}

fn body_too_large(limit: usize) -> DispatchError {
    DispatchError::InvalidResponse(format!("response body exceeds {limit} bytes"))
}

/// Read the body chunk by chunk, stopping once it passes `limit`.
async fn read_body(mut response: reqwest::Response, limit: usize) -> Result<Vec<u8>, DispatchError> {
    if response.content_length().is_some_and(|len| len > limit as u64) {
        return Err(body_too_large(limit));
    }
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(classify)? {
        if body.len() + chunk.len() > limit {
            return Err(body_too_large(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

impl CallDispatcher for HttpDispatcher {
    fn call<'a>(
        &'a self,
        endpoint: &'a str,
        payload: &'a Value,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Value, DispatchError>> {
        Box::pin(async move {
            let response = self
                .http_client
                .post(endpoint)
                .timeout(timeout)
                .json(payload)
                .send()
                .await
                .map_err(classify)?;

            let status = response.status();
            let body = read_body(response, self.max_response_bytes).await;

            if !status.is_success() {
                let body = match body {
                    Ok(body) => truncate(&String::from_utf8_lossy(&body)),
                    Err(err) => err.to_string(),
                };
                return Err(DispatchError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            let body = body?;

            let value = serde_json::from_slice::<Value>(&body)
                .map_err(|e| DispatchError::InvalidResponse(e.to_string()))?;

            tracing::debug!(
                endpoint,
                status = status.as_u16(),
                body_len = body.len(),
                "service call completed"
            );
            Ok(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned HTTP response on a loopback port; returns the URL.
    async fn serve_once(status_line: &'static str, body: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/invoke")
    }

    /// Read headers plus a `content-length` body.
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + content_length {
                    return;
                }
            }
        }
    }

    fn dispatcher() -> HttpDispatcher {
        HttpDispatcher::new().unwrap()
    }

    #[tokio::test]
    async fn call_returns_decoded_json() {
        let url = serve_once("200 OK", r#"{"id":42}"#, Duration::ZERO).await;
        let value = dispatcher()
            .call(&url, &json!({"q": 1}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, json!({"id": 42}));
    }

    #[tokio::test]
    async fn call_maps_non_success_status() {
        let url = serve_once("503 Service Unavailable", "down", Duration::ZERO).await;
        let err = dispatcher()
            .call(&url, &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::Status {
                status: 503,
                body: "down".into(),
            }
        );
    }

    #[tokio::test]
    async fn call_maps_undecodable_body() {
        let url = serve_once("200 OK", "not json", Duration::ZERO).await;
        let err = dispatcher()
            .call(&url, &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn call_rejects_oversized_body() {
        let url = serve_once(
            "200 OK",
            r#"{"data":"0123456789abcdef0123456789abcdef"}"#,
            Duration::ZERO,
        )
        .await;
        let err = dispatcher()
            .with_max_response_bytes(16)
            .call(&url, &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            DispatchError::InvalidResponse(message) => assert!(message.contains("16 bytes")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_accepts_body_within_limit() {
        let url = serve_once("200 OK", r#"{"ok":true}"#, Duration::ZERO).await;
        let value = dispatcher()
            .with_max_response_bytes(11)
            .call(&url, &json!({}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn call_maps_timeout() {
        let url = serve_once("200 OK", "{}", Duration::from_secs(5)).await;
        let err = dispatcher()
            .call(&url, &json!({}), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Timeout);
    }

    #[tokio::test]
    async fn call_maps_connection_refused_to_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = dispatcher()
            .call(&format!("http://{addr}/"), &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }

    #[test]
    fn truncate_long_bodies() {
        let long = "x".repeat(MAX_ERROR_BODY + 10);
        let short = truncate(&long);
        assert_eq!(short.len(), MAX_ERROR_BODY + 3);
        assert!(short.ends_with("..."));
        assert_eq!(truncate("ok"), "ok");
    }
}
