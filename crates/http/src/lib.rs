//! arl-http: HTTP transport for arl
//!
//! Implements the `HttpFetch` trait from arl-core with reqwest. Bodies are
//! handed back as chunk streams so callers can enforce size limits while
//! the response is still arriving.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};

use arl_core::{ByteStream, Error, HttpFetch, HttpRequest, Result};

const USER_AGENT: &str = concat!("arl/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest-backed HTTP client
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Build a client with the default user agent
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn network_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Network(format!("request timed out: {e}"))
    } else {
        Error::Network(e.to_string())
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, request: HttpRequest) -> Result<ByteStream> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        tracing::debug!(url = %request.url, status = status.as_u16(), "response received");

        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: request.url,
                status: status.as_u16(),
            });
        }

        Ok(response.bytes_stream().map_err(network_error).boxed())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned response on a loopback port, capturing the request head
    async fn serve_once(status: &'static str, body: &'static str) -> (String, Arc<Mutex<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(String::new()));
        let sink = captured.clone();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            *sink.lock().unwrap() = String::from_utf8_lossy(&buf[..n]).into_owned();

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        (format!("http://{addr}/file"), captured)
    }

    async fn drain(mut body: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_get_streams_body_and_sends_headers() {
        let (url, captured) = serve_once("200 OK", "payload").await;
        let fetcher = ReqwestFetcher::new().unwrap();

        let body = fetcher
            .get(HttpRequest::get(&url).header("Authorization", "token abc"))
            .await
            .unwrap();
        assert_eq!(drain(body).await, b"payload");

        let head = captured.lock().unwrap().to_lowercase();
        assert!(head.contains("authorization: token abc"));
        assert!(head.contains("user-agent: arl/"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let (url, _) = serve_once("404 Not Found", "").await;
        let err = ReqwestFetcher::new()
            .unwrap()
            .get(HttpRequest::get(&url))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ReqwestFetcher::new()
            .unwrap()
            .get(HttpRequest::get(format!("http://{addr}/")))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Network(_)));
    }
}
