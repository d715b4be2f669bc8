//! HTTP transport used by virtual users.

use crate::duration::human_serde;
use crate::error::LoadError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// What to send on every iteration, minus the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSpec {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(with = "human_serde")]
    pub timeout: Duration,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            method: "POST".to_string(),
            url: "http://localhost:8000/product".to_string(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Display for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A fully received response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Bytes,
    /// From send until the last body byte arrived.
    pub duration: Duration,
}

/// Classification of requests that never produced a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Body => "body",
        };
        f.write_str(s)
    }
}

impl LoadError {
    /// Transport classification, if this error came from a request.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            LoadError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Sends one request and waits for the full response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestSpec, body: Bytes) -> Result<Response, LoadError>;
}

/// `reqwest`-backed transport. One pooled client is shared by every VU.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(max_idle_per_host: usize) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cntryl-load/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(max_idle_per_host)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| classify(&e))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestSpec, body: Bytes) -> Result<Response, LoadError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            LoadError::Config(format!("invalid HTTP method '{}'", request.method))
        })?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| classify(&e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            let mut err = classify(&e);
            if let LoadError::Transport { kind, .. } = &mut err {
                if *kind != TransportErrorKind::Timeout {
                    *kind = TransportErrorKind::Body;
                }
            }
            err
        })?;

        Ok(Response {
            status,
            body,
            duration: start.elapsed(),
        })
    }
}

fn classify(err: &reqwest::Error) -> LoadError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_body() || err.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Request
    };
    LoadError::Transport {
        kind,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_product_endpoint() {
        let spec = RequestSpec::default();
        assert_eq!(spec.to_string(), "POST http://localhost:8000/product");
        assert_eq!(spec.timeout, Duration::from_secs(60));
        assert!(spec
            .headers
            .iter()
            .any(|(k, v)| k == "Content-Type" && v == "application/json"));
    }

    #[test]
    fn should_expose_transport_kind_on_errors() {
        let err = LoadError::Transport {
            kind: TransportErrorKind::Timeout,
            message: "deadline".into(),
        };
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Timeout));
        assert_eq!(err.to_string(), "timeout error: deadline");
        assert_eq!(LoadError::Config("x".into()).transport_kind(), None);
    }

    #[tokio::test]
    async fn should_classify_refused_connection() {
        let transport = HttpTransport::new(4).unwrap();
        // Bind then drop to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let spec = RequestSpec {
            url: format!("http://127.0.0.1:{}/product", port),
            timeout: Duration::from_secs(2),
            ..RequestSpec::default()
        };

        let err = transport.send(&spec, Bytes::from_static(b"{}")).await.unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Connect));
    }
}
