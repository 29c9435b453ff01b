//! First-read request classification.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProxyError, Result};

/// Size of the single read a session makes before classifying.
pub const REQUEST_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Connect,
    Other(String),
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s {
            "GET" => Method::Get,
            "CONNECT" => Method::Connect,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Connect => f.write_str("CONNECT"),
            Method::Other(m) => f.write_str(m),
        }
    }
}

/// A classified request: what the client asked for and the raw bytes it sent.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub method: Method,
    pub target: String,
    /// Bare hostname: no scheme, no port.
    pub host: String,
    pub raw: Vec<u8>,
}

/// Reads once from the client. `Ok(None)` when the peer closed before sending anything.
pub async fn read_request<S: AsyncRead + Unpin>(client: &mut S) -> Result<Option<ClientRequest>> {
    let mut buffer = vec![0u8; REQUEST_BUFFER_SIZE];
    let n = client.read(&mut buffer).await.map_err(ProxyError::ClientIo)?;
    if n == 0 {
        return Ok(None);
    }
    buffer.truncate(n);
    classify(buffer).map(Some)
}

pub fn classify(raw: Vec<u8>) -> Result<ClientRequest> {
    let text = String::from_utf8_lossy(&raw);
    let first_line = text.lines().next().unwrap_or("");

    let mut tokens = first_line.split_whitespace();
    let (method, target) = match (tokens.next(), tokens.next()) {
        (Some(m), Some(t)) => (Method::from(m), t.to_string()),
        _ => {
            return Err(ProxyError::MalformedRequest(format!(
                "invalid request line {:?}",
                first_line
            )))
        }
    };

    let host = host_header(&text).unwrap_or_else(|| host_from_target(&target));
    let host = strip_port(host).to_string();
    if host.is_empty() {
        return Err(ProxyError::MalformedRequest(format!(
            "no target host in {:?}",
            first_line
        )));
    }

    Ok(ClientRequest {
        method,
        target,
        host,
        raw,
    })
}

/// Value of the first `Host:` line, anywhere in the request. A header with no
/// hostname before its port does not count.
fn host_header(text: &str) -> Option<&str> {
    text.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.eq_ignore_ascii_case("host")
            .then(|| value.trim())
            .filter(|v| !strip_port(v).is_empty())
    })
}

fn host_from_target(target: &str) -> &str {
    let rest = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"))
        .unwrap_or(target);
    rest.split('/').next().unwrap_or(rest)
}

fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}
