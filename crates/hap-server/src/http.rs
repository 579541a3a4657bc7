//! HTTP/1.1 framing for the accessory server.
//!
//! Controllers speak plain HTTP/1.1 until pair-verify completes and keep
//! speaking it inside the encrypted channel afterwards. Notifications use
//! the same framing with an `EVENT/1.0` status line.

use hap_core::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;

pub const JSON_CONTENT_TYPE: &str = "application/hap+json";
pub const TLV_CONTENT_TYPE: &str = "application/pairing+tlv8";

/// Upper bound of a request head, protects the connection buffer.
const MAX_HEAD_LEN: usize = 8 * 1024;

/// Upper bound of a request body.
const MAX_BODY_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Other(String),
}

impl Method {
    fn parse(s: &str) -> Self {
        match s {
            "GET" => Self::Get,
            "PUT" => Self::Put,
            "POST" => Self::Post,
            "DELETE" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Other(method) => method,
        }
    }
}

/// Parsed request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };

        Self {
            method,
            path,
            query,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse one request from the front of `data`.
    ///
    /// Returns `None` while the request is incomplete, otherwise the request
    /// and the number of bytes it occupied.
    pub fn parse(data: &[u8]) -> Result<Option<(Self, usize)>> {
        let Some(head_end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
            if data.len() > MAX_HEAD_LEN {
                return Err(Error::invalid_state("Request head too large"));
            }
            return Ok(None);
        };

        let head = std::str::from_utf8(&data[..head_end])
            .map_err(|_| Error::invalid_state("Request head is not valid UTF-8"))?;
        let mut lines = head.split("\r\n");

        let request_line = lines
            .next()
            .ok_or_else(|| Error::invalid_state("Missing request line"))?;
        let mut parts = request_line.split(' ');
        let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(target), Some(version)) => (method, target, version),
            _ => {
                return Err(Error::invalid_state(format!(
                    "Malformed request line: {}",
                    request_line
                )))
            }
        };

        if !version.starts_with("HTTP/1.") {
            return Err(Error::invalid_state(format!(
                "Unsupported protocol: {}",
                version
            )));
        }

        let mut request = Self::new(Method::parse(method), target);
        for line in lines {
            if let Some((key, value)) = line.split_once(':') {
                request
                    .headers
                    .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = match request.header("content-length") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| Error::invalid_state(format!("Invalid Content-Length: {}", value)))?,
            None => 0,
        };
        if content_length > MAX_BODY_LEN {
            return Err(Error::invalid_state("Request body too large"));
        }

        let body_start = head_end + 4;
        if data.len() < body_start + content_length {
            return Ok(None);
        }

        request.body = data[body_start..body_start + content_length].to_vec();
        Ok(Some((request, body_start + content_length)))
    }

    /// Header value, names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Decoded `key=value` pairs of the query string.
    pub fn query_params(&self) -> HashMap<String, String> {
        self.query
            .as_deref()
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let target = match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        };

        let mut out = format!("{} {} HTTP/1.1\r\n", self.method.as_str(), target).into_bytes();
        let mut headers: Vec<_> = self
            .headers
            .iter()
            .filter(|(k, _)| k.as_str() != "content-length")
            .collect();
        headers.sort();
        for (key, value) in headers {
            out.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

/// Response to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status)
            .header("Content-Type", JSON_CONTENT_TYPE)
            .body(value.to_string())
    }

    pub fn tlv(body: Vec<u8>) -> Self {
        Self::new(200)
            .header("Content-Type", TLV_CONTENT_TYPE)
            .body(body)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire format. `Content-Length` is always emitted.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out =
            format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status)).into_bytes();
        for (key, value) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Parse a complete response, used by controller-side tooling and tests.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let head_end = data
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .ok_or_else(|| Error::invalid_state("Missing header terminator"))?;
        let head = std::str::from_utf8(&data[..head_end])
            .map_err(|_| Error::invalid_state("Response head is not valid UTF-8"))?;
        let mut lines = head.split("\r\n");

        let status_line = lines
            .next()
            .ok_or_else(|| Error::invalid_state("Missing status line"))?;
        let status = status_line
            .split(' ')
            .nth(1)
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| Error::invalid_state(format!("Malformed status line: {}", status_line)))?;

        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .filter(|(k, _)| !k.trim().eq_ignore_ascii_case("content-length"))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        Ok(Self {
            status,
            headers,
            body: data[head_end + 4..].to_vec(),
        })
    }
}

/// Frame a characteristic notification.
pub fn event_frame(body: &Value) -> Vec<u8> {
    let content = body.to_string();
    let mut out = format!(
        "EVENT/1.0 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        JSON_CONTENT_TYPE,
        content.len()
    )
    .into_bytes();
    out.extend_from_slice(content.as_bytes());
    out
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        207 => "Multi-Status",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        470 => "Connection Authorization Required",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
