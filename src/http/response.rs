use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub reason: &'static str,
}

pub const OK: Status = Status { code: 200, reason: "OK" };
pub const BAD_REQUEST: Status = Status { code: 400, reason: "Bad Request" };
pub const NOT_FOUND: Status = Status { code: 404, reason: "Not Found" };
pub const REQUEST_TIMEOUT: Status = Status { code: 408, reason: "Request Timeout" };
pub const TOO_MANY_REQUESTS: Status = Status { code: 429, reason: "Too Many Requests" };
pub const INTERNAL_SERVER_ERROR: Status = Status { code: 500, reason: "Internal Server Error" };
pub const SERVICE_UNAVAILABLE: Status = Status { code: 503, reason: "Service Unavailable" };

#[derive(Debug, Clone)]
pub struct Response {
    pub version: String,
    pub status: Status,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: Status) -> Self {
        Self {
            version: "HTTP/1.0".into(),
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn json<T: Serialize + ?Sized>(status: Status, value: &T) -> Self {
        // Serializing our own response types cannot fail; fall back to an empty object anyway.
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
        Self::new(status)
            .set_header("Content-Type", "application/json")
            .with_body(body)
    }

    pub fn html(body: &'static str) -> Self {
        Self::new(OK)
            .set_header("Content-Type", "text/html; charset=utf-8")
            .with_body(body)
    }

    pub fn error(status: Status, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn set_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    fn http_date() -> String {
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    pub fn to_bytes(&self, is_head: bool) -> Vec<u8> {
        let mut buffer = String::new();

        let _ = write!(
            buffer,
            "{} {} {}\r\n",
            self.version, self.status.code, self.status.reason
        );

        let _ = write!(buffer, "Date: {}\r\n", Self::http_date());
        let _ = write!(buffer, "Server: hash-review-server/0.1\r\n");
        let _ = write!(buffer, "Connection: close\r\n");
        let _ = write!(buffer, "Content-Length: {}\r\n", self.body.len());

        if !self.headers.contains_key("Content-Type") {
            let _ = write!(buffer, "Content-Type: text/plain; charset=utf-8\r\n");
        }

        for (key, value) in &self.headers {
            let key_lower = key.to_ascii_lowercase();
            if ["content-length", "connection", "date", "server"].contains(&key_lower.as_str()) {
                continue;
            }
            let _ = write!(buffer, "{}: {}\r\n", key, value);
        }

        buffer.push_str("\r\n");

        let mut response_bytes = buffer.into_bytes();
        if !is_head {
            response_bytes.extend_from_slice(&self.body);
        }

        response_bytes
    }
}
