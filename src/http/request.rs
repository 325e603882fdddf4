use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::net::IpAddr;

use serde::de::DeserializeOwned;

use super::errors::ServerError;

const MAX_HEADER_LINES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMethod {
    GET,
    HEAD,
    POST,
    Unsupported(String),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: String,
    pub version: String,
    /// Header names are stored lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub peer_ip: Option<IpAddr>,
}

impl HttpRequest {
    pub fn parse<R: Read>(reader: &mut R, max_body_bytes: usize) -> Result<Self, ServerError> {
        let mut reader = BufReader::new(reader);

        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;
        let request_line = request_line.trim();

        if request_line.is_empty() {
            return Err(ServerError::BadRequest("Empty request line".into()));
        }

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, target, version] = parts.as_slice() else {
            return Err(ServerError::BadRequest(format!(
                "Malformed request line: '{}'", request_line
            )));
        };

        let method = match *method {
            "GET" => HttpMethod::GET,
            "HEAD" => HttpMethod::HEAD,
            "POST" => HttpMethod::POST,
            other => HttpMethod::Unsupported(other.to_string()),
        };

        if *version != "HTTP/1.0" && *version != "HTTP/1.1" {
            return Err(ServerError::BadRequest(format!(
                "Unsupported HTTP version '{}'", version
            )));
        }

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (target.to_string(), String::new()),
        };

        let mut headers = HashMap::new();
        for _ in 0..MAX_HEADER_LINES {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                break; // EOF
            }

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break; // End of headers
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(ServerError::BadRequest(format!(
                    "Invalid header format: '{}'", line
                )));
            };
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let mut body = Vec::new();
        if let Some(raw_len) = headers.get("content-length") {
            let content_length = raw_len.parse::<usize>().map_err(|_| {
                ServerError::BadRequest(format!("Invalid Content-Length '{}'", raw_len))
            })?;
            if content_length > max_body_bytes {
                return Err(ServerError::BadRequest(format!(
                    "Request body too large (max {} bytes)", max_body_bytes
                )));
            }
            let mut limited = reader.take(content_length as u64);
            limited.read_to_end(&mut body)?;
        }

        Ok(HttpRequest {
            method,
            path,
            query,
            version: version.to_string(),
            headers,
            body,
            peer_ip: None,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ServerError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ServerError::BadRequest(format!("Invalid JSON body: {}", e)))
    }

    /// Address used for throttling. `X-Forwarded-For` is only honoured when the
    /// server sits behind a trusted proxy.
    pub fn client_ip(&self, trust_forwarded_for: bool) -> Option<String> {
        if trust_forwarded_for {
            let forwarded = self
                .header("X-Forwarded-For")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(ip) = forwarded {
                return Some(ip.to_string());
            }
        }
        self.peer_ip.map(|ip| ip.to_string())
    }
}
