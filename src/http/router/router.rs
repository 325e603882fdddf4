use std::sync::mpsc;
use std::sync::Arc;

use serde_json::Value;

use crate::{
    http::{
        errors::ServerError,
        handler::{Dispatcher, RequestHandlerStrategy},
        request::HttpRequest,
        response::Response,
        router::{hashing, pages, reviews},
    },
    state::AppState,
    worker_pool::ThreadPool,
};

pub struct SimpleHandler<F>(pub F);

impl<F> RequestHandlerStrategy for SimpleHandler<F>
where
    F: Fn(&HttpRequest) -> Result<Response, ServerError> + Send + Sync + 'static,
{
    fn handle(&self, req: &HttpRequest) -> Result<Response, ServerError> {
        (self.0)(req)
    }
}

/// Runs the wrapped handler on a worker pool and waits for its answer, so
/// CPU-heavy work stays off the connection threads.
pub struct PooledHandler {
    pool: ThreadPool,
    handler: Arc<dyn RequestHandlerStrategy>,
}

impl PooledHandler {
    pub fn new(pool: ThreadPool, handler: Arc<dyn RequestHandlerStrategy>) -> Self {
        Self { pool, handler }
    }
}

impl RequestHandlerStrategy for PooledHandler {
    fn handle(&self, req: &HttpRequest) -> Result<Response, ServerError> {
        let (tx, rx) = mpsc::channel();
        let handler = self.handler.clone();
        let request = req.clone();

        self.pool.execute(move || {
            let outcome = handler.handle(&request);
            let _ = tx.send(outcome);
        });

        rx.recv().unwrap_or_else(|_| {
            Err(ServerError::Internal(format!(
                "Worker pool '{}' dropped the response channel",
                self.pool.name()
            )))
        })
    }
}

pub fn build_routes(state: Arc<AppState>) -> Dispatcher {
    let mut builder = Dispatcher::builder();

    builder = pages::register(builder, state.clone());
    builder = hashing::register(builder, state.clone());
    builder = reviews::register(builder, state);

    builder.build()
}

pub trait QueryParam {
    /// First value for `key`, percent-decoded, with `+` read as a space.
    fn query_param(&self, key: &str) -> Option<String>;
}

impl QueryParam for HttpRequest {
    fn query_param(&self, key: &str) -> Option<String> {
        if self.query.is_empty() {
            return None;
        }
        self.query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| percent_decode(k) == key)
            .map(|(_, v)| percent_decode(v))
    }
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = match bytes[i] {
            b'%' => bytes
                .get(i + 1..i + 3)
                .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok()),
            _ => None,
        };
        match escaped {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(if bytes[i] == b'+' { b' ' } else { bytes[i] });
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Reads an optional integer query parameter, enforcing inclusive bounds.
pub fn bounded_query_param(
    req: &HttpRequest,
    key: &str,
    default: i64,
    min: i64,
    max: i64,
) -> Result<i64, ServerError> {
    let value = match req.query_param(key).as_deref() {
        None | Some("") => default,
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            ServerError::BadRequest(format!("Invalid integer for '{}': {}", key, raw))
        })?,
    };

    if !(min..=max).contains(&value) {
        return Err(ServerError::BadRequest(format!(
            "Parameter '{}' must be between {} and {}",
            key, min, max
        )));
    }
    Ok(value)
}

/// Accepts JSON numbers or numeric strings, the way form-driven clients send them.
pub fn json_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
