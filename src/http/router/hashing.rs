use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::digest::{
    DigestEngine, HashOptions, DEFAULT_ITERATIONS, DEFAULT_SALT_BYTES, MAX_ITERATIONS,
    MAX_SALT_BYTES, MIN_ITERATIONS, MIN_SALT_BYTES,
};
use crate::http::{
    errors::ServerError,
    handler::{DispatcherBuilder, RequestHandlerStrategy},
    request::HttpRequest,
    response::{Response, OK},
    router::router::{bounded_query_param, json_int, PooledHandler, SimpleHandler},
};
use crate::state::AppState;
use crate::utils::text::{random_text, RANDOM_TEXT_LEN};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateHashBody {
    input_text: Option<String>,
    salt: Option<String>,
    iterations: Option<Value>,
    use_timestamp: Option<bool>,
}

/// POST /api/generate-hash
pub struct GenerateHashHandler {
    pub digest: Arc<DigestEngine>,
}

impl RequestHandlerStrategy for GenerateHashHandler {
    fn handle(&self, req: &HttpRequest) -> Result<Response, ServerError> {
        let body: GenerateHashBody = req.json()?;

        let input_text = body.input_text.unwrap_or_default();
        if input_text.is_empty() {
            return Err(ServerError::BadRequest("Input text is required".into()));
        }

        let iterations = match body.iterations.as_ref().filter(|v| !v.is_null()) {
            None => i64::from(DEFAULT_ITERATIONS),
            Some(raw) => json_int(raw)
                .ok_or_else(|| ServerError::BadRequest("Iterations must be an integer".into()))?,
        };
        let iterations = u32::try_from(iterations)
            .ok()
            .filter(|n| (MIN_ITERATIONS..=MAX_ITERATIONS).contains(n))
            .ok_or_else(|| {
                ServerError::BadRequest(format!(
                    "Iterations must be between {} and {}",
                    MIN_ITERATIONS, MAX_ITERATIONS
                ))
            })?;

        let salt = body.salt.filter(|s| !s.is_empty());
        let use_timestamp = body.use_timestamp.unwrap_or(false);
        let salt_length = salt.as_deref().map(|s| s.chars().count()).unwrap_or(0);

        let options = HashOptions {
            auto_salt: salt.is_none(),
            salt,
            iterations,
            include_timestamp: use_timestamp,
        };
        let hashes = self.digest.compute_all_hashes(&input_text, &options)?;

        Ok(Response::json(
            OK,
            &json!({
                "success": true,
                "hashes": hashes,
                "input_info": {
                    "text_length": input_text.chars().count(),
                    "salt_length": salt_length,
                    "iterations": iterations,
                    "timestamp_used": use_timestamp,
                },
            }),
        ))
    }
}

// GET /api/generate-salt?length=N
fn generate_salt(digest: &DigestEngine, req: &HttpRequest) -> Result<Response, ServerError> {
    let length = bounded_query_param(
        req,
        "length",
        DEFAULT_SALT_BYTES as i64,
        MIN_SALT_BYTES as i64,
        MAX_SALT_BYTES as i64,
    )?;
    let salt = digest.generate_salt(length as usize)?;
    Ok(Response::json(OK, &json!({ "salt": salt })))
}

// GET /api/generate-random-text
fn generate_random_text(_req: &HttpRequest) -> Result<Response, ServerError> {
    Ok(Response::json(OK, &json!({ "text": random_text(RANDOM_TEXT_LEN) })))
}

pub fn register(builder: DispatcherBuilder, state: Arc<AppState>) -> DispatcherBuilder {
    let hash_handler: Arc<dyn RequestHandlerStrategy> =
        Arc::new(GenerateHashHandler { digest: state.digest.clone() });
    let pooled_hash = Arc::new(PooledHandler::new(state.hash_pool.clone(), hash_handler));

    let digest = state.digest.clone();
    let salt = Arc::new(SimpleHandler(move |req: &HttpRequest| generate_salt(&digest, req)));

    builder
        .post("/api/generate-hash", pooled_hash)
        .get("/api/generate-salt", salt)
        .get("/api/generate-random-text", Arc::new(SimpleHandler(generate_random_text)))
}
