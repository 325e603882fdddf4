use std::sync::Arc;

use serde_json::json;

use crate::digest::Algorithm;
use crate::http::{
    errors::ServerError,
    handler::DispatcherBuilder,
    request::HttpRequest,
    response::{Response, OK},
    router::router::SimpleHandler,
};
use crate::state::AppState;
use crate::utils::time::now_local;

const INDEX_HTML: &str = include_str!("../../../templates/index.html");
const REVIEWS_HTML: &str = include_str!("../../../templates/reviews.html");
const DOCS_HTML: &str = include_str!("../../../templates/docs.html");

const FEATURES: [&str; 5] = [
    "Hash Generation",
    "Multiple Algorithms",
    "Salt Support",
    "Multiple Iterations",
    "Reviews System",
];

fn algorithm_names() -> Vec<&'static str> {
    Algorithm::ALL.iter().map(|alg| alg.name()).collect()
}

fn index_page(_req: &HttpRequest) -> Result<Response, ServerError> {
    Ok(Response::html(INDEX_HTML))
}

fn reviews_page(_req: &HttpRequest) -> Result<Response, ServerError> {
    Ok(Response::html(REVIEWS_HTML))
}

fn docs_page(_req: &HttpRequest) -> Result<Response, ServerError> {
    Ok(Response::html(DOCS_HTML))
}

// GET /health
fn health(state: &AppState, _req: &HttpRequest) -> Result<Response, ServerError> {
    Ok(Response::json(
        OK,
        &json!({
            "status": "healthy",
            "timestamp": now_local(),
            "algorithms_available": algorithm_names(),
            "features": FEATURES,
            "storage": state.reviews.backend(),
            "hash_workers": state.hash_pool.metrics(),
        }),
    ))
}

// GET /api/stats
fn public_stats(state: &AppState, _req: &HttpRequest) -> Result<Response, ServerError> {
    let reviews = state.reviews.stats()?;
    Ok(Response::json(
        OK,
        &json!({
            "total_reviews": reviews.total,
            "average_rating": reviews.average_rating,
            "hashes_generated": state.digest.hashes_generated(),
            "algorithms_supported": algorithm_names(),
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        }),
    ))
}

pub fn register(builder: DispatcherBuilder, state: Arc<AppState>) -> DispatcherBuilder {
    let health_state = state.clone();
    let stats_state = state;

    builder
        .get("/", Arc::new(SimpleHandler(index_page)))
        .get("/reviews", Arc::new(SimpleHandler(reviews_page)))
        .get("/docs", Arc::new(SimpleHandler(docs_page)))
        .get(
            "/health",
            Arc::new(SimpleHandler(move |req: &HttpRequest| health(&health_state, req))),
        )
        .get(
            "/api/stats",
            Arc::new(SimpleHandler(move |req: &HttpRequest| public_stats(&stats_state, req))),
        )
}
