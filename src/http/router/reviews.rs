use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::{
    errors::ServerError,
    handler::{DispatcherBuilder, RequestHandlerStrategy},
    request::HttpRequest,
    response::{Response, OK},
    router::router::{bounded_query_param, json_int},
};
use crate::reviews::{ReviewService, ReviewSubmission};
use crate::state::AppState;

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddReviewBody {
    name: Option<String>,
    rating: Option<Value>,
    comment: Option<String>,
}

/// POST /api/add-review
pub struct AddReviewHandler {
    pub reviews: Arc<ReviewService>,
    pub trust_forwarded_for: bool,
}

impl RequestHandlerStrategy for AddReviewHandler {
    fn handle(&self, req: &HttpRequest) -> Result<Response, ServerError> {
        let body: AddReviewBody = req.json()?;

        let rating = match body.rating.as_ref().filter(|v| !v.is_null()) {
            None => 0,
            Some(raw) => json_int(raw).ok_or_else(|| {
                ServerError::BadRequest("Rating must be a number between 1 and 5".into())
            })?,
        };

        let review = self.reviews.submit(ReviewSubmission {
            name: body.name.unwrap_or_default(),
            rating,
            comment: body.comment.unwrap_or_default(),
            client_ip: req.client_ip(self.trust_forwarded_for),
        })?;

        Ok(Response::json(
            OK,
            &json!({
                "success": true,
                "message": "Thanks for your review!",
                "review": review.public(),
            }),
        ))
    }
}

/// GET /api/get-reviews?limit=N
pub struct GetReviewsHandler {
    pub reviews: Arc<ReviewService>,
}

impl RequestHandlerStrategy for GetReviewsHandler {
    fn handle(&self, req: &HttpRequest) -> Result<Response, ServerError> {
        let limit = bounded_query_param(req, "limit", DEFAULT_LIST_LIMIT, 1, MAX_LIST_LIMIT)?;

        let reviews = self.reviews.list(limit as usize)?;
        let stats = self.reviews.stats()?;
        let public: Vec<_> = reviews.iter().map(|r| r.public()).collect();

        Ok(Response::json(OK, &json!({ "reviews": public, "stats": stats })))
    }
}

pub fn register(builder: DispatcherBuilder, state: Arc<AppState>) -> DispatcherBuilder {
    let add = Arc::new(AddReviewHandler {
        reviews: state.reviews.clone(),
        trust_forwarded_for: state.trust_forwarded_for,
    });
    let list = Arc::new(GetReviewsHandler { reviews: state.reviews.clone() });

    builder
        .post("/api/add-review", add)
        .get("/api/get-reviews", list)
}
