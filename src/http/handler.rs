use std::collections::HashMap;
use std::sync::Arc;

use super::errors::ServerError;
use super::request::{HttpMethod, HttpRequest};
use super::response::Response;

pub trait RequestHandlerStrategy: Send + Sync + 'static {
    fn handle(&self, req: &HttpRequest) -> Result<Response, ServerError>;
}

/// Exact-path routing table per method. HEAD is answered by the GET routes.
pub struct Dispatcher {
    get: HashMap<String, Arc<dyn RequestHandlerStrategy>>,
    post: HashMap<String, Arc<dyn RequestHandlerStrategy>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn dispatch(&self, req: &HttpRequest) -> Result<Response, ServerError> {
        let routes = match req.method {
            HttpMethod::GET | HttpMethod::HEAD => &self.get,
            HttpMethod::POST => &self.post,
            HttpMethod::Unsupported(ref m) => {
                return Err(ServerError::BadRequest(format!("Unsupported method: {}", m)))
            }
        };

        match routes.get(&req.path) {
            Some(handler) => handler.handle(req),
            None => Err(ServerError::NotFound),
        }
    }
}

#[derive(Default)]
pub struct DispatcherBuilder {
    get_map: HashMap<String, Arc<dyn RequestHandlerStrategy>>,
    post_map: HashMap<String, Arc<dyn RequestHandlerStrategy>>,
}

impl DispatcherBuilder {
    pub fn get(mut self, path: &str, handler: Arc<dyn RequestHandlerStrategy>) -> Self { self.get_map.insert(path.to_string(), handler); self }
    pub fn post(mut self, path: &str, handler: Arc<dyn RequestHandlerStrategy>) -> Self { self.post_map.insert(path.to_string(), handler); self }

    pub fn build(self) -> Dispatcher {
        Dispatcher { get: self.get_map, post: self.post_map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::OK;

    struct Fixed(&'static str);
    impl RequestHandlerStrategy for Fixed {
        fn handle(&self, _req: &HttpRequest) -> Result<Response, ServerError> {
            Ok(Response::new(OK).with_body(self.0))
        }
    }

    fn request(method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest {
            method,
            path: path.to_string(),
            query: String::new(),
            version: "HTTP/1.1".into(),
            headers: HashMap::new(),
            body: Vec::new(),
            peer_ip: None,
        }
    }

    #[test]
    fn routes_by_method_and_path() {
        let dispatcher = Dispatcher::builder()
            .get("/a", Arc::new(Fixed("get a")))
            .post("/a", Arc::new(Fixed("post a")))
            .build();

        let body = |m, p| dispatcher.dispatch(&request(m, p)).map(|r| r.body);
        assert_eq!(body(HttpMethod::GET, "/a").unwrap(), b"get a");
        assert_eq!(body(HttpMethod::HEAD, "/a").unwrap(), b"get a");
        assert_eq!(body(HttpMethod::POST, "/a").unwrap(), b"post a");
        assert!(matches!(body(HttpMethod::GET, "/b"), Err(ServerError::NotFound)));
        assert!(matches!(
            body(HttpMethod::Unsupported("PUT".into()), "/a"),
            Err(ServerError::BadRequest(_))
        ));
    }
}
