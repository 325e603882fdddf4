pub mod errors;
pub mod handler;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
