use std::io;

use thiserror::Error;

use crate::digest::DigestError;
use crate::reviews::{ReviewError, StoreError};

use super::response::{
    Status, BAD_REQUEST, INTERNAL_SERVER_ERROR, NOT_FOUND, REQUEST_TIMEOUT, SERVICE_UNAVAILABLE,
    TOO_MANY_REQUESTS,
};

const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Endpoint not found")]
    NotFound,
    #[error("{0}")]
    TooManyRequests(String),
    #[error("Internal: {0}")]
    Internal(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Service unavailable")]
    ServiceUnavailable,
    #[error("IO: {0}")]
    Io(io::Error),
}

impl ServerError {
    pub fn status(&self) -> Status {
        match self {
            ServerError::BadRequest(_) => BAD_REQUEST,
            ServerError::NotFound => NOT_FOUND,
            ServerError::TooManyRequests(_) => TOO_MANY_REQUESTS,
            ServerError::Timeout => REQUEST_TIMEOUT,
            ServerError::ServiceUnavailable => SERVICE_UNAVAILABLE,
            ServerError::Internal(_) | ServerError::Io(_) => INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to a client. Internal causes stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            ServerError::Internal(_) | ServerError::Io(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// A socket read timeout is the client being slow, not a server fault.
impl From<io::Error> for ServerError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ServerError::Timeout,
            _ => ServerError::Io(value),
        }
    }
}

impl From<DigestError> for ServerError {
    fn from(value: DigestError) -> Self {
        ServerError::BadRequest(value.to_string())
    }
}

impl From<StoreError> for ServerError {
    fn from(value: StoreError) -> Self {
        ServerError::Internal(value.to_string())
    }
}

impl From<ReviewError> for ServerError {
    fn from(value: ReviewError) -> Self {
        match value {
            ReviewError::Invalid(msg) => ServerError::BadRequest(msg),
            ReviewError::RateLimited => ServerError::TooManyRequests(value.to_string()),
            ReviewError::Store(e) => e.into(),
        }
    }
}
