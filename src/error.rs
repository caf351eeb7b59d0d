//! Request error type
//!
//! Every pipeline stage returns `Result<Response, ServeError>`. The recover
//! stage turns an `Err` into an HTTP response with the status given by
//! [`ServeError::status`].

use hyper::StatusCode;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to build response: {0}")]
    Http(#[from] hyper::http::Error),
    #[error("handler panicked: {0}")]
    Panic(String),
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Io(e) => match e.kind() {
                io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
                io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Http(_) | Self::Panic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
