//! Error taxonomy for query evaluation.
//!
//! Client-caused problems surface as [`QueryError::Validation`] and map to
//! HTTP 400 with their message intact. Everything else is
//! [`QueryError::Internal`], which maps to HTTP 500 and never leaks its
//! detail to the caller.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    /// Unknown parameter, malformed value, too many keywords, bad pagination
    /// bounds, or an unparseable `Accept` header.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl QueryError {
    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            QueryError::Validation(_) => StatusCode::BAD_REQUEST,
            QueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, QueryError::Validation(_))
    }
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;
