//! # Axiom API
//!
//! The HTTP/JSON surface of a node: read endpoints over the ledger and the
//! peer table, plus the staking and debug control endpoints used by clients
//! and test harnesses. Every response carries a top-level `status` field;
//! errors come back as `{status: "error", kind, message}` with a matching
//! HTTP code.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod handlers;
pub mod search;
pub mod server;
pub mod types;

pub use search::{LocalContentSearch, SearchProvider};
pub use server::{build_router, serve, ApiContext};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request body or parameters were unusable.
    #[error("{0}")]
    BadRequest(String),

    /// The backing store failed.
    #[error(transparent)]
    Storage(#[from] axiom_storage::StorageError),

    /// The ledger refused the operation.
    #[error(transparent)]
    Ledger(#[from] axiom_ledger::LedgerError),

    /// An internal service was unavailable.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Storage(_) => "storage",
            ApiError::Ledger(_) => "ledger",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Ledger(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "status": "error",
            "kind": self.kind(),
            "message": self.to_string(),
        }));
        (self.status_code(), body).into_response()
    }
}

/// Result type for HTTP handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
