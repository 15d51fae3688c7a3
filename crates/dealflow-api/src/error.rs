//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Client errors carry the message shown to the caller. Server-side failures
//! are logged and answered with a generic body.

use axum::{
  Json,
  extract::{
    multipart::{MultipartError, MultipartRejection},
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
  http::StatusCode,
  response::{IntoResponse, Response},
};
use dealflow_core::store::StoreError;
use serde_json::json;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// An outbound collaborator (mail, identity, chat) failed. `message` is
  /// safe to show to the caller.
  #[error("{message}: {source}")]
  Upstream {
    message: &'static str,
    #[source]
    source:  BoxError,
  },

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("internal error: {0}")]
  Internal(String),
}

impl ApiError {
  /// Classify a store failure. Constraint violations become 409.
  pub fn store<E: StoreError>(e: E) -> Self {
    if e.is_conflict() {
      ApiError::Conflict("Request conflicts with existing data".to_owned())
    } else {
      ApiError::Store(Box::new(e))
    }
  }

  pub fn upstream(message: &'static str, source: impl Into<BoxError>) -> Self {
    ApiError::Upstream { message, source: source.into() }
  }

  pub fn bad_request(msg: impl Into<String>) -> Self { ApiError::BadRequest(msg.into()) }

  pub fn forbidden(msg: impl Into<String>) -> Self { ApiError::Forbidden(msg.into()) }

  pub fn not_found(msg: impl Into<String>) -> Self { ApiError::NotFound(msg.into()) }
}

impl From<dealflow_core::Error> for ApiError {
  fn from(e: dealflow_core::Error) -> Self {
    use dealflow_core::Error as Core;
    match e {
      Core::Serialization(_) => ApiError::Internal(e.to_string()),
      Core::UnknownActivityType(_)
      | Core::ActivityKindMismatch { .. }
      | Core::InvalidMonth(_)
      | Core::InvalidYear(_) => ApiError::BadRequest(e.to_string()),
      Core::InvoiceSequenceExhausted(_) => ApiError::Conflict(e.to_string()),
    }
  }
}

impl From<MultipartError> for ApiError {
  fn from(e: MultipartError) -> Self { ApiError::BadRequest(format!("Upload Error: {}", e.body_text())) }
}

impl From<JsonRejection> for ApiError {
  fn from(e: JsonRejection) -> Self { ApiError::BadRequest(e.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(e: QueryRejection) -> Self { ApiError::BadRequest(e.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(e: PathRejection) -> Self { ApiError::BadRequest(e.body_text()) }
}

impl From<MultipartRejection> for ApiError {
  fn from(e: MultipartRejection) -> Self { ApiError::BadRequest(e.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Upstream { message, .. } => {
        tracing::error!(error = %self, "upstream call failed");
        (StatusCode::INTERNAL_SERVER_ERROR, (*message).to_owned())
      }
      ApiError::Store(_) | ApiError::Internal(_) => {
        tracing::error!(error = %self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_owned())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;
