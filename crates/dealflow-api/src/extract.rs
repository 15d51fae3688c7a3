//! Request extractors whose rejections render as [`ApiError`].
//!
//! Drop-in replacements for the axum extractors of the same name. A body,
//! query string or path segment that fails to parse is answered with
//! `400 {"error": ...}` instead of axum's plain-text rejection.

use axum::{
  extract::{FromRequest, FromRequestParts, Request},
  response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::ApiError;

/// JSON request body; also usable as a response.
#[derive(Debug, Clone, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
  fn into_response(self) -> Response { axum::Json(self.0).into_response() }
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

/// `multipart/form-data` body.
pub struct Multipart(pub axum::extract::Multipart);

impl<S> FromRequest<S> for Multipart
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
    let multipart = axum::extract::Multipart::from_request(req, state).await?;
    Ok(Self(multipart))
  }
}
