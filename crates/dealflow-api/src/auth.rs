//! Bearer-token extractor and role gate.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use dealflow_core::{access::Identity, store::CrmStore, user::Role};

use crate::{AppState, error::ApiError, tokens::TokenKeys};

/// Decode `Authorization: Bearer <jwt>` into the caller's identity.
pub fn authenticate(headers: &HeaderMap, keys: &TokenKeys) -> Result<Identity, ApiError> {
  let token = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .ok_or_else(|| ApiError::Unauthorized("Access token required".to_owned()))?;

  keys.verify(token).map_err(|e| {
    tracing::debug!(error = %e, "rejected bearer token");
    ApiError::Unauthorized("Invalid or expired token".to_owned())
  })
}

impl<S> FromRequestParts<AppState<S>> for Identity
where
  S: CrmStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    authenticate(&parts.headers, &state.tokens)
  }
}

/// Second stage of access control: restrict an endpoint to a role set.
pub trait RequireRole {
  fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError>;
}

impl RequireRole for Identity {
  fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
    if self.has_role(allowed) {
      Ok(())
    } else {
      Err(ApiError::forbidden(
        "Forbidden: You do not have permission to access this resource",
      ))
    }
  }
}
