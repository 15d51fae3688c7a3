//! `POST /ai/chat`: relays one message to the configured chat backend.

use axum::{Router, extract::State, routing::post};
use dealflow_core::{access::Identity, store::CrmStore};
use serde::{Deserialize, Serialize};

use super::input;
use crate::{
  AppState,
  error::{ApiError, Result},
  extract::Json,
};

pub fn routes<S>() -> Router<AppState<S>>
where
  S: CrmStore + Clone + 'static,
{
  Router::new().route("/chat", post(chat::<S>))
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
  pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
  pub reply: String,
}

/// `POST /ai/chat`
pub async fn chat<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>>
where
  S: CrmStore + Clone + 'static,
{
  let message = input::non_blank(body.message).ok_or_else(|| ApiError::bad_request("Message is required"))?;
  tracing::debug!(user = %identity.id, "chat request");
  let reply = state
    .chat
    .reply(&message)
    .await
    .map_err(|e| ApiError::upstream("AI is busy, please try again later.", e))?;
  Ok(Json(ChatReply { reply }))
}
