//! Notes: free text with an optional file, sent as multipart forms.
//!
//! Fields: `content` (required), `attachment` (file), and on update
//! `removeAttachment=true` to drop the current file.

use axum::{
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use dealflow_core::{
  access::Identity,
  activity::{ActivityDetail, NewActivity, NoteDetail},
  store::CrmStore,
};
use uuid::Uuid;

use super::{Notes, discard_file, editable_activity, store_upload, visible_lead};
use crate::{
  AppState,
  error::{ApiError, Result},
  extract::{Json, Multipart, Path},
  upload::MultipartForm,
  views::{self, ActivityView},
};

const FILE_FIELD: &str = "attachment";

fn content_of(form: &MultipartForm) -> Result<String> {
  form
    .text("content")
    .map(str::to_owned)
    .ok_or_else(|| ApiError::bad_request("Content is required"))
}

/// `POST /leads/{id}/notes`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(lead_id): Path<Uuid>,
  Multipart(multipart): Multipart,
) -> Result<impl IntoResponse>
where
  S: CrmStore + Clone + 'static,
{
  let mut form = MultipartForm::read(multipart, FILE_FIELD).await?;
  let content = content_of(&form)?;
  visible_lead(&state, &identity, lead_id).await?;

  let attachment = match form.file.take() {
    Some(upload) => Some(store_upload(&state, upload).await?),
    None => None,
  };
  let saved_path = attachment.as_ref().map(|a| a.path.clone());

  let mut new = NewActivity::new(
    lead_id,
    identity.id,
    "Note",
    ActivityDetail::Note(NoteDetail { attachment }),
  );
  new.description = content;
  new.scheduled_at = Some(Utc::now());

  let note = match state.store.create_activity(new).await {
    Ok(note) => note,
    Err(e) => {
      if let Some(path) = &saved_path {
        discard_file(&state, path).await;
      }
      return Err(ApiError::store(e));
    }
  };
  tracing::info!(id = %note.id, lead = %lead_id, "note created");
  Ok((StatusCode::CREATED, Json(views::activity_view(&*state.store, note).await?)))
}

/// `PATCH /leads/{id}/notes/{item_id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path((lead_id, id)): Path<(Uuid, Uuid)>,
  Multipart(multipart): Multipart,
) -> Result<Json<ActivityView>>
where
  S: CrmStore + Clone + 'static,
{
  let mut form = MultipartForm::read(multipart, FILE_FIELD).await?;
  let content = content_of(&form)?;
  let mut note = editable_activity::<S, Notes>(&state, &identity, lead_id, id).await?;
  let ActivityDetail::Note(detail) = &mut note.detail else {
    return Err(ApiError::Internal(format!("activity {id} is not a note")));
  };

  let mut stale = None;
  let mut fresh = None;
  if let Some(upload) = form.file.take() {
    let attachment = store_upload(&state, upload).await?;
    fresh = Some(attachment.path.clone());
    stale = detail.attachment.replace(attachment);
  } else if form.flag("removeAttachment") == Some(true) {
    stale = detail.attachment.take();
  }

  note.description = content;
  note.updated_at = Utc::now();
  if let Err(e) = state.store.save_activity(&note).await {
    if let Some(path) = &fresh {
      discard_file(&state, path).await;
    }
    return Err(ApiError::store(e));
  }
  if let Some(old) = stale {
    discard_file(&state, &old.path).await;
  }
  Ok(Json(views::activity_view(&*state.store, note).await?))
}
