//! Request handlers, one module per resource.
//!
//! Lead sub-resources (notes, calls, meetings, e-mails, invoices) are all
//! activities of one kind. Their list, read and delete endpoints share the
//! generic handlers below, parameterised by a [`SubResource`] marker.

pub mod activities;
pub mod ai;
pub mod auth;
pub mod dashboard;
pub mod emails;
pub mod input;
pub mod invoices;
pub mod leads;
pub mod notes;
pub mod team;

use axum::extract::State;
use dealflow_core::{
  access::Identity,
  activity::{Activity, ActivityKind, Attachment},
  lead::Lead,
  store::{ActivityQuery, CrmStore},
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
  AppState,
  error::{ApiError, Result},
  extract::{Json, Path},
  upload::Upload,
  views::{self, ActivityView},
};

// ─── Shared lookups ───────────────────────────────────────────────────────────

/// Load a lead the caller is allowed to see.
pub(crate) async fn visible_lead<S: CrmStore>(
  state: &AppState<S>,
  identity: &Identity,
  id: Uuid,
) -> Result<Lead> {
  let lead = state
    .store
    .get_lead(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::not_found("Lead not found"))?;
  if !identity.can_view_lead(&lead) {
    return Err(ApiError::forbidden("Access denied"));
  }
  Ok(lead)
}

/// Load activity `id` of lead `lead_id`, answering 404 when it belongs to
/// another lead or is of another kind.
pub(crate) async fn load_activity<S: CrmStore, R: SubResource>(
  state: &AppState<S>,
  lead_id: Uuid,
  id: Uuid,
) -> Result<Activity> {
  state
    .store
    .get_activity(id)
    .await
    .map_err(ApiError::store)?
    .filter(|a| a.lead_id == lead_id && a.kind() == R::KIND)
    .ok_or_else(R::not_found)
}

/// Load an activity the caller may change.
pub(crate) async fn editable_activity<S: CrmStore, R: SubResource>(
  state: &AppState<S>,
  identity: &Identity,
  lead_id: Uuid,
  id: Uuid,
) -> Result<Activity> {
  let activity = load_activity::<S, R>(state, lead_id, id).await?;
  if !identity.can_modify_activity(&activity) {
    return Err(R::update_denied());
  }
  Ok(activity)
}

/// Write a validated upload to the file store.
pub(crate) async fn store_upload<S: CrmStore>(
  state: &AppState<S>,
  upload: Upload,
) -> Result<Attachment> {
  state
    .files
    .save(&upload.file_name, upload.data)
    .await
    .map_err(|e| ApiError::Internal(format!("cannot store upload: {e}")))
}

/// Remove an uploaded file. Failures are logged only.
pub(crate) async fn discard_file<S: CrmStore>(state: &AppState<S>, path: &str) {
  if let Err(e) = state.files.delete(path).await {
    tracing::warn!(%path, error = %e, "failed to delete uploaded file");
  }
}

// ─── Sub-resources ────────────────────────────────────────────────────────────

/// An activity kind exposed under its own path below a lead.
pub trait SubResource: Send + Sync + 'static {
  const KIND: ActivityKind;
  /// Capitalised singular, e.g. `"Call"`.
  const LABEL: &'static str;

  fn not_found() -> ApiError { ApiError::not_found(format!("{} not found", Self::LABEL)) }

  fn update_denied() -> ApiError {
    ApiError::forbidden(format!("Access denied to update this {}", Self::LABEL.to_lowercase()))
  }

  fn delete_denied() -> ApiError {
    ApiError::forbidden(format!("Access denied to delete this {}", Self::LABEL.to_lowercase()))
  }

  fn deleted_message() -> String { format!("{} deleted successfully", Self::LABEL) }
}

pub struct Notes;
pub struct Calls;
pub struct Meetings;
pub struct Emails;
pub struct Invoices;

impl SubResource for Notes {
  const KIND: ActivityKind = ActivityKind::Note;
  const LABEL: &'static str = "Note";

  fn update_denied() -> ApiError { ApiError::forbidden("Forbidden") }
}

impl SubResource for Calls {
  const KIND: ActivityKind = ActivityKind::Call;
  const LABEL: &'static str = "Call";
}

impl SubResource for Meetings {
  const KIND: ActivityKind = ActivityKind::Meeting;
  const LABEL: &'static str = "Meeting";
}

impl SubResource for Emails {
  const KIND: ActivityKind = ActivityKind::Email;
  const LABEL: &'static str = "Email";

  fn update_denied() -> ApiError { ApiError::forbidden("Access denied") }

  fn delete_denied() -> ApiError { ApiError::forbidden("Access denied") }

  fn deleted_message() -> String { "Email log and attachment deleted successfully".to_owned() }
}

impl SubResource for Invoices {
  const KIND: ActivityKind = ActivityKind::Invoice;
  const LABEL: &'static str = "Invoice";

  fn update_denied() -> ApiError { ApiError::forbidden("Access denied") }
}

/// `GET /leads/{id}/<resource>`: newest first.
pub async fn list<S, R>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(lead_id): Path<Uuid>,
) -> Result<Json<Vec<ActivityView>>>
where
  S: CrmStore + Clone + 'static,
  R: SubResource,
{
  visible_lead(&state, &identity, lead_id).await?;
  let query = ActivityQuery { lead_id: Some(lead_id), kind: Some(R::KIND), ..ActivityQuery::default() };
  let activities = state.store.list_activities(&query).await.map_err(ApiError::store)?;
  Ok(Json(views::activity_views(&*state.store, activities, false).await?))
}

/// `GET /leads/{id}/<resource>/{item_id}`
pub async fn get_one<S, R>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path((lead_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ActivityView>>
where
  S: CrmStore + Clone + 'static,
  R: SubResource,
{
  visible_lead(&state, &identity, lead_id).await?;
  let activity = load_activity::<S, R>(&state, lead_id, id).await?;
  Ok(Json(views::activity_view(&*state.store, activity).await?))
}

/// `DELETE /leads/{id}/<resource>/{item_id}`: also removes the attachment.
pub async fn remove<S, R>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path((lead_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>>
where
  S: CrmStore + Clone + 'static,
  R: SubResource,
{
  let activity = load_activity::<S, R>(&state, lead_id, id).await?;
  if !identity.can_modify_activity(&activity) {
    return Err(R::delete_denied());
  }
  if !state.store.delete_activity(id).await.map_err(ApiError::store)? {
    return Err(R::not_found());
  }
  if let Some(attachment) = activity.detail.attachment() {
    discard_file(&state, &attachment.path).await;
  }
  tracing::info!(%id, kind = R::KIND.as_ref(), by = %identity.id, "activity deleted");
  Ok(Json(json!({ "message": R::deleted_message() })))
}
