//! The lead timeline, generic activity creation, calls, meetings and the
//! global activity feed.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/leads/{id}/activities` | Every kind, newest first |
//! | `POST` | `/leads/{id}/activities` | `type` required; not for invoices |
//! | `POST` | `/leads/{id}/calls`, `/leads/{id}/meetings` | |
//! | `PATCH` | `/leads/{id}/calls/{item_id}`, `.../meetings/{item_id}` | Author or ADMIN |
//! | `GET`  | `/activities` | Latest 50 across visible leads |

use axum::{
  Router,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
  routing::get,
};
use chrono::{DateTime, Utc};
use dealflow_core::{
  access::Identity,
  activity::{ActivityDetail, ActivityKind, ActivityPatch, NewActivity},
  store::{ActivityQuery, CrmStore},
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::{SubResource, editable_activity, input, visible_lead};
use crate::{
  AppState,
  error::{ApiError, Result},
  extract::{Json, Path},
  views::{self, ActivityView},
};

const FEED_LIMIT: usize = 50;

pub fn feed_routes<S>() -> Router<AppState<S>>
where
  S: CrmStore + Clone + 'static,
{
  Router::new().route("/", get(feed::<S>))
}

// ─── Shared body ──────────────────────────────────────────────────────────────

/// Fields accepted when creating any non-invoice activity. `content` is the
/// older name for `title`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
  #[serde(rename = "type")]
  pub kind:         Option<String>,
  pub content:      Option<String>,
  pub title:        Option<String>,
  pub description:  Option<String>,
  #[serde(default)]
  pub meta:         Value,
  #[serde(default, deserialize_with = "input::datetime")]
  pub scheduled_at: Option<DateTime<Utc>>,
  pub location:     Option<String>,
  #[serde(default)]
  pub is_completed: bool,
}

/// `description`, falling back to `meta.description`.
fn description_of(description: Option<String>, meta: &Value) -> Option<String> {
  input::non_blank(description).or_else(|| {
    meta
      .get("description")
      .and_then(Value::as_str)
      .map(str::to_owned)
      .and_then(|d| input::non_blank(Some(d)))
  })
}

fn detail_of(kind: ActivityKind, meta: Value) -> Result<ActivityDetail> {
  ActivityDetail::from_parts(kind, meta)
    .map_err(|e| ApiError::bad_request(format!("Invalid meta for {}: {e}", kind.as_ref())))
}

impl CreateBody {
  fn into_new(
    self,
    kind: ActivityKind,
    lead_id: Uuid,
    identity: &Identity,
    missing_title: &str,
  ) -> Result<NewActivity> {
    let title = input::non_blank(self.title)
      .or_else(|| input::non_blank(self.content))
      .ok_or_else(|| ApiError::bad_request(missing_title))?;
    let description = description_of(self.description, &self.meta).unwrap_or_default();
    let mut new = NewActivity::new(lead_id, identity.id, title, detail_of(kind, self.meta)?);
    new.description = description;
    new.scheduled_at = Some(self.scheduled_at.unwrap_or_else(Utc::now));
    new.location = input::non_blank(self.location);
    new.is_completed = self.is_completed;
    Ok(new)
  }
}

async fn insert<S: CrmStore>(state: &AppState<S>, new: NewActivity) -> Result<ActivityView> {
  let activity = state.store.create_activity(new).await.map_err(ApiError::store)?;
  tracing::info!(
    id = %activity.id,
    lead = %activity.lead_id,
    kind = activity.kind().as_ref(),
    "activity created"
  );
  views::activity_view(&*state.store, activity).await
}

// ─── Timeline ─────────────────────────────────────────────────────────────────

/// `GET /leads/{id}/activities`
pub async fn timeline<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(lead_id): Path<Uuid>,
) -> Result<Json<Vec<ActivityView>>>
where
  S: CrmStore + Clone + 'static,
{
  visible_lead(&state, &identity, lead_id).await?;
  let query = ActivityQuery { lead_id: Some(lead_id), ..ActivityQuery::default() };
  let activities = state.store.list_activities(&query).await.map_err(ApiError::store)?;
  Ok(Json(views::activity_views(&*state.store, activities, false).await?))
}

/// `POST /leads/{id}/activities`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(lead_id): Path<Uuid>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse>
where
  S: CrmStore + Clone + 'static,
{
  let kind: ActivityKind = body
    .kind
    .as_deref()
    .and_then(|k| k.parse().ok())
    .ok_or_else(|| ApiError::bad_request("Invalid activity type"))?;
  if kind == ActivityKind::Invoice {
    return Err(ApiError::bad_request("Invoices must be created through the invoice endpoint"));
  }
  let new = body.into_new(kind, lead_id, &identity, "Title (content) is required")?;
  visible_lead(&state, &identity, lead_id).await?;
  Ok((StatusCode::CREATED, Json(insert(&state, new).await?)))
}

// ─── Calls & meetings ─────────────────────────────────────────────────────────

/// `POST /leads/{id}/calls` and `/leads/{id}/meetings`
pub async fn create_scheduled<S, R>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(lead_id): Path<Uuid>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse>
where
  S: CrmStore + Clone + 'static,
  R: SubResource,
{
  let missing = format!("{} title is required", R::LABEL);
  let new = body.into_new(R::KIND, lead_id, &identity, &missing)?;
  visible_lead(&state, &identity, lead_id).await?;
  Ok((StatusCode::CREATED, Json(insert(&state, new).await?)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
  pub content:      Option<String>,
  pub title:        Option<String>,
  pub description:  Option<String>,
  /// Replaces the whole payload when present.
  pub meta:         Option<Value>,
  #[serde(default, deserialize_with = "input::datetime")]
  pub scheduled_at: Option<DateTime<Utc>>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub location:     Option<Option<String>>,
  pub is_completed: Option<bool>,
}

/// `PATCH /leads/{id}/calls/{item_id}` and `.../meetings/{item_id}`
pub async fn update_scheduled<S, R>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path((lead_id, id)): Path<(Uuid, Uuid)>,
  Json(body): Json<UpdateBody>,
) -> Result<Json<ActivityView>>
where
  S: CrmStore + Clone + 'static,
  R: SubResource,
{
  let title = input::non_blank(body.title)
    .or_else(|| input::non_blank(body.content))
    .ok_or_else(|| ApiError::bad_request(format!("{} title is required", R::LABEL)))?;
  let mut activity = editable_activity::<S, R>(&state, &identity, lead_id, id).await?;

  let meta = body.meta;
  let description = description_of(body.description, meta.as_ref().unwrap_or(&Value::Null));
  let patch = ActivityPatch {
    title: Some(title),
    description,
    scheduled_at: body.scheduled_at.map(Some),
    location: body.location.map(input::non_blank),
    is_completed: body.is_completed,
    detail: meta.map(|m| detail_of(R::KIND, m)).transpose()?,
  };
  patch.apply_to(&mut activity, Utc::now())?;
  state.store.save_activity(&activity).await.map_err(ApiError::store)?;
  Ok(Json(views::activity_view(&*state.store, activity).await?))
}

// ─── Feed ─────────────────────────────────────────────────────────────────────

/// `GET /activities`
pub async fn feed<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
) -> Result<Json<Vec<ActivityView>>>
where
  S: CrmStore + Clone + 'static,
{
  let query = ActivityQuery {
    scope: identity.listing_scope(),
    limit: Some(FEED_LIMIT),
    ..ActivityQuery::default()
  };
  let activities = state.store.list_activities(&query).await.map_err(ApiError::store)?;
  Ok(Json(views::activity_views(&*state.store, activities, true).await?))
}
