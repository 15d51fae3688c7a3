//! Handlers for `/leads` endpoints and the routes of their sub-resources.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/leads` | `?status&search&archived`; SALES sees own or assigned |
//! | `GET`  | `/leads/by-status` | Grouped by status with per-status totals |
//! | `POST` | `/leads` | ADMIN, SALES |
//! | `GET`  | `/leads/{id}` | 404 if absent, 403 outside the caller's scope |
//! | `PUT`/`PATCH` | `/leads/{id}` | ADMIN, SALES |
//! | `DELETE` | `/leads/{id}` | ADMIN |

use std::collections::BTreeMap;

use axum::{
  Router,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
  routing::{get, post},
};
use chrono::{DateTime, Utc};
use dealflow_core::{
  access::Identity,
  lead::{Contact, LeadPatch, LeadStatus, NewLead, Priority},
  store::{ActivityQuery, CrmStore, LeadOrder, LeadQuery},
  user::Role,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{
  Calls, Emails, Invoices, Meetings, Notes, activities, discard_file, emails, input, invoices,
  notes, visible_lead,
};
use crate::{
  AppState,
  auth::RequireRole,
  error::{ApiError, Result},
  extract::{Json, Path, Query},
  views::{self, LeadView},
};

pub fn routes<S>() -> Router<AppState<S>>
where
  S: CrmStore + Clone + 'static,
{
  Router::new()
    .route("/", get(list::<S>).post(create::<S>))
    .route("/by-status", get(by_status::<S>))
    .route(
      "/{id}",
      get(get_one::<S>).put(update::<S>).patch(update::<S>).delete(remove::<S>),
    )
    // Timeline
    .route(
      "/{id}/activities",
      get(activities::timeline::<S>).post(activities::create::<S>),
    )
    // Notes
    .route("/{id}/notes", get(super::list::<S, Notes>).post(notes::create::<S>))
    .route(
      "/{id}/notes/{item_id}",
      get(super::get_one::<S, Notes>)
        .patch(notes::update::<S>)
        .delete(super::remove::<S, Notes>),
    )
    // Calls
    .route(
      "/{id}/calls",
      get(super::list::<S, Calls>).post(activities::create_scheduled::<S, Calls>),
    )
    .route(
      "/{id}/calls/{item_id}",
      get(super::get_one::<S, Calls>)
        .patch(activities::update_scheduled::<S, Calls>)
        .delete(super::remove::<S, Calls>),
    )
    // Meetings
    .route(
      "/{id}/meetings",
      get(super::list::<S, Meetings>).post(activities::create_scheduled::<S, Meetings>),
    )
    .route(
      "/{id}/meetings/{item_id}",
      get(super::get_one::<S, Meetings>)
        .patch(activities::update_scheduled::<S, Meetings>)
        .delete(super::remove::<S, Meetings>),
    )
    // E-mails
    .route("/{id}/emails", get(super::list::<S, Emails>).post(emails::send::<S>))
    .route("/{id}/email", post(emails::send::<S>))
    .route(
      "/{id}/emails/{item_id}",
      get(super::get_one::<S, Emails>)
        .patch(emails::update::<S>)
        .delete(super::remove::<S, Emails>),
    )
    // Invoices
    .route(
      "/{id}/invoices",
      get(super::list::<S, Invoices>).post(invoices::create::<S>),
    )
    .route(
      "/{id}/invoices/{item_id}",
      get(super::get_one::<S, Invoices>)
        .patch(invoices::update::<S>)
        .delete(super::remove::<S, Invoices>),
    )
}

const WRITERS: [Role; 2] = [Role::Admin, Role::Sales];

fn parse_status(raw: &str) -> Result<LeadStatus> {
  raw.parse().map_err(|_| ApiError::bad_request(format!("Invalid status: {raw}")))
}

fn archived_flag(raw: Option<&str>) -> bool { raw == Some("true") }

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status:   Option<String>,
  pub search:   Option<String>,
  pub archived: Option<String>,
}

/// `GET /leads`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Query(params): Query<ListParams>,
) -> Result<Json<Value>>
where
  S: CrmStore + Clone + 'static,
{
  let query = LeadQuery {
    status: params.status.as_deref().map(parse_status).transpose()?,
    search: input::non_blank(params.search),
    scope: identity.listing_scope(),
    archived: Some(archived_flag(params.archived.as_deref())),
    ..LeadQuery::default()
  };
  let leads = state.store.list_leads(&query).await.map_err(ApiError::store)?;
  let leads = views::lead_views(&*state.store, leads).await?;
  let total = leads.len();
  Ok(Json(json!({ "leads": leads, "total": total })))
}

// ─── Grouped ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ArchivedParams {
  pub archived: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusStat {
  pub status:      LeadStatus,
  pub count:       i64,
  pub total_value: f64,
}

#[derive(Debug, Serialize)]
pub struct Grouped {
  pub grouped: BTreeMap<String, Vec<LeadView>>,
  pub stats:   Vec<StatusStat>,
}

/// `GET /leads/by-status`: the kanban board.
pub async fn by_status<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Query(params): Query<ArchivedParams>,
) -> Result<Json<Grouped>>
where
  S: CrmStore + Clone + 'static,
{
  let query = LeadQuery {
    scope: identity.listing_scope(),
    archived: Some(archived_flag(params.archived.as_deref())),
    order: LeadOrder::RecentlyUpdated,
    ..LeadQuery::default()
  };
  let (leads, totals) = tokio::try_join!(
    state.store.list_leads(&query),
    state.store.totals_by_status(&query),
  )
  .map_err(ApiError::store)?;

  let mut grouped: BTreeMap<String, Vec<LeadView>> = BTreeMap::new();
  for view in views::lead_views(&*state.store, leads).await? {
    grouped.entry(view.lead.status.as_ref().to_owned()).or_default().push(view);
  }
  let stats = totals
    .into_iter()
    .map(|t| StatusStat { status: t.status, count: t.count, total_value: t.total_value })
    .collect();
  Ok(Json(Grouped { grouped, stats }))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /leads/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<Value>>
where
  S: CrmStore + Clone + 'static,
{
  let lead = visible_lead(&state, &identity, id).await?;
  let lead = views::lead_view(&*state.store, lead).await?;
  Ok(Json(json!({ "lead": lead })))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
  pub title:             Option<String>,
  pub company:           Option<String>,
  pub description:       Option<String>,
  #[serde(default)]
  pub contacts:          Vec<Contact>,
  #[serde(default, deserialize_with = "input::amount")]
  pub value:             Option<f64>,
  pub currency:          Option<String>,
  pub status:            Option<LeadStatus>,
  pub priority:          Option<Priority>,
  pub source_origin:     Option<String>,
  #[serde(default, deserialize_with = "input::datetime")]
  pub due_date:          Option<DateTime<Utc>>,
  #[serde(default)]
  pub assigned_user_ids: Vec<Uuid>,
}

/// `POST /leads`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse>
where
  S: CrmStore + Clone + 'static,
{
  identity.require_role(&WRITERS)?;
  let title = input::non_blank(body.title).ok_or_else(|| ApiError::bad_request("Title is required"))?;

  let mut new = NewLead::new(title, identity.id);
  new.company = input::non_blank(body.company);
  new.description = body.description;
  new.contacts = body.contacts;
  new.value = body.value.unwrap_or(0.0);
  if let Some(currency) = input::non_blank(body.currency) {
    new.currency = currency;
  }
  new.status = body.status.unwrap_or_default();
  new.priority = body.priority.unwrap_or_default();
  new.source_origin = input::non_blank(body.source_origin);
  new.due_date = body.due_date;
  new.assigned_user_ids = body.assigned_user_ids;

  let lead = state.store.create_lead(new).await.map_err(ApiError::store)?;
  tracing::info!(id = %lead.id, by = %identity.id, "lead created");
  let lead = views::lead_view(&*state.store, lead).await?;
  Ok((
    StatusCode::CREATED,
    Json(json!({ "lead": lead, "message": "Lead created successfully" })),
  ))
}

// ─── Update ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
  pub title:             Option<String>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub company:           Option<Option<String>>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub description:       Option<Option<String>>,
  pub contacts:          Option<Vec<Contact>>,
  #[serde(default, deserialize_with = "input::amount")]
  pub value:             Option<f64>,
  pub currency:          Option<String>,
  pub status:            Option<LeadStatus>,
  pub priority:          Option<Priority>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub source_origin:     Option<Option<String>>,
  #[serde(default, deserialize_with = "input::nullable_datetime")]
  pub due_date:          Option<Option<DateTime<Utc>>>,
  pub is_archived:       Option<bool>,
  pub assigned_user_ids: Option<Vec<Uuid>>,
}

impl UpdateBody {
  fn into_patch(self) -> Result<LeadPatch> {
    let title = match self.title {
      Some(t) => Some(input::non_blank(Some(t)).ok_or_else(|| ApiError::bad_request("Title is required"))?),
      None => None,
    };
    Ok(LeadPatch {
      title,
      company: self.company,
      description: self.description,
      contacts: self.contacts,
      value: self.value,
      currency: input::non_blank(self.currency),
      status: self.status,
      priority: self.priority,
      source_origin: self.source_origin,
      due_date: self.due_date,
      is_archived: self.is_archived,
      assigned_user_ids: self.assigned_user_ids,
    })
  }
}

/// `PUT|PATCH /leads/{id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(id): Path<Uuid>,
  Json(body): Json<UpdateBody>,
) -> Result<Json<Value>>
where
  S: CrmStore + Clone + 'static,
{
  identity.require_role(&WRITERS)?;
  let mut lead = visible_lead(&state, &identity, id).await?;
  let previous = lead.status;
  body.into_patch()?.apply_to(&mut lead, Utc::now());
  state.store.save_lead(&lead).await.map_err(ApiError::store)?;
  if lead.status != previous {
    tracing::info!(%id, from = previous.as_ref(), to = lead.status.as_ref(), "lead moved");
  }
  let lead = views::lead_view(&*state.store, lead).await?;
  Ok(Json(json!({ "lead": lead, "message": "Lead updated successfully" })))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /leads/{id}`: removes the lead, its activities and their files.
pub async fn remove<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<Value>>
where
  S: CrmStore + Clone + 'static,
{
  if !identity.is_admin() {
    return Err(ApiError::forbidden("Only admins can delete leads"));
  }
  let query = ActivityQuery { lead_id: Some(id), ..ActivityQuery::default() };
  let files: Vec<String> = state
    .store
    .list_activities(&query)
    .await
    .map_err(ApiError::store)?
    .iter()
    .filter_map(|a| a.detail.attachment().map(|f| f.path.clone()))
    .collect();

  if !state.store.delete_lead(id).await.map_err(ApiError::store)? {
    return Err(ApiError::not_found("Lead not found"));
  }
  for path in &files {
    discard_file(&state, path).await;
  }
  tracing::info!(%id, by = %identity.id, "lead deleted");
  Ok(Json(json!({ "message": "Lead deleted successfully" })))
}
