//! Handlers for `/team` (member directory and administration) and `/sales`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/team` | All users, by name |
//! | `GET`  | `/team/{id}` | With manager and assigned leads |
//! | `POST` | `/team` | ADMIN |
//! | `PATCH` | `/team/{id}` | ADMIN |
//! | `DELETE` | `/team/{id}` | ADMIN; never the caller's own account |
//! | `GET`  | `/sales` | Active SALES users, for assignment pickers |

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
  store::{CrmStore, StoreError, UserQuery},
  user::{NewUser, Role, User, UserPatch, UserStatus},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{
  auth::{hash_password, parse_role},
  input,
};
use crate::{
  AppState,
  auth::RequireRole,
  error::{ApiError, Result},
  extract::{Json, Path},
  views::{self, ProfileView},
};

pub fn routes<S>() -> Router<AppState<S>>
where
  S: CrmStore + Clone + 'static,
{
  Router::new()
    .route("/", get(list::<S>).post(create::<S>))
    .route("/{id}", get(get_one::<S>).patch(update::<S>).delete(remove::<S>))
}

pub fn sales_routes<S>() -> Router<AppState<S>>
where
  S: CrmStore + Clone + 'static,
{
  Router::new().route("/", get(sales::<S>))
}

fn duplicate_email<E: StoreError>(e: E) -> ApiError {
  if e.is_conflict() {
    ApiError::Conflict("Email already exists".to_owned())
  } else {
    ApiError::store(e)
  }
}

// ─── Read ─────────────────────────────────────────────────────────────────────

/// `GET /team`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _identity: Identity,
) -> Result<Json<Vec<User>>>
where
  S: CrmStore + Clone + 'static,
{
  let users = state.store.list_users(&UserQuery::default()).await.map_err(ApiError::store)?;
  Ok(Json(users))
}

/// `GET /team/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  _identity: Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<ProfileView>>
where
  S: CrmStore + Clone + 'static,
{
  let user = state
    .store
    .get_user(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::not_found("Team member not found"))?;
  Ok(Json(views::profile_view(&*state.store, user).await?))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
  pub name:          Option<String>,
  pub email:         Option<String>,
  pub password:      Option<String>,
  pub role:          Option<String>,
  pub phone:         Option<String>,
  pub department:    Option<String>,
  pub status:        Option<UserStatus>,
  #[serde(default, deserialize_with = "input::datetime")]
  pub joined_at:     Option<DateTime<Utc>>,
  pub location:      Option<String>,
  pub bio:           Option<String>,
  #[serde(default)]
  pub skills:        Vec<String>,
  pub reports_to_id: Option<Uuid>,
}

/// `POST /team`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse>
where
  S: CrmStore + Clone + 'static,
{
  identity.require_role(&[Role::Admin])?;
  let (Some(name), Some(email), Some(password), Some(role)) = (
    input::non_blank(body.name),
    input::non_blank(body.email),
    body.password.filter(|p| !p.is_empty()),
    input::non_blank(body.role),
  ) else {
    return Err(ApiError::bad_request("Name, email, password, and role are required"));
  };

  let mut new = NewUser::new(name, email);
  new.password_hash = Some(hash_password(&password)?);
  new.role = parse_role(&role)?;
  new.phone = input::non_blank(body.phone);
  new.department = input::non_blank(body.department);
  new.status = body.status.unwrap_or_default();
  new.joined_at = Some(body.joined_at.unwrap_or_else(Utc::now));
  new.location = input::non_blank(body.location);
  new.bio = input::non_blank(body.bio);
  new.skills = body.skills;
  new.reports_to_id = body.reports_to_id;

  let user = state.store.create_user(new).await.map_err(duplicate_email)?;
  tracing::info!(id = %user.id, by = %identity.id, "team member created");
  Ok((StatusCode::CREATED, Json(user)))
}

// ─── Update ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
  pub name:          Option<String>,
  pub email:         Option<String>,
  pub role:          Option<String>,
  pub status:        Option<UserStatus>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub phone:         Option<Option<String>>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub department:    Option<Option<String>>,
  #[serde(default, deserialize_with = "input::nullable_datetime")]
  pub joined_at:     Option<Option<DateTime<Utc>>>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub location:      Option<Option<String>>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub bio:           Option<Option<String>>,
  pub skills:        Option<Vec<String>>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub reports_to_id: Option<Option<Uuid>>,
}

impl UpdateBody {
  fn into_patch(self) -> Result<UserPatch> {
    Ok(UserPatch {
      name: input::non_blank(self.name),
      email: input::non_blank(self.email),
      role: input::non_blank(self.role).as_deref().map(parse_role).transpose()?,
      status: self.status,
      phone: self.phone,
      department: self.department,
      joined_at: self.joined_at,
      location: self.location,
      bio: self.bio,
      skills: self.skills,
      reports_to_id: self.reports_to_id,
      ..UserPatch::default()
    })
  }
}

/// `PATCH /team/{id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(id): Path<Uuid>,
  Json(body): Json<UpdateBody>,
) -> Result<Json<User>>
where
  S: CrmStore + Clone + 'static,
{
  identity.require_role(&[Role::Admin])?;
  let patch = body.into_patch()?;
  if patch.reports_to_id == Some(Some(id)) {
    return Err(ApiError::bad_request("A member cannot report to themselves"));
  }
  let mut user = state
    .store
    .get_user(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::not_found("Team member not found"))?;

  patch.apply_to(&mut user, Utc::now());
  state.store.save_user(&user).await.map_err(duplicate_email)?;
  tracing::info!(id = %user.id, by = %identity.id, "team member updated");
  Ok(Json(user))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /team/{id}`
pub async fn remove<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<Value>>
where
  S: CrmStore + Clone + 'static,
{
  identity.require_role(&[Role::Admin])?;
  if id == identity.id {
    return Err(ApiError::forbidden("You cannot delete your own account."));
  }
  let deleted = state.store.delete_user(id).await.map_err(|e| {
    if e.is_conflict() {
      ApiError::Conflict("Team member still owns leads or activities".to_owned())
    } else {
      ApiError::store(e)
    }
  })?;
  if !deleted {
    return Err(ApiError::not_found("Team member not found"));
  }
  tracing::info!(%id, by = %identity.id, "team member deleted");
  Ok(Json(json!({ "message": "Team member deleted successfully" })))
}

// ─── Sales ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SalesMember {
  pub id:   Uuid,
  pub name: String,
  pub role: Role,
}

/// `GET /sales`
pub async fn sales<S>(
  State(state): State<AppState<S>>,
  _identity: Identity,
) -> Result<Json<Vec<SalesMember>>>
where
  S: CrmStore + Clone + 'static,
{
  let query = UserQuery { role: Some(Role::Sales), status: Some(UserStatus::Active) };
  let members = state
    .store
    .list_users(&query)
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .map(|u| SalesMember { id: u.id, name: u.name, role: u.role })
    .collect();
  Ok(Json(members))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn patch_distinguishes_cleared_from_absent() {
    let body: UpdateBody = serde_json::from_value(json!({
      "role": "sales",
      "phone": null,
      "reportsToId": null,
    }))
    .unwrap();
    let patch = body.into_patch().unwrap();
    assert_eq!(patch.role, Some(Role::Sales));
    assert_eq!(patch.phone, Some(None));
    assert_eq!(patch.reports_to_id, Some(None));
    assert_eq!(patch.bio, None);
    assert_eq!(patch.name, None);
  }

  #[test]
  fn unknown_role_is_rejected() {
    let body: UpdateBody = serde_json::from_value(json!({ "role": "owner" })).unwrap();
    assert!(matches!(body.into_patch(), Err(ApiError::BadRequest(_))));
  }
}
