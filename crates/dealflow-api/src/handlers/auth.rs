//! Handlers for `/auth` endpoints: sessions, password recovery and the
//! caller's own profile.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/auth/register` | Public |
//! | `POST` | `/auth/login` | Public |
//! | `POST` | `/auth/google-login` | Public; registers a VIEWER on first sight |
//! | `POST` | `/auth/google-check` | Public; pre-fills the registration form |
//! | `POST` | `/auth/forgot-password` | Public; mails a 6-digit code |
//! | `POST` | `/auth/reset-password` | Public |
//! | `POST` | `/auth/change-password` | Authenticated |
//! | `GET`/`PATCH` | `/auth/profile` | Authenticated |

use axum::{
  Router,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
  routing::{get, post},
};
use chrono::{Duration, Utc};
use dealflow_core::{
  access::Identity,
  store::{CrmStore, StoreError},
  user::{NewUser, ResetCode, Role, User, UserPatch, UserStatus},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::input;
use crate::{
  AppState,
  error::{ApiError, Result},
  extract::Json,
  passwords,
  services::{FederatedProfile, OutgoingMail},
  views::{self, ProfileView},
};

pub fn routes<S>() -> Router<AppState<S>>
where
  S: CrmStore + Clone + 'static,
{
  Router::new()
    .route("/register", post(register::<S>))
    .route("/login", post(login::<S>))
    .route("/google-login", post(google_login::<S>))
    .route("/google-check", post(google_check::<S>))
    .route("/forgot-password", post(forgot_password::<S>))
    .route("/reset-password", post(reset_password::<S>))
    .route("/change-password", post(change_password::<S>))
    .route("/profile", get(profile::<S>).patch(update_profile::<S>))
}

const RESET_CODE_TTL_MINUTES: i64 = 15;

// ─── Shared helpers ───────────────────────────────────────────────────────────

pub(crate) fn hash_password(password: &str) -> Result<String> {
  passwords::hash(password).map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

/// Parse a role name in any letter case.
pub(crate) fn parse_role(raw: &str) -> Result<Role> {
  raw.trim().parse().map_err(|_| ApiError::bad_request(format!("Invalid role: {raw}")))
}

fn required(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// A signed-in user and their bearer token.
#[derive(Debug, Serialize)]
pub struct Session {
  pub message: &'static str,
  pub user:    User,
  pub token:   String,
}

fn session<S: CrmStore>(state: &AppState<S>, user: User, message: &'static str) -> Result<Session> {
  let identity = Identity { id: user.id, email: user.email.clone(), role: user.role };
  let token = state
    .tokens
    .issue(&identity)
    .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))?;
  Ok(Session { message, user, token })
}

async fn federated_profile<S: CrmStore>(state: &AppState<S>, token: Option<&str>) -> Result<FederatedProfile> {
  let token = token.ok_or_else(|| ApiError::bad_request("Invalid Google Token"))?;
  state.identity.userinfo(token).await.map_err(|e| {
    tracing::debug!(error = %e, "google token rejected");
    ApiError::bad_request("Invalid Google Token")
  })
}

async fn current_user<S: CrmStore>(state: &AppState<S>, identity: &Identity) -> Result<User> {
  state
    .store
    .get_user(identity.id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::not_found("User not found"))
}

// ─── Register / login ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub name:     Option<String>,
  pub email:    Option<String>,
  pub password: Option<String>,
  pub phone:    Option<String>,
  pub role:     Option<String>,
}

/// `POST /auth/register`
pub async fn register<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse>
where
  S: CrmStore + Clone + 'static,
{
  let (Some(name), Some(email), Some(password)) =
    (required(&body.name), required(&body.email), body.password.as_deref().filter(|p| !p.is_empty()))
  else {
    return Err(ApiError::bad_request("Name, email, and password are required"));
  };
  let role = match required(&body.role) {
    Some(raw) => parse_role(raw)?,
    None => Role::Viewer,
  };

  let taken = state.store.get_user_by_email(email).await.map_err(ApiError::store)?;
  if taken.is_some() {
    return Err(ApiError::Conflict("User with this email already exists".to_owned()));
  }

  let mut input = NewUser::new(name, email);
  input.phone = input::non_blank(body.phone);
  input.role = role;
  input.password_hash = Some(hash_password(password)?);
  let user = state.store.create_user(input).await.map_err(|e| {
    if e.is_conflict() {
      ApiError::Conflict("User with this email already exists".to_owned())
    } else {
      ApiError::store(e)
    }
  })?;
  tracing::info!(id = %user.id, role = user.role.as_ref(), "user registered");

  Ok((StatusCode::CREATED, Json(session(&state, user, "User registered successfully")?)))
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub email:    Option<String>,
  pub password: Option<String>,
}

/// `POST /auth/login`
pub async fn login<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<LoginBody>,
) -> Result<Json<Session>>
where
  S: CrmStore + Clone + 'static,
{
  let (Some(email), Some(password)) = (required(&body.email), body.password.as_deref().filter(|p| !p.is_empty()))
  else {
    return Err(ApiError::bad_request("Email and password are required"));
  };
  let invalid = || ApiError::Unauthorized("Invalid email or password".to_owned());

  let user = state
    .store
    .get_user_by_email(email)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(invalid)?;
  let Some(phc) = user.password_hash.as_deref() else {
    return Err(ApiError::bad_request("Please login with Google."));
  };
  if !user.is_active() {
    return Err(ApiError::forbidden("Account is inactive"));
  }
  if !passwords::verify(password, phc) {
    return Err(invalid());
  }
  tracing::info!(id = %user.id, "login");
  Ok(Json(session(&state, user, "Login successful")?))
}

// ─── Google ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GoogleBody {
  pub token: Option<String>,
}

/// `POST /auth/google-login`
pub async fn google_login<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<GoogleBody>,
) -> Result<Json<Session>>
where
  S: CrmStore + Clone + 'static,
{
  let profile = federated_profile(&state, required(&body.token)).await?;
  let existing = state.store.get_user_by_email(&profile.email).await.map_err(ApiError::store)?;

  let user = match existing {
    Some(mut user) => {
      if user.google_id.is_none() {
        let patch = UserPatch {
          google_id: Some(Some(profile.subject)),
          avatar: profile.picture.map(Some),
          ..UserPatch::default()
        };
        patch.apply_to(&mut user, Utc::now());
        state.store.save_user(&user).await.map_err(ApiError::store)?;
        tracing::info!(id = %user.id, "google account linked");
      }
      user
    }
    None => {
      let mut input = NewUser::new(profile.name.unwrap_or_else(|| "Google User".to_owned()), profile.email);
      input.google_id = Some(profile.subject);
      input.avatar = profile.picture;
      input.role = Role::Viewer;
      input.status = UserStatus::Active;
      let user = state.store.create_user(input).await.map_err(ApiError::store)?;
      tracing::info!(id = %user.id, "user registered through google");
      user
    }
  };
  if !user.is_active() {
    return Err(ApiError::forbidden("Account is inactive"));
  }

  Ok(Json(session(&state, user, "Google login successful")?))
}

/// `POST /auth/google-check`
pub async fn google_check<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<GoogleBody>,
) -> Result<Json<Value>>
where
  S: CrmStore + Clone + 'static,
{
  let profile = federated_profile(&state, required(&body.token)).await?;
  let existing = state.store.get_user_by_email(&profile.email).await.map_err(ApiError::store)?;
  if existing.is_some() {
    return Err(ApiError::Conflict("Account already exists. Please login.".to_owned()));
  }
  Ok(Json(json!({
    "email":  profile.email,
    "name":   profile.name,
    "avatar": profile.picture,
  })))
}

// ─── Password recovery ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ForgotBody {
  pub email: Option<String>,
}

/// `POST /auth/forgot-password`
pub async fn forgot_password<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<ForgotBody>,
) -> Result<Json<Value>>
where
  S: CrmStore + Clone + 'static,
{
  let email = required(&body.email).ok_or_else(|| ApiError::bad_request("Email is required"))?;
  let user = state
    .store
    .get_user_by_email(email)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::not_found("Email not found"))?;

  let code = passwords::reset_code();
  let expires_at = Utc::now() + Duration::minutes(RESET_CODE_TTL_MINUTES);
  state
    .store
    .set_reset_code(user.id, Some(ResetCode { code: code.clone(), expires_at }))
    .await
    .map_err(ApiError::store)?;

  let mail = OutgoingMail {
    to: vec![user.email.clone()],
    subject: "Reset Password OTP - CRM App".to_owned(),
    html: format!(
      "<p>Hello {},</p><p>Your password reset code is:</p><h2>{code}</h2>\
       <p>It is valid for {RESET_CODE_TTL_MINUTES} minutes.</p>",
      user.name,
    ),
    ..OutgoingMail::default()
  };
  state
    .mailer
    .send(mail)
    .await
    .map_err(|e| ApiError::upstream("Failed to send email. Please try again later.", e))?;
  tracing::info!(id = %user.id, "reset code sent");

  Ok(Json(json!({ "message": "OTP code sent to email" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetBody {
  pub email:        Option<String>,
  pub code:         Option<String>,
  pub new_password: Option<String>,
}

/// `POST /auth/reset-password`
pub async fn reset_password<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<ResetBody>,
) -> Result<Json<Value>>
where
  S: CrmStore + Clone + 'static,
{
  let invalid = || ApiError::bad_request("Invalid or expired OTP code");
  let (Some(email), Some(code)) = (required(&body.email), required(&body.code)) else {
    return Err(invalid());
  };
  let new_password = body
    .new_password
    .as_deref()
    .filter(|p| !p.is_empty())
    .ok_or_else(|| ApiError::bad_request("New password is required"))?;

  let user = state
    .store
    .get_user_by_email(email)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(invalid)?;
  let valid = user.reset_code.as_ref().is_some_and(|r| r.matches(code, Utc::now()));
  if !valid {
    return Err(invalid());
  }

  state
    .store
    .set_password(user.id, hash_password(new_password)?)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(id = %user.id, "password reset");
  Ok(Json(json!({ "message": "Password successfully reset" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordBody {
  pub current_password: Option<String>,
  pub new_password:     Option<String>,
}

/// `POST /auth/change-password`
pub async fn change_password<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Json(body): Json<ChangePasswordBody>,
) -> Result<Json<Value>>
where
  S: CrmStore + Clone + 'static,
{
  let (Some(current), Some(new_password)) = (
    body.current_password.as_deref().filter(|p| !p.is_empty()),
    body.new_password.as_deref().filter(|p| !p.is_empty()),
  ) else {
    return Err(ApiError::bad_request("Current and new passwords are required"));
  };

  let user = state.store.get_user(identity.id).await.map_err(ApiError::store)?;
  let Some((user, phc)) = user.and_then(|u| u.password_hash.clone().map(|phc| (u, phc))) else {
    return Err(ApiError::bad_request("User not found or logged in via Google"));
  };
  if !passwords::verify(current, &phc) {
    return Err(ApiError::forbidden("Incorrect current password"));
  }
  if new_password.chars().count() < passwords::MIN_PASSWORD_LEN {
    return Err(ApiError::bad_request("New password must be at least 8 characters long"));
  }

  state
    .store
    .set_password(user.id, hash_password(new_password)?)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(id = %user.id, "password changed");
  Ok(Json(json!({ "message": "Password changed successfully" })))
}

// ─── Profile ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
  pub user: ProfileView,
}

/// `GET /auth/profile`
pub async fn profile<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
) -> Result<Json<ProfileResponse>>
where
  S: CrmStore + Clone + 'static,
{
  let user = current_user(&state, &identity).await?;
  Ok(Json(ProfileResponse { user: views::profile_view(&*state.store, user).await? }))
}

#[derive(Debug, Deserialize)]
pub struct ProfileBody {
  pub name:     Option<String>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub phone:    Option<Option<String>>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub location: Option<Option<String>>,
  #[serde(default, deserialize_with = "input::nullable")]
  pub bio:      Option<Option<String>>,
  pub skills:   Option<Vec<String>>,
}

/// `PATCH /auth/profile`: only the self-service fields.
pub async fn update_profile<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Json(body): Json<ProfileBody>,
) -> Result<Json<Value>>
where
  S: CrmStore + Clone + 'static,
{
  let mut user = current_user(&state, &identity).await?;
  let patch = UserPatch {
    name: input::non_blank(body.name),
    phone: body.phone,
    location: body.location,
    bio: body.bio,
    skills: body.skills,
    ..UserPatch::default()
  };
  patch.apply_to(&mut user, Utc::now());
  state.store.save_user(&user).await.map_err(ApiError::store)?;
  Ok(Json(json!({ "user": user, "message": "Profile updated successfully" })))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn roles_parse_in_any_case() {
    assert_eq!(parse_role("sales").unwrap(), Role::Sales);
    assert_eq!(parse_role(" ADMIN ").unwrap(), Role::Admin);
    assert!(matches!(parse_role("owner"), Err(ApiError::BadRequest(_))));
  }

  #[test]
  fn blank_fields_are_missing() {
    assert_eq!(required(&Some("  ".into())), None);
    assert_eq!(required(&Some(" ayu@example.com ".into())), Some("ayu@example.com"));
    assert_eq!(required(&None), None);
  }
}
