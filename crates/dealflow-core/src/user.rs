//! Users: the team members who own and work leads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Permission tier of a user.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  AsRefStr, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Role {
  Admin,
  Sales,
  #[default]
  Viewer,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  AsRefStr, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum UserStatus {
  #[default]
  Active,
  Inactive,
}

// ─── User ────────────────────────────────────────────────────────────────────

/// A one-time password-reset code and the instant it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetCode {
  pub code:       String,
  pub expires_at: DateTime<Utc>,
}

impl ResetCode {
  pub fn matches(&self, code: &str, now: DateTime<Utc>) -> bool {
    self.code == code && now < self.expires_at
  }
}

/// A persisted user. Credential material is never serialised.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id:            Uuid,
  pub name:          String,
  pub email:         String,
  pub phone:         Option<String>,
  /// `None` for accounts that only ever signed in through Google.
  #[serde(skip)]
  pub password_hash: Option<String>,
  pub role:          Role,
  pub status:        UserStatus,
  pub department:    Option<String>,
  pub location:      Option<String>,
  pub bio:           Option<String>,
  pub skills:        Vec<String>,
  pub avatar:        Option<String>,
  #[serde(skip)]
  pub google_id:     Option<String>,
  pub reports_to_id: Option<Uuid>,
  #[serde(skip)]
  pub reset_code:    Option<ResetCode>,
  pub joined_at:     Option<DateTime<Utc>>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl User {
  pub fn summary(&self) -> UserSummary {
    UserSummary {
      id:     self.id,
      name:   self.name.clone(),
      email:  self.email.clone(),
      avatar: self.avatar.clone(),
      role:   self.role,
    }
  }

  pub fn is_active(&self) -> bool { self.status == UserStatus::Active }
}

/// The slice of a user embedded in lead and activity payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
  pub id:     Uuid,
  pub name:   String,
  pub email:  String,
  pub avatar: Option<String>,
  pub role:   Role,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::CrmStore::create_user`].
/// Timestamps and the id are assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
  pub name:          String,
  pub email:         String,
  pub phone:         Option<String>,
  pub password_hash: Option<String>,
  pub role:          Role,
  pub status:        UserStatus,
  pub department:    Option<String>,
  pub location:      Option<String>,
  pub bio:           Option<String>,
  pub skills:        Vec<String>,
  pub avatar:        Option<String>,
  pub google_id:     Option<String>,
  pub reports_to_id: Option<Uuid>,
  pub joined_at:     Option<DateTime<Utc>>,
}

impl NewUser {
  /// Convenience constructor with all optional fields set to their defaults.
  pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
    Self { name: name.into(), email: email.into(), ..Self::default() }
  }
}

/// A partial update. `None` leaves a field untouched; the nested `Option` on
/// clearable fields distinguishes "set to null" from "leave alone".
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
  pub name:          Option<String>,
  pub email:         Option<String>,
  pub phone:         Option<Option<String>>,
  pub role:          Option<Role>,
  pub status:        Option<UserStatus>,
  pub department:    Option<Option<String>>,
  pub location:      Option<Option<String>>,
  pub bio:           Option<Option<String>>,
  pub skills:        Option<Vec<String>>,
  pub avatar:        Option<Option<String>>,
  pub google_id:     Option<Option<String>>,
  pub reports_to_id: Option<Option<Uuid>>,
  pub joined_at:     Option<Option<DateTime<Utc>>>,
}

impl UserPatch {
  /// Apply the patch in memory and bump `updated_at`.
  pub fn apply_to(self, user: &mut User, now: DateTime<Utc>) {
    if let Some(v) = self.name { user.name = v; }
    if let Some(v) = self.email { user.email = v; }
    if let Some(v) = self.phone { user.phone = v; }
    if let Some(v) = self.role { user.role = v; }
    if let Some(v) = self.status { user.status = v; }
    if let Some(v) = self.department { user.department = v; }
    if let Some(v) = self.location { user.location = v; }
    if let Some(v) = self.bio { user.bio = v; }
    if let Some(v) = self.skills { user.skills = v; }
    if let Some(v) = self.avatar { user.avatar = v; }
    if let Some(v) = self.google_id { user.google_id = v; }
    if let Some(v) = self.reports_to_id { user.reports_to_id = v; }
    if let Some(v) = self.joined_at { user.joined_at = v; }
    user.updated_at = now;
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;

  #[test]
  fn role_parses_case_insensitively() {
    assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    assert_eq!("SALES".parse::<Role>().unwrap(), Role::Sales);
    assert!("owner".parse::<Role>().is_err());
    assert_eq!(Role::Viewer.as_ref(), "VIEWER");
  }

  #[test]
  fn reset_code_expires() {
    let now = Utc::now();
    let code = ResetCode { code: "123456".into(), expires_at: now + Duration::minutes(15) };
    assert!(code.matches("123456", now));
    assert!(!code.matches("654321", now));
    assert!(!code.matches("123456", now + Duration::minutes(16)));
  }

  #[test]
  fn user_json_omits_secrets() {
    let now = Utc::now();
    let user = User {
      id:            Uuid::new_v4(),
      name:          "Rina".into(),
      email:         "rina@example.com".into(),
      phone:         None,
      password_hash: Some("$argon2id$secret".into()),
      role:          Role::Sales,
      status:        UserStatus::Active,
      department:    None,
      location:      None,
      bio:           None,
      skills:        vec![],
      avatar:        None,
      google_id:     Some("g-123".into()),
      reports_to_id: None,
      reset_code:    Some(ResetCode { code: "111111".into(), expires_at: now }),
      joined_at:     None,
      created_at:    now,
      updated_at:    now,
    };
    let json = serde_json::to_string(&user).unwrap();
    assert!(!json.contains("argon2"));
    assert!(!json.contains("g-123"));
    assert!(!json.contains("111111"));
    assert!(json.contains("\"role\":\"SALES\""));
  }
}
