//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with a fixed microsecond
//! precision and a `Z` suffix, so string comparison in SQL orders them
//! chronologically. Lists and activity payloads are stored as compact JSON.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use dealflow_core::{
  activity::{Activity, ActivityDetail, ActivityKind},
  lead::{Contact, Lead},
  user::{ResetCode, User},
};
use rusqlite::types::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

/// Parse a strum-backed enum code.
pub fn decode_code<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::UnknownCode { column, value: s.to_owned() })
}

/// Split the comma-joined output of `group_concat(user_id)`.
fn decode_id_list(s: Option<String>) -> Result<Vec<Uuid>> {
  match s {
    None => Ok(Vec::new()),
    Some(s) => s.split(',').filter(|p| !p.is_empty()).map(decode_uuid).collect(),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawUser::from_row`].
pub const USER_COLUMNS: &str = "
  u.user_id, u.name, u.email, u.phone, u.password_hash, u.role, u.status,
  u.department, u.location, u.bio, u.skills, u.avatar, u.google_id,
  u.reports_to_id, u.reset_code, u.reset_expires_at, u.joined_at,
  u.created_at, u.updated_at";

/// Raw strings read directly from a `users` row.
pub struct RawUser {
  pub user_id:          String,
  pub name:             String,
  pub email:            String,
  pub phone:            Option<String>,
  pub password_hash:    Option<String>,
  pub role:             String,
  pub status:           String,
  pub department:       Option<String>,
  pub location:         Option<String>,
  pub bio:              Option<String>,
  pub skills:           String,
  pub avatar:           Option<String>,
  pub google_id:        Option<String>,
  pub reports_to_id:    Option<String>,
  pub reset_code:       Option<String>,
  pub reset_expires_at: Option<String>,
  pub joined_at:        Option<String>,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawUser {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:          row.get(0)?,
      name:             row.get(1)?,
      email:            row.get(2)?,
      phone:            row.get(3)?,
      password_hash:    row.get(4)?,
      role:             row.get(5)?,
      status:           row.get(6)?,
      department:       row.get(7)?,
      location:         row.get(8)?,
      bio:              row.get(9)?,
      skills:           row.get(10)?,
      avatar:           row.get(11)?,
      google_id:        row.get(12)?,
      reports_to_id:    row.get(13)?,
      reset_code:       row.get(14)?,
      reset_expires_at: row.get(15)?,
      joined_at:        row.get(16)?,
      created_at:       row.get(17)?,
      updated_at:       row.get(18)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    let reset_code = match (self.reset_code, self.reset_expires_at) {
      (Some(code), Some(at)) => Some(ResetCode { code, expires_at: decode_dt(&at)? }),
      _ => None,
    };
    Ok(User {
      id: decode_uuid(&self.user_id)?,
      name: self.name,
      email: self.email,
      phone: self.phone,
      password_hash: self.password_hash,
      role: decode_code("role", &self.role)?,
      status: decode_code("status", &self.status)?,
      department: self.department,
      location: self.location,
      bio: self.bio,
      skills: serde_json::from_str(&self.skills)?,
      avatar: self.avatar,
      google_id: self.google_id,
      reports_to_id: self.reports_to_id.as_deref().map(decode_uuid).transpose()?,
      reset_code,
      joined_at: decode_opt_dt(self.joined_at)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawLead::from_row`]; expects the table alias `l`.
pub const LEAD_COLUMNS: &str = "
  l.lead_id, l.title, l.company, l.description, l.contacts, l.value,
  l.currency, l.status, l.priority, l.source_origin, l.due_date, l.won_at,
  l.lost_at, l.is_archived, l.created_by_id, l.created_at, l.updated_at,
  (SELECT group_concat(la.user_id) FROM lead_assignees la
    WHERE la.lead_id = l.lead_id) AS assignees";

/// Raw values read from a `leads` row plus its aggregated assignees.
pub struct RawLead {
  pub lead_id:       String,
  pub title:         String,
  pub company:       Option<String>,
  pub description:   Option<String>,
  pub contacts:      String,
  pub value:         f64,
  pub currency:      String,
  pub status:        String,
  pub priority:      String,
  pub source_origin: Option<String>,
  pub due_date:      Option<String>,
  pub won_at:        Option<String>,
  pub lost_at:       Option<String>,
  pub is_archived:   bool,
  pub created_by_id: String,
  pub created_at:    String,
  pub updated_at:    String,
  pub assignees:     Option<String>,
}

impl RawLead {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      lead_id:       row.get(0)?,
      title:         row.get(1)?,
      company:       row.get(2)?,
      description:   row.get(3)?,
      contacts:      row.get(4)?,
      value:         row.get(5)?,
      currency:      row.get(6)?,
      status:        row.get(7)?,
      priority:      row.get(8)?,
      source_origin: row.get(9)?,
      due_date:      row.get(10)?,
      won_at:        row.get(11)?,
      lost_at:       row.get(12)?,
      is_archived:   row.get(13)?,
      created_by_id: row.get(14)?,
      created_at:    row.get(15)?,
      updated_at:    row.get(16)?,
      assignees:     row.get(17)?,
    })
  }

  pub fn into_lead(self) -> Result<Lead> {
    let contacts: Vec<Contact> = serde_json::from_str(&self.contacts)?;
    Ok(Lead {
      id: decode_uuid(&self.lead_id)?,
      title: self.title,
      company: self.company,
      description: self.description,
      contacts,
      value: self.value,
      currency: self.currency,
      status: decode_code("status", &self.status)?,
      priority: decode_code("priority", &self.priority)?,
      source_origin: self.source_origin,
      due_date: decode_opt_dt(self.due_date)?,
      won_at: decode_opt_dt(self.won_at)?,
      lost_at: decode_opt_dt(self.lost_at)?,
      is_archived: self.is_archived,
      created_by_id: decode_uuid(&self.created_by_id)?,
      assigned_user_ids: decode_id_list(self.assignees)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawActivity::from_row`]; expects the alias `a`.
pub const ACTIVITY_COLUMNS: &str = "
  a.activity_id, a.lead_id, a.created_by_id, a.kind, a.title, a.description,
  a.scheduled_at, a.location, a.is_completed, a.meta, a.created_at,
  a.updated_at";

pub struct RawActivity {
  pub activity_id:   String,
  pub lead_id:       String,
  pub created_by_id: String,
  pub kind:          String,
  pub title:         String,
  pub description:   String,
  pub scheduled_at:  Option<String>,
  pub location:      Option<String>,
  pub is_completed:  bool,
  pub meta:          String,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawActivity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      activity_id:   row.get(0)?,
      lead_id:       row.get(1)?,
      created_by_id: row.get(2)?,
      kind:          row.get(3)?,
      title:         row.get(4)?,
      description:   row.get(5)?,
      scheduled_at:  row.get(6)?,
      location:      row.get(7)?,
      is_completed:  row.get(8)?,
      meta:          row.get(9)?,
      created_at:    row.get(10)?,
      updated_at:    row.get(11)?,
    })
  }

  pub fn into_activity(self) -> Result<Activity> {
    let kind: ActivityKind = decode_code("kind", &self.kind)?;
    let meta: serde_json::Value = serde_json::from_str(&self.meta)?;
    Ok(Activity {
      id: decode_uuid(&self.activity_id)?,
      lead_id: decode_uuid(&self.lead_id)?,
      created_by_id: decode_uuid(&self.created_by_id)?,
      title: self.title,
      description: self.description,
      scheduled_at: decode_opt_dt(self.scheduled_at)?,
      location: self.location,
      is_completed: self.is_completed,
      detail: ActivityDetail::from_parts(kind, meta)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Column values ───────────────────────────────────────────────────────────
//
// Positional values in the column order of the matching `*_COLUMNS` list
// (without computed columns), for `?N` placeholders in INSERT and UPDATE.

fn opt_text(s: Option<String>) -> Value { s.map_or(Value::Null, Value::Text) }

fn opt_dt(dt: Option<DateTime<Utc>>) -> Value { opt_text(dt.map(encode_dt)) }

pub fn user_values(u: &User) -> Result<Vec<Value>> {
  let (code, expires) = match &u.reset_code {
    Some(r) => (Some(r.code.clone()), Some(r.expires_at)),
    None => (None, None),
  };
  Ok(vec![
    Value::Text(encode_uuid(u.id)),
    Value::Text(u.name.clone()),
    Value::Text(u.email.clone()),
    opt_text(u.phone.clone()),
    opt_text(u.password_hash.clone()),
    Value::Text(u.role.as_ref().to_owned()),
    Value::Text(u.status.as_ref().to_owned()),
    opt_text(u.department.clone()),
    opt_text(u.location.clone()),
    opt_text(u.bio.clone()),
    Value::Text(serde_json::to_string(&u.skills)?),
    opt_text(u.avatar.clone()),
    opt_text(u.google_id.clone()),
    opt_text(u.reports_to_id.map(encode_uuid)),
    opt_text(code),
    opt_dt(expires),
    opt_dt(u.joined_at),
    Value::Text(encode_dt(u.created_at)),
    Value::Text(encode_dt(u.updated_at)),
  ])
}

pub fn lead_values(l: &Lead) -> Result<Vec<Value>> {
  Ok(vec![
    Value::Text(encode_uuid(l.id)),
    Value::Text(l.title.clone()),
    opt_text(l.company.clone()),
    opt_text(l.description.clone()),
    Value::Text(serde_json::to_string(&l.contacts)?),
    Value::Real(l.value),
    Value::Text(l.currency.clone()),
    Value::Text(l.status.as_ref().to_owned()),
    Value::Text(l.priority.as_ref().to_owned()),
    opt_text(l.source_origin.clone()),
    opt_dt(l.due_date),
    opt_dt(l.won_at),
    opt_dt(l.lost_at),
    Value::Integer(i64::from(l.is_archived)),
    Value::Text(encode_uuid(l.created_by_id)),
    Value::Text(encode_dt(l.created_at)),
    Value::Text(encode_dt(l.updated_at)),
  ])
}

pub fn activity_values(a: &Activity) -> Result<Vec<Value>> {
  Ok(vec![
    Value::Text(encode_uuid(a.id)),
    Value::Text(encode_uuid(a.lead_id)),
    Value::Text(encode_uuid(a.created_by_id)),
    Value::Text(a.kind().as_ref().to_owned()),
    Value::Text(a.title.clone()),
    Value::Text(a.description.clone()),
    opt_dt(a.scheduled_at),
    opt_text(a.location.clone()),
    Value::Integer(i64::from(a.is_completed)),
    Value::Text(a.detail.to_json()?.to_string()),
    Value::Text(encode_dt(a.created_at)),
    Value::Text(encode_dt(a.updated_at)),
  ])
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  #[test]
  fn encoded_timestamps_sort_chronologically() {
    let a = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
    let b = a + Duration::microseconds(1);
    let c = a + Duration::hours(20);
    assert!(encode_dt(a) < encode_dt(b));
    assert!(encode_dt(b) < encode_dt(c));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn empty_assignee_list() {
    assert!(decode_id_list(None).unwrap().is_empty());
  }
}
