//! Leads: sales opportunities moving through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString};
use uuid::Uuid;

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Pipeline stage. `Won` and `Lost` are terminal in the UI but a lead may be
/// moved back out of them.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
  AsRefStr, EnumString, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
  #[default]
  LeadIn,
  ContactMade,
  NeedsDefined,
  ProposalMade,
  Negotiation,
  Won,
  Lost,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  AsRefStr, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
}

pub const DEFAULT_CURRENCY: &str = "IDR";

// ─── Lead ────────────────────────────────────────────────────────────────────

/// A person to talk to at the prospect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
  pub name:     String,
  #[serde(default)]
  pub email:    Option<String>,
  #[serde(default)]
  pub phone:    Option<String>,
  #[serde(default)]
  pub position: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
  pub id:                Uuid,
  pub title:             String,
  pub company:           Option<String>,
  pub description:       Option<String>,
  pub contacts:          Vec<Contact>,
  pub value:             f64,
  pub currency:          String,
  pub status:            LeadStatus,
  pub priority:          Priority,
  pub source_origin:     Option<String>,
  pub due_date:          Option<DateTime<Utc>>,
  /// Stamped the first time the lead enters `Won`; never cleared.
  pub won_at:            Option<DateTime<Utc>>,
  /// Stamped the first time the lead enters `Lost`; never cleared.
  pub lost_at:           Option<DateTime<Utc>>,
  pub is_archived:       bool,
  pub created_by_id:     Uuid,
  pub assigned_user_ids: Vec<Uuid>,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

impl Lead {
  pub fn is_assigned_to(&self, user_id: Uuid) -> bool {
    self.assigned_user_ids.contains(&user_id)
  }

  /// Record a status change, stamping `won_at` / `lost_at` on the first
  /// transition into the corresponding terminal state.
  pub fn transition(&mut self, status: LeadStatus, now: DateTime<Utc>) {
    if status == self.status {
      return;
    }
    match status {
      LeadStatus::Won if self.won_at.is_none() => self.won_at = Some(now),
      LeadStatus::Lost if self.lost_at.is_none() => self.lost_at = Some(now),
      _ => {}
    }
    self.status = status;
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::CrmStore::create_lead`].
#[derive(Debug, Clone)]
pub struct NewLead {
  pub title:             String,
  pub company:           Option<String>,
  pub description:       Option<String>,
  pub contacts:          Vec<Contact>,
  pub value:             f64,
  pub currency:          String,
  pub status:            LeadStatus,
  pub priority:          Priority,
  pub source_origin:     Option<String>,
  pub due_date:          Option<DateTime<Utc>>,
  pub created_by_id:     Uuid,
  pub assigned_user_ids: Vec<Uuid>,
}

impl NewLead {
  /// Convenience constructor with all optional fields set to their defaults.
  pub fn new(title: impl Into<String>, created_by_id: Uuid) -> Self {
    Self {
      title: title.into(),
      company: None,
      description: None,
      contacts: Vec::new(),
      value: 0.0,
      currency: DEFAULT_CURRENCY.to_owned(),
      status: LeadStatus::default(),
      priority: Priority::default(),
      source_origin: None,
      due_date: None,
      created_by_id,
      assigned_user_ids: Vec::new(),
    }
  }

  /// Materialise the lead as it will be stored at `now`.
  pub fn into_lead(self, id: Uuid, now: DateTime<Utc>) -> Lead {
    Lead {
      id,
      title: self.title,
      company: self.company,
      description: self.description,
      contacts: self.contacts,
      value: self.value,
      currency: self.currency,
      status: self.status,
      priority: self.priority,
      source_origin: self.source_origin,
      due_date: self.due_date,
      won_at: (self.status == LeadStatus::Won).then_some(now),
      lost_at: (self.status == LeadStatus::Lost).then_some(now),
      is_archived: false,
      created_by_id: self.created_by_id,
      assigned_user_ids: self.assigned_user_ids,
      created_at: now,
      updated_at: now,
    }
  }
}

/// A partial update to a lead.
///
/// `assigned_user_ids` replaces the whole assignee set when present; it is
/// never merged with the existing assignees.
#[derive(Debug, Clone, Default)]
pub struct LeadPatch {
  pub title:             Option<String>,
  pub company:           Option<Option<String>>,
  pub description:       Option<Option<String>>,
  pub contacts:          Option<Vec<Contact>>,
  pub value:             Option<f64>,
  pub currency:          Option<String>,
  pub status:            Option<LeadStatus>,
  pub priority:          Option<Priority>,
  pub source_origin:     Option<Option<String>>,
  pub due_date:          Option<Option<DateTime<Utc>>>,
  pub is_archived:       Option<bool>,
  pub assigned_user_ids: Option<Vec<Uuid>>,
}

impl LeadPatch {
  pub fn apply_to(self, lead: &mut Lead, now: DateTime<Utc>) {
    if let Some(v) = self.title { lead.title = v; }
    if let Some(v) = self.company { lead.company = v; }
    if let Some(v) = self.description { lead.description = v; }
    if let Some(v) = self.contacts { lead.contacts = v; }
    if let Some(v) = self.value { lead.value = v; }
    if let Some(v) = self.currency { lead.currency = v; }
    if let Some(v) = self.priority { lead.priority = v; }
    if let Some(v) = self.source_origin { lead.source_origin = v; }
    if let Some(v) = self.due_date { lead.due_date = v; }
    if let Some(v) = self.is_archived { lead.is_archived = v; }
    if let Some(v) = self.assigned_user_ids { lead.assigned_user_ids = v; }
    if let Some(status) = self.status {
      lead.transition(status, now);
    }
    lead.updated_at = now;
  }
}
