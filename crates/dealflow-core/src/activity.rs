//! Activities: timestamped interactions attached to a lead.
//!
//! Every activity shares a common envelope (title, schedule, completion) and
//! carries a typed [`ActivityDetail`] payload. The variant name serves as the
//! `kind` discriminant stored in the database; the payload is stored as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, EnumIter, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// The discriminant of [`ActivityDetail`], usable on its own in queries.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr,
  EnumString, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ActivityKind {
  Note,
  Call,
  Meeting,
  Email,
  Invoice,
  Task,
}

// ─── Payload sub-types ───────────────────────────────────────────────────────

/// An uploaded file kept on disk; only its location lives in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
  /// Public URL the file is served from.
  pub url:       String,
  /// Path relative to the upload directory.
  pub path:      String,
  pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDetail {
  #[serde(default)]
  pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDetail {
  #[serde(default)]
  pub outcome:          Option<String>,
  #[serde(default)]
  pub duration_minutes: Option<u32>,
  /// Client-defined fields kept verbatim.
  #[serde(flatten)]
  pub extra:            Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingDetail {
  #[serde(default)]
  pub attendees: Vec<String>,
  #[serde(flatten)]
  pub extra:     Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDetail {
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailStatus {
  #[default]
  Draft,
  Sent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailDetail {
  pub status:       EmailStatus,
  /// Display label of the sender, e.g. `"Rina from Dealflow"`.
  pub from:         String,
  pub to:           String,
  pub cc:           Option<String>,
  pub bcc:          Option<String>,
  pub reply_to:     Option<String>,
  pub message_body: String,
  pub attachment:   Option<Attachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
  #[default]
  Draft,
  Sent,
  Paid,
  Overdue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceItem {
  pub description: String,
  pub quantity:    f64,
  pub unit_price:  f64,
  pub amount:      f64,
  #[serde(flatten)]
  pub extra:       Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceDetail {
  pub status:       InvoiceStatus,
  pub items:        Vec<InvoiceItem>,
  pub notes:        String,
  pub billed_by:    String,
  pub billed_to:    String,
  pub subtotal:     f64,
  pub tax:          f64,
  pub total_amount: f64,
  pub invoice_date: Option<DateTime<Utc>>,
  pub due_date:     Option<DateTime<Utc>>,
}

impl InvoiceDetail {
  /// A paid invoice no longer needs chasing.
  pub fn is_settled(&self) -> bool { self.status == InvoiceStatus::Paid }
}

// ─── ActivityDetail ──────────────────────────────────────────────────────────

/// The typed payload of an activity. Serialises as
/// `{"type": "<KIND>", "meta": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "meta", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityDetail {
  Note(NoteDetail),
  Call(CallDetail),
  Meeting(MeetingDetail),
  Email(EmailDetail),
  Invoice(InvoiceDetail),
  Task(TaskDetail),
}

impl ActivityDetail {
  pub fn kind(&self) -> ActivityKind {
    match self {
      Self::Note(_) => ActivityKind::Note,
      Self::Call(_) => ActivityKind::Call,
      Self::Meeting(_) => ActivityKind::Meeting,
      Self::Email(_) => ActivityKind::Email,
      Self::Invoice(_) => ActivityKind::Invoice,
      Self::Task(_) => ActivityKind::Task,
    }
  }

  /// Serialise the inner payload (without the type tag) for the `meta`
  /// database column.
  pub fn to_json(&self) -> Result<Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("meta").cloned().unwrap_or(Value::Null))
  }

  /// Rebuild a payload from its kind and JSON body. A missing body yields the
  /// kind's empty payload.
  pub fn from_parts(kind: ActivityKind, meta: Value) -> Result<Self> {
    let meta = if meta.is_null() { Value::Object(Map::new()) } else { meta };
    let wrapped = serde_json::json!({ "type": kind.as_ref(), "meta": meta });
    Ok(serde_json::from_value(wrapped)?)
  }

  /// The attachment carried by notes and e-mails, if any.
  pub fn attachment(&self) -> Option<&Attachment> {
    match self {
      Self::Note(n) => n.attachment.as_ref(),
      Self::Email(e) => e.attachment.as_ref(),
      _ => None,
    }
  }
}

// ─── Activity ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
  pub id:            Uuid,
  pub lead_id:       Uuid,
  pub created_by_id: Uuid,
  pub title:         String,
  pub description:   String,
  pub scheduled_at:  Option<DateTime<Utc>>,
  pub location:      Option<String>,
  pub is_completed:  bool,
  #[serde(flatten)]
  pub detail:        ActivityDetail,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl Activity {
  pub fn kind(&self) -> ActivityKind { self.detail.kind() }
}

/// Input to [`crate::store::CrmStore::create_activity`].
#[derive(Debug, Clone)]
pub struct NewActivity {
  pub lead_id:       Uuid,
  pub created_by_id: Uuid,
  pub title:         String,
  pub description:   String,
  pub scheduled_at:  Option<DateTime<Utc>>,
  pub location:      Option<String>,
  pub is_completed:  bool,
  pub detail:        ActivityDetail,
}

impl NewActivity {
  pub fn new(
    lead_id: Uuid,
    created_by_id: Uuid,
    title: impl Into<String>,
    detail: ActivityDetail,
  ) -> Self {
    Self {
      lead_id,
      created_by_id,
      title: title.into(),
      description: String::new(),
      scheduled_at: None,
      location: None,
      is_completed: false,
      detail,
    }
  }

  pub fn into_activity(self, id: Uuid, now: DateTime<Utc>) -> Activity {
    Activity {
      id,
      lead_id: self.lead_id,
      created_by_id: self.created_by_id,
      title: self.title,
      description: self.description,
      scheduled_at: self.scheduled_at,
      location: self.location,
      is_completed: self.is_completed,
      detail: self.detail,
      created_at: now,
      updated_at: now,
    }
  }
}

/// A partial update. The kind of an activity never changes, so a replacement
/// `detail` must be of the same kind.
#[derive(Debug, Clone, Default)]
pub struct ActivityPatch {
  pub title:        Option<String>,
  pub description:  Option<String>,
  pub scheduled_at: Option<Option<DateTime<Utc>>>,
  pub location:     Option<Option<String>>,
  pub is_completed: Option<bool>,
  pub detail:       Option<ActivityDetail>,
}

impl ActivityPatch {
  pub fn apply_to(self, activity: &mut Activity, now: DateTime<Utc>) -> Result<()> {
    if let Some(detail) = self.detail {
      if detail.kind() != activity.kind() {
        return Err(Error::ActivityKindMismatch {
          expected: activity.kind(),
          found:    detail.kind(),
        });
      }
      activity.detail = detail;
    }
    if let Some(v) = self.title { activity.title = v; }
    if let Some(v) = self.description { activity.description = v; }
    if let Some(v) = self.scheduled_at { activity.scheduled_at = v; }
    if let Some(v) = self.location { activity.location = v; }
    if let Some(v) = self.is_completed { activity.is_completed = v; }
    activity.updated_at = now;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn kind_matches_serde_tag() {
    let details = [
      ActivityDetail::Note(NoteDetail::default()),
      ActivityDetail::Call(CallDetail::default()),
      ActivityDetail::Meeting(MeetingDetail::default()),
      ActivityDetail::Email(EmailDetail::default()),
      ActivityDetail::Invoice(InvoiceDetail::default()),
      ActivityDetail::Task(TaskDetail::default()),
    ];
    for detail in details {
      let v = serde_json::to_value(&detail).unwrap();
      assert_eq!(v["type"], detail.kind().as_ref());
    }
  }

  #[test]
  fn from_parts_keeps_client_fields() {
    let detail = ActivityDetail::from_parts(
      ActivityKind::Call,
      json!({ "outcome": "voicemail", "durationMinutes": 3, "dialedNumber": "+62 21 555" }),
    )
    .unwrap();
    let ActivityDetail::Call(call) = &detail else { panic!("expected a call") };
    assert_eq!(call.outcome.as_deref(), Some("voicemail"));
    assert_eq!(call.duration_minutes, Some(3));
    assert_eq!(call.extra["dialedNumber"], "+62 21 555");
    assert_eq!(detail.to_json().unwrap()["dialedNumber"], "+62 21 555");
  }

  #[test]
  fn from_parts_accepts_missing_meta() {
    let detail = ActivityDetail::from_parts(ActivityKind::Invoice, Value::Null).unwrap();
    let ActivityDetail::Invoice(inv) = detail else { panic!("expected an invoice") };
    assert_eq!(inv.status, InvoiceStatus::Draft);
    assert!(inv.items.is_empty());
  }

  #[test]
  fn activity_json_is_flat() {
    let now = Utc::now();
    let activity = NewActivity::new(
      Uuid::new_v4(),
      Uuid::new_v4(),
      "Kickoff",
      ActivityDetail::Meeting(MeetingDetail { attendees: vec!["Budi".into()], ..Default::default() }),
    )
    .into_activity(Uuid::new_v4(), now);
    let v = serde_json::to_value(&activity).unwrap();
    assert_eq!(v["type"], "MEETING");
    assert_eq!(v["meta"]["attendees"][0], "Budi");
    assert_eq!(v["title"], "Kickoff");
    assert_eq!(v["isCompleted"], false);
  }

  #[test]
  fn patch_rejects_kind_change() {
    let mut activity = NewActivity::new(
      Uuid::new_v4(),
      Uuid::new_v4(),
      "Note",
      ActivityDetail::Note(NoteDetail::default()),
    )
    .into_activity(Uuid::new_v4(), Utc::now());
    let patch = ActivityPatch {
      detail: Some(ActivityDetail::Call(CallDetail::default())),
      ..Default::default()
    };
    assert!(matches!(
      patch.apply_to(&mut activity, Utc::now()),
      Err(Error::ActivityKindMismatch { .. })
    ));
    assert_eq!(activity.kind(), ActivityKind::Note);
  }
}
