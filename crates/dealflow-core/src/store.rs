//! The `CrmStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `dealflow-store-sqlite`).
//! The HTTP layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  access::Scope,
  activity::{Activity, ActivityKind, NewActivity},
  lead::{Lead, LeadStatus, NewLead},
  period::Window,
  user::{NewUser, ResetCode, Role, User, UserStatus},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`CrmStore::list_users`]. Results are ordered by name.
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
  pub role:   Option<Role>,
  pub status: Option<UserStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeadOrder {
  /// `created_at` descending.
  #[default]
  Newest,
  /// `updated_at` descending.
  RecentlyUpdated,
}

/// Parameters for lead listings and aggregates.
#[derive(Debug, Clone, Default)]
pub struct LeadQuery {
  pub status:     Option<LeadStatus>,
  /// Case-insensitive substring match over title and company.
  pub search:     Option<String>,
  pub scope:      Scope,
  /// `None` matches archived and live leads alike.
  pub archived:   Option<bool>,
  pub created_in: Option<Window>,
  pub won_in:     Option<Window>,
  pub order:      LeadOrder,
  pub limit:      Option<usize>,
}

impl LeadQuery {
  /// Live (non-archived) leads visible through `scope`.
  pub fn live(scope: Scope) -> Self {
    Self { scope, archived: Some(false), ..Self::default() }
  }

  pub fn status(mut self, status: LeadStatus) -> Self {
    self.status = Some(status);
    self
  }

  pub fn created_in(mut self, window: Option<Window>) -> Self {
    self.created_in = window;
    self
  }

  pub fn won_in(mut self, window: Window) -> Self {
    self.won_in = Some(window);
    self
  }
}

/// Count and value sum over a set of leads.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LeadTotals {
  pub count:     i64,
  pub value_sum: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusTotals {
  pub status:      LeadStatus,
  pub count:       i64,
  pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCount {
  /// `None` for leads without a recorded source.
  pub source: Option<String>,
  pub count:  i64,
}

/// Parameters for [`CrmStore::list_activities`]. Results are newest first.
///
/// For activities, [`Scope::OwnedOrAssigned`] also admits activities the user
/// authored on leads they otherwise cannot see.
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
  pub lead_id: Option<Uuid>,
  pub kind:    Option<ActivityKind>,
  pub scope:   Scope,
  pub limit:   Option<usize>,
}

/// Storage errors that the HTTP layer needs to tell apart.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// A uniqueness or referential constraint rejected the write.
  fn is_conflict(&self) -> bool;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a CRM storage backend.
///
/// `save_*` methods persist an entity the caller has already modified in
/// memory (see the `*Patch` types); ids and creation timestamps are never
/// changed by a save.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait CrmStore: Send + Sync {
  type Error: StoreError;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Persist a new user. Fails with a conflict if the email is taken.
  fn create_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Email lookup is case-insensitive.
  fn get_user_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  /// Fetch several users at once; unknown ids are skipped.
  fn get_users<'a>(
    &'a self,
    ids: &'a [Uuid],
  ) -> impl Future<Output = Result<Vec<User>, Self::Error>> + Send + 'a;

  fn list_users<'a>(
    &'a self,
    query: &'a UserQuery,
  ) -> impl Future<Output = Result<Vec<User>, Self::Error>> + Send + 'a;

  /// Overwrite the mutable profile fields of an existing user.
  fn save_user<'a>(
    &'a self,
    user: &'a User,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replace the password hash and drop any pending reset code.
  fn set_password(
    &self,
    id: Uuid,
    password_hash: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn set_reset_code(
    &self,
    id: Uuid,
    code: Option<ResetCode>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove a user. Returns `false` if no such user existed. Fails with a
  /// conflict while the user still authors leads or activities.
  fn delete_user(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Leads ─────────────────────────────────────────────────────────────

  fn create_lead(
    &self,
    input: NewLead,
  ) -> impl Future<Output = Result<Lead, Self::Error>> + Send + '_;

  fn get_lead(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + '_;

  fn get_leads<'a>(
    &'a self,
    ids: &'a [Uuid],
  ) -> impl Future<Output = Result<Vec<Lead>, Self::Error>> + Send + 'a;

  fn list_leads<'a>(
    &'a self,
    query: &'a LeadQuery,
  ) -> impl Future<Output = Result<Vec<Lead>, Self::Error>> + Send + 'a;

  /// Persist a modified lead, including its assignee set.
  fn save_lead<'a>(
    &'a self,
    lead: &'a Lead,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Remove a lead and its activities. Returns `false` if it did not exist.
  fn delete_lead(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn lead_totals<'a>(
    &'a self,
    query: &'a LeadQuery,
  ) -> impl Future<Output = Result<LeadTotals, Self::Error>> + Send + 'a;

  /// One row per status present in the matching set.
  fn totals_by_status<'a>(
    &'a self,
    query: &'a LeadQuery,
  ) -> impl Future<Output = Result<Vec<StatusTotals>, Self::Error>> + Send + 'a;

  /// Lead counts per source, largest first.
  fn count_by_source<'a>(
    &'a self,
    query: &'a LeadQuery,
  ) -> impl Future<Output = Result<Vec<SourceCount>, Self::Error>> + Send + 'a;

  // ── Activities ────────────────────────────────────────────────────────

  /// Persist a non-invoice activity.
  fn create_activity(
    &self,
    input: NewActivity,
  ) -> impl Future<Output = Result<Activity, Self::Error>> + Send + '_;

  /// Persist an invoice, titling it with the next number for the month of
  /// `issued_at`. Numbering and insertion happen in one transaction.
  fn create_invoice(
    &self,
    input: NewActivity,
    issued_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Activity, Self::Error>> + Send + '_;

  fn get_activity(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Activity>, Self::Error>> + Send + '_;

  fn list_activities<'a>(
    &'a self,
    query: &'a ActivityQuery,
  ) -> impl Future<Output = Result<Vec<Activity>, Self::Error>> + Send + 'a;

  fn save_activity<'a>(
    &'a self,
    activity: &'a Activity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn delete_activity(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Open activities for the dashboard agenda: anything scheduled from
  /// `from` onwards, every open invoice, and unscheduled e-mails. Ordered by
  /// schedule (unscheduled last), then newest first.
  fn upcoming_activities(
    &self,
    from: DateTime<Utc>,
    scope: Scope,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Activity>, Self::Error>> + Send + '_;
}
