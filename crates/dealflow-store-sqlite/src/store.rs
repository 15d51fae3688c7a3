//! [`SqliteStore`]: the SQLite implementation of [`CrmStore`].

use std::{collections::HashSet, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior, params_from_iter, types::Value};
use uuid::Uuid;

use dealflow_core::{
  access::Scope,
  activity::{Activity, ActivityKind, NewActivity},
  invoice::{invoice_prefix, next_invoice_number},
  lead::{Lead, NewLead},
  store::{
    ActivityQuery, CrmStore, LeadOrder, LeadQuery, LeadTotals, SourceCount,
    StatusTotals, UserQuery,
  },
  user::{NewUser, ResetCode, User},
};

use crate::{
  encode::{
    ACTIVITY_COLUMNS, LEAD_COLUMNS, RawActivity, RawLead, RawUser, USER_COLUMNS,
    activity_values, decode_code, encode_dt, encode_uuid, lead_values,
    user_values,
  },
  filter::{Filter, activity_filter, lead_filter, text},
  schema::SCHEMA,
  Error, Result,
};

const INSERT_USER: &str = "INSERT INTO users (
    user_id, name, email, phone, password_hash, role, status, department,
    location, bio, skills, avatar, google_id, reports_to_id, reset_code,
    reset_expires_at, joined_at, created_at, updated_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
            ?16, ?17, ?18, ?19)";

// Credentials (?5, ?15, ?16) are only written through `set_password` and
// `set_reset_code`.
const UPDATE_USER: &str = "UPDATE users SET
    name = ?2, email = ?3, phone = ?4, role = ?6, status = ?7,
    department = ?8, location = ?9, bio = ?10, skills = ?11, avatar = ?12,
    google_id = ?13, reports_to_id = ?14, joined_at = ?17, updated_at = ?19
  WHERE user_id = ?1";

const INSERT_LEAD: &str = "INSERT INTO leads (
    lead_id, title, company, description, contacts, value, currency, status,
    priority, source_origin, due_date, won_at, lost_at, is_archived,
    created_by_id, created_at, updated_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
            ?16, ?17)";

const UPDATE_LEAD: &str = "UPDATE leads SET
    title = ?2, company = ?3, description = ?4, contacts = ?5, value = ?6,
    currency = ?7, status = ?8, priority = ?9, source_origin = ?10,
    due_date = ?11, won_at = ?12, lost_at = ?13, is_archived = ?14,
    updated_at = ?17
  WHERE lead_id = ?1";

const INSERT_ACTIVITY: &str = "INSERT INTO activities (
    activity_id, lead_id, created_by_id, kind, title, description,
    scheduled_at, location, is_completed, meta, created_at, updated_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const UPDATE_ACTIVITY: &str = "UPDATE activities SET
    title = ?5, description = ?6, scheduled_at = ?7, location = ?8,
    is_completed = ?9, meta = ?10, updated_at = ?12
  WHERE activity_id = ?1";

const ACTIVITY_FROM: &str = "FROM activities a JOIN leads l ON l.lead_id = a.lead_id";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Dealflow CRM store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, e.g. for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a SELECT and map each row on the database thread.
  async fn select<R, F>(&self, sql: String, params: Vec<Value>, map: F) -> Result<Vec<R>>
  where
    R: Send + 'static,
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<R> + Send + 'static,
  {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(params), map)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  /// Run a single write statement and return the number of affected rows.
  async fn execute(&self, sql: &'static str, params: Vec<Value>) -> Result<usize> {
    let n = self
      .conn
      .call(move |conn| Ok(conn.execute(sql, params_from_iter(params))?))
      .await?;
    Ok(n)
  }

  async fn select_users(&self, tail: String, params: Vec<Value>) -> Result<Vec<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u {tail}");
    let raws = self.select(sql, params, RawUser::from_row).await?;
    raws.into_iter().map(RawUser::into_user).collect()
  }

  async fn select_leads(&self, tail: String, params: Vec<Value>) -> Result<Vec<Lead>> {
    let sql = format!("SELECT {LEAD_COLUMNS} FROM leads l {tail}");
    let raws = self.select(sql, params, RawLead::from_row).await?;
    raws.into_iter().map(RawLead::into_lead).collect()
  }

  async fn select_activities(&self, tail: String, params: Vec<Value>) -> Result<Vec<Activity>> {
    let sql = format!("SELECT {ACTIVITY_COLUMNS} {ACTIVITY_FROM} {tail}");
    let raws = self.select(sql, params, RawActivity::from_row).await?;
    raws.into_iter().map(RawActivity::into_activity).collect()
  }

  /// Write a lead row and replace its assignee set in one transaction.
  async fn write_lead(&self, lead: &Lead, insert: bool) -> Result<usize> {
    let values = lead_values(lead)?;
    let lead_id = encode_uuid(lead.id);
    let assignees: Vec<String> = lead.assigned_user_ids.iter().copied().map(encode_uuid).collect();

    let n = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let n = tx.execute(
          if insert { INSERT_LEAD } else { UPDATE_LEAD },
          params_from_iter(values),
        )?;
        if n > 0 {
          tx.execute("DELETE FROM lead_assignees WHERE lead_id = ?1", [&lead_id])?;
          let mut stmt =
            tx.prepare("INSERT INTO lead_assignees (lead_id, user_id) VALUES (?1, ?2)")?;
          for user_id in &assignees {
            stmt.execute([&lead_id, user_id])?;
          }
        }
        tx.commit()?;
        Ok(n)
      })
      .await?;
    Ok(n)
  }
}

fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }

fn limit_value(limit: Option<usize>) -> Value {
  Value::Integer(limit.map_or(-1, |n| n as i64))
}

/// Drop repeated ids, keeping first occurrences in order.
fn dedup_ids(ids: &mut Vec<Uuid>) {
  let mut seen = HashSet::new();
  ids.retain(|id| seen.insert(*id));
}

fn ensure_found(n: usize, entity: &'static str, id: Uuid) -> Result<()> {
  if n == 0 { Err(Error::NotFound { entity, id }) } else { Ok(()) }
}

// ─── CrmStore impl ───────────────────────────────────────────────────────────

impl CrmStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn create_user(&self, input: NewUser) -> Result<User> {
    let now = Utc::now();
    let user = User {
      id:            Uuid::new_v4(),
      name:          input.name,
      email:         input.email,
      phone:         input.phone,
      password_hash: input.password_hash,
      role:          input.role,
      status:        input.status,
      department:    input.department,
      location:      input.location,
      bio:           input.bio,
      skills:        input.skills,
      avatar:        input.avatar,
      google_id:     input.google_id,
      reports_to_id: input.reports_to_id,
      reset_code:    None,
      joined_at:     input.joined_at,
      created_at:    now,
      updated_at:    now,
    };
    self.execute(INSERT_USER, user_values(&user)?).await?;
    Ok(user)
  }

  async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
    let mut users = self
      .select_users("WHERE u.user_id = ?".into(), vec![text(encode_uuid(id))])
      .await?;
    Ok(users.pop())
  }

  async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
    // The column is declared COLLATE NOCASE.
    let mut users = self
      .select_users("WHERE u.email = ?".into(), vec![text(email.trim())])
      .await?;
    Ok(users.pop())
  }

  async fn get_users(&self, ids: &[Uuid]) -> Result<Vec<User>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let tail = format!("WHERE u.user_id IN ({})", placeholders(ids.len()));
    let params = ids.iter().map(|id| text(encode_uuid(*id))).collect();
    self.select_users(tail, params).await
  }

  async fn list_users(&self, query: &UserQuery) -> Result<Vec<User>> {
    let mut f = Filter::default();
    if let Some(role) = query.role {
      f.push("u.role = ?", [text(role.as_ref())]);
    }
    if let Some(status) = query.status {
      f.push("u.status = ?", [text(status.as_ref())]);
    }
    let tail = format!("{} ORDER BY u.name COLLATE NOCASE ASC", f.where_clause());
    self.select_users(tail, f.into_params()).await
  }

  async fn save_user(&self, user: &User) -> Result<()> {
    let n = self.execute(UPDATE_USER, user_values(user)?).await?;
    ensure_found(n, "user", user.id)
  }

  async fn set_password(&self, id: Uuid, password_hash: String) -> Result<()> {
    let n = self
      .execute(
        "UPDATE users SET password_hash = ?2, reset_code = NULL,
           reset_expires_at = NULL, updated_at = ?3
         WHERE user_id = ?1",
        vec![text(encode_uuid(id)), text(password_hash), text(encode_dt(Utc::now()))],
      )
      .await?;
    ensure_found(n, "user", id)
  }

  async fn set_reset_code(&self, id: Uuid, code: Option<ResetCode>) -> Result<()> {
    let (code, expires) = match code {
      Some(r) => (text(r.code), text(encode_dt(r.expires_at))),
      None => (Value::Null, Value::Null),
    };
    let n = self
      .execute(
        "UPDATE users SET reset_code = ?2, reset_expires_at = ?3 WHERE user_id = ?1",
        vec![text(encode_uuid(id)), code, expires],
      )
      .await?;
    ensure_found(n, "user", id)
  }

  async fn delete_user(&self, id: Uuid) -> Result<bool> {
    let n = self
      .execute("DELETE FROM users WHERE user_id = ?1", vec![text(encode_uuid(id))])
      .await?;
    Ok(n > 0)
  }

  // ── Leads ─────────────────────────────────────────────────────────────────

  async fn create_lead(&self, input: NewLead) -> Result<Lead> {
    let mut lead = input.into_lead(Uuid::new_v4(), Utc::now());
    dedup_ids(&mut lead.assigned_user_ids);
    self.write_lead(&lead, true).await?;
    Ok(lead)
  }

  async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>> {
    let mut leads = self
      .select_leads("WHERE l.lead_id = ?".into(), vec![text(encode_uuid(id))])
      .await?;
    Ok(leads.pop())
  }

  async fn get_leads(&self, ids: &[Uuid]) -> Result<Vec<Lead>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let tail = format!("WHERE l.lead_id IN ({})", placeholders(ids.len()));
    let params = ids.iter().map(|id| text(encode_uuid(*id))).collect();
    self.select_leads(tail, params).await
  }

  async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>> {
    let f = lead_filter(query);
    let order = match query.order {
      LeadOrder::Newest => "l.created_at DESC, l.rowid DESC",
      LeadOrder::RecentlyUpdated => "l.updated_at DESC, l.rowid DESC",
    };
    let tail = format!("{} ORDER BY {order} LIMIT ?", f.where_clause());
    let mut params = f.into_params();
    params.push(limit_value(query.limit));
    self.select_leads(tail, params).await
  }

  async fn save_lead(&self, lead: &Lead) -> Result<()> {
    let mut lead = lead.clone();
    dedup_ids(&mut lead.assigned_user_ids);
    let n = self.write_lead(&lead, false).await?;
    ensure_found(n, "lead", lead.id)
  }

  async fn delete_lead(&self, id: Uuid) -> Result<bool> {
    let n = self
      .execute("DELETE FROM leads WHERE lead_id = ?1", vec![text(encode_uuid(id))])
      .await?;
    Ok(n > 0)
  }

  async fn lead_totals(&self, query: &LeadQuery) -> Result<LeadTotals> {
    let f = lead_filter(query);
    let sql = format!(
      "SELECT COUNT(*), COALESCE(SUM(l.value), 0.0) FROM leads l {}",
      f.where_clause()
    );
    let mut rows = self
      .select(sql, f.into_params(), |row| {
        Ok(LeadTotals { count: row.get(0)?, value_sum: row.get(1)? })
      })
      .await?;
    Ok(rows.pop().unwrap_or_default())
  }

  async fn totals_by_status(&self, query: &LeadQuery) -> Result<Vec<StatusTotals>> {
    let f = lead_filter(query);
    let sql = format!(
      "SELECT l.status, COUNT(*), COALESCE(SUM(l.value), 0.0)
       FROM leads l {} GROUP BY l.status",
      f.where_clause()
    );
    let rows: Vec<(String, i64, f64)> = self
      .select(sql, f.into_params(), |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
      .await?;
    rows
      .into_iter()
      .map(|(status, count, total_value)| {
        Ok(StatusTotals { status: decode_code("status", &status)?, count, total_value })
      })
      .collect()
  }

  async fn count_by_source(&self, query: &LeadQuery) -> Result<Vec<SourceCount>> {
    let f = lead_filter(query);
    let sql = format!(
      "SELECT l.source_origin, COUNT(*) AS n
       FROM leads l {} GROUP BY l.source_origin
       ORDER BY n DESC, l.source_origin ASC",
      f.where_clause()
    );
    self
      .select(sql, f.into_params(), |row| {
        Ok(SourceCount { source: row.get(0)?, count: row.get(1)? })
      })
      .await
  }

  // ── Activities ────────────────────────────────────────────────────────────

  async fn create_activity(&self, input: NewActivity) -> Result<Activity> {
    let activity = input.into_activity(Uuid::new_v4(), Utc::now());
    self.execute(INSERT_ACTIVITY, activity_values(&activity)?).await?;
    Ok(activity)
  }

  async fn create_invoice(
    &self,
    input: NewActivity,
    issued_at: DateTime<Utc>,
  ) -> Result<Activity> {
    let mut activity = input.into_activity(Uuid::new_v4(), Utc::now());
    let prefix_pattern = format!("{}%", invoice_prefix(issued_at));
    let kind = ActivityKind::Invoice.as_ref().to_owned();

    // The title is only known inside the transaction; bind everything else
    // now and fill ?5 once the number is allocated.
    let mut values = activity_values(&activity)?;

    let title = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let last: Option<String> = tx
          .query_row(
            "SELECT title FROM activities
             WHERE kind = ?1 AND title LIKE ?2
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            [&kind, &prefix_pattern],
            |r| r.get(0),
          )
          .optional()?;
        let title = match next_invoice_number(issued_at, last.as_deref()) {
          Ok(title) => title,
          Err(e) => return Ok(Err(e)),
        };
        values[4] = Value::Text(title.clone());
        tx.execute(INSERT_ACTIVITY, params_from_iter(values))?;
        tx.commit()?;
        Ok(Ok(title))
      })
      .await??;

    activity.title = title;
    Ok(activity)
  }

  async fn get_activity(&self, id: Uuid) -> Result<Option<Activity>> {
    let mut found = self
      .select_activities("WHERE a.activity_id = ?".into(), vec![text(encode_uuid(id))])
      .await?;
    Ok(found.pop())
  }

  async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>> {
    let f = activity_filter(query);
    let tail = format!(
      "{} ORDER BY a.created_at DESC, a.rowid DESC LIMIT ?",
      f.where_clause()
    );
    let mut params = f.into_params();
    params.push(limit_value(query.limit));
    self.select_activities(tail, params).await
  }

  async fn save_activity(&self, activity: &Activity) -> Result<()> {
    let n = self.execute(UPDATE_ACTIVITY, activity_values(activity)?).await?;
    ensure_found(n, "activity", activity.id)
  }

  async fn delete_activity(&self, id: Uuid) -> Result<bool> {
    let n = self
      .execute(
        "DELETE FROM activities WHERE activity_id = ?1",
        vec![text(encode_uuid(id))],
      )
      .await?;
    Ok(n > 0)
  }

  async fn upcoming_activities(
    &self,
    from: DateTime<Utc>,
    scope: Scope,
    limit: usize,
  ) -> Result<Vec<Activity>> {
    let mut f = Filter::default();
    f.push_sql("a.is_completed = 0");
    f.push(
      "((a.scheduled_at >= ? AND a.kind <> 'INVOICE')
        OR a.kind = 'INVOICE'
        OR (a.kind = 'EMAIL' AND a.scheduled_at IS NULL))",
      [text(encode_dt(from))],
    );
    f.scope(scope, Some("a.created_by_id"));
    let tail = format!(
      "{} ORDER BY a.scheduled_at IS NULL, a.scheduled_at ASC, a.created_at DESC
       LIMIT ?",
      f.where_clause()
    );
    let mut params = f.into_params();
    params.push(limit_value(Some(limit)));
    self.select_activities(tail, params).await
  }
}
