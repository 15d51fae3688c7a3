//! Dynamic `WHERE` clause construction for listings and aggregates.
//!
//! Every condition uses anonymous `?` placeholders; parameters are pushed in
//! the same order the conditions are joined.

use dealflow_core::{
  access::Scope,
  store::{ActivityQuery, LeadQuery},
};
use rusqlite::types::Value;

use crate::encode::{encode_dt, encode_uuid};

#[derive(Debug, Default)]
pub struct Filter {
  conds:  Vec<String>,
  params: Vec<Value>,
}

impl Filter {
  pub fn push(&mut self, cond: impl Into<String>, params: impl IntoIterator<Item = Value>) {
    self.conds.push(cond.into());
    self.params.extend(params);
  }

  /// A condition without parameters.
  pub fn push_sql(&mut self, cond: impl Into<String>) { self.conds.push(cond.into()); }

  /// `WHERE a AND b`, or an empty string when unconstrained.
  pub fn where_clause(&self) -> String {
    if self.conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", self.conds.join(" AND "))
    }
  }

  pub fn into_params(self) -> Vec<Value> { self.params }

  /// Restrict a query joined to `leads l` by row-level visibility. When
  /// `activity_author` names a column, `OwnedOrAssigned` also admits rows
  /// authored by the user.
  pub fn scope(&mut self, scope: Scope, activity_author: Option<&str>) {
    const ASSIGNED: &str = "EXISTS (SELECT 1 FROM lead_assignees s
      WHERE s.lead_id = l.lead_id AND s.user_id = ?)";
    match scope {
      Scope::Everything => {}
      Scope::AssignedTo(user) => self.push(ASSIGNED, [text(encode_uuid(user))]),
      Scope::OwnedOrAssigned(user) => {
        let id = encode_uuid(user);
        match activity_author {
          Some(col) => self.push(
            format!("({col} = ? OR l.created_by_id = ? OR {ASSIGNED})"),
            [text(id.clone()), text(id.clone()), text(id)],
          ),
          None => self.push(
            format!("(l.created_by_id = ? OR {ASSIGNED})"),
            [text(id.clone()), text(id)],
          ),
        }
      }
    }
  }
}

pub fn text(s: impl Into<String>) -> Value { Value::Text(s.into()) }

/// Escape `LIKE` wildcards so user input matches literally.
fn like_pattern(needle: &str) -> String {
  let mut out = String::with_capacity(needle.len() + 2);
  out.push('%');
  for c in needle.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('%');
  out
}

/// Conditions for a query over `leads l`.
pub fn lead_filter(q: &LeadQuery) -> Filter {
  let mut f = Filter::default();
  if let Some(status) = q.status {
    f.push("l.status = ?", [text(status.as_ref())]);
  }
  if let Some(search) = q.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
    let pattern = like_pattern(search);
    f.push(
      "(l.title LIKE ? ESCAPE '\\' OR l.company LIKE ? ESCAPE '\\')",
      [text(pattern.clone()), text(pattern)],
    );
  }
  if let Some(archived) = q.archived {
    f.push("l.is_archived = ?", [Value::Integer(i64::from(archived))]);
  }
  if let Some(w) = q.created_in {
    f.push(
      "l.created_at >= ? AND l.created_at < ?",
      [text(encode_dt(w.start)), text(encode_dt(w.end))],
    );
  }
  if let Some(w) = q.won_in {
    f.push(
      "l.won_at >= ? AND l.won_at < ?",
      [text(encode_dt(w.start)), text(encode_dt(w.end))],
    );
  }
  f.scope(q.scope, None);
  f
}

/// Conditions for a query over `activities a JOIN leads l`.
pub fn activity_filter(q: &ActivityQuery) -> Filter {
  let mut f = Filter::default();
  if let Some(lead_id) = q.lead_id {
    f.push("a.lead_id = ?", [text(encode_uuid(lead_id))]);
  }
  if let Some(kind) = q.kind {
    f.push("a.kind = ?", [text(kind.as_ref())]);
  }
  f.scope(q.scope, Some("a.created_by_id"));
  f
}
