//! Response payloads that embed related records (creator, assignees, lead).
//!
//! Relations are resolved with one batched lookup per request rather than
//! per row.

use std::collections::HashMap;

use dealflow_core::{
  activity::Activity,
  lead::{Contact, Lead, LeadStatus},
  store::{CrmStore, LeadQuery},
  user::{Role, User, UserSummary},
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, Result};

// ─── Payloads ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadView {
  #[serde(flatten)]
  pub lead:           Lead,
  pub assigned_users: Vec<UserSummary>,
  pub created_by:     Option<UserSummary>,
}

/// The author of an activity.
#[derive(Debug, Clone, Serialize)]
pub struct Author {
  pub id:     Uuid,
  pub name:   String,
  pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Member {
  pub id:   Uuid,
  pub name: String,
  pub role: Role,
}

/// The lead an activity belongs to, as shown in feeds and the agenda.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadBrief {
  pub id:             Uuid,
  pub title:          String,
  pub company:        Option<String>,
  pub contacts:       Vec<Contact>,
  pub is_archived:    bool,
  pub status:         LeadStatus,
  pub assigned_users: Vec<Member>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityView {
  #[serde(flatten)]
  pub activity:   Activity,
  pub created_by: Option<Author>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lead:       Option<LeadBrief>,
}

#[derive(Debug, Serialize)]
pub struct Manager {
  pub id:   Uuid,
  pub name: String,
}

#[derive(Debug, Serialize)]
pub struct AssignedLead {
  pub id:      Uuid,
  pub title:   String,
  pub status:  LeadStatus,
  pub company: Option<String>,
}

/// A user together with their manager and the leads assigned to them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
  #[serde(flatten)]
  pub user:           User,
  pub reports_to:     Option<Manager>,
  pub assigned_leads: Vec<AssignedLead>,
}

// ─── Directory ───────────────────────────────────────────────────────────────

/// Users referenced by a batch of records, keyed by id.
struct Directory(HashMap<Uuid, User>);

impl Directory {
  async fn load<S: CrmStore>(store: &S, mut ids: Vec<Uuid>) -> Result<Self> {
    ids.sort_unstable();
    ids.dedup();
    let users = store.get_users(&ids).await.map_err(ApiError::store)?;
    Ok(Self(users.into_iter().map(|u| (u.id, u)).collect()))
  }

  fn summary(&self, id: Uuid) -> Option<UserSummary> { self.0.get(&id).map(User::summary) }

  fn summaries(&self, ids: &[Uuid]) -> Vec<UserSummary> {
    ids.iter().filter_map(|id| self.summary(*id)).collect()
  }

  fn author(&self, id: Uuid) -> Option<Author> {
    self.0.get(&id).map(|u| Author { id: u.id, name: u.name.clone(), avatar: u.avatar.clone() })
  }

  fn members(&self, ids: &[Uuid]) -> Vec<Member> {
    ids
      .iter()
      .filter_map(|id| self.0.get(id))
      .map(|u| Member { id: u.id, name: u.name.clone(), role: u.role })
      .collect()
  }
}

// ─── Hydration ───────────────────────────────────────────────────────────────

pub async fn lead_views<S: CrmStore>(store: &S, leads: Vec<Lead>) -> Result<Vec<LeadView>> {
  let ids = leads
    .iter()
    .flat_map(|l| l.assigned_user_ids.iter().copied().chain([l.created_by_id]))
    .collect();
  let directory = Directory::load(store, ids).await?;
  Ok(
    leads
      .into_iter()
      .map(|lead| LeadView {
        assigned_users: directory.summaries(&lead.assigned_user_ids),
        created_by: directory.summary(lead.created_by_id),
        lead,
      })
      .collect(),
  )
}

pub async fn lead_view<S: CrmStore>(store: &S, lead: Lead) -> Result<LeadView> {
  let mut views = lead_views(store, vec![lead]).await?;
  views.pop().ok_or_else(|| ApiError::Internal("lead vanished during hydration".into()))
}

/// Attach authors, and with `with_lead` a summary of each activity's lead.
pub async fn activity_views<S: CrmStore>(
  store: &S,
  activities: Vec<Activity>,
  with_lead: bool,
) -> Result<Vec<ActivityView>> {
  let leads: HashMap<Uuid, Lead> = if with_lead {
    let mut lead_ids: Vec<Uuid> = activities.iter().map(|a| a.lead_id).collect();
    lead_ids.sort_unstable();
    lead_ids.dedup();
    let found = store.get_leads(&lead_ids).await.map_err(ApiError::store)?;
    found.into_iter().map(|l| (l.id, l)).collect()
  } else {
    HashMap::new()
  };

  let user_ids = activities
    .iter()
    .map(|a| a.created_by_id)
    .chain(leads.values().flat_map(|l| l.assigned_user_ids.iter().copied()))
    .collect();
  let directory = Directory::load(store, user_ids).await?;

  Ok(
    activities
      .into_iter()
      .map(|activity| {
        let lead = leads.get(&activity.lead_id).map(|l| LeadBrief {
          id:             l.id,
          title:          l.title.clone(),
          company:        l.company.clone(),
          contacts:       l.contacts.clone(),
          is_archived:    l.is_archived,
          status:         l.status,
          assigned_users: directory.members(&l.assigned_user_ids),
        });
        ActivityView { created_by: directory.author(activity.created_by_id), lead, activity }
      })
      .collect(),
  )
}

pub async fn activity_view<S: CrmStore>(store: &S, activity: Activity) -> Result<ActivityView> {
  let mut views = activity_views(store, vec![activity], false).await?;
  views.pop().ok_or_else(|| ApiError::Internal("activity vanished during hydration".into()))
}

pub async fn profile_view<S: CrmStore>(store: &S, user: User) -> Result<ProfileView> {
  let reports_to = match user.reports_to_id {
    Some(id) => store
      .get_user(id)
      .await
      .map_err(ApiError::store)?
      .map(|m| Manager { id: m.id, name: m.name }),
    None => None,
  };
  let query = LeadQuery {
    scope: dealflow_core::access::Scope::AssignedTo(user.id),
    ..LeadQuery::default()
  };
  let assigned_leads = store
    .list_leads(&query)
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .map(|l| AssignedLead { id: l.id, title: l.title, status: l.status, company: l.company })
    .collect();
  Ok(ProfileView { user, reports_to, assigned_leads })
}
