//! Who may see what.
//!
//! Authentication happens at the HTTP edge; this module only encodes the
//! role rules so they can be shared by the router and the store queries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{activity::Activity, lead::Lead, user::Role};

/// The authenticated caller, as decoded from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub id:    Uuid,
  pub email: String,
  pub role:  Role,
}

/// Row filter applied to lead-derived queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
  #[default]
  Everything,
  /// Leads the user is assigned to.
  AssignedTo(Uuid),
  /// Leads the user created or is assigned to.
  OwnedOrAssigned(Uuid),
}

impl Identity {
  pub fn is_admin(&self) -> bool { self.role == Role::Admin }

  pub fn has_role(&self, allowed: &[Role]) -> bool { allowed.contains(&self.role) }

  /// Scope for lead listings, the activity feed and the schedule.
  pub fn listing_scope(&self) -> Scope {
    match self.role {
      Role::Sales => Scope::OwnedOrAssigned(self.id),
      Role::Admin | Role::Viewer => Scope::Everything,
    }
  }

  /// Scope for dashboard statistics, which only count assigned leads.
  pub fn dashboard_scope(&self) -> Scope {
    match self.role {
      Role::Sales => Scope::AssignedTo(self.id),
      Role::Admin | Role::Viewer => Scope::Everything,
    }
  }

  pub fn can_view_lead(&self, lead: &Lead) -> bool {
    self.listing_scope().admits(lead)
  }

  /// Sub-resources are edited only by their author or an admin.
  pub fn can_modify_activity(&self, activity: &Activity) -> bool {
    self.is_admin() || activity.created_by_id == self.id
  }
}

impl Scope {
  pub fn admits(&self, lead: &Lead) -> bool {
    match *self {
      Scope::Everything => true,
      Scope::AssignedTo(user) => lead.is_assigned_to(user),
      Scope::OwnedOrAssigned(user) => {
        lead.created_by_id == user || lead.is_assigned_to(user)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::{
    activity::{ActivityDetail, NewActivity, NoteDetail},
    lead::NewLead,
  };

  fn identity(role: Role) -> Identity {
    Identity { id: Uuid::new_v4(), email: "someone@example.com".into(), role }
  }

  #[test]
  fn sales_sees_created_or_assigned_leads() {
    let sales = identity(Role::Sales);
    let now = Utc::now();

    let own = NewLead::new("Own", sales.id).into_lead(Uuid::new_v4(), now);
    let mut assigned = NewLead::new("Assigned", Uuid::new_v4()).into_lead(Uuid::new_v4(), now);
    assigned.assigned_user_ids.push(sales.id);
    let foreign = NewLead::new("Foreign", Uuid::new_v4()).into_lead(Uuid::new_v4(), now);

    assert!(sales.can_view_lead(&own));
    assert!(sales.can_view_lead(&assigned));
    assert!(!sales.can_view_lead(&foreign));

    // The dashboard only counts assignments.
    assert!(!sales.dashboard_scope().admits(&own));
    assert!(sales.dashboard_scope().admits(&assigned));
  }

  #[test]
  fn admin_and_viewer_see_everything() {
    let lead = NewLead::new("Any", Uuid::new_v4()).into_lead(Uuid::new_v4(), Utc::now());
    assert!(identity(Role::Admin).can_view_lead(&lead));
    assert!(identity(Role::Viewer).can_view_lead(&lead));
    assert_eq!(identity(Role::Viewer).dashboard_scope(), Scope::Everything);
  }

  #[test]
  fn only_author_or_admin_modifies_activity() {
    let author = identity(Role::Sales);
    let other = identity(Role::Sales);
    let activity = NewActivity::new(
      Uuid::new_v4(),
      author.id,
      "Note",
      ActivityDetail::Note(NoteDetail::default()),
    )
    .into_activity(Uuid::new_v4(), Utc::now());

    assert!(author.can_modify_activity(&activity));
    assert!(!other.can_modify_activity(&activity));
    assert!(identity(Role::Admin).can_modify_activity(&activity));
  }
}
