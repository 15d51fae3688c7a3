//! Invoices. Numbers are allocated by the store when the invoice is created.
//!
//! Invoice fields may be sent at the root of the body or nested under `meta`.

use axum::{
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use dealflow_core::{
  access::Identity,
  activity::{ActivityDetail, InvoiceDetail, InvoiceItem, InvoiceStatus, NewActivity},
  store::CrmStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Invoices, editable_activity, input, visible_lead};
use crate::{
  AppState,
  error::{ApiError, Result},
  extract::{Json, Path},
  views::{self, ActivityView},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFields {
  pub status:       Option<InvoiceStatus>,
  pub items:        Option<Vec<InvoiceItem>>,
  pub notes:        Option<String>,
  pub billed_by:    Option<String>,
  pub billed_to:    Option<String>,
  #[serde(default, deserialize_with = "input::amount")]
  pub subtotal:     Option<f64>,
  #[serde(default, deserialize_with = "input::amount")]
  pub tax:          Option<f64>,
  #[serde(default, deserialize_with = "input::amount")]
  pub total_amount: Option<f64>,
  #[serde(default, deserialize_with = "input::datetime")]
  pub invoice_date: Option<DateTime<Utc>>,
  #[serde(default, deserialize_with = "input::datetime")]
  pub due_date:     Option<DateTime<Utc>>,
}

impl InvoiceFields {
  /// Read from `body.meta` when it is an object, else from `body` itself.
  pub fn from_body(body: &Value) -> Result<Self> {
    let source = body.get("meta").filter(|m| m.is_object()).unwrap_or(body);
    serde_json::from_value(source.clone())
      .map_err(|e| ApiError::bad_request(format!("Invalid invoice: {e}")))
  }

  /// Overwrite the fields that were sent.
  fn merge_into(self, detail: &mut InvoiceDetail) {
    if let Some(v) = self.status { detail.status = v; }
    if let Some(v) = self.items { detail.items = v; }
    if let Some(v) = self.notes { detail.notes = v; }
    if let Some(v) = self.billed_by { detail.billed_by = v; }
    if let Some(v) = self.billed_to { detail.billed_to = v; }
    if let Some(v) = self.subtotal { detail.subtotal = v; }
    if let Some(v) = self.tax { detail.tax = v; }
    if let Some(v) = self.total_amount { detail.total_amount = v; }
    if let Some(v) = self.invoice_date { detail.invoice_date = Some(v); }
    if let Some(v) = self.due_date { detail.due_date = Some(v); }
  }
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
  pub success: bool,
  pub message: &'static str,
  pub data:    ActivityView,
}

/// `POST /leads/{id}/invoices`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(lead_id): Path<Uuid>,
  Json(body): Json<Value>,
) -> Result<impl IntoResponse>
where
  S: CrmStore + Clone + 'static,
{
  let fields = InvoiceFields::from_body(&body)?;
  visible_lead(&state, &identity, lead_id).await?;

  let now = Utc::now();
  let mut detail = InvoiceDetail { invoice_date: Some(now), ..InvoiceDetail::default() };
  fields.merge_into(&mut detail);

  let due_date = detail.due_date;
  let settled = detail.is_settled();

  // The store replaces the empty title with the allocated number.
  let mut new = NewActivity::new(lead_id, identity.id, String::new(), ActivityDetail::Invoice(detail));
  new.description = "Invoice".to_owned();
  new.scheduled_at = due_date;
  new.is_completed = settled;

  let invoice = state.store.create_invoice(new, now).await.map_err(ApiError::store)?;
  tracing::info!(id = %invoice.id, number = %invoice.title, lead = %lead_id, "invoice created");
  Ok((
    StatusCode::CREATED,
    Json(InvoiceResponse {
      success: true,
      message: "Invoice created successfully",
      data:    views::activity_view(&*state.store, invoice).await?,
    }),
  ))
}

/// `PATCH /leads/{id}/invoices/{item_id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path((lead_id, id)): Path<(Uuid, Uuid)>,
  Json(body): Json<Value>,
) -> Result<Json<ActivityView>>
where
  S: CrmStore + Clone + 'static,
{
  let fields = InvoiceFields::from_body(&body)?;
  let mut invoice = editable_activity::<S, Invoices>(&state, &identity, lead_id, id).await?;
  let ActivityDetail::Invoice(detail) = &mut invoice.detail else {
    return Err(ApiError::Internal(format!("activity {id} is not an invoice")));
  };

  let due_changed = fields.due_date.is_some();
  fields.merge_into(detail);
  let settled = detail.is_settled();
  let due_date = detail.due_date;

  let title = ["title", "content"]
    .iter()
    .filter_map(|key| body.get(key).and_then(Value::as_str))
    .map(str::trim)
    .find(|t| !t.is_empty());
  if let Some(title) = title {
    invoice.title = title.to_owned();
  }
  if due_changed {
    invoice.scheduled_at = due_date;
  }
  invoice.is_completed = settled;
  invoice.updated_at = Utc::now();

  state.store.save_activity(&invoice).await.map_err(ApiError::store)?;
  Ok(Json(views::activity_view(&*state.store, invoice).await?))
}
