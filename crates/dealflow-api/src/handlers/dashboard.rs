//! Handlers for `/dashboard` endpoints.
//!
//! Statistics count non-archived leads only, and SALES users only see leads
//! they are assigned to. Periods are selected with `range`, `month`
//! (0-based) and `year`; `range=all` disables date filtering and reports no
//! change.

use axum::{
  Router,
  extract::State,
  routing::get,
};
use chrono::{Datelike, Utc};
use dealflow_core::{
  access::{Identity, Scope},
  lead::LeadStatus,
  period::{
    MONTH_ABBREVIATIONS, Metric, Period, Quarter, Window, months_of_year, ratio_rounded,
    start_of_day,
  },
  store::{CrmStore, LeadQuery, LeadTotals},
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  error::{ApiError, Result},
  extract::{Json, Query},
  views::{self, ActivityView},
};

const RECENT_DEALS: usize = 5;
const SCHEDULE_LIMIT: usize = 20;

pub fn routes<S>() -> Router<AppState<S>>
where
  S: CrmStore + Clone + 'static,
{
  Router::new()
    .route("/stats", get(stats::<S>))
    .route("/leads-chart", get(leads_chart::<S>))
    .route("/revenue-chart", get(revenue_chart::<S>))
    .route("/recent-deals", get(recent_deals::<S>))
    .route("/pipeline-stats", get(pipeline_stats::<S>))
    .route("/leads-source", get(leads_source::<S>))
    .route("/quarter-summary", get(quarter_summary::<S>))
    .route("/schedule", get(schedule::<S>))
}

// ─── Parameters ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PeriodParams {
  pub range: Option<String>,
  pub month: Option<i64>,
  pub year:  Option<i32>,
}

impl PeriodParams {
  fn period(&self) -> Result<Period> {
    Ok(Period::from_query(self.range.as_deref(), self.month, self.year, Utc::now())?)
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct YearParams {
  pub year: Option<i32>,
}

// ─── Stats ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct Figures {
  pipeline: LeadTotals,
  won:      i64,
  lost:     i64,
}

impl Figures {
  fn total(&self) -> i64 { self.pipeline.count }

  fn average_deal(&self) -> i64 { ratio_rounded(self.pipeline.value_sum, self.pipeline.count as f64) }

  fn conversion_rate(&self) -> i64 { ratio_rounded(self.won as f64 * 100.0, self.total() as f64) }
}

/// Leads created in `window` (all of them when `None`).
async fn figures<S: CrmStore>(
  store: &S,
  scope: Scope,
  window: Option<Window>,
) -> Result<Figures, S::Error> {
  let created = LeadQuery::live(scope).created_in(window);
  let won = created.clone().status(LeadStatus::Won);
  let lost = created.clone().status(LeadStatus::Lost);
  let (pipeline, won, lost) = tokio::try_join!(
    store.lead_totals(&created),
    store.lead_totals(&won),
    store.lead_totals(&lost),
  )?;
  Ok(Figures { pipeline, won: won.count, lost: lost.count })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
  pub total_won:       Metric,
  pub total_lost:      Metric,
  pub total_leads:     Metric,
  pub conversion_rate: Metric,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
  pub pipeline_value: Metric<f64>,
  pub active_deals:   Metric,
  pub avg_deal:       Metric,
  pub metrics:        Metrics,
}

/// `GET /dashboard/stats`
pub async fn stats<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Query(params): Query<PeriodParams>,
) -> Result<Json<Stats>>
where
  S: CrmStore + Clone + 'static,
{
  let period = params.period()?;
  let all_time = period.is_all_time();
  let scope = identity.dashboard_scope();
  let store = &*state.store;

  let (current_window, previous_window) = (period.current()?, period.previous()?);
  let (now, before) = tokio::try_join!(figures(store, scope, current_window), async {
    if all_time { Ok(Figures::default()) } else { figures(store, scope, previous_window).await }
  })
  .map_err(ApiError::store)?;

  let compare = |current: i64, previous: i64| Metric::compare(current, previous, all_time);
  Ok(Json(Stats {
    pipeline_value: Metric::compare_amounts(now.pipeline.value_sum, before.pipeline.value_sum, all_time),
    active_deals:   compare(now.pipeline.count, before.pipeline.count),
    avg_deal:       compare(now.average_deal(), before.average_deal()),
    metrics:        Metrics {
      total_won:       compare(now.won, before.won),
      total_lost:      compare(now.lost, before.lost).never_positive(),
      total_leads:     compare(now.total(), before.total()),
      conversion_rate: compare(now.conversion_rate(), before.conversion_rate()),
    },
  }))
}

// ─── Charts ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MonthCount {
  pub name:  &'static str,
  pub total: i64,
}

/// `GET /dashboard/leads-chart?year`: leads created per month.
pub async fn leads_chart<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Query(params): Query<YearParams>,
) -> Result<Json<Vec<MonthCount>>>
where
  S: CrmStore + Clone + 'static,
{
  let year = params.year.unwrap_or_else(|| Utc::now().year());
  let scope = identity.dashboard_scope();
  let queries: Vec<LeadQuery> = months_of_year(year)?
    .into_iter()
    .map(|w| LeadQuery::live(scope).created_in(Some(w)))
    .collect();
  let totals = try_join_all(queries.iter().map(|q| state.store.lead_totals(q)))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(
    MONTH_ABBREVIATIONS
      .into_iter()
      .zip(totals)
      .map(|(name, t)| MonthCount { name, total: t.count })
      .collect(),
  ))
}

#[derive(Debug, Serialize)]
pub struct MonthRevenue {
  pub month:       &'static str,
  pub estimation:  f64,
  pub realisation: f64,
}

/// `GET /dashboard/revenue-chart?year`: value of leads created per month
/// against value of deals won per month.
pub async fn revenue_chart<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Query(params): Query<YearParams>,
) -> Result<Json<Vec<MonthRevenue>>>
where
  S: CrmStore + Clone + 'static,
{
  let year = params.year.unwrap_or_else(|| Utc::now().year());
  let scope = identity.dashboard_scope();
  let months = months_of_year(year)?;
  let estimated: Vec<LeadQuery> =
    months.iter().map(|w| LeadQuery::live(scope).created_in(Some(*w))).collect();
  let realised: Vec<LeadQuery> = months
    .iter()
    .map(|w| LeadQuery::live(scope).status(LeadStatus::Won).won_in(*w))
    .collect();

  let store = &*state.store;
  let (estimation, realisation) = tokio::try_join!(
    try_join_all(estimated.iter().map(|q| store.lead_totals(q))),
    try_join_all(realised.iter().map(|q| store.lead_totals(q))),
  )
  .map_err(ApiError::store)?;

  Ok(Json(
    MONTH_ABBREVIATIONS
      .into_iter()
      .zip(estimation.into_iter().zip(realisation))
      .map(|(month, (e, r))| MonthRevenue { month, estimation: e.value_sum, realisation: r.value_sum })
      .collect(),
  ))
}

// ─── Lists ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentDeal {
  pub id:         Uuid,
  pub title:      String,
  pub value:      f64,
  pub status:     LeadStatus,
  pub created_at: chrono::DateTime<Utc>,
}

/// `GET /dashboard/recent-deals`
pub async fn recent_deals<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Query(params): Query<PeriodParams>,
) -> Result<Json<Vec<RecentDeal>>>
where
  S: CrmStore + Clone + 'static,
{
  let window = params.period()?.current()?;
  let query = LeadQuery {
    limit: Some(RECENT_DEALS),
    ..LeadQuery::live(identity.dashboard_scope()).created_in(window)
  };
  let leads = state.store.list_leads(&query).await.map_err(ApiError::store)?;
  Ok(Json(
    leads
      .into_iter()
      .map(|l| RecentDeal {
        id:         l.id,
        title:      l.title,
        value:      l.value,
        status:     l.status,
        created_at: l.created_at,
      })
      .collect(),
  ))
}

#[derive(Debug, Serialize)]
pub struct StatusCount {
  pub status: LeadStatus,
  pub count:  i64,
}

/// `GET /dashboard/pipeline-stats`
pub async fn pipeline_stats<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Query(params): Query<PeriodParams>,
) -> Result<Json<Vec<StatusCount>>>
where
  S: CrmStore + Clone + 'static,
{
  let window = params.period()?.current()?;
  let query = LeadQuery::live(identity.dashboard_scope()).created_in(window);
  let totals = state.store.totals_by_status(&query).await.map_err(ApiError::store)?;
  Ok(Json(totals.into_iter().map(|t| StatusCount { status: t.status, count: t.count }).collect()))
}

#[derive(Debug, Serialize)]
pub struct SourceSlice {
  pub name:  String,
  pub value: i64,
}

/// `GET /dashboard/leads-source`
pub async fn leads_source<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Query(params): Query<PeriodParams>,
) -> Result<Json<Vec<SourceSlice>>>
where
  S: CrmStore + Clone + 'static,
{
  let window = params.period()?.current()?;
  let query = LeadQuery::live(identity.dashboard_scope()).created_in(window);
  let sources = state.store.count_by_source(&query).await.map_err(ApiError::store)?;
  Ok(Json(
    sources
      .into_iter()
      .map(|s| SourceSlice { name: s.source.unwrap_or_else(|| "Unknown".to_owned()), value: s.count })
      .collect(),
  ))
}

// ─── Quarter ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct QuarterFigures {
  pub revenue: f64,
  pub deals:   i64,
  pub average: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterSummary {
  pub quarter:     u32,
  pub year:        i32,
  pub range_label: String,
  pub data:        QuarterFigures,
}

/// `GET /dashboard/quarter-summary?month&year`: deals won in the quarter
/// containing the selected month.
pub async fn quarter_summary<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Query(params): Query<PeriodParams>,
) -> Result<Json<QuarterSummary>>
where
  S: CrmStore + Clone + 'static,
{
  let quarter = match Period::month_of(params.month, params.year, Utc::now())? {
    Period::Month { year, month0 } => Quarter::containing(year, month0)?,
    Period::AllTime => return Err(ApiError::Internal("month_of returned all-time".into())),
  };
  let query = LeadQuery::live(identity.dashboard_scope())
    .status(LeadStatus::Won)
    .won_in(quarter.window);
  let totals = state.store.lead_totals(&query).await.map_err(ApiError::store)?;
  Ok(Json(QuarterSummary {
    quarter:     quarter.number,
    year:        quarter.year,
    range_label: quarter.label,
    data:        QuarterFigures {
      revenue: totals.value_sum,
      deals:   totals.count,
      average: ratio_rounded(totals.value_sum, totals.count as f64),
    },
  }))
}

// ─── Schedule ─────────────────────────────────────────────────────────────────

/// `GET /dashboard/schedule`: the caller's open agenda from today on.
pub async fn schedule<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
) -> Result<Json<Vec<ActivityView>>>
where
  S: CrmStore + Clone + 'static,
{
  let from = start_of_day(Utc::now());
  let activities = state
    .store
    .upcoming_activities(from, identity.listing_scope(), SCHEDULE_LIMIT)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(views::activity_views(&*state.store, activities, true).await?))
}
