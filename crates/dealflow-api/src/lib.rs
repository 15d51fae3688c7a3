//! HTTP layer for Dealflow.
//!
//! Exposes an axum [`Router`] serving the JSON API under `/api`, uploaded
//! files under `/uploads`, backed by any [`CrmStore`].

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod passwords;
pub mod services;
pub mod tokens;
pub mod upload;
pub mod views;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, Request},
  http::{HeaderValue, Method, StatusCode, header},
  middleware::{self, Next},
  response::{IntoResponse, Response},
  routing::get,
};
use chrono::Utc;
use dealflow_core::store::CrmStore;
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use services::{
  AiConfig, ChatCompletion, FileStore, IdentityProvider, Mailer, SmtpConfig,
  identity::GOOGLE_USERINFO_URL,
};
use tokens::TokenKeys;

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 5000 }
fn default_base_url() -> String { "http://localhost:5000".to_owned() }
fn default_frontend_url() -> String { "http://localhost:3000".to_owned() }
fn default_store_path() -> PathBuf { PathBuf::from("dealflow.db") }
fn default_upload_dir() -> PathBuf { PathBuf::from("uploads") }
fn default_token_ttl_hours() -> i64 { 24 }
fn default_organization() -> String { "Dealflow".to_owned() }
fn default_userinfo_url() -> String { GOOGLE_USERINFO_URL.to_owned() }

/// Runtime server configuration, deserialised from `config.toml` and
/// `DEALFLOW_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  /// Public URL of this server; attachment links are built from it.
  #[serde(default = "default_base_url")]
  pub base_url:            String,
  /// Allowed CORS origin.
  #[serde(default = "default_frontend_url")]
  pub frontend_url:        String,
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  #[serde(default = "default_upload_dir")]
  pub upload_dir:          PathBuf,
  pub jwt_secret:          String,
  #[serde(default = "default_token_ttl_hours")]
  pub token_ttl_hours:     i64,
  /// Shown in sender labels of outgoing mail.
  #[serde(default = "default_organization")]
  pub organization:        String,
  #[serde(default)]
  pub smtp:                Option<SmtpConfig>,
  #[serde(default)]
  pub ai:                  Option<AiConfig>,
  #[serde(default = "default_userinfo_url")]
  pub google_userinfo_url: String,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: CrmStore> {
  pub store:    Arc<S>,
  pub config:   Arc<ServerConfig>,
  pub tokens:   Arc<TokenKeys>,
  pub mailer:   Arc<dyn Mailer>,
  pub identity: Arc<dyn IdentityProvider>,
  pub chat:     Arc<dyn ChatCompletion>,
  pub files:    Arc<dyn FileStore>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Request bodies may carry one attachment plus form fields.
const BODY_LIMIT: usize = upload::MAX_UPLOAD_BYTES + 1024 * 1024;

/// Build the full application [`Router`].
pub fn router<S>(state: AppState<S>) -> Router
where
  S: CrmStore + Clone + 'static,
{
  let api = Router::new()
    .nest("/auth", handlers::auth::routes())
    .nest("/leads", handlers::leads::routes())
    .nest("/team", handlers::team::routes())
    .nest("/sales", handlers::team::sales_routes())
    .nest("/dashboard", handlers::dashboard::routes())
    .nest("/activities", handlers::activities::feed_routes())
    .nest("/ai", handlers::ai::routes());

  let uploads = Router::new()
    .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
    .layer(middleware::from_fn(inline_pdf));

  Router::new()
    .route("/", get(root))
    .nest("/api", api)
    .merge(uploads)
    .fallback(route_not_found)
    .layer(DefaultBodyLimit::max(BODY_LIMIT))
    .layer(cors(&state.config.frontend_url))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

fn cors(frontend_url: &str) -> CorsLayer {
  let layer = CorsLayer::new()
    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
    .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
  match HeaderValue::from_str(frontend_url) {
    Ok(origin) => layer.allow_origin(origin).allow_credentials(true),
    Err(_) => {
      tracing::warn!(%frontend_url, "frontend_url is not a valid origin; CORS disabled");
      layer
    }
  }
}

// ─── Misc handlers ────────────────────────────────────────────────────────────

async fn root() -> Json<serde_json::Value> {
  Json(json!({
    "message":   "Dealflow API is running",
    "version":   env!("CARGO_PKG_VERSION"),
    "timestamp": Utc::now(),
  }))
}

async fn route_not_found(req: Request) -> Response {
  tracing::debug!(uri = %req.uri(), "route not found");
  (StatusCode::NOT_FOUND, Json(json!({ "error": "Route not found" }))).into_response()
}

/// Have browsers display PDFs rather than download them.
async fn inline_pdf(req: Request, next: Next) -> Response {
  let is_pdf = req.uri().path().to_ascii_lowercase().ends_with(".pdf");
  let mut res = next.run(req).await;
  if is_pdf && res.status().is_success() {
    let headers = res.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("inline"));
  }
  res
}

#[cfg(test)]
mod tests;
