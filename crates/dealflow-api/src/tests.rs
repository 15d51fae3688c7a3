//! Router-level tests: every request goes through [`router`] with an
//! in-memory store and recording collaborators.

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use axum::{
  body::Body,
  http::{Method, Request, StatusCode, header},
};
use chrono::{DateTime, Datelike, SecondsFormat, TimeZone, Utc};
use dealflow_core::{
  access::Identity,
  user::{NewUser, Role, User},
};
use dealflow_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt as _;

use super::*;
use crate::services::{
  DiskFileStore, FederatedProfile, OutgoingMail,
  chat::ChatError,
  identity::IdentityError,
  mail::MailError,
};

// ─── Collaborator doubles ─────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingMailer {
  sent: Mutex<Vec<OutgoingMail>>,
  fail: AtomicBool,
}

#[async_trait]
impl Mailer for RecordingMailer {
  async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
    if self.fail.load(Ordering::SeqCst) {
      let bad = "not an address".parse::<lettre::Address>().unwrap_err();
      return Err(MailError::Address(bad));
    }
    self.sent.lock().unwrap().push(mail);
    Ok(())
  }
}

/// Accepts the token `"google-ok"` as belonging to `gina@example.com`.
struct StubIdentity;

#[async_trait]
impl IdentityProvider for StubIdentity {
  async fn userinfo(&self, access_token: &str) -> Result<FederatedProfile, IdentityError> {
    if access_token != "google-ok" {
      return Err(IdentityError::MissingEmail);
    }
    Ok(FederatedProfile {
      subject: "g-123".into(),
      email:   "gina@example.com".into(),
      name:    Some("Gina".into()),
      picture: Some("https://img.example.com/gina.png".into()),
    })
  }
}

struct EchoChat;

#[async_trait]
impl ChatCompletion for EchoChat {
  async fn reply(&self, message: &str) -> Result<String, ChatError> { Ok(format!("echo: {message}")) }
}

// ─── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
  app:     Router,
  store:   Arc<SqliteStore>,
  tokens:  Arc<TokenKeys>,
  mailer:  Arc<RecordingMailer>,
  uploads: TempDir,
  data:    TempDir,
}

const DB_FILE: &str = "dealflow.db";

async fn harness() -> Harness {
  let uploads = TempDir::new().unwrap();
  let data = TempDir::new().unwrap();
  let store = Arc::new(SqliteStore::open(data.path().join(DB_FILE)).await.unwrap());
  let tokens = Arc::new(TokenKeys::new("router-test-secret", 24));
  let mailer = Arc::new(RecordingMailer::default());
  let config = ServerConfig {
    host:                "127.0.0.1".to_owned(),
    port:                5000,
    base_url:            "http://localhost:5000".to_owned(),
    frontend_url:        "http://localhost:3000".to_owned(),
    store_path:          data.path().join(DB_FILE),
    upload_dir:          uploads.path().to_path_buf(),
    jwt_secret:          "router-test-secret".to_owned(),
    token_ttl_hours:     24,
    organization:        "Dealflow".to_owned(),
    smtp:                None,
    ai:                  None,
    google_userinfo_url: String::new(),
  };
  let state = AppState {
    store:    store.clone(),
    tokens:   tokens.clone(),
    mailer:   mailer.clone(),
    identity: Arc::new(StubIdentity),
    chat:     Arc::new(EchoChat),
    files:    Arc::new(DiskFileStore::new(uploads.path(), "http://localhost:5000")),
    config:   Arc::new(config),
  };
  Harness { app: router(state), store, tokens, mailer, uploads, data }
}

impl Harness {
  /// Create a user with password `password1` and return it with a token.
  async fn user(&self, name: &str, role: Role) -> (User, String) {
    let mut input = NewUser::new(name, format!("{}@example.com", name.to_lowercase()));
    input.role = role;
    input.password_hash = Some(passwords::hash("password1").unwrap());
    let user = self.store.create_user(input).await.unwrap();
    let token = self
      .tokens
      .issue(&Identity { id: user.id, email: user.email.clone(), role })
      .unwrap();
    (user, token)
  }

  async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
    let resp = self.app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
  }

  async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
      Some(body) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    self.send(req).await
  }

  async fn form(&self, method: Method, uri: &str, token: &str, fields: &[(&str, &str)]) -> (StatusCode, Value) {
    self.multipart(method, uri, token, fields, None).await
  }

  /// Like [`Harness::form`] with a small PDF sent as `(field, file_name)`.
  async fn form_with_file(
    &self,
    method: Method,
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    file: (&str, &str),
  ) -> (StatusCode, Value) {
    self.multipart(method, uri, token, fields, Some(file)).await
  }

  async fn multipart(
    &self,
    method: Method,
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str)>,
  ) -> (StatusCode, Value) {
    const BOUNDARY: &str = "dealflow-test-boundary";
    let mut body = String::new();
    for (name, value) in fields {
      body.push_str(&format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
      ));
    }
    if let Some((name, file_name)) = file {
      body.push_str(&format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/pdf\r\n\r\n%PDF-1.4 {file_name}\r\n"
      ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    let req = Request::builder()
      .method(method)
      .uri(uri)
      .header(header::AUTHORIZATION, format!("Bearer {token}"))
      .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
      .body(Body::from(body))
      .unwrap();
    self.send(req).await
  }

  /// Names of the files currently in the upload directory.
  fn uploaded(&self) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(self.uploads.path())
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
      .collect();
    names.sort();
    names
  }

  /// Rewrite a lead's creation time behind the store's back.
  fn backdate(&self, lead_id: &str, created_at: DateTime<Utc>) {
    let conn = rusqlite::Connection::open(self.data.path().join(DB_FILE)).unwrap();
    let n = conn
      .execute(
        "UPDATE leads SET created_at = ?1 WHERE lead_id = ?2",
        [created_at.to_rfc3339_opts(SecondsFormat::Micros, true), lead_id.to_owned()],
      )
      .unwrap();
    assert_eq!(n, 1);
  }

  async fn lead(&self, token: &str, body: Value) -> String {
    let (status, body) = self.call(Method::POST, "/api/leads", Some(token), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["lead"]["id"].as_str().unwrap().to_owned()
  }
}

// ─── Misc ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn root_reports_running() {
  let h = harness().await;
  let (status, body) = h.call(Method::GET, "/", None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["message"], "Dealflow API is running");
  assert!(body["version"].is_string());
}

#[tokio::test]
async fn unknown_route_is_404() {
  let h = harness().await;
  let (status, body) = h.call(Method::GET, "/api/nowhere", None, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body, json!({ "error": "Route not found" }));
}

#[tokio::test]
async fn missing_token_is_401() {
  let h = harness().await;
  let (status, body) = h.call(Method::GET, "/api/leads", None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["error"], "Access token required");
}

#[tokio::test]
async fn pdf_uploads_are_served_inline() {
  let h = harness().await;
  std::fs::write(h.uploads.path().join("quote.pdf"), b"%PDF-1.4").unwrap();
  let req = Request::builder().uri("/uploads/quote.pdf").body(Body::empty()).unwrap();
  let resp = h.app.clone().oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
  assert_eq!(resp.headers()[header::CONTENT_DISPOSITION], "inline");
}

#[tokio::test]
async fn malformed_input_is_a_json_400() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let id = h.lead(&admin, json!({ "title": "Typed" })).await;

  let cases = [
    (Method::PATCH, format!("/api/leads/{id}"), Some(json!({ "status": "BOGUS" }))),
    (Method::POST, "/api/leads".to_owned(), Some(json!({ "title": "Bad", "value": "abc" }))),
    (Method::POST, "/api/leads".to_owned(), Some(json!({ "title": ["not", "a", "string"] }))),
    (Method::GET, "/api/leads/not-a-uuid".to_owned(), None),
    (Method::GET, "/api/dashboard/stats?month=soon".to_owned(), None),
  ];
  for (method, uri, body) in cases {
    let (status, reply) = h.call(method.clone(), &uri, Some(&admin), body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}: {reply}");
    assert!(reply["error"].is_string(), "{method} {uri}: {reply}");
  }

  let truncated = Request::builder()
    .method(Method::POST)
    .uri("/api/leads")
    .header(header::AUTHORIZATION, format!("Bearer {admin}"))
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(r#"{"title": "Cut"#))
    .unwrap();
  let (status, reply) = h.send(truncated).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(reply["error"].is_string());

  // A note must be a multipart form.
  let (status, reply) = h
    .call(Method::POST, &format!("/api/leads/{id}/notes"), Some(&admin), Some(json!({ "content": "x" })))
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(reply["error"].is_string());

  let (_, lead) = h.call(Method::GET, &format!("/api/leads/{id}"), Some(&admin), None).await;
  assert_eq!(lead["lead"]["status"], "LEAD_IN");
}

// ─── Auth ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_then_login() {
  let h = harness().await;
  let body = json!({ "name": "Rina", "email": "rina@example.com", "password": "password1", "role": "sales" });
  let (status, created) = h.call(Method::POST, "/api/auth/register", None, Some(body.clone())).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(created["user"]["role"], "SALES");
  assert!(created["user"].get("passwordHash").is_none());
  assert!(created["token"].is_string());

  let (status, _) = h.call(Method::POST, "/api/auth/register", None, Some(body)).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let wrong = json!({ "email": "rina@example.com", "password": "nope" });
  let (status, body) = h.call(Method::POST, "/api/auth/login", None, Some(wrong)).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["error"], "Invalid email or password");

  let right = json!({ "email": "RINA@example.com", "password": "password1" });
  let (status, body) = h.call(Method::POST, "/api/auth/login", None, Some(right)).await;
  assert_eq!(status, StatusCode::OK);
  let token = body["token"].as_str().unwrap();

  let (status, profile) = h.call(Method::GET, "/api/auth/profile", Some(token), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(profile["user"]["email"], "rina@example.com");
  assert_eq!(profile["user"]["assignedLeads"], json!([]));
}

#[tokio::test]
async fn login_requires_both_fields() {
  let h = harness().await;
  let (status, body) = h.call(Method::POST, "/api/auth/login", None, Some(json!({ "email": "a@b.c" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "Email and password are required");
}

#[tokio::test]
async fn google_accounts_cannot_use_password_login() {
  let h = harness().await;
  let (status, body) = h.call(Method::POST, "/api/auth/google-login", None, Some(json!({ "token": "google-ok" }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["user"]["role"], "VIEWER");
  assert_eq!(body["user"]["avatar"], "https://img.example.com/gina.png");

  let (status, body) = h
    .call(Method::POST, "/api/auth/login", None, Some(json!({ "email": "gina@example.com", "password": "whatever" })))
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "Please login with Google.");

  let (status, _) = h.call(Method::POST, "/api/auth/google-check", None, Some(json!({ "token": "google-ok" }))).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (status, body) = h.call(Method::POST, "/api/auth/google-login", None, Some(json!({ "token": "forged" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "Invalid Google Token");
}

#[tokio::test]
async fn password_reset_round() {
  let h = harness().await;
  let (user, _) = h.user("Budi", Role::Sales).await;

  let (status, _) =
    h.call(Method::POST, "/api/auth/forgot-password", None, Some(json!({ "email": "ghost@example.com" }))).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, body) =
    h.call(Method::POST, "/api/auth/forgot-password", None, Some(json!({ "email": user.email }))).await;
  assert_eq!(status, StatusCode::OK, "{body}");
  let code = h.store.get_user(user.id).await.unwrap().unwrap().reset_code.unwrap().code;
  {
    let sent = h.mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec![user.email.clone()]);
    assert!(sent[0].html.contains(&code));
  }

  let bad = json!({ "email": user.email, "code": "000000", "newPassword": "fresh-pass" });
  let (status, _) = h.call(Method::POST, "/api/auth/reset-password", None, Some(bad)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let good = json!({ "email": user.email, "code": code, "newPassword": "fresh-pass" });
  let (status, _) = h.call(Method::POST, "/api/auth/reset-password", None, Some(good.clone())).await;
  assert_eq!(status, StatusCode::OK);

  // The code is single-use.
  let (status, _) = h.call(Method::POST, "/api/auth/reset-password", None, Some(good)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let login = json!({ "email": user.email, "password": "fresh-pass" });
  let (status, _) = h.call(Method::POST, "/api/auth/login", None, Some(login)).await;
  assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reset_mail_failure_is_500() {
  let h = harness().await;
  let (user, _) = h.user("Citra", Role::Viewer).await;
  h.mailer.fail.store(true, Ordering::SeqCst);
  let (status, body) =
    h.call(Method::POST, "/api/auth/forgot-password", None, Some(json!({ "email": user.email }))).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(body["error"], "Failed to send email. Please try again later.");
}

#[tokio::test]
async fn change_password_checks() {
  let h = harness().await;
  let (_, token) = h.user("Dewi", Role::Sales).await;
  let path = "/api/auth/change-password";

  let wrong = json!({ "currentPassword": "nope", "newPassword": "long-enough" });
  let (status, _) = h.call(Method::POST, path, Some(&token), Some(wrong)).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let short = json!({ "currentPassword": "password1", "newPassword": "short" });
  let (status, _) = h.call(Method::POST, path, Some(&token), Some(short)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let ok = json!({ "currentPassword": "password1", "newPassword": "long-enough" });
  let (status, body) = h.call(Method::POST, path, Some(&token), Some(ok)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["message"], "Password changed successfully");
}

// ─── Leads ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sales_listing_is_scoped() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let (sales, sales_token) = h.user("Eka", Role::Sales).await;

  h.lead(&admin, json!({ "title": "Unrelated" })).await;
  h.lead(&admin, json!({ "title": "Assigned", "assignedUserIds": [sales.id] })).await;
  h.lead(&sales_token, json!({ "title": "Own" })).await;

  let (_, body) = h.call(Method::GET, "/api/leads", Some(&sales_token), None).await;
  assert_eq!(body["total"], 2);
  let mut titles: Vec<&str> = body["leads"].as_array().unwrap().iter().map(|l| l["title"].as_str().unwrap()).collect();
  titles.sort_unstable();
  assert_eq!(titles, ["Assigned", "Own"]);

  let (_, body) = h.call(Method::GET, "/api/leads", Some(&admin), None).await;
  assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn lead_access_rules() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let (_, sales) = h.user("Fajar", Role::Sales).await;
  let (_, viewer) = h.user("Viewer", Role::Viewer).await;
  let id = h.lead(&admin, json!({ "title": "Private" })).await;

  let (status, _) = h.call(Method::GET, &format!("/api/leads/{id}"), Some(&sales), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, _) = h.call(Method::POST, "/api/leads", Some(&viewer), Some(json!({ "title": "x" }))).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, body) = h.call(Method::POST, "/api/leads", Some(&admin), Some(json!({ "company": "x" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "Title is required");

  let (status, _) = h.call(Method::GET, "/api/leads?status=WINNING", Some(&admin), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = h.call(Method::DELETE, &format!("/api/leads/{id}"), Some(&sales), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, _) = h.call(Method::DELETE, &format!("/api/leads/{id}"), Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  let (status, _) = h.call(Method::GET, &format!("/api/leads/{id}"), Some(&admin), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn won_lead_counts_as_realised_revenue() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let id = h.lead(&admin, json!({ "title": "Big deal", "value": "1000" })).await;

  let (status, body) =
    h.call(Method::PATCH, &format!("/api/leads/{id}"), Some(&admin), Some(json!({ "status": "WON" }))).await;
  assert_eq!(status, StatusCode::OK);
  assert!(body["lead"]["wonAt"].is_string());

  let now = Utc::now();
  let uri = format!("/api/dashboard/revenue-chart?year={}", now.year());
  let (_, chart) = h.call(Method::GET, &uri, Some(&admin), None).await;
  let months = chart.as_array().unwrap();
  assert_eq!(months.len(), 12);
  let this_month = now.month0() as usize;
  for (i, month) in months.iter().enumerate() {
    let expected = if i == this_month { 1000.0 } else { 0.0 };
    assert_eq!(month["realisation"].as_f64(), Some(expected), "month {i}");
  }
}

#[tokio::test]
async fn all_time_stats_have_no_change() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  h.lead(&admin, json!({ "title": "One", "value": 400 })).await;
  h.lead(&admin, json!({ "title": "Two", "value": 600, "status": "WON" })).await;

  let (status, stats) = h.call(Method::GET, "/api/dashboard/stats?range=all", Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(stats["pipelineValue"]["value"].as_f64(), Some(1000.0));
  assert_eq!(stats["activeDeals"]["value"], 2);
  assert_eq!(stats["avgDeal"]["value"], 500);
  assert_eq!(stats["metrics"]["conversionRate"]["value"], 50);
  for metric in [
    &stats["pipelineValue"],
    &stats["activeDeals"],
    &stats["avgDeal"],
    &stats["metrics"]["totalWon"],
    &stats["metrics"]["totalLost"],
    &stats["metrics"]["totalLeads"],
    &stats["metrics"]["conversionRate"],
  ] {
    assert_eq!(metric["change"], 0);
  }

  let (status, _) = h.call(Method::GET, "/api/dashboard/stats?month=12", Some(&admin), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn monthly_stats_compare_with_previous_month() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let at = |y, m, d, hh, mm, ss| Utc.with_ymd_and_hms(y, m, d, hh, mm, ss).unwrap();
  let seed = [
    // October 2024: nothing. November 2024.
    ("Nov", 900, "LEAD_IN", at(2024, 11, 30, 23, 59, 59)),
    // December 2024
    ("Dec won", 400, "WON", at(2024, 12, 1, 0, 0, 0)),
    ("Dec lost", 600, "LOST", at(2024, 12, 31, 23, 59, 59)),
    // January 2025
    ("Jan won", 1500, "WON", at(2025, 1, 1, 0, 0, 0)),
    ("Jan won too", 300, "WON", at(2025, 1, 14, 9, 30, 0)),
    ("Jan lost", 200, "LOST", at(2025, 1, 20, 16, 0, 0)),
    ("Jan lost too", 0, "LOST", at(2025, 1, 31, 23, 59, 59)),
    // February 2025
    ("Feb", 9999, "NEGOTIATION", at(2025, 2, 1, 0, 0, 0)),
  ];
  for (title, value, status, created_at) in seed {
    let id = h.lead(&admin, json!({ "title": title, "value": value, "status": status })).await;
    h.backdate(&id, created_at);
  }

  // January against the December before it.
  let (status, jan) = h.call(Method::GET, "/api/dashboard/stats?month=0&year=2025", Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK, "{jan}");
  assert_eq!(jan["pipelineValue"]["value"].as_f64(), Some(2000.0));
  assert_eq!(jan["pipelineValue"]["change"], 100);
  assert_eq!(jan["activeDeals"]["value"], 4);
  assert_eq!(jan["activeDeals"]["change"], 100);
  assert_eq!(jan["avgDeal"]["value"], 500);
  assert_eq!(jan["avgDeal"]["change"], 0);
  assert_eq!(jan["metrics"]["totalWon"], json!({ "value": 2, "change": 100, "isPositive": true }));
  assert_eq!(jan["metrics"]["totalLost"], json!({ "value": 2, "change": 100, "isPositive": false }));
  assert_eq!(jan["metrics"]["totalLeads"]["change"], 100);
  assert_eq!(jan["metrics"]["conversionRate"], json!({ "value": 50, "change": 0, "isPositive": true }));

  // February shrank against January.
  let (_, feb) = h.call(Method::GET, "/api/dashboard/stats?month=1&year=2025", Some(&admin), None).await;
  assert_eq!(feb["metrics"]["totalLeads"], json!({ "value": 1, "change": -75, "isPositive": false }));
  assert_eq!(feb["metrics"]["totalLost"], json!({ "value": 0, "change": -100, "isPositive": false }));
  assert_eq!(feb["metrics"]["conversionRate"]["change"], -100);

  // November follows an empty October.
  let (_, nov) = h.call(Method::GET, "/api/dashboard/stats?month=10&year=2024", Some(&admin), None).await;
  assert_eq!(nov["pipelineValue"]["value"].as_f64(), Some(900.0));
  assert_eq!(nov["pipelineValue"]["change"], 100);
  assert_eq!(nov["metrics"]["totalLeads"]["change"], 100);
  assert_eq!(nov["metrics"]["totalWon"], json!({ "value": 0, "change": 0, "isPositive": true }));
  assert_eq!(nov["metrics"]["totalLost"], json!({ "value": 0, "change": 0, "isPositive": false }));
}

#[tokio::test]
async fn earliest_supported_month_has_stats() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let (status, stats) = h.call(Method::GET, "/api/dashboard/stats?month=0&year=1970", Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK, "{stats}");
  assert_eq!(stats["activeDeals"]["value"], 0);
}

// ─── Sub-resources ────────────────────────────────────────────────────────────

#[tokio::test]
async fn only_author_or_admin_edits_a_call() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let (author, author_token) = h.user("Gita", Role::Sales).await;
  let (other, other_token) = h.user("Hadi", Role::Sales).await;
  let lead = h.lead(&admin, json!({ "title": "Shared", "assignedUserIds": [author.id, other.id] })).await;

  let (status, call) = h
    .call(
      Method::POST,
      &format!("/api/leads/{lead}/calls"),
      Some(&author_token),
      Some(json!({ "title": "Intro call", "scheduledAt": "2025-06-01T09:00" })),
    )
    .await;
  assert_eq!(status, StatusCode::CREATED);
  let call_path = format!("/api/leads/{lead}/calls/{}", call["id"].as_str().unwrap());

  let edit = json!({ "title": "Hijacked" });
  let (status, _) = h.call(Method::PATCH, &call_path, Some(&other_token), Some(edit)).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, _) = h.call(Method::DELETE, &call_path, Some(&other_token), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (_, unchanged) = h.call(Method::GET, &call_path, Some(&other_token), None).await;
  assert_eq!(unchanged["title"], "Intro call");
  assert_eq!(unchanged["createdBy"]["name"], "Gita");

  let (status, edited) = h.call(Method::PATCH, &call_path, Some(&admin), Some(json!({ "title": "Renamed" }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(edited["title"], "Renamed");

  let (status, body) = h.call(Method::DELETE, &call_path, Some(&author_token), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["message"], "Call deleted successfully");
}

#[tokio::test]
async fn invoice_numbers_are_sequential() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let lead = h.lead(&admin, json!({ "title": "Billable" })).await;
  let path = format!("/api/leads/{lead}/invoices");
  let prefix = format!("INV/{}/", Utc::now().format("%Y/%m"));

  let mut numbers = Vec::new();
  for total in [100, 250] {
    let (status, body) =
      h.call(Method::POST, &path, Some(&admin), Some(json!({ "meta": { "totalAmount": total, "status": "sent" } }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    numbers.push(body["data"]["title"].as_str().unwrap().to_owned());
  }
  assert_eq!(numbers, [format!("{prefix}0001"), format!("{prefix}0002")]);

  let (status, body) = h
    .call(Method::POST, &format!("/api/leads/{lead}/activities"), Some(&admin), Some(json!({ "type": "INVOICE", "title": "x" })))
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn notes_are_multipart() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let lead = h.lead(&admin, json!({ "title": "Noted" })).await;
  let path = format!("/api/leads/{lead}/notes");

  let (status, _) = h.form(Method::POST, &path, &admin, &[]).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, note) = h.form(Method::POST, &path, &admin, &[("content", "Call back Monday")]).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(note["type"], "NOTE");
  assert_eq!(note["description"], "Call back Monday");

  let (_, list) = h.call(Method::GET, &path, Some(&admin), None).await;
  assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn emails_are_sent_then_logged() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let lead = h.lead(&admin, json!({ "title": "Mailed" })).await;
  let path = format!("/api/leads/{lead}/emails");

  let (status, _) = h.form(Method::POST, &path, &admin, &[("subject", "Hi")]).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let fields = [("to", "buyer@example.com, cfo@example.com"), ("subject", "Proposal"), ("message", "<p>Hi</p>")];
  let (status, body) = h.form(Method::POST, &path, &admin, &fields).await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["message"], "Email sent.");
  assert_eq!(body["data"]["meta"]["status"], "SENT");
  assert_eq!(body["data"]["isCompleted"], true);
  {
    let sent = h.mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, ["buyer@example.com", "cfo@example.com"]);
    assert_eq!(sent[0].sender_name.as_deref(), Some("Admin"));
  }

  let (status, draft) = h.form(Method::POST, &path, &admin, &[("isDraft", "true")]).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(draft["message"], "Saved as Draft.");
  assert_eq!(draft["data"]["title"], "(No subject)");
  assert_eq!(h.mailer.sent.lock().unwrap().len(), 1);

  h.mailer.fail.store(true, Ordering::SeqCst);
  let (status, _) = h.form(Method::POST, &path, &admin, &fields).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  let (_, list) = h.call(Method::GET, &path, Some(&admin), None).await;
  assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn note_attachments_follow_their_note() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let lead = h.lead(&admin, json!({ "title": "Filed" })).await;
  let path = format!("/api/leads/{lead}/notes");

  let (status, note) = h
    .form_with_file(Method::POST, &path, &admin, &[("content", "Signed")], ("attachment", "first.pdf"))
    .await;
  assert_eq!(status, StatusCode::CREATED, "{note}");
  let first = note["meta"]["attachment"]["path"].as_str().unwrap().to_owned();
  assert_eq!(h.uploaded(), [first.clone()]);
  let item = format!("{path}/{}", note["id"].as_str().unwrap());

  // Replacing the file removes the old one.
  let (status, note) = h
    .form_with_file(Method::PATCH, &item, &admin, &[("content", "Countersigned")], ("attachment", "second.pdf"))
    .await;
  assert_eq!(status, StatusCode::OK, "{note}");
  let second = note["meta"]["attachment"]["path"].as_str().unwrap().to_owned();
  assert_ne!(first, second);
  assert_eq!(h.uploaded(), [second]);

  let (status, note) = h
    .form(Method::PATCH, &item, &admin, &[("content", "Countersigned"), ("removeAttachment", "true")])
    .await;
  assert_eq!(status, StatusCode::OK);
  assert!(note["meta"]["attachment"].is_null());
  assert!(h.uploaded().is_empty());

  // Deleting tolerates a file that is already gone.
  let (_, note) = h
    .form_with_file(Method::POST, &path, &admin, &[("content", "Again")], ("attachment", "third.pdf"))
    .await;
  let third = note["meta"]["attachment"]["path"].as_str().unwrap().to_owned();
  std::fs::remove_file(h.uploads.path().join(&third)).unwrap();
  let item = format!("{path}/{}", note["id"].as_str().unwrap());
  let (status, _) = h.call(Method::DELETE, &item, Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);

  // Deleting the lead takes its files along.
  h.form_with_file(Method::POST, &path, &admin, &[("content", "Last")], ("attachment", "fourth.pdf"))
    .await;
  assert_eq!(h.uploaded().len(), 1);
  let (status, _) = h.call(Method::DELETE, &format!("/api/leads/{lead}"), Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(h.uploaded().is_empty());
}

#[tokio::test]
async fn email_attachments_are_replaced_and_removed() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let lead = h.lead(&admin, json!({ "title": "Mailed" })).await;
  let path = format!("/api/leads/{lead}/emails");

  let (status, draft) = h
    .form_with_file(Method::POST, &path, &admin, &[("isDraft", "true"), ("subject", "Quote")], ("file", "v1.pdf"))
    .await;
  assert_eq!(status, StatusCode::OK, "{draft}");
  let v1 = draft["data"]["meta"]["attachment"]["path"].as_str().unwrap().to_owned();
  assert_eq!(h.uploaded(), [v1]);
  let item = format!("{path}/{}", draft["data"]["id"].as_str().unwrap());

  let (status, draft) = h.form_with_file(Method::PATCH, &item, &admin, &[], ("file", "v2.pdf")).await;
  assert_eq!(status, StatusCode::OK, "{draft}");
  let v2 = draft["data"]["meta"]["attachment"]["path"].as_str().unwrap().to_owned();
  assert_eq!(h.uploaded(), [v2]);

  let (status, _) = h.call(Method::DELETE, &item, Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(h.uploaded().is_empty());
}

#[tokio::test]
async fn unsaved_email_leaves_no_upload_behind() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let lead = h.lead(&admin, json!({ "title": "Mailed" })).await;

  // A valid token whose account no longer exists: the mail goes out but the
  // activity cannot reference its author.
  let ghost = h
    .tokens
    .issue(&Identity { id: uuid::Uuid::new_v4(), email: "ghost@example.com".into(), role: Role::Admin })
    .unwrap();
  let fields = [("to", "buyer@example.com"), ("subject", "Quote")];
  let (status, _) = h
    .form_with_file(Method::POST, &format!("/api/leads/{lead}/emails"), &ghost, &fields, ("file", "quote.pdf"))
    .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(h.mailer.sent.lock().unwrap().len(), 1);
  assert!(h.uploaded().is_empty());
}

// ─── Team & AI ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn team_administration() {
  let h = harness().await;
  let (admin_user, admin) = h.user("Admin", Role::Admin).await;
  let (_, sales) = h.user("Indra", Role::Sales).await;

  let member = json!({ "name": "Joko", "email": "joko@example.com", "password": "password1", "role": "SALES" });
  let (status, _) = h.call(Method::POST, "/api/team", Some(&sales), Some(member.clone())).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, created) = h.call(Method::POST, "/api/team", Some(&admin), Some(member.clone())).await;
  assert_eq!(status, StatusCode::CREATED);
  let (status, body) = h.call(Method::POST, "/api/team", Some(&admin), Some(member)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"], "Email already exists");

  let (_, listed) = h.call(Method::GET, "/api/sales", Some(&sales), None).await;
  let names: Vec<&str> = listed.as_array().unwrap().iter().map(|m| m["name"].as_str().unwrap()).collect();
  assert_eq!(names, ["Indra", "Joko"]);

  let joko = created["id"].as_str().unwrap();
  let (status, body) = h
    .call(Method::PATCH, &format!("/api/team/{joko}"), Some(&admin), Some(json!({ "reportsToId": admin_user.id })))
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["reportsToId"], admin_user.id.to_string());
  let (_, profile) = h.call(Method::GET, &format!("/api/team/{joko}"), Some(&sales), None).await;
  assert_eq!(profile["reportsTo"]["name"], "Admin");

  let (status, body) = h.call(Method::DELETE, &format!("/api/team/{}", admin_user.id), Some(&admin), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["error"], "You cannot delete your own account.");

  let (status, _) = h.call(Method::DELETE, &format!("/api/team/{joko}"), Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  let (status, _) = h.call(Method::DELETE, &format!("/api/team/{joko}"), Some(&admin), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn members_owning_leads_cannot_be_deleted() {
  let h = harness().await;
  let (_, admin) = h.user("Admin", Role::Admin).await;
  let (owner, owner_token) = h.user("Kiki", Role::Sales).await;
  h.lead(&owner_token, json!({ "title": "Mine" })).await;

  let (status, _) = h.call(Method::DELETE, &format!("/api/team/{}", owner.id), Some(&admin), None).await;
  assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn chat_relays_message() {
  let h = harness().await;
  let (_, token) = h.user("Lina", Role::Viewer).await;
  let (status, _) = h.call(Method::POST, "/api/ai/chat", Some(&token), Some(json!({ "message": " " }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (status, body) = h.call(Method::POST, "/api/ai/chat", Some(&token), Some(json!({ "message": "hello" }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "reply": "echo: hello" }));
}
