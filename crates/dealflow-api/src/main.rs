//! dealflow server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered with
//! `DEALFLOW_*` environment variables, opens the SQLite store and serves the
//! JSON API over HTTP.
//!
//! Without an `[smtp]` table outgoing mail is logged and dropped; without an
//! `[ai]` table the chat endpoint answers with an error.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use dealflow_api::{
  AppState, ServerConfig,
  services::{
    ChatCompletion, DisabledChat, DisabledMailer, DiskFileStore, GoogleIdentity, Mailer,
    OpenAiChat, SmtpMailer,
  },
  tokens::TokenKeys,
};
use dealflow_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Dealflow CRM server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("DEALFLOW").separator("__"))
    .build()
    .context("failed to read config file")?;

  let mut server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  server_cfg.store_path = expand_tilde(&server_cfg.store_path);
  server_cfg.upload_dir = expand_tilde(&server_cfg.upload_dir);

  let store = SqliteStore::open(&server_cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", server_cfg.store_path))?;

  tokio::fs::create_dir_all(&server_cfg.upload_dir)
    .await
    .with_context(|| format!("failed to create upload dir {:?}", server_cfg.upload_dir))?;

  // Outbound collaborators.
  let http = reqwest::Client::new();
  let mailer: Arc<dyn Mailer> = match server_cfg.smtp.clone() {
    Some(smtp) => Arc::new(
      SmtpMailer::new(smtp, server_cfg.organization.clone()).context("invalid smtp settings")?,
    ),
    None => {
      tracing::warn!("no [smtp] settings; outgoing mail will be dropped");
      Arc::new(DisabledMailer)
    }
  };
  let chat: Arc<dyn ChatCompletion> = match server_cfg.ai.clone() {
    Some(ai) => Arc::new(OpenAiChat::new(http.clone(), ai)),
    None => {
      tracing::warn!("no [ai] settings; chat is disabled");
      Arc::new(DisabledChat)
    }
  };

  // Build application state.
  let state = AppState {
    store:    Arc::new(store),
    tokens:   Arc::new(TokenKeys::new(&server_cfg.jwt_secret, server_cfg.token_ttl_hours)),
    mailer,
    identity: Arc::new(GoogleIdentity::new(http, server_cfg.google_userinfo_url.clone())),
    chat,
    files:    Arc::new(DiskFileStore::new(server_cfg.upload_dir.clone(), server_cfg.base_url.clone())),
    config:   Arc::new(server_cfg.clone()),
  };

  let app = dealflow_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
