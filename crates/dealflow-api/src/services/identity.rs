//! Federated sign-in: resolve a Google access token to a profile.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

#[derive(Debug, Error)]
pub enum IdentityError {
  #[error("userinfo request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("userinfo response has no email")]
  MissingEmail,
}

/// What the provider tells us about the token holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedProfile {
  /// Provider-scoped account id.
  pub subject: String,
  pub email:   String,
  pub name:    Option<String>,
  pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
  async fn userinfo(&self, access_token: &str) -> Result<FederatedProfile, IdentityError>;
}

#[derive(Deserialize)]
struct Userinfo {
  sub:     String,
  email:   Option<String>,
  name:    Option<String>,
  picture: Option<String>,
}

pub struct GoogleIdentity {
  client:       reqwest::Client,
  userinfo_url: String,
}

impl GoogleIdentity {
  pub fn new(client: reqwest::Client, userinfo_url: impl Into<String>) -> Self {
    Self { client, userinfo_url: userinfo_url.into() }
  }
}

#[async_trait]
impl IdentityProvider for GoogleIdentity {
  async fn userinfo(&self, access_token: &str) -> Result<FederatedProfile, IdentityError> {
    let info: Userinfo = self
      .client
      .get(&self.userinfo_url)
      .bearer_auth(access_token)
      .send()
      .await?
      .error_for_status()?
      .json()
      .await?;
    let email = info.email.filter(|e| !e.is_empty()).ok_or(IdentityError::MissingEmail)?;
    Ok(FederatedProfile { subject: info.sub, email, name: info.name, picture: info.picture })
  }
}
