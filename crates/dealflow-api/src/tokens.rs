//! Bearer token issuance and verification (HS256 JWT).

use chrono::{DateTime, Duration, Utc};
use dealflow_core::{access::Identity, user::Role};
use jsonwebtoken::{
  Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
  errors::Error as JwtError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  /// User id.
  pub sub:   Uuid,
  pub email: String,
  pub role:  Role,
  pub iat:   i64,
  pub exp:   i64,
}

/// Signing material plus token lifetime.
pub struct TokenKeys {
  encoding: EncodingKey,
  decoding: DecodingKey,
  ttl:      Duration,
}

impl TokenKeys {
  pub fn new(secret: &str, ttl_hours: i64) -> Self {
    Self {
      encoding: EncodingKey::from_secret(secret.as_bytes()),
      decoding: DecodingKey::from_secret(secret.as_bytes()),
      ttl:      Duration::hours(ttl_hours),
    }
  }

  pub fn issue(&self, identity: &Identity) -> Result<String, JwtError> {
    self.issue_at(identity, Utc::now())
  }

  pub fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String, JwtError> {
    let claims = Claims {
      sub:   identity.id,
      email: identity.email.clone(),
      role:  identity.role,
      iat:   now.timestamp(),
      exp:   (now + self.ttl).timestamp(),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
  }

  /// Check signature and expiry, yielding the caller's identity.
  pub fn verify(&self, token: &str) -> Result<Identity, JwtError> {
    let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
    let Claims { sub, email, role, .. } = data.claims;
    Ok(Identity { id: sub, email, role })
  }
}
