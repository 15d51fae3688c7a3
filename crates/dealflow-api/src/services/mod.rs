//! Collaborators the handlers reach through [`crate::AppState`]. Each one is
//! a trait object so tests can substitute their own.

pub mod chat;
pub mod files;
pub mod identity;
pub mod mail;

pub use chat::{AiConfig, ChatCompletion, DisabledChat, OpenAiChat};
pub use files::{DiskFileStore, FileStore};
pub use identity::{FederatedProfile, GoogleIdentity, IdentityProvider};
pub use mail::{DisabledMailer, Mailer, OutgoingMail, SmtpConfig, SmtpMailer};
