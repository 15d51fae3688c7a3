//! Outbound e-mail.

use async_trait::async_trait;
use bytes::Bytes;
use lettre::{
  AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
  message::{
    Attachment, Mailbox, MultiPart, SinglePart,
    header::{ContentType, ContentTypeErr},
  },
  transport::smtp::authentication::Credentials,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
  #[error("invalid address: {0}")]
  Address(#[from] lettre::address::AddressError),
  #[error("invalid content type: {0}")]
  ContentType(#[from] ContentTypeErr),
  #[error("cannot build message: {0}")]
  Build(#[from] lettre::error::Error),
  #[error("smtp error: {0}")]
  Smtp(#[from] lettre::transport::smtp::Error),
}

/// A file sent along with a message.
#[derive(Debug, Clone)]
pub struct MailAttachment {
  pub file_name:    String,
  pub content_type: String,
  pub data:         Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingMail {
  pub to:          Vec<String>,
  pub cc:          Vec<String>,
  pub bcc:         Vec<String>,
  pub subject:     String,
  pub html:        String,
  /// Defaults to the configured sender address.
  pub reply_to:    Option<String>,
  /// Person the message is sent on behalf of.
  pub sender_name: Option<String>,
  pub attachments: Vec<MailAttachment>,
}

/// Split a comma-separated recipient list, dropping blanks.
pub fn split_addresses(list: &str) -> Vec<String> {
  list
    .split([',', ';'])
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
    .collect()
}

#[async_trait]
pub trait Mailer: Send + Sync {
  async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

// ─── SMTP ────────────────────────────────────────────────────────────────────

fn default_smtp_port() -> u16 { 587 }

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
  pub host:         String,
  #[serde(default = "default_smtp_port")]
  pub port:         u16,
  pub username:     String,
  pub password:     String,
  pub from_address: String,
}

/// The display name for mail sent on behalf of `sender`, as in
/// `"Rina from Dealflow"`.
pub fn from_label(organization: &str, sender: Option<&str>) -> String {
  match sender {
    Some(name) => format!("{name} from {organization}"),
    None => format!("{organization} CRM"),
  }
}

pub struct SmtpMailer {
  config:       SmtpConfig,
  organization: String,
  transport:    AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
  pub fn new(config: SmtpConfig, organization: impl Into<String>) -> Result<Self, MailError> {
    let builder = if config.port == 465 {
      AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
    } else {
      AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
    };
    let transport = builder
      .port(config.port)
      .credentials(Credentials::new(config.username.clone(), config.password.clone()))
      .build();
    Ok(Self { config, organization: organization.into(), transport })
  }

  fn build(&self, mail: OutgoingMail) -> Result<Message, MailError> {
    let from = Mailbox::new(
      Some(from_label(&self.organization, mail.sender_name.as_deref())),
      self.config.from_address.parse()?,
    );
    let reply_to = mail.reply_to.as_deref().unwrap_or(&self.config.from_address);

    let mut builder = Message::builder()
      .from(from)
      .reply_to(reply_to.parse()?)
      .subject(mail.subject);
    for to in &mail.to {
      builder = builder.to(to.parse()?);
    }
    for cc in &mail.cc {
      builder = builder.cc(cc.parse()?);
    }
    for bcc in &mail.bcc {
      builder = builder.bcc(bcc.parse()?);
    }

    let html = SinglePart::html(mail.html);
    if mail.attachments.is_empty() {
      return Ok(builder.singlepart(html)?);
    }
    let mut body = MultiPart::mixed().singlepart(html);
    for file in mail.attachments {
      let content_type = ContentType::parse(&file.content_type)?;
      body = body.singlepart(Attachment::new(file.file_name).body(file.data.to_vec(), content_type));
    }
    Ok(builder.multipart(body)?)
  }
}

#[async_trait]
impl Mailer for SmtpMailer {
  async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
    let subject = mail.subject.clone();
    let message = self.build(mail)?;
    let response = self.transport.send(message).await?;
    tracing::info!(%subject, code = %response.code(), "mail sent");
    Ok(())
  }
}

// ─── Disabled ────────────────────────────────────────────────────────────────

/// Used when no SMTP server is configured: messages are logged and dropped.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
  async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
    tracing::warn!(to = ?mail.to, subject = %mail.subject, "smtp not configured, mail dropped");
    Ok(())
  }
}
