//! E-mails logged against a lead, sent through the configured [`Mailer`].
//!
//! Multipart fields: `to`, `cc`, `bcc`, `subject`, `message`, `replyTo`,
//! `isDraft` and one `file`. A message is sent before it is logged, so a
//! delivery failure leaves no record behind.
//!
//! [`Mailer`]: crate::services::Mailer

use axum::extract::State;
use chrono::Utc;
use dealflow_core::{
  access::Identity,
  activity::{ActivityDetail, EmailDetail, EmailStatus, NewActivity},
  store::CrmStore,
};
use serde::Serialize;
use uuid::Uuid;

use super::{Emails, discard_file, editable_activity, store_upload, visible_lead};
use crate::{
  AppState,
  error::{ApiError, Result},
  extract::{Json, Multipart, Path},
  services::mail::{MailAttachment, OutgoingMail, from_label, split_addresses},
  upload::{MultipartForm, Upload},
  views::{self, ActivityView},
};

const FILE_FIELD: &str = "file";
const NO_SUBJECT: &str = "(No subject)";

#[derive(Debug, Serialize)]
pub struct EmailResponse {
  pub success: bool,
  pub message: &'static str,
  pub data:    ActivityView,
}

async fn sender_name<S: CrmStore>(state: &AppState<S>, identity: &Identity) -> Result<String> {
  let user = state.store.get_user(identity.id).await.map_err(ApiError::store)?;
  Ok(user.map(|u| u.name).unwrap_or_else(|| "Team".to_owned()))
}

fn content_type_for(file_name: &str) -> &'static str {
  let extension = file_name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
  match extension.as_deref() {
    Some("pdf") => "application/pdf",
    Some("png") => "image/png",
    Some("jpg" | "jpeg") => "image/jpeg",
    Some("doc") => "application/msword",
    Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    _ => "application/octet-stream",
  }
}

fn outgoing(detail: &EmailDetail, subject: &str, sender: String) -> OutgoingMail {
  OutgoingMail {
    to: split_addresses(&detail.to),
    cc: detail.cc.as_deref().map(split_addresses).unwrap_or_default(),
    bcc: detail.bcc.as_deref().map(split_addresses).unwrap_or_default(),
    subject: subject.to_owned(),
    html: detail.message_body.clone(),
    reply_to: detail.reply_to.clone(),
    sender_name: Some(sender),
    attachments: Vec::new(),
  }
}

fn mail_attachment(upload: &Upload) -> MailAttachment {
  MailAttachment {
    file_name:    upload.file_name.clone(),
    content_type: upload.content_type.clone(),
    data:         upload.data.clone(),
  }
}

// ─── Send / draft ─────────────────────────────────────────────────────────────

/// `POST /leads/{id}/emails` and `POST /leads/{id}/email`
pub async fn send<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path(lead_id): Path<Uuid>,
  Multipart(multipart): Multipart,
) -> Result<Json<EmailResponse>>
where
  S: CrmStore + Clone + 'static,
{
  let mut form = MultipartForm::read(multipart, FILE_FIELD).await?;
  let is_draft = form.flag("isDraft") == Some(true);
  let to = form.text("to").unwrap_or_default().to_owned();
  let subject = form.text("subject").map(str::to_owned);
  if !is_draft && (to.is_empty() || subject.is_none()) {
    return Err(ApiError::bad_request("Recipient (to) and subject are required"));
  }
  visible_lead(&state, &identity, lead_id).await?;

  let sender = sender_name(&state, &identity).await?;
  let message = form.text("message").unwrap_or_default().to_owned();
  let reply_to = form
    .text("replyTo")
    .map(str::to_owned)
    .or_else(|| state.config.smtp.as_ref().map(|s| s.from_address.clone()));
  let mut detail = EmailDetail {
    status: if is_draft { EmailStatus::Draft } else { EmailStatus::Sent },
    from: from_label(&state.config.organization, Some(sender.as_str())),
    to,
    cc: form.text("cc").map(str::to_owned),
    bcc: form.text("bcc").map(str::to_owned),
    reply_to,
    message_body: message.clone(),
    attachment: None,
  };
  let title = subject.unwrap_or_else(|| NO_SUBJECT.to_owned());

  let upload = form.file.take();
  if let Some(upload) = &upload {
    detail.attachment = Some(store_upload(&state, upload.clone()).await?);
  }
  let saved_path = detail.attachment.as_ref().map(|a| a.path.clone());

  if !is_draft {
    let mut mail = outgoing(&detail, &title, sender);
    mail.attachments.extend(upload.as_ref().map(mail_attachment));
    if let Err(e) = state.mailer.send(mail).await {
      if let Some(path) = &saved_path {
        discard_file(&state, path).await;
      }
      return Err(ApiError::upstream("Failed to send email", e));
    }
  }

  let now = Utc::now();
  let mut new = NewActivity::new(lead_id, identity.id, title, ActivityDetail::Email(detail));
  new.description = message;
  new.scheduled_at = (!is_draft).then_some(now);
  new.is_completed = !is_draft;
  let email = match state.store.create_activity(new).await {
    Ok(email) => email,
    Err(e) => {
      if let Some(path) = &saved_path {
        discard_file(&state, path).await;
      }
      return Err(ApiError::store(e));
    }
  };
  tracing::info!(id = %email.id, lead = %lead_id, draft = is_draft, "email logged");

  Ok(Json(EmailResponse {
    success: true,
    message: if is_draft { "Saved as Draft." } else { "Email sent." },
    data:    views::activity_view(&*state.store, email).await?,
  }))
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// `PATCH /leads/{id}/emails/{item_id}`: edits a draft, and sends it when
/// `isDraft=false`.
pub async fn update<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Path((lead_id, id)): Path<(Uuid, Uuid)>,
  Multipart(multipart): Multipart,
) -> Result<Json<EmailResponse>>
where
  S: CrmStore + Clone + 'static,
{
  let mut form = MultipartForm::read(multipart, FILE_FIELD).await?;
  let mut email = editable_activity::<S, Emails>(&state, &identity, lead_id, id).await?;
  let ActivityDetail::Email(mut detail) = email.detail.clone() else {
    return Err(ApiError::Internal(format!("activity {id} is not an email")));
  };

  if let Some(subject) = form.text("subject") {
    email.title = subject.to_owned();
  }
  if let Some(message) = form.text("message") {
    detail.message_body = message.to_owned();
    email.description = message.to_owned();
  }
  if let Some(to) = form.text("to") {
    detail.to = to.to_owned();
  }
  if let Some(cc) = form.text("cc") {
    detail.cc = Some(cc.to_owned());
  }
  if let Some(bcc) = form.text("bcc") {
    detail.bcc = Some(bcc.to_owned());
  }
  if let Some(reply_to) = form.text("replyTo") {
    detail.reply_to = Some(reply_to.to_owned());
  }

  let sending_now = detail.status == EmailStatus::Draft && form.flag("isDraft") == Some(false);
  if sending_now && detail.to.trim().is_empty() {
    return Err(ApiError::bad_request("Recipient (to) is required"));
  }

  let upload = form.file.take();
  let mut stale = None;
  let mut fresh = None;
  if let Some(upload) = &upload {
    let attachment = store_upload(&state, upload.clone()).await?;
    fresh = Some(attachment.path.clone());
    stale = detail.attachment.replace(attachment);
  }

  if sending_now {
    let sender = sender_name(&state, &identity).await?;
    let mut mail = outgoing(&detail, &email.title, sender);
    match (&upload, &detail.attachment) {
      (Some(upload), _) => mail.attachments.push(mail_attachment(upload)),
      (None, Some(existing)) => match state.files.read(&existing.path).await {
        Ok(data) => mail.attachments.push(MailAttachment {
          file_name: existing.file_name.clone(),
          content_type: content_type_for(&existing.file_name).to_owned(),
          data,
        }),
        Err(e) => tracing::warn!(path = %existing.path, error = %e, "attachment missing, sending without it"),
      },
      (None, None) => {}
    }
    if let Err(e) = state.mailer.send(mail).await {
      if let Some(path) = &fresh {
        discard_file(&state, path).await;
      }
      return Err(ApiError::upstream("Failed to send email", e));
    }
    let now = Utc::now();
    detail.status = EmailStatus::Sent;
    email.is_completed = true;
    email.scheduled_at = Some(now);
  }

  email.detail = ActivityDetail::Email(detail);
  email.updated_at = Utc::now();
  if let Err(e) = state.store.save_activity(&email).await {
    if let Some(path) = &fresh {
      discard_file(&state, path).await;
    }
    return Err(ApiError::store(e));
  }
  if let Some(old) = stale {
    discard_file(&state, &old.path).await;
  }

  Ok(Json(EmailResponse {
    success: true,
    message: if sending_now { "Draft sent successfully." } else { "Draft updated." },
    data:    views::activity_view(&*state.store, email).await?,
  }))
}
