//! Multipart form handling for endpoints that accept one attachment.

use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;

use crate::error::ApiError;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 6] = ["jpeg", "jpg", "png", "pdf", "doc", "docx"];

const ALLOWED_MIME_TYPES: [&str; 5] = [
  "image/jpeg",
  "image/png",
  "application/pdf",
  "application/msword",
  "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// A validated file received in a form.
#[derive(Debug, Clone)]
pub struct Upload {
  pub file_name:    String,
  pub content_type: String,
  pub data:         Bytes,
}

/// Text fields plus at most one file.
#[derive(Debug, Default)]
pub struct MultipartForm {
  fields:   HashMap<String, String>,
  pub file: Option<Upload>,
}

impl MultipartForm {
  /// Drain `multipart`, keeping the file sent as `file_field`. Files under
  /// other names are ignored.
  pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self, ApiError> {
    let mut form = Self::default();
    while let Some(field) = multipart.next_field().await? {
      let Some(name) = field.name().map(str::to_owned) else { continue };
      match field.file_name().map(str::to_owned) {
        Some(file_name) => {
          let content_type = field.content_type().unwrap_or("application/octet-stream").to_owned();
          let data = field.bytes().await?;
          if name != file_field || (file_name.is_empty() && data.is_empty()) {
            continue;
          }
          form.file = Some(validate(file_name, content_type, data)?);
        }
        None => {
          let text = field.text().await?;
          form.fields.insert(name, text);
        }
      }
    }
    Ok(form)
  }

  /// A text field, trimmed; blank counts as absent.
  pub fn text(&self, name: &str) -> Option<&str> {
    self.fields.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
  }

  /// `true`/`false` fields; anything else counts as absent.
  pub fn flag(&self, name: &str) -> Option<bool> {
    match self.text(name)? {
      "true" => Some(true),
      "false" => Some(false),
      _ => None,
    }
  }
}

fn validate(file_name: String, content_type: String, data: Bytes) -> Result<Upload, ApiError> {
  if data.len() > MAX_UPLOAD_BYTES {
    return Err(ApiError::bad_request("File too large (max 10MB)"));
  }
  let extension = file_name
    .rsplit_once('.')
    .map(|(_, ext)| ext.to_ascii_lowercase())
    .unwrap_or_default();
  let mime = content_type.to_ascii_lowercase();
  if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) || !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
    return Err(ApiError::bad_request(
      "File type not supported! Only images, PDFs, and DOCs are allowed.",
    ));
  }
  Ok(Upload { file_name, content_type: mime, data })
}
