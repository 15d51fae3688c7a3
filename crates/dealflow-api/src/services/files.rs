//! Storage for uploaded attachments.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dealflow_core::activity::Attachment;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FileError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("refusing path outside the upload directory: {0}")]
  OutsideRoot(String),
}

#[async_trait]
pub trait FileStore: Send + Sync {
  /// Persist `data` under a fresh unique name derived from `file_name`.
  async fn save(&self, file_name: &str, data: Bytes) -> Result<Attachment, FileError>;

  async fn read(&self, path: &str) -> Result<Bytes, FileError>;

  async fn delete(&self, path: &str) -> Result<(), FileError>;
}

/// Files live directly in `root` and are served from `{public_base}/uploads`.
pub struct DiskFileStore {
  root:        PathBuf,
  public_base: String,
}

impl DiskFileStore {
  pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
    Self { root: root.into(), public_base: public_base.into() }
  }

  fn resolve(&self, path: &str) -> Result<PathBuf, FileError> {
    let mut components = Path::new(path).components();
    match (components.next(), components.next()) {
      (Some(Component::Normal(name)), None) => Ok(self.root.join(name)),
      _ => Err(FileError::OutsideRoot(path.to_owned())),
    }
  }
}

/// Keep a readable tail of the client's file name.
fn sanitize(file_name: &str) -> String {
  let base = Path::new(file_name)
    .file_name()
    .and_then(|n| n.to_str())
    .unwrap_or("upload");
  base
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
    .collect()
}

#[async_trait]
impl FileStore for DiskFileStore {
  async fn save(&self, file_name: &str, data: Bytes) -> Result<Attachment, FileError> {
    let stored = format!(
      "{}-{}-{}",
      Utc::now().timestamp_millis(),
      &Uuid::new_v4().simple().to_string()[..8],
      sanitize(file_name)
    );
    tokio::fs::create_dir_all(&self.root).await?;
    tokio::fs::write(self.root.join(&stored), &data).await?;
    tracing::debug!(%stored, bytes = data.len(), "stored upload");
    Ok(Attachment {
      url:       format!("{}/uploads/{stored}", self.public_base.trim_end_matches('/')),
      path:      stored,
      file_name: file_name.to_owned(),
    })
  }

  async fn read(&self, path: &str) -> Result<Bytes, FileError> {
    Ok(Bytes::from(tokio::fs::read(self.resolve(path)?).await?))
  }

  async fn delete(&self, path: &str) -> Result<(), FileError> {
    tokio::fs::remove_file(self.resolve(path)?).await?;
    Ok(())
  }
}
