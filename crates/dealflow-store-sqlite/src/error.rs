//! Error type for `dealflow-store-sqlite`.

use dealflow_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] dealflow_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum code no longer maps to a variant.
  #[error("unknown {column} value: {value:?}")]
  UnknownCode { column: &'static str, value: String },

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: uuid::Uuid },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl StoreError for Error {
  fn is_conflict(&self) -> bool {
    match self {
      Error::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))) => {
        e.code == rusqlite::ErrorCode::ConstraintViolation
      }
      Error::Core(dealflow_core::Error::InvoiceSequenceExhausted(_)) => true,
      _ => false,
    }
  }
}
