//! Error types for `dealflow-core`.

use thiserror::Error;

use crate::activity::ActivityKind;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown activity type: {0:?}")]
  UnknownActivityType(String),

  #[error("cannot turn a {expected:?} activity into a {found:?}")]
  ActivityKindMismatch {
    expected: ActivityKind,
    found:    ActivityKind,
  },

  #[error("month must be between 0 and 11, got {0}")]
  InvalidMonth(i64),

  #[error("year {0} is out of range")]
  InvalidYear(i32),

  #[error("no invoice number left after the latest one under {0}")]
  InvoiceSequenceExhausted(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
