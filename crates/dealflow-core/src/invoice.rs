//! Invoice numbers of the form `INV/<year>/<MM>/<NNNN>`.
//!
//! The sequence restarts every calendar month. Stores call
//! [`next_invoice_number`] with the title of the most recent invoice carrying
//! the same prefix, inside the transaction that inserts the new invoice.

use chrono::{DateTime, Datelike, Utc};

use crate::{Error, Result};

/// `INV/2025/06/` for any instant in June 2025.
pub fn invoice_prefix(issued_at: DateTime<Utc>) -> String {
  format!("INV/{}/{:02}/", issued_at.year(), issued_at.month())
}

/// The number following `last_title`, or the first of the month when there
/// is none or its trailing segment is not a number.
///
/// Fails when the trailing number of `last_title` has no successor.
pub fn next_invoice_number(issued_at: DateTime<Utc>, last_title: Option<&str>) -> Result<String> {
  let prefix = invoice_prefix(issued_at);
  let last = last_title
    .and_then(|t| t.strip_prefix(&prefix))
    .and_then(|tail| tail.trim().parse::<u64>().ok());
  let sequence = match last {
    None => 1,
    Some(n) => n
      .checked_add(1)
      .ok_or_else(|| Error::InvoiceSequenceExhausted(prefix.clone()))?,
  };
  Ok(format!("{prefix}{sequence:04}"))
}
