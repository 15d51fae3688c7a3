//! Lenient deserialisers for request bodies sent by browser forms.
//!
//! Dates arrive as RFC 3339 timestamps, `YYYY-MM-DDTHH:MM` (datetime-local
//! inputs) or bare `YYYY-MM-DD`; amounts arrive as numbers or numeric
//! strings; empty strings mean "no value".

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, de::Error as _};
use serde_json::Value;

pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(t) = DateTime::parse_from_rfc3339(s) {
    return Some(t.with_timezone(&Utc));
  }
  for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
    if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
      return Some(t.and_utc());
    }
  }
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|t| t.and_utc())
}

fn datetime_from(value: Value) -> Result<Option<DateTime<Utc>>, String> {
  match value {
    Value::Null => Ok(None),
    Value::String(s) if s.trim().is_empty() => Ok(None),
    Value::String(s) => parse_datetime(&s).map(Some).ok_or_else(|| format!("invalid date: {s:?}")),
    other => Err(format!("invalid date: {other}")),
  }
}

/// `Option<DateTime>` where null and `""` are `None`.
pub fn datetime<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
  datetime_from(Value::deserialize(d)?).map_err(D::Error::custom)
}

/// A clearable date in a patch: absent, explicitly cleared, or set.
pub fn nullable_datetime<'de, D: Deserializer<'de>>(
  d: D,
) -> Result<Option<Option<DateTime<Utc>>>, D::Error> {
  datetime_from(Value::deserialize(d)?).map(Some).map_err(D::Error::custom)
}

/// A clearable field in a patch. Use with `#[serde(default)]` so that an
/// absent key stays `None` while `null` becomes `Some(None)`.
pub fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(d).map(Some)
}

/// A number, or a string holding one.
pub fn amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
  match Value::deserialize(d)? {
    Value::Null => Ok(None),
    Value::Number(n) => Ok(n.as_f64()),
    Value::String(s) if s.trim().is_empty() => Ok(None),
    Value::String(s) => s.trim().parse().map(Some).map_err(|_| D::Error::custom(format!("invalid number: {s:?}"))),
    other => Err(D::Error::custom(format!("invalid number: {other}"))),
  }
}

/// Trimmed, with blank treated as absent.
pub fn non_blank(s: Option<String>) -> Option<String> {
  s.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}
