//! Calendar arithmetic for the dashboard: reporting windows, quarters and
//! period-over-period comparison.
//!
//! All windows are UTC and half-open (`start <= t < end`).

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

use crate::{Error, Result};

pub const MONTH_ABBREVIATIONS: [&str; 12] = [
  "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov",
  "Dec",
];

const MIN_YEAR: i32 = 1970;
const MAX_YEAR: i32 = 9999;

// ─── Window ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl Window {
  pub fn contains(&self, t: DateTime<Utc>) -> bool { self.start <= t && t < self.end }

  /// The calendar month `month0` (0-based) of `year`.
  pub fn month(year: i32, month0: u32) -> Result<Self> {
    Self::months(year, month0, 1)
  }

  /// `count` consecutive calendar months starting at `month0` of `year`.
  fn months(year: i32, month0: u32, count: u32) -> Result<Self> {
    check_year(year)?;
    Self::span(year, month0, count)
  }

  /// Like [`Window::months`] without the year range check, for windows
  /// derived from an already validated one.
  fn span(year: i32, month0: u32, count: u32) -> Result<Self> {
    if month0 > 11 {
      return Err(Error::InvalidMonth(i64::from(month0)));
    }
    let end_index = month0 + count;
    let start = first_of_month(year, month0)?;
    let end = first_of_month(year + (end_index / 12) as i32, end_index % 12)?;
    Ok(Self { start, end })
  }
}

fn check_year(year: i32) -> Result<()> {
  if (MIN_YEAR..=MAX_YEAR).contains(&year) { Ok(()) } else { Err(Error::InvalidYear(year)) }
}

fn first_of_month(year: i32, month0: u32) -> Result<DateTime<Utc>> {
  Utc
    .with_ymd_and_hms(year, month0 + 1, 1, 0, 0, 0)
    .single()
    .ok_or(Error::InvalidYear(year))
}

/// The twelve month windows of `year`, January first.
pub fn months_of_year(year: i32) -> Result<Vec<Window>> {
  (0..12).map(|m| Window::month(year, m)).collect()
}

/// Midnight UTC at the start of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
  Utc
    .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
    .single()
    .unwrap_or(now)
}

// ─── Period ──────────────────────────────────────────────────────────────────

/// The reporting period selected by the `range`, `month` and `year` query
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
  AllTime,
  Month { year: i32, month0: u32 },
}

impl Period {
  /// Interpret the dashboard query parameters. `range=all` disables date
  /// filtering; anything else selects a calendar month, with missing month
  /// or year falling back to `today`'s.
  pub fn from_query(
    range: Option<&str>,
    month: Option<i64>,
    year: Option<i32>,
    today: DateTime<Utc>,
  ) -> Result<Self> {
    if range.is_some_and(|r| r.eq_ignore_ascii_case("all")) {
      return Ok(Self::AllTime);
    }
    Self::month_of(month, year, today)
  }

  /// Like [`Period::from_query`] but never all-time.
  pub fn month_of(month: Option<i64>, year: Option<i32>, today: DateTime<Utc>) -> Result<Self> {
    let month0 = match month {
      Some(m) if (0..=11).contains(&m) => m as u32,
      Some(m) => return Err(Error::InvalidMonth(m)),
      None => today.month0(),
    };
    let year = year.unwrap_or(today.year());
    check_year(year)?;
    Ok(Self::Month { year, month0 })
  }

  pub fn is_all_time(&self) -> bool { matches!(self, Self::AllTime) }

  /// The window statistics are computed over; `None` means unbounded.
  pub fn current(&self) -> Result<Option<Window>> {
    match *self {
      Self::AllTime => Ok(None),
      Self::Month { year, month0 } => Window::month(year, month0).map(Some),
    }
  }

  /// The window compared against: the preceding calendar month.
  pub fn previous(&self) -> Result<Option<Window>> {
    match *self {
      Self::AllTime => Ok(None),
      Self::Month { year, month0: 0 } => Window::span(year - 1, 11, 1).map(Some),
      Self::Month { year, month0 } => Window::span(year, month0 - 1, 1).map(Some),
    }
  }
}

// ─── Quarter ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quarter {
  /// 1 to 4.
  pub number: u32,
  pub year:   i32,
  /// e.g. `"Apr - Jun"`.
  pub label:  String,
  pub window: Window,
}

impl Quarter {
  /// The quarter containing month `month0` of `year`.
  pub fn containing(year: i32, month0: u32) -> Result<Self> {
    if month0 > 11 {
      return Err(Error::InvalidMonth(i64::from(month0)));
    }
    let first = (month0 / 3) * 3;
    Ok(Self {
      number: first / 3 + 1,
      year,
      label: format!(
        "{} - {}",
        MONTH_ABBREVIATIONS[first as usize],
        MONTH_ABBREVIATIONS[first as usize + 2]
      ),
      window: Window::months(year, first, 3)?,
    })
  }
}

// ─── Comparison ──────────────────────────────────────────────────────────────

/// Round half toward positive infinity, so `-2.5` becomes `-2`.
pub fn js_round(x: f64) -> f64 { (x + 0.5).floor() }

/// Whole-percent change from `previous` to `current`.
///
/// All-time views have nothing to compare against and always report 0. A
/// zero baseline reports 100 when anything happened, 0 otherwise.
pub fn percent_change(current: f64, previous: f64, all_time: bool) -> i64 {
  if all_time {
    return 0;
  }
  if previous == 0.0 {
    return if current > 0.0 { 100 } else { 0 };
  }
  js_round((current - previous) / previous * 100.0) as i64
}

/// `round(part / whole)`, or 0 for an empty whole.
pub fn ratio_rounded(part: f64, whole: f64) -> i64 {
  if whole == 0.0 { 0 } else { js_round(part / whole) as i64 }
}

/// One dashboard tile: a value with its change against the previous period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric<T = i64> {
  pub value:       T,
  pub change:      i64,
  pub is_positive: bool,
}

impl Metric<i64> {
  pub fn compare(current: i64, previous: i64, all_time: bool) -> Self {
    Self::with_change(current, percent_change(current as f64, previous as f64, all_time))
  }
}

impl Metric<f64> {
  pub fn compare_amounts(current: f64, previous: f64, all_time: bool) -> Self {
    Self::with_change(current, percent_change(current, previous, all_time))
  }
}

impl<T> Metric<T> {
  fn with_change(value: T, change: i64) -> Self {
    Self { value, change, is_positive: change >= 0 }
  }

  /// For metrics where growth is bad news.
  pub fn never_positive(mut self) -> Self {
    self.is_positive = false;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
  }

  #[test]
  fn percent_change_edges() {
    assert_eq!(percent_change(0.0, 0.0, false), 0);
    assert_eq!(percent_change(3.0, 0.0, false), 100);
    assert_eq!(percent_change(15.0, 10.0, false), 50);
    assert_eq!(percent_change(5.0, 10.0, false), -50);
    assert_eq!(percent_change(15.0, 10.0, true), 0);
  }

  #[test]
  fn rounding_is_half_up() {
    assert_eq!(js_round(2.5), 3.0);
    assert_eq!(js_round(-2.5), -2.0);
    assert_eq!(js_round(-2.6), -3.0);
    // 8 -> 5 is -37.5%, which rounds to -37.
    assert_eq!(percent_change(5.0, 8.0, false), -37);
  }

  #[test]
  fn january_compares_with_previous_december() {
    let p = Period::from_query(None, Some(0), Some(2025), Utc::now()).unwrap();
    let prev = p.previous().unwrap().unwrap();
    assert_eq!(prev.start, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
    assert_eq!(prev.end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
  }

  #[test]
  fn earliest_month_still_has_a_previous_window() {
    let p = Period::from_query(None, Some(0), Some(1970), Utc::now()).unwrap();
    let prev = p.previous().unwrap().unwrap();
    assert_eq!(prev.start, Utc.with_ymd_and_hms(1969, 12, 1, 0, 0, 0).unwrap());
    assert_eq!(prev.end, Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
    assert!(p.current().unwrap().is_some());
  }

  #[test]
  fn december_window_ends_next_year() {
    let w = Window::month(2025, 11).unwrap();
    assert!(w.contains(at(2025, 12, 31)));
    assert!(!w.contains(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
  }

  #[test]
  fn all_range_is_unbounded() {
    let p = Period::from_query(Some("all"), Some(40), None, Utc::now()).unwrap();
    assert!(p.is_all_time());
    assert_eq!(p.current().unwrap(), None);
    assert_eq!(p.previous().unwrap(), None);
  }

  #[test]
  fn out_of_range_month_is_rejected() {
    assert!(matches!(
      Period::from_query(Some("month"), Some(12), Some(2025), Utc::now()),
      Err(Error::InvalidMonth(12))
    ));
    assert!(matches!(
      Period::from_query(None, Some(-1), Some(2025), Utc::now()),
      Err(Error::InvalidMonth(-1))
    ));
  }

  #[test]
  fn missing_month_defaults_to_today() {
    let p = Period::from_query(None, None, None, at(2024, 5, 17)).unwrap();
    assert_eq!(p, Period::Month { year: 2024, month0: 4 });
  }

  #[test]
  fn quarter_label_and_window() {
    let q = Quarter::containing(2025, 10).unwrap();
    assert_eq!(q.number, 4);
    assert_eq!(q.label, "Oct - Dec");
    assert_eq!(q.window.start, Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap());
    assert_eq!(q.window.end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
  }

  #[test]
  fn metric_for_losses_is_never_positive() {
    let m = Metric::compare(2, 4, false).never_positive();
    assert_eq!(m.change, -50);
    assert!(!m.is_positive);
  }
}
