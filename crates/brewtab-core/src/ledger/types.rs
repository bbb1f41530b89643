use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};

use crate::domain::{ChoiceKind, UserId};

/// Column titles, in order (`A:E`).
pub const HEADER: [&str; 5] = ["UserID", "UserName", "Date", "Choice", "Price"];

/// One recorded choice.
///
/// `date` keeps the raw cell text so manually edited rows survive a round trip;
/// use [`LedgerRow::parsed_date`] to interpret it.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerRow {
    pub user_id: UserId,
    pub user_name: String,
    pub date: String,
    pub choice: ChoiceKind,
    pub price: f64,
}

impl LedgerRow {
    pub fn new(
        user_id: UserId,
        user_name: impl Into<String>,
        at: DateTime<Local>,
        choice: ChoiceKind,
        price: f64,
    ) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            date: at.to_rfc3339(),
            choice,
            price,
        }
    }

    /// Cell values in column order.
    pub fn to_values(&self) -> Vec<String> {
        vec![
            self.user_id.0.clone(),
            self.user_name.clone(),
            self.date.clone(),
            self.choice.as_str().to_string(),
            format_price(self.price),
        ]
    }

    /// Build a row from sheet cells. Rows without a user id are not rows.
    ///
    /// An unparseable price reads as 0.
    pub fn from_values(values: &[String]) -> Option<Self> {
        let cell = |i: usize| values.get(i).map(|s| s.trim()).unwrap_or("");

        let user_id = cell(0);
        if user_id.is_empty() {
            return None;
        }

        Some(Self {
            user_id: UserId::new(user_id),
            user_name: cell(1).to_string(),
            date: cell(2).to_string(),
            choice: ChoiceKind::parse(cell(3)),
            price: parse_price(cell(4)),
        })
    }

    /// Interpret the date cell in local time.
    ///
    /// Accepts RFC 3339 plus `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD`.
    pub fn parsed_date(&self) -> Option<DateTime<Local>> {
        parse_ledger_date(&self.date)
    }
}

/// A data row together with its position in the store.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerEntry {
    pub index: usize,
    pub row: LedgerRow,
}

pub fn parse_ledger_date(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Local.from_local_datetime(&naive).earliest();
        }
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Local
        .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .earliest()
}

pub fn parse_price(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

fn format_price(price: f64) -> String {
    // `2.0` is written as `2`, `1.5` stays `1.5`.
    format!("{price}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn cells(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn row_values_follow_column_order() {
        let at = Local.with_ymd_and_hms(2024, 5, 10, 9, 30, 0).unwrap();
        let row = LedgerRow::new(UserId::new("U1"), "Ada", at, ChoiceKind::Tea, 1.5);
        let values = row.to_values();
        assert_eq!(values[0], "U1");
        assert_eq!(values[1], "Ada");
        assert_eq!(values[3], "tea");
        assert_eq!(values[4], "1.5");
        assert_eq!(row.parsed_date(), Some(at));
    }

    #[test]
    fn from_values_tolerates_short_and_malformed_rows() {
        assert!(LedgerRow::from_values(&cells(&[])).is_none());
        assert!(LedgerRow::from_values(&cells(&["", "x"])).is_none());

        let row = LedgerRow::from_values(&cells(&["U1", "Ada", "nope", "coffee"])).unwrap();
        assert_eq!(row.choice, ChoiceKind::Coffee);
        assert_eq!(row.price, 0.0);
        assert!(row.parsed_date().is_none());

        let row = LedgerRow::from_values(&cells(&["U1", "Ada", "", "coffee", "abc"])).unwrap();
        assert_eq!(row.price, 0.0);
    }

    #[test]
    fn date_parsing_accepts_manual_formats() {
        let dt = parse_ledger_date("2024-05-10 08:15:00").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day(), dt.hour()), (2024, 5, 10, 8));

        let dt = parse_ledger_date("2024-05-10").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 5, 10));

        assert!(parse_ledger_date("10/05/2024").is_none());
        assert!(parse_ledger_date("Date").is_none());
    }
}
