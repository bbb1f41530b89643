//! Monthly aggregation over ledger rows.
//!
//! Malformed rows never abort aggregation: rows whose date does not parse are
//! skipped, unparseable prices already read as 0.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Local};

use crate::{
    domain::{ChoiceKind, UserId},
    ledger::types::LedgerRow,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MonthlySummary {
    pub coffee: u32,
    pub tea: u32,
    pub amount: f64,
}

impl MonthlySummary {
    fn add(&mut self, row: &LedgerRow) {
        match row.choice {
            ChoiceKind::Coffee => self.coffee += 1,
            ChoiceKind::Tea => self.tea += 1,
            ChoiceKind::Other(_) => {}
        }
        self.amount += row.price;
    }

    pub fn drinks(&self) -> u32 {
        self.coffee + self.tea
    }

    /// Amount rounded to 2 decimals for display.
    pub fn amount_display(&self) -> String {
        format!("{:.2}", self.amount)
    }
}

/// One user's line in the global summary.
#[derive(Clone, Debug, PartialEq)]
pub struct UserTally {
    pub user_id: UserId,
    /// Display name from the most recent matching row.
    pub user_name: String,
    pub summary: MonthlySummary,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GlobalSummary {
    pub users: BTreeMap<UserId, UserTally>,
    pub totals: MonthlySummary,
}

fn same_month(date: &DateTime<Local>, reference: &DateTime<Local>) -> bool {
    date.year() == reference.year() && date.month() == reference.month()
}

fn in_month<'a>(
    rows: &'a [LedgerRow],
    reference: &'a DateTime<Local>,
) -> impl Iterator<Item = &'a LedgerRow> + 'a {
    rows.iter().filter(move |row| {
        row.parsed_date()
            .map(|d| same_month(&d, reference))
            .unwrap_or(false)
    })
}

/// Counts and amount for `user` in the calendar month of `reference`.
pub fn monthly_summary_for(
    rows: &[LedgerRow],
    user: &UserId,
    reference: &DateTime<Local>,
) -> MonthlySummary {
    let mut out = MonthlySummary::default();
    for row in in_month(rows, reference).filter(|r| &r.user_id == user) {
        out.add(row);
    }
    out
}

/// Per-user summaries for every user seen in the calendar month of `reference`.
pub fn global_monthly_summary(rows: &[LedgerRow], reference: &DateTime<Local>) -> GlobalSummary {
    let mut out = GlobalSummary::default();
    for row in in_month(rows, reference) {
        let tally = out
            .users
            .entry(row.user_id.clone())
            .or_insert_with(|| UserTally {
                user_id: row.user_id.clone(),
                user_name: String::new(),
                summary: MonthlySummary::default(),
            });
        if !row.user_name.is_empty() {
            tally.user_name = row.user_name.clone();
        }
        tally.summary.add(row);
        out.totals.add(row);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn row(user: &str, when: DateTime<Local>, kind: ChoiceKind, price: f64) -> LedgerRow {
        LedgerRow::new(UserId::new(user), format!("name-{user}"), when, kind, price)
    }

    #[test]
    fn monthly_summary_filters_month_and_user() {
        let rows = vec![
            row("U1", at(2024, 5, 2), ChoiceKind::Coffee, 2.0),
            row("U1", at(2024, 5, 20), ChoiceKind::Tea, 1.5),
            row("U1", at(2024, 4, 30), ChoiceKind::Coffee, 2.0),
            row("U1", at(2023, 5, 15), ChoiceKind::Coffee, 2.0),
            row("U2", at(2024, 5, 3), ChoiceKind::Coffee, 2.0),
        ];

        let s = monthly_summary_for(&rows, &UserId::new("U1"), &at(2024, 5, 31));
        assert_eq!(s.coffee, 1);
        assert_eq!(s.tea, 1);
        assert_eq!(s.amount_display(), "3.50");
    }

    #[test]
    fn monthly_summary_skips_unparseable_dates() {
        let mut broken = row("U1", at(2024, 5, 2), ChoiceKind::Coffee, 2.0);
        broken.date = "not a date".to_string();
        let rows = vec![broken, row("U1", at(2024, 5, 2), ChoiceKind::Tea, 1.5)];

        let s = monthly_summary_for(&rows, &UserId::new("U1"), &at(2024, 5, 10));
        assert_eq!(s, MonthlySummary { coffee: 0, tea: 1, amount: 1.5 });
    }

    #[test]
    fn other_kinds_count_toward_amount_only() {
        let rows = vec![row("U1", at(2024, 5, 2), ChoiceKind::Other("cocoa".into()), 3.0)];
        let s = monthly_summary_for(&rows, &UserId::new("U1"), &at(2024, 5, 2));
        assert_eq!(s.drinks(), 0);
        assert_eq!(s.amount, 3.0);
    }

    #[test]
    fn global_summary_groups_by_user() {
        let rows = vec![
            row("U1", at(2024, 5, 2), ChoiceKind::Coffee, 2.0),
            row("U2", at(2024, 5, 3), ChoiceKind::Tea, 1.5),
            row("U2", at(2024, 5, 4), ChoiceKind::Tea, 1.5),
            row("U3", at(2024, 6, 1), ChoiceKind::Coffee, 2.0),
        ];

        let g = global_monthly_summary(&rows, &at(2024, 5, 15));
        assert_eq!(g.users.len(), 2);
        assert_eq!(g.users[&UserId::new("U2")].summary.tea, 2);
        assert_eq!(g.users[&UserId::new("U2")].user_name, "name-U2");
        assert!(!g.users.contains_key(&UserId::new("U3")));
        assert_eq!(g.totals.drinks(), 3);
        assert_eq!(g.totals.amount_display(), "5.00");
    }
}
