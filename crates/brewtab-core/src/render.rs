//! Pure rendering of control messages and tallies.
//!
//! No I/O here: callers pass in freshly computed summaries every time.

use crate::{
    config::Pricing,
    domain::MonthKey,
    formatting::{escape_mrkdwn, mention, plural},
    messaging::types::{ControlAction, ControlButton, ControlMessage},
    summary::{GlobalSummary, MonthlySummary},
};

/// Build the control message for one user.
pub fn render_control_message(
    month: MonthKey,
    summary: &MonthlySummary,
    settled: bool,
    pricing: &Pricing,
    pay_link: Option<&str>,
) -> ControlMessage {
    let label = month.label();

    let summary_text = format!(
        "*{label}*\n☕ {} · 🍵 {}",
        plural(summary.coffee, "coffee", "coffees"),
        plural(summary.tea, "tea", "teas"),
    );

    let amount_text = if settled {
        format!("*Amount due:* ~{}~ (settled)", summary.amount_display())
    } else {
        format!("*Amount due:* {}", summary.amount_display())
    };

    let fallback_text = format!(
        "{label}: {} coffee, {} tea, {} due",
        summary.coffee,
        summary.tea,
        summary.amount_display()
    );

    let buttons = vec![
        ControlButton {
            action: ControlAction::Coffee,
            label: format!("☕ Coffee ({})", format_price(pricing.coffee)),
            url: None,
        },
        ControlButton {
            action: ControlAction::Tea,
            label: format!("🍵 Tea ({})", format_price(pricing.tea)),
            url: None,
        },
        ControlButton {
            action: ControlAction::Undo,
            label: "↩️ Undo last".to_string(),
            url: None,
        },
        ControlButton {
            action: ControlAction::Pay,
            label: "💳 Pay".to_string(),
            url: pay_link.map(str::to_string),
        },
    ];

    ControlMessage {
        month,
        fallback_text,
        summary_text,
        amount_text,
        settlement_label: "I've paid this month".to_string(),
        settled,
        buttons,
    }
}

/// Aggregate tally for everyone, as `mrkdwn`.
pub fn render_global_tally(month: MonthKey, global: &GlobalSummary) -> String {
    let mut lines = vec![format!("*Tally for {}*", month.label())];

    if global.users.is_empty() {
        lines.push("No drinks recorded yet.".to_string());
        return lines.join("\n");
    }

    for tally in global.users.values() {
        let s = &tally.summary;
        let who = if tally.user_name.is_empty() {
            mention(tally.user_id.as_str())
        } else {
            escape_mrkdwn(&tally.user_name)
        };
        lines.push(format!(
            "• {who}: {} coffee, {} tea, {}",
            s.coffee,
            s.tea,
            s.amount_display()
        ));
    }

    let t = &global.totals;
    lines.push(format!(
        "*Total:* {} coffee, {} tea, {}",
        t.coffee,
        t.tea,
        t.amount_display()
    ));
    lines.join("\n")
}

fn format_price(price: f64) -> String {
    format!("{price:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::UserId,
        summary::{MonthlySummary, UserTally},
    };

    fn summary() -> MonthlySummary {
        MonthlySummary {
            coffee: 1,
            tea: 1,
            amount: 3.5,
        }
    }

    #[test]
    fn control_message_has_four_buttons_in_order() {
        let msg = render_control_message(
            MonthKey::new(2024, 5),
            &summary(),
            false,
            &Pricing::default(),
            Some("https://pay.example/x"),
        );
        let actions: Vec<_> = msg.buttons.iter().map(|b| b.action).collect();
        assert_eq!(
            actions,
            vec![
                ControlAction::Coffee,
                ControlAction::Tea,
                ControlAction::Undo,
                ControlAction::Pay
            ]
        );
        assert_eq!(msg.buttons[3].url.as_deref(), Some("https://pay.example/x"));
        assert!(msg.summary_text.contains("May 2024"));
        assert!(msg.summary_text.contains("1 coffee"));
        assert!(msg.amount_text.contains("3.50"));
        assert!(!msg.settled);
    }

    #[test]
    fn settled_rendering_strikes_amount() {
        let msg = render_control_message(
            MonthKey::new(2024, 5),
            &summary(),
            true,
            &Pricing::default(),
            None,
        );
        assert!(msg.settled);
        assert!(msg.amount_text.contains("~3.50~"));
        assert!(msg.buttons[3].url.is_none());
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render_control_message(
            MonthKey::new(2024, 5),
            &summary(),
            false,
            &Pricing::default(),
            None,
        );
        let b = render_control_message(
            MonthKey::new(2024, 5),
            &summary(),
            false,
            &Pricing::default(),
            None,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn global_tally_lists_users_and_total() {
        let mut g = GlobalSummary::default();
        g.users.insert(
            UserId::new("U1"),
            UserTally {
                user_id: UserId::new("U1"),
                user_name: "Ada <admin>".into(),
                summary: summary(),
            },
        );
        g.users.insert(
            UserId::new("U2"),
            UserTally {
                user_id: UserId::new("U2"),
                user_name: String::new(),
                summary: MonthlySummary {
                    coffee: 2,
                    tea: 0,
                    amount: 4.0,
                },
            },
        );
        g.totals = MonthlySummary {
            coffee: 3,
            tea: 1,
            amount: 7.5,
        };

        let text = render_global_tally(MonthKey::new(2024, 5), &g);
        assert!(text.contains("Ada &lt;admin&gt;: 1 coffee, 1 tea, 3.50"));
        assert!(text.contains("<@U2>: 2 coffee, 0 tea, 4.00"));
        assert!(text.ends_with("*Total:* 3 coffee, 1 tea, 7.50"));
    }

    #[test]
    fn global_tally_empty_month() {
        let text = render_global_tally(MonthKey::new(2024, 5), &GlobalSummary::default());
        assert!(text.contains("No drinks recorded yet."));
    }
}
