//! Formatting utilities for Slack `mrkdwn` text.

/// Escape the three characters Slack treats as control sequences in `mrkdwn`.
pub fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `<@U123>` user mention.
pub fn mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

/// `1 coffee`, `2 coffees`.
pub fn plural(n: u32, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

/// Truncate to at most `max` chars, appending `...` when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    format!("{}...", text.chars().take(max).collect::<String>())
}
