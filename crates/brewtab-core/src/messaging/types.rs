use crate::domain::{MonthKey, UserId};

/// Actions offered on the control message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlAction {
    Coffee,
    Tea,
    Undo,
    Pay,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControlButton {
    pub action: ControlAction,
    pub label: String,
    /// Link buttons open a URL instead of (only) calling back.
    pub url: Option<String>,
}

/// Platform-agnostic rendering of a user's control message.
///
/// Adapters turn this into their native layout (Slack blocks).
#[derive(Clone, Debug, PartialEq)]
pub struct ControlMessage {
    pub month: MonthKey,
    /// Notification/fallback text.
    pub fallback_text: String,
    /// Counts for the month.
    pub summary_text: String,
    /// Amount due; shown next to the settlement checkbox.
    pub amount_text: String,
    pub settlement_label: String,
    pub settled: bool,
    pub buttons: Vec<ControlButton>,
}

/// A user from the platform directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryUser {
    pub id: UserId,
    pub name: String,
    pub is_bot: bool,
    pub deleted: bool,
}

impl DirectoryUser {
    /// Real, active people.
    pub fn is_person(&self) -> bool {
        !self.is_bot && !self.deleted
    }
}

/// A message in a channel's history, with enough authorship info to tell ours apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryMessage {
    pub ts: String,
    pub user: Option<UserId>,
    pub bot_id: Option<String>,
}

/// Who the bot is on the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: UserId,
    pub bot_id: Option<String>,
}

impl BotIdentity {
    pub fn authored(&self, msg: &HistoryMessage) -> bool {
        if msg.user.as_ref() == Some(&self.user_id) {
            return true;
        }
        match (&self.bot_id, &msg.bot_id) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => false,
        }
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
}
