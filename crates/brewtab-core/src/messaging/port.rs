use async_trait::async_trait;

use crate::{
    domain::{ChannelId, MessageRef, UserId},
    messaging::types::{
        BotIdentity, ControlMessage, DirectoryUser, HistoryMessage, MessagingCapabilities,
    },
    Result,
};

/// Chat platform port.
///
/// Slack is the implementation today; the shape only assumes direct channels,
/// editable messages and a user directory.
#[async_trait]
pub trait ChatPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// The bot's own identity, used for message-ownership checks.
    async fn bot_identity(&self) -> Result<BotIdentity>;

    /// Open (or reuse) the direct channel with `user`.
    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId>;

    async fn post_message(&self, channel: &ChannelId, msg: &ControlMessage) -> Result<MessageRef>;
    async fn update_message(&self, target: &MessageRef, msg: &ControlMessage) -> Result<()>;
    async fn delete_message(&self, target: &MessageRef) -> Result<()>;

    /// Visible only to `user` in `channel`.
    async fn post_ephemeral(&self, channel: &ChannelId, user: &UserId, text: &str) -> Result<()>;

    async fn channel_history(&self, channel: &ChannelId) -> Result<Vec<HistoryMessage>>;

    /// Whole directory, bots and deactivated accounts included.
    async fn list_users(&self) -> Result<Vec<DirectoryUser>>;

    async fn user_display_name(&self, user: &UserId) -> Result<String>;
}
