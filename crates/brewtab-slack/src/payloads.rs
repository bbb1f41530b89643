//! Inbound Slack request bodies: slash commands and `block_actions`.
//!
//! Both arrive `application/x-www-form-urlencoded`; interactions carry a
//! JSON document in the `payload` field.

use serde::Deserialize;

use brewtab_core::{
    domain::{ChannelId, ChoiceKind, MonthKey, UserId},
    errors::Error,
    service::Event,
    Result,
};

use crate::blocks::{
    ACTION_COFFEE, ACTION_PAY, ACTION_SETTLED, ACTION_TEA, ACTION_UNDO, SETTLEMENT_BLOCK_PREFIX,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `/coffee_tea`
    ShowPanel,
    /// `/monthly_tally`
    MonthlyTally,
    /// `/clear_dm`
    ClearDm,
    Unknown(String),
}

impl Command {
    pub fn parse(name: &str) -> Self {
        match name.trim().trim_start_matches('/') {
            "coffee_tea" => Self::ShowPanel,
            "monthly_tally" => Self::MonthlyTally,
            "clear_dm" => Self::ClearDm,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommand {
    pub command: Command,
    pub user: UserId,
    pub channel: ChannelId,
    /// Where replies go when the bot is not a member of `channel`.
    pub response_url: Option<String>,
}

fn form_pairs(body: &[u8]) -> impl Iterator<Item = (String, String)> + '_ {
    url::form_urlencoded::parse(body).map(|(k, v)| (k.into_owned(), v.into_owned()))
}

impl SlashCommand {
    pub fn from_form(body: &[u8]) -> Result<Self> {
        let mut command = None;
        let mut user = None;
        let mut channel = None;
        let mut response_url = None;
        for (k, v) in form_pairs(body) {
            match k.as_str() {
                "command" => command = Some(Command::parse(&v)),
                "user_id" => user = Some(UserId(v)),
                "channel_id" => channel = Some(ChannelId(v)),
                "response_url" if !v.is_empty() => response_url = Some(v),
                _ => {}
            }
        }

        Ok(Self {
            command: command.ok_or_else(|| missing("command"))?,
            user: user.ok_or_else(|| missing("user_id"))?,
            channel: channel.ok_or_else(|| missing("channel_id"))?,
            response_url,
        })
    }
}

fn missing(field: &str) -> Error {
    Error::External(format!("slack request missing {field}"))
}

#[derive(Debug, Deserialize)]
struct RawInteraction {
    #[serde(rename = "type")]
    kind: String,
    user: RawId,
    #[serde(default)]
    channel: Option<RawId>,
    #[serde(default)]
    container: Option<RawContainer>,
    #[serde(default)]
    actions: Vec<RawAction>,
    #[serde(default)]
    response_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawContainer {
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    action_id: String,
    #[serde(default)]
    block_id: Option<String>,
    #[serde(default)]
    selected_options: Vec<serde_json::Value>,
}

/// A parsed button or checkbox press.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interaction {
    pub user: UserId,
    pub channel: Option<ChannelId>,
    pub response_url: Option<String>,
    pub event: Event,
}

impl Interaction {
    /// Parse the form body of an interactivity request.
    ///
    /// `Ok(None)` for payloads we do not act on (other interaction types,
    /// unknown action ids).
    pub fn from_form(body: &[u8]) -> Result<Option<Self>> {
        let payload = form_pairs(body)
            .find(|(k, _)| k == "payload")
            .map(|(_, v)| v)
            .ok_or_else(|| missing("payload"))?;
        Self::from_json(&payload)
    }

    pub fn from_json(payload: &str) -> Result<Option<Self>> {
        let raw: RawInteraction = serde_json::from_str(payload)?;
        if raw.kind != "block_actions" {
            tracing::debug!(kind = %raw.kind, "ignoring interaction type");
            return Ok(None);
        }

        let Some(action) = raw.actions.first() else {
            return Ok(None);
        };
        let event = match action.action_id.as_str() {
            ACTION_COFFEE => Event::ChoiceMade(ChoiceKind::Coffee),
            ACTION_TEA => Event::ChoiceMade(ChoiceKind::Tea),
            ACTION_UNDO => Event::UndoRequested,
            ACTION_PAY => Event::PayAcknowledged,
            ACTION_SETTLED => Event::SettlementToggled {
                month: action
                    .block_id
                    .as_deref()
                    .and_then(|b| b.strip_prefix(SETTLEMENT_BLOCK_PREFIX))
                    .and_then(MonthKey::parse),
                settled: !action.selected_options.is_empty(),
            },
            other => {
                tracing::debug!(action_id = other, "ignoring unknown action");
                return Ok(None);
            }
        };

        let channel = raw
            .channel
            .map(|c| c.id)
            .or_else(|| raw.container.and_then(|c| c.channel_id))
            .map(ChannelId);

        Ok(Some(Self {
            user: UserId(raw.user.id),
            channel,
            response_url: raw.response_url,
            event,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(payload: &serde_json::Value) -> Vec<u8> {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("payload", &payload.to_string())
            .finish()
            .into_bytes()
    }

    #[test]
    fn slash_command_fields() {
        let body = b"token=x&team_id=T1&channel_id=D123&user_id=U42&command=%2Fcoffee_tea&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1%2F2%2Fabc";
        let cmd = SlashCommand::from_form(body).unwrap();
        assert_eq!(cmd.command, Command::ShowPanel);
        assert_eq!(
            cmd.response_url.as_deref(),
            Some("https://hooks.slack.com/commands/T1/2/abc")
        );
        assert_eq!(cmd.user, UserId::new("U42"));
        assert_eq!(cmd.channel, ChannelId("D123".into()));
    }

    #[test]
    fn command_names() {
        assert_eq!(Command::parse("/monthly_tally"), Command::MonthlyTally);
        assert_eq!(Command::parse("/clear_dm"), Command::ClearDm);
        assert_eq!(Command::parse("/nope"), Command::Unknown("nope".into()));
    }

    #[test]
    fn slash_command_without_user_is_rejected() {
        assert!(SlashCommand::from_form(b"command=%2Fcoffee_tea&channel_id=C1").is_err());
    }

    #[test]
    fn button_presses_map_to_events() {
        for (id, expected) in [
            (ACTION_COFFEE, Event::ChoiceMade(ChoiceKind::Coffee)),
            (ACTION_TEA, Event::ChoiceMade(ChoiceKind::Tea)),
            (ACTION_UNDO, Event::UndoRequested),
            (ACTION_PAY, Event::PayAcknowledged),
        ] {
            let body = form(&json!({
                "type": "block_actions",
                "user": { "id": "U1", "username": "ada" },
                "channel": { "id": "D1" },
                "actions": [{ "action_id": id, "type": "button" }]
            }));
            let got = Interaction::from_form(&body).unwrap().unwrap();
            assert_eq!(got.event, expected);
            assert_eq!(got.user, UserId::new("U1"));
            assert_eq!(got.channel, Some(ChannelId("D1".into())));
        }
    }

    #[test]
    fn checkbox_state_follows_selected_options() {
        let checked = json!({
            "type": "block_actions",
            "user": { "id": "U1" },
            "container": { "channel_id": "D9" },
            "actions": [{
                "action_id": ACTION_SETTLED,
                "block_id": "settlement:2024-05",
                "type": "checkboxes",
                "selected_options": [{ "value": "settled" }]
            }]
        });
        let got = Interaction::from_json(&checked.to_string()).unwrap().unwrap();
        assert_eq!(
            got.event,
            Event::SettlementToggled {
                month: Some(MonthKey::new(2024, 5)),
                settled: true
            }
        );
        assert_eq!(got.channel, Some(ChannelId("D9".into())));

        let unchecked = json!({
            "type": "block_actions",
            "user": { "id": "U1" },
            "actions": [{ "action_id": ACTION_SETTLED, "selected_options": [] }]
        });
        let got = Interaction::from_json(&unchecked.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(
            got.event,
            Event::SettlementToggled {
                month: None,
                settled: false
            }
        );
    }

    #[test]
    fn other_payloads_are_ignored() {
        let shortcut = json!({ "type": "shortcut", "user": { "id": "U1" } });
        assert!(Interaction::from_json(&shortcut.to_string())
            .unwrap()
            .is_none());

        let unknown = json!({
            "type": "block_actions",
            "user": { "id": "U1" },
            "actions": [{ "action_id": "something_else" }]
        });
        assert!(Interaction::from_json(&unknown.to_string())
            .unwrap()
            .is_none());
    }

    #[test]
    fn missing_payload_field_is_an_error() {
        assert!(Interaction::from_form(b"foo=bar").is_err());
    }
}
