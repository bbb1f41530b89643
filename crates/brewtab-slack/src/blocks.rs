//! Block Kit layout for the control message.

use serde_json::{json, Value};

use brewtab_core::messaging::types::{ControlAction, ControlMessage};

pub const ACTION_COFFEE: &str = "choose_coffee";
pub const ACTION_TEA: &str = "choose_tea";
pub const ACTION_UNDO: &str = "undo_last";
pub const ACTION_PAY: &str = "pay_link";
pub const ACTION_SETTLED: &str = "settled_toggle";

const SETTLED_VALUE: &str = "settled";
/// Block id prefix of the amount section; the panel's month follows it.
pub const SETTLEMENT_BLOCK_PREFIX: &str = "settlement:";

pub fn action_id(action: ControlAction) -> &'static str {
    match action {
        ControlAction::Coffee => ACTION_COFFEE,
        ControlAction::Tea => ACTION_TEA,
        ControlAction::Undo => ACTION_UNDO,
        ControlAction::Pay => ACTION_PAY,
    }
}

fn mrkdwn(text: &str) -> Value {
    json!({ "type": "mrkdwn", "text": text })
}

fn plain(text: &str) -> Value {
    json!({ "type": "plain_text", "text": text, "emoji": true })
}

pub fn control_blocks(msg: &ControlMessage) -> Value {
    let settled_option = json!({
        "text": plain(&msg.settlement_label),
        "value": SETTLED_VALUE,
    });
    let mut checkbox = json!({
        "type": "checkboxes",
        "action_id": ACTION_SETTLED,
        "options": [settled_option.clone()],
    });
    if msg.settled {
        checkbox["initial_options"] = json!([settled_option]);
    }

    let buttons: Vec<Value> = msg
        .buttons
        .iter()
        .map(|b| {
            let mut btn = json!({
                "type": "button",
                "action_id": action_id(b.action),
                "text": plain(&b.label),
            });
            if let Some(url) = &b.url {
                btn["url"] = json!(url);
            }
            if b.action == ControlAction::Undo {
                btn["style"] = json!("danger");
            }
            btn
        })
        .collect();

    json!([
        { "type": "section", "text": mrkdwn(&msg.summary_text) },
        {
            "type": "section",
            "block_id": format!("{SETTLEMENT_BLOCK_PREFIX}{}", msg.month),
            "text": mrkdwn(&msg.amount_text),
            "accessory": checkbox,
        },
        { "type": "actions", "block_id": "controls", "elements": buttons },
    ])
}
