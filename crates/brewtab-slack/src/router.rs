//! Inbound HTTP: slash commands, interactivity and a health check.
//!
//! Slack wants an answer within three seconds, so every verified request is
//! acknowledged right away and the actual work runs in a spawned task.
//! Failures inside that task are reported back to the user ephemerally,
//! through the request's `response_url` when Slack sent one.

use std::{future::Future, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Local;
use serde_json::json;

use brewtab_core::{
    domain::{ChannelId, UserId},
    errors::Error,
    formatting::{plural, truncate},
    service::{BrewService, Event},
};

use crate::{
    payloads::{Command, Interaction, SlashCommand},
    signature::{SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER},
    HTTP_TIMEOUT,
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BrewService>,
    pub verifier: SignatureVerifier,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(service: Arc<BrewService>, verifier: SignatureVerifier) -> brewtab_core::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self {
            service,
            verifier,
            http,
        })
    }
}

/// Where an ephemeral reply goes.
struct ReplyTo<'a> {
    response_url: Option<&'a str>,
    channel: &'a ChannelId,
    user: &'a UserId,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/slack/commands", post(commands_handler))
        .route("/slack/interactions", post(interactions_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until `shutdown` resolves.
pub async fn serve<F>(state: AppState, port: u16, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port = listener.local_addr()?.port(), "http server listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn verify(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), StatusCode> {
    let (Some(ts), Some(sig)) = (
        header(headers, TIMESTAMP_HEADER),
        header(headers, SIGNATURE_HEADER),
    ) else {
        tracing::warn!("slack request without signature headers");
        return Err(StatusCode::UNAUTHORIZED);
    };
    state.verifier.verify(ts, body, sig).map_err(|e| {
        tracing::warn!(error = %e, "rejected slack request");
        StatusCode::UNAUTHORIZED
    })
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn commands_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(status) = verify(&state, &headers, &body) {
        return status.into_response();
    }
    let cmd = match SlashCommand::from_form(&body) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "malformed slash command");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    if let Command::Unknown(name) = &cmd.command {
        return format!("Unknown command /{name}.").into_response();
    }

    tracing::info!(user = %cmd.user, command = ?cmd.command, "slash command");
    tokio::spawn(async move {
        if let Err(e) = run_command(&state, &cmd).await {
            tracing::warn!(user = %cmd.user, error = %e, "slash command failed");
            notify(&state, &command_reply(&cmd), &failure_text(&e)).await;
        }
    });
    StatusCode::OK.into_response()
}

fn command_reply(cmd: &SlashCommand) -> ReplyTo<'_> {
    ReplyTo {
        response_url: cmd.response_url.as_deref(),
        channel: &cmd.channel,
        user: &cmd.user,
    }
}

async fn run_command(state: &AppState, cmd: &SlashCommand) -> anyhow::Result<()> {
    let svc = &state.service;
    let reply = command_reply(cmd);
    match cmd.command {
        Command::ShowPanel => {
            let outcome = svc.handle(&cmd.user, Event::ShowPanel).await?;
            if let Some(n) = outcome.notice {
                notify(state, &reply, &n).await;
            }
        }
        Command::MonthlyTally => {
            let text = svc.monthly_tally(Local::now()).await?;
            let max = svc.chat().capabilities().max_message_len;
            notify(state, &reply, &truncate(&text, max)).await;
        }
        Command::ClearDm => {
            let deleted = svc.clear_direct_messages(&cmd.user).await?;
            let text = format!(
                "Deleted {}.",
                plural(deleted as u32, "message", "messages")
            );
            notify(state, &reply, &text).await;
        }
        Command::Unknown(_) => {}
    }
    Ok(())
}

async fn interactions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(status) = verify(&state, &headers, &body) {
        return status.into_response();
    }
    let interaction = match Interaction::from_form(&body) {
        Ok(Some(i)) => i,
        Ok(None) => return StatusCode::OK.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "malformed interaction payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    tracing::info!(user = %interaction.user, event = ?interaction.event, "interaction");
    tokio::spawn(async move {
        run_interaction(&state, interaction).await;
    });
    StatusCode::OK.into_response()
}

async fn run_interaction(state: &AppState, i: Interaction) {
    let result = state.service.handle(&i.user, i.event.clone()).await;

    let (channel, text) = match result {
        Ok(outcome) => {
            let Some(notice) = outcome.notice else {
                return;
            };
            let channel = i
                .channel
                .unwrap_or_else(|| outcome.reconcile.message().channel.clone());
            (channel, notice)
        }
        Err(e) => {
            tracing::warn!(user = %i.user, event = ?i.event, error = %e, "interaction failed");
            let fallback = match i.channel {
                Some(c) => Some(c),
                None => state
                    .service
                    .state()
                    .message_ref(&i.user)
                    .await
                    .map(|r| r.message.channel),
            };
            let Some(channel) = fallback else {
                return;
            };
            (channel, failure_text(&e))
        }
    };
    let reply = ReplyTo {
        response_url: i.response_url.as_deref(),
        channel: &channel,
        user: &i.user,
    };
    notify(state, &reply, &text).await;
}

fn failure_text(e: &dyn std::fmt::Display) -> String {
    format!("Sorry, that didn't work: {e}")
}

/// `response_url` works in channels the bot has not joined; `chat.postEphemeral`
/// is used when Slack sent none or posting to it failed.
async fn notify(state: &AppState, to: &ReplyTo<'_>, text: &str) {
    if let Some(url) = to.response_url {
        match respond(state, url, text).await {
            Ok(()) => return,
            Err(e) => tracing::warn!(user = %to.user, error = %e, "response_url reply failed"),
        }
    }
    if let Err(e) = state
        .service
        .chat()
        .post_ephemeral(to.channel, to.user, text)
        .await
    {
        tracing::warn!(user = %to.user, error = %e, "ephemeral notice failed");
    }
}

async fn respond(state: &AppState, url: &str, text: &str) -> reqwest::Result<()> {
    state
        .http
        .post(url)
        .json(&json!({
            "response_type": "ephemeral",
            "replace_original": false,
            "text": text,
        }))
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}
