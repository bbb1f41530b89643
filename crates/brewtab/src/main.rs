use std::sync::Arc;

use brewtab_core::{
    config::Config,
    ledger::Ledger,
    messaging::{
        port::ChatPort,
        throttled::{ThrottleConfig, ThrottledChat},
    },
    scheduler::MonthlyBroadcaster,
    service::BrewService,
    state::StateStore,
};
use brewtab_sheets::{auth::TokenSource, SheetsLedgerStore};
use brewtab_slack::{
    router::{self, AppState},
    signature::SignatureVerifier,
    SlackMessenger,
};

#[tokio::main]
async fn main() -> Result<(), brewtab_core::Error> {
    brewtab_core::logging::init("brewtab")?;

    let cfg = Arc::new(Config::load()?);
    for key in cfg.missing_required() {
        tracing::warn!(key, "required setting missing; related features will fail");
    }

    // Missing Google credentials are not fatal; ledger calls fail until configured.
    let sheets = match SheetsLedgerStore::from_config(&cfg) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "sheets credentials unusable");
            SheetsLedgerStore::new(
                cfg.spreadsheet_id.clone(),
                cfg.sheet_title.clone(),
                TokenSource::fixed(String::new()),
            )?
        }
    };
    let ledger = Ledger::new(Arc::new(sheets));

    let slack: Arc<dyn ChatPort> = Arc::new(SlackMessenger::new(cfg.slack_bot_token.clone())?);
    let chat: Arc<dyn ChatPort> = Arc::new(ThrottledChat::new(slack, ThrottleConfig::default()));

    let service = Arc::new(BrewService::new(
        cfg.clone(),
        ledger,
        chat,
        Arc::new(StateStore::new()),
    ));

    match service.bot_identity().await {
        Ok(me) => tracing::info!(user_id = %me.user_id, "slack identity resolved"),
        Err(e) => tracing::warn!(error = %e, "could not resolve slack identity"),
    }

    let broadcaster = MonthlyBroadcaster::new(service.clone(), cfg.broadcast_hour);
    if cfg.broadcast_enabled {
        broadcaster.start().await;
    } else {
        tracing::info!("monthly broadcast disabled");
    }

    let state = AppState::new(
        service,
        SignatureVerifier::new(cfg.slack_signing_secret.clone()),
    )?;
    let served = router::serve(state, cfg.port, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    })
    .await;

    broadcaster.stop().await;
    served?;
    Ok(())
}
