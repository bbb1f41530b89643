//! Choice recording, undo, settlement and control-message reconciliation.
//!
//! Every user interaction is a typed [`Event`] dispatched through
//! [`BrewService::handle`]; each one ends in exactly one reconcile of that
//! user's control message. Work for a single user is serialized by a
//! per-user lock held for the whole event.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::OnceCell;

use crate::{
    config::Config,
    domain::{ChoiceKind, MessageRef, MonthKey, UserId},
    errors::Error,
    ledger::{
        last_entry_for,
        types::{LedgerEntry, LedgerRow},
        Ledger,
    },
    messaging::{
        port::ChatPort,
        types::{BotIdentity, DirectoryUser},
    },
    render::{render_control_message, render_global_tally},
    state::{ChoiceCounts, ControlMessageRef, StateStore},
    summary::{global_monthly_summary, monthly_summary_for, MonthlySummary},
    Result,
};

/// Something a user did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Slash command: show (or refresh) the control message.
    ShowPanel,
    ChoiceMade(ChoiceKind),
    UndoRequested,
    /// Paid checkbox. `month` is the panel's month; `None` means the current one.
    SettlementToggled {
        month: Option<MonthKey>,
        settled: bool,
    },
    PayAcknowledged,
}

/// What the reconciler did with the control message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Posted(MessageRef),
    Updated(MessageRef),
}

impl ReconcileOutcome {
    pub fn message(&self) -> &MessageRef {
        match self {
            Self::Posted(m) | Self::Updated(m) => m,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventOutcome {
    pub reconcile: ReconcileOutcome,
    /// Short note for the user (shown ephemerally), if any.
    pub notice: Option<String>,
}

/// Result of a broadcast pass. Failures are per user and never abort the batch.
#[derive(Clone, Debug, Default)]
pub struct BroadcastReport {
    pub delivered: Vec<UserId>,
    pub failed: Vec<(UserId, String)>,
}

pub struct BrewService {
    cfg: Arc<Config>,
    ledger: Ledger,
    chat: Arc<dyn ChatPort>,
    state: Arc<StateStore>,
    identity: OnceCell<BotIdentity>,
}

impl BrewService {
    pub fn new(
        cfg: Arc<Config>,
        ledger: Ledger,
        chat: Arc<dyn ChatPort>,
        state: Arc<StateStore>,
    ) -> Self {
        Self {
            cfg,
            ledger,
            chat,
            state,
            identity: OnceCell::new(),
        }
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn chat(&self) -> &Arc<dyn ChatPort> {
        &self.chat
    }

    /// Resolve (once) and cache the bot's own identity.
    pub async fn bot_identity(&self) -> Result<&BotIdentity> {
        self.identity
            .get_or_try_init(|| async { self.chat.bot_identity().await })
            .await
    }

    pub async fn handle(&self, user: &UserId, event: Event) -> Result<EventOutcome> {
        self.handle_at(user, event, Local::now()).await
    }

    pub async fn handle_at(
        &self,
        user: &UserId,
        event: Event,
        now: DateTime<Local>,
    ) -> Result<EventOutcome> {
        let _guard = self.state.lock_user(user).await;
        tracing::debug!(user = %user, ?event, "handling event");

        let notice = match event {
            Event::ShowPanel => None,
            Event::ChoiceMade(kind) => {
                self.record_choice(user, kind, now).await?;
                None
            }
            Event::UndoRequested => match self.undo_last_choice(user).await? {
                Some(_) => None,
                None => Some("Nothing to undo.".to_string()),
            },
            Event::SettlementToggled { month, settled } => {
                let month = month.unwrap_or_else(|| MonthKey::of(&now));
                self.state.set_settled(user, month, settled).await;
                None
            }
            Event::PayAcknowledged => {
                if self.cfg.pay_link.is_none() {
                    Some("No payment link is configured yet.".to_string())
                } else {
                    None
                }
            }
        };

        let reconcile = self.reconcile(user, now).await?;
        Ok(EventOutcome { reconcile, notice })
    }

    /// Hydrate the counter cache for `user` from the ledger if it is absent.
    async fn ensure_counts(&self, user: &UserId) -> Result<ChoiceCounts> {
        if let Some(c) = self.state.counts(user).await {
            return Ok(c);
        }
        let entries = self.ledger.entries().await?;
        let counts = counts_for(&entries, user);
        self.state.set_counts(user, counts).await;
        Ok(counts)
    }

    async fn display_name(&self, user: &UserId) -> String {
        if let Some(name) = self.state.display_name(user).await {
            return name;
        }
        match self.chat.user_display_name(user).await {
            Ok(name) => {
                self.state.set_display_name(user, &name).await;
                name
            }
            Err(e) => {
                tracing::warn!(user = %user, error = %e, "display name lookup failed");
                user.0.clone()
            }
        }
    }

    /// Append a row for `kind` and bump the counter.
    ///
    /// Callers hold the user's lock. The counter only moves after the ledger
    /// write succeeds.
    pub async fn record_choice(
        &self,
        user: &UserId,
        kind: ChoiceKind,
        now: DateTime<Local>,
    ) -> Result<ChoiceCounts> {
        let price = self
            .cfg
            .pricing
            .price_for(&kind)
            .ok_or_else(|| Error::Config(format!("no price configured for {kind}")))?;

        self.ensure_counts(user).await?;
        let name = self.display_name(user).await;
        let row = LedgerRow::new(user.clone(), name, now, kind.clone(), price);

        self.ledger.append(&row).await?;
        let counts = self.state.increment(user, &kind).await;
        tracing::info!(user = %user, choice = %kind, price, "choice recorded");
        Ok(counts)
    }

    /// Delete the user's most recent row. `None` when there is nothing to undo.
    ///
    /// Rows of an unknown kind are deleted but leave the counters alone.
    pub async fn undo_last_choice(&self, user: &UserId) -> Result<Option<LedgerRow>> {
        self.ensure_counts(user).await?;

        let entries = self.ledger.entries().await?;
        let Some(last) = last_entry_for(&entries, user).cloned() else {
            tracing::info!(user = %user, "undo requested with no prior rows");
            return Ok(None);
        };

        self.ledger.delete_row(last.index).await?;
        self.state.decrement(user, &last.row.choice).await;
        tracing::info!(user = %user, row = last.index, choice = %last.row.choice, "choice undone");
        Ok(Some(last.row))
    }

    pub async fn set_settled(&self, user: &UserId, month: MonthKey, settled: bool) {
        self.state.set_settled(user, month, settled).await;
    }

    /// Re-render and create-or-update the user's control message.
    pub async fn reconcile(&self, user: &UserId, now: DateTime<Local>) -> Result<ReconcileOutcome> {
        let rows = self.ledger.rows().await?;
        let summary = monthly_summary_for(&rows, user, &now);
        self.reconcile_with(user, &summary, now).await
    }

    /// Reconcile with an already computed summary.
    ///
    /// No reference, or a reference from another month, means a new message in
    /// the user's DM; otherwise the existing one is updated in place.
    pub async fn reconcile_with(
        &self,
        user: &UserId,
        summary: &MonthlySummary,
        now: DateTime<Local>,
    ) -> Result<ReconcileOutcome> {
        let month = MonthKey::of(&now);
        let settled = self.state.is_settled(month, user).await;
        let msg = render_control_message(
            month,
            summary,
            settled,
            &self.cfg.pricing,
            self.cfg.pay_link.as_deref(),
        );

        match self.state.message_ref(user).await {
            Some(existing) if existing.month == month => {
                self.chat.update_message(&existing.message, &msg).await?;
                Ok(ReconcileOutcome::Updated(existing.message))
            }
            _ => {
                let channel = self.chat.open_direct_channel(user).await?;
                let posted = self.chat.post_message(&channel, &msg).await?;
                self.state
                    .set_message_ref(
                        user,
                        ControlMessageRef {
                            message: posted.clone(),
                            month,
                        },
                    )
                    .await;
                Ok(ReconcileOutcome::Posted(posted))
            }
        }
    }

    /// Everyone's tally for the month of `now`, as `mrkdwn`.
    pub async fn monthly_tally(&self, now: DateTime<Local>) -> Result<String> {
        let rows = self.ledger.rows().await?;
        let global = global_monthly_summary(&rows, &now);
        Ok(render_global_tally(MonthKey::of(&now), &global))
    }

    /// Delete every bot-authored message in the user's DM. Returns how many went.
    ///
    /// The control message reference is dropped as well, so the next
    /// interaction posts a fresh one.
    pub async fn clear_direct_messages(&self, user: &UserId) -> Result<usize> {
        let _guard = self.state.lock_user(user).await;
        let me = self.bot_identity().await?.clone();

        let channel = self.chat.open_direct_channel(user).await?;
        let history = self.chat.channel_history(&channel).await?;

        let mut deleted = 0usize;
        for msg in history.iter().filter(|m| me.authored(m)) {
            let target = MessageRef {
                channel: channel.clone(),
                ts: crate::domain::MessageTs(msg.ts.clone()),
            };
            match self.chat.delete_message(&target).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(user = %user, ts = %msg.ts, error = %e, "failed to delete DM message")
                }
            }
        }

        self.state.forget_message_ref(user).await;
        tracing::info!(user = %user, deleted, "cleared direct messages");
        Ok(deleted)
    }

    /// Reconcile every person in the directory.
    ///
    /// Each user's summary is read from the ledger after taking that user's
    /// lock, so a choice landing mid-broadcast is never overwritten by older
    /// counts. Listing the directory failing aborts the pass; a single user
    /// failing does not.
    pub async fn broadcast_all(&self, now: DateTime<Local>) -> Result<BroadcastReport> {
        let users: Vec<DirectoryUser> = self
            .chat
            .list_users()
            .await?
            .into_iter()
            .filter(DirectoryUser::is_person)
            .collect();

        tracing::info!(users = users.len(), month = %MonthKey::of(&now), "broadcast starting");

        let mut report = BroadcastReport::default();
        for u in users {
            let _guard = self.state.lock_user(&u.id).await;
            match self.reconcile(&u.id, now).await {
                Ok(_) => report.delivered.push(u.id),
                Err(e) => {
                    tracing::warn!(user = %u.id, error = %e, "broadcast to user failed");
                    report.failed.push((u.id, e.to_string()));
                }
            }
        }

        tracing::info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "broadcast finished"
        );
        Ok(report)
    }
}

fn counts_for(entries: &[LedgerEntry], user: &UserId) -> ChoiceCounts {
    let mut counts = ChoiceCounts::default();
    for e in entries.iter().filter(|e| &e.row.user_id == user) {
        counts.increment(&e.row.choice);
    }
    counts
}
