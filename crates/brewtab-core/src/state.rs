//! Process-lifetime state: choice counters, control message references,
//! settlement flags and per-user locks.
//!
//! Nothing here is persisted. The ledger stays authoritative; counters are a
//! cache hydrated from it on a user's first interaction.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{ChoiceKind, MessageRef, MonthKey, UserId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChoiceCounts {
    pub coffee: u32,
    pub tea: u32,
}

impl ChoiceCounts {
    pub fn increment(&mut self, kind: &ChoiceKind) {
        match kind {
            ChoiceKind::Coffee => self.coffee += 1,
            ChoiceKind::Tea => self.tea += 1,
            ChoiceKind::Other(_) => {}
        }
    }

    /// Floored at zero. Unknown kinds are ignored.
    pub fn decrement(&mut self, kind: &ChoiceKind) {
        match kind {
            ChoiceKind::Coffee => self.coffee = self.coffee.saturating_sub(1),
            ChoiceKind::Tea => self.tea = self.tea.saturating_sub(1),
            ChoiceKind::Other(_) => {}
        }
    }
}

/// The one live control message for a user, and the month it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlMessageRef {
    pub message: MessageRef,
    pub month: MonthKey,
}

#[derive(Debug, Default)]
struct Maps {
    counters: HashMap<UserId, ChoiceCounts>,
    messages: HashMap<UserId, ControlMessageRef>,
    settlements: HashMap<MonthKey, HashMap<UserId, bool>>,
    display_names: HashMap<UserId, String>,
}

/// Serializes work per user; different users proceed independently.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock_user(&self, user: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Explicit state store shared by every handler (via `Arc`).
#[derive(Default)]
pub struct StateStore {
    maps: Mutex<Maps>,
    locks: UserLocks,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock_user(&self, user: &UserId) -> OwnedMutexGuard<()> {
        self.locks.lock_user(user).await
    }

    // ---- counters ----

    pub async fn counts(&self, user: &UserId) -> Option<ChoiceCounts> {
        self.maps.lock().await.counters.get(user).copied()
    }

    pub async fn set_counts(&self, user: &UserId, counts: ChoiceCounts) {
        self.maps.lock().await.counters.insert(user.clone(), counts);
    }

    pub async fn increment(&self, user: &UserId, kind: &ChoiceKind) -> ChoiceCounts {
        let mut maps = self.maps.lock().await;
        let c = maps.counters.entry(user.clone()).or_default();
        c.increment(kind);
        *c
    }

    pub async fn decrement(&self, user: &UserId, kind: &ChoiceKind) -> ChoiceCounts {
        let mut maps = self.maps.lock().await;
        let c = maps.counters.entry(user.clone()).or_default();
        c.decrement(kind);
        *c
    }

    // ---- control messages ----

    pub async fn message_ref(&self, user: &UserId) -> Option<ControlMessageRef> {
        self.maps.lock().await.messages.get(user).cloned()
    }

    pub async fn set_message_ref(&self, user: &UserId, r: ControlMessageRef) {
        self.maps.lock().await.messages.insert(user.clone(), r);
    }

    pub async fn forget_message_ref(&self, user: &UserId) -> Option<ControlMessageRef> {
        self.maps.lock().await.messages.remove(user)
    }

    // ---- settlement ----

    pub async fn is_settled(&self, month: MonthKey, user: &UserId) -> bool {
        self.maps
            .lock()
            .await
            .settlements
            .get(&month)
            .and_then(|m| m.get(user))
            .copied()
            .unwrap_or(false)
    }

    pub async fn set_settled(&self, user: &UserId, month: MonthKey, settled: bool) {
        let mut maps = self.maps.lock().await;
        maps.settlements
            .entry(month)
            .or_default()
            .insert(user.clone(), settled);
    }

    // ---- display names ----

    pub async fn display_name(&self, user: &UserId) -> Option<String> {
        self.maps.lock().await.display_names.get(user).cloned()
    }

    pub async fn set_display_name(&self, user: &UserId, name: &str) {
        self.maps
            .lock()
            .await
            .display_names
            .insert(user.clone(), name.to_string());
    }
}
