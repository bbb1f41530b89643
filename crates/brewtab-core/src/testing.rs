//! In-memory fakes for the ports, shared by this crate's tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use crate::{
    domain::{ChannelId, MessageRef, MessageTs, UserId},
    errors::Error,
    ledger::port::LedgerStore,
    messaging::{
        port::ChatPort,
        types::{
            BotIdentity, ControlMessage, DirectoryUser, HistoryMessage, MessagingCapabilities,
        },
    },
    Result,
};

#[derive(Default)]
pub struct MemoryLedgerStore {
    rows: Mutex<Vec<Vec<String>>>,
    header_writes: Mutex<usize>,
    fail_appends: Mutex<bool>,
    append_gate: Mutex<Option<Arc<Semaphore>>>,
    /// Signalled when an append parks on the gate.
    pub append_waiting: Notify,
}

impl MemoryLedgerStore {
    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn header_writes(&self) -> usize {
        *self.header_writes.lock().unwrap()
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().unwrap().clone()
    }

    pub fn fail_appends(&self, fail: bool) {
        *self.fail_appends.lock().unwrap() = fail;
    }

    /// Park every append until a permit is added to the returned semaphore.
    pub fn gate_appends(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.append_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn first_row(&self) -> Result<Vec<String>> {
        Ok(self.rows.lock().unwrap().first().cloned().unwrap_or_default())
    }

    async fn write_header(&self, header: &[&str]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let header: Vec<String> = header.iter().map(|s| s.to_string()).collect();
        if rows.is_empty() {
            rows.push(header);
        } else {
            rows[0] = header;
        }
        *self.header_writes.lock().unwrap() += 1;
        Ok(())
    }

    async fn append_row(&self, values: Vec<String>) -> Result<()> {
        let gate = self.append_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.append_waiting.notify_one();
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| Error::External("append gate closed".into()))?;
        }
        if *self.fail_appends.lock().unwrap() {
            return Err(Error::External("append failed".into()));
        }
        self.rows.lock().unwrap().push(values);
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Vec<String>>> {
        Ok(self.rows())
    }

    async fn delete_row(&self, index: usize) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if index >= rows.len() {
            return Err(Error::NotFound(format!("row {index}")));
        }
        rows.remove(index);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeChat {
    next_ts: Mutex<u64>,
    pub posts: Mutex<Vec<(ChannelId, ControlMessage)>>,
    pub updates: Mutex<Vec<(MessageRef, ControlMessage)>>,
    pub deletes: Mutex<Vec<MessageRef>>,
    pub ephemerals: Mutex<Vec<(ChannelId, UserId, String)>>,
    pub opened: Mutex<Vec<UserId>>,
    pub users: Mutex<Vec<DirectoryUser>>,
    pub history: Mutex<HashMap<String, Vec<HistoryMessage>>>,
    pub fail_post_channels: Mutex<HashSet<String>>,
}

impl FakeChat {
    pub fn dm_channel(user: &UserId) -> ChannelId {
        ChannelId(format!("D-{}", user.0))
    }

    pub fn with_users(ids: &[&str]) -> Self {
        let me = Self::default();
        *me.users.lock().unwrap() = ids
            .iter()
            .map(|id| DirectoryUser {
                id: UserId::new(*id),
                name: format!("name-{id}"),
                is_bot: false,
                deleted: false,
            })
            .collect();
        me
    }

    pub fn fail_posts_to(&self, user: &UserId) {
        self.fail_post_channels
            .lock()
            .unwrap()
            .insert(Self::dm_channel(user).0);
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn last_rendered(&self) -> Option<ControlMessage> {
        let posts = self.posts.lock().unwrap();
        let updates = self.updates.lock().unwrap();
        // Updates always follow the initial post for the same message.
        updates
            .last()
            .map(|(_, m)| m.clone())
            .or_else(|| posts.last().map(|(_, m)| m.clone()))
    }

    fn alloc_ts(&self) -> MessageTs {
        let mut guard = self.next_ts.lock().unwrap();
        *guard += 1;
        MessageTs(format!("1700000000.{:06}", *guard))
    }
}

#[async_trait]
impl ChatPort for FakeChat {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 3000,
        }
    }

    async fn bot_identity(&self) -> Result<BotIdentity> {
        Ok(BotIdentity {
            user_id: UserId::new("UBOT"),
            bot_id: Some("BBOT".into()),
        })
    }

    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId> {
        self.opened.lock().unwrap().push(user.clone());
        Ok(Self::dm_channel(user))
    }

    async fn post_message(&self, channel: &ChannelId, msg: &ControlMessage) -> Result<MessageRef> {
        if self.fail_post_channels.lock().unwrap().contains(&channel.0) {
            return Err(Error::External(format!("post to {} failed", channel.0)));
        }
        self.posts
            .lock()
            .unwrap()
            .push((channel.clone(), msg.clone()));
        Ok(MessageRef {
            channel: channel.clone(),
            ts: self.alloc_ts(),
        })
    }

    async fn update_message(&self, target: &MessageRef, msg: &ControlMessage) -> Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((target.clone(), msg.clone()));
        Ok(())
    }

    async fn delete_message(&self, target: &MessageRef) -> Result<()> {
        self.deletes.lock().unwrap().push(target.clone());
        Ok(())
    }

    async fn post_ephemeral(&self, channel: &ChannelId, user: &UserId, text: &str) -> Result<()> {
        self.ephemerals
            .lock()
            .unwrap()
            .push((channel.clone(), user.clone(), text.to_string()));
        Ok(())
    }

    async fn channel_history(&self, channel: &ChannelId) -> Result<Vec<HistoryMessage>> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(&channel.0)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_users(&self) -> Result<Vec<DirectoryUser>> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn user_display_name(&self, user: &UserId) -> Result<String> {
        Ok(format!("name-{}", user.0))
    }
}
