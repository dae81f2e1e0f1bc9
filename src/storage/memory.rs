use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{NotificationMap, Store, StoreError};
use crate::common::{BlockInfo, ChatMessage};

#[derive(Default)]
struct MemoryState {
    blocks: Vec<BlockInfo>,
    notifications: NotificationMap,
    messages: Vec<ChatMessage>,
}

/// Process-local [`Store`]; nothing survives a restart.
///
/// Counts writes and can be switched into a failing mode, which makes it the
/// store of choice for exercising the best-effort write paths.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_writes: AtomicBool,
    msg_writes: AtomicUsize,
    clear_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.lock() {
            state.messages = messages;
        }
        store
    }

    pub fn with_block(self, block: BlockInfo) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.blocks.push(block);
        }
        self
    }

    pub fn with_notifications(self, notifications: NotificationMap) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.notifications = notifications;
        }
        self
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `put_msg` calls, failed ones included.
    pub fn msg_writes(&self) -> usize {
        self.msg_writes.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    pub fn stored_messages(&self) -> Vec<ChatMessage> {
        self.state()
            .map(|state| state.messages.clone())
            .unwrap_or_default()
    }

    pub fn stored_blocks(&self) -> Vec<BlockInfo> {
        self.state()
            .map(|state| state.blocks.clone())
            .unwrap_or_default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    fn check_write(&self, what: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected(format!("{what} disabled")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn latest_block(&self) -> Result<Option<BlockInfo>, StoreError> {
        let state = self.state()?;
        Ok(state.blocks.iter().max_by_key(|block| block.height).cloned())
    }

    async fn put_block(&self, block: &BlockInfo) -> Result<(), StoreError> {
        self.check_write("put_block")?;
        let mut state = self.state()?;
        state.blocks.retain(|stored| stored.height != block.height);
        state.blocks.push(block.clone());
        Ok(())
    }

    async fn block_notifications(&self) -> Result<NotificationMap, StoreError> {
        Ok(self.state()?.notifications.clone())
    }

    async fn put_block_notification(
        &self,
        username: &str,
        channel: &str,
    ) -> Result<(), StoreError> {
        self.check_write("put_block_notification")?;
        let mut state = self.state()?;
        let users = state.notifications.entry(channel.to_string()).or_default();
        if !users.iter().any(|user| user == username) {
            users.push(username.to_string());
        }
        Ok(())
    }

    async fn clear_block_notifications(&self) -> Result<(), StoreError> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write("clear_block_notifications")?;
        self.state()?.notifications.clear();
        Ok(())
    }

    async fn last_messages(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let state = self.state()?;
        let skip = state.messages.len().saturating_sub(limit);
        Ok(state.messages[skip..].to_vec())
    }

    async fn put_msg(&self, msg: &ChatMessage) -> Result<(), StoreError> {
        self.msg_writes.fetch_add(1, Ordering::SeqCst);
        self.check_write("put_msg")?;
        self.state()?.messages.push(msg.clone());
        Ok(())
    }
}
