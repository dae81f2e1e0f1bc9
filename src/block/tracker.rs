use std::sync::Arc;

use chrono::Utc;

use super::{NotificationRegistry, Outgoing};
use crate::common::BlockInfo;
use crate::storage::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// The block is higher than anything seen before.
    Advanced { notified_channels: usize },
    /// Same or lower height; nothing changed.
    Stale,
}

/// Latest block plus the users waiting to hear about the next one.
pub struct BlockTracker {
    pub(super) current: BlockInfo,
    pub(super) registry: NotificationRegistry,
    pub(super) store: Arc<dyn Store>,
    pub(super) outgoing: Option<Arc<dyn Outgoing>>,
}

impl BlockTracker {
    pub fn new(current: BlockInfo, registry: NotificationRegistry, store: Arc<dyn Store>) -> Self {
        Self {
            current,
            registry,
            store,
            outgoing: None,
        }
    }

    /// Restore the last block and pending notifications from `store`.
    pub async fn load(store: Arc<dyn Store>) -> Self {
        let current = match store.latest_block().await {
            Ok(Some(block)) => block,
            Ok(None) => {
                log::info!("No block stored yet; starting from genesis placeholder");
                BlockInfo::genesis(Utc::now())
            }
            Err(err) => {
                log::error!("Failed to load latest block: {err}");
                BlockInfo::genesis(Utc::now())
            }
        };
        let registry = match store.block_notifications().await {
            Ok(map) => NotificationRegistry::from_map(map),
            Err(err) => {
                log::error!("Failed to load block notifications: {err}");
                NotificationRegistry::new()
            }
        };
        log::info!(
            "Block tracker at #{} with {} channels waiting",
            current.height,
            registry.channel_count()
        );
        Self::new(current, registry, store)
    }

    pub fn set_outgoing(&mut self, outgoing: Arc<dyn Outgoing>) {
        self.outgoing = Some(outgoing);
    }

    pub fn current(&self) -> &BlockInfo {
        &self.current
    }

    pub fn registry(&self) -> &NotificationRegistry {
        &self.registry
    }

    /// Record `candidate` and, if it is new, announce it to every waiting channel.
    pub async fn on_block(&mut self, candidate: BlockInfo) -> BlockOutcome {
        // Upsert by height, so replays are harmless.
        if let Err(err) = self.store.put_block(&candidate).await {
            log::error!("Failed to store block #{}: {err}", candidate.height);
        }

        if candidate.height <= self.current.height {
            log::debug!(
                "Ignoring block #{} (current #{})",
                candidate.height,
                self.current.height
            );
            return BlockOutcome::Stale;
        }

        log::info!("New block #{} {}", candidate.height, candidate.hash);
        self.current = candidate;

        let outgoing = match &self.outgoing {
            Some(outgoing) if !self.registry.is_empty() => outgoing,
            _ => return BlockOutcome::Advanced { notified_channels: 0 },
        };

        let announcements = self.registry.announcements(self.current.height);
        for announcement in &announcements {
            log::debug!("Notifying {}: {}", announcement.channel, announcement.text);
            outgoing.send(&announcement.text, &announcement.channel);
        }

        self.registry.clear();
        if let Err(err) = self.store.clear_block_notifications().await {
            log::error!("Failed to clear block notifications: {err}");
        }

        BlockOutcome::Advanced {
            notified_channels: announcements.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone};
    use tokio::sync::mpsc;

    use super::*;
    use crate::block::ChannelOutgoing;
    use crate::common::OutgoingMessage;
    use crate::storage::{MemoryStore, NotificationMap};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn block(height: u64) -> BlockInfo {
        BlockInfo {
            height,
            hash: format!("hash{height}"),
            confirmation: at(1_000 + height as i64),
            notification: at(2_000 + height as i64),
        }
    }

    fn tracker_with_waiters(
        store: Arc<MemoryStore>,
    ) -> (BlockTracker, mpsc::Receiver<OutgoingMessage>) {
        let mut map = NotificationMap::new();
        map.insert("english".into(), vec!["ann".into(), "bob".into()]);
        map.insert("russian".into(), vec!["ivan".into()]);
        let mut tracker = BlockTracker::new(block(100), NotificationRegistry::from_map(map), store);
        let (outgoing, receiver) = ChannelOutgoing::new(16);
        tracker.set_outgoing(Arc::new(outgoing));
        (tracker, receiver)
    }

    #[tokio::test]
    async fn stale_block_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let (mut tracker, mut sent) = tracker_with_waiters(store.clone());
        let registry_before = tracker.registry().clone();

        assert_eq!(tracker.on_block(block(100)).await, BlockOutcome::Stale);
        assert_eq!(tracker.on_block(block(99)).await, BlockOutcome::Stale);

        assert_eq!(tracker.current(), &block(100));
        assert_eq!(tracker.registry(), &registry_before);
        assert!(sent.try_recv().is_err());
        assert_eq!(store.clear_calls(), 0);
        // still persisted
        assert_eq!(store.stored_blocks().len(), 2);
    }

    #[tokio::test]
    async fn new_block_flushes_every_channel_once() {
        let store = Arc::new(MemoryStore::new());
        let (mut tracker, mut sent) = tracker_with_waiters(store.clone());

        let outcome = tracker.on_block(block(101)).await;

        assert_eq!(outcome, BlockOutcome::Advanced { notified_channels: 2 });
        assert_eq!(
            sent.try_recv().unwrap(),
            OutgoingMessage {
                channel: "english".into(),
                text: "@ann, @bob: Block #101 mined.".into(),
            }
        );
        assert_eq!(
            sent.try_recv().unwrap(),
            OutgoingMessage {
                channel: "russian".into(),
                text: "@ivan: Block #101 mined.".into(),
            }
        );
        assert!(sent.try_recv().is_err());
        assert!(tracker.registry().is_empty());
        assert_eq!(store.clear_calls(), 1);
        assert_eq!(tracker.current().height, 101);

        // replay of the same height is a no-op
        assert_eq!(tracker.on_block(block(101)).await, BlockOutcome::Stale);
        assert_eq!(store.clear_calls(), 1);
    }

    #[tokio::test]
    async fn failed_clear_still_empties_registry() {
        let store = Arc::new(MemoryStore::new());
        let (mut tracker, mut sent) = tracker_with_waiters(store.clone());
        store.set_fail_writes(true);

        let outcome = tracker.on_block(block(105)).await;

        assert_eq!(outcome, BlockOutcome::Advanced { notified_channels: 2 });
        assert!(tracker.registry().is_empty());
        assert_eq!(store.clear_calls(), 1);
        assert!(sent.try_recv().is_ok());
    }

    #[tokio::test]
    async fn without_sender_registry_waits() {
        let store = Arc::new(MemoryStore::new());
        let mut map = NotificationMap::new();
        map.insert("english".into(), vec!["ann".into()]);
        let mut tracker =
            BlockTracker::new(block(1), NotificationRegistry::from_map(map), store.clone());

        let outcome = tracker.on_block(block(2)).await;

        assert_eq!(outcome, BlockOutcome::Advanced { notified_channels: 0 });
        assert!(!tracker.registry().is_empty());
        assert_eq!(store.clear_calls(), 0);
    }

    #[tokio::test]
    async fn load_restores_block_and_waiters() {
        let mut map = NotificationMap::new();
        map.insert("english".into(), vec!["ann".into()]);
        let store = Arc::new(
            MemoryStore::new()
                .with_block(block(7))
                .with_block(block(9))
                .with_notifications(map),
        );

        let tracker = BlockTracker::load(store).await;
        assert_eq!(tracker.current(), &block(9));
        assert_eq!(tracker.registry().channel_count(), 1);
    }
}
