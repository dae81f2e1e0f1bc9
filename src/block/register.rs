use std::fmt::Write;

use chrono::{DateTime, Utc};

use super::{BlockTracker, Registration};
use crate::common::time::format_time_diff;

impl BlockTracker {
    /// Answer a user's `block` command and register them for the next block.
    ///
    /// The status line is sent to `channel` when a sender is attached, and returned.
    pub async fn handle_block_command(
        &mut self,
        username: &str,
        channel: &str,
        now: DateTime<Utc>,
    ) -> String {
        log::debug!("Handling block command for {username} in {channel}");

        let elapsed = (now - self.current.notification).num_milliseconds();
        let mut line = if elapsed < 1_000 {
            format!("Seen block #{} just now.", self.current.height)
        } else {
            format!(
                "Seen block #{} {} ago.",
                self.current.height,
                format_time_diff(elapsed)
            )
        };

        match self.registry.probe(channel, username) {
            Registration::AlreadyPresent => {
                log::debug!("Already notifying {username} on {channel}");
                let _ = write!(line, " {username}: Have patience!");
            }
            registration => {
                log::debug!("Registering {username} on {channel} ({registration:?})");
                if let Err(err) = self.store.put_block_notification(username, channel).await {
                    log::error!("Failed to store block notification for {username}: {err}");
                }
                self.registry.register(channel, username);
            }
        }

        if let Some(outgoing) = &self.outgoing {
            outgoing.send(&line, channel);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::block::{BlockTracker, ChannelOutgoing, NotificationRegistry};
    use crate::common::BlockInfo;
    use crate::storage::{MemoryStore, Store};

    fn tracker(store: Arc<MemoryStore>) -> BlockTracker {
        let seen = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let block = BlockInfo {
            height: 812_345,
            hash: "00ff".into(),
            confirmation: seen,
            notification: seen,
        };
        BlockTracker::new(block, NotificationRegistry::new(), store)
    }

    #[tokio::test]
    async fn second_request_gets_rebuked_without_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let mut tracker = tracker(store.clone());
        let (outgoing, mut sent) = ChannelOutgoing::new(8);
        tracker.set_outgoing(Arc::new(outgoing));
        let now = tracker.current().notification + Duration::seconds(192);

        let first = tracker.handle_block_command("ann", "english", now).await;
        assert_eq!(first, "Seen block #812345 3m 12s ago.");

        let second = tracker.handle_block_command("ann", "english", now).await;
        assert_eq!(second, "Seen block #812345 3m 12s ago. ann: Have patience!");

        let users: Vec<&str> = tracker.registry().users("english").unwrap().collect();
        assert_eq!(users, vec!["ann"]);
        assert_eq!(store.block_notifications().await.unwrap()["english"], vec!["ann"]);

        assert_eq!(sent.try_recv().unwrap().text, first);
        assert_eq!(sent.try_recv().unwrap().text, second);
    }

    #[tokio::test]
    async fn fresh_block_is_seen_just_now() {
        let store = Arc::new(MemoryStore::new());
        let mut tracker = tracker(store);
        let now = tracker.current().notification + Duration::milliseconds(400);

        let line = tracker.handle_block_command("bob", "spanish", now).await;
        assert_eq!(line, "Seen block #812345 just now.");
    }

    #[tokio::test]
    async fn registration_survives_store_failure() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let mut tracker = tracker(store.clone());
        let now = tracker.current().notification;

        tracker.handle_block_command("ann", "english", now).await;
        tracker.handle_block_command("bob", "english", now).await;

        let users: Vec<&str> = tracker.registry().users("english").unwrap().collect();
        assert_eq!(users, vec!["ann", "bob"]);
        assert!(store.block_notifications().await.unwrap().is_empty());
    }
}
