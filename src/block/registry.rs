use indexmap::{IndexMap, IndexSet};

use crate::common::OutgoingMessage;
use crate::storage::NotificationMap;

/// Result of registering a user for the next block announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    NewChannel,
    Added,
    AlreadyPresent,
}

/// Users waiting for the next block, per channel, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationRegistry {
    channels: IndexMap<String, IndexSet<String>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: NotificationMap) -> Self {
        let channels = map
            .into_iter()
            .filter(|(_, users)| !users.is_empty())
            .map(|(channel, users)| (channel, users.into_iter().collect::<IndexSet<_>>()))
            .collect();
        Self { channels }
    }

    /// What [`NotificationRegistry::register`] would do, without doing it.
    pub fn probe(&self, channel: &str, username: &str) -> Registration {
        match self.channels.get(channel) {
            None => Registration::NewChannel,
            Some(users) if users.contains(username) => Registration::AlreadyPresent,
            Some(_) => Registration::Added,
        }
    }

    pub fn register(&mut self, channel: &str, username: &str) -> Registration {
        let outcome = self.probe(channel, username);
        if outcome != Registration::AlreadyPresent {
            self.channels
                .entry(channel.to_string())
                .or_default()
                .insert(username.to_string());
        }
        outcome
    }

    pub fn users(&self, channel: &str) -> Option<impl Iterator<Item = &str>> {
        self.channels
            .get(channel)
            .map(|users| users.iter().map(String::as_str))
    }

    /// One announcement per channel, e.g. `@ann, @bob: Block #812345 mined.`
    pub fn announcements(&self, height: u64) -> Vec<OutgoingMessage> {
        self.channels
            .iter()
            .map(|(channel, users)| {
                let mentions: Vec<String> = users.iter().map(|user| format!("@{user}")).collect();
                OutgoingMessage {
                    channel: channel.clone(),
                    text: format!("{}: Block #{height} mined.", mentions.join(", ")),
                }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}
