use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use super::{BlockOutcome, BlockTracker, Outgoing};
use crate::common::{BlockCommand, BlockEvent, ServiceError};

const SERVICE: &str = "block";

/// Task owning the [`BlockTracker`] and its notification registry.
pub struct BlockService {
    tracker: BlockTracker,
    command_receiver: mpsc::Receiver<BlockCommand>,
}

impl BlockService {
    pub fn new(
        mut tracker: BlockTracker,
        outgoing: Option<Arc<dyn Outgoing>>,
        queue_capacity: usize,
    ) -> (Self, BlockHandle) {
        if let Some(outgoing) = outgoing {
            tracker.set_outgoing(outgoing);
        }
        let (command_sender, command_receiver) = mpsc::channel(queue_capacity.max(1));
        let service = Self {
            tracker,
            command_receiver,
        };
        (service, BlockHandle { command_sender })
    }

    pub async fn run(mut self) {
        log::info!(
            "Block service started at #{}",
            self.tracker.current().height
        );
        while let Some(command) = self.command_receiver.recv().await {
            self.handle_command(command).await;
        }
        log::info!("Block service stopped");
    }

    async fn handle_command(&mut self, command: BlockCommand) {
        match command {
            BlockCommand::Block { event, reply } => {
                let outcome = self.tracker.on_block(event.into_block_info(Utc::now())).await;
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            BlockCommand::Register {
                username,
                channel,
                reply,
            } => {
                let line = self
                    .tracker
                    .handle_block_command(&username, &channel, Utc::now())
                    .await;
                let _ = reply.send(line);
            }
        }
    }
}

/// Cloneable front door to a running [`BlockService`].
#[derive(Clone)]
pub struct BlockHandle {
    command_sender: mpsc::Sender<BlockCommand>,
}

impl BlockHandle {
    /// Queue a block event without waiting for it to be applied.
    pub async fn submit(&self, event: BlockEvent) -> Result<(), ServiceError> {
        self.request(BlockCommand::Block { event, reply: None })
            .await
    }

    pub async fn on_block(&self, event: BlockEvent) -> Result<BlockOutcome, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.request(BlockCommand::Block {
            event,
            reply: Some(reply),
        })
        .await?;
        response.await.map_err(|_| ServiceError::Stopped(SERVICE))
    }

    /// Register `username` for the next block; returns the status line.
    pub async fn register(&self, username: &str, channel: &str) -> Result<String, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.request(BlockCommand::Register {
            username: username.to_string(),
            channel: channel.to_string(),
            reply,
        })
        .await?;
        response.await.map_err(|_| ServiceError::Stopped(SERVICE))
    }

    async fn request(&self, command: BlockCommand) -> Result<(), ServiceError> {
        self.command_sender
            .send(command)
            .await
            .map_err(|_| ServiceError::Stopped(SERVICE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ChannelOutgoing, NotificationRegistry};
    use crate::common::BlockInfo;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn register_then_block_announces_once() {
        let store = Arc::new(MemoryStore::new());
        let tracker = BlockTracker::new(
            BlockInfo::genesis(Utc::now()),
            NotificationRegistry::new(),
            store.clone(),
        );
        let (outgoing, mut sent) = ChannelOutgoing::new(16);
        let (service, handle) = BlockService::new(tracker, Some(Arc::new(outgoing)), 8);
        let task = tokio::spawn(service.run());

        let line = handle.register("ann", "english").await.unwrap();
        assert_eq!(line, "Seen block #0 just now.");
        assert_eq!(sent.recv().await.unwrap().text, line);

        let event = BlockEvent {
            height: 1,
            hash: "01".into(),
            unix_time: 1_700_000_000,
        };
        let outcome = handle.on_block(event.clone()).await.unwrap();
        assert_eq!(outcome, BlockOutcome::Advanced { notified_channels: 1 });
        assert_eq!(sent.recv().await.unwrap().text, "@ann: Block #1 mined.");

        handle.submit(event).await.unwrap();
        drop(handle);
        task.await.unwrap();

        assert!(sent.try_recv().is_err());
        assert_eq!(store.clear_calls(), 1);
    }
}
