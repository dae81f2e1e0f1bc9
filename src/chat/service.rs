use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::{HistoryWindow, MergeReport};
use crate::common::{ChatMessage, HistoryCommand, ServiceError};

const SERVICE: &str = "history";

/// Task owning the [`HistoryWindow`]; commands are applied one at a time.
pub struct HistoryService {
    window: HistoryWindow,
    command_receiver: mpsc::Receiver<HistoryCommand>,
}

impl HistoryService {
    pub fn new(window: HistoryWindow, queue_capacity: usize) -> (Self, HistoryHandle) {
        let (command_sender, command_receiver) = mpsc::channel(queue_capacity.max(1));
        let service = Self {
            window,
            command_receiver,
        };
        (service, HistoryHandle { command_sender })
    }

    pub async fn run(mut self) {
        log::info!(
            "History service started with {}/{} messages",
            self.window.len(),
            self.window.capacity()
        );
        while let Some(command) = self.command_receiver.recv().await {
            self.handle_command(command).await;
        }
        log::info!("History service stopped");
    }

    async fn handle_command(&mut self, command: HistoryCommand) {
        match command {
            HistoryCommand::Merge { batch, reply } => {
                let report = self.window.merge(batch).await;
                let _ = reply.send(report);
            }
            HistoryCommand::Query {
                username,
                after,
                reply,
            } => {
                let found = self.window.query(&username, after).cloned().collect();
                let _ = reply.send(found);
            }
            HistoryCommand::Subscribe { reply } => {
                let _ = reply.send(self.window.subscribe());
            }
        }
    }
}

/// Cloneable front door to a running [`HistoryService`].
#[derive(Clone)]
pub struct HistoryHandle {
    command_sender: mpsc::Sender<HistoryCommand>,
}

impl HistoryHandle {
    pub async fn merge(&self, batch: Vec<ChatMessage>) -> Result<MergeReport, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.request(HistoryCommand::Merge { batch, reply }).await?;
        response.await.map_err(|_| ServiceError::Stopped(SERVICE))
    }

    pub async fn query(
        &self,
        username: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.request(HistoryCommand::Query {
            username: username.to_string(),
            after,
            reply,
        })
        .await?;
        response.await.map_err(|_| ServiceError::Stopped(SERVICE))
    }

    pub async fn subscribe(&self) -> Result<broadcast::Receiver<ChatMessage>, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.request(HistoryCommand::Subscribe { reply }).await?;
        response.await.map_err(|_| ServiceError::Stopped(SERVICE))
    }

    async fn request(&self, command: HistoryCommand) -> Result<(), ServiceError> {
        self.command_sender
            .send(command)
            .await
            .map_err(|_| ServiceError::Stopped(SERVICE))
    }
}
