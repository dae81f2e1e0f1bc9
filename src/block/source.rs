use std::time::Duration;

use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval};

use super::BlockHandle;
use crate::common::BlockEvent;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot build http client: {0}")]
    Client(reqwest::Error),
    #[error("block request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Polls an HTTP endpoint answering `{"height": .., "hash": .., "time": ..}`.
pub struct HttpBlockSource {
    client: reqwest::Client,
    url: String,
    period: Duration,
    last_height: Option<u64>,
}

impl HttpBlockSource {
    /// `timeout` bounds each request, from connecting to reading the body.
    pub fn new(
        url: impl Into<String>,
        period: Duration,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self {
            client,
            url: url.into(),
            period,
            last_height: None,
        })
    }

    pub async fn fetch(&self) -> Result<BlockEvent, SourceError> {
        let event = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<BlockEvent>()
            .await?;
        Ok(event)
    }

    /// Forward every newly polled height until the block service goes away.
    pub async fn run(mut self, blocks: BlockHandle) {
        log::info!("Polling {} every {:?}", self.url, self.period);
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let event = match self.fetch().await {
                Ok(event) => event,
                Err(err) => {
                    log::warn!("Block poll failed: {err}");
                    continue;
                }
            };
            if !self.observe(event.height) {
                continue;
            }
            if let Err(err) = blocks.submit(event).await {
                log::info!("Stopping block poller: {err}");
                break;
            }
        }
    }

    /// True the first time a height shows up in a row.
    fn observe(&mut self, height: u64) -> bool {
        if self.last_height == Some(height) {
            return false;
        }
        self.last_height = Some(height);
        true
    }
}
