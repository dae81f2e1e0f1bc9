use tokio::sync::mpsc;

use crate::common::OutgoingMessage;

/// Fire-and-forget delivery of a line to a chat channel.
pub trait Outgoing: Send + Sync {
    fn send(&self, text: &str, channel: &str);
}

/// [`Outgoing`] that queues lines for whoever owns the platform connection.
#[derive(Clone)]
pub struct ChannelOutgoing {
    sender: mpsc::Sender<OutgoingMessage>,
}

impl ChannelOutgoing {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutgoingMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl Outgoing for ChannelOutgoing {
    fn send(&self, text: &str, channel: &str) {
        let message = OutgoingMessage {
            channel: channel.to_string(),
            text: text.to_string(),
        };
        if let Err(err) = self.sender.try_send(message) {
            log::warn!("Dropping outgoing message for {channel}: {err}");
        }
    }
}
