pub mod commands;
pub mod events;
pub mod time;
pub mod types;

pub use commands::{BlockCommand, HistoryCommand, ServiceError};
pub use events::FeedEvent;
pub use types::{BlockEvent, BlockInfo, ChatMessage, MessageType, OutgoingMessage};
