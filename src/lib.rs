//! Chat history reconciliation and block notifications for a chat bot.
//!
//! [`chat::HistoryWindow`] keeps the recent transcript and merges re-fetched
//! batches into it; [`block::BlockTracker`] follows the chain tip and tells
//! waiting users when a new block is mined. Both run as services that own
//! their state and are driven through cloneable handles.

pub mod block;
pub mod chat;
pub mod common;
pub mod config;
pub mod storage;
