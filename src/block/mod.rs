pub mod outgoing;
pub mod register;
pub mod registry;
pub mod service;
pub mod source;
pub mod tracker;

pub use outgoing::{ChannelOutgoing, Outgoing};
pub use registry::{NotificationRegistry, Registration};
pub use service::{BlockHandle, BlockService};
pub use source::HttpBlockSource;
pub use tracker::{BlockOutcome, BlockTracker};
