pub mod history;
pub mod reconcile;
pub mod service;

pub use history::HistoryWindow;
pub use reconcile::MergeReport;
pub use service::{HistoryHandle, HistoryService};
