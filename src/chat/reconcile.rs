use std::cmp::Ordering;
use std::collections::VecDeque;

use super::HistoryWindow;
use crate::common::ChatMessage;

/// What a merge did to the cached transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Cached messages carried over.
    pub kept: usize,
    /// Unseen messages older than the cached tail, persisted in place.
    pub imported: usize,
    /// Unseen messages appended after the cached tail.
    pub appended: usize,
    /// Cached messages the batch no longer contains.
    pub stray: usize,
    /// Batch messages discarded because their timestamp collided with a different cached message.
    pub ambiguous: usize,
    /// The batch was not sorted by date.
    pub unsorted: bool,
}

impl MergeReport {
    pub fn persisted(&self) -> usize {
        self.imported + self.appended
    }
}

impl HistoryWindow {
    /// Reconcile a freshly fetched transcript with the cached one.
    ///
    /// Both sequences are walked by timestamp. Messages only the batch has are
    /// persisted exactly once; cached messages are never persisted again and
    /// never dropped, even when the batch omits them.
    pub async fn merge(&mut self, batch: Vec<ChatMessage>) -> MergeReport {
        let mut report = MergeReport::default();

        if batch.windows(2).any(|pair| pair[0].millis() > pair[1].millis()) {
            log::warn!("Merging chat batch of {} messages that is not sorted", batch.len());
            report.unsorted = true;
        }

        let cached = std::mem::take(&mut self.messages);
        let mut merged = VecDeque::with_capacity(cached.len() + batch.len());
        let mut old = cached.into_iter().peekable();
        let mut new = batch.into_iter().peekable();
        // The batch head lost an equal-timestamp comparison and still waits for its match.
        let mut contested = false;

        loop {
            let (ordering, same) = match (old.peek(), new.peek()) {
                (None, _) => break,
                (Some(_), None) => {
                    let stray: Vec<ChatMessage> = old.by_ref().collect();
                    log::warn!(
                        "Stray cached messages missing from fetched batch: {}",
                        stray.len()
                    );
                    for msg in &stray {
                        log::debug!("Stray message: {msg:?}");
                    }
                    report.stray = stray.len();
                    merged.extend(stray);
                    break;
                }
                (Some(om), Some(nm)) => (om.millis().cmp(&nm.millis()), om == nm),
            };

            match ordering {
                Ordering::Less => {
                    if let Some(om) = old.next() {
                        log::trace!("Merge old message: {om:?}");
                        merged.push_back(om);
                        report.kept += 1;
                    }
                }
                Ordering::Greater => {
                    if let Some(nm) = new.next() {
                        if std::mem::take(&mut contested) {
                            log::debug!("Dropping ambiguous message: {nm:?}");
                            report.ambiguous += 1;
                            continue;
                        }
                        log::debug!("Merge new message: {nm:?}");
                        self.persist(&nm).await;
                        merged.push_back(nm);
                        report.imported += 1;
                    }
                }
                Ordering::Equal if same => {
                    if let Some(om) = old.next() {
                        log::trace!("Merge common message: {om:?}");
                        merged.push_back(om);
                        report.kept += 1;
                    }
                    new.next();
                    contested = false;
                }
                Ordering::Equal => {
                    // Order within one millisecond cannot be recovered; the cache wins.
                    if let Some(om) = old.next() {
                        merged.push_back(om);
                        report.kept += 1;
                    }
                    contested = true;
                }
            }
        }

        self.messages = merged;
        self.evict();

        if contested {
            if let Some(nm) = new.next() {
                log::debug!("Dropping ambiguous message: {nm:?}");
                report.ambiguous += 1;
            }
        }

        let rest: Vec<ChatMessage> = new.collect();
        if !rest.is_empty() {
            log::debug!("Importing {} new messages", rest.len());
        }
        report.appended = rest.len();
        for msg in rest {
            self.append(msg).await;
        }

        if report.ambiguous > 0 {
            log::warn!(
                "Dropped {} fetched messages colliding with cached ones",
                report.ambiguous
            );
        }
        log::debug!("Chat merge finished: {report:?}");
        report
    }
}
