use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use super::clock::Clock;
use super::error::MergeError;
use crate::modules::collector::interface::ControlStateStore;
use crate::modules::market::interface::MarketRepository;
use crate::modules::market::model::{Listing, MarketRecord, MergeBatch};
use crate::modules::task::model::TaskKey;

/// Counts for one merge call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// None when the batch was empty and nothing was written.
    pub batch_id: Option<i64>,
    pub inserted: usize,
    pub updated: usize,
}

impl MergeSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Upserts fetched listings into a task's market table with versioning.
pub struct MarketMerger {
    markets: Arc<dyn MarketRepository>,
    store: Arc<dyn ControlStateStore>,
    clock: Arc<dyn Clock>,
    last_batch: AtomicI64,
}

impl MarketMerger {
    pub fn new(
        markets: Arc<dyn MarketRepository>,
        store: Arc<dyn ControlStateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            markets,
            store,
            clock,
            last_batch: AtomicI64::new(0),
        }
    }

    /// Merges `listings` into the table for `key`.
    ///
    /// Known market ids get their mutable fields overwritten and
    /// `data_version` bumped by one; unseen ids are inserted at version 1.
    /// Both sets land in one transaction. A repeated id within the batch is
    /// written once, using its last occurrence.
    pub async fn merge(&self, key: TaskKey, listings: &[Listing]) -> Result<MergeSummary, MergeError> {
        if listings.is_empty() {
            return Ok(MergeSummary::default());
        }

        let listings = dedupe_last_wins(listings);
        let batch_id = self.next_batch_id();
        self.store.set_batch_id(batch_id).await?;

        let ids: Vec<i64> = listings.iter().map(|l| l.id).collect();
        let versions = self.markets.existing_versions(key, &ids).await?;

        let mut batch = MergeBatch::default();
        for listing in listings {
            match versions.get(&listing.id) {
                Some(version) => batch
                    .updates
                    .push(MarketRecord::from_listing(listing, batch_id, version + 1)),
                None => batch
                    .inserts
                    .push(MarketRecord::from_listing(listing, batch_id, 1)),
            }
        }

        self.markets.apply_batch(key, &batch).await?;

        Ok(MergeSummary {
            batch_id: Some(batch_id),
            inserted: batch.inserts.len(),
            updated: batch.updates.len(),
        })
    }

    /// Millisecond timestamp, bumped when needed so ids never repeat or go
    /// backwards within the process.
    fn next_batch_id(&self) -> i64 {
        let now = self.clock.now().timestamp_millis();
        let mut last = self.last_batch.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last_batch
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

fn dedupe_last_wins(listings: &[Listing]) -> Vec<&Listing> {
    let mut position: HashMap<i64, usize> = HashMap::new();
    let mut unique: Vec<&Listing> = Vec::with_capacity(listings.len());

    for listing in listings {
        match position.get(&listing.id) {
            Some(&idx) => unique[idx] = listing,
            None => {
                position.insert(listing.id, unique.len());
                unique.push(listing);
            }
        }
    }
    unique
}
