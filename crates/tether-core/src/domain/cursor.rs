//! Sync cursor - last successful pull position per collection

use serde::{Deserialize, Serialize};

use super::newtypes::{CollectionName, Timestamp};

/// Highest server `updatedAt` fully pulled for a collection
///
/// The cursor only moves forward: [`SyncCursor::advance`] ignores any
/// candidate that is not greater than the current position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub collection: CollectionName,
    pub last_sync_at: Timestamp,
}

impl SyncCursor {
    /// Cursor for a collection that has never been pulled
    pub fn initial(collection: CollectionName) -> Self {
        Self {
            collection,
            last_sync_at: Timestamp::EPOCH,
        }
    }

    /// Move the cursor to `candidate` if it is newer; returns true if it moved
    pub fn advance(&mut self, candidate: Timestamp) -> bool {
        if candidate > self.last_sync_at {
            self.last_sync_at = candidate;
            true
        } else {
            false
        }
    }
}
