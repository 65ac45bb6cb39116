use std::sync::Arc;

use cropmart_common::crop::CropId;
use dashmap::{DashMap, DashSet};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

/// Per-crop async locks serializing the engine's mutating operations.
#[derive(Debug, Default)]
pub(crate) struct CropLocks {
    locks: DashMap<CropId, Arc<Mutex<()>>>,
}

impl CropLocks {
    pub(crate) async fn lock(&self, id: &CropId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(id.clone()).or_default().value().clone();
        lock.lock_owned().await
    }

    /// Drop the lock entry of a deleted crop. Holders and waiters keep their
    /// own handle and will find the crop gone when they re-read it.
    pub(crate) fn forget(&self, id: &CropId) {
        self.locks.remove(id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Crops whose summary list may disagree with the canonical records.
#[derive(Debug, Default)]
pub(crate) struct StaleCrops {
    crops: DashSet<CropId>,
}

impl StaleCrops {
    /// Mark `id` stale ahead of a dual write.
    pub(crate) fn begin(&self, id: &CropId) -> MirrorWrite<'_> {
        MirrorWrite {
            stale: self,
            crop_id: id.clone(),
            marked_here: self.crops.insert(id.clone()),
        }
    }

    pub(crate) fn clear(&self, id: &CropId) {
        self.crops.remove(id);
    }

    pub(crate) fn ids(&self) -> Vec<CropId> {
        let mut ids: Vec<CropId> = self.crops.iter().map(|id| id.key().clone()).collect();
        ids.sort();
        ids
    }

    pub(crate) fn contains(&self, id: &CropId) -> bool {
        self.crops.contains(id)
    }
}

/// An in-flight dual write. The crop stays marked stale unless the mirror
/// write is reported done, so a failed or cancelled operation is picked up by
/// reconciliation.
pub(crate) struct MirrorWrite<'a> {
    stale: &'a StaleCrops,
    crop_id: CropId,
    marked_here: bool,
}

impl MirrorWrite<'_> {
    pub(crate) fn done(self) {
        // A mark left by an earlier failure belongs to reconciliation.
        if self.marked_here {
            self.stale.clear(&self.crop_id);
        }
    }

    pub(crate) fn failed(self, action: &str, err: &dyn std::fmt::Display) {
        warn!(
            crop_id = %self.crop_id,
            action,
            error = %err,
            "mirror write failed after canonical write; crop queued for reconciliation"
        );
    }
}
