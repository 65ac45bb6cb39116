//! Rebuilding crop summaries from canonical interest records.
//!
//! Reconciliation is idempotent and may run at any time: on demand for one
//! crop, for the crops queued after a failed mirror write, or as a full sweep.

use std::collections::BTreeSet;

use cropmart_common::crop::CropId;
use cropmart_common::interest::InterestSummary;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::store::{CropStore, InterestStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub crop_id: CropId,
    /// The crop no longer exists; its canonical interests were removed.
    pub crop_missing: bool,
    /// The summary list differed from the canonical records and was rewritten.
    pub rewritten: bool,
    pub summaries: usize,
    pub orphans_removed: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.rewritten || self.orphans_removed > 0
    }
}

impl<C: CropStore, I: InterestStore> Engine<C, I> {
    /// Make `crop_id`'s summary list an exact mirror of its canonical interests,
    /// or delete those interests if the crop itself is gone.
    pub async fn reconcile_crop(&self, crop_id: &CropId) -> Result<ReconcileReport, EngineError> {
        let _guard = self.locks.lock(crop_id).await;

        let crop = match self.crops.get(crop_id).await {
            Ok(crop) => crop,
            Err(StoreError::CropNotFound(_)) => {
                let orphans_removed = self.interests.delete_all_for_crop(crop_id).await?;
                if orphans_removed > 0 {
                    warn!(crop_id = %crop_id, orphans_removed, "removed interests of deleted crop");
                }
                self.stale.clear(crop_id);
                self.locks.forget(crop_id);
                return Ok(ReconcileReport {
                    crop_id: crop_id.clone(),
                    crop_missing: true,
                    rewritten: false,
                    summaries: 0,
                    orphans_removed,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let canonical = self.interests.find_by_crop(crop_id).await?;
        let mut summaries: Vec<InterestSummary> = canonical.iter().map(|i| i.summary()).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        // Same records in a different order still count as consistent: the
        // stored order is creation order and may break timestamp ties differently.
        let consistent = crop.interests.len() == summaries.len()
            && summaries.iter().all(|s| crop.interests.contains(s));
        let rewritten = !consistent;
        if rewritten {
            warn!(
                crop_id = %crop_id,
                before = crop.interests.len(),
                after = summaries.len(),
                "summary list out of step with canonical interests; rewriting"
            );
            self.crops
                .replace_summaries(crop_id, summaries.clone())
                .await?;
        } else {
            debug!(crop_id = %crop_id, "summary list consistent");
        }
        self.stale.clear(crop_id);

        Ok(ReconcileReport {
            crop_id: crop_id.clone(),
            crop_missing: false,
            rewritten,
            summaries: summaries.len(),
            orphans_removed: 0,
        })
    }

    /// Crops queued for reconciliation after a failed or interrupted dual write.
    pub fn stale_crops(&self) -> Vec<CropId> {
        self.stale.ids()
    }

    /// Reconcile every queued crop.
    pub async fn reconcile_stale(&self) -> Result<Vec<ReconcileReport>, EngineError> {
        let mut reports = Vec::new();
        for crop_id in self.stale.ids() {
            reports.push(self.reconcile_crop(&crop_id).await?);
        }
        Ok(reports)
    }

    /// Reconcile every crop, plus every crop id still referenced by an interest.
    pub async fn reconcile_all(&self) -> Result<Vec<ReconcileReport>, EngineError> {
        let mut ids: BTreeSet<CropId> = self
            .crops
            .list()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.extend(
            self.interests
                .list()
                .await?
                .into_iter()
                .map(|i| i.crop_id),
        );

        let mut reports = Vec::with_capacity(ids.len());
        for crop_id in ids {
            reports.push(self.reconcile_crop(&crop_id).await?);
        }
        Ok(reports)
    }
}
