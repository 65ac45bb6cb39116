//! In-process stores backed by [`DashMap`].
//!
//! Each single-record operation runs under the map's shard lock for that key,
//! so it is atomic with respect to every other operation on the same record.
//! Guards are never held across an `.await`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cropmart_common::crop::{Crop, CropId, CropPatch};
use cropmart_common::identity::Email;
use cropmart_common::interest::{Interest, InterestId, InterestStatus, InterestSummary};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{CropStore, InterestStore, QuantityUpdate, StatusUpdate, StoreError};

#[derive(Debug, Clone, Default)]
pub struct MemoryCropStore {
    crops: Arc<DashMap<CropId, Crop>>,
}

impl MemoryCropStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_crops(crops: impl IntoIterator<Item = Crop>) -> Self {
        let store = Self::new();
        for crop in crops {
            store.crops.insert(crop.id.clone(), crop);
        }
        store
    }

    /// Point-in-time copy of every listing, ordered by id.
    pub fn snapshot(&self) -> Vec<Crop> {
        let mut crops: Vec<Crop> = self.crops.iter().map(|e| e.value().clone()).collect();
        crops.sort_by(|a, b| a.id.cmp(&b.id));
        crops
    }

    pub fn len(&self) -> usize {
        self.crops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }

    fn with_crop<T>(
        &self,
        id: &CropId,
        f: impl FnOnce(&mut Crop) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut crop = self
            .crops
            .get_mut(id)
            .ok_or_else(|| StoreError::CropNotFound(id.clone()))?;
        f(crop.value_mut())
    }
}

impl CropStore for MemoryCropStore {
    async fn get(&self, id: &CropId) -> Result<Crop, StoreError> {
        self.crops
            .get(id)
            .map(|c| c.value().clone())
            .ok_or_else(|| StoreError::CropNotFound(id.clone()))
    }

    async fn list(&self) -> Result<Vec<Crop>, StoreError> {
        Ok(self.snapshot())
    }

    async fn insert(&self, crop: Crop) -> Result<(), StoreError> {
        match self.crops.entry(crop.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(crop.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(crop);
                Ok(())
            }
        }
    }

    async fn update_details(
        &self,
        id: &CropId,
        patch: &CropPatch,
        now: DateTime<Utc>,
    ) -> Result<(Crop, Option<String>), StoreError> {
        self.with_crop(id, |crop| {
            let released = crop.apply_patch(patch, now);
            Ok((crop.clone(), released))
        })
    }

    async fn insert_summary(&self, id: &CropId, summary: InterestSummary) -> Result<(), StoreError> {
        self.with_crop(id, |crop| {
            if crop.summary(&summary.id).is_some() {
                return Err(StoreError::Duplicate(summary.id.to_string()));
            }
            crop.interests.push(summary);
            Ok(())
        })
    }

    async fn update_summary_status(
        &self,
        id: &CropId,
        interest_id: &InterestId,
        status: InterestStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_crop(id, |crop| {
            let summary = crop
                .interests
                .iter_mut()
                .find(|s| s.id == *interest_id)
                .ok_or_else(|| StoreError::InterestNotFound(interest_id.clone()))?;
            summary.status = status;
            summary.updated_at = updated_at;
            Ok(())
        })
    }

    async fn remove_summary(&self, id: &CropId, interest_id: &InterestId) -> Result<bool, StoreError> {
        self.with_crop(id, |crop| {
            let before = crop.interests.len();
            crop.interests.retain(|s| s.id != *interest_id);
            Ok(crop.interests.len() != before)
        })
    }

    async fn replace_summaries(
        &self,
        id: &CropId,
        summaries: Vec<InterestSummary>,
    ) -> Result<(), StoreError> {
        self.with_crop(id, |crop| {
            crop.interests = summaries;
            Ok(())
        })
    }

    async fn compare_and_set_quantity(
        &self,
        id: &CropId,
        expected: u32,
        new: u32,
    ) -> Result<QuantityUpdate, StoreError> {
        self.with_crop(id, |crop| {
            if crop.quantity_available != expected {
                return Ok(QuantityUpdate::Mismatch {
                    current: crop.quantity_available,
                });
            }
            crop.quantity_available = new;
            crop.updated_at = Utc::now();
            Ok(QuantityUpdate::Applied)
        })
    }

    async fn delete(&self, id: &CropId) -> Result<bool, StoreError> {
        Ok(self.crops.remove(id).is_some())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryInterestStore {
    interests: Arc<DashMap<InterestId, Interest>>,
}

impl MemoryInterestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_interests(interests: impl IntoIterator<Item = Interest>) -> Self {
        let store = Self::new();
        for interest in interests {
            store.interests.insert(interest.id.clone(), interest);
        }
        store
    }

    /// Point-in-time copy of every record, oldest first.
    pub fn snapshot(&self) -> Vec<Interest> {
        self.collect(|_| true)
    }

    pub fn len(&self) -> usize {
        self.interests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interests.is_empty()
    }

    fn collect(&self, predicate: impl Fn(&Interest) -> bool) -> Vec<Interest> {
        let mut found: Vec<Interest> = self
            .interests
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        found
    }
}

impl InterestStore for MemoryInterestStore {
    async fn get(&self, id: &InterestId) -> Result<Interest, StoreError> {
        self.interests
            .get(id)
            .map(|i| i.value().clone())
            .ok_or_else(|| StoreError::InterestNotFound(id.clone()))
    }

    async fn list(&self) -> Result<Vec<Interest>, StoreError> {
        Ok(self.snapshot())
    }

    async fn find_by_crop(&self, crop_id: &CropId) -> Result<Vec<Interest>, StoreError> {
        Ok(self.collect(|i| i.crop_id == *crop_id))
    }

    async fn find_by_buyer(&self, buyer: &Email) -> Result<Vec<Interest>, StoreError> {
        Ok(self.collect(|i| i.buyer_email == *buyer))
    }

    async fn insert(&self, interest: Interest) -> Result<(), StoreError> {
        match self.interests.entry(interest.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(interest.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(interest);
                Ok(())
            }
        }
    }

    async fn update_status(
        &self,
        id: &InterestId,
        expected: InterestStatus,
        status: InterestStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<StatusUpdate, StoreError> {
        let mut entry = self
            .interests
            .get_mut(id)
            .ok_or_else(|| StoreError::InterestNotFound(id.clone()))?;
        let interest = entry.value_mut();
        if interest.status != expected {
            return Ok(StatusUpdate::Mismatch {
                current: interest.status,
            });
        }
        interest.status = status;
        interest.updated_at = updated_at;
        Ok(StatusUpdate::Applied(interest.clone()))
    }

    async fn delete(&self, id: &InterestId) -> Result<bool, StoreError> {
        Ok(self.interests.remove(id).is_some())
    }

    async fn delete_all_for_crop(&self, crop_id: &CropId) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.interests.retain(|_, i| {
            let keep = i.crop_id != *crop_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
