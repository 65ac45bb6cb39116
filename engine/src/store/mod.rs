//! Storage collaborators.
//!
//! Both traits are keyed adapters with no notion of ownership; authorization
//! is decided by the engine before any of these are called. Any backend that
//! supports point lookup, append/remove on a crop's summary list, a
//! conditional numeric update and delete can implement them.

pub mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};
use cropmart_common::crop::{Crop, CropId, CropPatch};
use cropmart_common::identity::Email;
use cropmart_common::interest::{Interest, InterestId, InterestStatus, InterestSummary};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("crop {0} not found")]
    CropNotFound(CropId),

    #[error("interest {0} not found")]
    InterestNotFound(InterestId),

    #[error("record {0} already exists")]
    Duplicate(String),

    #[error("quantity of crop {crop_id} still contended after {attempts} attempts")]
    Contended { crop_id: CropId, attempts: u32 },

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Outcome of a conditional quantity write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityUpdate {
    Applied,
    /// The stored quantity no longer matched the expected value; nothing was written.
    Mismatch { current: u32 },
}

/// Outcome of a conditional status write.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// The record as stored after the write.
    Applied(Interest),
    /// The stored status no longer matched the expected one; nothing was written.
    Mismatch { current: InterestStatus },
}

/// Crop listings together with their embedded interest summaries.
pub trait CropStore: Send + Sync {
    fn get(&self, id: &CropId) -> impl Future<Output = Result<Crop, StoreError>> + Send;

    fn list(&self) -> impl Future<Output = Result<Vec<Crop>, StoreError>> + Send;

    fn insert(&self, crop: Crop) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Apply an owner edit atomically. Returns the updated crop and the image
    /// reference the edit replaced, if any.
    fn update_details(
        &self,
        id: &CropId,
        patch: &CropPatch,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<(Crop, Option<String>), StoreError>> + Send;

    /// Append a summary to the end of the crop's interest list.
    fn insert_summary(
        &self,
        id: &CropId,
        summary: InterestSummary,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fails with [`StoreError::InterestNotFound`] when the crop carries no
    /// summary with that id.
    fn update_summary_status(
        &self,
        id: &CropId,
        interest_id: &InterestId,
        status: InterestStatus,
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns whether a summary was removed.
    fn remove_summary(
        &self,
        id: &CropId,
        interest_id: &InterestId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Overwrite the whole summary list. Used by reconciliation.
    fn replace_summaries(
        &self,
        id: &CropId,
        summaries: Vec<InterestSummary>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Write `new` only if the stored quantity still equals `expected`.
    fn compare_and_set_quantity(
        &self,
        id: &CropId,
        expected: u32,
        new: u32,
    ) -> impl Future<Output = Result<QuantityUpdate, StoreError>> + Send;

    /// Returns whether the crop existed.
    fn delete(&self, id: &CropId) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Subtract `amount` from the available quantity, flooring at zero, and
    /// return the new quantity.
    ///
    /// Built on [`CropStore::compare_and_set_quantity`]: a lost race re-reads
    /// and retries up to `max_retries` times after the first attempt before
    /// giving up with [`StoreError::Contended`].
    fn decrement_quantity(
        &self,
        id: &CropId,
        amount: u32,
        max_retries: u32,
    ) -> impl Future<Output = Result<u32, StoreError>> + Send {
        async move {
            let attempts = max_retries.saturating_add(1);
            let mut expected = self.get(id).await?.quantity_available;
            for _ in 0..attempts {
                let next = expected.saturating_sub(amount);
                match self.compare_and_set_quantity(id, expected, next).await? {
                    QuantityUpdate::Applied => return Ok(next),
                    QuantityUpdate::Mismatch { current } => expected = current,
                }
            }
            Err(StoreError::Contended {
                crop_id: id.clone(),
                attempts,
            })
        }
    }
}

/// Canonical interest records.
pub trait InterestStore: Send + Sync {
    fn get(&self, id: &InterestId) -> impl Future<Output = Result<Interest, StoreError>> + Send;

    fn list(&self) -> impl Future<Output = Result<Vec<Interest>, StoreError>> + Send;

    fn find_by_crop(
        &self,
        crop_id: &CropId,
    ) -> impl Future<Output = Result<Vec<Interest>, StoreError>> + Send;

    fn find_by_buyer(
        &self,
        buyer: &Email,
    ) -> impl Future<Output = Result<Vec<Interest>, StoreError>> + Send;

    fn insert(&self, interest: Interest) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Write `status` only if the stored status still equals `expected`.
    fn update_status(
        &self,
        id: &InterestId,
        expected: InterestStatus,
        status: InterestStatus,
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<StatusUpdate, StoreError>> + Send;

    /// Returns whether the record existed.
    fn delete(&self, id: &InterestId) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Returns the number of records removed.
    fn delete_all_for_crop(
        &self,
        crop_id: &CropId,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;
}
