use std::sync::Arc;

use chrono::Utc;
use cropmart_common::crop::{Crop, CropDraft, CropId, CropPatch};
use cropmart_common::identity::Email;
use cropmart_common::interest::{Interest, InterestId, InterestRequest, InterestStatus};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, RecordKind};
use crate::locks::{CropLocks, MirrorWrite, StaleCrops};
use crate::store::{CropStore, InterestStore, StatusUpdate, StoreError};

/// Result of an owner edit.
#[derive(Debug, Clone)]
pub struct CropUpdate {
    pub crop: Crop,
    /// Image reference the edit replaced; the caller releases the asset.
    pub released_image: Option<String>,
}

/// Result of deleting a listing.
#[derive(Debug, Clone)]
pub struct DeletedCrop {
    pub crop: Crop,
    pub interests_removed: usize,
}

/// Orchestrates every write that touches interests.
///
/// Mutating operations on one crop are serialized through a per-crop lock
/// and re-validate against a fresh read taken under that lock. Writes go to
/// the canonical [`InterestStore`] before the crop's embedded summaries.
///
/// Engines handed out by one [`Database`](crate::Database) share their lock
/// table and stale queue. Status transitions and quantity draws are also
/// conditional at the store, so engines that share nothing but the stores
/// still decide each interest once.
pub struct Engine<C, I> {
    pub(crate) crops: C,
    pub(crate) interests: I,
    pub(crate) config: EngineConfig,
    pub(crate) locks: Arc<CropLocks>,
    pub(crate) stale: Arc<StaleCrops>,
}

impl<C: CropStore, I: InterestStore> Engine<C, I> {
    pub fn new(crops: C, interests: I, config: EngineConfig) -> Self {
        Self::with_coordination(
            crops,
            interests,
            config,
            Arc::default(),
            Arc::default(),
        )
    }

    pub(crate) fn with_coordination(
        crops: C,
        interests: I,
        config: EngineConfig,
        locks: Arc<CropLocks>,
        stale: Arc<StaleCrops>,
    ) -> Self {
        Self {
            crops,
            interests,
            config,
            locks,
            stale,
        }
    }

    pub fn crop_store(&self) -> &C {
        &self.crops
    }

    pub fn interest_store(&self) -> &I {
        &self.interests
    }

    // ─── Crops ──────────────────────────────────────────────────────────────

    pub async fn create_crop(&self, owner: &Email, draft: CropDraft) -> Result<Crop, EngineError> {
        let crop = Crop::from_draft(owner.clone(), draft, Utc::now())?;
        self.crops.insert(crop.clone()).await?;
        info!(crop_id = %crop.id, owner = %owner, "crop listed");
        Ok(crop)
    }

    pub async fn get_crop(&self, crop_id: &CropId) -> Result<Crop, EngineError> {
        Ok(self.crops.get(crop_id).await?)
    }

    pub async fn list_crops(&self) -> Result<Vec<Crop>, EngineError> {
        Ok(self.crops.list().await?)
    }

    /// Owner edit of a listing's details, price, quantity or image.
    pub async fn update_crop(
        &self,
        crop_id: &CropId,
        acting: &Email,
        patch: CropPatch,
    ) -> Result<CropUpdate, EngineError> {
        patch.validate()?;
        let crop = self.crops.get(crop_id).await?;
        Self::ensure_owner(&crop, acting, "edit")?;

        let _guard = self.locks.lock(crop_id).await;
        let (crop, released_image) = self
            .crops
            .update_details(crop_id, &patch, Utc::now())
            .await?;
        debug!(crop_id = %crop_id, released = ?released_image, "crop updated");
        Ok(CropUpdate {
            crop,
            released_image,
        })
    }

    /// Remove a listing and cascade to every interest raised against it.
    pub async fn delete_crop(
        &self,
        crop_id: &CropId,
        acting: &Email,
    ) -> Result<DeletedCrop, EngineError> {
        let crop = self.crops.get(crop_id).await?;
        Self::ensure_owner(&crop, acting, "delete")?;

        let _guard = self.locks.lock(crop_id).await;
        let crop = self.crops.get(crop_id).await?;

        // Marked up front: if the cascade fails or is cut short, reconciliation
        // sweeps the orphans.
        let write = self.stale.begin(crop_id);
        if !self.crops.delete(crop_id).await? {
            return Err(EngineError::crop_not_found(crop_id));
        }
        let interests_removed = match self.interests.delete_all_for_crop(crop_id).await {
            Ok(removed) => {
                write.done();
                removed
            }
            Err(err) => {
                write.failed("cascade interests", &err);
                0
            }
        };
        self.locks.forget(crop_id);

        info!(crop_id = %crop_id, interests_removed, "crop deleted");
        Ok(DeletedCrop {
            crop,
            interests_removed,
        })
    }

    // ─── Interests ──────────────────────────────────────────────────────────

    /// Raise a buyer's interest in a crop.
    ///
    /// The checks run once against a plain read so hopeless requests fail fast,
    /// then again under the crop lock right before the writes.
    pub async fn create_interest(&self, request: InterestRequest) -> Result<Interest, EngineError> {
        let crop = self.crops.get(&request.crop_id).await?;
        Self::validate_request(&crop, &request)?;

        let _guard = self.locks.lock(&crop.id).await;
        let crop = self.crops.get(&request.crop_id).await?;
        let quantity = Self::validate_request(&crop, &request)?;
        let canonical_pending = self
            .interests
            .find_by_crop(&crop.id)
            .await?
            .iter()
            .any(|i| i.buyer_email == request.buyer_email && i.status.is_pending());
        if canonical_pending {
            return Err(Self::duplicate_pending(&crop, &request.buyer_email));
        }

        let now = Utc::now();
        let interest = Interest {
            id: InterestId::generate(),
            crop_id: crop.id.clone(),
            buyer_email: request.buyer_email,
            seller_email: crop.owner_email.clone(),
            buyer_name: request.buyer_name.trim().to_string(),
            quantity_requested: quantity,
            message: request.message.filter(|m| !m.trim().is_empty()),
            status: InterestStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let write = self.stale.begin(&crop.id);
        self.interests.insert(interest.clone()).await?;
        match self.crops.insert_summary(&crop.id, interest.summary()).await {
            Ok(()) => write.done(),
            Err(err) => write.failed("insert summary", &err),
        }

        debug!(
            interest_id = %interest.id,
            crop_id = %crop.id,
            buyer = %interest.buyer_email,
            quantity,
            "interest created"
        );
        Ok(interest)
    }

    /// Seller decision on a pending interest. Acceptance draws the requested
    /// quantity down from the crop, floored at zero.
    ///
    /// The canonical transition is conditional on the interest still being
    /// pending, and the quantity is drawn only once that transition has won.
    /// If the draw fails the transition is rolled back and nothing changes.
    pub async fn update_interest_status(
        &self,
        interest_id: &InterestId,
        new_status: InterestStatus,
        acting: &Email,
    ) -> Result<Interest, EngineError> {
        let interest = self.interests.get(interest_id).await?;
        if *acting != interest.seller_email {
            return Err(EngineError::Forbidden(format!(
                "only the seller of interest {interest_id} may decide it"
            )));
        }
        Self::ensure_transition(interest.status, new_status)?;

        let _guard = self.locks.lock(&interest.crop_id).await;
        let interest = self.interests.get(interest_id).await?;
        Self::ensure_transition(interest.status, new_status)?;
        let crop = self.crops.get(&interest.crop_id).await.map_err(|err| match err {
            StoreError::CropNotFound(_) => EngineError::NotFound {
                kind: RecordKind::Crop,
                id: format!("{} (referenced by interest {interest_id})", interest.crop_id),
            },
            other => other.into(),
        })?;

        let now = Utc::now();
        let write = self.stale.begin(&crop.id);
        let updated = match self
            .interests
            .update_status(interest_id, interest.status, new_status, now)
            .await?
        {
            StatusUpdate::Applied(updated) => updated,
            StatusUpdate::Mismatch { current } => {
                write.done();
                return Err(EngineError::InvalidTransition {
                    from: current,
                    to: new_status,
                });
            }
        };

        if new_status == InterestStatus::Accepted {
            match self
                .crops
                .decrement_quantity(
                    &crop.id,
                    interest.quantity_requested,
                    self.config.max_quantity_retries,
                )
                .await
            {
                Ok(remaining) => debug!(crop_id = %crop.id, remaining, "quantity drawn down"),
                Err(err) => {
                    self.roll_back_status(&interest, new_status, write, &err).await;
                    return Err(err.into());
                }
            }
        }

        match self
            .crops
            .update_summary_status(&crop.id, interest_id, new_status, now)
            .await
        {
            Ok(()) => write.done(),
            Err(err) => write.failed("update summary status", &err),
        }

        debug!(interest_id = %interest_id, status = %new_status, "interest decided");
        Ok(updated)
    }

    /// Put a transitioned interest back to its prior status and timestamp
    /// after the quantity draw failed.
    async fn roll_back_status(
        &self,
        prior: &Interest,
        applied: InterestStatus,
        write: MirrorWrite<'_>,
        cause: &StoreError,
    ) {
        match self
            .interests
            .update_status(&prior.id, applied, prior.status, prior.updated_at)
            .await
        {
            Ok(StatusUpdate::Applied(_)) => {
                warn!(interest_id = %prior.id, error = %cause, "quantity draw failed; decision rolled back");
                write.done();
            }
            Ok(StatusUpdate::Mismatch { current }) => {
                write.failed("roll back status", &format!("{cause}; status moved to {current}"));
            }
            Err(err) => write.failed("roll back status", &format!("{cause}; {err}")),
        }
    }

    /// Buyer withdrawal of an interest, whatever its status. Quantity drawn
    /// down by an earlier acceptance is not restored.
    pub async fn delete_interest(
        &self,
        interest_id: &InterestId,
        acting: &Email,
    ) -> Result<Interest, EngineError> {
        let interest = self.interests.get(interest_id).await?;
        if *acting != interest.buyer_email {
            return Err(EngineError::Forbidden(format!(
                "only the buyer of interest {interest_id} may withdraw it"
            )));
        }

        let _guard = self.locks.lock(&interest.crop_id).await;
        let interest = self.interests.get(interest_id).await?;

        let write = self.stale.begin(&interest.crop_id);
        if !self.interests.delete(interest_id).await? {
            write.done();
            return Err(EngineError::interest_not_found(interest_id));
        }
        match self.crops.remove_summary(&interest.crop_id, interest_id).await {
            // A vanished crop carries no summaries to remove.
            Ok(_) | Err(StoreError::CropNotFound(_)) => write.done(),
            Err(err) => write.failed("remove summary", &err),
        }

        debug!(interest_id = %interest_id, crop_id = %interest.crop_id, "interest withdrawn");
        Ok(interest)
    }

    /// The buyer's own interests, oldest first.
    pub async fn interests_for_buyer(&self, buyer: &Email) -> Result<Vec<Interest>, EngineError> {
        Ok(self.interests.find_by_buyer(buyer).await?)
    }

    /// Canonical interests raised against a crop, visible to its owner only.
    pub async fn interests_for_crop(
        &self,
        crop_id: &CropId,
        acting: &Email,
    ) -> Result<Vec<Interest>, EngineError> {
        let crop = self.crops.get(crop_id).await?;
        Self::ensure_owner(&crop, acting, "view interests on")?;
        Ok(self.interests.find_by_crop(crop_id).await?)
    }

    // ─── Checks ─────────────────────────────────────────────────────────────

    fn ensure_owner(crop: &Crop, acting: &Email, action: &str) -> Result<(), EngineError> {
        if *acting == crop.owner_email {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!(
                "only the owner may {action} crop {}",
                crop.id
            )))
        }
    }

    fn ensure_transition(from: InterestStatus, to: InterestStatus) -> Result<(), EngineError> {
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition { from, to })
        }
    }

    /// Check a request against a crop and return the requested quantity.
    fn validate_request(crop: &Crop, request: &InterestRequest) -> Result<u32, EngineError> {
        if request.buyer_email == crop.owner_email {
            return Err(EngineError::Forbidden(format!(
                "owner cannot raise an interest in their own crop {}",
                crop.id
            )));
        }
        if request.buyer_name.trim().is_empty() {
            return Err(EngineError::InvalidArgument("buyer name must not be empty".into()));
        }
        if request.quantity_requested < 1 {
            return Err(EngineError::InvalidArgument(format!(
                "quantity requested must be at least 1 (got {})",
                request.quantity_requested
            )));
        }
        let quantity = u32::try_from(request.quantity_requested)
            .ok()
            .filter(|q| *q <= crop.quantity_available)
            .ok_or_else(|| {
                EngineError::InvalidArgument(format!(
                    "quantity requested {} exceeds the {} available",
                    request.quantity_requested, crop.quantity_available
                ))
            })?;
        if crop.has_pending_from(&request.buyer_email) {
            return Err(Self::duplicate_pending(crop, &request.buyer_email));
        }
        Ok(quantity)
    }

    fn duplicate_pending(crop: &Crop, buyer: &Email) -> EngineError {
        EngineError::Conflict(format!(
            "{buyer} already has a pending interest in crop {}",
            crop.id
        ))
    }
}
