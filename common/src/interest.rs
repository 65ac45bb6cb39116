use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crop::CropId;
use crate::id;
use crate::identity::Email;

/// Unique interest identifier, shared by the canonical record and its mirror.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterestId(pub String);

impl InterestId {
    pub fn generate() -> Self {
        Self(id::generate("interest"))
    }
}

impl fmt::Display for InterestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a buyer's interest stands with the seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InterestStatus {
    pub fn is_pending(self) -> bool {
        self == InterestStatus::Pending
    }

    /// Returns true if transitioning from self to `next` is valid.
    ///
    /// Only an undecided interest may be decided, and only once.
    pub fn can_transition_to(self, next: InterestStatus) -> bool {
        matches!(
            (self, next),
            (InterestStatus::Pending, InterestStatus::Accepted)
                | (InterestStatus::Pending, InterestStatus::Rejected)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InterestStatus::Pending => "pending",
            InterestStatus::Accepted => "accepted",
            InterestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for InterestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Canonical record of a buyer's request to purchase from a crop listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interest {
    pub id: InterestId,
    pub crop_id: CropId,
    pub buyer_email: Email,
    /// Copy of the crop owner's email taken at creation time.
    pub seller_email: Email,
    pub buyer_name: String,
    pub quantity_requested: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: InterestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Interest {
    /// The denormalized copy embedded in the crop listing.
    pub fn summary(&self) -> InterestSummary {
        InterestSummary {
            id: self.id.clone(),
            buyer_email: self.buyer_email.clone(),
            buyer_name: self.buyer_name.clone(),
            quantity_requested: self.quantity_requested,
            message: self.message.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// True when `summary` mirrors this record field for field.
    pub fn is_mirrored_by(&self, summary: &InterestSummary) -> bool {
        self.summary() == *summary
    }
}

/// Read-optimized mirror of an [`Interest`], embedded in its crop's listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestSummary {
    pub id: InterestId,
    pub buyer_email: Email,
    pub buyer_name: String,
    pub quantity_requested: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: InterestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Arguments for raising a new interest, as forwarded by the request layer.
///
/// `quantity_requested` is signed so that out-of-range input reaches the engine
/// and is rejected there rather than wrapping at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestRequest {
    pub crop_id: CropId,
    pub buyer_email: Email,
    pub buyer_name: String,
    pub quantity_requested: i64,
    #[serde(default)]
    pub message: Option<String>,
}
