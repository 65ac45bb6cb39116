use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id;
use crate::identity::Email;
use crate::interest::{InterestId, InterestSummary};

/// Unique crop listing identifier (timestamp-prefixed, roughly increasing).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CropId(pub String);

impl CropId {
    pub fn generate() -> Self {
        Self(id::generate("crop"))
    }
}

impl fmt::Display for CropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CropValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("price per unit must be a non-negative number (got {0})")]
    InvalidPrice(f64),
}

/// A seller's listing of produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Crop {
    pub id: CropId,
    pub owner_email: Email,
    pub name: String,
    #[serde(rename = "type")]
    pub crop_type: String,
    pub description: String,
    pub location: String,
    pub unit: String,
    pub price_per_unit: f64,
    pub quantity_available: u32,
    /// Reference to an externally stored image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Mirrors of the interests raised against this crop, in creation order.
    #[serde(default)]
    pub interests: Vec<InterestSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Crop {
    /// Build a new listing with a fresh id and no interests.
    pub fn from_draft(
        owner_email: Email,
        draft: CropDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, CropValidationError> {
        if owner_email.is_empty() {
            return Err(CropValidationError::EmptyField("owner email"));
        }
        draft.validate()?;
        Ok(Crop {
            id: CropId::generate(),
            owner_email,
            name: draft.name.trim().to_string(),
            crop_type: draft.crop_type,
            description: draft.description,
            location: draft.location,
            unit: draft.unit.trim().to_string(),
            price_per_unit: draft.price_per_unit,
            quantity_available: draft.quantity_available,
            image: draft.image,
            interests: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn summary(&self, interest_id: &InterestId) -> Option<&InterestSummary> {
        self.interests.iter().find(|s| s.id == *interest_id)
    }

    /// True if `buyer` already has an undecided interest mirrored on this crop.
    pub fn has_pending_from(&self, buyer: &Email) -> bool {
        self.interests
            .iter()
            .any(|s| s.buyer_email == *buyer && s.status.is_pending())
    }

    /// Apply an owner edit. Returns the previous image reference when the edit
    /// replaced it, so the caller can release the asset.
    pub fn apply_patch(&mut self, patch: &CropPatch, now: DateTime<Utc>) -> Option<String> {
        if let Some(name) = &patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(crop_type) = &patch.crop_type {
            self.crop_type.clone_from(crop_type);
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
        if let Some(location) = &patch.location {
            self.location.clone_from(location);
        }
        if let Some(unit) = &patch.unit {
            self.unit = unit.trim().to_string();
        }
        if let Some(price) = patch.price_per_unit {
            self.price_per_unit = price;
        }
        if let Some(quantity) = patch.quantity_available {
            self.quantity_available = quantity;
        }
        self.updated_at = now;

        match &patch.image {
            Some(image) if self.image.as_ref() != Some(image) => self.image.replace(image.clone()),
            _ => None,
        }
    }
}

/// Owner-supplied fields for a new listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub crop_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub unit: String,
    pub price_per_unit: f64,
    pub quantity_available: u32,
    #[serde(default)]
    pub image: Option<String>,
}

impl CropDraft {
    pub fn validate(&self) -> Result<(), CropValidationError> {
        if self.name.trim().is_empty() {
            return Err(CropValidationError::EmptyField("name"));
        }
        if self.unit.trim().is_empty() {
            return Err(CropValidationError::EmptyField("unit"));
        }
        validate_price(self.price_per_unit)
    }
}

/// Owner edit of a listing. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub crop_type: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub unit: Option<String>,
    pub price_per_unit: Option<f64>,
    pub quantity_available: Option<u32>,
    /// Replacement image reference.
    pub image: Option<String>,
}

impl CropPatch {
    pub fn validate(&self) -> Result<(), CropValidationError> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CropValidationError::EmptyField("name"));
        }
        if self.unit.as_deref().is_some_and(|u| u.trim().is_empty()) {
            return Err(CropValidationError::EmptyField("unit"));
        }
        match self.price_per_unit {
            Some(price) => validate_price(price),
            None => Ok(()),
        }
    }
}

fn validate_price(price: f64) -> Result<(), CropValidationError> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err(CropValidationError::InvalidPrice(price))
    }
}
