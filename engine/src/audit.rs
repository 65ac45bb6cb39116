//! Read-only invariant check over a full copy of both stores.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use cropmart_common::crop::{Crop, CropId};
use cropmart_common::identity::Email;
use cropmart_common::interest::{Interest, InterestId};
use serde::Serialize;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::store::{CropStore, InterestStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A canonical interest whose crop does not exist.
    OrphanedInterest {
        interest_id: InterestId,
        crop_id: CropId,
    },
    /// A canonical interest with no summary on its crop.
    MissingSummary {
        interest_id: InterestId,
        crop_id: CropId,
    },
    /// A summary with no canonical interest behind it.
    UnbackedSummary {
        interest_id: InterestId,
        crop_id: CropId,
    },
    /// The same interest mirrored more than once on a crop.
    DuplicateSummary {
        interest_id: InterestId,
        crop_id: CropId,
    },
    /// Summary fields differ from the canonical record.
    SummaryMismatch {
        interest_id: InterestId,
        crop_id: CropId,
    },
    /// A buyer holds several pending interests in one crop.
    DuplicatePending { crop_id: CropId, buyer: Email },
    /// Buyer and seller are the same account.
    SelfInterest { interest_id: InterestId },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::OrphanedInterest {
                interest_id,
                crop_id,
            } => write!(f, "interest {interest_id} references missing crop {crop_id}"),
            Violation::MissingSummary {
                interest_id,
                crop_id,
            } => write!(f, "interest {interest_id} has no summary on crop {crop_id}"),
            Violation::UnbackedSummary {
                interest_id,
                crop_id,
            } => write!(f, "crop {crop_id} mirrors unknown interest {interest_id}"),
            Violation::DuplicateSummary {
                interest_id,
                crop_id,
            } => write!(f, "crop {crop_id} mirrors interest {interest_id} more than once"),
            Violation::SummaryMismatch {
                interest_id,
                crop_id,
            } => write!(f, "crop {crop_id} summary of interest {interest_id} is out of date"),
            Violation::DuplicatePending { crop_id, buyer } => {
                write!(f, "{buyer} holds several pending interests in crop {crop_id}")
            }
            Violation::SelfInterest { interest_id } => {
                write!(f, "interest {interest_id} was raised by the crop's own seller")
            }
        }
    }
}

/// Every invariant violation between `crops` and `interests`.
///
/// Quantity bounds need no check here: the stored quantity is unsigned.
pub fn audit(crops: &[Crop], interests: &[Interest]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let by_crop: HashMap<&CropId, &Crop> = crops.iter().map(|c| (&c.id, c)).collect();
    let by_id: HashMap<&InterestId, &Interest> = interests.iter().map(|i| (&i.id, i)).collect();

    for interest in interests {
        if interest.buyer_email == interest.seller_email {
            violations.push(Violation::SelfInterest {
                interest_id: interest.id.clone(),
            });
        }
        let Some(crop) = by_crop.get(&interest.crop_id) else {
            violations.push(Violation::OrphanedInterest {
                interest_id: interest.id.clone(),
                crop_id: interest.crop_id.clone(),
            });
            continue;
        };
        match crop.summary(&interest.id) {
            None => violations.push(Violation::MissingSummary {
                interest_id: interest.id.clone(),
                crop_id: crop.id.clone(),
            }),
            Some(summary) if !interest.is_mirrored_by(summary) => {
                violations.push(Violation::SummaryMismatch {
                    interest_id: interest.id.clone(),
                    crop_id: crop.id.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for crop in crops {
        let mut seen: BTreeMap<&InterestId, usize> = BTreeMap::new();
        for summary in &crop.interests {
            *seen.entry(&summary.id).or_default() += 1;
            let backed = by_id
                .get(&summary.id)
                .is_some_and(|i| i.crop_id == crop.id);
            if !backed {
                violations.push(Violation::UnbackedSummary {
                    interest_id: summary.id.clone(),
                    crop_id: crop.id.clone(),
                });
            }
        }
        for (interest_id, count) in seen {
            if count > 1 {
                violations.push(Violation::DuplicateSummary {
                    interest_id: interest_id.clone(),
                    crop_id: crop.id.clone(),
                });
            }
        }
    }

    let mut pending: BTreeMap<(&CropId, &Email), usize> = BTreeMap::new();
    for interest in interests.iter().filter(|i| i.status.is_pending()) {
        *pending
            .entry((&interest.crop_id, &interest.buyer_email))
            .or_default() += 1;
    }
    for ((crop_id, buyer), count) in pending {
        if count > 1 {
            violations.push(Violation::DuplicatePending {
                crop_id: crop_id.clone(),
                buyer: buyer.clone(),
            });
        }
    }

    violations
}

impl<C: CropStore, I: InterestStore> Engine<C, I> {
    /// Audit the engine's stores as they stand.
    pub async fn audit(&self) -> Result<Vec<Violation>, EngineError> {
        let interests = self.interests.list().await?;
        let crops = self.crops.list().await?;
        Ok(audit(&crops, &interests))
    }
}
