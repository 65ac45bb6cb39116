use cropmart_common::crop::{CropDraft, CropId};
use cropmart_common::identity::Email;
use cropmart_common::interest::InterestRequest;


pub fn init_tracing() {
    tracing_subscriber::fmt::try_init().ok();
}

/// Deterministic seller identity.
pub fn seller(name: &str) -> Email {
    Email::new(format!("{}@farms.example", name.to_lowercase()))
}

/// Deterministic buyer identity.
pub fn buyer(name: &str) -> Email {
    Email::new(format!("{}@buyers.example", name.to_lowercase()))
}

pub fn make_crop_draft(name: &str, quantity: u32) -> CropDraft {
    CropDraft {
        name: name.to_string(),
        crop_type: "produce".to_string(),
        description: format!("Fresh {name}"),
        location: "Riverina".to_string(),
        unit: "kg".to_string(),
        price_per_unit: 4.5,
        quantity_available: quantity,
        image: Some(format!("img/{}.jpg", name.to_lowercase())),
    }
}

pub fn make_request(crop_id: &CropId, buyer_email: &Email, quantity: i64) -> InterestRequest {
    InterestRequest {
        crop_id: crop_id.clone(),
        buyer_email: buyer_email.clone(),
        buyer_name: buyer_email
            .as_str()
            .split('@')
            .next()
            .unwrap_or("buyer")
            .to_string(),
        quantity_requested: quantity,
        message: Some("Pickup on Saturday?".to_string()),
    }
}
