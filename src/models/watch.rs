use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The mutable, client-supplied part of a watch.
///
/// Doubles as the create request body: absent fields fall back to their
/// zero values and are then caught by validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(default, deny_unknown_fields)]
pub struct WatchAttributes {
    pub brand: String,
    pub model: String,
    pub dial_color: String,
    pub strap_type: String,
    /// Case diameter in millimetres
    pub diameter: i16,
    pub energy: String,
    pub gender: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image_url: String,
}

/// A catalog record as stored.
///
/// `id`, `created_at` and `version` are assigned by the store. `version`
/// starts at 1 and grows by exactly one per successful update.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Watch {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub attributes: WatchAttributes,
    pub version: i32,
}

/// Partial update body for `PATCH /v1/watches/{id}`.
///
/// Only fields present in the JSON are merged into the stored record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateWatchRequest {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub dial_color: Option<String>,
    pub strap_type: Option<String>,
    pub diameter: Option<i16>,
    pub energy: Option<String>,
    pub gender: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    pub image_url: Option<String>,
}

impl UpdateWatchRequest {
    /// Merge the provided fields into `target`, leaving the rest untouched.
    pub fn apply(self, target: &mut WatchAttributes) {
        if let Some(brand) = self.brand {
            target.brand = brand;
        }
        if let Some(model) = self.model {
            target.model = model;
        }
        if let Some(dial_color) = self.dial_color {
            target.dial_color = dial_color;
        }
        if let Some(strap_type) = self.strap_type {
            target.strap_type = strap_type;
        }
        if let Some(diameter) = self.diameter {
            target.diameter = diameter;
        }
        if let Some(energy) = self.energy {
            target.energy = energy;
        }
        if let Some(gender) = self.gender {
            target.gender = gender;
        }
        if let Some(price) = self.price {
            target.price = price;
        }
        if let Some(image_url) = self.image_url {
            target.image_url = image_url;
        }
    }
}
