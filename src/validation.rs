//! Field-level validation that accumulates every violation in one pass.
//!
//! A [`Validator`] collects `field -> message` pairs; callers run all rules
//! and then turn the accumulator into a result with [`Validator::into_result`].
//! The first message recorded for a field wins.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};
use crate::models::WatchAttributes;

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length, in bytes, of any descriptive text field on a watch.
pub const MAX_FIELD_BYTES: usize = 500;

/// Prices are stored as `numeric(12, 2)`.
pub const PRICE_DECIMAL_PLACES: u32 = 2;

/// Exclusive upper bound on `price` (ten integer digits).
pub const MAX_PRICE_EXCLUSIVE: i64 = 10_000_000_000;

/// Accepted values for `gender` (compared case-insensitively).
pub const PERMITTED_GENDERS: [&str; 2] = ["male", "female"];

/// Field name to message, ordered by field name.
pub type ValidationErrors = BTreeMap<String, String>;

/// Accumulator for field violations.
#[derive(Debug, Default, Clone)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no rule has failed so far.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record `message` for `key` unless the field already has one.
    pub fn add_error(&mut self, key: &str, message: impl Into<String>) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.into());
    }

    /// Record `message` for `key` when `ok` is false.
    pub fn check(&mut self, ok: bool, key: &str, message: impl Into<String>) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// `Ok(())` when valid, otherwise `AppError::FailedValidation` carrying every violation.
    pub fn into_result(self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::FailedValidation(self.errors))
        }
    }
}

/// Case-insensitive membership test.
pub fn permitted_value(value: &str, permitted: &[&str]) -> bool {
    permitted.iter().any(|p| p.eq_ignore_ascii_case(value))
}

fn check_required_text(v: &mut Validator, key: &str, value: &str) {
    v.check(!value.is_empty(), key, "must be provided");
    v.check(
        value.len() <= MAX_FIELD_BYTES,
        key,
        format!("must not be more than {MAX_FIELD_BYTES} bytes long"),
    );
}

/// Apply the watch business rules.
///
/// Used on both the create and the update path. Diameter-by-gender and
/// energy-category rules are intentionally not enforced.
pub fn validate_watch(v: &mut Validator, watch: &WatchAttributes) {
    check_required_text(v, "brand", &watch.brand);
    check_required_text(v, "model", &watch.model);
    check_required_text(v, "dial_color", &watch.dial_color);
    check_required_text(v, "strap_type", &watch.strap_type);
    check_required_text(v, "image_url", &watch.image_url);

    v.check(
        permitted_value(&watch.gender, &PERMITTED_GENDERS),
        "gender",
        "must be either male or female",
    );

    v.check(
        watch.price > Decimal::ZERO,
        "price",
        "must be greater than zero",
    );
    v.check(
        watch.price.round_dp(PRICE_DECIMAL_PLACES) == watch.price,
        "price",
        "must have at most 2 decimal places",
    );
    v.check(
        watch.price < Decimal::from(MAX_PRICE_EXCLUSIVE),
        "price",
        "must be less than 10000000000",
    );
}
