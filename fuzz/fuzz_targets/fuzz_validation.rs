//! Fuzz testing for request validation.
//!
//! Feeds arbitrary watch bodies and listing query strings through the
//! validators. Neither may panic, and a query that resolves must always
//! yield an in-range page request with a safelisted sort column.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```

#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rust_decimal::Decimal;
use watch_catalog::filters::{Filters, MAX_PAGE, MAX_PAGE_SIZE, WATCH_SORT_SAFELIST};
use watch_catalog::models::WatchAttributes;
use watch_catalog::validation::{Validator, validate_watch};

#[derive(Debug, Arbitrary)]
struct Input {
    brand: String,
    model: String,
    dial_color: String,
    strap_type: String,
    diameter: i16,
    energy: String,
    gender: String,
    price_mantissa: i64,
    price_scale: u8,
    image_url: String,
    query: Vec<(String, String)>,
}

fuzz_target!(|input: Input| {
    let watch = WatchAttributes {
        brand: input.brand,
        model: input.model,
        dial_color: input.dial_color,
        strap_type: input.strap_type,
        diameter: input.diameter,
        energy: input.energy,
        gender: input.gender,
        price: Decimal::new(input.price_mantissa, u32::from(input.price_scale % 29)),
        image_url: input.image_url,
    };
    let mut v = Validator::new();
    validate_watch(&mut v, &watch);
    assert_eq!(v.is_valid(), v.errors().is_empty());

    let query: HashMap<String, String> = input.query.into_iter().collect();
    let mut v = Validator::new();
    if let Some(page) = Filters::from_query(&query, WATCH_SORT_SAFELIST, &mut v).resolve(&mut v) {
        assert!(v.is_valid());
        assert!((1..=MAX_PAGE).contains(&page.page));
        assert!((1..=MAX_PAGE_SIZE).contains(&page.page_size));
        assert!(WATCH_SORT_SAFELIST.contains(&page.sort.column));
        assert!(page.offset() >= 0);
    }
});
