//! Pagination and sorting parameters for listing endpoints.
//!
//! Raw query values are parsed into [`Filters`], then resolved against a
//! column safelist into a [`PageRequest`] the store can execute. Sort input
//! never reaches a query unless it names a safelisted column.

use std::collections::HashMap;

use serde::Serialize;

use crate::validation::Validator;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const DEFAULT_SORT: &str = "id";

/// Upper bound on `page`, keeps OFFSET cost bounded.
pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Columns a watch listing may be sorted by.
pub const WATCH_SORT_SAFELIST: &[&str] = &["id", "brand", "dial_color", "price"];

/// Unvalidated listing parameters as supplied by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    /// Read `page`, `page_size` and `sort` from a query map.
    ///
    /// Missing values take their defaults. A value that is present but not an
    /// integer is recorded on `v` and replaced by the default so the remaining
    /// checks still run.
    pub fn from_query(
        query: &HashMap<String, String>,
        sort_safelist: &'static [&'static str],
        v: &mut Validator,
    ) -> Self {
        Self {
            page: read_int(query, "page", DEFAULT_PAGE, v),
            page_size: read_int(query, "page_size", DEFAULT_PAGE_SIZE, v),
            sort: query
                .get("sort")
                .filter(|s| !s.is_empty())
                .cloned()
                .unwrap_or_else(|| DEFAULT_SORT.to_string()),
            sort_safelist,
        }
    }

    /// Validate the parameters and turn them into an executable request.
    ///
    /// Returns `None` when any rule failed; the violations are on `v`.
    pub fn resolve(self, v: &mut Validator) -> Option<PageRequest> {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(
            self.page_size <= MAX_PAGE_SIZE,
            "page_size",
            "must be a maximum of 100",
        );

        let sort = self.sort_spec();
        v.check(sort.is_some(), "sort", "invalid sort value");

        match sort {
            Some(sort) if v.is_valid() => Some(PageRequest {
                page: self.page,
                page_size: self.page_size,
                sort,
            }),
            _ => None,
        }
    }

    /// Safelisted column and direction, or `None` for an unknown column.
    fn sort_spec(&self) -> Option<SortSpec> {
        let (name, direction) = match self.sort.strip_prefix('-') {
            Some(name) => (name, SortDirection::Desc),
            None => (self.sort.as_str(), SortDirection::Asc),
        };

        self.sort_safelist
            .iter()
            .copied()
            .find(|column| *column == name)
            .map(|column| SortSpec { column, direction })
    }
}

fn read_int(query: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match query.get(key).filter(|s| !s.is_empty()) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Sort column drawn from a safelist, never from raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: &'static str,
    pub direction: SortDirection,
}

/// A validated page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
    pub sort: SortSpec,
}

impl PageRequest {
    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortSpec {
                column: DEFAULT_SORT,
                direction: SortDirection::Asc,
            },
        }
    }
}

/// Summary of a listing result. All zeros when nothing matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records <= 0 || page_size <= 0 {
            return Self::default();
        }

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }

    pub fn for_page(total_records: i64, page: &PageRequest) -> Self {
        Self::calculate(total_records, page.page, page.page_size)
    }
}
