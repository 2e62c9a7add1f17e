//! Version-guarded persistence for watches.
//!
//! [`WatchStore`] is the capability every backend implements:
//!
//! - [`PgWatchStore`] - PostgreSQL via `sqlx`
//! - [`MemoryWatchStore`] - in-process map for development and tests
//!
//! Updates are compare-and-swap on `version`: a write only lands when the
//! caller presents the version currently stored, and the new version is
//! produced by the same atomic step. A stale version yields
//! [`StoreError::EditConflict`], never a silent overwrite.

mod memory;
mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::filters::{Metadata, PageRequest};
use crate::models::{Watch, WatchAttributes};

pub use memory::MemoryWatchStore;
pub use postgres::{MIGRATOR, PgWatchStore, connect_with_retry};

/// Failure of a store operation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// Zero rows matched `id` + `version`: the record is gone or another
    /// writer got there first.
    #[error("edit conflict")]
    EditConflict,

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Equality filters for listings. An empty string disables the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchFilter {
    pub brand: String,
    pub dial_color: String,
}

impl WatchFilter {
    pub(crate) fn matches(&self, watch: &WatchAttributes) -> bool {
        (self.brand.is_empty() || self.brand == watch.brand)
            && (self.dial_color.is_empty() || self.dial_color == watch.dial_color)
    }
}

/// Storage backend for watches.
#[async_trait]
pub trait WatchStore: Send + Sync {
    /// Persist a new record and return it with `id`, `created_at` and
    /// `version = 1` filled in.
    async fn insert(&self, attributes: WatchAttributes) -> Result<Watch, StoreError>;

    /// Point read. `id < 1` is `NotFound` without touching storage.
    async fn get(&self, id: i64) -> Result<Watch, StoreError>;

    /// Conditioned write on `watch.id` and `watch.version`.
    ///
    /// Returns the new version (`watch.version + 1`).
    async fn update(&self, watch: &Watch) -> Result<i32, StoreError>;

    /// `id < 1` or no matching row is `NotFound`.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    /// Filter, order and paginate in one step.
    async fn list(
        &self,
        filter: &WatchFilter,
        page: &PageRequest,
    ) -> Result<(Vec<Watch>, Metadata), StoreError>;

    /// Cheap reachability probe for the healthcheck.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name reported by the healthcheck.
    fn backend(&self) -> &'static str;
}
