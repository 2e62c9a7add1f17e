use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{instrument, warn};

use crate::error::{AppError, AppResult};
use crate::filters::{Metadata, PageRequest};
use crate::metrics;
use crate::models::{UpdateWatchRequest, Watch, WatchAttributes};
use crate::store::{StoreError, WatchFilter, WatchStore};
use crate::validation::{Validator, validate_watch};

/// Business operations on watches over any [`WatchStore`].
///
/// Validation runs before any I/O. Every store call is bounded by the
/// configured timeout; dropping the returned future drops the in-flight
/// query with it.
#[derive(Clone)]
pub struct WatchService {
    store: Arc<dyn WatchStore>,
    timeout: Duration,
}

impl WatchService {
    pub fn new(store: Arc<dyn WatchStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Validate and persist a new watch.
    #[instrument(skip(self, attributes), fields(brand = %attributes.brand))]
    pub async fn create(&self, attributes: WatchAttributes) -> AppResult<Watch> {
        let mut v = Validator::new();
        validate_watch(&mut v, &attributes);
        v.into_result()?;

        Ok(self.run("insert", self.store.insert(attributes)).await?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> AppResult<Watch> {
        Ok(self.run("get", self.store.get(id)).await?)
    }

    /// Read, merge the provided fields, validate, then write conditioned on
    /// the version that was read.
    ///
    /// `expected_version`, when given, must equal the stored version or the
    /// update is refused with `EditConflict` before anything is merged.
    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: i64,
        changes: UpdateWatchRequest,
        expected_version: Option<i32>,
    ) -> AppResult<Watch> {
        let current = self.get(id).await?;
        self.update_record(current, changes, expected_version).await
    }

    /// Same as [`update`](Self::update) for a record the caller already read.
    #[instrument(skip(self, watch, changes), fields(id = watch.id))]
    pub async fn update_record(
        &self,
        mut watch: Watch,
        changes: UpdateWatchRequest,
        expected_version: Option<i32>,
    ) -> AppResult<Watch> {
        if expected_version.is_some_and(|expected| expected != watch.version) {
            return Err(AppError::EditConflict);
        }

        changes.apply(&mut watch.attributes);

        let mut v = Validator::new();
        validate_watch(&mut v, &watch.attributes);
        v.into_result()?;

        watch.version = self.run("update", self.store.update(&watch)).await?;
        Ok(watch)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        Ok(self.run("delete", self.store.delete(id)).await?)
    }

    #[instrument(skip(self), fields(page = page.page, page_size = page.page_size))]
    pub async fn list(
        &self,
        filter: &WatchFilter,
        page: &PageRequest,
    ) -> AppResult<(Vec<Watch>, Metadata)> {
        Ok(self.run("list", self.store.list(filter, page)).await?)
    }

    /// True when the store answers within the timeout.
    pub async fn is_reachable(&self) -> bool {
        self.run("ping", self.store.ping()).await.is_ok()
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let start = Instant::now();
        let result = timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(StoreError::Timeout(self.timeout)));

        let outcome = match &result {
            Ok(_) => "ok",
            Err(StoreError::NotFound) => "not_found",
            Err(StoreError::EditConflict) => "edit_conflict",
            Err(StoreError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        let elapsed = start.elapsed();
        metrics::record_store_operation(operation, outcome, elapsed.as_secs_f64());

        if let Err(StoreError::Timeout(limit)) = &result {
            warn!(
                operation,
                timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                "Store operation timed out"
            );
        }

        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::*;
    use crate::store::MemoryWatchStore;

    fn omega() -> WatchAttributes {
        WatchAttributes {
            brand: "Omega".to_string(),
            model: "Seamaster".to_string(),
            dial_color: "Blue".to_string(),
            strap_type: "Metal".to_string(),
            diameter: 42,
            energy: String::new(),
            gender: "male".to_string(),
            price: Decimal::new(1200, 0),
            image_url: "http://x/y.jpg".to_string(),
        }
    }

    fn service() -> WatchService {
        WatchService::new(Arc::new(MemoryWatchStore::new()), Duration::from_secs(1))
    }

    /// Store that counts calls and never answers.
    #[derive(Default)]
    struct StalledStore {
        calls: AtomicUsize,
    }

    impl StalledStore {
        async fn stall<T>(&self) -> Result<T, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[async_trait]
    impl WatchStore for StalledStore {
        async fn insert(&self, _: WatchAttributes) -> Result<Watch, StoreError> {
            self.stall().await
        }
        async fn get(&self, _: i64) -> Result<Watch, StoreError> {
            self.stall().await
        }
        async fn update(&self, _: &Watch) -> Result<i32, StoreError> {
            self.stall().await
        }
        async fn delete(&self, _: i64) -> Result<(), StoreError> {
            self.stall().await
        }
        async fn list(
            &self,
            _: &WatchFilter,
            _: &PageRequest,
        ) -> Result<(Vec<Watch>, Metadata), StoreError> {
            self.stall().await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            self.stall().await
        }
        fn backend(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_invalid_record_never_reaches_store() {
        let store = Arc::new(StalledStore::default());
        let service = WatchService::new(store.clone(), Duration::from_millis(50));

        let err = service
            .create(WatchAttributes {
                brand: String::new(),
                price: Decimal::ZERO,
                ..omega()
            })
            .await
            .unwrap_err();

        match err {
            AppError::FailedValidation(fields) => {
                assert!(fields.contains_key("brand"));
                assert!(fields.contains_key("price"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stalled_store_times_out() {
        let service = WatchService::new(
            Arc::new(StalledStore::default()),
            Duration::from_millis(50),
        );

        let err = service.get(1).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
        assert!(!service.is_reachable().await);
    }

    #[tokio::test]
    async fn test_update_merges_and_bumps_version() {
        let service = service();
        let created = service.create(omega()).await.unwrap();
        assert_eq!(created.version, 1);

        let changes = UpdateWatchRequest {
            price: Some(Decimal::new(1300, 0)),
            ..UpdateWatchRequest::default()
        };
        let updated = service.update(created.id, changes, Some(1)).await.unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.attributes.price, Decimal::new(1300, 0));
        assert_eq!(updated.attributes.brand, "Omega");
        assert_eq!(service.get(created.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_expected_version_mismatch_is_conflict() {
        let service = service();
        let created = service.create(omega()).await.unwrap();

        let err = service
            .update(created.id, UpdateWatchRequest::default(), Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EditConflict));
        assert_eq!(service.get(created.id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_invalid_merge_is_rejected_without_write() {
        let service = service();
        let created = service.create(omega()).await.unwrap();

        let changes = UpdateWatchRequest {
            gender: Some("unisex".to_string()),
            ..UpdateWatchRequest::default()
        };
        let err = service.update(created.id, changes, None).await.unwrap_err();

        assert!(matches!(err, AppError::FailedValidation(_)));
        assert_eq!(service.get(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let err = service()
            .update(42, UpdateWatchRequest::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }
}
