use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{StoreError, WatchFilter, WatchStore};
use crate::filters::{Metadata, PageRequest, SortDirection};
use crate::models::{Watch, WatchAttributes};

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<i64, Watch>,
    last_id: i64,
}

/// In-process store with the same contract as the PostgreSQL backend.
///
/// Every operation runs under one lock, which makes the version check and
/// the write a single step just like the conditioned `UPDATE`.
#[derive(Debug, Default)]
pub struct MemoryWatchStore {
    inner: RwLock<Inner>,
}

impl MemoryWatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare(a: &Watch, b: &Watch, column: &str) -> Ordering {
    match column {
        "brand" => a.attributes.brand.cmp(&b.attributes.brand),
        "dial_color" => a.attributes.dial_color.cmp(&b.attributes.dial_color),
        "price" => a.attributes.price.cmp(&b.attributes.price),
        _ => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl WatchStore for MemoryWatchStore {
    async fn insert(&self, attributes: WatchAttributes) -> Result<Watch, StoreError> {
        let mut inner = self.inner.write().await;
        inner.last_id += 1;

        let watch = Watch {
            id: inner.last_id,
            created_at: Utc::now(),
            attributes,
            version: 1,
        };
        inner.rows.insert(watch.id, watch.clone());
        Ok(watch)
    }

    async fn get(&self, id: i64) -> Result<Watch, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.inner
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, watch: &Watch) -> Result<i32, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .rows
            .get_mut(&watch.id)
            .filter(|stored| stored.version == watch.version)
            .ok_or(StoreError::EditConflict)?;

        stored.attributes = watch.attributes.clone();
        stored.version += 1;
        Ok(stored.version)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.inner
            .write()
            .await
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list(
        &self,
        filter: &WatchFilter,
        page: &PageRequest,
    ) -> Result<(Vec<Watch>, Metadata), StoreError> {
        let inner = self.inner.read().await;
        let mut matching: Vec<&Watch> = inner
            .rows
            .values()
            .filter(|w| filter.matches(&w.attributes))
            .collect();

        matching.sort_by(|a, b| {
            let primary = compare(a, b, page.sort.column);
            let primary = match page.sort.direction {
                SortDirection::Asc => primary,
                SortDirection::Desc => primary.reverse(),
            };
            primary.then(a.id.cmp(&b.id))
        });

        let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(0);

        let watches = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok((watches, Metadata::for_page(total, page)))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
