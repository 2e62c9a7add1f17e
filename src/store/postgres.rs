use std::time::Duration;

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Row};
use tokio::time::{sleep, timeout};
use tracing::{info, instrument, warn};

use super::{StoreError, WatchFilter, WatchStore};
use crate::config::Config;
use crate::filters::{Metadata, PageRequest};
use crate::models::{Watch, WatchAttributes};
use crate::utils::backoff_delay;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Upper bound for the connectivity check after the pool is built.
const CONNECT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const WATCH_COLUMNS: &str = "id, created_at, brand, model, dial_color, strap_type, diameter, \
                             energy, gender, price, image_url, version";

/// Build the pool from config and verify it answers, retrying with backoff.
///
/// Gives up after `db_connect_attempts` failures and returns the last error.
#[instrument(skip(config), fields(attempts = config.db_connect_attempts))]
pub async fn connect_with_retry(config: &Config, url: &str) -> Result<PgPool, StoreError> {
    let mut attempt = 0;

    loop {
        attempt += 1;
        match connect_once(config, url).await {
            Ok(pool) => {
                info!(attempt, "Database connection pool established");
                return Ok(pool);
            }
            Err(e) if attempt < config.db_connect_attempts.max(1) => {
                let delay = backoff_delay(
                    attempt,
                    config.db_connect_base_delay,
                    config.db_connect_max_delay,
                );
                warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Database connection failed, retrying"
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn connect_once(config: &Config, url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .idle_timeout(config.db_max_idle_time)
        .acquire_timeout(config.db_acquire_timeout)
        .connect(url)
        .await?;

    timeout(CONNECT_CHECK_TIMEOUT, sqlx::query("SELECT 1").execute(&pool))
        .await
        .map_err(|_| StoreError::Timeout(CONNECT_CHECK_TIMEOUT))??;

    Ok(pool)
}

/// PostgreSQL-backed store.
///
/// Each method acquires a pooled connection for the duration of one
/// statement only.
#[derive(Debug, Clone)]
pub struct PgWatchStore {
    pool: PgPool,
}

impl PgWatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl WatchStore for PgWatchStore {
    async fn insert(&self, attributes: WatchAttributes) -> Result<Watch, StoreError> {
        // Return the persisted row so numeric coercion is visible to the caller
        let query = format!(
            r#"
            INSERT INTO watches (brand, model, dial_color, strap_type, diameter, energy, gender, price, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {WATCH_COLUMNS}
            "#
        );

        let watch = sqlx::query_as::<_, Watch>(&query)
            .bind(&attributes.brand)
            .bind(&attributes.model)
            .bind(&attributes.dial_color)
            .bind(&attributes.strap_type)
            .bind(attributes.diameter)
            .bind(&attributes.energy)
            .bind(&attributes.gender)
            .bind(attributes.price)
            .bind(&attributes.image_url)
            .fetch_one(&self.pool)
            .await?;

        Ok(watch)
    }

    async fn get(&self, id: i64) -> Result<Watch, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        let query = format!("SELECT {WATCH_COLUMNS} FROM watches WHERE id = $1");
        sqlx::query_as::<_, Watch>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, watch: &Watch) -> Result<i32, StoreError> {
        let attributes = &watch.attributes;
        let version: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE watches
            SET brand = $1, model = $2, dial_color = $3, strap_type = $4, diameter = $5,
                energy = $6, gender = $7, price = $8, image_url = $9, version = version + 1
            WHERE id = $10 AND version = $11
            RETURNING version
            "#,
        )
        .bind(&attributes.brand)
        .bind(&attributes.model)
        .bind(&attributes.dial_color)
        .bind(&attributes.strap_type)
        .bind(attributes.diameter)
        .bind(&attributes.energy)
        .bind(&attributes.gender)
        .bind(attributes.price)
        .bind(&attributes.image_url)
        .bind(watch.id)
        .bind(watch.version)
        .fetch_optional(&self.pool)
        .await?;

        version.ok_or(StoreError::EditConflict)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }

        let result = sqlx::query("DELETE FROM watches WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: &WatchFilter,
        page: &PageRequest,
    ) -> Result<(Vec<Watch>, Metadata), StoreError> {
        // The count row is always present, so the total survives a page past the end.
        let order = format!(
            "{} {}, id ASC",
            page.sort.column,
            page.sort.direction.as_sql()
        );
        let query = format!(
            r#"
            SELECT t.total, w.*
            FROM (
                SELECT count(*) AS total FROM watches
                WHERE ($1 = '' OR brand = $1) AND ($2 = '' OR dial_color = $2)
            ) t
            LEFT JOIN LATERAL (
                SELECT {WATCH_COLUMNS} FROM watches
                WHERE ($1 = '' OR brand = $1) AND ($2 = '' OR dial_color = $2)
                ORDER BY {order}
                LIMIT $3 OFFSET $4
            ) w ON true
            ORDER BY {outer}
            "#,
            outer = format!(
                "w.{} {}, w.id ASC",
                page.sort.column,
                page.sort.direction.as_sql()
            ),
        );

        let rows: Vec<PgRow> = sqlx::query(&query)
            .bind(&filter.brand)
            .bind(&filter.dial_color)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let mut total = 0;
        let mut watches = Vec::with_capacity(rows.len());
        for row in &rows {
            total = row.try_get::<i64, _>("total")?;
            if row.try_get::<Option<i64>, _>("id")?.is_some() {
                watches.push(Watch::from_row(row)?);
            }
        }

        Ok((watches, Metadata::for_page(total, page)))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
