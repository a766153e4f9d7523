//! Subscriber repository.
//!
//! The storage collaborator of the subscriber registry: atomic upsert by
//! endpoint, listing, deletion and the single-row delivery counter.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::begin_immediate;
use crate::database::models::{BreakdownField, SubscriberDbModel};
use crate::database::retry::retry_on_sqlite_busy;

/// Subscriber repository trait.
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    // Subscribers
    /// Insert or update by endpoint. Returns the stored row.
    async fn upsert(&self, subscriber: &SubscriberDbModel) -> Result<SubscriberDbModel>;
    /// All subscribers, oldest registration first.
    async fn list_all(&self) -> Result<Vec<SubscriberDbModel>>;
    async fn count_all(&self) -> Result<u64>;
    /// Delete by endpoint. Returns whether a row was removed.
    async fn delete(&self, endpoint: &str) -> Result<bool>;
    /// Delete every `(endpoint, last_active)` whose row has not been refreshed
    /// since `last_active`, in one transaction. Returns the number removed.
    async fn delete_unrefreshed(&self, targets: &[(String, i64)]) -> Result<u64>;
    /// Delete subscribers whose `last_active` is older than `cutoff_ms`.
    async fn delete_inactive_before(&self, cutoff_ms: i64) -> Result<Vec<String>>;
    async fn most_recently_active(&self) -> Result<Option<SubscriberDbModel>>;
    async fn count_by(&self, field: BreakdownField) -> Result<Vec<(String, u64)>>;

    // Delivery counter
    async fn increment_counter(&self, n: u64) -> Result<()>;
    async fn read_counter(&self) -> Result<u64>;
}

/// SQLx implementation of SubscriberRepository.
pub struct SqlxSubscriberRepository {
    pool: SqlitePool,
}

impl SqlxSubscriberRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriberRepository for SqlxSubscriberRepository {
    async fn upsert(&self, subscriber: &SubscriberDbModel) -> Result<SubscriberDbModel> {
        retry_on_sqlite_busy("upsert_subscriber", || async {
            // last_active strictly advances on re-registration, even within the same millisecond.
            let row = sqlx::query_as::<_, SubscriberDbModel>(
                r#"
                INSERT INTO subscriber (
                    id, endpoint, p256dh, auth, ip, nation, os, os_version,
                    browser, browser_version, platform, platform_version, user_agent,
                    created_at, last_active
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(endpoint) DO UPDATE SET
                    p256dh = excluded.p256dh,
                    auth = excluded.auth,
                    ip = excluded.ip,
                    nation = excluded.nation,
                    os = excluded.os,
                    os_version = excluded.os_version,
                    browser = excluded.browser,
                    browser_version = excluded.browser_version,
                    platform = excluded.platform,
                    platform_version = excluded.platform_version,
                    user_agent = excluded.user_agent,
                    last_active = MAX(excluded.last_active, subscriber.last_active + 1)
                RETURNING *
                "#,
            )
            .bind(&subscriber.id)
            .bind(&subscriber.endpoint)
            .bind(&subscriber.p256dh)
            .bind(&subscriber.auth)
            .bind(&subscriber.ip)
            .bind(&subscriber.nation)
            .bind(&subscriber.os)
            .bind(&subscriber.os_version)
            .bind(&subscriber.browser)
            .bind(&subscriber.browser_version)
            .bind(&subscriber.platform)
            .bind(&subscriber.platform_version)
            .bind(&subscriber.user_agent)
            .bind(subscriber.created_at)
            .bind(subscriber.last_active)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<SubscriberDbModel>> {
        let rows = sqlx::query_as::<_, SubscriberDbModel>(
            "SELECT * FROM subscriber ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_all(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscriber")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn delete(&self, endpoint: &str) -> Result<bool> {
        retry_on_sqlite_busy("delete_subscriber", || async {
            let result = sqlx::query("DELETE FROM subscriber WHERE endpoint = ?")
                .bind(endpoint)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn delete_unrefreshed(&self, targets: &[(String, i64)]) -> Result<u64> {
        if targets.is_empty() {
            return Ok(0);
        }

        retry_on_sqlite_busy("delete_unrefreshed_subscribers", || async {
            let mut tx = begin_immediate(&self.pool).await?;
            let mut removed = 0u64;
            for (endpoint, last_active) in targets {
                let result =
                    sqlx::query("DELETE FROM subscriber WHERE endpoint = ? AND last_active <= ?")
                        .bind(endpoint)
                        .bind(last_active)
                        .execute(&mut *tx)
                        .await?;
                removed += result.rows_affected();
            }
            tx.commit().await?;
            Ok(removed)
        })
        .await
    }

    async fn delete_inactive_before(&self, cutoff_ms: i64) -> Result<Vec<String>> {
        retry_on_sqlite_busy("delete_inactive_subscribers", || async {
            let rows: Vec<(String,)> =
                sqlx::query_as("DELETE FROM subscriber WHERE last_active < ? RETURNING endpoint")
                    .bind(cutoff_ms)
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows.into_iter().map(|(endpoint,)| endpoint).collect())
        })
        .await
    }

    async fn most_recently_active(&self) -> Result<Option<SubscriberDbModel>> {
        let row = sqlx::query_as::<_, SubscriberDbModel>(
            "SELECT * FROM subscriber ORDER BY last_active DESC, rowid DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn count_by(&self, field: BreakdownField) -> Result<Vec<(String, u64)>> {
        let column = field.column();
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            r#"
            SELECT {column}, COUNT(*) AS count
            FROM subscriber
            WHERE {column} IS NOT NULL AND {column} != ''
            GROUP BY {column}
            ORDER BY count DESC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(key, count)| (key, count.max(0) as u64))
            .collect())
    }

    async fn increment_counter(&self, n: u64) -> Result<()> {
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        retry_on_sqlite_busy("increment_push_counter", || async {
            sqlx::query("UPDATE push_stats SET total_pushes = total_pushes + ? WHERE id = 1")
                .bind(n)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn read_counter(&self) -> Result<u64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT total_pushes FROM push_stats WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(count,)| count.max(0) as u64).unwrap_or(0))
    }
}
