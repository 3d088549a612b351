use std::collections::BTreeMap;
use std::str::FromStr as _;

use anyhow::Context as _;
use chrono::NaiveDateTime;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tracing::{debug, info};

#[repr(transparent)]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, sqlx::Type, serde::Deserialize)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ListingId(String);

impl From<String> for ListingId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<'a> From<&'a str> for ListingId {
    fn from(value: &'a str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for ListingId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One vehicle listing, normalized from the upstream payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCar {
    pub id: ListingId,
    pub title: String,
    pub price: String,
    pub link: String,
    pub image: String,
    pub source: String,
    pub transmission: String,
    pub features: BTreeMap<String, String>,
}

/// SQLite-backed store of every listing seen so far, keyed by the
/// upstream listing id.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url - {database_url}"))?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to open sqlite database")?;

        let store = Self { pool };
        store
            .create_tables()
            .await
            .context("Failed to create car_listings table")?;
        info!("Database tables verified/created successfully");

        Ok(store)
    }

    async fn create_tables(&self) -> sqlx::Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS `car_listings` (
                `id` TEXT PRIMARY KEY,
                `title` TEXT NOT NULL,
                `price` TEXT NOT NULL,
                `link` TEXT NOT NULL,
                `image` TEXT NOT NULL,
                `source` TEXT NOT NULL,
                `transmission` TEXT NOT NULL,
                `features` TEXT NOT NULL,
                `created_at` TIMESTAMP NOT NULL,
                `updated_at` TIMESTAMP NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await
        .map(|_| ())
    }

    /// Inserts the listing or, when the id is already known, overwrites
    /// every mutable column and `updated_at`. Returns whether the listing
    /// was newly created.
    pub async fn upsert(&self, car: &NormalizedCar) -> sqlx::Result<bool> {
        self.upsert_at(car, chrono::Utc::now().naive_utc()).await
    }

    async fn upsert_at(&self, car: &NormalizedCar, now: NaiveDateTime) -> sqlx::Result<bool> {
        let features = serde_json::to_string(&car.features).unwrap_or_default();

        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query_scalar::<_, String>(
            "SELECT `id` FROM `car_listings` WHERE `id` = ?",
        )
        .bind(&car.id)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();

        if exists {
            sqlx::query(
                r#"UPDATE `car_listings` SET
                    `title` = ?, `price` = ?, `link` = ?, `image` = ?,
                    `source` = ?, `transmission` = ?, `features` = ?,
                    `updated_at` = ?
                WHERE `id` = ?"#,
            )
            .bind(&car.title)
            .bind(&car.price)
            .bind(&car.link)
            .bind(&car.image)
            .bind(&car.source)
            .bind(&car.transmission)
            .bind(&features)
            .bind(now)
            .bind(&car.id)
            .execute(&mut *tx)
            .await?;
            debug!("Updated existing car: {}", car.id);
        } else {
            sqlx::query(
                r#"INSERT INTO `car_listings` (
                    `id`, `title`, `price`, `link`, `image`,
                    `source`, `transmission`, `features`,
                    `created_at`, `updated_at`
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&car.id)
            .bind(&car.title)
            .bind(&car.price)
            .bind(&car.link)
            .bind(&car.image)
            .bind(&car.source)
            .bind(&car.transmission)
            .bind(&features)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(!exists)
    }

    /// Removes listings whose `updated_at` is strictly older than
    /// `now - days`. A listing refreshed exactly at the threshold stays.
    pub async fn delete_older_than(&self, days: i64) -> sqlx::Result<u64> {
        self.delete_older_than_at(days, chrono::Utc::now().naive_utc())
            .await
    }

    async fn delete_older_than_at(&self, days: i64, now: NaiveDateTime) -> sqlx::Result<u64> {
        let cutoff = now - chrono::Duration::days(days);
        let result = sqlx::query("DELETE FROM `car_listings` WHERE `updated_at` < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM `car_listings`")
            .fetch_one(&self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn car(id: &str, price: &str) -> NormalizedCar {
        NormalizedCar {
            id: id.into(),
            title: "Skoda Octavia".to_string(),
            price: price.to_string(),
            link: format!("https://www.autoscout24.de/angebote/{id}"),
            image: "https://prod.pictures.autoscout24.net/abc.jpg".to_string(),
            source: "autoscout24".to_string(),
            transmission: "Automatik".to_string(),
            features: [("transmission".to_string(), "Automatik".to_string())]
                .into_iter()
                .collect(),
        }
    }

    fn at(days_ago: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 30)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            - chrono::Duration::days(days_ago)
    }

    async fn memory_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    async fn updated_at(store: &Store, id: &str) -> NaiveDateTime {
        sqlx::query_scalar("SELECT `updated_at` FROM `car_listings` WHERE `id` = ?")
            .bind(id)
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_reports_new_only_once() {
        let store = memory_store().await;

        assert!(store.upsert_at(&car("a1", "€ 10.000,-"), at(1)).await.unwrap());
        assert!(!store.upsert_at(&car("a1", "€ 9.500,-"), at(0)).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);

        // the second sighting overwrote the mutable fields and advanced
        // the updated_at column
        let price: String =
            sqlx::query_scalar("SELECT `price` FROM `car_listings` WHERE `id` = ?")
                .bind("a1")
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(price, "€ 9.500,-");
        assert_eq!(updated_at(&store, "a1").await, at(0));
    }

    #[tokio::test]
    async fn upsert_keeps_created_at() {
        let store = memory_store().await;
        store.upsert_at(&car("a1", "€ 10.000,-"), at(3)).await.unwrap();
        store.upsert_at(&car("a1", "€ 10.000,-"), at(1)).await.unwrap();

        let created_at: NaiveDateTime =
            sqlx::query_scalar("SELECT `created_at` FROM `car_listings` WHERE `id` = ?")
                .bind("a1")
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(created_at, at(3));
    }

    #[tokio::test]
    async fn retention_removes_only_stale_listings() {
        let store = memory_store().await;
        store.upsert_at(&car("stale", "€ 1,-"), at(8)).await.unwrap();
        store.upsert_at(&car("fresh", "€ 1,-"), at(1)).await.unwrap();

        let deleted = store.delete_older_than_at(7, at(0)).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(updated_at(&store, "fresh").await, at(1));
    }

    #[tokio::test]
    async fn retention_boundary_is_strict() {
        let store = memory_store().await;
        store.upsert_at(&car("edge", "€ 1,-"), at(7)).await.unwrap();

        // updated_at exactly at the cutoff is not older than it
        let deleted = store.delete_older_than_at(7, at(0)).await.unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
