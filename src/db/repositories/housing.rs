//! Housing listing and stay request repository

use crate::db::repositories::user::like_pattern;
use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::{
    HousingFilter, HousingListing, HousingRequest, HousingRequestStatus, ListParams,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

const LISTING_COLUMNS: &str = "id, host_id, title, description, city, country, address, \
     price_per_night_cents, currency, max_guests, available_from, available_to, status, \
     created_at, updated_at, deleted_at";

const REQUEST_COLUMNS: &str = "id, listing_id, guest_id, check_in, check_out, guests, message, \
     status, created_at, updated_at";

#[async_trait]
pub trait HousingRepository: Send + Sync {
    async fn create_listing(&self, listing: &HousingListing) -> Result<HousingListing>;

    async fn get_listing(&self, id: i64) -> Result<Option<HousingListing>>;

    async fn update_listing(&self, listing: &HousingListing) -> Result<HousingListing>;

    async fn soft_delete_listing(&self, id: i64) -> Result<()>;

    /// Active listings matching the filter, newest first
    async fn search_listings(&self, filter: &HousingFilter, params: &ListParams) -> Result<(Vec<HousingListing>, i64)>;

    async fn list_by_host(&self, host_id: i64) -> Result<Vec<HousingListing>>;

    async fn count_active(&self) -> Result<i64>;

    async fn create_request(&self, request: &HousingRequest) -> Result<HousingRequest>;

    async fn get_request(&self, id: i64) -> Result<Option<HousingRequest>>;

    async fn set_request_status(&self, id: i64, status: HousingRequestStatus) -> Result<()>;

    async fn list_requests_by_listing(&self, listing_id: i64) -> Result<Vec<HousingRequest>>;

    async fn list_requests_by_guest(&self, guest_id: i64) -> Result<Vec<HousingRequest>>;

    /// Accepted requests on a listing whose stay intersects `[check_in, check_out)`
    async fn accepted_overlapping(
        &self,
        listing_id: i64,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Vec<HousingRequest>>;
}

pub struct SqlxHousingRepository {
    pool: DynDatabasePool,
}

impl SqlxHousingRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn HousingRepository> {
        Arc::new(Self::new(pool))
    }

    async fn list_requests_where(&self, column: &str, value: i64) -> Result<Vec<HousingRequest>> {
        let sql = format!(
            "SELECT {} FROM housing_requests WHERE {} = ? ORDER BY id DESC",
            REQUEST_COLUMNS, column
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, HousingRequest>(&sql)
                .bind(value)
                .fetch_all(conn)
                .await
                .context("Failed to list housing requests")
        })
    }
}

#[async_trait]
impl HousingRepository for SqlxHousingRepository {
    async fn create_listing(&self, listing: &HousingListing) -> Result<HousingListing> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO housing_listings (host_id, title, description, city, country, address,
                    price_per_night_cents, currency, max_guests, available_from, available_to, status,
                    created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(listing.host_id)
            .bind(&listing.title)
            .bind(&listing.description)
            .bind(&listing.city)
            .bind(&listing.country)
            .bind(&listing.address)
            .bind(listing.price_per_night_cents)
            .bind(&listing.currency)
            .bind(listing.max_guests)
            .bind(listing.available_from)
            .bind(listing.available_to)
            .bind(listing.status.as_str())
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create housing listing")?
            .last_id()
        });

        Ok(HousingListing {
            id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            ..listing.clone()
        })
    }

    async fn get_listing(&self, id: i64) -> Result<Option<HousingListing>> {
        let sql = format!(
            "SELECT {} FROM housing_listings WHERE id = ? AND deleted_at IS NULL",
            LISTING_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, HousingListing>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get housing listing")
        })
    }

    async fn update_listing(&self, listing: &HousingListing) -> Result<HousingListing> {
        with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                UPDATE housing_listings SET title = ?, description = ?, city = ?, country = ?, address = ?,
                    price_per_night_cents = ?, currency = ?, max_guests = ?, available_from = ?,
                    available_to = ?, status = ?, updated_at = ?
                WHERE id = ? AND deleted_at IS NULL
                "#,
            )
            .bind(&listing.title)
            .bind(&listing.description)
            .bind(&listing.city)
            .bind(&listing.country)
            .bind(&listing.address)
            .bind(listing.price_per_night_cents)
            .bind(&listing.currency)
            .bind(listing.max_guests)
            .bind(listing.available_from)
            .bind(listing.available_to)
            .bind(listing.status.as_str())
            .bind(Utc::now())
            .bind(listing.id)
            .execute(conn)
            .await
            .context("Failed to update housing listing")?;
        });
        self.get_listing(listing.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Housing listing not found after update"))
    }

    async fn soft_delete_listing(&self, id: i64) -> Result<()> {
        let now = Utc::now();
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE housing_listings SET deleted_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete housing listing")?;
        });
        Ok(())
    }

    async fn search_listings(&self, filter: &HousingFilter, params: &ListParams) -> Result<(Vec<HousingListing>, i64)> {
        let mut clauses = vec!["deleted_at IS NULL", "status = 'active'"];
        if filter.q.is_some() {
            clauses.push(
                "(LOWER(title) LIKE ? ESCAPE '!' OR LOWER(description) LIKE ? ESCAPE '!' OR LOWER(city) LIKE ? ESCAPE '!')",
            );
        }
        if filter.city.is_some() {
            clauses.push("LOWER(city) = ?");
        }
        if filter.country.is_some() {
            clauses.push("LOWER(country) = ?");
        }
        if filter.max_price.is_some() {
            clauses.push("price_per_night_cents <= ?");
        }
        if filter.guests.is_some() {
            clauses.push("max_guests >= ?");
        }
        let where_sql = clauses.join(" AND ");
        let sql = format!(
            "SELECT {} FROM housing_listings WHERE {} ORDER BY id DESC LIMIT ? OFFSET ?",
            LISTING_COLUMNS, where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM housing_listings WHERE {}", where_sql);
        let pattern = filter.q.as_deref().map(like_pattern);
        let city = filter.city.as_ref().map(|c| c.to_lowercase());
        let country = filter.country.as_ref().map(|c| c.to_lowercase());

        with_driver!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, HousingListing>(&sql);
            let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
            if let Some(pattern) = &pattern {
                query = query.bind(pattern).bind(pattern).bind(pattern);
                count = count.bind(pattern).bind(pattern).bind(pattern);
            }
            if let Some(city) = &city {
                query = query.bind(city);
                count = count.bind(city);
            }
            if let Some(country) = &country {
                query = query.bind(country);
                count = count.bind(country);
            }
            if let Some(max_price) = filter.max_price {
                query = query.bind(max_price);
                count = count.bind(max_price);
            }
            if let Some(guests) = filter.guests {
                query = query.bind(guests);
                count = count.bind(guests);
            }
            let listings = query
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to search housing listings")?;
            let total = count.fetch_one(conn).await.context("Failed to count housing listings")?;
            Ok((listings, total))
        })
    }

    async fn list_by_host(&self, host_id: i64) -> Result<Vec<HousingListing>> {
        let sql = format!(
            "SELECT {} FROM housing_listings WHERE host_id = ? AND deleted_at IS NULL ORDER BY id DESC",
            LISTING_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, HousingListing>(&sql)
                .bind(host_id)
                .fetch_all(conn)
                .await
                .context("Failed to list host listings")
        })
    }

    async fn count_active(&self) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM housing_listings WHERE deleted_at IS NULL AND status = 'active'",
            )
            .fetch_one(conn)
            .await
            .context("Failed to count housing listings")
        })
    }

    async fn create_request(&self, request: &HousingRequest) -> Result<HousingRequest> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO housing_requests (listing_id, guest_id, check_in, check_out, guests, message,
                    status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(request.listing_id)
            .bind(request.guest_id)
            .bind(request.check_in)
            .bind(request.check_out)
            .bind(request.guests)
            .bind(&request.message)
            .bind(request.status.as_str())
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create housing request")?
            .last_id()
        });

        Ok(HousingRequest {
            id,
            created_at: now,
            updated_at: now,
            ..request.clone()
        })
    }

    async fn get_request(&self, id: i64) -> Result<Option<HousingRequest>> {
        let sql = format!("SELECT {} FROM housing_requests WHERE id = ?", REQUEST_COLUMNS);
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, HousingRequest>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get housing request")
        })
    }

    async fn set_request_status(&self, id: i64, status: HousingRequestStatus) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE housing_requests SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update housing request")?;
        });
        Ok(())
    }

    async fn list_requests_by_listing(&self, listing_id: i64) -> Result<Vec<HousingRequest>> {
        self.list_requests_where("listing_id", listing_id).await
    }

    async fn list_requests_by_guest(&self, guest_id: i64) -> Result<Vec<HousingRequest>> {
        self.list_requests_where("guest_id", guest_id).await
    }

    async fn accepted_overlapping(
        &self,
        listing_id: i64,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Vec<HousingRequest>> {
        let sql = format!(
            "SELECT {} FROM housing_requests WHERE listing_id = ? AND status = 'accepted' \
             AND check_in < ? AND check_out > ?",
            REQUEST_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, HousingRequest>(&sql)
                .bind(listing_id)
                .bind(check_out)
                .bind(check_in)
                .fetch_all(conn)
                .await
                .context("Failed to look up overlapping stays")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;
    use crate::models::ListingStatus;

    async fn setup() -> (SqlxHousingRepository, i64, i64) {
        let pool = migrated_test_pool().await;
        let sqlite = pool.as_sqlite().unwrap();
        let mut ids = Vec::new();
        for name in ["host", "guest"] {
            ids.push(
                sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, 'h')")
                    .bind(name)
                    .bind(format!("{}@example.com", name))
                    .execute(sqlite)
                    .await
                    .unwrap()
                    .last_insert_rowid(),
            );
        }
        (SqlxHousingRepository::new(pool), ids[0], ids[1])
    }

    fn listing(host_id: i64, city: &str, price: i64, guests: i64) -> HousingListing {
        let now = Utc::now();
        HousingListing {
            id: 0,
            host_id,
            title: format!("Room in {}", city),
            description: String::new(),
            city: city.into(),
            country: "Argentina".into(),
            address: None,
            price_per_night_cents: price,
            currency: "USD".into(),
            max_guests: guests,
            available_from: None,
            available_to: None,
            status: ListingStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn test_search_filters() {
        let (repo, host, _) = setup().await;
        repo.create_listing(&listing(host, "Buenos Aires", 3000, 2)).await.unwrap();
        repo.create_listing(&listing(host, "Buenos Aires", 9000, 4)).await.unwrap();
        let mut paused = listing(host, "Buenos Aires", 1000, 2);
        paused.status = ListingStatus::Inactive;
        repo.create_listing(&paused).await.unwrap();

        let filter = HousingFilter {
            city: Some("BUENOS AIRES".into()),
            max_price: Some(5000),
            ..Default::default()
        };
        let (found, total) = repo.search_listings(&filter, &ListParams::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].price_per_night_cents, 3000);

        let filter = HousingFilter {
            guests: Some(3),
            ..Default::default()
        };
        let (_, total) = repo.search_listings(&filter, &ListParams::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(repo.count_active().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_accepted_stays() {
        let (repo, host, guest) = setup().await;
        let l = repo.create_listing(&listing(host, "Rosario", 2000, 2)).await.unwrap();
        let now = Utc::now();
        let req = repo
            .create_request(&HousingRequest {
                id: 0,
                listing_id: l.id,
                guest_id: guest,
                check_in: date("2026-03-01"),
                check_out: date("2026-03-05"),
                guests: 1,
                message: Some("Coming for the festival".into()),
                status: HousingRequestStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        assert!(repo.accepted_overlapping(l.id, date("2026-03-02"), date("2026-03-03")).await.unwrap().is_empty());
        repo.set_request_status(req.id, HousingRequestStatus::Accepted).await.unwrap();
        assert_eq!(repo.accepted_overlapping(l.id, date("2026-03-04"), date("2026-03-08")).await.unwrap().len(), 1);
        // checkout day is free for the next guest
        assert!(repo.accepted_overlapping(l.id, date("2026-03-05"), date("2026-03-07")).await.unwrap().is_empty());

        assert_eq!(repo.list_requests_by_guest(guest).await.unwrap().len(), 1);
        assert_eq!(repo.list_requests_by_listing(l.id).await.unwrap()[0].id, req.id);
    }
}
