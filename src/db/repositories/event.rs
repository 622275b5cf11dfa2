//! Event and RSVP repository

use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::{Event, EventFilter, EventRsvp, ListParams, RsvpStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::user::like_pattern;

const EVENT_COLUMNS: &str = "id, organizer_id, group_id, title, description, event_type, venue, \
     city, country, start_at, end_at, max_attendees, created_at, updated_at, deleted_at";

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn create(&self, event: &Event) -> Result<Event>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Event>>;

    async fn update(&self, event: &Event) -> Result<Event>;

    async fn soft_delete(&self, id: i64) -> Result<()>;

    /// Listing ordered by start time; `upcoming` hides events that already ended
    async fn list(&self, filter: &EventFilter, params: &ListParams) -> Result<(Vec<Event>, i64)>;

    async fn search(&self, query: &str, params: &ListParams) -> Result<(Vec<Event>, i64)>;

    async fn count(&self) -> Result<i64>;

    async fn count_upcoming(&self, now: DateTime<Utc>) -> Result<i64>;

    async fn get_rsvp(&self, event_id: i64, user_id: i64) -> Result<Option<EventRsvp>>;

    /// Insert or update the caller's RSVP
    async fn upsert_rsvp(&self, event_id: i64, user_id: i64, status: RsvpStatus) -> Result<EventRsvp>;

    async fn count_rsvps(&self, event_id: i64, status: RsvpStatus) -> Result<i64>;

    /// RSVPs other than `not_going`, oldest first
    async fn list_participants(&self, event_id: i64) -> Result<Vec<EventRsvp>>;
}

pub struct SqlxEventRepository {
    pool: DynDatabasePool,
}

impl SqlxEventRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn EventRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl EventRepository for SqlxEventRepository {
    async fn create(&self, event: &Event) -> Result<Event> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO events (organizer_id, group_id, title, description, event_type, venue,
                    city, country, start_at, end_at, max_attendees, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.organizer_id)
            .bind(event.group_id)
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.event_type.as_str())
            .bind(&event.venue)
            .bind(&event.city)
            .bind(&event.country)
            .bind(event.start_at)
            .bind(event.end_at)
            .bind(event.max_attendees)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create event")?
            .last_id()
        });

        Ok(Event {
            id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            ..event.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Event>> {
        let sql = format!(
            "SELECT {} FROM events WHERE id = ? AND deleted_at IS NULL",
            EVENT_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Event>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get event")
        })
    }

    async fn update(&self, event: &Event) -> Result<Event> {
        with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                UPDATE events SET title = ?, description = ?, event_type = ?, venue = ?, city = ?,
                    country = ?, start_at = ?, end_at = ?, max_attendees = ?, updated_at = ?
                WHERE id = ? AND deleted_at IS NULL
                "#,
            )
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.event_type.as_str())
            .bind(&event.venue)
            .bind(&event.city)
            .bind(&event.country)
            .bind(event.start_at)
            .bind(event.end_at)
            .bind(event.max_attendees)
            .bind(Utc::now())
            .bind(event.id)
            .execute(conn)
            .await
            .context("Failed to update event")?;
        });
        self.get_by_id(event.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Event not found after update"))
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        let now = Utc::now();
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE events SET deleted_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete event")?;
        });
        Ok(())
    }

    async fn list(&self, filter: &EventFilter, params: &ListParams) -> Result<(Vec<Event>, i64)> {
        let mut clauses = vec!["deleted_at IS NULL"];
        if filter.city.is_some() {
            clauses.push("LOWER(city) = ?");
        }
        if filter.upcoming {
            clauses.push("end_at >= ?");
        }
        if filter.group_id.is_some() {
            clauses.push("group_id = ?");
        }
        let where_sql = clauses.join(" AND ");
        let sql = format!(
            "SELECT {} FROM events WHERE {} ORDER BY start_at ASC, id ASC LIMIT ? OFFSET ?",
            EVENT_COLUMNS, where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM events WHERE {}", where_sql);
        let city = filter.city.as_ref().map(|c| c.to_lowercase());
        let now = Utc::now();

        with_driver!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, Event>(&sql);
            let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
            if let Some(city) = &city {
                query = query.bind(city);
                count = count.bind(city);
            }
            if filter.upcoming {
                query = query.bind(now);
                count = count.bind(now);
            }
            if let Some(group_id) = filter.group_id {
                query = query.bind(group_id);
                count = count.bind(group_id);
            }
            let events = query
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list events")?;
            let total = count.fetch_one(conn).await.context("Failed to count events")?;
            Ok((events, total))
        })
    }

    async fn search(&self, query: &str, params: &ListParams) -> Result<(Vec<Event>, i64)> {
        let pattern = like_pattern(query);
        let where_sql = "deleted_at IS NULL AND (LOWER(title) LIKE ? ESCAPE '!' \
             OR LOWER(description) LIKE ? ESCAPE '!' OR LOWER(city) LIKE ? ESCAPE '!' OR LOWER(venue) LIKE ? ESCAPE '!')";
        let sql = format!(
            "SELECT {} FROM events WHERE {} ORDER BY start_at DESC LIMIT ? OFFSET ?",
            EVENT_COLUMNS, where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM events WHERE {}", where_sql);

        with_driver!(self.pool, conn => {
            let events = sqlx::query_as::<_, Event>(&sql)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to search events")?;
            let total = sqlx::query_scalar::<_, i64>(&count_sql)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .fetch_one(conn)
                .await
                .context("Failed to count event search results")?;
            Ok((events, total))
        })
    }

    async fn count(&self) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE deleted_at IS NULL")
                .fetch_one(conn)
                .await
                .context("Failed to count events")
        })
    }

    async fn count_upcoming(&self, now: DateTime<Utc>) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM events WHERE deleted_at IS NULL AND start_at >= ?",
            )
            .bind(now)
            .fetch_one(conn)
            .await
            .context("Failed to count upcoming events")
        })
    }

    async fn get_rsvp(&self, event_id: i64, user_id: i64) -> Result<Option<EventRsvp>> {
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, EventRsvp>(
                "SELECT id, event_id, user_id, status, created_at, updated_at FROM event_rsvps WHERE event_id = ? AND user_id = ?",
            )
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(conn)
            .await
            .context("Failed to get RSVP")
        })
    }

    async fn upsert_rsvp(&self, event_id: i64, user_id: i64, status: RsvpStatus) -> Result<EventRsvp> {
        let now = Utc::now();
        let existing = self.get_rsvp(event_id, user_id).await?;
        with_driver!(self.pool, conn => {
            if existing.is_some() {
                sqlx::query("UPDATE event_rsvps SET status = ?, updated_at = ? WHERE event_id = ? AND user_id = ?")
                    .bind(status.as_str())
                    .bind(now)
                    .bind(event_id)
                    .bind(user_id)
                    .execute(conn)
                    .await
                    .context("Failed to update RSVP")?;
            } else {
                sqlx::query("INSERT INTO event_rsvps (event_id, user_id, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
                    .bind(event_id)
                    .bind(user_id)
                    .bind(status.as_str())
                    .bind(now)
                    .bind(now)
                    .execute(conn)
                    .await
                    .context("Failed to create RSVP")?;
            }
        });
        self.get_rsvp(event_id, user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("RSVP not found after upsert"))
    }

    async fn count_rsvps(&self, event_id: i64, status: RsvpStatus) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM event_rsvps WHERE event_id = ? AND status = ?",
            )
            .bind(event_id)
            .bind(status.as_str())
            .fetch_one(conn)
            .await
            .context("Failed to count RSVPs")
        })
    }

    async fn list_participants(&self, event_id: i64) -> Result<Vec<EventRsvp>> {
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, EventRsvp>(
                "SELECT id, event_id, user_id, status, created_at, updated_at FROM event_rsvps \
                 WHERE event_id = ? AND status <> 'not_going' ORDER BY id ASC",
            )
            .bind(event_id)
            .fetch_all(conn)
            .await
            .context("Failed to list participants")
        })
    }
}
