//! Events (milongas, prácticas, workshops, festivals)
//!
//! The organizer or an admin may modify an event. RSVPs are one row per
//! user; switching to `going` is refused once `max_attendees` is reached.

use chrono::Utc;
use std::sync::Arc;

use crate::db::repositories::{EventRepository, GroupRepository, UserRepository};
use crate::models::{
    CreateEventInput, Event, EventFilter, EventParticipant, EventRsvp, ListParams, NewNotification,
    NotificationKind, PagedResult, RsvpStatus, UpdateEventInput, User,
};
use crate::services::error::{found, require_text, ServiceError, ServiceResult};
use crate::services::notification::NotificationService;

const MAX_TITLE_CHARS: usize = 200;

pub struct EventService {
    repo: Arc<dyn EventRepository>,
    group_repo: Arc<dyn GroupRepository>,
    user_repo: Arc<dyn UserRepository>,
    notifications: Arc<NotificationService>,
}

impl EventService {
    pub fn new(
        repo: Arc<dyn EventRepository>,
        group_repo: Arc<dyn GroupRepository>,
        user_repo: Arc<dyn UserRepository>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            repo,
            group_repo,
            user_repo,
            notifications,
        }
    }

    pub async fn create(&self, user: &User, input: CreateEventInput) -> ServiceResult<Event> {
        let title = require_text("Title", &input.title, MAX_TITLE_CHARS)?;
        validate_schedule(&input.start_at, &input.end_at)?;
        validate_capacity(input.max_attendees)?;
        if let Some(group_id) = input.group_id {
            found(self.group_repo.get_by_id(group_id).await?, "Group")?;
        }

        let now = Utc::now();
        let event = Event {
            id: 0,
            organizer_id: user.id,
            group_id: input.group_id,
            title,
            description: input.description.trim().to_string(),
            event_type: input.event_type,
            venue: input.venue.trim().to_string(),
            city: input.city.trim().to_string(),
            country: input.country.trim().to_string(),
            start_at: input.start_at,
            end_at: input.end_at,
            max_attendees: input.max_attendees,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let event = self.repo.create(&event).await?;
        tracing::info!(event_id = event.id, organizer_id = user.id, "Event created");
        Ok(event)
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Event> {
        found(self.repo.get_by_id(id).await?, "Event")
    }

    pub async fn update(&self, user: &User, id: i64, input: UpdateEventInput) -> ServiceResult<Event> {
        let mut event = self.get(id).await?;
        ensure_organizer(user, &event)?;

        if let Some(title) = input.title {
            event.title = require_text("Title", &title, MAX_TITLE_CHARS)?;
        }
        if let Some(description) = input.description {
            event.description = description.trim().to_string();
        }
        if let Some(event_type) = input.event_type {
            event.event_type = event_type;
        }
        if let Some(venue) = input.venue {
            event.venue = venue.trim().to_string();
        }
        if let Some(city) = input.city {
            event.city = city.trim().to_string();
        }
        if let Some(country) = input.country {
            event.country = country.trim().to_string();
        }
        if let Some(start_at) = input.start_at {
            event.start_at = start_at;
        }
        if let Some(end_at) = input.end_at {
            event.end_at = end_at;
        }
        if input.max_attendees.is_some() {
            validate_capacity(input.max_attendees)?;
            event.max_attendees = input.max_attendees;
        }
        validate_schedule(&event.start_at, &event.end_at)?;

        Ok(self.repo.update(&event).await?)
    }

    pub async fn delete(&self, user: &User, id: i64) -> ServiceResult<()> {
        let event = self.get(id).await?;
        ensure_organizer(user, &event)?;
        self.repo.soft_delete(id).await?;
        tracing::info!(event_id = id, by = user.id, "Event deleted");
        Ok(())
    }

    pub async fn list(&self, filter: &EventFilter, params: &ListParams) -> ServiceResult<PagedResult<Event>> {
        let (items, total) = self.repo.list(filter, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn search(&self, query: &str, params: &ListParams) -> ServiceResult<PagedResult<Event>> {
        let (items, total) = self.repo.search(query, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Create or change the caller's RSVP
    pub async fn rsvp(&self, user: &User, event_id: i64, status: RsvpStatus) -> ServiceResult<EventRsvp> {
        let event = self.get(event_id).await?;
        let previous = self.repo.get_rsvp(event_id, user.id).await?;
        let already_going = previous.as_ref().map_or(false, |r| r.status == RsvpStatus::Going);

        if status == RsvpStatus::Going && !already_going {
            if let Some(max) = event.max_attendees {
                let going = self.repo.count_rsvps(event_id, RsvpStatus::Going).await?;
                if going >= max {
                    return Err(ServiceError::conflict("Event is full"));
                }
            }
        }

        let rsvp = self.repo.upsert_rsvp(event_id, user.id, status).await?;

        let changed = previous.map_or(true, |p| p.status != status);
        if changed && status != RsvpStatus::NotGoing {
            self.notifications
                .send(
                    NewNotification::new(
                        event.organizer_id,
                        NotificationKind::EventRsvp,
                        format!("{} is {} to {}", user.username, status_phrase(status), event.title),
                    )
                    .actor(user.id)
                    .target("event", event.id),
                )
                .await;
        }
        Ok(rsvp)
    }

    /// Users going to or interested in the event
    pub async fn participants(&self, event_id: i64) -> ServiceResult<Vec<EventParticipant>> {
        self.get(event_id).await?;
        let rsvps = self.repo.list_participants(event_id).await?;
        let ids: Vec<i64> = rsvps.iter().map(|r| r.user_id).collect();
        let users = self.user_repo.get_many(&ids).await?;

        Ok(rsvps
            .iter()
            .filter_map(|r| {
                users.iter().find(|u| u.id == r.user_id).map(|u| EventParticipant {
                    user: u.public_profile(),
                    status: r.status,
                })
            })
            .collect())
    }
}

fn ensure_organizer(user: &User, event: &Event) -> ServiceResult<()> {
    if event.organizer_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::forbidden("Only the organizer can modify this event"))
    }
}

fn validate_schedule(start_at: &chrono::DateTime<Utc>, end_at: &chrono::DateTime<Utc>) -> ServiceResult<()> {
    if end_at <= start_at {
        return Err(ServiceError::validation("Event must end after it starts"));
    }
    Ok(())
}

fn validate_capacity(max_attendees: Option<i64>) -> ServiceResult<()> {
    match max_attendees {
        Some(n) if n < 1 => Err(ServiceError::validation("max_attendees must be at least 1")),
        _ => Ok(()),
    }
}

fn status_phrase(status: RsvpStatus) -> &'static str {
    match status {
        RsvpStatus::Going => "going",
        RsvpStatus::Interested => "interested in going",
        RsvpStatus::NotGoing => "not going",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::{SqlxEventRepository, SqlxGroupRepository, SqlxUserRepository};
    use crate::db::{migrated_test_pool, DynDatabasePool};
    use crate::models::{EventType, UserRole};
    use crate::services::test_support::{insert_user, insert_user_with_role, notification_service};
    use chrono::Duration;

    pub(crate) fn event_service(pool: &DynDatabasePool) -> EventService {
        EventService::new(
            SqlxEventRepository::boxed(pool.clone()),
            SqlxGroupRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            notification_service(pool),
        )
    }

    pub(crate) fn event_input(title: &str, max_attendees: Option<i64>) -> CreateEventInput {
        let start = Utc::now() + Duration::days(3);
        CreateEventInput {
            title: title.to_string(),
            description: "Live orchestra".to_string(),
            event_type: EventType::Milonga,
            venue: "Salon Canning".to_string(),
            city: "Buenos Aires".to_string(),
            country: "Argentina".to_string(),
            start_at: start,
            end_at: start + Duration::hours(5),
            max_attendees,
            group_id: None,
        }
    }

    #[tokio::test]
    async fn test_end_must_follow_start() {
        let pool = migrated_test_pool().await;
        let service = event_service(&pool);
        let ana = insert_user(&pool, "ana").await;

        let mut input = event_input("Backwards", None);
        input.end_at = input.start_at;
        assert!(matches!(service.create(&ana, input).await, Err(ServiceError::Validation(_))));

        let event = service.create(&ana, event_input("Milonga", None)).await.unwrap();
        let bad = UpdateEventInput {
            end_at: Some(event.start_at - Duration::hours(1)),
            ..Default::default()
        };
        assert!(matches!(service.update(&ana, event.id, bad).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_rsvp_respects_capacity() {
        let pool = migrated_test_pool().await;
        let service = event_service(&pool);
        let organizer = insert_user(&pool, "org").await;
        let ana = insert_user(&pool, "ana").await;
        let beto = insert_user(&pool, "beto").await;

        let event = service.create(&organizer, event_input("Small practica", Some(1))).await.unwrap();
        service.rsvp(&ana, event.id, RsvpStatus::Going).await.unwrap();
        // re-confirming does not count twice
        service.rsvp(&ana, event.id, RsvpStatus::Going).await.unwrap();

        let full = service.rsvp(&beto, event.id, RsvpStatus::Going).await;
        assert!(matches!(full, Err(ServiceError::Conflict(_))));
        service.rsvp(&beto, event.id, RsvpStatus::Interested).await.unwrap();

        // ana frees the spot
        service.rsvp(&ana, event.id, RsvpStatus::NotGoing).await.unwrap();
        service.rsvp(&beto, event.id, RsvpStatus::Going).await.unwrap();

        let participants = service.participants(event.id).await.unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].user.username, "beto");
        assert_eq!(participants[0].status, RsvpStatus::Going);
    }

    #[tokio::test]
    async fn test_only_organizer_or_admin_modifies() {
        let pool = migrated_test_pool().await;
        let service = event_service(&pool);
        let organizer = insert_user(&pool, "org").await;
        let other = insert_user(&pool, "other").await;
        let admin = insert_user_with_role(&pool, "admin", UserRole::Admin).await;

        let event = service.create(&organizer, event_input("Festival", None)).await.unwrap();
        let rename = UpdateEventInput {
            title: Some("Renamed".into()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(&other, event.id, rename.clone()).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert_eq!(service.update(&admin, event.id, rename).await.unwrap().title, "Renamed");

        assert!(matches!(service.delete(&other, event.id).await, Err(ServiceError::Forbidden(_))));
        service.delete(&organizer, event.id).await.unwrap();
        assert!(matches!(service.get(event.id).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_filters_by_city() {
        let pool = migrated_test_pool().await;
        let service = event_service(&pool);
        let organizer = insert_user(&pool, "org").await;

        service.create(&organizer, event_input("BA milonga", None)).await.unwrap();
        let mut paris = event_input("Paris milonga", None);
        paris.city = "Paris".into();
        service.create(&organizer, paris).await.unwrap();

        let filter = EventFilter {
            city: Some("buenos aires".into()),
            upcoming: true,
            group_id: None,
        };
        let page = service.list(&filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "BA milonga");
    }
}
