//! Event model (milongas, workshops, festivals...)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PublicProfile;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: i64,
    pub organizer_id: i64,
    pub group_id: Option<i64>,
    pub title: String,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub event_type: EventType,
    pub venue: String,
    pub city: String,
    pub country: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub max_attendees: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

string_enum! {
    pub enum EventType {
        Milonga => "milonga",
        Practica => "practica",
        Workshop => "workshop",
        Festival => "festival",
        Marathon => "marathon",
        Other => "other",
    }
}

impl Default for EventType {
    fn default() -> Self {
        Self::Milonga
    }
}

string_enum! {
    pub enum RsvpStatus {
        Going => "going",
        Interested => "interested",
        NotGoing => "not_going",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRsvp {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub status: RsvpStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An attendee as listed on the event page
#[derive(Debug, Clone, Serialize)]
pub struct EventParticipant {
    pub user: PublicProfile,
    pub status: RsvpStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub max_attendees: Option<i64>,
    #[serde(default)]
    pub group_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEventInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub event_type: Option<EventType>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub max_attendees: Option<i64>,
}

/// Query filters for event listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub city: Option<String>,
    #[serde(default)]
    pub upcoming: bool,
    pub group_id: Option<i64>,
}
