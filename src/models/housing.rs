//! Housing marketplace: listings offered by hosts and stay requests from guests

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HousingListing {
    pub id: i64,
    pub host_id: i64,
    pub title: String,
    pub description: String,
    pub city: String,
    pub country: String,
    pub address: Option<String>,
    pub price_per_night_cents: i64,
    /// ISO 4217 code
    pub currency: String,
    pub max_guests: i64,
    pub available_from: Option<NaiveDate>,
    pub available_to: Option<NaiveDate>,
    #[sqlx(try_from = "String")]
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl HousingListing {
    /// Whether the stay `[check_in, check_out)` fits the availability window
    pub fn covers(&self, check_in: NaiveDate, check_out: NaiveDate) -> bool {
        let after_start = self.available_from.map_or(true, |from| check_in >= from);
        let before_end = self.available_to.map_or(true, |to| check_out <= to);
        after_start && before_end
    }
}

string_enum! {
    pub enum ListingStatus {
        Active => "active",
        Inactive => "inactive",
    }
}

string_enum! {
    pub enum HousingRequestStatus {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HousingRequest {
    pub id: i64,
    pub listing_id: i64,
    pub guest_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i64,
    pub message: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: HousingRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HousingRequest {
    /// Half-open interval overlap: checking out the day another guest
    /// checks in is not a conflict.
    pub fn overlaps(&self, check_in: NaiveDate, check_out: NaiveDate) -> bool {
        self.check_in < check_out && check_in < self.check_out
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateHousingInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub address: Option<String>,
    pub price_per_night_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_max_guests")]
    pub max_guests: i64,
    #[serde(default)]
    pub available_from: Option<NaiveDate>,
    #[serde(default)]
    pub available_to: Option<NaiveDate>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_max_guests() -> i64 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateHousingInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub address: Option<String>,
    pub price_per_night_cents: Option<i64>,
    pub currency: Option<String>,
    pub max_guests: Option<i64>,
    pub available_from: Option<NaiveDate>,
    pub available_to: Option<NaiveDate>,
    pub status: Option<ListingStatus>,
}

/// Listing search filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HousingFilter {
    /// Free text over title, description and city
    pub q: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub max_price: Option<i64>,
    pub guests: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HousingRequestInput {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i64,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn request(check_in: &str, check_out: &str) -> HousingRequest {
        let now = Utc::now();
        HousingRequest {
            id: 1,
            listing_id: 1,
            guest_id: 2,
            check_in: date(check_in),
            check_out: date(check_out),
            guests: 1,
            message: None,
            status: HousingRequestStatus::Accepted,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        let booked = request("2025-03-10", "2025-03-15");
        assert!(booked.overlaps(date("2025-03-14"), date("2025-03-20")));
        assert!(booked.overlaps(date("2025-03-01"), date("2025-03-11")));
        assert!(!booked.overlaps(date("2025-03-15"), date("2025-03-18")));
        assert!(!booked.overlaps(date("2025-03-05"), date("2025-03-10")));
    }
}
