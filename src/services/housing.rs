//! Housing marketplace
//!
//! Hosts on the `host` or `premium` plan publish listings. Guests send stay
//! requests that the host accepts or rejects; accepted stays on one listing
//! never overlap.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use crate::db::repositories::HousingRepository;
use crate::models::{
    CreateHousingInput, HousingFilter, HousingListing, HousingRequest, HousingRequestInput,
    HousingRequestStatus, ListParams, ListingStatus, NewNotification, NotificationKind, PagedResult,
    UpdateHousingInput, User,
};
use crate::services::error::{found, require_text, ServiceError, ServiceResult};
use crate::services::notification::NotificationService;
use crate::services::subscription::SubscriptionService;

const MAX_TITLE_CHARS: usize = 200;
const MAX_PLACE_CHARS: usize = 100;
const MAX_MESSAGE_CHARS: usize = 2_000;

pub struct HousingService {
    repo: Arc<dyn HousingRepository>,
    subscriptions: Arc<SubscriptionService>,
    notifications: Arc<NotificationService>,
}

impl HousingService {
    pub fn new(
        repo: Arc<dyn HousingRepository>,
        subscriptions: Arc<SubscriptionService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            repo,
            subscriptions,
            notifications,
        }
    }

    pub async fn create_listing(&self, user: &User, input: CreateHousingInput) -> ServiceResult<HousingListing> {
        self.subscriptions.require_housing_host(user).await?;

        let now = Utc::now();
        let listing = HousingListing {
            id: 0,
            host_id: user.id,
            title: require_text("Title", &input.title, MAX_TITLE_CHARS)?,
            description: input.description.trim().to_string(),
            city: require_text("City", &input.city, MAX_PLACE_CHARS)?,
            country: require_text("Country", &input.country, MAX_PLACE_CHARS)?,
            address: input.address.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
            price_per_night_cents: input.price_per_night_cents,
            currency: input.currency.trim().to_uppercase(),
            max_guests: input.max_guests,
            available_from: input.available_from,
            available_to: input.available_to,
            status: ListingStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        validate_listing(&listing)?;

        let listing = self.repo.create_listing(&listing).await?;
        tracing::info!(listing_id = listing.id, host_id = user.id, "Housing listing created");
        Ok(listing)
    }

    pub async fn get_listing(&self, id: i64) -> ServiceResult<HousingListing> {
        found(self.repo.get_listing(id).await?, "Listing")
    }

    pub async fn update_listing(&self, user: &User, id: i64, input: UpdateHousingInput) -> ServiceResult<HousingListing> {
        let mut listing = self.get_listing(id).await?;
        ensure_host(user, &listing)?;

        if let Some(title) = input.title {
            listing.title = require_text("Title", &title, MAX_TITLE_CHARS)?;
        }
        if let Some(description) = input.description {
            listing.description = description.trim().to_string();
        }
        if let Some(city) = input.city {
            listing.city = require_text("City", &city, MAX_PLACE_CHARS)?;
        }
        if let Some(country) = input.country {
            listing.country = require_text("Country", &country, MAX_PLACE_CHARS)?;
        }
        if let Some(address) = input.address {
            listing.address = Some(address.trim().to_string()).filter(|a| !a.is_empty());
        }
        if let Some(price) = input.price_per_night_cents {
            listing.price_per_night_cents = price;
        }
        if let Some(currency) = input.currency {
            listing.currency = currency.trim().to_uppercase();
        }
        if let Some(max_guests) = input.max_guests {
            listing.max_guests = max_guests;
        }
        if input.available_from.is_some() {
            listing.available_from = input.available_from;
        }
        if input.available_to.is_some() {
            listing.available_to = input.available_to;
        }
        if let Some(status) = input.status {
            listing.status = status;
        }
        validate_listing(&listing)?;

        Ok(self.repo.update_listing(&listing).await?)
    }

    pub async fn delete_listing(&self, user: &User, id: i64) -> ServiceResult<()> {
        let listing = self.get_listing(id).await?;
        ensure_host(user, &listing)?;
        self.repo.soft_delete_listing(id).await?;
        Ok(())
    }

    pub async fn search(&self, filter: &HousingFilter, params: &ListParams) -> ServiceResult<PagedResult<HousingListing>> {
        let (items, total) = self.repo.search_listings(filter, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn my_listings(&self, user: &User) -> ServiceResult<Vec<HousingListing>> {
        Ok(self.repo.list_by_host(user.id).await?)
    }

    /// Ask to stay at a listing
    pub async fn request_stay(&self, user: &User, listing_id: i64, input: HousingRequestInput) -> ServiceResult<HousingRequest> {
        let listing = self.get_listing(listing_id).await?;
        if listing.host_id == user.id {
            return Err(ServiceError::validation("You cannot request your own listing"));
        }
        if listing.status != ListingStatus::Active {
            return Err(ServiceError::conflict("This listing is not accepting requests"));
        }
        if input.check_out <= input.check_in {
            return Err(ServiceError::validation("Check-out must be after check-in"));
        }
        if input.guests < 1 || input.guests > listing.max_guests {
            return Err(ServiceError::validation(format!(
                "Guests must be between 1 and {}",
                listing.max_guests
            )));
        }
        if !listing.covers(input.check_in, input.check_out) {
            return Err(ServiceError::validation("Dates are outside the listing's availability"));
        }
        self.ensure_free(listing.id, input.check_in, input.check_out).await?;

        let message = match input.message {
            Some(m) if !m.trim().is_empty() => Some(require_text("Message", &m, MAX_MESSAGE_CHARS)?),
            _ => None,
        };
        let now = Utc::now();
        let request = HousingRequest {
            id: 0,
            listing_id: listing.id,
            guest_id: user.id,
            check_in: input.check_in,
            check_out: input.check_out,
            guests: input.guests,
            message,
            status: HousingRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let request = self.repo.create_request(&request).await?;

        self.notifications
            .send(
                NewNotification::new(
                    listing.host_id,
                    NotificationKind::HousingRequest,
                    format!(
                        "{} asked to stay at {} from {} to {}",
                        user.username, listing.title, request.check_in, request.check_out
                    ),
                )
                .actor(user.id)
                .target("housing_request", request.id),
            )
            .await;
        Ok(request)
    }

    pub async fn accept(&self, user: &User, request_id: i64) -> ServiceResult<HousingRequest> {
        let (request, listing) = self.pending_for_host(user, request_id).await?;
        self.ensure_free(listing.id, request.check_in, request.check_out).await?;
        self.respond(user, request, &listing, HousingRequestStatus::Accepted).await
    }

    pub async fn reject(&self, user: &User, request_id: i64) -> ServiceResult<HousingRequest> {
        let (request, listing) = self.pending_for_host(user, request_id).await?;
        self.respond(user, request, &listing, HousingRequestStatus::Rejected).await
    }

    /// Withdraw a pending or accepted request
    pub async fn cancel(&self, user: &User, request_id: i64) -> ServiceResult<HousingRequest> {
        let mut request = found(self.repo.get_request(request_id).await?, "Housing request")?;
        if request.guest_id != user.id {
            return Err(ServiceError::forbidden("Only the guest can cancel this request"));
        }
        if !matches!(
            request.status,
            HousingRequestStatus::Pending | HousingRequestStatus::Accepted
        ) {
            return Err(ServiceError::conflict(format!("Request is already {}", request.status)));
        }
        self.repo
            .set_request_status(request.id, HousingRequestStatus::Cancelled)
            .await?;
        request.status = HousingRequestStatus::Cancelled;

        if let Some(listing) = self.repo.get_listing(request.listing_id).await? {
            self.notifications
                .send(
                    NewNotification::new(
                        listing.host_id,
                        NotificationKind::HousingResponse,
                        format!("{} cancelled their stay at {}", user.username, listing.title),
                    )
                    .actor(user.id)
                    .target("housing_request", request.id),
                )
                .await;
        }
        Ok(request)
    }

    /// Requests on one of the host's listings
    pub async fn listing_requests(&self, user: &User, listing_id: i64) -> ServiceResult<Vec<HousingRequest>> {
        let listing = self.get_listing(listing_id).await?;
        ensure_host(user, &listing)?;
        Ok(self.repo.list_requests_by_listing(listing_id).await?)
    }

    pub async fn my_requests(&self, user: &User) -> ServiceResult<Vec<HousingRequest>> {
        Ok(self.repo.list_requests_by_guest(user.id).await?)
    }

    async fn pending_for_host(&self, user: &User, request_id: i64) -> ServiceResult<(HousingRequest, HousingListing)> {
        let request = found(self.repo.get_request(request_id).await?, "Housing request")?;
        let listing = self.get_listing(request.listing_id).await?;
        if listing.host_id != user.id {
            return Err(ServiceError::forbidden("Only the host can answer this request"));
        }
        if request.status != HousingRequestStatus::Pending {
            return Err(ServiceError::conflict(format!("Request is already {}", request.status)));
        }
        Ok((request, listing))
    }

    async fn respond(
        &self,
        host: &User,
        mut request: HousingRequest,
        listing: &HousingListing,
        status: HousingRequestStatus,
    ) -> ServiceResult<HousingRequest> {
        self.repo.set_request_status(request.id, status).await?;
        request.status = status;

        self.notifications
            .send(
                NewNotification::new(
                    request.guest_id,
                    NotificationKind::HousingResponse,
                    format!("Your stay at {} was {}", listing.title, status),
                )
                .actor(host.id)
                .target("housing_request", request.id),
            )
            .await;
        Ok(request)
    }

    async fn ensure_free(&self, listing_id: i64, check_in: NaiveDate, check_out: NaiveDate) -> ServiceResult<()> {
        let booked = self.repo.accepted_overlapping(listing_id, check_in, check_out).await?;
        if booked.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::conflict("The listing is already booked for these dates"))
        }
    }
}

fn ensure_host(user: &User, listing: &HousingListing) -> ServiceResult<()> {
    if user.can_moderate(listing.host_id) {
        Ok(())
    } else {
        Err(ServiceError::forbidden("Only the host can modify this listing"))
    }
}

fn validate_listing(listing: &HousingListing) -> ServiceResult<()> {
    if listing.price_per_night_cents < 0 {
        return Err(ServiceError::validation("Price cannot be negative"));
    }
    if listing.max_guests < 1 {
        return Err(ServiceError::validation("max_guests must be at least 1"));
    }
    if listing.currency.len() != 3 || !listing.currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ServiceError::validation("Currency must be a 3-letter ISO code"));
    }
    if let (Some(from), Some(to)) = (listing.available_from, listing.available_to) {
        if to <= from {
            return Err(ServiceError::validation("Availability must end after it starts"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        NotificationRepository, SqlxGroupRepository, SqlxHousingRepository,
        SqlxNotificationRepository, SqlxSubscriptionRepository,
    };
    use crate::db::{migrated_test_pool, DynDatabasePool};
    use crate::models::Plan;
    use crate::services::test_support::{insert_user, notification_service};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn subscriptions(pool: &DynDatabasePool) -> Arc<SubscriptionService> {
        Arc::new(SubscriptionService::new(
            SqlxSubscriptionRepository::boxed(pool.clone()),
            SqlxGroupRepository::boxed(pool.clone()),
        ))
    }

    fn housing_service(pool: &DynDatabasePool) -> HousingService {
        HousingService::new(
            SqlxHousingRepository::boxed(pool.clone()),
            subscriptions(pool),
            notification_service(pool),
        )
    }

    fn listing_input() -> CreateHousingInput {
        CreateHousingInput {
            title: "Room near Salon Canning".into(),
            description: String::new(),
            city: "Buenos Aires".into(),
            country: "Argentina".into(),
            address: None,
            price_per_night_cents: 2_500,
            currency: "usd".into(),
            max_guests: 2,
            available_from: Some(date("2025-03-01")),
            available_to: Some(date("2025-03-31")),
        }
    }

    fn stay(check_in: &str, check_out: &str, guests: i64) -> HousingRequestInput {
        HousingRequestInput {
            check_in: date(check_in),
            check_out: date(check_out),
            guests,
            message: None,
        }
    }

    async fn host_with_listing(pool: &DynDatabasePool, service: &HousingService) -> (User, HousingListing) {
        let host = insert_user(pool, "host").await;
        subscriptions(pool).change_plan(&host, Plan::Host).await.unwrap();
        let listing = service.create_listing(&host, listing_input()).await.unwrap();
        (host, listing)
    }

    #[tokio::test]
    async fn test_listing_requires_host_plan() {
        let pool = migrated_test_pool().await;
        let service = housing_service(&pool);
        let ana = insert_user(&pool, "ana").await;

        let result = service.create_listing(&ana, listing_input()).await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));

        subscriptions(&pool).change_plan(&ana, Plan::Premium).await.unwrap();
        let listing = service.create_listing(&ana, listing_input()).await.unwrap();
        assert_eq!(listing.currency, "USD");
    }

    #[tokio::test]
    async fn test_request_validation() {
        let pool = migrated_test_pool().await;
        let service = housing_service(&pool);
        let (host, listing) = host_with_listing(&pool, &service).await;
        let guest = insert_user(&pool, "guest").await;

        let own = service.request_stay(&host, listing.id, stay("2025-03-02", "2025-03-05", 1)).await;
        assert!(matches!(own, Err(ServiceError::Validation(_))));

        let backwards = service.request_stay(&guest, listing.id, stay("2025-03-05", "2025-03-05", 1)).await;
        assert!(matches!(backwards, Err(ServiceError::Validation(_))));

        let crowd = service.request_stay(&guest, listing.id, stay("2025-03-02", "2025-03-05", 3)).await;
        assert!(matches!(crowd, Err(ServiceError::Validation(_))));

        let outside = service.request_stay(&guest, listing.id, stay("2025-03-28", "2025-04-02", 1)).await;
        assert!(matches!(outside, Err(ServiceError::Validation(_))));

        assert!(service.request_stay(&guest, listing.id, stay("2025-03-25", "2025-03-31", 2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_accepted_stays_never_overlap() {
        let pool = migrated_test_pool().await;
        let service = housing_service(&pool);
        let (host, listing) = host_with_listing(&pool, &service).await;
        let ana = insert_user(&pool, "ana").await;
        let beto = insert_user(&pool, "beto").await;

        let first = service.request_stay(&ana, listing.id, stay("2025-03-10", "2025-03-15", 1)).await.unwrap();
        let second = service.request_stay(&beto, listing.id, stay("2025-03-12", "2025-03-16", 1)).await.unwrap();

        let accepted = service.accept(&host, first.id).await.unwrap();
        assert_eq!(accepted.status, HousingRequestStatus::Accepted);

        // the pending overlap can no longer be accepted
        assert!(matches!(service.accept(&host, second.id).await, Err(ServiceError::Conflict(_))));
        // nor can a new one be filed
        let late = service.request_stay(&beto, listing.id, stay("2025-03-14", "2025-03-18", 1)).await;
        assert!(matches!(late, Err(ServiceError::Conflict(_))));
        // back-to-back is fine
        assert!(service.request_stay(&beto, listing.id, stay("2025-03-15", "2025-03-18", 1)).await.is_ok());

        let notes = SqlxNotificationRepository::new(pool.clone());
        assert_eq!(notes.unread_count(ana.id).await.unwrap(), 1);
        assert_eq!(notes.unread_count(host.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_only_host_answers_only_guest_cancels() {
        let pool = migrated_test_pool().await;
        let service = housing_service(&pool);
        let (host, listing) = host_with_listing(&pool, &service).await;
        let guest = insert_user(&pool, "guest").await;

        let request = service.request_stay(&guest, listing.id, stay("2025-03-02", "2025-03-04", 1)).await.unwrap();
        assert!(matches!(service.reject(&guest, request.id).await, Err(ServiceError::Forbidden(_))));
        assert!(matches!(service.cancel(&host, request.id).await, Err(ServiceError::Forbidden(_))));

        let cancelled = service.cancel(&guest, request.id).await.unwrap();
        assert_eq!(cancelled.status, HousingRequestStatus::Cancelled);
        assert!(matches!(service.accept(&host, request.id).await, Err(ServiceError::Conflict(_))));
        assert_eq!(service.my_requests(&guest).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_by_guests_and_price() {
        let pool = migrated_test_pool().await;
        let service = housing_service(&pool);
        host_with_listing(&pool, &service).await;

        let filter = HousingFilter {
            city: Some("Buenos Aires".into()),
            max_price: Some(3_000),
            guests: Some(2),
            ..Default::default()
        };
        assert_eq!(service.search(&filter, &ListParams::default()).await.unwrap().total, 1);

        let too_many = HousingFilter {
            guests: Some(3),
            ..Default::default()
        };
        assert_eq!(service.search(&too_many, &ListParams::default()).await.unwrap().total, 0);
    }
}
