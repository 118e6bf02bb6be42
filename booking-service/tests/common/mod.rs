#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use booking_service::handlers::BookingProcessor;
use booking_service::memory::{InMemoryBookingStore, InMemoryFarmStore};
use booking_service::notifier::NotificationSender;
use booking_service::store::{BookingStore, DecrementOutcome, FarmStore};
use chrono::NaiveDate;
use shared::*;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use uuid::Uuid;

pub fn available_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn unavailable_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 5).unwrap()
}

pub fn green_meadows(breakfast: i32, lunch: i32) -> Farm {
    Farm {
        id: Uuid::new_v4(),
        name: "Green Meadows Farm".to_string(),
        location: "Countryside".to_string(),
        description: "A beautiful farm with rolling hills and fresh air.".to_string(),
        images: vec!["https://example.com/farm1.jpg".to_string()],
        meals: vec![
            Meal {
                id: Uuid::new_v4(),
                name: "Farm Breakfast".to_string(),
                description: "Fresh eggs and bacon".to_string(),
                price: BigDecimal::from(15),
                quantity: breakfast,
            },
            Meal {
                id: Uuid::new_v4(),
                name: "Picnic Lunch".to_string(),
                description: "Sandwiches and fruit".to_string(),
                price: BigDecimal::from(20),
                quantity: lunch,
            },
        ],
        availability_dates: BTreeSet::from([
            available_date(),
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
        ]),
    }
}

pub fn booking_request(farm: &Farm, date: NaiveDate, items: &[(MealId, i32)]) -> BookingRequest {
    BookingRequest {
        farm_id: farm.id,
        date,
        line_items: items
            .iter()
            .map(|(meal_id, quantity)| BookingLineItem { meal_id: *meal_id, quantity: *quantity })
            .collect(),
        requester_email: "guest@example.com".to_string(),
    }
}

pub async fn meal_quantity(farms: &dyn FarmStore, farm_id: FarmId, meal_id: MealId) -> i32 {
    farms
        .get_farm(farm_id)
        .await
        .unwrap()
        .unwrap()
        .meal(meal_id)
        .unwrap()
        .quantity
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<Option<String>> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((recipient.to_string(), subject.to_string(), body.to_string()));
        Ok(Some(format!("preview-{}", sent.len())))
    }
}

pub struct FailingNotifier;

#[async_trait]
impl NotificationSender for FailingNotifier {
    async fn send(&self, _recipient: &str, _subject: &str, _body: &str) -> Result<Option<String>> {
        Err(anyhow!("mail relay unavailable"))
    }
}

pub struct FailingBookingStore;

#[async_trait]
impl BookingStore for FailingBookingStore {
    async fn create_booking(&self, _booking: NewBooking) -> Result<BookingId> {
        Err(anyhow!("connection reset"))
    }

    async fn delete_booking(&self, _booking_id: BookingId) -> Result<()> {
        Ok(())
    }

    async fn get_booking(&self, _booking_id: BookingId) -> Result<Option<Booking>> {
        Ok(None)
    }
}

/// Wraps a farm store to inject faults and force interleavings.
pub struct FaultyFarmStore {
    pub inner: Arc<dyn FarmStore>,
    /// Decrements of this meal fail with a storage error.
    pub failing_meal: Option<MealId>,
    /// Every `get_farm` waits here after taking its snapshot, so all
    /// participants read before any of them writes.
    pub read_barrier: Option<Arc<Barrier>>,
    /// Waited on after `read_barrier`, letting a test act between a read
    /// and the writes that follow it.
    pub release_barrier: Option<Arc<Barrier>>,
}

impl FaultyFarmStore {
    pub fn new(inner: Arc<dyn FarmStore>) -> Self {
        Self { inner, failing_meal: None, read_barrier: None, release_barrier: None }
    }
}

#[async_trait]
impl FarmStore for FaultyFarmStore {
    async fn get_farm(&self, farm_id: FarmId) -> Result<Option<Farm>> {
        let farm = self.inner.get_farm(farm_id).await?;
        if let Some(barrier) = &self.read_barrier {
            barrier.wait().await;
        }
        if let Some(barrier) = &self.release_barrier {
            barrier.wait().await;
        }
        Ok(farm)
    }

    async fn conditional_decrement_meal_quantity(
        &self,
        farm_id: FarmId,
        meal_id: MealId,
        amount: i32,
    ) -> Result<DecrementOutcome> {
        if self.failing_meal == Some(meal_id) {
            return Err(anyhow!("write timed out"));
        }
        self.inner.conditional_decrement_meal_quantity(farm_id, meal_id, amount).await
    }

    async fn restore_meal_quantity(&self, farm_id: FarmId, meal_id: MealId, amount: i32) -> Result<()> {
        self.inner.restore_meal_quantity(farm_id, meal_id, amount).await
    }

    async fn list_farms(&self, location: Option<&str>) -> Result<Vec<Farm>> {
        self.inner.list_farms(location).await
    }

    async fn featured_farms(&self, limit: usize) -> Result<Vec<Farm>> {
        self.inner.featured_farms(limit).await
    }

    async fn create_farm(&self, farm: NewFarm) -> Result<Farm> {
        self.inner.create_farm(farm).await
    }

    async fn update_farm(&self, farm_id: FarmId, farm: NewFarm) -> Result<Option<Farm>> {
        self.inner.update_farm(farm_id, farm).await
    }

    async fn available_dates(&self) -> Result<Vec<NaiveDate>> {
        self.inner.available_dates().await
    }
}

pub struct Harness {
    pub farm: Farm,
    pub farms: Arc<InMemoryFarmStore>,
    pub bookings: Arc<InMemoryBookingStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub processor: BookingProcessor,
}

impl Harness {
    pub fn new(farm: Farm) -> Self {
        let farms = Arc::new(InMemoryFarmStore::with_farms(vec![farm.clone()]));
        let bookings = Arc::new(InMemoryBookingStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = BookingProcessor::new(farms.clone(), bookings.clone(), notifier.clone());
        Self { farm, farms, bookings, notifier, processor }
    }

    pub fn breakfast(&self) -> MealId {
        self.farm.meals[0].id
    }

    pub fn lunch(&self) -> MealId {
        self.farm.meals[1].id
    }

    pub async fn current_farm(&self) -> Farm {
        self.farms.get_farm(self.farm.id).await.unwrap().unwrap()
    }
}
