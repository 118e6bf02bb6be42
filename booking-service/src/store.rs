use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use shared::*;

/// Outcome of a conditional decrement. Storage failures travel as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    Applied,
    /// The meal is missing or its quantity was below the requested amount
    /// at the moment of the write.
    PreconditionFailed,
}

#[async_trait]
pub trait FarmStore: Send + Sync {
    async fn get_farm(&self, farm_id: FarmId) -> Result<Option<Farm>>;

    /// Subtracts `amount` from the meal's quantity only if the quantity is
    /// still at least `amount` when the write lands.
    async fn conditional_decrement_meal_quantity(
        &self,
        farm_id: FarmId,
        meal_id: MealId,
        amount: i32,
    ) -> Result<DecrementOutcome>;

    /// Undoes an applied decrement.
    async fn restore_meal_quantity(&self, farm_id: FarmId, meal_id: MealId, amount: i32) -> Result<()>;

    async fn list_farms(&self, location: Option<&str>) -> Result<Vec<Farm>>;

    async fn featured_farms(&self, limit: usize) -> Result<Vec<Farm>>;

    async fn create_farm(&self, farm: NewFarm) -> Result<Farm>;

    async fn update_farm(&self, farm_id: FarmId, farm: NewFarm) -> Result<Option<Farm>>;

    async fn available_dates(&self) -> Result<Vec<NaiveDate>>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create_booking(&self, booking: NewBooking) -> Result<BookingId>;

    /// Only used to roll back a booking whose inventory could not be committed.
    async fn delete_booking(&self, booking_id: BookingId) -> Result<()>;

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>>;
}
