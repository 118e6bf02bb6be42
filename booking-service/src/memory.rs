//! Process-local stores. Each mutation happens under one lock, so the
//! conditional decrement has the same write-time guarantee as the SQL guard.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use shared::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;
use crate::store::{BookingStore, DecrementOutcome, FarmStore};

#[derive(Default)]
pub struct InMemoryFarmStore {
    farms: Mutex<Vec<Farm>>,
}

impl InMemoryFarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_farms(farms: Vec<Farm>) -> Self {
        Self { farms: Mutex::new(farms) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Farm>>> {
        self.farms.lock().map_err(|_| anyhow!("Farm store lock poisoned"))
    }
}

fn build_meals(meals: Vec<NewMeal>, existing: &[Meal]) -> Vec<Meal> {
    let mut taken = HashSet::new();
    meals
        .into_iter()
        .map(|meal| Meal {
            id: meal
                .id
                .filter(|id| existing.iter().any(|current| current.id == *id) && taken.insert(*id))
                .unwrap_or_else(Uuid::new_v4),
            name: meal.name,
            description: meal.description,
            price: meal.price,
            quantity: meal.quantity,
        })
        .collect()
}

#[async_trait]
impl FarmStore for InMemoryFarmStore {
    async fn get_farm(&self, farm_id: FarmId) -> Result<Option<Farm>> {
        Ok(self.lock()?.iter().find(|farm| farm.id == farm_id).cloned())
    }

    async fn conditional_decrement_meal_quantity(
        &self,
        farm_id: FarmId,
        meal_id: MealId,
        amount: i32,
    ) -> Result<DecrementOutcome> {
        let mut farms = self.lock()?;
        let meal = farms
            .iter_mut()
            .find(|farm| farm.id == farm_id)
            .and_then(|farm| farm.meals.iter_mut().find(|meal| meal.id == meal_id));

        match meal {
            Some(meal) if meal.quantity >= amount => {
                meal.quantity -= amount;
                Ok(DecrementOutcome::Applied)
            }
            _ => Ok(DecrementOutcome::PreconditionFailed),
        }
    }

    async fn restore_meal_quantity(&self, farm_id: FarmId, meal_id: MealId, amount: i32) -> Result<()> {
        let mut farms = self.lock()?;
        if let Some(meal) = farms
            .iter_mut()
            .find(|farm| farm.id == farm_id)
            .and_then(|farm| farm.meals.iter_mut().find(|meal| meal.id == meal_id))
        {
            meal.quantity = meal.quantity.saturating_add(amount);
        }
        Ok(())
    }

    async fn list_farms(&self, location: Option<&str>) -> Result<Vec<Farm>> {
        let needle = location.map(str::to_lowercase).unwrap_or_default();
        Ok(self
            .lock()?
            .iter()
            .filter(|farm| farm.location.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn featured_farms(&self, limit: usize) -> Result<Vec<Farm>> {
        Ok(self.lock()?.iter().take(limit).cloned().collect())
    }

    async fn create_farm(&self, farm: NewFarm) -> Result<Farm> {
        let created = Farm {
            id: Uuid::new_v4(),
            name: farm.name,
            location: farm.location,
            description: farm.description,
            images: farm.images,
            meals: build_meals(farm.meals, &[]),
            availability_dates: farm.availability_dates.into_iter().collect(),
        };
        self.lock()?.push(created.clone());
        Ok(created)
    }

    async fn update_farm(&self, farm_id: FarmId, farm: NewFarm) -> Result<Option<Farm>> {
        let mut farms = self.lock()?;
        let Some(current) = farms.iter_mut().find(|current| current.id == farm_id) else {
            return Ok(None);
        };

        current.meals = build_meals(farm.meals, &current.meals);
        current.name = farm.name;
        current.location = farm.location;
        current.description = farm.description;
        current.images = farm.images;
        current.availability_dates = farm.availability_dates.into_iter().collect();
        Ok(Some(current.clone()))
    }

    async fn available_dates(&self) -> Result<Vec<NaiveDate>> {
        let dates: BTreeSet<NaiveDate> = self
            .lock()?
            .iter()
            .flat_map(|farm| farm.availability_dates.iter().copied())
            .collect();
        Ok(dates.into_iter().collect())
    }
}

#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: Mutex<HashMap<BookingId, Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bookings.lock().map(|bookings| bookings.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<BookingId, Booking>>> {
        self.bookings.lock().map_err(|_| anyhow!("Booking store lock poisoned"))
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn create_booking(&self, booking: NewBooking) -> Result<BookingId> {
        let booking_id = Uuid::new_v4();
        let record = Booking {
            id: booking_id,
            farm_id: booking.farm_id,
            date: booking.date,
            line_items: booking.line_items,
            requester_email: booking.requester_email,
            created_at: Utc::now(),
        };
        self.lock()?.insert(booking_id, record);
        Ok(booking_id)
    }

    async fn delete_booking(&self, booking_id: BookingId) -> Result<()> {
        self.lock()?.remove(&booking_id);
        Ok(())
    }

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>> {
        Ok(self.lock()?.get(&booking_id).cloned())
    }
}
