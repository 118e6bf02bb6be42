use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::*;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::farms)]
pub struct DbFarm {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub description: String,
    pub images: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::farms)]
pub struct NewDbFarm {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub description: String,
    pub images: serde_json::Value,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::farms)]
pub struct DbFarmChanges {
    pub name: String,
    pub location: String,
    pub description: String,
    pub images: serde_json::Value,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::meals)]
pub struct DbMeal {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub position: i32,
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::farm_availability)]
pub struct DbAvailability {
    pub farm_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct DbBooking {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub date: NaiveDate,
    pub requester_email: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct NewDbBooking {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub date: NaiveDate,
    pub requester_email: String,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::booking_line_items)]
pub struct DbBookingLineItem {
    pub booking_id: Uuid,
    pub position: i32,
    pub meal_id: Uuid,
    pub quantity: i32,
}

impl NewDbFarm {
    pub fn from_new_farm(id: FarmId, farm: &NewFarm) -> anyhow::Result<Self> {
        Ok(Self {
            id,
            name: farm.name.clone(),
            location: farm.location.clone(),
            description: farm.description.clone(),
            images: serde_json::to_value(&farm.images)?,
        })
    }
}

impl DbFarmChanges {
    pub fn from_new_farm(farm: &NewFarm) -> anyhow::Result<Self> {
        Ok(Self {
            name: farm.name.clone(),
            location: farm.location.clone(),
            description: farm.description.clone(),
            images: serde_json::to_value(&farm.images)?,
            updated_at: Some(Utc::now()),
        })
    }
}

/// Rows for a farm's meals, in list order. A client-supplied id is kept only
/// when it is one of `existing` and has not already been used earlier in the
/// list; every other meal gets a fresh id.
pub fn meal_rows(farm_id: FarmId, meals: &[NewMeal], existing: &HashSet<MealId>) -> Vec<DbMeal> {
    let mut taken = HashSet::new();
    meals
        .iter()
        .enumerate()
        .map(|(position, meal)| DbMeal {
            id: meal
                .id
                .filter(|id| existing.contains(id) && taken.insert(*id))
                .unwrap_or_else(Uuid::new_v4),
            farm_id,
            position: position as i32,
            name: meal.name.clone(),
            description: meal.description.clone(),
            price: meal.price.clone(),
            quantity: meal.quantity,
        })
        .collect()
}

pub fn availability_rows(farm_id: FarmId, dates: &[NaiveDate]) -> Vec<DbAvailability> {
    let mut dates = dates.to_vec();
    dates.sort();
    dates.dedup();
    dates
        .into_iter()
        .map(|date| DbAvailability { farm_id, date })
        .collect()
}

impl From<DbMeal> for Meal {
    fn from(meal: DbMeal) -> Self {
        Self {
            id: meal.id,
            name: meal.name,
            description: meal.description,
            price: meal.price,
            quantity: meal.quantity,
        }
    }
}

/// A farm row together with its meal and availability rows.
#[derive(Debug, Clone)]
pub struct FarmRows {
    pub farm: DbFarm,
    pub meals: Vec<DbMeal>,
    pub dates: Vec<DbAvailability>,
}

impl TryFrom<FarmRows> for Farm {
    type Error = anyhow::Error;

    fn try_from(rows: FarmRows) -> Result<Self, Self::Error> {
        let FarmRows { farm: db_farm, mut meals, dates } = rows;
        let images: Vec<String> = serde_json::from_value(db_farm.images)?;
        meals.sort_by_key(|meal| meal.position);

        Ok(Self {
            id: db_farm.id,
            name: db_farm.name,
            location: db_farm.location,
            description: db_farm.description,
            images,
            meals: meals.into_iter().map(Meal::from).collect(),
            availability_dates: dates.into_iter().map(|row| row.date).collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct BookingRows {
    pub booking: DbBooking,
    pub items: Vec<DbBookingLineItem>,
}

impl From<BookingRows> for Booking {
    fn from(rows: BookingRows) -> Self {
        let BookingRows { booking: db_booking, mut items } = rows;
        items.sort_by_key(|item| item.position);

        Self {
            id: db_booking.id,
            farm_id: db_booking.farm_id,
            date: db_booking.date,
            line_items: items
                .into_iter()
                .map(|item| BookingLineItem {
                    meal_id: item.meal_id,
                    quantity: item.quantity,
                })
                .collect(),
            requester_email: db_booking.requester_email,
            created_at: db_booking.created_at.unwrap_or_else(Utc::now),
        }
    }
}
