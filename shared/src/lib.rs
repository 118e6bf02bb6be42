use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;
use uuid::Uuid;

pub type FarmId = Uuid;
pub type MealId = Uuid;
pub type BookingId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: MealId,
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    /// Remaining bookable units across the farm's whole availability window.
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Farm {
    pub id: FarmId,
    pub name: String,
    pub location: String,
    pub description: String,
    pub images: Vec<String>,
    pub meals: Vec<Meal>,
    pub availability_dates: BTreeSet<NaiveDate>,
}

impl Farm {
    pub fn is_available_on(&self, date: NaiveDate) -> bool {
        self.availability_dates.contains(&date)
    }

    pub fn meal(&self, meal_id: MealId) -> Option<&Meal> {
        self.meals.iter().find(|meal| meal.id == meal_id)
    }
}

/// Operator-supplied meal. An `id` keeps an existing meal's identity across
/// updates; meals without one are assigned a fresh identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMeal {
    #[serde(default)]
    pub id: Option<MealId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: BigDecimal,
    #[serde(default)]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFarm {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub meals: Vec<NewMeal>,
    #[serde(default)]
    pub availability_dates: Vec<NaiveDate>,
}

impl NewFarm {
    pub fn validate(&self) -> Result<(), String> {
        let zero = BigDecimal::from(0);
        let mut ids = HashSet::new();
        for meal in &self.meals {
            if let Some(id) = meal.id {
                if !ids.insert(id) {
                    return Err(format!("meal id {} appears more than once", id));
                }
            }
            if meal.price < zero {
                return Err(format!("price of {} must not be negative", meal.name));
            }
            if meal.quantity < 0 {
                return Err(format!("quantity of {} must not be negative", meal.name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingLineItem {
    pub meal_id: MealId,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub farm_id: FarmId,
    pub date: NaiveDate,
    pub line_items: Vec<BookingLineItem>,
    pub requester_email: String,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.line_items.is_empty() {
            return Err(BookingError::InvalidRequest(
                "at least one meal must be booked".to_string(),
            ));
        }
        if let Some(item) = self.line_items.iter().find(|item| item.quantity <= 0) {
            return Err(BookingError::InvalidRequest(format!(
                "quantity for meal {} must be positive",
                item.meal_id
            )));
        }
        Ok(())
    }

    /// Total requested quantity per meal, in order of first appearance.
    pub fn requested_quantities(&self) -> Vec<(MealId, i64)> {
        let mut totals: Vec<(MealId, i64)> = Vec::new();
        for item in &self.line_items {
            match totals.iter_mut().find(|(meal_id, _)| *meal_id == item.meal_id) {
                Some((_, total)) => *total += i64::from(item.quantity),
                None => totals.push((item.meal_id, i64::from(item.quantity))),
            }
        }
        totals
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    pub farm_id: FarmId,
    pub date: NaiveDate,
    pub line_items: Vec<BookingLineItem>,
    pub requester_email: String,
}

impl From<BookingRequest> for NewBooking {
    fn from(request: BookingRequest) -> Self {
        Self {
            farm_id: request.farm_id,
            date: request.date,
            line_items: request.line_items,
            requester_email: request.requester_email,
        }
    }
}

/// Immutable record of a committed reservation. Line items keep their meal
/// identifiers even if the farm later retires those meals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub farm_id: FarmId,
    pub date: NaiveDate,
    pub line_items: Vec<BookingLineItem>,
    pub requester_email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent { reference: Option<String> },
    Failed { reason: String },
}

impl NotificationStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, NotificationStatus::Failed { .. })
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            NotificationStatus::Sent { reference } => reference.as_deref(),
            NotificationStatus::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub booking_id: BookingId,
    pub notification: NotificationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub id: Uuid,
    pub from: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationMessage {
    pub fn new(from: String, recipient: String, subject: String, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            recipient,
            subject,
            body,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Invalid booking request: {0}")]
    InvalidRequest(String),

    #[error("Farm not found")]
    NotFound,

    #[error("Farm is not available on this date")]
    Unavailable,

    #[error("Not enough {} available", meal_label(.meal_id, .meal_name))]
    InsufficientInventory {
        meal_id: MealId,
        meal_name: Option<String>,
    },

    #[error("Error processing booking")]
    TransactionFailure(#[source] anyhow::Error),
}

impl BookingError {
    pub fn insufficient(meal_id: MealId, meal_name: Option<String>) -> Self {
        BookingError::InsufficientInventory { meal_id, meal_name }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::InvalidRequest(_) => "invalid_request",
            BookingError::NotFound => "not_found",
            BookingError::Unavailable => "unavailable",
            BookingError::InsufficientInventory { .. } => "insufficient_inventory",
            BookingError::TransactionFailure(_) => "transaction_failure",
        }
    }
}

fn meal_label(meal_id: &MealId, meal_name: &Option<String>) -> String {
    match meal_name {
        Some(name) => name.clone(),
        None => meal_id.to_string(),
    }
}
