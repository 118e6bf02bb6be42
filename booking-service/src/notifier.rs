use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rdkafka::producer::{FutureProducer, FutureRecord};
use shared::*;
use std::time::Duration;
use tracing::info;

pub const CONFIRMATION_SUBJECT: &str = "Booking Confirmation";

#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Returns a delivery reference when the channel provides one.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<Option<String>>;
}

/// Publishes confirmation messages to a topic consumed by the mail relay.
pub struct KafkaNotificationSender {
    producer: FutureProducer,
    topic: String,
    from: String,
}

impl KafkaNotificationSender {
    pub fn new(producer: FutureProducer, topic: String, from: String) -> Self {
        Self { producer, topic, from }
    }
}

#[async_trait]
impl NotificationSender for KafkaNotificationSender {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<Option<String>> {
        let message = NotificationMessage::new(
            self.from.clone(),
            recipient.to_string(),
            subject.to_string(),
            body.to_string(),
        );
        let json = serde_json::to_string(&message)?;
        let record = FutureRecord::to(&self.topic)
            .payload(&json)
            .key(recipient);

        let (partition, offset) = self.producer.send(record, Duration::from_secs(5)).await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish notification: {}", e))?;

        info!("Published notification {} to {}", message.id, self.topic);
        Ok(Some(format!("{}:{}:{}", self.topic, partition, offset)))
    }
}

/// Meals are listed by name; line items whose meal is no longer on the farm
/// fall back to the meal id.
pub fn confirmation_body(farm: &Farm, date: NaiveDate, line_items: &[BookingLineItem]) -> String {
    let meals = line_items
        .iter()
        .map(|item| {
            let name = farm
                .meal(item.meal_id)
                .map(|meal| meal.name.clone())
                .unwrap_or_else(|| item.meal_id.to_string());
            format!("{} x{}", name, item.quantity)
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Your booking for {} on {} has been confirmed. Meals: {}",
        farm.name,
        date.format("%Y-%m-%d"),
        meals
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    #[test]
    fn body_lists_meals_by_name() {
        let breakfast = Uuid::new_v4();
        let farm = Farm {
            id: Uuid::new_v4(),
            name: "Green Meadows Farm".to_string(),
            location: "Countryside".to_string(),
            description: String::new(),
            images: vec![],
            meals: vec![Meal {
                id: breakfast,
                name: "Farm Breakfast".to_string(),
                description: String::new(),
                price: BigDecimal::from(15),
                quantity: 5,
            }],
            availability_dates: BTreeSet::new(),
        };
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let body = confirmation_body(
            &farm,
            date,
            &[BookingLineItem { meal_id: breakfast, quantity: 3 }],
        );

        assert_eq!(
            body,
            "Your booking for Green Meadows Farm on 2024-06-01 has been confirmed. Meals: Farm Breakfast x3"
        );
    }
}
