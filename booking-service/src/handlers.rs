use shared::*;
use std::sync::Arc;
use tracing::{error, info, warn};
use crate::notifier::{confirmation_body, NotificationSender, CONFIRMATION_SUBJECT};
use crate::store::{BookingStore, DecrementOutcome, FarmStore};

/// Validates booking requests against farm state, commits the booking and
/// its inventory decrements as a unit, then sends a best-effort confirmation.
#[derive(Clone)]
pub struct BookingProcessor {
    farms: Arc<dyn FarmStore>,
    bookings: Arc<dyn BookingStore>,
    notifier: Arc<dyn NotificationSender>,
}

impl BookingProcessor {
    pub fn new(
        farms: Arc<dyn FarmStore>,
        bookings: Arc<dyn BookingStore>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self { farms, bookings, notifier }
    }

    pub async fn submit_booking(&self, request: BookingRequest) -> Result<BookingConfirmation, BookingError> {
        request.validate()?;

        let farm = self
            .farms
            .get_farm(request.farm_id)
            .await
            .map_err(|e| {
                error!("Failed to load farm {}: {}", request.farm_id, e);
                BookingError::TransactionFailure(e)
            })?
            .ok_or(BookingError::NotFound)?;

        if !farm.is_available_on(request.date) {
            warn!("Farm {} is not available on {}", farm.id, request.date);
            return Err(BookingError::Unavailable);
        }

        if let Err(e) = check_inventory(&farm, &request) {
            warn!("Booking for farm {} rejected: {}", farm.id, e);
            return Err(e);
        }

        // The commit runs on its own task so a dropped caller cannot leave a
        // booking half applied.
        let processor = self.clone();
        let commit_farm = farm.clone();
        let commit_request = request.clone();
        let booking_id = tokio::spawn(async move { processor.commit(&commit_farm, &commit_request).await })
            .await
            .map_err(|e| BookingError::TransactionFailure(anyhow::anyhow!("Booking commit task failed: {}", e)))??;

        info!("Booking {} committed for farm {} on {}", booking_id, farm.id, request.date);

        let notification = self.notify(&farm, &request).await;
        Ok(BookingConfirmation { booking_id, notification })
    }

    async fn commit(&self, farm: &Farm, request: &BookingRequest) -> Result<BookingId, BookingError> {
        let booking_id = self
            .bookings
            .create_booking(NewBooking::from(request.clone()))
            .await
            .map_err(|e| {
                error!("Failed to persist booking for farm {}: {}", farm.id, e);
                BookingError::TransactionFailure(e)
            })?;

        let mut applied: Vec<&BookingLineItem> = Vec::with_capacity(request.line_items.len());
        for item in &request.line_items {
            let failure = match self
                .farms
                .conditional_decrement_meal_quantity(farm.id, item.meal_id, item.quantity)
                .await
            {
                Ok(DecrementOutcome::Applied) => {
                    applied.push(item);
                    continue;
                }
                Ok(DecrementOutcome::PreconditionFailed) => {
                    warn!(
                        "Meal {} on farm {} was consumed concurrently, rolling back booking {}",
                        item.meal_id, farm.id, booking_id
                    );
                    BookingError::insufficient(item.meal_id, farm.meal(item.meal_id).map(|meal| meal.name.clone()))
                }
                Err(e) => {
                    error!("Failed to decrement meal {} on farm {}: {}", item.meal_id, farm.id, e);
                    BookingError::TransactionFailure(e)
                }
            };

            self.roll_back(farm.id, booking_id, &applied).await;
            return Err(failure);
        }

        Ok(booking_id)
    }

    async fn roll_back(&self, farm_id: FarmId, booking_id: BookingId, applied: &[&BookingLineItem]) {
        for item in applied.iter().rev() {
            if let Err(e) = self
                .farms
                .restore_meal_quantity(farm_id, item.meal_id, item.quantity)
                .await
            {
                error!(
                    "Failed to restore {} x{} on farm {} for booking {}: {}",
                    item.meal_id, item.quantity, farm_id, booking_id, e
                );
            }
        }

        if let Err(e) = self.bookings.delete_booking(booking_id).await {
            error!("Failed to delete rolled back booking {}: {}", booking_id, e);
        }
    }

    async fn notify(&self, farm: &Farm, request: &BookingRequest) -> NotificationStatus {
        let body = confirmation_body(farm, request.date, &request.line_items);

        match self
            .notifier
            .send(&request.requester_email, CONFIRMATION_SUBJECT, &body)
            .await
        {
            Ok(reference) => {
                info!("Confirmation sent to {}: {:?}", request.requester_email, reference);
                NotificationStatus::Sent { reference }
            }
            Err(e) => {
                warn!("Failed to send confirmation to {}: {}", request.requester_email, e);
                NotificationStatus::Failed { reason: e.to_string() }
            }
        }
    }
}

/// Checks the farm snapshot. This is advisory; the conditional decrement is
/// what actually guards the inventory.
fn check_inventory(farm: &Farm, request: &BookingRequest) -> Result<(), BookingError> {
    for (meal_id, requested) in request.requested_quantities() {
        match farm.meal(meal_id) {
            Some(meal) if i64::from(meal.quantity) >= requested => {}
            Some(meal) => return Err(BookingError::insufficient(meal_id, Some(meal.name.clone()))),
            None => return Err(BookingError::insufficient(meal_id, None)),
        }
    }
    Ok(())
}
