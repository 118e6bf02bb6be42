//! Concurrent bookings against the same meal must never oversell.

mod common;

use booking_service::handlers::BookingProcessor;
use booking_service::memory::{InMemoryBookingStore, InMemoryFarmStore};
use common::*;
use futures::future::join_all;
use shared::*;
use std::sync::Arc;
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_bookings_for_the_last_units_race_and_one_wins() {
    let farm = green_meadows(3, 5);
    let breakfast = farm.meals[0].id;
    let inner = Arc::new(InMemoryFarmStore::with_farms(vec![farm.clone()]));
    let bookings = Arc::new(InMemoryBookingStore::new());

    // Both bookings read the farm (and pass the advisory check) before
    // either one writes.
    let mut store = FaultyFarmStore::new(inner.clone());
    store.read_barrier = Some(Arc::new(Barrier::new(2)));
    let processor = BookingProcessor::new(
        Arc::new(store),
        bookings.clone(),
        Arc::new(RecordingNotifier::default()),
    );

    let attempts = (0..2).map(|_| {
        let processor = processor.clone();
        let request = booking_request(&farm, available_date(), &[(breakfast, 3)]);
        tokio::spawn(async move { processor.submit_booking(request).await })
    });
    let results: Vec<Result<BookingConfirmation, BookingError>> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|result| result.is_ok()).count();
    let oversold = results
        .iter()
        .filter(|result| matches!(result, Err(BookingError::InsufficientInventory { meal_id, .. }) if *meal_id == breakfast))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(oversold, 1);
    assert_eq!(meal_quantity(inner.as_ref(), farm.id, breakfast).await, 0);
    assert_eq!(bookings.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_single_unit_bookings_sell_exactly_the_stock() {
    let farm = green_meadows(10, 5);
    let breakfast = farm.meals[0].id;
    let harness = Harness::new(farm);

    let attempts = (0..25).map(|_| {
        let processor = harness.processor.clone();
        let request = booking_request(&harness.farm, available_date(), &[(breakfast, 1)]);
        tokio::spawn(async move { processor.submit_booking(request).await })
    });
    let results = join_all(attempts).await;

    let successes = results
        .iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();

    assert_eq!(successes, 10);
    assert_eq!(meal_quantity(harness.farms.as_ref(), harness.farm.id, breakfast).await, 0);
    assert_eq!(harness.bookings.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn losing_multi_meal_booking_releases_what_it_took() {
    let farm = green_meadows(5, 2);
    let breakfast = farm.meals[0].id;
    let lunch = farm.meals[1].id;
    let inner = Arc::new(InMemoryFarmStore::with_farms(vec![farm.clone()]));
    let bookings = Arc::new(InMemoryBookingStore::new());

    let mut store = FaultyFarmStore::new(inner.clone());
    store.read_barrier = Some(Arc::new(Barrier::new(2)));
    let processor = BookingProcessor::new(
        Arc::new(store),
        bookings.clone(),
        Arc::new(RecordingNotifier::default()),
    );

    // Each booking wants one breakfast and both lunches; only one can have
    // the lunches, and the loser must hand its breakfast back.
    let attempts = (0..2).map(|_| {
        let processor = processor.clone();
        let request = booking_request(&farm, available_date(), &[(breakfast, 1), (lunch, 2)]);
        tokio::spawn(async move { processor.submit_booking(request).await })
    });
    let results = join_all(attempts).await;

    let successes = results
        .iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(meal_quantity(inner.as_ref(), farm.id, breakfast).await, 4);
    assert_eq!(meal_quantity(inner.as_ref(), farm.id, lunch).await, 0);
    assert_eq!(bookings.len(), 1);
}
