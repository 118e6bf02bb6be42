use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use shared::*;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;
use crate::models::*;
use crate::schema::*;
use crate::store::{BookingStore, DecrementOutcome, FarmStore};

pub type DbPool = Pool<AsyncPgConnection>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn run_migrations(database_url: &str) -> Result<()> {
    let mut conn = diesel::PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    Ok(())
}

pub async fn connect_pool(database_url: &str, max_size: u32) -> Result<DbPool> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = bb8::Pool::builder().max_size(max_size).build(config).await?;
    Ok(pool)
}

#[derive(Clone)]
pub struct PgFarmStore {
    pool: DbPool,
}

impl PgFarmStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Clone)]
pub struct PgBookingStore {
    pool: DbPool,
}

impl PgBookingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn like_pattern(fragment: &str) -> String {
    let escaped = fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

async fn load_farms(conn: &mut AsyncPgConnection, db_farms: Vec<DbFarm>) -> Result<Vec<Farm>> {
    if db_farms.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = db_farms.iter().map(|farm| farm.id).collect();

    let meal_rows = meals::table
        .filter(meals::farm_id.eq_any(ids.clone()))
        .order((meals::farm_id.asc(), meals::position.asc()))
        .load::<DbMeal>(conn)
        .await?;

    let date_rows = farm_availability::table
        .filter(farm_availability::farm_id.eq_any(ids))
        .load::<DbAvailability>(conn)
        .await?;

    let mut meals_by_farm: HashMap<Uuid, Vec<DbMeal>> = HashMap::new();
    for meal in meal_rows {
        meals_by_farm.entry(meal.farm_id).or_default().push(meal);
    }
    let mut dates_by_farm: HashMap<Uuid, Vec<DbAvailability>> = HashMap::new();
    for row in date_rows {
        dates_by_farm.entry(row.farm_id).or_default().push(row);
    }

    db_farms
        .into_iter()
        .map(|db_farm| {
            let meals = meals_by_farm.remove(&db_farm.id).unwrap_or_default();
            let dates = dates_by_farm.remove(&db_farm.id).unwrap_or_default();
            Farm::try_from(FarmRows { farm: db_farm, meals, dates })
        })
        .collect()
}

async fn load_farm(conn: &mut AsyncPgConnection, farm_id: FarmId) -> Result<Option<Farm>> {
    let db_farm = farms::table
        .find(farm_id)
        .first::<DbFarm>(conn)
        .await
        .optional()?;

    match db_farm {
        Some(db_farm) => Ok(load_farms(conn, vec![db_farm]).await?.pop()),
        None => Ok(None),
    }
}

async fn replace_availability(conn: &mut AsyncPgConnection, farm_id: FarmId, dates: &[NaiveDate]) -> Result<()> {
    diesel::delete(farm_availability::table.filter(farm_availability::farm_id.eq(farm_id)))
        .execute(conn)
        .await?;

    let rows = availability_rows(farm_id, dates);
    if !rows.is_empty() {
        diesel::insert_into(farm_availability::table)
            .values(&rows)
            .execute(conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl FarmStore for PgFarmStore {
    async fn get_farm(&self, farm_id: FarmId) -> Result<Option<Farm>> {
        let mut conn = self.pool.get().await?;
        load_farm(&mut conn, farm_id).await
    }

    async fn conditional_decrement_meal_quantity(
        &self,
        farm_id: FarmId,
        meal_id: MealId,
        amount: i32,
    ) -> Result<DecrementOutcome> {
        let mut conn = self.pool.get().await?;

        // The quantity guard in the WHERE clause is evaluated against the row
        // as it is at write time, so concurrent bookings cannot oversell.
        let updated = diesel::update(
            meals::table
                .filter(meals::farm_id.eq(farm_id))
                .filter(meals::id.eq(meal_id))
                .filter(meals::quantity.ge(amount)),
        )
        .set(meals::quantity.eq(meals::quantity - amount))
        .execute(&mut conn)
        .await?;

        if updated == 1 {
            Ok(DecrementOutcome::Applied)
        } else {
            Ok(DecrementOutcome::PreconditionFailed)
        }
    }

    async fn restore_meal_quantity(&self, farm_id: FarmId, meal_id: MealId, amount: i32) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            meals::table
                .filter(meals::farm_id.eq(farm_id))
                .filter(meals::id.eq(meal_id)),
        )
        .set(meals::quantity.eq(meals::quantity + amount))
        .execute(&mut conn)
        .await?;

        if updated == 0 {
            warn!("Meal {} on farm {} disappeared before its quantity could be restored", meal_id, farm_id);
        }
        Ok(())
    }

    async fn list_farms(&self, location: Option<&str>) -> Result<Vec<Farm>> {
        let mut conn = self.pool.get().await?;

        let mut query = farms::table
            .order((farms::created_at.asc(), farms::id.asc()))
            .into_boxed();
        if let Some(location) = location.filter(|location| !location.is_empty()) {
            query = query.filter(farms::location.ilike(like_pattern(location)));
        }
        let db_farms = query.load::<DbFarm>(&mut conn).await?;

        load_farms(&mut conn, db_farms).await
    }

    async fn featured_farms(&self, limit: usize) -> Result<Vec<Farm>> {
        let mut conn = self.pool.get().await?;

        let db_farms = farms::table
            .order((farms::created_at.asc(), farms::id.asc()))
            .limit(limit as i64)
            .load::<DbFarm>(&mut conn)
            .await?;

        load_farms(&mut conn, db_farms).await
    }

    async fn create_farm(&self, farm: NewFarm) -> Result<Farm> {
        let mut conn = self.pool.get().await?;
        let farm_id = Uuid::new_v4();
        let new_farm = NewDbFarm::from_new_farm(farm_id, &farm)?;
        let new_meals = meal_rows(farm_id, &farm.meals, &HashSet::new());

        let created = conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                diesel::insert_into(farms::table)
                    .values(&new_farm)
                    .execute(conn)
                    .await?;

                if !new_meals.is_empty() {
                    diesel::insert_into(meals::table)
                        .values(&new_meals)
                        .execute(conn)
                        .await?;
                }

                replace_availability(conn, farm_id, &farm.availability_dates).await?;

                load_farm(conn, farm_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Farm {} vanished after insert", farm_id))
            })
        }).await?;

        info!("Created farm {} ({})", created.id, created.name);
        Ok(created)
    }

    async fn update_farm(&self, farm_id: FarmId, farm: NewFarm) -> Result<Option<Farm>> {
        let mut conn = self.pool.get().await?;
        let changes = DbFarmChanges::from_new_farm(&farm)?;

        let updated = conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                let touched = diesel::update(farms::table.find(farm_id))
                    .set(&changes)
                    .execute(conn)
                    .await?;
                if touched == 0 {
                    return Ok(None);
                }

                let existing: HashSet<Uuid> = meals::table
                    .filter(meals::farm_id.eq(farm_id))
                    .select(meals::id)
                    .load::<Uuid>(conn)
                    .await?
                    .into_iter()
                    .collect();

                let rows = meal_rows(farm_id, &farm.meals, &existing);
                let kept: Vec<Uuid> = rows
                    .iter()
                    .map(|row| row.id)
                    .filter(|id| existing.contains(id))
                    .collect();

                diesel::delete(
                    meals::table
                        .filter(meals::farm_id.eq(farm_id))
                        .filter(meals::id.ne_all(kept)),
                )
                .execute(conn)
                .await?;

                for row in &rows {
                    if existing.contains(&row.id) {
                        diesel::update(meals::table.find(row.id))
                            .set((
                                meals::position.eq(row.position),
                                meals::name.eq(&row.name),
                                meals::description.eq(&row.description),
                                meals::price.eq(&row.price),
                                meals::quantity.eq(row.quantity),
                            ))
                            .execute(conn)
                            .await?;
                    } else {
                        diesel::insert_into(meals::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }
                }

                replace_availability(conn, farm_id, &farm.availability_dates).await?;

                load_farm(conn, farm_id).await
            })
        }).await?;

        if let Some(farm) = &updated {
            info!("Updated farm {} ({})", farm.id, farm.name);
        }
        Ok(updated)
    }

    async fn available_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut conn = self.pool.get().await?;

        let dates = farm_availability::table
            .select(farm_availability::date)
            .distinct()
            .order(farm_availability::date.asc())
            .load::<NaiveDate>(&mut conn)
            .await?;
        Ok(dates)
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn create_booking(&self, booking: NewBooking) -> Result<BookingId> {
        let mut conn = self.pool.get().await?;
        let booking_id = Uuid::new_v4();

        let new_booking = NewDbBooking {
            id: booking_id,
            farm_id: booking.farm_id,
            date: booking.date,
            requester_email: booking.requester_email,
        };
        let line_items: Vec<DbBookingLineItem> = booking
            .line_items
            .iter()
            .enumerate()
            .map(|(position, item)| DbBookingLineItem {
                booking_id,
                position: position as i32,
                meal_id: item.meal_id,
                quantity: item.quantity,
            })
            .collect();

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                diesel::insert_into(bookings::table)
                    .values(&new_booking)
                    .execute(conn)
                    .await?;

                diesel::insert_into(booking_line_items::table)
                    .values(&line_items)
                    .execute(conn)
                    .await?;

                Ok(())
            })
        }).await?;

        Ok(booking_id)
    }

    async fn delete_booking(&self, booking_id: BookingId) -> Result<()> {
        let mut conn = self.pool.get().await?;

        diesel::delete(bookings::table.find(booking_id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>> {
        let mut conn = self.pool.get().await?;

        let db_booking = bookings::table
            .find(booking_id)
            .first::<DbBooking>(&mut conn)
            .await
            .optional()?;

        let db_booking = match db_booking {
            Some(booking) => booking,
            None => return Ok(None),
        };

        let items = booking_line_items::table
            .filter(booking_line_items::booking_id.eq(booking_id))
            .order(booking_line_items::position.asc())
            .load::<DbBookingLineItem>(&mut conn)
            .await?;

        Ok(Some(Booking::from(BookingRows { booking: db_booking, items })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("count"), "%count%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
