use anyhow::Result;
use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate, Utc};
use num_traits::FromPrimitive;
use shared::*;
use tracing::info;
use crate::store::FarmStore;

const SAMPLE_MEAL_QUANTITY: i32 = 20;

fn meal(name: &str, description: &str, price: f64) -> Result<NewMeal> {
    Ok(NewMeal {
        id: None,
        name: name.to_string(),
        description: description.to_string(),
        price: BigDecimal::from_f64(price)
            .ok_or_else(|| anyhow::anyhow!("Invalid sample price {}", price))?,
        quantity: SAMPLE_MEAL_QUANTITY,
    })
}

pub fn sample_farms(start: NaiveDate) -> Result<Vec<NewFarm>> {
    let week: Vec<NaiveDate> = (0..7).map(|offset| start + Duration::days(offset)).collect();

    Ok(vec![
        NewFarm {
            name: "Green Meadows Farm".to_string(),
            location: "Countryside".to_string(),
            description: "A beautiful farm with rolling hills and fresh air.".to_string(),
            images: vec!["https://example.com/farm1.jpg".to_string()],
            meals: vec![
                meal("Farm Breakfast", "Fresh eggs and bacon", 15.0)?,
                meal("Picnic Lunch", "Sandwiches and fruit", 20.0)?,
            ],
            availability_dates: week.clone(),
        },
        NewFarm {
            name: "Sunset Valley Ranch".to_string(),
            location: "Mountain".to_string(),
            description: "Experience farm life with a stunning mountain backdrop.".to_string(),
            images: vec!["https://example.com/farm2.jpg".to_string()],
            meals: vec![
                meal("Cowboy Dinner", "Hearty stew and cornbread", 25.0)?,
                meal("Mountain Brunch", "Pancakes with local berries", 18.0)?,
            ],
            availability_dates: week,
        },
    ])
}

/// Inserts the sample farms unless the store already holds farms.
/// Returns the number of farms inserted.
pub async fn seed_sample_data(farms: &dyn FarmStore) -> Result<usize> {
    if !farms.list_farms(None).await?.is_empty() {
        info!("Farms already present, skipping sample data");
        return Ok(0);
    }

    let samples = sample_farms(Utc::now().date_naive())?;
    let count = samples.len();
    for farm in samples {
        farms.create_farm(farm).await?;
    }

    info!("Sample data added successfully ({} farms)", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryFarmStore;

    #[tokio::test]
    async fn seeding_is_skipped_when_farms_exist() {
        let store = InMemoryFarmStore::new();

        assert_eq!(seed_sample_data(&store).await.unwrap(), 2);
        assert_eq!(seed_sample_data(&store).await.unwrap(), 0);

        let farms = store.list_farms(None).await.unwrap();
        assert_eq!(farms.len(), 2);
        assert_eq!(farms[0].name, "Green Meadows Farm");
        assert_eq!(farms[0].availability_dates.len(), 7);
    }
}
