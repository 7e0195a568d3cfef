use chrono::{Days, NaiveDate};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{GoalProfile, Macros, NewFoodItem, Registration, round2};
use crate::service::Ledger;

const DEMO_BASE_WEIGHT: f64 = 75.0;

fn item(
    name: &str,
    food_type: &str,
    serving_size: &str,
    calories: f64,
    (protein, carbs, fat): (f64, f64, f64),
) -> NewFoodItem {
    NewFoodItem {
        name: name.to_string(),
        food_type: food_type.to_string(),
        serving_size: serving_size.to_string(),
        calories,
        macros: Macros {
            protein: Some(protein),
            carbs: Some(carbs),
            fat: Some(fat),
        },
    }
}

#[must_use]
pub fn sample_catalog() -> Vec<NewFoodItem> {
    vec![
        item("Apple", "Fruit", "1 medium (182g)", 95.0, (0.5, 25.0, 0.3)),
        item("Grilled Chicken Breast", "Meat", "100g", 165.0, (31.0, 0.0, 3.6)),
        item("Brown Rice", "Grain", "1 cup cooked (195g)", 215.0, (5.0, 45.0, 1.8)),
        item("Almonds", "Nuts", "1 ounce (28g)", 164.0, (6.0, 6.1, 14.2)),
        item("Broccoli", "Vegetable", "1 cup chopped (91g)", 31.0, (2.5, 6.0, 0.3)),
    ]
}

/// Insert the sample catalog items that are not already present by name.
/// Returns how many were added.
pub fn seed_catalog(ledger: &Ledger) -> Result<usize> {
    let mut added = 0;
    for food in sample_catalog() {
        if ledger.database().get_food_item_by_name(&food.name)?.is_some() {
            continue;
        }
        ledger.add_food_item(&food)?;
        added += 1;
    }
    Ok(added)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoSeed {
    pub user_id: Uuid,
    pub food_logs: usize,
    pub weights: usize,
    pub activities: usize,
}

fn days_before(today: NaiveDate, n: u64) -> Result<NaiveDate> {
    today
        .checked_sub_days(Days::new(n))
        .ok_or_else(|| LedgerError::invalid("date out of range"))
}

/// Register a demo user and give them a few days of history ending `today`:
/// chicken and rice for five days plus an apple today, a week of weights and
/// two days of activity.
pub fn seed_demo(
    ledger: &Ledger,
    email: &str,
    password: &str,
    today: NaiveDate,
) -> Result<DemoSeed> {
    seed_catalog(ledger)?;
    let db = ledger.database();
    let lookup = |name: &str| {
        db.get_food_item_by_name(name)?
            .ok_or_else(|| LedgerError::not_found(format!("{name} missing from catalog")))
    };
    let chicken = lookup("Grilled Chicken Breast")?;
    let rice = lookup("Brown Rice")?;
    let apple = lookup("Apple")?;

    let user = ledger.register(&Registration {
        name: "Demo User".to_string(),
        email: email.to_string(),
        password: password.to_string(),
        current_weight: Some(DEMO_BASE_WEIGHT),
        goals: GoalProfile {
            calorie_goal: Some(2000.0),
            protein_goal: Some(120.0),
            carbs_goal: Some(220.0),
            fat_goal: Some(65.0),
        },
    })?;

    let mut seeded = DemoSeed {
        user_id: user.id,
        ..DemoSeed::default()
    };

    for i in 0..5 {
        let day = days_before(today, i)?;
        ledger.record_food(user.id, chicken.id, 1.5, day)?;
        ledger.record_food(user.id, rice.id, 1.0, day)?;
        seeded.food_logs += 2;
    }
    ledger.record_food(user.id, apple.id, 1.0, today)?;
    seeded.food_logs += 1;

    // oldest first so the last write (today) sets current weight
    for i in (0..7u32).rev() {
        let day = days_before(today, u64::from(i))?;
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        let weight = round2(DEMO_BASE_WEIGHT - f64::from(i) * 0.15 + sign * 0.1);
        ledger.upsert_weight(user.id, day, weight)?;
        seeded.weights += 1;
    }

    for (offset, burned) in [(1, 350.0), (2, 410.0)] {
        ledger.upsert_activity(user.id, days_before(today, offset)?, burned)?;
        seeded.activities += 1;
    }

    tracing::info!(user_id = %user.id, "demo data seeded");
    Ok(seeded)
}
