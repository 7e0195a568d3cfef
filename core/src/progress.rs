use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{LedgerError, Result};
use crate::models::{
    CalorieDay, ComplianceStatus, DailySummary, FoodLogEntry, GoalSnapshot, MacroTotals,
    MonthCompliance, TrendVerdict, User, Verdict, format_date, round2,
};

/// Neumaier-compensated running sum.
#[derive(Debug, Default, Clone, Copy)]
struct StableSum {
    sum: f64,
    compensation: f64,
}

impl StableSum {
    fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    fn total(self) -> f64 {
        self.sum + self.compensation
    }
}

fn load_user(db: &Database, user_id: Uuid) -> Result<User> {
    db.get_user(user_id)?
        .ok_or_else(|| LedgerError::not_found("User not found"))
}

/// `[today - window_days, today]`, both ends inclusive.
fn trailing_window(today: NaiveDate, window_days: u64) -> Result<(NaiveDate, NaiveDate)> {
    let from = today
        .checked_sub_days(Days::new(window_days))
        .ok_or_else(|| LedgerError::invalid("window reaches before the first representable date"))?;
    Ok((from, today))
}

/// First and last calendar day of a month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    if !(1..=9999).contains(&year) {
        return Err(LedgerError::invalid(format!("Invalid year {year}")));
    }
    if !(1..=12).contains(&month) {
        return Err(LedgerError::invalid(format!("Invalid month {month}")));
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| LedgerError::invalid(format!("Invalid month {year}-{month}")))?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| LedgerError::invalid(format!("Invalid month {year}-{month}")))?;
    Ok((first, last))
}

fn daily_calorie_totals(entries: &[FoodLogEntry]) -> BTreeMap<String, f64> {
    let mut per_day: BTreeMap<String, StableSum> = BTreeMap::new();
    for entry in entries {
        per_day
            .entry(entry.date.clone())
            .or_default()
            .add(entry.total_calories);
    }
    per_day
        .into_iter()
        .map(|(date, sum)| (date, sum.total()))
        .collect()
}

pub fn daily_summary(db: &Database, user_id: Uuid, date: NaiveDate) -> Result<DailySummary> {
    let logged_foods = db.food_logs_for_date(user_id, date)?;

    let mut calories = StableSum::default();
    let mut protein = StableSum::default();
    let mut carbs = StableSum::default();
    let mut fat = StableSum::default();
    for entry in &logged_foods {
        calories.add(entry.total_calories);
        protein.add(entry.total_macros.protein.unwrap_or(0.0));
        carbs.add(entry.total_macros.carbs.unwrap_or(0.0));
        fat.add(entry.total_macros.fat.unwrap_or(0.0));
    }

    let calories_burned = db
        .activity_for_date(user_id, date)?
        .map_or(0.0, |a| a.calories_burned);

    let user = load_user(db, user_id)?;

    Ok(DailySummary {
        date: format_date(date),
        total_calories: round2(calories.total()),
        calories_burned: round2(calories_burned),
        logged_foods,
        macros_consumed: MacroTotals {
            protein: round2(protein.total()),
            carbs: round2(carbs.total()),
            fat: round2(fat.total()),
        },
        user_profile: GoalSnapshot::of(&user),
    })
}

/// Per-day calorie sums over the trailing window, ascending, days without
/// entries omitted.
pub fn calorie_trend(
    db: &Database,
    user_id: Uuid,
    today: NaiveDate,
    window_days: u64,
) -> Result<Vec<CalorieDay>> {
    let (from, to) = trailing_window(today, window_days)?;
    let entries = db.food_logs_in_range(user_id, from, to)?;
    Ok(daily_calorie_totals(&entries)
        .into_iter()
        .map(|(date, total)| CalorieDay {
            date,
            total_calories: round2(total),
        })
        .collect())
}

pub fn month_compliance(
    db: &Database,
    user_id: Uuid,
    year: i32,
    month: u32,
) -> Result<MonthCompliance> {
    let (first, last) = month_bounds(year, month)?;
    let goal = load_user(db, user_id)?.goals.calorie_goal_or_default();
    let entries = db.food_logs_in_range(user_id, first, last)?;

    Ok(daily_calorie_totals(&entries)
        .into_iter()
        .map(|(date, total)| {
            let status = if total <= goal {
                ComplianceStatus::Success
            } else {
                ComplianceStatus::Failure
            };
            (date, status)
        })
        .collect())
}

/// Average calories per entry (not per day) across the trailing window,
/// compared against the calorie goal.
pub fn trend_verdict(
    db: &Database,
    user_id: Uuid,
    today: NaiveDate,
    window_days: u64,
) -> Result<TrendVerdict> {
    let goal = load_user(db, user_id)?.goals.calorie_goal_or_default();
    let (from, to) = trailing_window(today, window_days)?;
    let entries = db.food_logs_in_range(user_id, from, to)?;

    if entries.is_empty() {
        return Ok(TrendVerdict {
            on_track: Verdict::Unknown,
            message: "Not enough data to check your progress. Keep logging!".to_string(),
            average_calories: None,
            calorie_goal: goal,
        });
    }

    let mut sum = StableSum::default();
    for entry in &entries {
        sum.add(entry.total_calories);
    }
    #[allow(clippy::cast_precision_loss)]
    let average = sum.total() / entries.len() as f64;
    let shown = average.trunc() as i64;

    let (on_track, message) = if average <= goal {
        (
            Verdict::OnTrack,
            format!(
                "Great job! Your average intake of {shown} kcal is on track with your goal of {goal} kcal."
            ),
        )
    } else {
        (
            Verdict::Over,
            format!(
                "Heads up! Your average intake of {shown} kcal is a bit above your goal of {goal} kcal."
            ),
        )
    };

    Ok(TrendVerdict {
        on_track,
        message,
        average_calories: Some(round2(average)),
        calorie_goal: goal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CALORIE_TREND_WINDOW_DAYS, FoodItem, GoalProfile, Macros, NewFoodItem, NewUser,
        TREND_VERDICT_WINDOW_DAYS,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn user_with_goal(db: &Database, email: &str, calorie_goal: Option<f64>) -> User {
        db.insert_user(&NewUser {
            name: "Test".to_string(),
            email: email.to_string(),
            password_hash: "h".to_string(),
            current_weight: Some(72.5),
            goals: GoalProfile {
                calorie_goal,
                ..GoalProfile::default()
            },
        })
        .unwrap()
    }

    fn food(db: &Database, calories: f64, macros: Macros) -> FoodItem {
        db.insert_food_item(&NewFoodItem {
            name: format!("Food {calories}"),
            food_type: "General".to_string(),
            serving_size: "1 serving".to_string(),
            calories,
            macros,
        })
        .unwrap()
    }

    fn plain_food(db: &Database, calories: f64) -> FoodItem {
        food(db, calories, Macros::default())
    }

    #[test]
    fn test_stable_sum_compensates() {
        let mut sum = StableSum::default();
        for v in [1.0, 1e100, 1.0, -1e100] {
            sum.add(v);
        }
        assert!((sum.total() - 2.0).abs() < f64::EPSILON);

        let mut tenths = StableSum::default();
        for _ in 0..10 {
            tenths.add(0.1);
        }
        assert!((tenths.total() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_month_bounds() {
        assert_eq!(month_bounds(2024, 2).unwrap(), (date(2024, 2, 1), date(2024, 2, 29)));
        assert_eq!(month_bounds(2023, 2).unwrap(), (date(2023, 2, 1), date(2023, 2, 28)));
        assert_eq!(month_bounds(2024, 12).unwrap(), (date(2024, 12, 1), date(2024, 12, 31)));
        assert_eq!(month_bounds(2024, 4).unwrap().1, date(2024, 4, 30));
        assert_eq!(month_bounds(9999, 12).unwrap().1, date(9999, 12, 31));

        for (y, m) in [(2024, 0), (2024, 13), (0, 5), (10_000, 1)] {
            let err = month_bounds(y, m).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidArgument(_)), "{y}-{m}");
        }
    }

    #[test]
    fn test_daily_summary_totals_and_goals() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", Some(2000.0));
        let chicken = food(
            &db,
            165.0,
            Macros {
                protein: Some(31.0),
                carbs: Some(0.0),
                fat: Some(3.6),
            },
        );
        let apple = food(
            &db,
            95.0,
            Macros {
                protein: Some(0.5),
                carbs: Some(25.0),
                fat: None,
            },
        );
        let day = date(2024, 3, 5);
        db.insert_food_log(user.id, &chicken, 2.0, day).unwrap();
        db.insert_food_log(user.id, &apple, 1.0, day).unwrap();
        db.upsert_activity(user.id, day, 300.0).unwrap();

        let summary = daily_summary(&db, user.id, day).unwrap();
        assert_eq!(summary.date, "2024-03-05");
        assert!((summary.total_calories - 425.0).abs() < f64::EPSILON);
        assert!((summary.calories_burned - 300.0).abs() < f64::EPSILON);
        assert!((summary.macros_consumed.protein - 62.5).abs() < f64::EPSILON);
        assert!((summary.macros_consumed.carbs - 25.0).abs() < f64::EPSILON);
        assert!((summary.macros_consumed.fat - 7.2).abs() < f64::EPSILON);
        assert_eq!(summary.logged_foods.len(), 2);
        assert_eq!(summary.user_profile.calorie_goal, Some(2000.0));
        assert_eq!(summary.user_profile.current_weight, Some(72.5));
        assert_eq!(summary.user_profile.macro_goals.protein, None);
    }

    #[test]
    fn test_daily_summary_empty_day() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", None);
        let summary = daily_summary(&db, user.id, date(2024, 3, 5)).unwrap();
        assert!(summary.logged_foods.is_empty());
        assert!(summary.total_calories.abs() < f64::EPSILON);
        assert!(summary.calories_burned.abs() < f64::EPSILON);
        assert_eq!(summary.user_profile.calorie_goal, None);
    }

    #[test]
    fn test_daily_summary_rounds_to_two_decimals() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", None);
        let item = plain_food(&db, 33.333);
        let day = date(2024, 3, 5);
        for _ in 0..3 {
            db.insert_food_log(user.id, &item, 1.0, day).unwrap();
        }
        let summary = daily_summary(&db, user.id, day).unwrap();
        assert!((summary.total_calories - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_daily_summary_unknown_user() {
        let db = Database::open_in_memory().unwrap();
        let err = daily_summary(&db, Uuid::new_v4(), date(2024, 3, 5)).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_aggregations_are_isolated_per_user() {
        let db = Database::open_in_memory().unwrap();
        let alice = user_with_goal(&db, "alice@example.com", Some(2000.0));
        let bob = user_with_goal(&db, "bob@example.com", Some(2000.0));
        let item = plain_food(&db, 500.0);
        let today = date(2024, 3, 10);
        db.insert_food_log(bob.id, &item, 6.0, today).unwrap();
        db.upsert_activity(bob.id, today, 800.0).unwrap();

        let summary = daily_summary(&db, alice.id, today).unwrap();
        assert!(summary.logged_foods.is_empty());
        assert!(summary.calories_burned.abs() < f64::EPSILON);
        assert!(
            calorie_trend(&db, alice.id, today, CALORIE_TREND_WINDOW_DAYS)
                .unwrap()
                .is_empty()
        );
        assert!(month_compliance(&db, alice.id, 2024, 3).unwrap().is_empty());
        assert_eq!(
            trend_verdict(&db, alice.id, today, TREND_VERDICT_WINDOW_DAYS)
                .unwrap()
                .on_track,
            Verdict::Unknown
        );
    }

    #[test]
    fn test_month_compliance_success_failure_absent() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", Some(2000.0));
        let small = plain_food(&db, 900.0);
        let big = plain_food(&db, 1100.0);

        db.insert_food_log(user.id, &small, 2.0, date(2024, 3, 5)).unwrap();
        db.insert_food_log(user.id, &big, 2.0, date(2024, 3, 6)).unwrap();
        // exactly on the goal
        db.insert_food_log(user.id, &small, 1.0, date(2024, 3, 8)).unwrap();
        db.insert_food_log(user.id, &big, 1.0, date(2024, 3, 8)).unwrap();
        // neighbouring months stay out
        db.insert_food_log(user.id, &small, 1.0, date(2024, 2, 29)).unwrap();
        db.insert_food_log(user.id, &small, 1.0, date(2024, 4, 1)).unwrap();

        let summary = daily_summary(&db, user.id, date(2024, 3, 5)).unwrap();
        assert!((summary.total_calories - 1800.0).abs() < f64::EPSILON);

        let month = month_compliance(&db, user.id, 2024, 3).unwrap();
        assert_eq!(month.len(), 3);
        assert_eq!(month["2024-03-05"], ComplianceStatus::Success);
        assert_eq!(month["2024-03-06"], ComplianceStatus::Failure);
        assert_eq!(month["2024-03-08"], ComplianceStatus::Success);
        assert!(!month.contains_key("2024-03-07"));
    }

    #[test]
    fn test_month_compliance_uses_default_goal() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", None);
        let item = plain_food(&db, 2000.5);
        db.insert_food_log(user.id, &item, 1.0, date(2023, 12, 31)).unwrap();

        let month = month_compliance(&db, user.id, 2023, 12).unwrap();
        assert_eq!(month["2023-12-31"], ComplianceStatus::Failure);
    }

    #[test]
    fn test_month_compliance_zero_goal_is_respected() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", Some(0.0));
        let item = plain_food(&db, 50.0);
        db.insert_food_log(user.id, &item, 1.0, date(2024, 3, 1)).unwrap();

        let month = month_compliance(&db, user.id, 2024, 3).unwrap();
        assert_eq!(month["2024-03-01"], ComplianceStatus::Failure);
    }

    #[test]
    fn test_month_compliance_rejects_bad_month() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", None);
        let err = month_compliance(&db, user.id, 2024, 13).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn test_calorie_trend_window_and_order() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", None);
        let item = plain_food(&db, 100.0);
        let today = date(2024, 3, 31);

        db.insert_food_log(user.id, &item, 1.0, date(2024, 2, 29)).unwrap(); // today - 31
        db.insert_food_log(user.id, &item, 1.0, date(2024, 3, 1)).unwrap(); // today - 30
        db.insert_food_log(user.id, &item, 2.0, date(2024, 3, 20)).unwrap();
        db.insert_food_log(user.id, &item, 0.5, date(2024, 3, 20)).unwrap();
        db.insert_food_log(user.id, &item, 1.0, today).unwrap();
        db.insert_food_log(user.id, &item, 1.0, date(2024, 4, 1)).unwrap(); // future

        let series = calorie_trend(&db, user.id, today, CALORIE_TREND_WINDOW_DAYS).unwrap();
        let dates: Vec<&str> = series.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-03-20", "2024-03-31"]);
        assert!((series[1].total_calories - 250.0).abs() < f64::EPSILON);
        assert!(series.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_trend_verdict_unknown_without_entries() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", None);
        let item = plain_food(&db, 100.0);
        // outside the 7-day window
        db.insert_food_log(user.id, &item, 1.0, date(2024, 3, 1)).unwrap();

        let verdict = trend_verdict(&db, user.id, date(2024, 3, 10), TREND_VERDICT_WINDOW_DAYS)
            .unwrap();
        assert_eq!(verdict.on_track, Verdict::Unknown);
        assert_eq!(
            verdict.message,
            "Not enough data to check your progress. Keep logging!"
        );
        assert_eq!(verdict.average_calories, None);
        assert!((verdict.calorie_goal - 2000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_trend_verdict_averages_entries_not_days() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", Some(1000.0));
        let item = plain_food(&db, 600.0);
        let today = date(2024, 3, 10);
        // two entries on one day: per-day total 1200 but per-entry average 600
        db.insert_food_log(user.id, &item, 1.0, today).unwrap();
        db.insert_food_log(user.id, &item, 1.0, today).unwrap();

        let verdict = trend_verdict(&db, user.id, today, TREND_VERDICT_WINDOW_DAYS).unwrap();
        assert_eq!(verdict.on_track, Verdict::OnTrack);
        assert_eq!(verdict.average_calories, Some(600.0));
        assert_eq!(
            verdict.message,
            "Great job! Your average intake of 600 kcal is on track with your goal of 1000 kcal."
        );
    }

    #[test]
    fn test_trend_verdict_over_goal_truncates_average() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", None);
        let item = plain_food(&db, 2100.9);
        let today = date(2024, 3, 10);
        db.insert_food_log(user.id, &item, 1.0, date(2024, 3, 3)).unwrap(); // today - 7

        let verdict = trend_verdict(&db, user.id, today, TREND_VERDICT_WINDOW_DAYS).unwrap();
        assert_eq!(verdict.on_track, Verdict::Over);
        assert_eq!(
            verdict.message,
            "Heads up! Your average intake of 2100 kcal is a bit above your goal of 2000 kcal."
        );
    }

    #[test]
    fn test_trend_verdict_average_equal_to_goal_is_on_track() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", Some(1800.0));
        let item = plain_food(&db, 900.0);
        let today = date(2024, 3, 10);
        db.insert_food_log(user.id, &item, 1.5, today).unwrap();
        db.insert_food_log(user.id, &item, 2.5, date(2024, 3, 9)).unwrap();

        let verdict = trend_verdict(&db, user.id, today, TREND_VERDICT_WINDOW_DAYS).unwrap();
        assert_eq!(verdict.average_calories, Some(1800.0));
        assert_eq!(verdict.on_track, Verdict::OnTrack);
    }

    #[test]
    fn test_goal_changes_apply_to_earlier_logs() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", Some(2000.0));
        let item = plain_food(&db, 1800.0);
        let today = date(2024, 3, 10);
        db.insert_food_log(user.id, &item, 1.0, today).unwrap();

        assert_eq!(
            month_compliance(&db, user.id, 2024, 3).unwrap()["2024-03-10"],
            ComplianceStatus::Success
        );
        assert_eq!(
            trend_verdict(&db, user.id, today, TREND_VERDICT_WINDOW_DAYS)
                .unwrap()
                .on_track,
            Verdict::OnTrack
        );

        let mut updated = db.get_user(user.id).unwrap().unwrap();
        updated.goals.calorie_goal = Some(1500.0);
        updated.goals.protein_goal = Some(90.0);
        db.update_user_profile(&updated).unwrap();

        let summary = daily_summary(&db, user.id, today).unwrap();
        assert_eq!(summary.user_profile.calorie_goal, Some(1500.0));
        assert_eq!(summary.user_profile.macro_goals.protein, Some(90.0));
        assert_eq!(
            month_compliance(&db, user.id, 2024, 3).unwrap()["2024-03-10"],
            ComplianceStatus::Failure
        );
        let verdict = trend_verdict(&db, user.id, today, TREND_VERDICT_WINDOW_DAYS).unwrap();
        assert_eq!(verdict.on_track, Verdict::Over);
        assert!((verdict.calorie_goal - 1500.0).abs() < f64::EPSILON);

        // clearing the goal falls back to the default
        updated.goals.calorie_goal = None;
        db.update_user_profile(&updated).unwrap();
        assert_eq!(
            month_compliance(&db, user.id, 2024, 3).unwrap()["2024-03-10"],
            ComplianceStatus::Success
        );
    }

    #[test]
    fn test_trend_verdict_zero_average_is_on_track() {
        let db = Database::open_in_memory().unwrap();
        let user = user_with_goal(&db, "a@example.com", None);
        let water = plain_food(&db, 0.0);
        let today = date(2024, 3, 10);
        db.insert_food_log(user.id, &water, 1.0, today).unwrap();

        let verdict = trend_verdict(&db, user.id, today, TREND_VERDICT_WINDOW_DAYS).unwrap();
        assert_eq!(verdict.on_track, Verdict::OnTrack);
        assert_eq!(verdict.average_calories, Some(0.0));
    }
}
