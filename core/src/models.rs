use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{LedgerError, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calorie goal used for compliance checks when the user has not set one.
pub const DEFAULT_CALORIE_GOAL: f64 = 2000.0;

pub const CALORIE_TREND_WINDOW_DAYS: u64 = 30;
pub const TREND_VERDICT_WINDOW_DAYS: u64 = 7;

pub const DEFAULT_FOOD_TYPE: &str = "General";

// --- Users ---

/// Personal nutrition targets. Every field is independently optional: `None`
/// means "no goal set", which is not the same as a goal of zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalProfile {
    pub calorie_goal: Option<f64>,
    pub protein_goal: Option<f64>,
    pub carbs_goal: Option<f64>,
    pub fat_goal: Option<f64>,
}

impl GoalProfile {
    #[must_use]
    pub fn calorie_goal_or_default(&self) -> f64 {
        self.calorie_goal.unwrap_or(DEFAULT_CALORIE_GOAL)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub current_weight: Option<f64>,
    pub height_cm: Option<f64>,
    pub target_weight_kg: Option<f64>,
    pub goals: GoalProfile,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub current_weight: Option<f64>,
    pub goals: GoalProfile,
}

/// Plain-text registration input; the ledger hashes the password before it
/// reaches the store.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub current_weight: Option<f64>,
    pub goals: GoalProfile,
}

impl Registration {
    /// Field checks only; the password itself is not inspected beyond presence.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty()
        {
            return Err(LedgerError::invalid("Missing required fields"));
        }
        validate_goals(&self.goals)?;
        if let Some(weight) = self.current_weight {
            validate_weight(weight)?;
        }
        Ok(())
    }
}

/// Partial profile update. The outer `Option` is "was the field sent", the
/// inner one is the new (possibly cleared) value.
#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub height_cm: Option<Option<f64>>,
    pub target_weight_kg: Option<Option<f64>>,
    pub calorie_goal: Option<Option<f64>>,
    pub protein_goal: Option<Option<f64>>,
    pub carbs_goal: Option<Option<f64>>,
    pub fat_goal: Option<Option<f64>>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(LedgerError::invalid("name must not be empty"));
            }
        }
        let fields = [
            ("height_cm", self.height_cm),
            ("target_weight_kg", self.target_weight_kg),
            ("calorie_goal", self.calorie_goal),
            ("protein_goal", self.protein_goal),
            ("carbs_goal", self.carbs_goal),
            ("fat_goal", self.fat_goal),
        ];
        for (label, value) in fields {
            validate_non_negative(label, value.flatten())?;
        }
        Ok(())
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.trim().to_string();
        }
        if let Some(v) = self.height_cm {
            user.height_cm = v;
        }
        if let Some(v) = self.target_weight_kg {
            user.target_weight_kg = v;
        }
        if let Some(v) = self.calorie_goal {
            user.goals.calorie_goal = v;
        }
        if let Some(v) = self.protein_goal {
            user.goals.protein_goal = v;
        }
        if let Some(v) = self.carbs_goal {
            user.goals.carbs_goal = v;
        }
        if let Some(v) = self.fat_goal {
            user.goals.fat_goal = v;
        }
    }
}

// --- Food catalog ---

/// Macro grams; each value is optional because catalog data is often partial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
}

impl Macros {
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            protein: self.protein.map(|v| v * factor),
            carbs: self.carbs.map(|v| v * factor),
            fat: self.fat.map(|v| v * factor),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FoodItem {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub food_type: String,
    pub serving_size: String,
    pub calories: f64,
    pub macros: Macros,
    pub created_at: String,
}

impl FoodItem {
    /// Calories and macros for `servings` of this item, as stored on a log entry.
    #[must_use]
    pub fn snapshot(&self, servings: f64) -> (f64, Macros) {
        (self.calories * servings, self.macros.scaled(servings))
    }
}

#[derive(Debug, Clone)]
pub struct NewFoodItem {
    pub name: String,
    pub food_type: String,
    pub serving_size: String,
    pub calories: f64,
    pub macros: Macros,
}

pub fn validate_new_food_item(item: &NewFoodItem) -> Result<()> {
    if item.name.trim().is_empty() {
        return Err(LedgerError::invalid("name must not be empty"));
    }
    if item.serving_size.trim().is_empty() {
        return Err(LedgerError::invalid("serving_size must not be empty"));
    }
    validate_non_negative("calories", Some(item.calories))?;
    validate_non_negative("protein", item.macros.protein)?;
    validate_non_negative("carbs", item.macros.carbs)?;
    validate_non_negative("fat", item.macros.fat)?;
    Ok(())
}

// --- Log entries ---

#[derive(Debug, Clone, Serialize)]
pub struct FoodLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub food_id: Uuid,
    pub name: String,
    pub servings: f64,
    pub date: String,
    pub total_calories: f64,
    pub total_macros: Macros,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeightLogEntry {
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub date: String,
    pub weight: f64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityLogEntry {
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub date: String,
    pub calories_burned: f64,
    pub updated_at: String,
}

pub fn validate_servings(servings: f64) -> Result<()> {
    if !servings.is_finite() || servings <= 0.0 {
        return Err(LedgerError::invalid("servings must be greater than 0"));
    }
    Ok(())
}

pub fn validate_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight <= 0.0 {
        return Err(LedgerError::invalid("weight must be greater than 0"));
    }
    Ok(())
}

pub fn validate_calories_burned(calories_burned: f64) -> Result<()> {
    validate_non_negative("calories_burned", Some(calories_burned))
}

pub fn validate_goals(goals: &GoalProfile) -> Result<()> {
    validate_non_negative("calorie_goal", goals.calorie_goal)?;
    validate_non_negative("protein_goal", goals.protein_goal)?;
    validate_non_negative("carbs_goal", goals.carbs_goal)?;
    validate_non_negative("fat_goal", goals.fat_goal)?;
    Ok(())
}

fn validate_non_negative(label: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(LedgerError::invalid(format!(
            "{label} must be a non-negative number"
        ))),
        _ => Ok(()),
    }
}

// --- Aggregates ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MacroTotals {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MacroGoals {
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
}

/// Goals and weight as they stood when the summary was computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalSnapshot {
    pub current_weight: Option<f64>,
    pub calorie_goal: Option<f64>,
    pub macro_goals: MacroGoals,
}

impl GoalSnapshot {
    #[must_use]
    pub fn of(user: &User) -> Self {
        Self {
            current_weight: user.current_weight,
            calorie_goal: user.goals.calorie_goal,
            macro_goals: MacroGoals {
                protein: user.goals.protein_goal,
                carbs: user.goals.carbs_goal,
                fat: user.goals.fat_goal,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: String,
    pub total_calories: f64,
    pub calories_burned: f64,
    pub logged_foods: Vec<FoodLogEntry>,
    pub macros_consumed: MacroTotals,
    pub user_profile: GoalSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalorieDay {
    pub date: String,
    pub total_calories: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceStatus {
    Success,
    Failure,
}

/// Date → status for the days of a month that have at least one food entry.
pub type MonthCompliance = BTreeMap<String, ComplianceStatus>;

/// Serialized as `true`, `false` or `"unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    OnTrack,
    Over,
    Unknown,
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::OnTrack => serializer.serialize_bool(true),
            Self::Over => serializer.serialize_bool(false),
            Self::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendVerdict {
    pub on_track: Verdict,
    pub message: String,
    pub average_calories: Option<f64>,
    pub calorie_goal: f64,
}

// --- Dates, ids, rounding ---

/// Today's calendar day in the server's local time zone.
#[must_use]
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Strict `YYYY-MM-DD` parser. Anything that is not exactly ten characters is
/// rejected so stored keys stay fixed-width and sort lexicographically.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let bytes = s.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !well_formed {
        return Err(invalid_date(s));
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| invalid_date(s))
}

fn invalid_date(s: &str) -> LedgerError {
    LedgerError::invalid(format!("Invalid date '{s}'. Use YYYY-MM-DD"))
}

pub fn parse_id(s: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| LedgerError::invalid(format!("Invalid {what} ID format")))
}

/// Round to two decimals, halves away from zero.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
