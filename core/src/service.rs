use std::path::Path;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{LedgerError, Result};
use crate::identity::{self, TokenKeys};
use crate::models::{
    ActivityLogEntry, CALORIE_TREND_WINDOW_DAYS, CalorieDay, DEFAULT_FOOD_TYPE, DailySummary,
    FoodItem, FoodLogEntry, MonthCompliance, NewFoodItem, NewUser, ProfileUpdate, Registration,
    TREND_VERDICT_WINDOW_DAYS, TrendVerdict, User, WeightLogEntry, today, validate_calories_burned,
    validate_new_food_item, validate_servings, validate_weight,
};
use crate::progress;

/// Entry point for every ledger operation. Owns the store handle; callers
/// supply the authenticated user id.
pub struct Ledger {
    db: Database,
}

impl Ledger {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- Identity ---

    pub fn register(&self, registration: &Registration) -> Result<User> {
        registration.validate()?;
        let password_hash = identity::hash_password(&registration.password)?;
        self.register_hashed(registration, password_hash)
    }

    /// Store a registration whose password was already run through
    /// [`identity::hash_password`].
    pub fn register_hashed(
        &self,
        registration: &Registration,
        password_hash: String,
    ) -> Result<User> {
        registration.validate()?;
        let user = self.db.insert_user(&NewUser {
            name: registration.name.trim().to_string(),
            email: registration.email.trim().to_string(),
            password_hash,
            current_weight: registration.current_weight,
            goals: registration.goals,
        })?;
        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// The account a login names, if any. Feed it to [`Ledger::check_login`].
    pub fn login_candidate(&self, email: &str) -> Result<Option<User>> {
        self.db.get_user_by_email(email.trim())
    }

    /// Unknown email and wrong password fail the same way, after the same
    /// amount of hashing work. Needs no store access.
    pub fn check_login(candidate: Option<User>, password: &str) -> Result<User> {
        let stored = candidate.as_ref().map(|u| u.password_hash.as_str());
        let matched = identity::verify_password_or_dummy(password, stored)?;
        match candidate {
            Some(user) if matched => Ok(user),
            Some(user) => {
                tracing::warn!(user_id = %user.id, "login attempt with wrong password");
                Err(Self::login_rejected())
            }
            None => {
                tracing::warn!("login attempt for unknown email");
                Err(Self::login_rejected())
            }
        }
    }

    fn login_rejected() -> LedgerError {
        LedgerError::Unauthenticated("Invalid email or password".to_string())
    }

    pub fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        Self::check_login(self.login_candidate(email)?, password)
    }

    /// Resolve a bearer credential to the user it belongs to, loaded fresh.
    pub fn resolve_caller(&self, keys: &TokenKeys, token: &str) -> Result<User> {
        let user_id = keys.verify(token)?;
        self.db.get_user(user_id)?.ok_or_else(|| {
            tracing::warn!(%user_id, "token for unknown user");
            LedgerError::Unauthenticated("User not found!".to_string())
        })
    }

    pub fn profile(&self, user_id: Uuid) -> Result<User> {
        self.db
            .get_user(user_id)?
            .ok_or_else(|| LedgerError::not_found("User not found"))
    }

    pub fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<User> {
        update.validate()?;
        let mut user = self.profile(user_id)?;
        update.apply(&mut user);
        self.db.update_user_profile(&user)?;
        tracing::info!(%user_id, "profile updated");
        self.profile(user_id)
    }

    pub fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let user = self.profile(user_id)?;
        let hash = Self::rehash_password(&user, old_password, new_password)?;
        self.store_password_hash(user_id, &hash)
    }

    /// Check `old_password` against `user` and hash the replacement. Needs no
    /// store access.
    pub fn rehash_password(user: &User, old_password: &str, new_password: &str) -> Result<String> {
        if old_password.is_empty() || new_password.is_empty() {
            return Err(LedgerError::invalid("Missing old or new password"));
        }
        if !identity::verify_password(old_password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "password change with wrong old password");
            return Err(LedgerError::Unauthenticated(
                "Incorrect old password".to_string(),
            ));
        }
        identity::hash_password(new_password)
    }

    pub fn store_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        self.db.set_password_hash(user_id, password_hash)?;
        tracing::info!(%user_id, "password changed");
        Ok(())
    }

    // --- Food catalog ---

    pub fn add_food_item(&self, item: &NewFoodItem) -> Result<FoodItem> {
        validate_new_food_item(item)?;
        let food_type = match item.food_type.trim() {
            "" => DEFAULT_FOOD_TYPE.to_string(),
            t => t.to_string(),
        };
        let created = self.db.insert_food_item(&NewFoodItem {
            name: item.name.trim().to_string(),
            food_type,
            serving_size: item.serving_size.trim().to_string(),
            calories: item.calories,
            macros: item.macros,
        })?;
        tracing::info!(food_id = %created.id, name = %created.name, "food item added");
        Ok(created)
    }

    pub fn food_item(&self, food_id: Uuid) -> Result<FoodItem> {
        self.db
            .get_food_item(food_id)?
            .ok_or_else(|| LedgerError::not_found("Food item not found"))
    }

    // --- Logging ---

    pub fn record_food(
        &self,
        user_id: Uuid,
        food_id: Uuid,
        servings: f64,
        date: NaiveDate,
    ) -> Result<FoodLogEntry> {
        validate_servings(servings)?;
        let food = self.food_item(food_id)?;
        let entry = self.db.insert_food_log(user_id, &food, servings, date)?;
        tracing::info!(%user_id, log_id = %entry.id, date = %entry.date, "food logged");
        Ok(entry)
    }

    pub fn delete_food(&self, user_id: Uuid, log_id: Uuid) -> Result<()> {
        if !self.db.delete_food_log(user_id, log_id)? {
            return Err(LedgerError::not_found(
                "Log entry not found or you do not have permission to delete it",
            ));
        }
        tracing::info!(%user_id, %log_id, "food log deleted");
        Ok(())
    }

    pub fn upsert_weight(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        weight: f64,
    ) -> Result<WeightLogEntry> {
        validate_weight(weight)?;
        let entry = self.db.upsert_weight(user_id, date, weight)?;
        tracing::info!(%user_id, date = %entry.date, "weight logged");
        Ok(entry)
    }

    pub fn upsert_activity(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        calories_burned: f64,
    ) -> Result<ActivityLogEntry> {
        validate_calories_burned(calories_burned)?;
        let entry = self.db.upsert_activity(user_id, date, calories_burned)?;
        tracing::info!(%user_id, date = %entry.date, "activity logged");
        Ok(entry)
    }

    pub fn weight_series(&self, user_id: Uuid) -> Result<Vec<WeightLogEntry>> {
        self.db.weight_series(user_id)
    }

    // --- Progress ---

    pub fn daily_summary(&self, user_id: Uuid, date: NaiveDate) -> Result<DailySummary> {
        progress::daily_summary(&self.db, user_id, date)
    }

    pub fn calorie_trend(&self, user_id: Uuid) -> Result<Vec<CalorieDay>> {
        self.calorie_trend_as_of(user_id, today())
    }

    pub fn calorie_trend_as_of(&self, user_id: Uuid, today: NaiveDate) -> Result<Vec<CalorieDay>> {
        progress::calorie_trend(&self.db, user_id, today, CALORIE_TREND_WINDOW_DAYS)
    }

    pub fn month_compliance(&self, user_id: Uuid, year: i32, month: u32) -> Result<MonthCompliance> {
        progress::month_compliance(&self.db, user_id, year, month)
    }

    pub fn trend_verdict(&self, user_id: Uuid) -> Result<TrendVerdict> {
        self.trend_verdict_as_of(user_id, today())
    }

    pub fn trend_verdict_as_of(&self, user_id: Uuid, today: NaiveDate) -> Result<TrendVerdict> {
        progress::trend_verdict(&self.db, user_id, today, TREND_VERDICT_WINDOW_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComplianceStatus, GoalProfile, Macros, Verdict};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn register(ledger: &Ledger, email: &str) -> User {
        ledger
            .register(&Registration {
                name: "Test User".to_string(),
                email: email.to_string(),
                password: "correct horse".to_string(),
                current_weight: Some(80.0),
                goals: GoalProfile {
                    calorie_goal: Some(2000.0),
                    ..GoalProfile::default()
                },
            })
            .unwrap()
    }

    fn food(ledger: &Ledger, name: &str, calories: f64) -> FoodItem {
        ledger
            .add_food_item(&NewFoodItem {
                name: name.to_string(),
                food_type: String::new(),
                serving_size: "1 serving".to_string(),
                calories,
                macros: Macros::default(),
            })
            .unwrap()
    }

    #[test]
    fn test_register_and_authenticate() {
        let ledger = Ledger::new_in_memory().unwrap();
        let user = register(&ledger, "a@example.com");
        assert_ne!(user.password_hash, "correct horse");

        let authed = ledger.authenticate("a@example.com", "correct horse").unwrap();
        assert_eq!(authed.id, user.id);

        let wrong_pw = ledger.authenticate("a@example.com", "nope").unwrap_err();
        let unknown = ledger.authenticate("b@example.com", "correct horse").unwrap_err();
        assert!(matches!(wrong_pw, LedgerError::Unauthenticated(_)));
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
    }

    #[test]
    fn test_unknown_email_costs_a_password_check() {
        use std::time::{Duration, Instant};

        let ledger = Ledger::new_in_memory().unwrap();
        register(&ledger, "a@example.com");

        let timed = |email: &str| {
            let start = Instant::now();
            for _ in 0..3 {
                assert!(ledger.authenticate(email, "wrong").is_err());
            }
            start.elapsed()
        };
        let known = timed("a@example.com");
        let unknown = timed("nobody@example.com");
        // both paths run argon2; a bare lookup would be orders of magnitude faster
        assert!(unknown * 4 >= known, "known {known:?} vs unknown {unknown:?}");
        assert!(unknown > Duration::from_millis(1));
    }

    #[test]
    fn test_check_login_without_store() {
        let ledger = Ledger::new_in_memory().unwrap();
        register(&ledger, "a@example.com");
        let candidate = ledger.login_candidate("  a@example.com ").unwrap();
        assert!(candidate.is_some());

        let user = Ledger::check_login(candidate.clone(), "correct horse").unwrap();
        assert_eq!(user.email, "a@example.com");
        let wrong = Ledger::check_login(candidate, "nope").unwrap_err();
        let missing = Ledger::check_login(None, "correct horse").unwrap_err();
        assert!(matches!(missing, LedgerError::Unauthenticated(_)));
        assert_eq!(wrong.to_string(), missing.to_string());
    }

    #[test]
    fn test_register_hashed_stores_given_hash() {
        let ledger = Ledger::new_in_memory().unwrap();
        let registration = Registration {
            name: "Pre Hashed".to_string(),
            email: "p@example.com".to_string(),
            password: "s3cret".to_string(),
            ..Registration::default()
        };
        let hash = identity::hash_password(&registration.password).unwrap();
        let user = ledger.register_hashed(&registration, hash.clone()).unwrap();
        assert_eq!(user.password_hash, hash);
        assert!(ledger.authenticate("p@example.com", "s3cret").is_ok());

        let invalid = Registration {
            name: String::new(),
            ..registration
        };
        assert!(ledger.register_hashed(&invalid, hash).is_err());
    }

    #[test]
    fn test_register_validation_and_conflict() {
        let ledger = Ledger::new_in_memory().unwrap();
        let missing = ledger
            .register(&Registration {
                name: "  ".to_string(),
                email: "a@example.com".to_string(),
                password: "pw".to_string(),
                ..Registration::default()
            })
            .unwrap_err();
        assert!(matches!(missing, LedgerError::InvalidArgument(_)));

        register(&ledger, "a@example.com");
        let dup = ledger
            .register(&Registration {
                name: "Other".to_string(),
                email: "a@example.com".to_string(),
                password: "pw".to_string(),
                ..Registration::default()
            })
            .unwrap_err();
        assert!(matches!(dup, LedgerError::Conflict(_)));
    }

    #[test]
    fn test_resolve_caller() {
        let ledger = Ledger::new_in_memory().unwrap();
        let keys = TokenKeys::new(b"secret", 24);
        let user = register(&ledger, "a@example.com");

        let authed = ledger.authenticate("a@example.com", "correct horse").unwrap();
        let token = keys.issue(authed.id).unwrap();
        assert_eq!(ledger.resolve_caller(&keys, &token).unwrap().id, user.id);

        let stranger = keys.issue(Uuid::new_v4()).unwrap();
        assert!(matches!(
            ledger.resolve_caller(&keys, &stranger).unwrap_err(),
            LedgerError::Unauthenticated(_)
        ));
    }

    #[test]
    fn test_change_password() {
        let ledger = Ledger::new_in_memory().unwrap();
        let user = register(&ledger, "a@example.com");

        let wrong = ledger.change_password(user.id, "bad", "new-pass").unwrap_err();
        assert!(matches!(wrong, LedgerError::Unauthenticated(_)));
        let blank = ledger.change_password(user.id, "correct horse", "").unwrap_err();
        assert!(matches!(blank, LedgerError::InvalidArgument(_)));

        let fresh = ledger.profile(user.id).unwrap();
        let hash = Ledger::rehash_password(&fresh, "correct horse", "new-pass").unwrap();
        assert!(identity::verify_password("new-pass", &hash).unwrap());

        ledger
            .change_password(user.id, "correct horse", "new-pass")
            .unwrap();
        assert!(ledger.authenticate("a@example.com", "correct horse").is_err());
        assert!(ledger.authenticate("a@example.com", "new-pass").is_ok());
    }

    #[test]
    fn test_update_profile_partial() {
        let ledger = Ledger::new_in_memory().unwrap();
        let user = register(&ledger, "a@example.com");

        let updated = ledger
            .update_profile(
                user.id,
                &ProfileUpdate {
                    calorie_goal: Some(None),
                    protein_goal: Some(Some(140.0)),
                    ..ProfileUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.goals.calorie_goal, None);
        assert_eq!(updated.goals.protein_goal, Some(140.0));
        assert_eq!(updated.name, "Test User");
        assert_eq!(updated.current_weight, Some(80.0));
    }

    #[test]
    fn test_add_food_item_defaults_type() {
        let ledger = Ledger::new_in_memory().unwrap();
        let item = food(&ledger, "Oats", 150.0);
        assert_eq!(item.food_type, "General");

        let bad = ledger
            .add_food_item(&NewFoodItem {
                name: "Oats".to_string(),
                food_type: String::new(),
                serving_size: "40g".to_string(),
                calories: -1.0,
                macros: Macros::default(),
            })
            .unwrap_err();
        assert!(matches!(bad, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn test_record_food_validation_order() {
        let ledger = Ledger::new_in_memory().unwrap();
        let user = register(&ledger, "a@example.com");
        let day = date(2024, 3, 5);

        // servings checked before the catalog lookup
        let bad_servings = ledger
            .record_food(user.id, Uuid::new_v4(), 0.0, day)
            .unwrap_err();
        assert!(matches!(bad_servings, LedgerError::InvalidArgument(_)));

        let unknown_food = ledger
            .record_food(user.id, Uuid::new_v4(), 1.0, day)
            .unwrap_err();
        assert!(matches!(unknown_food, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_delete_food_other_user_is_not_found() {
        let ledger = Ledger::new_in_memory().unwrap();
        let alice = register(&ledger, "alice@example.com");
        let bob = register(&ledger, "bob@example.com");
        let apple = food(&ledger, "Apple", 95.0);
        let entry = ledger
            .record_food(alice.id, apple.id, 1.0, date(2024, 3, 5))
            .unwrap();

        let err = ledger.delete_food(bob.id, entry.id).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        let missing = ledger.delete_food(alice.id, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.to_string(), missing.to_string());

        ledger.delete_food(alice.id, entry.id).unwrap();
        assert!(
            ledger
                .daily_summary(alice.id, date(2024, 3, 5))
                .unwrap()
                .logged_foods
                .is_empty()
        );
    }

    #[test]
    fn test_weight_and_activity_validation() {
        let ledger = Ledger::new_in_memory().unwrap();
        let user = register(&ledger, "a@example.com");
        let day = date(2024, 3, 5);

        assert!(ledger.upsert_weight(user.id, day, 0.0).is_err());
        assert!(ledger.upsert_activity(user.id, day, -10.0).is_err());
        assert!(ledger.upsert_activity(user.id, day, 0.0).is_ok());

        ledger.upsert_weight(user.id, day, 78.4).unwrap();
        assert_eq!(ledger.profile(user.id).unwrap().current_weight, Some(78.4));
    }

    #[test]
    fn test_month_and_verdict_end_to_end() {
        let ledger = Ledger::new_in_memory().unwrap();
        let user = register(&ledger, "a@example.com");
        let meal = food(&ledger, "Big Meal", 900.0);
        ledger
            .record_food(user.id, meal.id, 2.0, date(2024, 3, 5))
            .unwrap();

        let summary = ledger.daily_summary(user.id, date(2024, 3, 5)).unwrap();
        assert!((summary.total_calories - 1800.0).abs() < f64::EPSILON);

        let month = ledger.month_compliance(user.id, 2024, 3).unwrap();
        assert_eq!(month["2024-03-05"], ComplianceStatus::Success);

        let verdict = ledger.trend_verdict_as_of(user.id, date(2024, 3, 6)).unwrap();
        assert_eq!(verdict.on_track, Verdict::OnTrack);

        let series = ledger.calorie_trend_as_of(user.id, date(2024, 3, 6)).unwrap();
        assert_eq!(series.len(), 1);
    }
}
