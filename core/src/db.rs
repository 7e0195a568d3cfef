use std::path::Path;

use chrono::{Local, NaiveDate};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{
    ActivityLogEntry, FoodItem, FoodLogEntry, GoalProfile, Macros, NewFoodItem, NewUser, User,
    WeightLogEntry, format_date,
};

const USER_COLUMNS: &str = "id, name, email, password_hash, current_weight, height_cm,
     target_weight_kg, calorie_goal, protein_goal, carbs_goal, fat_goal, created_at, updated_at";

const FOOD_LOG_COLUMNS: &str = "id, user_id, food_id, name, servings, date, total_calories,
     total_protein, total_carbs, total_fat, created_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.migrate()?;
        tracing::debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    current_weight REAL,
                    height_cm REAL,
                    target_weight_kg REAL,
                    calorie_goal REAL,
                    protein_goal REAL,
                    carbs_goal REAL,
                    fat_goal REAL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS foods (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    food_type TEXT NOT NULL,
                    serving_size TEXT NOT NULL,
                    calories REAL NOT NULL,
                    protein REAL,
                    carbs REAL,
                    fat REAL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS food_logs (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    food_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    servings REAL NOT NULL,
                    date TEXT NOT NULL,
                    total_calories REAL NOT NULL,
                    total_protein REAL,
                    total_carbs REAL,
                    total_fat REAL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS weight_logs (
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    weight REAL NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, date)
                );

                CREATE TABLE IF NOT EXISTS activity_logs (
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    calories_burned REAL NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, date)
                );

                CREATE INDEX IF NOT EXISTS idx_food_logs_user_date ON food_logs(user_id, date);
                CREATE INDEX IF NOT EXISTS idx_foods_name ON foods(name);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn uuid_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
        let raw: String = row.get(idx)?;
        Uuid::parse_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    }

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: Self::uuid_at(row, 0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            current_weight: row.get(4)?,
            height_cm: row.get(5)?,
            target_weight_kg: row.get(6)?,
            goals: GoalProfile {
                calorie_goal: row.get(7)?,
                protein_goal: row.get(8)?,
                carbs_goal: row.get(9)?,
                fat_goal: row.get(10)?,
            },
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn food_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<FoodItem> {
        Ok(FoodItem {
            id: Self::uuid_at(row, 0)?,
            name: row.get(1)?,
            food_type: row.get(2)?,
            serving_size: row.get(3)?,
            calories: row.get(4)?,
            macros: Macros {
                protein: row.get(5)?,
                carbs: row.get(6)?,
                fat: row.get(7)?,
            },
            created_at: row.get(8)?,
        })
    }

    // Expects FOOD_LOG_COLUMNS order.
    fn food_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<FoodLogEntry> {
        Ok(FoodLogEntry {
            id: Self::uuid_at(row, 0)?,
            user_id: Self::uuid_at(row, 1)?,
            food_id: Self::uuid_at(row, 2)?,
            name: row.get(3)?,
            servings: row.get(4)?,
            date: row.get(5)?,
            total_calories: row.get(6)?,
            total_macros: Macros {
                protein: row.get(7)?,
                carbs: row.get(8)?,
                fat: row.get(9)?,
            },
            created_at: row.get(10)?,
        })
    }

    fn weight_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightLogEntry> {
        Ok(WeightLogEntry {
            user_id: Self::uuid_at(row, 0)?,
            date: row.get(1)?,
            weight: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    fn activity_from_row(row: &rusqlite::Row) -> rusqlite::Result<ActivityLogEntry> {
        Ok(ActivityLogEntry {
            user_id: Self::uuid_at(row, 0)?,
            date: row.get(1)?,
            calories_burned: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    // --- Users ---

    pub fn insert_user(&self, user: &NewUser) -> Result<User> {
        let now = Local::now().to_rfc3339();
        let id = Uuid::new_v4();
        let inserted = self.conn.execute(
            "INSERT INTO users (id, name, email, password_hash, current_weight, height_cm,
                                target_weight_kg, calorie_goal, protein_goal, carbs_goal, fat_goal,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id.to_string(),
                user.name,
                user.email,
                user.password_hash,
                user.current_weight,
                user.goals.calorie_goal,
                user.goals.protein_goal,
                user.goals.carbs_goal,
                user.goals.fat_goal,
                now,
                now,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(LedgerError::Conflict(
                    "User with this email already exists".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        }
        self.get_user(id)?
            .ok_or_else(|| LedgerError::not_found("User not found after insert"))
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Persist the editable profile fields of `user`. Weight and credentials
    /// have their own writers.
    pub fn update_user_profile(&self, user: &User) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE users SET name = ?1, height_cm = ?2, target_weight_kg = ?3,
                    calorie_goal = ?4, protein_goal = ?5, carbs_goal = ?6, fat_goal = ?7,
                    updated_at = ?8
             WHERE id = ?9",
            params![
                user.name,
                user.height_cm,
                user.target_weight_kg,
                user.goals.calorie_goal,
                user.goals.protein_goal,
                user.goals.carbs_goal,
                user.goals.fat_goal,
                now,
                user.id.to_string(),
            ],
        )?;
        if rows == 0 {
            return Err(LedgerError::not_found("User not found"));
        }
        Ok(())
    }

    pub fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
            params![password_hash, now, user_id.to_string()],
        )?;
        if rows == 0 {
            return Err(LedgerError::not_found("User not found"));
        }
        Ok(())
    }

    // --- Food catalog ---

    pub fn insert_food_item(&self, item: &NewFoodItem) -> Result<FoodItem> {
        let now = Local::now().to_rfc3339();
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO foods (id, name, food_type, serving_size, calories, protein, carbs, fat, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id.to_string(),
                item.name,
                item.food_type,
                item.serving_size,
                item.calories,
                item.macros.protein,
                item.macros.carbs,
                item.macros.fat,
                now,
            ],
        )?;
        self.get_food_item(id)?
            .ok_or_else(|| LedgerError::not_found("Food not found after insert"))
    }

    pub fn get_food_item(&self, id: Uuid) -> Result<Option<FoodItem>> {
        let item = self
            .conn
            .query_row(
                "SELECT id, name, food_type, serving_size, calories, protein, carbs, fat, created_at
                 FROM foods WHERE id = ?1",
                params![id.to_string()],
                Self::food_item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    pub fn get_food_item_by_name(&self, name: &str) -> Result<Option<FoodItem>> {
        let item = self
            .conn
            .query_row(
                "SELECT id, name, food_type, serving_size, calories, protein, carbs, fat, created_at
                 FROM foods WHERE name = ?1 ORDER BY created_at LIMIT 1",
                params![name],
                Self::food_item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    // --- Food logs ---

    /// Insert a food log entry carrying its own calorie/macro snapshot.
    pub fn insert_food_log(
        &self,
        user_id: Uuid,
        food: &FoodItem,
        servings: f64,
        date: NaiveDate,
    ) -> Result<FoodLogEntry> {
        let now = Local::now().to_rfc3339();
        let id = Uuid::new_v4();
        let (total_calories, total_macros) = food.snapshot(servings);
        self.conn.execute(
            "INSERT INTO food_logs (id, user_id, food_id, name, servings, date, total_calories,
                                    total_protein, total_carbs, total_fat, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id.to_string(),
                user_id.to_string(),
                food.id.to_string(),
                food.name,
                servings,
                format_date(date),
                total_calories,
                total_macros.protein,
                total_macros.carbs,
                total_macros.fat,
                now,
            ],
        )?;
        Ok(FoodLogEntry {
            id,
            user_id,
            food_id: food.id,
            name: food.name.clone(),
            servings,
            date: format_date(date),
            total_calories,
            total_macros,
            created_at: now,
        })
    }

    /// Delete a log entry only if it belongs to `user_id`. Returns `false` when
    /// nothing matched, whether or not the id exists for someone else.
    pub fn delete_food_log(&self, user_id: Uuid, log_id: Uuid) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM food_logs WHERE id = ?1 AND user_id = ?2",
            params![log_id.to_string(), user_id.to_string()],
        )?;
        Ok(rows > 0)
    }

    pub fn food_logs_for_date(&self, user_id: Uuid, date: NaiveDate) -> Result<Vec<FoodLogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOOD_LOG_COLUMNS} FROM food_logs
             WHERE user_id = ?1 AND date = ?2
             ORDER BY seq"
        ))?;
        let entries = stmt
            .query_map(
                params![user_id.to_string(), format_date(date)],
                Self::food_log_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries with `from <= date <= to`, ordered by date then insertion.
    pub fn food_logs_in_range(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FoodLogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOOD_LOG_COLUMNS} FROM food_logs
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date, seq"
        ))?;
        let entries = stmt
            .query_map(
                params![user_id.to_string(), format_date(from), format_date(to)],
                Self::food_log_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // --- Weight logs ---

    /// Replace-on-conflict by (user, date) and mirror the value onto the
    /// user's current weight, in one transaction.
    pub fn upsert_weight(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        weight: f64,
    ) -> Result<WeightLogEntry> {
        let now = Local::now().to_rfc3339();
        let date_str = format_date(date);
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO weight_logs (user_id, date, weight, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, date) DO UPDATE SET
                weight = excluded.weight,
                updated_at = excluded.updated_at",
            params![user_id.to_string(), date_str, weight, now],
        )?;
        let rows = tx.execute(
            "UPDATE users SET current_weight = ?1, updated_at = ?2 WHERE id = ?3",
            params![weight, now, user_id.to_string()],
        )?;
        if rows == 0 {
            return Err(LedgerError::not_found("User not found"));
        }
        tx.commit()?;
        Ok(WeightLogEntry {
            user_id,
            date: date_str,
            weight,
            updated_at: now,
        })
    }

    pub fn weight_series(&self, user_id: Uuid) -> Result<Vec<WeightLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, date, weight, updated_at FROM weight_logs
             WHERE user_id = ?1
             ORDER BY date ASC",
        )?;
        let entries = stmt
            .query_map(params![user_id.to_string()], Self::weight_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // --- Activity logs ---

    pub fn upsert_activity(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        calories_burned: f64,
    ) -> Result<ActivityLogEntry> {
        let now = Local::now().to_rfc3339();
        let date_str = format_date(date);
        self.conn.execute(
            "INSERT INTO activity_logs (user_id, date, calories_burned, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, date) DO UPDATE SET
                calories_burned = excluded.calories_burned,
                updated_at = excluded.updated_at",
            params![user_id.to_string(), date_str, calories_burned, now],
        )?;
        Ok(ActivityLogEntry {
            user_id,
            date: date_str,
            calories_burned,
            updated_at: now,
        })
    }

    pub fn activity_for_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<ActivityLogEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT user_id, date, calories_burned, updated_at FROM activity_logs
                 WHERE user_id = ?1 AND date = ?2",
                params![user_id.to_string(), format_date(date)],
                Self::activity_from_row,
            )
            .optional()?;
        Ok(entry)
    }
}
