use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::models::{BaselineInsulin, MealRecord, MealSlot, NewBaseline, NewMeal, UpdateMeal};

const MEAL_COLUMNS: &str = "id, uuid, timestamp, blood_sugar_before, blood_sugar_after,
     description, notes, meal_slot, created_at, updated_at";

const BASELINE_COLUMNS: &str = "id, uuid, date_created, breakfast_short_acting,
     lunch_short_acting, dinner_short_acting, bedtime_long_acting, notes, is_active";

impl ToSql for MealSlot {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MealSlot {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let label = value.as_str()?;
        MealSlot::parse(label)
            .ok_or_else(|| FromSqlError::Other(format!("unknown meal slot '{label}'").into()))
    }
}

/// Timestamps are stored as UTC RFC 3339 with whole seconds so that string
/// order in SQL matches chronological order.
fn to_db_timestamp(ts: &DateTime<Local>) -> String {
    ts.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn timestamp_from_row(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Local))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            tracing::info!("creating meal and baseline tables");
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    timestamp TEXT NOT NULL,
                    blood_sugar_before REAL,
                    blood_sugar_after REAL,
                    description TEXT NOT NULL DEFAULT '',
                    notes TEXT NOT NULL DEFAULT '',
                    meal_slot TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS baselines (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    date_created TEXT NOT NULL,
                    breakfast_short_acting REAL NOT NULL DEFAULT 0.0,
                    lunch_short_acting REAL NOT NULL DEFAULT 0.0,
                    dinner_short_acting REAL NOT NULL DEFAULT 0.0,
                    bedtime_long_acting REAL NOT NULL DEFAULT 0.0,
                    notes TEXT NOT NULL DEFAULT '',
                    is_active INTEGER NOT NULL DEFAULT 1
                );

                CREATE INDEX IF NOT EXISTS idx_meals_timestamp ON meals(timestamp);
                CREATE INDEX IF NOT EXISTS idx_baselines_active ON baselines(is_active);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    // Expects MEAL_COLUMNS order.
    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<MealRecord> {
        Ok(MealRecord {
            id: row.get(0)?,
            uuid: row.get(1)?,
            timestamp: timestamp_from_row(row, 2)?,
            blood_sugar_before: row.get(3)?,
            blood_sugar_after: row.get(4)?,
            description: row.get(5)?,
            notes: row.get(6)?,
            meal_slot: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    // Expects BASELINE_COLUMNS order.
    fn baseline_from_row(row: &rusqlite::Row) -> rusqlite::Result<BaselineInsulin> {
        Ok(BaselineInsulin {
            id: row.get(0)?,
            uuid: row.get(1)?,
            date_created: timestamp_from_row(row, 2)?,
            breakfast_short_acting: row.get(3)?,
            lunch_short_acting: row.get(4)?,
            dinner_short_acting: row.get(5)?,
            bedtime_long_acting: row.get(6)?,
            notes: row.get(7)?,
            is_active: row.get(8)?,
        })
    }

    // --- Meals ---

    /// Insert a meal. The slot is fixed here: taken from `meal_slot` or
    /// inferred from the timestamp's local hour, and never re-inferred later.
    pub fn insert_meal(&self, meal: &NewMeal) -> Result<MealRecord> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        let slot = meal.resolved_slot();
        self.conn.execute(
            "INSERT INTO meals (uuid, timestamp, blood_sugar_before, blood_sugar_after, description, notes, meal_slot, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                uuid,
                to_db_timestamp(&meal.timestamp),
                meal.blood_sugar_before,
                meal.blood_sugar_after,
                meal.description,
                meal.notes,
                slot,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(id, %slot, inferred = meal.meal_slot.is_none(), "inserted meal");
        self.get_meal(id)
    }

    pub fn get_meal(&self, id: i64) -> Result<MealRecord> {
        self.find_meal(id)?
            .with_context(|| format!("Meal {id} not found"))
    }

    /// `Ok(None)` only when no row has this id; unreadable rows are errors.
    pub fn find_meal(&self, id: i64) -> Result<Option<MealRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = ?1"),
                params![id],
                Self::meal_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to read meal {id}"))
    }

    /// All meals, oldest first.
    pub fn fetch_all_meals(&self) -> Result<Vec<MealRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals ORDER BY timestamp, id"
        ))?;
        let meals = stmt
            .query_map([], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    pub fn delete_meal(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM meals WHERE id = ?1", params![id])?;
        tracing::debug!(id, deleted = rows > 0, "delete meal");
        Ok(rows > 0)
    }

    pub fn update_meal(&self, id: i64, update: &UpdateMeal) -> Result<MealRecord> {
        // Verify existence
        self.get_meal(id)?;

        let now = Local::now().to_rfc3339();
        if let Some(timestamp) = update.timestamp {
            self.conn.execute(
                "UPDATE meals SET timestamp = ?1, updated_at = ?2 WHERE id = ?3",
                params![to_db_timestamp(&timestamp), now, id],
            )?;
        }
        if let Some(before) = update.blood_sugar_before {
            self.conn.execute(
                "UPDATE meals SET blood_sugar_before = ?1, updated_at = ?2 WHERE id = ?3",
                params![before, now, id],
            )?;
        }
        if let Some(after) = update.blood_sugar_after {
            self.conn.execute(
                "UPDATE meals SET blood_sugar_after = ?1, updated_at = ?2 WHERE id = ?3",
                params![after, now, id],
            )?;
        }
        if let Some(ref description) = update.description {
            self.conn.execute(
                "UPDATE meals SET description = ?1, updated_at = ?2 WHERE id = ?3",
                params![description, now, id],
            )?;
        }
        if let Some(ref notes) = update.notes {
            self.conn.execute(
                "UPDATE meals SET notes = ?1, updated_at = ?2 WHERE id = ?3",
                params![notes, now, id],
            )?;
        }
        if let Some(slot) = update.meal_slot {
            self.conn.execute(
                "UPDATE meals SET meal_slot = ?1, updated_at = ?2 WHERE id = ?3",
                params![slot, now, id],
            )?;
        }

        self.get_meal(id)
    }

    // --- Baselines ---

    /// Save a new active baseline. Every previously active baseline is
    /// deactivated in the same transaction; old rows stay as history.
    pub fn insert_baseline(&self, baseline: &NewBaseline) -> Result<BaselineInsulin> {
        let uuid = Uuid::new_v4().to_string();
        let created = to_db_timestamp(&Local::now());

        let tx = self.conn.unchecked_transaction()?;
        let deactivated = tx.execute(
            "UPDATE baselines SET is_active = 0 WHERE is_active = 1",
            [],
        )?;
        tx.execute(
            "INSERT INTO baselines (uuid, date_created, breakfast_short_acting, lunch_short_acting, dinner_short_acting, bedtime_long_acting, notes, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            params![
                uuid,
                created,
                baseline.breakfast_short_acting.unwrap_or(0.0),
                baseline.lunch_short_acting.unwrap_or(0.0),
                baseline.dinner_short_acting.unwrap_or(0.0),
                baseline.bedtime_long_acting.unwrap_or(0.0),
                baseline.notes,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(id, deactivated, "saved new active baseline");
        self.get_baseline(id)
    }

    pub fn get_baseline(&self, id: i64) -> Result<BaselineInsulin> {
        self.conn
            .query_row(
                &format!("SELECT {BASELINE_COLUMNS} FROM baselines WHERE id = ?1"),
                params![id],
                Self::baseline_from_row,
            )
            .context("Baseline not found")
    }

    pub fn deactivate_baseline(&self, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE baselines SET is_active = 0 WHERE id = ?1 AND is_active = 1",
            params![id],
        )?;
        Ok(rows > 0)
    }

    /// Active baselines, newest first. Normally at most one.
    pub fn fetch_active_baselines(&self) -> Result<Vec<BaselineInsulin>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BASELINE_COLUMNS} FROM baselines WHERE is_active = 1
             ORDER BY date_created DESC, id DESC"
        ))?;
        let baselines = stmt
            .query_map([], Self::baseline_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(baselines)
    }

    /// Every baseline ever saved, newest first.
    pub fn fetch_all_baselines(&self) -> Result<Vec<BaselineInsulin>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BASELINE_COLUMNS} FROM baselines ORDER BY date_created DESC, id DESC"
        ))?;
        let baselines = stmt
            .query_map([], Self::baseline_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(baselines)
    }

    // --- User Settings ---

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM user_settings WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM user_settings WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::active_baseline;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 6, day, hour, minute, 0)
            .earliest()
            .unwrap()
    }

    fn sample_meal() -> NewMeal {
        NewMeal {
            timestamp: at(15, 12, 30),
            blood_sugar_before: Some(110.0),
            blood_sugar_after: Some(165.0),
            description: "Chicken salad".to_string(),
            notes: "Extra dressing".to_string(),
            meal_slot: None,
        }
    }

    fn sample_baseline() -> NewBaseline {
        NewBaseline {
            breakfast_short_acting: Some(4.0),
            lunch_short_acting: Some(5.0),
            dinner_short_acting: Some(6.5),
            bedtime_long_acting: None,
            notes: "Clinic visit".to_string(),
        }
    }

    #[test]
    fn test_insert_and_get_meal() {
        let db = Database::open_in_memory().unwrap();
        let meal = db.insert_meal(&sample_meal()).unwrap();

        assert_eq!(meal.description, "Chicken salad");
        assert_eq!(meal.notes, "Extra dressing");
        assert_eq!(meal.blood_sugar_before, Some(110.0));
        assert_eq!(meal.blood_sugar_after, Some(165.0));
        assert_eq!(meal.timestamp, at(15, 12, 30));
        assert_eq!(meal.meal_slot, MealSlot::Lunch);
        assert!(!meal.uuid.is_empty());
        assert!(!meal.created_at.is_empty());

        let fetched = db.get_meal(meal.id).unwrap();
        assert_eq!(fetched.uuid, meal.uuid);
    }

    #[test]
    fn test_insert_meal_explicit_slot() {
        let db = Database::open_in_memory().unwrap();
        let meal = db
            .insert_meal(&NewMeal {
                meal_slot: Some(MealSlot::Bedtime),
                ..sample_meal()
            })
            .unwrap();
        assert_eq!(meal.meal_slot, MealSlot::Bedtime);
    }

    #[test]
    fn test_insert_meal_without_readings() {
        let db = Database::open_in_memory().unwrap();
        let meal = db
            .insert_meal(&NewMeal {
                blood_sugar_before: None,
                blood_sugar_after: None,
                description: String::new(),
                ..sample_meal()
            })
            .unwrap();
        assert!(meal.blood_sugar_before.is_none());
        assert!(!meal.is_complete());
    }

    #[test]
    fn test_get_meal_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_meal(42).is_err());
    }

    #[test]
    fn test_fetch_all_meals_sorted_by_timestamp() {
        let db = Database::open_in_memory().unwrap();
        for (day, hour) in [(16, 8), (14, 19), (15, 12)] {
            db.insert_meal(&NewMeal {
                timestamp: at(day, hour, 0),
                ..sample_meal()
            })
            .unwrap();
        }
        let meals = db.fetch_all_meals().unwrap();
        let stamps: Vec<_> = meals.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![at(14, 19, 0), at(15, 12, 0), at(16, 8, 0)]);
        assert_eq!(meals[0].meal_slot, MealSlot::Dinner);
        assert_eq!(meals[2].meal_slot, MealSlot::Breakfast);
    }

    #[test]
    fn test_delete_meal() {
        let db = Database::open_in_memory().unwrap();
        let meal = db.insert_meal(&sample_meal()).unwrap();
        assert!(db.delete_meal(meal.id).unwrap());
        assert!(!db.delete_meal(meal.id).unwrap());
        assert!(db.fetch_all_meals().unwrap().is_empty());
    }

    #[test]
    fn test_update_meal_fields() {
        let db = Database::open_in_memory().unwrap();
        let meal = db.insert_meal(&sample_meal()).unwrap();

        let updated = db
            .update_meal(
                meal.id,
                &UpdateMeal {
                    blood_sugar_after: Some(Some(150.0)),
                    description: Some("Chicken wrap".to_string()),
                    ..UpdateMeal::default()
                },
            )
            .unwrap();

        assert_eq!(updated.blood_sugar_after, Some(150.0));
        assert_eq!(updated.blood_sugar_before, Some(110.0));
        assert_eq!(updated.description, "Chicken wrap");
        assert_eq!(updated.notes, "Extra dressing");
        assert_eq!(updated.uuid, meal.uuid);
    }

    #[test]
    fn test_update_meal_clears_reading() {
        let db = Database::open_in_memory().unwrap();
        let meal = db.insert_meal(&sample_meal()).unwrap();
        let updated = db
            .update_meal(
                meal.id,
                &UpdateMeal {
                    blood_sugar_before: Some(None),
                    ..UpdateMeal::default()
                },
            )
            .unwrap();
        assert!(updated.blood_sugar_before.is_none());
        assert!(updated.change_in_reading().is_none());
    }

    #[test]
    fn test_update_timestamp_keeps_slot() {
        let db = Database::open_in_memory().unwrap();
        let meal = db.insert_meal(&sample_meal()).unwrap();
        assert_eq!(meal.meal_slot, MealSlot::Lunch);

        let updated = db
            .update_meal(
                meal.id,
                &UpdateMeal {
                    timestamp: Some(at(15, 7, 0)),
                    ..UpdateMeal::default()
                },
            )
            .unwrap();
        assert_eq!(updated.timestamp, at(15, 7, 0));
        assert_eq!(updated.meal_slot, MealSlot::Lunch);
    }

    #[test]
    fn test_update_meal_not_found() {
        let db = Database::open_in_memory().unwrap();
        let result = db.update_meal(
            999,
            &UpdateMeal {
                notes: Some("x".to_string()),
                ..UpdateMeal::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_insert_baseline_defaults_missing_doses() {
        let db = Database::open_in_memory().unwrap();
        let baseline = db.insert_baseline(&sample_baseline()).unwrap();
        assert!(baseline.is_active);
        assert!((baseline.dinner_short_acting - 6.5).abs() < f64::EPSILON);
        assert!(baseline.bedtime_long_acting.abs() < f64::EPSILON);
        assert_eq!(baseline.notes, "Clinic visit");
    }

    #[test]
    fn test_insert_baseline_deactivates_previous() {
        let db = Database::open_in_memory().unwrap();
        let first = db.insert_baseline(&sample_baseline()).unwrap();
        let second = db
            .insert_baseline(&NewBaseline {
                lunch_short_acting: Some(7.0),
                ..NewBaseline::default()
            })
            .unwrap();

        let active = db.fetch_active_baselines().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);

        let history = db.fetch_all_baselines().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        let old = history.iter().find(|b| b.id == first.id).unwrap();
        assert!(!old.is_active);
        assert!((old.lunch_short_acting - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_active_baseline_from_store_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_baseline(&sample_baseline()).unwrap();
        let newest = db
            .insert_baseline(&NewBaseline {
                dinner_short_acting: Some(8.0),
                ..NewBaseline::default()
            })
            .unwrap();
        let all = db.fetch_all_baselines().unwrap();
        assert_eq!(active_baseline(&all).unwrap().id, newest.id);
    }

    #[test]
    fn test_deactivate_baseline() {
        let db = Database::open_in_memory().unwrap();
        let baseline = db.insert_baseline(&sample_baseline()).unwrap();
        assert!(db.deactivate_baseline(baseline.id).unwrap());
        assert!(!db.deactivate_baseline(baseline.id).unwrap());
        assert!(db.fetch_active_baselines().unwrap().is_empty());
        assert!(!db.get_baseline(baseline.id).unwrap().is_active);
    }

    #[test]
    fn test_settings_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_setting("selected_theme").unwrap().is_none());
        db.set_setting("selected_theme", "lightBlue").unwrap();
        db.set_setting("selected_theme", "lightPink").unwrap();
        assert_eq!(
            db.get_setting("selected_theme").unwrap().as_deref(),
            Some("lightPink")
        );
        assert!(db.delete_setting("selected_theme").unwrap());
        assert!(!db.delete_setting("selected_theme").unwrap());
    }

    #[test]
    fn test_open_file_persists_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glyco.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_meal(&sample_meal()).unwrap();
            db.insert_baseline(&sample_baseline()).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.fetch_all_meals().unwrap().len(), 1);
        assert_eq!(db.fetch_active_baselines().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_stored_slot_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let meal = db.insert_meal(&sample_meal()).unwrap();
        db.conn
            .execute(
                "UPDATE meals SET meal_slot = 'Brunch' WHERE id = ?1",
                params![meal.id],
            )
            .unwrap();
        assert!(db.get_meal(meal.id).is_err());

        let err = db.find_meal(meal.id).unwrap_err();
        assert!(format!("{err:#}").contains("unknown meal slot 'Brunch'"));
    }

    #[test]
    fn test_find_meal_missing_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.find_meal(42).unwrap().is_none());
        let meal = db.insert_meal(&sample_meal()).unwrap();
        assert_eq!(db.find_meal(meal.id).unwrap().unwrap().id, meal.id);
    }
}
