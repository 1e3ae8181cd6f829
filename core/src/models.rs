use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// Time-of-day bucket a meal belongs to. Also the lookup key into the active
/// baseline's dose fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Bedtime,
}

pub const MEAL_SLOTS: &[MealSlot] = &[
    MealSlot::Breakfast,
    MealSlot::Lunch,
    MealSlot::Dinner,
    MealSlot::Snack,
    MealSlot::Bedtime,
];

impl MealSlot {
    /// Slot for a local wall-clock hour (0-23). Hours outside the three main
    /// meal windows fall back to `Snack`; `Bedtime` is never inferred.
    #[must_use]
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=10 => Self::Breakfast,
            11..=14 => Self::Lunch,
            15..=19 => Self::Dinner,
            _ => Self::Snack,
        }
    }

    /// Infer the slot from a timestamp. The timestamp's own time zone decides
    /// which hour counts, so callers pass it in the device's local zone.
    #[must_use]
    pub fn infer<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> Self {
        Self::from_hour(timestamp.hour())
    }

    /// Case-insensitive label lookup. Unknown labels yield `None`.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "breakfast" => Some(Self::Breakfast),
            "lunch" => Some(Self::Lunch),
            "dinner" => Some(Self::Dinner),
            "snack" => Some(Self::Snack),
            "bedtime" => Some(Self::Bedtime),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "Breakfast",
            Self::Lunch => "Lunch",
            Self::Dinner => "Dinner",
            Self::Snack => "Snack",
            Self::Bedtime => "Bedtime",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealSlot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match Self::parse(s) {
            Some(slot) => Ok(slot),
            None => {
                let valid: Vec<&str> = MEAL_SLOTS.iter().map(|s| s.as_str()).collect();
                bail!(
                    "Invalid meal slot '{s}'. Must be one of: {}",
                    valid.join(", ")
                )
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MealRecord {
    pub id: i64,
    pub uuid: String,
    pub timestamp: DateTime<Local>,
    pub blood_sugar_before: Option<f64>,
    pub blood_sugar_after: Option<f64>,
    pub description: String,
    pub notes: String,
    pub meal_slot: MealSlot,
    pub created_at: String,
    pub updated_at: String,
}

impl MealRecord {
    /// Both readings logged and the meal described. Only complete records
    /// take part in trend analytics.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.blood_sugar_before.is_some()
            && self.blood_sugar_after.is_some()
            && !self.description.is_empty()
    }

    /// `after - before`, or `None` unless both readings are present.
    #[must_use]
    pub fn change_in_reading(&self) -> Option<f64> {
        match (self.blood_sugar_before, self.blood_sugar_after) {
            (Some(before), Some(after)) => Some(after - before),
            _ => None,
        }
    }

    /// Dose for this meal's slot from whichever baseline is active now,
    /// not the one active when the meal was logged. 0.0 without an active
    /// baseline.
    #[must_use]
    pub fn baseline_dose(&self, baselines: &[BaselineInsulin]) -> f64 {
        active_baseline(baselines).map_or(0.0, |b| b.dose_for(self.meal_slot))
    }
}

#[derive(Debug, Clone)]
pub struct NewMeal {
    pub timestamp: DateTime<Local>,
    pub blood_sugar_before: Option<f64>,
    pub blood_sugar_after: Option<f64>,
    pub description: String,
    pub notes: String,
    /// Explicit slot; inferred from `timestamp` when absent.
    pub meal_slot: Option<MealSlot>,
}

impl NewMeal {
    #[must_use]
    pub fn resolved_slot(&self) -> MealSlot {
        self.meal_slot
            .unwrap_or_else(|| MealSlot::infer(&self.timestamp))
    }
}

/// Partial edit of a meal. `None` leaves a field untouched; the nested
/// `Option` on readings lets a reading be cleared.
#[derive(Debug, Clone, Default)]
pub struct UpdateMeal {
    pub timestamp: Option<DateTime<Local>>,
    pub blood_sugar_before: Option<Option<f64>>,
    pub blood_sugar_after: Option<Option<f64>>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub meal_slot: Option<MealSlot>,
}

impl UpdateMeal {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none()
            && self.blood_sugar_before.is_none()
            && self.blood_sugar_after.is_none()
            && self.description.is_none()
            && self.notes.is_none()
            && self.meal_slot.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineInsulin {
    pub id: i64,
    pub uuid: String,
    pub date_created: DateTime<Local>,
    pub breakfast_short_acting: f64,
    pub lunch_short_acting: f64,
    pub dinner_short_acting: f64,
    pub bedtime_long_acting: f64,
    pub notes: String,
    pub is_active: bool,
}

impl BaselineInsulin {
    /// Prescribed units for a slot. Snacks carry no baseline dose.
    #[must_use]
    pub fn dose_for(&self, slot: MealSlot) -> f64 {
        match slot {
            MealSlot::Breakfast => self.breakfast_short_acting,
            MealSlot::Lunch => self.lunch_short_acting,
            MealSlot::Dinner => self.dinner_short_acting,
            MealSlot::Bedtime => self.bedtime_long_acting,
            MealSlot::Snack => 0.0,
        }
    }

    /// Dose for a free-form slot label; labels that name no known slot get 0.0.
    #[must_use]
    pub fn dose_for_label(&self, label: &str) -> f64 {
        MealSlot::parse(label).map_or(0.0, |slot| self.dose_for(slot))
    }
}

/// The baseline currently in force: the most recently created active record.
/// More than one active record is tolerated; among equal creation times the
/// first one in `baselines` wins.
#[must_use]
pub fn active_baseline(baselines: &[BaselineInsulin]) -> Option<&BaselineInsulin> {
    baselines
        .iter()
        .filter(|b| b.is_active)
        .fold(None, |best: Option<&BaselineInsulin>, b| match best {
            Some(current) if current.date_created >= b.date_created => Some(current),
            _ => Some(b),
        })
}

/// Input for a new baseline. Omitted doses are stored as 0.0.
#[derive(Debug, Clone, Default)]
pub struct NewBaseline {
    pub breakfast_short_acting: Option<f64>,
    pub lunch_short_acting: Option<f64>,
    pub dinner_short_acting: Option<f64>,
    pub bedtime_long_acting: Option<f64>,
    pub notes: String,
}

/// Meals whose local timestamp falls on `date`, in input order.
#[must_use]
pub fn meals_on_day(records: &[MealRecord], date: NaiveDate) -> Vec<&MealRecord> {
    records
        .iter()
        .filter(|r| r.timestamp.date_naive() == date)
        .collect()
}

const LOCAL_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a meal time: RFC 3339 with an offset, or a local wall-clock time
/// such as `2024-06-15 12:30`.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Local>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Local));
    }
    for format in LOCAL_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Local.from_local_datetime(&naive).earliest().ok_or_else(|| {
                anyhow::anyhow!("'{s}' does not exist in the local time zone")
            });
        }
    }
    bail!("Invalid timestamp '{s}'. Use 'YYYY-MM-DD HH:MM' or RFC 3339")
}

// --- Display preference ---

pub const THEME_SETTING_KEY: &str = "selected_theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppTheme {
    #[default]
    Dark,
    LightBlue,
    LightPink,
}

pub const APP_THEMES: &[AppTheme] = &[AppTheme::Dark, AppTheme::LightBlue, AppTheme::LightPink];

impl AppTheme {
    /// Stable key persisted in the settings table.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::LightBlue => "lightBlue",
            Self::LightPink => "lightPink",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Dark => "Dark Theme",
            Self::LightBlue => "Light Blue Theme",
            Self::LightPink => "Light Pink Theme",
        }
    }

    /// Accepts the stored key in any case, plus dashed/underscored spellings
    /// (`light-blue`, `light_pink`).
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized: String = key
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "dark" => Some(Self::Dark),
            "lightblue" => Some(Self::LightBlue),
            "lightpink" => Some(Self::LightPink),
            _ => None,
        }
    }
}

// --- Validation ---

/// Blood-sugar readings must be positive finite numbers when present.
pub fn validate_reading(name: &str, reading: Option<f64>) -> Result<()> {
    if let Some(value) = reading {
        if !value.is_finite() || value <= 0.0 {
            bail!("{name} reading must be a positive number (got {value})");
        }
    }
    Ok(())
}

pub fn validate_new_meal(meal: &NewMeal) -> Result<()> {
    validate_reading("Before-meal", meal.blood_sugar_before)?;
    validate_reading("After-meal", meal.blood_sugar_after)?;
    Ok(())
}

pub fn validate_update_meal(update: &UpdateMeal) -> Result<()> {
    if update.is_empty() {
        bail!("Nothing to update");
    }
    validate_reading("Before-meal", update.blood_sugar_before.flatten())?;
    validate_reading("After-meal", update.blood_sugar_after.flatten())?;
    Ok(())
}

/// A baseline needs at least one dose, and every dose given must be a
/// non-negative finite number.
pub fn validate_new_baseline(baseline: &NewBaseline) -> Result<()> {
    let doses = [
        ("breakfast", baseline.breakfast_short_acting),
        ("lunch", baseline.lunch_short_acting),
        ("dinner", baseline.dinner_short_acting),
        ("bedtime", baseline.bedtime_long_acting),
    ];
    if doses.iter().all(|(_, dose)| dose.is_none()) {
        bail!("Enter at least one insulin dose (breakfast, lunch, dinner, or bedtime)");
    }
    for (name, dose) in doses {
        if let Some(units) = dose {
            if !units.is_finite() || units < 0.0 {
                bail!("The {name} dose must not be negative (got {units})");
            }
        }
    }
    Ok(())
}
