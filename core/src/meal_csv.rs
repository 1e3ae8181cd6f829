use std::collections::HashSet;
use std::io::{Read, Write};

use anyhow::{Context, Result, anyhow};
use chrono::SecondsFormat;
use serde::Serialize;

use crate::db::Database;
use crate::models::{MealRecord, MealSlot, NewMeal, parse_timestamp, validate_new_meal};

/// One exported row. Column order here is the file's column order.
#[derive(Debug, Serialize)]
struct CsvMealRow<'a> {
    timestamp: String,
    meal_slot: &'static str,
    blood_sugar_before: Option<f64>,
    blood_sugar_after: Option<f64>,
    description: &'a str,
    notes: &'a str,
}

/// Summary of what a CSV import would do / did.
#[derive(Debug, Clone, Serialize)]
pub struct CsvImportSummary {
    pub rows_parsed: usize,
    pub meals_imported: usize,
    pub complete_meals: usize,
    pub slots_inferred: usize,
    pub days_spanned: usize,
}

/// Write meals as CSV with a header row. Returns the number of rows written.
pub fn write_meals_csv<W: Write>(writer: W, meals: &[MealRecord]) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    for meal in meals {
        wtr.serialize(CsvMealRow {
            timestamp: meal.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
            meal_slot: meal.meal_slot.as_str(),
            blood_sugar_before: meal.blood_sugar_before,
            blood_sugar_after: meal.blood_sugar_after,
            description: &meal.description,
            notes: &meal.notes,
        })?;
    }
    if meals.is_empty() {
        wtr.write_record([
            "timestamp",
            "meal_slot",
            "blood_sugar_before",
            "blood_sugar_after",
            "description",
            "notes",
        ])?;
    }
    wtr.flush()?;
    Ok(meals.len())
}

/// Parse a meal log CSV from any reader.
///
/// Only `timestamp` is required. Missing or empty `meal_slot` cells leave the
/// slot to be inferred at insert time; empty reading cells mean no reading.
pub fn parse_meals_csv<R: Read>(reader: R) -> Result<Vec<NewMeal>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();

    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let idx_timestamp = col("timestamp").context("Missing required column: timestamp")?;
    let idx_slot = col("meal_slot");
    let idx_before = col("blood_sugar_before");
    let idx_after = col("blood_sugar_after");
    let idx_description = col("description");
    let idx_notes = col("notes");

    let mut meals = Vec::new();

    for (line_num, result) in rdr.records().enumerate() {
        let line = line_num + 2;
        let record = result.with_context(|| format!("Failed to parse CSV row {line}"))?;

        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("");

        let raw_timestamp = cell(Some(idx_timestamp));
        if raw_timestamp.is_empty() {
            continue; // skip blank rows
        }
        let timestamp =
            parse_timestamp(raw_timestamp).with_context(|| format!("CSV row {line}"))?;

        let meal_slot = match cell(idx_slot) {
            "" => None,
            label => Some(
                label
                    .parse::<MealSlot>()
                    .with_context(|| format!("CSV row {line}"))?,
            ),
        };

        let parse_reading = |idx: Option<usize>| -> Result<Option<f64>> {
            match cell(idx) {
                "" => Ok(None),
                v => v
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| anyhow!("CSV row {line}: invalid reading '{v}'")),
            }
        };

        let meal = NewMeal {
            timestamp,
            blood_sugar_before: parse_reading(idx_before)?,
            blood_sugar_after: parse_reading(idx_after)?,
            description: cell(idx_description).to_string(),
            notes: cell(idx_notes).to_string(),
            meal_slot,
        };
        validate_new_meal(&meal).with_context(|| format!("CSV row {line}"))?;
        meals.push(meal);
    }

    Ok(meals)
}

/// Insert parsed meals. When `dry_run` is true, nothing is written.
pub fn import_meals(db: &Database, meals: &[NewMeal], dry_run: bool) -> Result<CsvImportSummary> {
    let mut meals_imported = 0;
    let mut complete_meals = 0;
    let mut slots_inferred = 0;
    let mut days = HashSet::new();

    for meal in meals {
        days.insert(meal.timestamp.date_naive());
        if meal.meal_slot.is_none() {
            slots_inferred += 1;
        }
        if meal.blood_sugar_before.is_some()
            && meal.blood_sugar_after.is_some()
            && !meal.description.is_empty()
        {
            complete_meals += 1;
        }
        if !dry_run {
            db.insert_meal(meal)?;
        }
        meals_imported += 1;
    }

    if meals_imported > 0 && !dry_run {
        tracing::info!(meals_imported, "imported meals from CSV");
    }

    Ok(CsvImportSummary {
        rows_parsed: meals.len(),
        meals_imported,
        complete_meals,
        slots_inferred,
        days_spanned: days.len(),
    })
}
