use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use glyco_core::models::{MealRecord, parse_timestamp};
use glyco_core::trends::display_reading;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// `--at` value: "now", "YYYY-MM-DD HH:MM" or RFC 3339. Defaults to now.
pub(crate) fn parse_when(at: Option<&str>) -> Result<DateTime<Local>> {
    match at {
        None | Some("now") => Ok(Local::now()),
        Some(s) => parse_timestamp(s),
    }
}

/// Reading flag value. "none" or "-" clears a reading on update.
pub(crate) fn parse_reading(s: &str) -> Result<Option<f64>> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("none") || s == "-" {
        return Ok(None);
    }
    let s = s.trim_end_matches("mg/dL").trim_end_matches("mg/dl").trim();
    let value: f64 = s
        .parse()
        .with_context(|| format!("Invalid reading: '{s}'. Use a number like '120'"))?;
    if value <= 0.0 {
        bail!("Reading must be greater than 0");
    }
    Ok(Some(value))
}

pub(crate) fn format_reading(reading: Option<f64>) -> String {
    reading.map_or("-".into(), |v| display_reading(v).to_string())
}

/// Insulin units to one decimal, e.g. `4.5u`.
pub(crate) fn format_dose(units: f64) -> String {
    format!("{:.1}u", no_neg_zero(units))
}

pub(crate) fn print_meal_table(meals: &[MealRecord], doses: &[f64]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "")]
        done: &'static str,
        #[tabled(rename = "When")]
        when: String,
        #[tabled(rename = "Slot")]
        slot: String,
        #[tabled(rename = "Meal")]
        description: String,
        #[tabled(rename = "Before")]
        before: String,
        #[tabled(rename = "After")]
        after: String,
        #[tabled(rename = "Dose")]
        dose: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .zip(doses)
        .map(|(m, &dose)| MealRow {
            id: m.id,
            done: if m.is_complete() { "✓" } else { "…" },
            when: m.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            slot: m.meal_slot.to_string(),
            description: truncate(&m.description, 30),
            before: format_reading(m.blood_sugar_before),
            after: format_reading(m.blood_sugar_after),
            dose: if dose > 0.0 {
                format_dose(dose)
            } else {
                String::new()
            },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(5..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Print a not-found message (JSON or plain) and exit with status 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
