//! Analytics over logged meals: chart series and summary averages.
//!
//! Every function here applies the same gate: only complete records (both
//! readings plus a description) are considered, whatever the caller passes in.
//! Aggregation runs on raw `f64` values; rounding happens only in the display
//! helpers at the bottom.

use chrono::{DateTime, Duration, Local};
use serde::Serialize;

use crate::models::MealRecord;

/// Number of most recent meals plotted by default.
pub const DEFAULT_WINDOW: usize = 10;

/// The after-meal reading is taken about an hour after eating.
pub const AFTER_READING_DELAY_MINUTES: i64 = 60;

/// One meal on the before/after trend chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadingPoint {
    pub timestamp: DateTime<Local>,
    pub before: f64,
    pub after: f64,
    pub after_timestamp: DateTime<Local>,
}

/// One bar on the change chart; positive `delta` means the reading rose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChangePoint {
    pub timestamp: DateTime<Local>,
    pub delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendSummary {
    pub completed_count: usize,
    pub average_before: f64,
    pub average_after: f64,
    pub average_change: f64,
}

/// Complete records in ascending timestamp order. Records sharing a timestamp
/// keep their input order.
#[must_use]
pub fn completed(records: &[MealRecord]) -> Vec<&MealRecord> {
    let mut done: Vec<&MealRecord> = records.iter().filter(|r| r.is_complete()).collect();
    done.sort_by_key(|r| r.timestamp);
    done
}

fn last_n<T>(items: Vec<T>, n: usize) -> Vec<T> {
    let skip = items.len().saturating_sub(n);
    items.into_iter().skip(skip).collect()
}

/// The `n` most recent complete meals, oldest first.
#[must_use]
pub fn recent_series(records: &[MealRecord], n: usize) -> Vec<ReadingPoint> {
    let points = completed(records)
        .into_iter()
        .filter_map(|r| {
            let (before, after) = (r.blood_sugar_before?, r.blood_sugar_after?);
            Some(ReadingPoint {
                timestamp: r.timestamp,
                before,
                after,
                after_timestamp: r.timestamp + Duration::minutes(AFTER_READING_DELAY_MINUTES),
            })
        })
        .collect();
    last_n(points, n)
}

/// `(timestamp, after - before)` for the `n` most recent complete meals,
/// oldest first.
#[must_use]
pub fn change_series(records: &[MealRecord], n: usize) -> Vec<ChangePoint> {
    let points = completed(records)
        .into_iter()
        .filter_map(|r| {
            Some(ChangePoint {
                timestamp: r.timestamp,
                delta: r.change_in_reading()?,
            })
        })
        .collect();
    last_n(points, n)
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Mean before-meal reading; 0 when nothing is complete.
#[must_use]
pub fn average_before(records: &[MealRecord]) -> f64 {
    mean(
        completed(records)
            .into_iter()
            .filter_map(|r| r.blood_sugar_before),
    )
}

/// Mean after-meal reading; 0 when nothing is complete.
#[must_use]
pub fn average_after(records: &[MealRecord]) -> f64 {
    mean(
        completed(records)
            .into_iter()
            .filter_map(|r| r.blood_sugar_after),
    )
}

/// Mean rise across meals; 0 when nothing is complete.
#[must_use]
pub fn average_change(records: &[MealRecord]) -> f64 {
    mean(
        completed(records)
            .into_iter()
            .filter_map(MealRecord::change_in_reading),
    )
}

#[must_use]
pub fn summarize(records: &[MealRecord]) -> TrendSummary {
    TrendSummary {
        completed_count: completed(records).len(),
        average_before: average_before(records),
        average_after: average_after(records),
        average_change: average_change(records),
    }
}

// --- Display ---

/// Reading rounded to the nearest whole mg/dL.
#[must_use]
pub fn display_reading(value: f64) -> i64 {
    value.round() as i64
}

/// Rounded change with an explicit `+` on rises, e.g. `+35`, `-12`, `0`.
#[must_use]
pub fn format_change(delta: f64) -> String {
    let rounded = display_reading(delta);
    if rounded > 0 {
        format!("+{rounded}")
    } else {
        rounded.to_string()
    }
}
