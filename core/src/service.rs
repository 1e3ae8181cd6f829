use std::io::{Read, Write};
use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;

use crate::db::Database;
use crate::meal_csv::{self, CsvImportSummary};
use crate::models::{
    self, AppTheme, BaselineInsulin, MealRecord, NewBaseline, NewMeal, THEME_SETTING_KEY,
    UpdateMeal, validate_new_baseline, validate_new_meal, validate_update_meal,
};
use crate::trends::{self, ChangePoint, ReadingPoint, TrendSummary};

/// Entry point for front ends. Reads come out of the store and go through the
/// pure functions in `models` and `trends`; writes are validated first.
pub struct GlycoService {
    db: Database,
}

impl GlycoService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Meals ---

    pub fn log_meal(&self, meal: &NewMeal) -> Result<MealRecord> {
        validate_new_meal(meal)?;
        self.db.insert_meal(meal)
    }

    pub fn get_meal(&self, id: i64) -> Result<MealRecord> {
        self.db.get_meal(id)
    }

    pub fn find_meal(&self, id: i64) -> Result<Option<MealRecord>> {
        self.db.find_meal(id)
    }

    pub fn update_meal(&self, id: i64, update: &UpdateMeal) -> Result<MealRecord> {
        validate_update_meal(update)?;
        self.db.update_meal(id, update)
    }

    pub fn delete_meal(&self, id: i64) -> Result<bool> {
        self.db.delete_meal(id)
    }

    /// Meals newest first, optionally limited to one local day.
    pub fn list_meals(&self, day: Option<NaiveDate>) -> Result<Vec<MealRecord>> {
        let all = self.db.fetch_all_meals()?;
        let mut meals: Vec<MealRecord> = match day {
            Some(date) => models::meals_on_day(&all, date)
                .into_iter()
                .cloned()
                .collect(),
            None => all,
        };
        meals.reverse();
        Ok(meals)
    }

    /// Units for a meal's slot under the baseline active now.
    pub fn dose_for_meal(&self, meal: &MealRecord) -> Result<f64> {
        let baselines = self.db.fetch_active_baselines()?;
        Ok(meal.baseline_dose(&baselines))
    }

    // --- Baselines ---

    pub fn save_baseline(&self, baseline: &NewBaseline) -> Result<BaselineInsulin> {
        validate_new_baseline(baseline)?;
        self.db.insert_baseline(baseline)
    }

    pub fn active_baseline(&self) -> Result<Option<BaselineInsulin>> {
        let baselines = self.db.fetch_active_baselines()?;
        Ok(models::active_baseline(&baselines).cloned())
    }

    pub fn baseline_history(&self) -> Result<Vec<BaselineInsulin>> {
        self.db.fetch_all_baselines()
    }

    pub fn deactivate_baseline(&self, id: i64) -> Result<bool> {
        self.db.deactivate_baseline(id)
    }

    // --- Analytics ---

    pub fn trend_summary(&self) -> Result<TrendSummary> {
        let meals = self.db.fetch_all_meals()?;
        Ok(trends::summarize(&meals))
    }

    pub fn recent_series(&self, n: usize) -> Result<Vec<ReadingPoint>> {
        let meals = self.db.fetch_all_meals()?;
        Ok(trends::recent_series(&meals, n))
    }

    pub fn change_series(&self, n: usize) -> Result<Vec<ChangePoint>> {
        let meals = self.db.fetch_all_meals()?;
        Ok(trends::change_series(&meals, n))
    }

    // --- Theme ---

    /// Stored theme, or the default when nothing usable is stored.
    pub fn theme(&self) -> Result<AppTheme> {
        let Some(stored) = self.db.get_setting(THEME_SETTING_KEY)? else {
            return Ok(AppTheme::default());
        };
        Ok(AppTheme::from_key(&stored).unwrap_or_else(|| {
            tracing::warn!(stored = %stored, "unknown theme in settings, using default");
            AppTheme::default()
        }))
    }

    pub fn set_theme(&self, theme: AppTheme) -> Result<()> {
        self.db.set_setting(THEME_SETTING_KEY, theme.key())?;
        tracing::debug!(theme = theme.key(), "theme updated");
        Ok(())
    }

    // --- CSV ---

    /// Writes every meal, oldest first. Returns the row count.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let meals = self.db.fetch_all_meals()?;
        meal_csv::write_meals_csv(writer, &meals)
    }

    pub fn import_csv<R: Read>(&self, reader: R, dry_run: bool) -> Result<CsvImportSummary> {
        let meals = meal_csv::parse_meals_csv(reader)?;
        meal_csv::import_meals(&self.db, &meals, dry_run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MealSlot;
    use chrono::{DateTime, Local, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 6, day, hour, 0, 0)
            .earliest()
            .unwrap()
    }

    fn meal(day: u32, hour: u32, before: f64, after: f64) -> NewMeal {
        NewMeal {
            timestamp: at(day, hour),
            blood_sugar_before: Some(before),
            blood_sugar_after: Some(after),
            description: "Rice bowl".to_string(),
            notes: String::new(),
            meal_slot: None,
        }
    }

    fn baseline(breakfast: f64, lunch: f64) -> NewBaseline {
        NewBaseline {
            breakfast_short_acting: Some(breakfast),
            lunch_short_acting: Some(lunch),
            ..NewBaseline::default()
        }
    }

    #[test]
    fn test_log_meal_infers_slot() {
        let svc = GlycoService::new_in_memory().unwrap();
        let logged = svc.log_meal(&meal(15, 8, 95.0, 140.0)).unwrap();
        assert_eq!(logged.meal_slot, MealSlot::Breakfast);
        assert!(logged.is_complete());
    }

    #[test]
    fn test_log_meal_rejects_bad_reading() {
        let svc = GlycoService::new_in_memory().unwrap();
        let err = svc.log_meal(&meal(15, 8, 0.0, 140.0)).unwrap_err();
        assert!(err.to_string().contains("positive"));
        assert!(svc.list_meals(None).unwrap().is_empty());
    }

    #[test]
    fn test_list_meals_newest_first_and_by_day() {
        let svc = GlycoService::new_in_memory().unwrap();
        svc.log_meal(&meal(15, 8, 95.0, 140.0)).unwrap();
        svc.log_meal(&meal(15, 19, 100.0, 150.0)).unwrap();
        svc.log_meal(&meal(16, 12, 105.0, 160.0)).unwrap();

        let all = svc.list_meals(None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].timestamp, at(16, 12));
        assert_eq!(all[2].timestamp, at(15, 8));

        let day = at(15, 0).date_naive();
        let on_day = svc.list_meals(Some(day)).unwrap();
        assert_eq!(on_day.len(), 2);
        assert_eq!(on_day[0].meal_slot, MealSlot::Dinner);
    }

    #[test]
    fn test_update_meal_requires_changes() {
        let svc = GlycoService::new_in_memory().unwrap();
        let logged = svc.log_meal(&meal(15, 12, 95.0, 140.0)).unwrap();
        assert!(svc.update_meal(logged.id, &UpdateMeal::default()).is_err());

        let updated = svc
            .update_meal(
                logged.id,
                &UpdateMeal {
                    blood_sugar_after: Some(None),
                    ..UpdateMeal::default()
                },
            )
            .unwrap();
        assert!(!updated.is_complete());
    }

    #[test]
    fn test_dose_uses_current_baseline() {
        let svc = GlycoService::new_in_memory().unwrap();
        let lunch = svc.log_meal(&meal(15, 12, 95.0, 140.0)).unwrap();
        assert!(svc.dose_for_meal(&lunch).unwrap().abs() < f64::EPSILON);

        svc.save_baseline(&baseline(4.0, 5.0)).unwrap();
        assert!((svc.dose_for_meal(&lunch).unwrap() - 5.0).abs() < f64::EPSILON);

        // A newer baseline changes the dose shown for an old meal too.
        svc.save_baseline(&baseline(4.0, 6.5)).unwrap();
        assert!((svc.dose_for_meal(&lunch).unwrap() - 6.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_baseline_history_and_active() {
        let svc = GlycoService::new_in_memory().unwrap();
        assert!(svc.active_baseline().unwrap().is_none());

        let first = svc.save_baseline(&baseline(3.0, 4.0)).unwrap();
        let second = svc.save_baseline(&baseline(3.5, 4.5)).unwrap();

        let active = svc.active_baseline().unwrap().unwrap();
        assert_eq!(active.id, second.id);

        let history = svc.baseline_history().unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().any(|b| b.id == first.id && !b.is_active));

        assert!(svc.deactivate_baseline(second.id).unwrap());
        assert!(svc.active_baseline().unwrap().is_none());
    }

    #[test]
    fn test_save_baseline_requires_a_dose() {
        let svc = GlycoService::new_in_memory().unwrap();
        assert!(svc.save_baseline(&NewBaseline::default()).is_err());
        assert!(
            svc.save_baseline(&NewBaseline {
                bedtime_long_acting: Some(-1.0),
                ..NewBaseline::default()
            })
            .is_err()
        );
        assert!(svc.baseline_history().unwrap().is_empty());
    }

    #[test]
    fn test_analytics() {
        let svc = GlycoService::new_in_memory().unwrap();
        svc.log_meal(&meal(15, 8, 100.0, 140.0)).unwrap();
        svc.log_meal(&meal(16, 8, 110.0, 170.0)).unwrap();
        svc.log_meal(&NewMeal {
            blood_sugar_after: None,
            ..meal(17, 8, 300.0, 0.0)
        })
        .unwrap();

        let summary = svc.trend_summary().unwrap();
        assert_eq!(summary.completed_count, 2);
        assert!((summary.average_change - 50.0).abs() < 1e-9);
        assert!(
            (summary.average_change - (summary.average_after - summary.average_before)).abs()
                < 1e-9
        );
        assert!((summary.average_before - 105.0).abs() < 1e-9);
        assert!((summary.average_after - 155.0).abs() < 1e-9);

        let series = svc.recent_series(1).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].timestamp, at(16, 8));

        let changes = svc.change_series(10).unwrap();
        assert_eq!(changes.len(), 2);
        assert!((changes[0].delta - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_theme_default_and_persist() {
        let svc = GlycoService::new_in_memory().unwrap();
        assert_eq!(svc.theme().unwrap(), AppTheme::Dark);

        svc.set_theme(AppTheme::LightPink).unwrap();
        assert_eq!(svc.theme().unwrap(), AppTheme::LightPink);
    }

    #[test]
    fn test_theme_falls_back_on_garbage() {
        let svc = GlycoService::new_in_memory().unwrap();
        svc.db.set_setting(THEME_SETTING_KEY, "neon").unwrap();
        assert_eq!(svc.theme().unwrap(), AppTheme::Dark);
    }

    #[test]
    fn test_csv_round_trip_through_service() {
        let svc = GlycoService::new_in_memory().unwrap();
        svc.log_meal(&meal(15, 8, 100.0, 140.0)).unwrap();
        svc.log_meal(&meal(15, 21, 120.0, 130.0)).unwrap();

        let mut buf = Vec::new();
        assert_eq!(svc.export_csv(&mut buf).unwrap(), 2);

        let other = GlycoService::new_in_memory().unwrap();
        let dry = other.import_csv(buf.as_slice(), true).unwrap();
        assert_eq!(dry.meals_imported, 2);
        assert!(other.list_meals(None).unwrap().is_empty());

        let summary = other.import_csv(buf.as_slice(), false).unwrap();
        assert_eq!(summary.complete_meals, 2);
        let imported = other.list_meals(None).unwrap();
        assert_eq!(imported.len(), 2);
        assert_eq!(imported[0].meal_slot, MealSlot::Snack);
    }

    #[test]
    fn test_file_backed_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glyco.db");
        {
            let svc = GlycoService::new(&path).unwrap();
            svc.log_meal(&meal(15, 12, 95.0, 140.0)).unwrap();
            svc.set_theme(AppTheme::LightBlue).unwrap();
        }
        let svc = GlycoService::new(&path).unwrap();
        assert_eq!(svc.list_meals(None).unwrap().len(), 1);
        assert_eq!(svc.theme().unwrap(), AppTheme::LightBlue);
    }
}
