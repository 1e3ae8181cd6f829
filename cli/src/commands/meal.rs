use anyhow::Result;
use serde::Serialize;

use glyco_core::models::{BaselineInsulin, MealRecord, MealSlot, NewMeal, UpdateMeal};
use glyco_core::service::GlycoService;
use glyco_core::trends::format_change;

use super::helpers::{
    exit_not_found, format_dose, format_reading, parse_date, parse_reading, parse_when,
    print_meal_table,
};

/// A meal plus the values the list and detail screens derive from it.
#[derive(Serialize)]
struct MealView<'a> {
    #[serde(flatten)]
    meal: &'a MealRecord,
    is_complete: bool,
    change_in_reading: Option<f64>,
    baseline_dose: f64,
}

impl<'a> MealView<'a> {
    fn new(meal: &'a MealRecord, active: Option<&BaselineInsulin>) -> Self {
        Self {
            meal,
            is_complete: meal.is_complete(),
            change_in_reading: meal.change_in_reading(),
            baseline_dose: dose_under(meal, active),
        }
    }
}

/// Dose for `meal` under an already resolved active baseline.
fn dose_under(meal: &MealRecord, active: Option<&BaselineInsulin>) -> f64 {
    active.map_or(0.0, |b| b.dose_for(meal.meal_slot))
}

pub(crate) struct LogArgs {
    pub description: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub notes: Option<String>,
    pub at: Option<String>,
    pub slot: Option<String>,
}

pub(crate) fn cmd_log(svc: &GlycoService, args: LogArgs, json: bool) -> Result<()> {
    let meal = NewMeal {
        timestamp: parse_when(args.at.as_deref())?,
        blood_sugar_before: args.before.as_deref().map(parse_reading).transpose()?.flatten(),
        blood_sugar_after: args.after.as_deref().map(parse_reading).transpose()?.flatten(),
        description: args.description.unwrap_or_default(),
        notes: args.notes.unwrap_or_default(),
        meal_slot: args.slot.as_deref().map(str::parse::<MealSlot>).transpose()?,
    };

    let logged = svc.log_meal(&meal)?;

    if json {
        let active = svc.active_baseline()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&MealView::new(&logged, active.as_ref()))?
        );
    } else {
        let id = logged.id;
        let slot = logged.meal_slot;
        let when = logged.timestamp.format("%Y-%m-%d %H:%M");
        let what = if logged.description.is_empty() {
            "meal"
        } else {
            logged.description.as_str()
        };
        println!("Logged {what} as {slot} at {when} [{id}]");
        if !logged.is_complete() {
            println!("  Incomplete: add both readings and a description to include it in stats.");
        }
    }

    Ok(())
}

pub(crate) fn cmd_list(svc: &GlycoService, date: Option<String>, json: bool) -> Result<()> {
    let day = date.map(|d| parse_date(Some(d))).transpose()?;
    let meals = svc.list_meals(day)?;

    let active = svc.active_baseline()?;

    if json {
        let views: Vec<MealView> = meals
            .iter()
            .map(|meal| MealView::new(meal, active.as_ref()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if meals.is_empty() {
        match day {
            Some(d) => eprintln!("No meals logged on {d}"),
            None => eprintln!("No meals logged yet"),
        }
        std::process::exit(2);
    }

    let count = meals.len();
    let complete = meals.iter().filter(|m| m.is_complete()).count();
    println!("{count} meals ({complete} complete)");
    let doses: Vec<f64> = meals
        .iter()
        .map(|m| dose_under(m, active.as_ref()))
        .collect();
    print_meal_table(&meals, &doses);

    Ok(())
}

pub(crate) fn cmd_show(svc: &GlycoService, id: i64, json: bool) -> Result<()> {
    let Some(meal) = svc.find_meal(id)? else {
        exit_not_found(&format!("Meal {id} not found"), json);
    };
    let active = svc.active_baseline()?;
    let view = MealView::new(&meal, active.as_ref());

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let when = meal.timestamp.format("%Y-%m-%d %H:%M");
    let slot = meal.meal_slot;
    println!("[{id}] {slot} at {when}");
    if !meal.description.is_empty() {
        println!("  {}", meal.description);
    }
    let before = format_reading(meal.blood_sugar_before);
    let after = format_reading(meal.blood_sugar_after);
    print!("  Before: {before}  After: {after}");
    if let Some(delta) = view.change_in_reading {
        print!("  Change: {}", format_change(delta));
    }
    println!();
    if view.baseline_dose > 0.0 {
        println!("  Baseline dose: {}", format_dose(view.baseline_dose));
    }
    if !meal.notes.is_empty() {
        println!("  Notes: {}", meal.notes);
    }
    if !view.is_complete {
        println!("  (incomplete)");
    }

    Ok(())
}

pub(crate) struct UpdateArgs {
    pub description: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub notes: Option<String>,
    pub at: Option<String>,
    pub slot: Option<String>,
}

pub(crate) fn cmd_update(svc: &GlycoService, id: i64, args: UpdateArgs, json: bool) -> Result<()> {
    let update = UpdateMeal {
        timestamp: args.at.as_deref().map(|a| parse_when(Some(a))).transpose()?,
        blood_sugar_before: args.before.as_deref().map(parse_reading).transpose()?,
        blood_sugar_after: args.after.as_deref().map(parse_reading).transpose()?,
        description: args.description,
        notes: args.notes,
        meal_slot: args.slot.as_deref().map(str::parse::<MealSlot>).transpose()?,
    };

    if svc.find_meal(id)?.is_none() {
        exit_not_found(&format!("Meal {id} not found"), json);
    }

    let updated = svc.update_meal(id, &update)?;

    if json {
        let active = svc.active_baseline()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&MealView::new(&updated, active.as_ref()))?
        );
    } else {
        let slot = updated.meal_slot;
        let when = updated.timestamp.format("%Y-%m-%d %H:%M");
        let before = format_reading(updated.blood_sugar_before);
        let after = format_reading(updated.blood_sugar_after);
        println!("Updated meal {id}: {slot} at {when}, {before} → {after}");
    }

    Ok(())
}

pub(crate) fn cmd_delete(svc: &GlycoService, id: i64, json: bool) -> Result<()> {
    if !svc.delete_meal(id)? {
        exit_not_found(&format!("Meal {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted meal {id}");
    }
    Ok(())
}
