use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use glyco_core::models::{BaselineInsulin, NewBaseline};
use glyco_core::service::GlycoService;

use super::helpers::{exit_not_found, format_dose, truncate};

pub(crate) fn cmd_baseline_set(
    svc: &GlycoService,
    baseline: &NewBaseline,
    json: bool,
) -> Result<()> {
    let saved = svc.save_baseline(baseline)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!("Saved baseline {} (now active)", saved.id);
        print_doses(&saved);
    }

    Ok(())
}

pub(crate) fn cmd_baseline_show(svc: &GlycoService, json: bool) -> Result<()> {
    let Some(active) = svc.active_baseline()? else {
        exit_not_found("No active baseline. Set one with `glyco baseline set`", json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&active)?);
        return Ok(());
    }

    let since = active.date_created.format("%Y-%m-%d %H:%M");
    println!("Active baseline [{}] since {since}", active.id);
    print_doses(&active);
    if !active.notes.is_empty() {
        println!("  Notes: {}", active.notes);
    }

    Ok(())
}

pub(crate) fn cmd_baseline_history(svc: &GlycoService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct BaselineRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Created")]
        created: String,
        #[tabled(rename = "Breakfast")]
        breakfast: String,
        #[tabled(rename = "Lunch")]
        lunch: String,
        #[tabled(rename = "Dinner")]
        dinner: String,
        #[tabled(rename = "Bedtime")]
        bedtime: String,
        #[tabled(rename = "Active")]
        active: &'static str,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let history = svc.baseline_history()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        eprintln!("No baselines saved yet");
        std::process::exit(2);
    }

    let rows: Vec<BaselineRow> = history
        .iter()
        .map(|b| BaselineRow {
            id: b.id,
            created: b.date_created.format("%Y-%m-%d %H:%M").to_string(),
            breakfast: format_dose(b.breakfast_short_acting),
            lunch: format_dose(b.lunch_short_acting),
            dinner: format_dose(b.dinner_short_acting),
            bedtime: format_dose(b.bedtime_long_acting),
            active: if b.is_active { "yes" } else { "" },
            notes: truncate(&b.notes, 30),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_baseline_deactivate(svc: &GlycoService, id: i64, json: bool) -> Result<()> {
    if !svc.deactivate_baseline(id)? {
        exit_not_found(&format!("Active baseline {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deactivated": id }));
    } else {
        println!("Deactivated baseline {id}");
    }
    Ok(())
}

fn print_doses(b: &BaselineInsulin) {
    println!("  Breakfast: {}", format_dose(b.breakfast_short_acting));
    println!("  Lunch:     {}", format_dose(b.lunch_short_acting));
    println!("  Dinner:    {}", format_dose(b.dinner_short_acting));
    println!("  Bedtime:   {} (long-acting)", format_dose(b.bedtime_long_acting));
}
