use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};

use glyco_core::service::GlycoService;

pub(crate) fn cmd_export(svc: &GlycoService, path: &Path, json: bool) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    let rows = svc.export_csv(BufWriter::new(file))?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "exported": rows, "path": path.display().to_string() })
        );
    } else {
        println!("Exported {rows} meals to {}", path.display());
    }
    Ok(())
}

pub(crate) fn cmd_import(svc: &GlycoService, path: &Path, dry_run: bool, json: bool) -> Result<()> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let summary = svc.import_csv(file, dry_run)?;

    if summary.rows_parsed == 0 {
        if json {
            println!(
                "{}",
                serde_json::json!({ "error": "No rows found in CSV file" })
            );
        } else {
            eprintln!("No rows found in CSV file.");
        }
        return Ok(());
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "dry_run": dry_run,
                "rows_parsed": summary.rows_parsed,
                "meals_imported": summary.meals_imported,
                "complete_meals": summary.complete_meals,
                "slots_inferred": summary.slots_inferred,
                "days_spanned": summary.days_spanned,
            })
        );
    } else {
        if dry_run {
            println!("Dry run: no changes made.\n");
        } else {
            println!("Import complete.\n");
        }
        let verb = if dry_run { "to import" } else { "imported" };
        println!("  Rows parsed:    {}", summary.rows_parsed);
        println!("  Meals {verb}: {}", summary.meals_imported);
        println!("  Complete:       {}", summary.complete_meals);
        println!("  Slots inferred: {}", summary.slots_inferred);
        println!("  Days spanned:   {}", summary.days_spanned);
    }

    Ok(())
}
