use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use glyco_core::service::GlycoService;
use glyco_core::trends::{display_reading, format_change};

pub(crate) fn cmd_stats(svc: &GlycoService, window: usize, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct SeriesRow {
        #[tabled(rename = "When")]
        when: String,
        #[tabled(rename = "Before")]
        before: i64,
        #[tabled(rename = "After")]
        after: i64,
        #[tabled(rename = "Change")]
        change: String,
    }

    let summary = svc.trend_summary()?;
    let recent = svc.recent_series(window)?;
    let changes = svc.change_series(window)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "summary": summary,
                "recent": recent,
                "changes": changes,
            }))?
        );
        return Ok(());
    }

    if summary.completed_count == 0 {
        println!("No complete meals yet.");
        println!("Log a meal with both readings and a description to see trends.");
        return Ok(());
    }

    let count = summary.completed_count;
    println!("=== Blood sugar trends ({count} complete meals) ===\n");
    println!(
        "  Avg before: {} mg/dL",
        display_reading(summary.average_before)
    );
    println!(
        "  Avg after:  {} mg/dL",
        display_reading(summary.average_after)
    );
    println!(
        "  Avg change: {} mg/dL\n",
        format_change(summary.average_change)
    );

    // Both series window the same complete meals, so they line up row for row.
    let rows: Vec<SeriesRow> = recent
        .iter()
        .zip(&changes)
        .map(|(point, change)| SeriesRow {
            when: point.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            before: display_reading(point.before),
            after: display_reading(point.after),
            change: format_change(change.delta),
        })
        .collect();

    println!("  Last {} meals:", rows.len());
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
