mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    LogArgs, UpdateArgs, cmd_baseline_deactivate, cmd_baseline_history, cmd_baseline_set,
    cmd_baseline_show, cmd_delete, cmd_export, cmd_import, cmd_list, cmd_log, cmd_show, cmd_stats,
    cmd_theme_list, cmd_theme_set, cmd_theme_show, cmd_update,
};
use crate::config::Config;
use glyco_core::models::NewBaseline;
use glyco_core::service::GlycoService;
use glyco_core::trends::DEFAULT_WINDOW;

#[derive(Parser)]
#[command(
    name = "glyco",
    version,
    about = "Log meals with before/after blood sugar readings"
)]
struct Cli {
    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a meal
    Log {
        /// What you ate
        description: Option<String>,
        /// Blood sugar before eating (mg/dL)
        #[arg(short, long)]
        before: Option<String>,
        /// Blood sugar about an hour after eating (mg/dL)
        #[arg(short, long)]
        after: Option<String>,
        /// Free-form notes
        #[arg(short, long)]
        notes: Option<String>,
        /// When the meal was eaten ("YYYY-MM-DD HH:MM" or RFC 3339, default: now)
        #[arg(long)]
        at: Option<String>,
        /// Meal slot: breakfast, lunch, dinner, snack, bedtime (default: from the time)
        #[arg(short, long)]
        slot: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals, newest first
    List {
        /// Only meals on this day (YYYY-MM-DD or today/yesterday)
        #[arg(short, long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one meal with its change and baseline dose
    Show {
        /// Meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a meal. The slot is kept unless --slot is given
    Update {
        /// Meal ID
        id: i64,
        /// New description
        #[arg(long)]
        description: Option<String>,
        /// New before reading ("none" clears it)
        #[arg(short, long)]
        before: Option<String>,
        /// New after reading ("none" clears it)
        #[arg(short, long)]
        after: Option<String>,
        /// New notes
        #[arg(short, long)]
        notes: Option<String>,
        /// New time ("YYYY-MM-DD HH:MM" or RFC 3339)
        #[arg(long)]
        at: Option<String>,
        /// New slot: breakfast, lunch, dinner, snack, bedtime
        #[arg(short, long)]
        slot: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal by ID
    Delete {
        /// Meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the insulin baseline
    Baseline {
        #[command(subcommand)]
        command: BaselineCommands,
    },
    /// Averages and recent before/after readings
    Stats {
        /// Number of recent complete meals to chart
        #[arg(short, long, default_value_t = DEFAULT_WINDOW)]
        window: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Display theme preference
    Theme {
        #[command(subcommand)]
        command: ThemeCommands,
    },
    /// Export all meals to a CSV file
    Export {
        /// Destination CSV path
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import meals from a CSV file
    Import {
        /// Source CSV path
        file: PathBuf,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum BaselineCommands {
    /// Save a new baseline and make it the active one
    Set {
        /// Breakfast short-acting units
        #[arg(long)]
        breakfast: Option<f64>,
        /// Lunch short-acting units
        #[arg(long)]
        lunch: Option<f64>,
        /// Dinner short-acting units
        #[arg(long)]
        dinner: Option<f64>,
        /// Bedtime long-acting units
        #[arg(long)]
        bedtime: Option<f64>,
        /// Notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the active baseline
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every saved baseline
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Deactivate a baseline without replacing it
    Deactivate {
        /// Baseline ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ThemeCommands {
    /// Show the selected theme
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Select a theme: dark, light-blue, light-pink
    Set {
        /// Theme key
        theme: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available themes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    tracing::debug!(db = %config.db_path.display(), "opening database");
    let svc = GlycoService::new(&config.db_path)?;

    match cli.command {
        Commands::Log {
            description,
            before,
            after,
            notes,
            at,
            slot,
            json,
        } => cmd_log(
            &svc,
            LogArgs {
                description,
                before,
                after,
                notes,
                at,
                slot,
            },
            json,
        ),
        Commands::List { date, json } => cmd_list(&svc, date, json),
        Commands::Show { id, json } => cmd_show(&svc, id, json),
        Commands::Update {
            id,
            description,
            before,
            after,
            notes,
            at,
            slot,
            json,
        } => cmd_update(
            &svc,
            id,
            UpdateArgs {
                description,
                before,
                after,
                notes,
                at,
                slot,
            },
            json,
        ),
        Commands::Delete { id, json } => cmd_delete(&svc, id, json),
        Commands::Baseline { command } => match command {
            BaselineCommands::Set {
                breakfast,
                lunch,
                dinner,
                bedtime,
                notes,
                json,
            } => cmd_baseline_set(
                &svc,
                &NewBaseline {
                    breakfast_short_acting: breakfast,
                    lunch_short_acting: lunch,
                    dinner_short_acting: dinner,
                    bedtime_long_acting: bedtime,
                    notes: notes.unwrap_or_default(),
                },
                json,
            ),
            BaselineCommands::Show { json } => cmd_baseline_show(&svc, json),
            BaselineCommands::History { json } => cmd_baseline_history(&svc, json),
            BaselineCommands::Deactivate { id, json } => cmd_baseline_deactivate(&svc, id, json),
        },
        Commands::Stats { window, json } => cmd_stats(&svc, window, json),
        Commands::Theme { command } => match command {
            ThemeCommands::Show { json } => cmd_theme_show(&svc, json),
            ThemeCommands::Set { theme, json } => cmd_theme_set(&svc, &theme, json),
            ThemeCommands::List { json } => cmd_theme_list(&svc, json),
        },
        Commands::Export { file, json } => cmd_export(&svc, &file, json),
        Commands::Import {
            file,
            dry_run,
            json,
        } => cmd_import(&svc, &file, dry_run, json),
    }
}
