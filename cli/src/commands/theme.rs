use anyhow::{Result, bail};

use glyco_core::models::{APP_THEMES, AppTheme};
use glyco_core::service::GlycoService;

pub(crate) fn cmd_theme_show(svc: &GlycoService, json: bool) -> Result<()> {
    let theme = svc.theme()?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "theme": theme, "name": theme.display_name() })
        );
    } else {
        println!("{} ({})", theme.display_name(), theme.key());
    }
    Ok(())
}

pub(crate) fn cmd_theme_set(svc: &GlycoService, key: &str, json: bool) -> Result<()> {
    let Some(theme) = AppTheme::from_key(key) else {
        let valid: Vec<&str> = APP_THEMES.iter().map(|t| t.key()).collect();
        bail!("Unknown theme '{key}'. Must be one of: {}", valid.join(", "));
    };
    svc.set_theme(theme)?;
    if json {
        println!("{}", serde_json::json!({ "theme": theme }));
    } else {
        println!("Theme set to {}", theme.display_name());
    }
    Ok(())
}

pub(crate) fn cmd_theme_list(svc: &GlycoService, json: bool) -> Result<()> {
    let current = svc.theme()?;
    if json {
        let themes: Vec<_> = APP_THEMES
            .iter()
            .map(|t| {
                serde_json::json!({
                    "theme": t,
                    "name": t.display_name(),
                    "selected": *t == current,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&themes)?);
    } else {
        for t in APP_THEMES {
            let marker = if *t == current { "*" } else { " " };
            println!("{marker} {:<10} {}", t.key(), t.display_name());
        }
    }
    Ok(())
}
