mod baseline;
mod helpers;
mod meal;
mod stats;
mod theme;
mod transfer;

pub(crate) use baseline::{
    cmd_baseline_deactivate, cmd_baseline_history, cmd_baseline_set, cmd_baseline_show,
};
pub(crate) use meal::{LogArgs, UpdateArgs, cmd_delete, cmd_list, cmd_log, cmd_show, cmd_update};
pub(crate) use stats::cmd_stats;
pub(crate) use theme::{cmd_theme_list, cmd_theme_set, cmd_theme_show};
pub(crate) use transfer::{cmd_export, cmd_import};
