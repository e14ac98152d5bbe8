//! Shared styling utilities for the CLI.

use console::Style;

use sitemerge_core::merge::{PlannedAction, SkipReason};

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Label for a planned action: merge (blue) or relocate (green).
pub fn action(action: &PlannedAction) -> String {
    match action {
        PlannedAction::Merge { .. } => Style::new().blue().bold().apply_to("merge").to_string(),
        PlannedAction::Relocate { .. } => {
            Style::new().green().bold().apply_to("relocate").to_string()
        }
    }
}

/// Label for a skip reason; parent-missing skips are highlighted.
pub fn skip_reason(reason: SkipReason) -> String {
    let style = match reason {
        SkipReason::ParentMissing => Style::new().yellow(),
        _ => Style::new().dim(),
    };
    style.apply_to(reason.to_string()).to_string()
}

/// Yes/no cell text.
pub fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
