//! Interactive merge setup.
//!
//! Asks for the source and target trees and the merge options, shows the
//! resulting settings, and repeats until the operator confirms.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::{Confirm, Input, Select};

use sitemerge_core::config::{CollisionPolicy, MergeConfig};
use sitemerge_core::path;
use sitemerge_core::store::PageStore;

use crate::style;

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Run the wizard, starting from `initial` (roots may be empty).
pub fn run_wizard<S: PageStore + ?Sized>(store: &S, initial: MergeConfig) -> Result<MergeConfig> {
    println!();
    println!("{}", style::header("Merge page trees"));
    println!(
        "{}",
        style::dim("Pages under the source are copied onto, or moved into, the target.")
    );
    println!();

    let mut current = initial;
    loop {
        current = ask(store, &current)?;

        println!();
        println!("{}", settings_table(&current));
        println!();

        if confirm("Start the merge with these settings?", true)? {
            return Ok(current);
        }
        println!("{}", style::warn("Let's go through the settings again."));
        println!();
    }
}

/// Yes/no prompt.
pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .context("failed to read confirmation")
}

/// Two-column summary of a run configuration.
pub fn settings_table(config: &MergeConfig) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Setting", "Value"]);

    let rows = [
        ("Source tree", config.source_root.clone()),
        ("Target tree", config.target_root.clone()),
        (
            "Include child pages",
            style::yes_no(config.include_descendants).to_string(),
        ),
        (
            "Search all site trees",
            style::yes_no(config.include_all_trees).to_string(),
        ),
        ("When a page exists", config.collision_policy.to_string()),
        (
            "Keep copies unapproved",
            style::yes_no(config.force_unapproved()).to_string(),
        ),
    ];
    for (setting, value) in rows {
        table.add_row(vec![Cell::new(setting), Cell::new(value)]);
    }
    table
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

fn ask<S: PageStore + ?Sized>(store: &S, previous: &MergeConfig) -> Result<MergeConfig> {
    let source_root = ask_path(store, "Source page path", &previous.source_root)?;

    let target_root = loop {
        let target = ask_path(store, "Target page path", &previous.target_root)?;
        if target != source_root {
            break target;
        }
        println!(
            "{}",
            style::error("The source and target trees must be different pages.")
        );
    };

    let include_descendants = confirm("Include all child pages?", previous.include_descendants)?;
    let include_all_trees = confirm("Search every site tree?", previous.include_all_trees)?;

    let labels = [
        "replace  copy the source content onto the existing page",
        "skip     leave the existing page alone",
        "stop     abort the merge",
    ];
    let default_index = CollisionPolicy::ALL
        .iter()
        .position(|p| *p == previous.collision_policy)
        .unwrap_or(1);
    let choice = Select::new()
        .with_prompt("If the page already exists in the target tree")
        .items(&labels)
        .default(default_index)
        .interact()
        .context("failed to read collision policy selection")?;
    let collision_policy = CollisionPolicy::ALL
        .get(choice)
        .copied()
        .unwrap_or_default();

    let keep_unapproved = if collision_policy == CollisionPolicy::Replace {
        confirm(
            "Keep the copied versions unapproved?",
            previous.keep_unapproved,
        )?
    } else {
        false
    };

    Ok(MergeConfig {
        source_root,
        target_root,
        include_descendants,
        include_all_trees,
        collision_policy,
        keep_unapproved,
    })
}

/// Ask for a page path until it names an existing page; returns it
/// normalized.
fn ask_path<S: PageStore + ?Sized>(store: &S, prompt: &str, initial: &str) -> Result<String> {
    let mut input = Input::<String>::new()
        .with_prompt(prompt)
        .validate_with(|value: &String| -> Result<(), String> {
            match page_exists(store, value) {
                Ok(true) => Ok(()),
                Ok(false) => Err(format!("Page {} does not exist.", path::normalize(value))),
                Err(e) => Err(e.to_string()),
            }
        });
    if !initial.is_empty() {
        input = input.default(initial.to_string());
    }
    let value = input
        .interact_text()
        .with_context(|| format!("failed to read {}", prompt.to_lowercase()))?;
    Ok(path::normalize(&value))
}

/// Whether `raw` names a page a merge can start from.
pub fn page_exists<S: PageStore + ?Sized>(store: &S, raw: &str) -> Result<bool> {
    let normalized = path::normalize(raw);
    if path::is_tree_root(&normalized) {
        return Ok(true);
    }
    let page = store
        .resolve_by_path(&normalized)
        .with_context(|| format!("failed to look up {}", normalized))?;
    Ok(page.is_some_and(|p| !p.is_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitemerge_core::config::MergeDefaults;
    use sitemerge_core::models::NewPage;
    use sitemerge_core::store::InMemoryPageStore;

    #[test]
    fn test_page_exists() {
        let store = InMemoryPageStore::new();
        store.add("/about", "about").unwrap();
        store
            .add_page(
                "/broken",
                NewPage {
                    without_version: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(page_exists(&store, "about").unwrap());
        assert!(page_exists(&store, "").unwrap());
        assert!(!page_exists(&store, "/company").unwrap());
        assert!(!page_exists(&store, "/broken").unwrap());
    }

    #[test]
    fn test_settings_table_lists_every_option() {
        let config = MergeDefaults {
            collision_policy: CollisionPolicy::Replace,
            keep_unapproved: true,
            ..Default::default()
        }
        .for_roots("/about", "/company");
        let rendered = settings_table(&config).to_string();

        assert!(rendered.contains("/about"));
        assert!(rendered.contains("/company"));
        assert!(rendered.contains("replace"));
        assert!(rendered.contains("Keep copies unapproved"));
    }
}
