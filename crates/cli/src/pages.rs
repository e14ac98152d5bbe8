//! `pages` subcommands: inspect and populate the page database.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use sitemerge_core::db::Database;
use sitemerge_core::models::{ListScope, NewPage, PageNode};
use sitemerge_core::path;
use sitemerge_core::store::PageStore;

use crate::style;

#[derive(Subcommand, Debug)]
pub enum PagesAction {
    /// List the pages below a root (the whole site by default).
    List {
        /// Root page path.
        #[arg(default_value = "/")]
        root: String,

        /// Direct children only.
        #[arg(long)]
        children: bool,

        /// Include every site tree.
        #[arg(long)]
        all_trees: bool,
    },
    /// Create a page under an existing parent.
    Add {
        /// Page path, e.g. /about/team.
        path: String,

        /// Initial content.
        #[arg(long, default_value = "")]
        content: String,

        /// Mark the page as a system page.
        #[arg(long)]
        system: bool,

        /// Create the page inactive.
        #[arg(long)]
        inactive: bool,
    },
    /// Create a new site tree rooted at a top-level path.
    AddTree {
        /// Root path of the tree, e.g. /ja.
        path: String,
    },
    /// Show the versions of a page.
    Versions {
        /// Page path.
        path: String,
    },
}

pub fn run_pages(db: &Database, action: PagesAction) -> Result<()> {
    match action {
        PagesAction::List {
            root,
            children,
            all_trees,
        } => list(db, &root, !children, all_trees),
        PagesAction::Add {
            path,
            content,
            system,
            inactive,
        } => {
            let page = db
                .create_page(
                    &path,
                    NewPage {
                        content,
                        is_system: system,
                        is_active: !inactive,
                        without_version: false,
                    },
                )
                .with_context(|| format!("failed to create page {}", path))?;
            println!(
                "{}",
                style::success(&format!("Created page {} (id {})", page.path, page.id))
            );
            Ok(())
        }
        PagesAction::AddTree { path } => {
            let page = db
                .create_tree(&path)
                .with_context(|| format!("failed to create site tree {}", path))?;
            println!(
                "{}",
                style::success(&format!(
                    "Created site tree {} (tree {})",
                    page.path, page.tree_id
                ))
            );
            Ok(())
        }
        PagesAction::Versions { path } => versions(db, &path),
    }
}

fn resolve(db: &Database, raw: &str) -> Result<PageNode> {
    let normalized = path::normalize(raw);
    let page = if path::is_tree_root(&normalized) {
        Some(db.resolve_home_node().context("failed to load home page")?)
    } else {
        db.resolve_by_path(&normalized)
            .with_context(|| format!("failed to look up {}", normalized))?
    };
    page.ok_or_else(|| anyhow::anyhow!("page {} does not exist", normalized))
}

fn list(db: &Database, root: &str, recursive: bool, all_trees: bool) -> Result<()> {
    let root = resolve(db, root)?;
    let pages = db
        .list_nodes(&ListScope::admin(root.id, recursive, all_trees))
        .context("failed to list pages")?;

    if pages.is_empty() {
        println!("No pages below {}.", root.path);
        return Ok(());
    }

    println!("{}", pages_table(&pages));
    println!();
    println!("{} page(s) below {}", pages.len(), root.path);
    Ok(())
}

fn versions(db: &Database, raw: &str) -> Result<()> {
    let page = resolve(db, raw)?;
    let versions = db
        .list_versions(page.id)
        .context("failed to list versions")?;

    if versions.is_empty() {
        println!("{}", style::warn(&format!("{} has no versions", page.path)));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Created", "Approved", "Comment", "Content"]);
    for v in &versions {
        table.add_row(vec![
            Cell::new(v.id),
            Cell::new(v.created_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(style::yes_no(v.approved)),
            Cell::new(&v.comment),
            Cell::new(crate::truncate(&v.content, 40)),
        ]);
    }
    println!("{}", style::header(&page.path));
    println!("{}", table);
    Ok(())
}

/// Short flags column: home, master, system, inactive, error.
fn page_flags(page: &PageNode) -> String {
    let flags: Vec<&str> = [
        (page.is_home, "home"),
        (page.is_master, "master"),
        (page.is_system, "system"),
        (!page.is_active, "inactive"),
        (page.is_error, "error"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect();
    flags.join(", ")
}

pub fn pages_table(pages: &[PageNode]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Path", "Tree", "Flags"]);
    for page in pages {
        table.add_row(vec![
            Cell::new(page.id),
            Cell::new(&page.path),
            Cell::new(page.tree_id),
            Cell::new(page_flags(page)),
        ]);
    }
    table
}
