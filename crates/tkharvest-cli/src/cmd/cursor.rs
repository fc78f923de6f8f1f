//! `tkharvest cursor` - operator control of resume points

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color};

use tkharvest_store::{CursorStore, JsonCursorStore};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct CursorArgs {
    #[command(subcommand)]
    pub action: CursorAction,
}

#[derive(Subcommand, Debug)]
pub enum CursorAction {
    /// List stored cursors
    Show {
        /// Only this category
        category: Option<String>,
    },
    /// Resume a category from an explicit skiptoken
    Set {
        category: String,
        #[arg(value_parser = clap::value_parser!(i64).range(0..))]
        token: i64,
    },
    /// Forget a category's cursor; the next run starts at the feed origin
    Reset { category: String },
}

pub fn run(args: CursorArgs, config: &Config) -> Result<()> {
    let store = JsonCursorStore::new(&config.store.path);
    match args.action {
        CursorAction::Show { category } => show(&store, category.as_deref()),
        CursorAction::Set { category, token } => {
            let previous = store.get(&category)?;
            store.set(&category, token)?;
            eprintln!("{category}: {} -> {token}", describe(previous));
            Ok(())
        }
        CursorAction::Reset { category } => {
            if store.remove(&category)? {
                eprintln!("{category}: cursor removed");
            } else {
                eprintln!("{category}: no cursor stored");
            }
            Ok(())
        }
    }
}

fn describe(token: Option<i64>) -> String {
    token.map_or_else(|| "(none)".to_string(), |t| t.to_string())
}

fn show(store: &JsonCursorStore, category: Option<&str>) -> Result<()> {
    let entries = store.entries()?;
    let rows: Vec<_> = entries
        .iter()
        .filter(|(name, _)| category.is_none_or(|c| c == name.as_str()))
        .collect();

    if rows.is_empty() {
        eprintln!("No cursors stored in {}", store.path().display());
        return Ok(());
    }

    let mut table = super::table(["Category", "Skiptoken", "Updated (UTC)"]);
    for (name, record) in rows {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(record.skiptoken).fg(Color::Green),
            Cell::new(record.updated_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    eprintln!("\n{table}");
    eprintln!("{}", store.path().display());
    Ok(())
}
