//! `tkharvest harvest` - one resumable run

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color, Table};

use tkharvest_core::{ReqwestTransport, SharedProgress, fmt_num};
use tkharvest_store::{CursorStore, JsonCursorStore, MemoryCursorStore};
use tkharvest_syncfeed::{HarvestSummary, Harvester, ParquetPublisher, PdfToText, Publisher, StopReason};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// Feed category (default from config)
    #[arg(long)]
    pub category: Option<String>,

    /// Stop at the first page boundary with at least this many documents (0 = no limit)
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Parallel enclosure fetches per page
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Harvest without publishing or moving the stored cursor
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: HarvestArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let mut harvest_config = config.harvest_config();
    if let Some(category) = args.category {
        harvest_config.category = category;
    }
    if let Some(limit) = args.limit {
        harvest_config.max_documents = (limit > 0).then_some(limit);
    }
    if let Some(workers) = args.workers {
        harvest_config.workers = workers.max(1);
    }
    let category = harvest_config.category.clone();

    let transport =
        ReqwestTransport::new(config.http_config()).context("Failed to build HTTP client")?;
    let extractor = PdfToText::new(&config.pdf.program, Duration::from_secs(config.pdf.timeout));

    let file_store = JsonCursorStore::new(&config.store.path);
    let dry_store = MemoryCursorStore::new();
    let store: &dyn CursorStore = if args.dry_run {
        if let Some(token) = file_store.get(&category)? {
            dry_store.set(&category, token)?;
        }
        log::info!("Dry run: {} will not be updated", file_store.path().display());
        &dry_store
    } else {
        &file_store
    };

    let harvest = Harvester::new(&harvest_config, &transport, &extractor, store)
        .with_context(|| format!("Invalid feed URL: {}", harvest_config.feed_url))?
        .with_progress(progress.stage_line("harvest"))
        .run(&category)?;

    progress.println(format!("\n{}", summary_table(&harvest.summary)));

    if args.dry_run {
        log::info!("Dry run: {} documents not published", harvest.batch.len());
        return Ok(());
    }

    let publisher = ParquetPublisher::new(&config.publish.output_dir, config.publish.compression_level);
    publisher
        .publish(&harvest.batch, &config.publish.destination)
        .with_context(|| format!("Failed to publish to {}", config.publish.destination))?;
    Ok(())
}

/// Run summary: counters, cursor movement and stop reason
pub fn summary_table(summary: &HarvestSummary) -> Table {
    let mut table = super::table(["Harvest", "Value"]);
    table.add_row(vec!["Category", summary.category.as_str()]);
    table.add_row(vec!["Pages", &fmt_num(summary.pages)]);
    table.add_row(vec!["Entries", &fmt_num(summary.entries)]);
    table.add_row(vec!["Deleted", &fmt_num(summary.deleted)]);
    table.add_row(vec!["Malformed content", &fmt_num(summary.malformed)]);
    table.add_row(vec!["No enclosure", &fmt_num(summary.no_enclosure)]);
    table.add_row(vec!["Duplicates", &fmt_num(summary.duplicates)]);
    table.add_row(vec!["Fetch failures", &fmt_num(summary.fetch_failures)]);
    for (reason, count) in &summary.skipped {
        table.add_row(vec![format!("Skipped ({reason})"), fmt_num(*count)]);
    }
    table.add_row(vec![
        Cell::new("Documents"),
        Cell::new(fmt_num(summary.documents)).fg(Color::Green),
    ]);
    table.add_row(vec![
        "Cursor",
        &format!("{} -> {}", summary.start_cursor, summary.final_cursor),
    ]);
    let stop = match &summary.stop {
        StopReason::PageFailed(_) | StopReason::TokenNotAdvancing { .. } => {
            Cell::new(summary.stop.to_string()).fg(Color::Yellow)
        }
        _ => Cell::new(summary.stop.to_string()),
    };
    table.add_row(vec![Cell::new("Stopped"), stop]);
    table.add_row(vec![
        "Time",
        &format!("{:.1}s", summary.elapsed.as_secs_f64()),
    ]);
    table
}
