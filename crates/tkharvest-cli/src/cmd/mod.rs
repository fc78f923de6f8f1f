pub mod cursor;
pub mod harvest;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Config;

/// Empty table with the shared look of every command's output
pub(crate) fn table<const N: usize>(header: [&str; N]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Effective configuration
pub fn config_table(config: &Config) -> Table {
    let mut table = table(["Setting", "Value"]);
    table.add_row(vec!["Feed URL", &config.feed.url]);
    table.add_row(vec!["Category", &config.feed.category]);
    table.add_row(vec!["Source label", &config.feed.source]);
    table.add_row(vec![
        "Timeouts",
        &format!(
            "connect {}s, request {}s",
            config.http.connect_timeout, config.http.request_timeout
        ),
    ]);
    table.add_row(vec![
        "Max body",
        &format!("{} bytes", tkharvest_core::fmt_num(config.http.max_body_bytes as usize)),
    ]);
    table.add_row(vec![
        "Max documents",
        &match config.harvest.max_documents {
            0 => "unlimited".to_string(),
            n => n.to_string(),
        },
    ]);
    table.add_row(vec![
        "Max pages",
        &config
            .harvest
            .max_pages
            .map_or_else(|| "unlimited".to_string(), |n| n.to_string()),
    ]);
    table.add_row(vec!["Workers", &config.harvest.workers.to_string()]);
    table.add_row(vec!["Cursor file", &config.store.path.display().to_string()]);
    table.add_row(vec![
        "Output directory",
        &config.publish.output_dir.display().to_string(),
    ]);
    table.add_row(vec!["Destination", &config.publish.destination]);
    table.add_row(vec![
        "Compression level",
        &config.publish.compression_level.to_string(),
    ]);
    table.add_row(vec![
        "PDF converter",
        &format!("{} ({}s)", config.pdf.program.display(), config.pdf.timeout),
    ]);
    table
}
