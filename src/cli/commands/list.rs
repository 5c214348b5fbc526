//! List command - show cached copy info

use crate::cache::types::NO_LAST_MODIFIED;
use crate::cache::CacheSummary;
use crate::cli::args::{ListArgs, OutputFormat};
use crate::cli::commands::open_store;
use crate::config::Config;
use crate::error::CacheResult;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> CacheResult<()> {
    let store = open_store(config).await?;
    let rows = filter_rows(store.summaries().await?, args.filter.as_deref());

    if args.quiet {
        print_origins(&rows);
        return Ok(());
    }

    if rows.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(&ctx, "No cached copy info");
            }
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&rows, args.digests),
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Plain => print_plain(&rows),
    }

    Ok(())
}

fn filter_rows(rows: Vec<CacheSummary>, filter: Option<&str>) -> Vec<CacheSummary> {
    match filter {
        Some(needle) => rows
            .into_iter()
            .filter(|row| row.origin.contains(needle))
            .collect(),
        None => rows,
    }
}

/// Origins of the rows, each once, in listing order
fn unique_origins(rows: &[CacheSummary]) -> Vec<&str> {
    let mut origins: Vec<&str> = vec![];
    for row in rows {
        if origins.last() != Some(&row.origin.as_str()) {
            origins.push(&row.origin);
        }
    }
    origins
}

fn print_origins(rows: &[CacheSummary]) {
    for origin in unique_origins(rows) {
        println!("{}", origin);
    }
}

fn print_table(rows: &[CacheSummary], digests: bool) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "File cache");

    if digests {
        println!(
            "{:<40} {:<24} {:<78} {:<30}",
            style("ORIGIN").bold(),
            style("NAME").bold(),
            style("HASH").bold(),
            style("LAST MODIFIED").bold()
        );
        println!("{}", "-".repeat(175));
    } else {
        println!(
            "{:<40} {:<24} {:<30} {}",
            style("ORIGIN").bold(),
            style("NAME").bold(),
            style("LAST MODIFIED").bold(),
            style("PATH").bold()
        );
        println!("{}", "-".repeat(110));
    }

    for row in rows {
        let last_modified = if row.last_modified == NO_LAST_MODIFIED {
            style(row.last_modified.as_str()).dim()
        } else {
            style(row.last_modified.as_str())
        };

        if digests {
            println!(
                "{:<40} {:<24} {:<78} {:<30}",
                row.origin, row.file_name, row.file_hash, last_modified
            );
        } else {
            println!(
                "{:<40} {:<24} {:<30} {}",
                row.origin, row.file_name, last_modified, row.file_path
            );
        }
    }

    println!();
    println!(
        "{} entr{} for {} origin(s)",
        rows.len(),
        if rows.len() == 1 { "y" } else { "ies" },
        unique_origins(rows).len()
    );
}

fn print_json(rows: &[CacheSummary]) -> CacheResult<()> {
    let json = serde_json::to_string_pretty(rows)?;
    println!("{}", json);
    Ok(())
}

fn print_plain(rows: &[CacheSummary]) {
    for row in rows {
        println!("{}\t{}\t{}", row.origin, row.file_name, row.file_hash);
    }
}
