//! Resolve command - run sources of one instruction through the cache
//!
//! This is what a builder does for every COPY/ADD step; exposing it lets
//! operators check why a step was (or was not) served from the cache.

use crate::cache::{FsContext, HttpDownloader, Instruction, Resolution, ResolvedSources, Resolver};
use crate::cli::args::{OutputFormat, ResolveArgs};
use crate::cli::commands::open_store;
use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::ui::{self, UiContext};
use console::style;
use std::sync::Arc;
use std::time::Duration;

/// Execute the resolve command
pub async fn execute(args: ResolveArgs, config: &Config) -> CacheResult<()> {
    let context_dir = match args.context {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|e| CacheError::io("getting current directory", e))?,
    };
    if !context_dir.is_dir() {
        return Err(CacheError::User(format!(
            "Build context {} is not a directory",
            context_dir.display()
        )));
    }

    let instruction = if args.add {
        Instruction::Add
    } else {
        Instruction::Copy
    };
    let use_cache = config.cache.enabled && !args.no_cache;

    let store = Arc::new(open_store(config).await?);
    let downloader = HttpDownloader::new(Duration::from_secs(config.cache.request_timeout_secs));
    let resolver = Resolver::new(
        store,
        Arc::new(FsContext::new(context_dir)),
        Arc::new(downloader),
    )
    .use_cache(use_cache);

    let resolved = resolver.resolve_sources(instruction, &args.sources).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolved)?),
        OutputFormat::Plain => println!("{}\t{}", resolved.src_hash, resolved.orig_paths),
        OutputFormat::Table => print_table(instruction, &resolved),
    }
    Ok(())
}

fn print_table(instruction: Instruction, resolved: &ResolvedSources) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, &format!("{} {}", instruction, resolved.orig_paths));

    for source in &resolved.sources {
        let resolution = match source.resolution {
            Resolution::Hit => style("hit").green(),
            Resolution::Stale => style("stale").yellow(),
            Resolution::Miss => style("miss").cyan(),
            Resolution::Bypass => style("bypass").dim(),
        };
        println!("  {:<40} {}", source.origin, resolution);
        for entry in &source.copy_info.entries {
            println!(
                "    {} {} {}",
                style(&entry.kind).dim(),
                entry.name,
                style(&entry.hash).dim()
            );
        }
    }

    println!();
    ui::key_value(&ctx, "srcHash", &resolved.src_hash);
    ui::key_value(&ctx, "origPaths", &resolved.orig_paths);
}
