//! Rm command - delete cached copy info for origins

use crate::cache::{DeleteOutcome, FileCache, Origin};
use crate::cli::args::{OutputFormat, RemoveArgs};
use crate::cli::commands::open_store;
use crate::config::Config;
use crate::error::CacheResult;
use crate::ui::{self, UiContext};

/// Execute the rm command
///
/// Origins without a record are reported as not found; that is not a failure.
pub async fn execute(args: RemoveArgs, config: &Config) -> CacheResult<()> {
    let store = open_store(config).await?;
    let origins: Vec<String> = args.origins.iter().map(|raw| normalize(raw)).collect();

    let outcomes = store.del_copy_info(&origins).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcomes)?),
        OutputFormat::Plain => {
            for outcome in &outcomes {
                let status = if outcome.is_deleted() { "deleted" } else { "not found" };
                println!("{}\t{}", outcome.origin(), status);
            }
        }
        OutputFormat::Table => {
            let ctx = UiContext::detect();
            for outcome in &outcomes {
                match outcome {
                    DeleteOutcome::Deleted(origin) => ui::step_ok(&ctx, &format!("Removed {}", origin)),
                    DeleteOutcome::NotFound(origin) => {
                        ui::step_warn(&ctx, &format!("{} not found in cache", origin))
                    }
                }
            }
        }
    }

    Ok(())
}

/// Map user input to the key the cache stores it under
///
/// Input that is not a valid origin (aggregate keys, odd paths) is used as typed.
fn normalize(raw: &str) -> String {
    Origin::parse(raw)
        .map(|origin| origin.key().to_string())
        .unwrap_or_else(|_| raw.trim().to_string())
}
