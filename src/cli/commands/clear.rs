//! Clear command - drop the whole file cache

use crate::cache::FileCache;
use crate::cli::args::ClearArgs;
use crate::cli::commands::open_store;
use crate::config::{Config, ConfigManager};
use crate::error::CacheResult;
use crate::ui::{self, UiContext};

/// Execute the clear command
pub async fn execute(args: ClearArgs, config: &Config) -> CacheResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let store = open_store(config).await?;
    let records = store.list_records().await?;

    if records.is_empty() {
        ui::step_info(&ctx, "File cache is already empty");
        return Ok(());
    }

    let prompt = format!(
        "Remove {} cached record(s) and all staged content?",
        records.len()
    );
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::step_warn_hint(&ctx, "Aborted", "Use --yes to clear without prompting");
        return Ok(());
    }

    store.clear().await?;

    ui::step_ok_detail(
        &ctx,
        &format!("Cleared {} record(s)", records.len()),
        &ConfigManager::cache_dir(config).display().to_string(),
    );
    Ok(())
}
