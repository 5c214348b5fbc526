//! Terminal output for the copycache CLI
//!
//! Uses `cliclack` for interactive prompts with automatic fallback to plain
//! output in CI/non-interactive environments.
//!
//! # Example
//!
//! ```rust,ignore
//! use copycache::ui::{self, UiContext};
//!
//! let ctx = UiContext::detect().with_auto_yes(args.yes);
//!
//! ui::intro(&ctx, "File cache");
//! ui::step_ok(&ctx, "Removed src");
//! ui::step_warn_hint(&ctx, "Aborted", "Use --yes to clear without prompting");
//!
//! let yes = ui::confirm(&ctx, "Remove 3 cached record(s)?", false).await?;
//! ```

mod context;
mod output;
mod prompts;

pub use context::UiContext;
pub use output::{intro, key_value, step_info, step_ok, step_ok_detail, step_warn, step_warn_hint};
pub use prompts::confirm;
