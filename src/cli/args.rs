//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// copycache - build-time source cache for COPY/ADD instructions
///
/// Inspects, resolves and prunes the cached copy info of build sources.
#[derive(Parser, Debug)]
#[command(name = "copycache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "COPYCACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List cached copy info
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Remove cached copy info for origins
    Rm(RemoveArgs),

    /// Remove every cached record and all staged content
    Clear(ClearArgs),

    /// Resolve COPY/ADD sources through the cache
    Resolve(ResolveArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only show origins containing this text
    pub filter: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,

    /// Show content hashes in table output
    #[arg(long)]
    pub digests: bool,

    /// Only print origins
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the rm command
#[derive(Parser, Debug)]
pub struct RemoveArgs {
    /// Origins to remove (paths relative to the build context, or URLs)
    #[arg(required = true)]
    pub origins: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Sources of one instruction (paths relative to the context, or URLs for --add)
    #[arg(required = true)]
    pub sources: Vec<String>,

    /// Build context directory (defaults to current directory)
    #[arg(short = 'C', long)]
    pub context: Option<PathBuf>,

    /// Resolve as ADD instead of COPY (allows URLs, marks archives for unpacking)
    #[arg(long)]
    pub add: bool,

    /// Bypass the cache for this resolution
    #[arg(long)]
    pub no_cache: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
