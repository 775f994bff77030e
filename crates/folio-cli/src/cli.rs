use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "folio", about = "Folio: versioned key-value pages", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML ledger configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Store the ledger in this directory (overrides the configured storage)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Open the ledger of this user through the ledger factory
    #[arg(long, global = true)]
    pub user: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run commands interactively
    Shell,
    /// Run the commands in a script file, one per line
    Exec(ExecArgs),
    /// List pages
    Pages,
    /// Reclaim unreferenced objects
    Gc,
}

#[derive(Args)]
pub struct ExecArgs {
    pub script: PathBuf,
    /// Keep going after a failed line
    #[arg(long)]
    pub keep_going: bool,
}
