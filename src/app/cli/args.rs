//! Command-line arguments
//!
//! Global flags override values from the configuration file, which in turn
//! override built-in defaults.

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "dak-engine")]
#[command(about = "Discover, cache and stage edits to DAK content repositories")]
#[command(version)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", global = true, value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", global = true, value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(short = 'f', long = "log-file", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Force coloured output
    #[arg(long = "color", action = ArgAction::SetTrue, conflicts_with = "no_color", global = true)]
    pub color: bool,

    /// Disable coloured output
    #[arg(long = "no-color", action = ArgAction::SetTrue, global = true)]
    pub no_color: bool,

    /// Keep caches and staged edits in memory only
    #[arg(long = "ephemeral", global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Find repositories holding DAK content
    Scan {
        /// User or organization login
        owner: String,

        /// Treat the owner as an organization
        #[arg(long)]
        org: bool,

        /// Ignore cached results
        #[arg(long)]
        refresh: bool,
    },

    /// List the branches of a repository
    Branches {
        owner: String,
        repo: String,

        /// Ignore cached results
        #[arg(long)]
        refresh: bool,
    },

    /// Inspect or clear local caches
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Stage, validate and commit edits
    #[command(subcommand)]
    Stage(StageCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CacheCommand {
    /// Show entry counts and sizes per namespace
    Stats,

    /// Clear one namespace, or every cache namespace (staged edits are kept)
    Clear {
        namespace: Option<String>,
    },
}

/// Repository and branch addressed by a staging command
#[derive(ClapArgs, Debug, Clone, PartialEq)]
pub struct SessionArgs {
    /// Repository as owner/name
    pub repository: String,

    /// Target branch
    pub branch: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum StageCommand {
    /// Stage the contents of a local file at a repository path
    Add {
        #[command(flatten)]
        session: SessionArgs,

        /// Path inside the repository
        path: String,

        /// Local file holding the new content
        file: PathBuf,

        /// Fingerprint of the remote version this edit is based on
        #[arg(long, conflicts_with = "fetch_base")]
        base: Option<String>,

        /// Look up the current remote fingerprint before staging
        #[arg(long)]
        fetch_base: bool,

        /// Editor identifier recorded with the edit
        #[arg(long, default_value = "cli")]
        editor: String,
    },

    /// Unstage one path
    Rm {
        #[command(flatten)]
        session: SessionArgs,

        path: String,
    },

    /// Show staged files, or every session when no repository is given
    Status {
        repository: Option<String>,
        branch: Option<String>,
    },

    /// Discard every staged edit of a session
    Discard {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Validate the staged files
    Validate {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Save a draft commit message
    Message {
        #[command(flatten)]
        session: SessionArgs,

        message: String,
    },

    /// Commit every staged file
    Commit {
        #[command(flatten)]
        session: SessionArgs,

        /// Commit message (defaults to the saved draft)
        #[arg(short = 'm', long = "message")]
        message: Option<String>,

        /// Commit even when validation reports warnings
        #[arg(long)]
        allow_warnings: bool,
    },
}

impl Args {
    /// `Some(true)` for --color, `Some(false)` for --no-color, `None` for auto
    pub fn color_override(&self) -> Option<bool> {
        match (self.color, self.no_color) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}
