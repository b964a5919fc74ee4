use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "stanzactl")]
#[command(version)]
#[command(about = "Disable, enable and recreate Splunk saved searches across apps", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Write debug logs and show debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log what would be sent instead of calling the API
    #[arg(long, global = true)]
    pub dummy: bool,

    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Without a command an interactive menu is shown
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Copy the apps directory and disable every saved search in the copy
    Disable {
        /// Drop comment lines from the rewritten files
        #[arg(long)]
        strip_comments: bool,
    },

    /// Enable scheduled saved searches that are enabled on disk
    Enable,

    /// Create saved searches from the app configuration
    Create,

    /// Apply permissions from default.meta and local.meta
    Metadata,

    /// Fix ownership, modes and stray files in an app package
    Sanitize {
        /// Package to fix (.tar.gz / .tgz / .spl)
        file: PathBuf,

        /// Report problems without writing the fixed package
        #[arg(long)]
        dry_run: bool,
    },

    /// Replace the imported roles of a role
    EditRole {
        /// Role to edit
        role: Option<String>,

        /// Roles to import (repeat or separate with commas)
        #[arg(short, long, value_delimiter = ',')]
        imported: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Command {
    /// Name used for the run's log directory.
    pub fn run_name(&self) -> &'static str {
        match self {
            Command::Disable { .. } => "disabling_savedsearches",
            Command::Enable | Command::Create | Command::Metadata => "rest_api_runner",
            Command::Sanitize { .. } => "sanitize_package",
            Command::EditRole { .. } => "rest_edit_roles",
            Command::Completions { .. } => "completions",
        }
    }
}

/// Accept the single-dash `-debug` and `-dummy` spellings.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-debug") => OsString::from("--debug"),
            Some("-dummy") => OsString::from("--dummy"),
            _ => arg,
        })
        .collect()
}
