mod apps;
mod cli;
mod commands;
mod config;
mod dispatch;
mod logging;
mod progress;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::DialoguerPrompter;
use stanzakit::PlanMode;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub debug: bool,
    pub dummy: bool,
    pub config_path: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse_from(cli::normalize_args(std::env::args_os()));
    let prompter = DialoguerPrompter;

    let mut debug = cli.debug;
    let mut dummy = cli.dummy;
    let command = match cli.command {
        Some(command) => command,
        None => match commands::choose(&mut debug, &mut dummy, &prompter)? {
            Some(command) => command,
            None => {
                ui::info("Exiting");
                return Ok(());
            }
        },
    };

    if let Command::Completions { shell } = command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "stanzactl", &mut io::stdout());
        return Ok(());
    }

    let log_dir = logging::init(command.run_name(), debug);
    let ctx = Context {
        debug,
        dummy,
        config_path: cli.config,
    };
    if ctx.debug {
        ui::dim(&format!("Logs: {}", log_dir.display()));
    }
    log::info!("Starting {}", command.run_name());

    let result = match command {
        Command::Disable { strip_comments } => {
            commands::disable::run(&ctx, strip_comments, &prompter)
        }
        Command::Enable => commands::rest::run(&ctx, PlanMode::Enable, &prompter),
        Command::Create => commands::rest::run(&ctx, PlanMode::Create, &prompter),
        Command::Metadata => commands::rest::run(&ctx, PlanMode::Metadata, &prompter),
        Command::Sanitize { file, dry_run } => commands::sanitize::run(&file, dry_run),
        Command::EditRole { role, imported } => {
            commands::roles::run(&ctx, role, imported, &prompter)
        }
        Command::Completions { .. } => Ok(()),
    };

    if let Err(e) = result {
        log::error!("{e:#}");
        ui::error(&format!("{e:#}"));
        log::logger().flush();
        std::process::exit(1);
    }
    Ok(())
}
