// Commands that rewrite app files
pub mod disable;
pub mod sanitize;

// Commands that talk to the management API
pub mod rest;
pub mod roles;

use anyhow::Result;
use stanzakit::DispatchRequest;

use crate::Context;
use crate::cli::Command;
use crate::config::{self, Needs, Prompter, Settings};
use crate::dispatch::{self, DispatchReport, ExecuteOptions, Transport};
use crate::ui;

/// Resolve configuration for a command before any work starts.
pub fn settings(ctx: &Context, needs: Needs, prompter: &dyn Prompter) -> Result<Settings> {
    config::acquire(&ctx.config_path, needs, prompter)
}

/// Send a batch, print its summary and log the outcome. Failed requests are
/// reported, not returned as errors.
pub fn dispatch(
    ctx: &Context,
    settings: &Settings,
    requests: &[DispatchRequest],
    transport: &dyn Transport,
) -> Result<DispatchReport> {
    if requests.is_empty() {
        ui::info("Nothing to send");
        return Ok(DispatchReport::default());
    }
    if ctx.dummy {
        ui::info("Dummy mode: requests are logged to dummy.log, nothing is sent");
    }

    let options = ExecuteOptions {
        base_url: settings.api_url.clone(),
        token: settings.token.clone(),
        rate: settings.max_api_calls_second,
        show_progress: true,
    };
    let report = dispatch::execute(requests, transport, &options)?;
    dispatch::executor::print_summary(&report);

    log::info!(
        "{} requests: {} succeeded, {} failed, {} dummy",
        report.total(),
        report.succeeded,
        report.failed,
        report.dummy
    );
    Ok(report)
}

const MENU: [&str; 4] = [
    "Disable all saved searches",
    "Enable saved searches through the REST API",
    "Create saved searches through the REST API",
    "Exit",
];

/// Interactive menu used when no subcommand is given. Asks for debug and
/// dummy mode when they were not passed on the command line. `None` means
/// the user chose to exit.
pub fn choose(
    debug: &mut bool,
    dummy: &mut bool,
    prompter: &dyn Prompter,
) -> Result<Option<Command>> {
    ui::banner();

    let command = match prompter.select("What do you want to do?", &MENU, 0)? {
        0 => Command::Disable {
            strip_comments: false,
        },
        1 => Command::Enable,
        2 => Command::Create,
        _ => return Ok(None),
    };

    if !*debug {
        *debug = prompter.confirm("Run with debug logging?", false)?;
    }
    if !*dummy && matches!(command, Command::Enable | Command::Create) {
        *dummy = prompter.confirm("Dummy run (log requests instead of sending them)?", false)?;
    }
    Ok(Some(command))
}
