use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use stanzakit::conf::{self, WriteOptions};
use stanzakit::policy::EnsureValue;
use stanzakit::{ConfigDocument, Tier};
use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::Context;
use crate::apps::{self, App, SAVEDSEARCHES};
use crate::config::{Needs, Prompter};
use crate::ui;

/// Outcome of a disable run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DisableSummary {
    /// Files rewritten (or diffed under dummy)
    pub files: usize,
    /// Stanzas whose file text changed
    pub changed: usize,
    /// Files that could not be processed
    pub failed: usize,
}

/// Copy the app location to `apps_ss_disabled` and force `disabled = 1` on
/// every saved search in the copy. `strip_comments` also drops `#` lines from
/// the rewritten files.
pub fn run(ctx: &Context, strip_comments: bool, prompter: &dyn Prompter) -> Result<()> {
    let settings = super::settings(ctx, Needs::Apps, prompter)?;
    let location = settings.app_location;
    let started = Instant::now();

    ui::header("Disable saved searches");

    let target = if ctx.dummy {
        ui::info("Dummy mode: nothing is copied or written, changes are shown as diffs");
        location.clone()
    } else {
        let copy = apps::disabled_copy_path(&location)?;
        if !prepare_copy(&location, &copy, prompter)? {
            ui::info("Exiting");
            return Ok(());
        }
        copy
    };

    let options = WriteOptions { strip_comments };
    let summary = disable_all(&target, ctx.dummy, &options)?;

    println!();
    ui::success(&format!(
        "Processed {} files, {} stanzas changed in {}",
        summary.files,
        summary.changed,
        ui::format_duration(started.elapsed())
    ));
    if summary.failed > 0 {
        ui::warn(&format!("{} files failed, see error.log", summary.failed));
    }
    if !ctx.dummy {
        ui::kv("Output", &target.display().to_string());
    }
    Ok(())
}

/// Copy `location` to `copy`, asking before replacing an existing copy.
/// Returns `false` when the user declines.
fn prepare_copy(location: &Path, copy: &Path, prompter: &dyn Prompter) -> Result<bool> {
    if copy.exists() {
        let prompt = format!(
            "Destination directory {} already exists. Proceed and overwrite?",
            copy.display()
        );
        if !prompter.confirm(&prompt, false)? {
            return Ok(false);
        }
        fs::remove_dir_all(copy)
            .with_context(|| format!("Failed to remove {}", copy.display()))?;
    }

    ui::info(&format!("Copying the apps directory to {}", copy.display()));
    let files = apps::copy_tree(location, copy)?;
    log::info!("Copied {files} files from {} to {}", location.display(), copy.display());
    Ok(true)
}

/// Disable every saved search of every app under `location`.
pub fn disable_all(location: &Path, dummy: bool, options: &WriteOptions) -> Result<DisableSummary> {
    let mut summary = DisableSummary::default();

    for app in apps::list(location)? {
        for tier in Tier::all() {
            let path = app.conf_path(tier, SAVEDSEARCHES);
            if !path.is_file() {
                continue;
            }
            match disable_file(&app, tier, dummy, options) {
                Ok(changed) => {
                    summary.files += 1;
                    summary.changed += changed;
                }
                Err(e) => {
                    log::error!("Error processing {}: {e:#}", path.display());
                    summary.failed += 1;
                }
            }
        }
    }

    Ok(summary)
}

/// Rewrite one file. Returns the number of stanzas whose text changed.
fn disable_file(app: &App, tier: Tier, dummy: bool, options: &WriteOptions) -> Result<usize> {
    let path = app.conf_path(tier, SAVEDSEARCHES);
    log::info!("Processing file: {}", path.display());

    let doc = conf::parse_file(&path)?;
    apps::log_diagnostics(&path, &doc);

    let edited = conf::apply(&doc, &EnsureValue::disabled());
    let changed = changed_stanzas(&doc, &edited);
    for name in &changed {
        log::info!("Set 'disabled = 1' in stanza: {name}");
    }

    let before = conf::write_string(&doc, &WriteOptions::default());
    let after = conf::write_string(&edited, options);
    if dummy {
        println!();
        println!("{}", path.display().to_string().bold());
        show_text_diff(&before, &after);
    } else if after != before {
        conf::write_file(&edited, &path, options)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Successfully processed and updated {}", path.display());
    }

    Ok(changed.len())
}

fn changed_stanzas<'a>(before: &ConfigDocument, after: &'a ConfigDocument) -> Vec<&'a str> {
    after
        .stanzas
        .iter()
        .filter(|stanza| before.stanza(&stanza.name) != Some(*stanza))
        .map(|stanza| stanza.name.as_str())
        .collect()
}

/// Show a text diff using the `similar` crate
fn show_text_diff(before: &str, after: &str) {
    let diff = similar::TextDiff::from_lines(before, after);
    let mut has_changes = false;

    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                has_changes = true;
                print!("    {}", format!("- {change}").red());
            }
            similar::ChangeTag::Insert => {
                has_changes = true;
                print!("    {}", format!("+ {change}").green());
            }
            similar::ChangeTag::Equal => {}
        }
    }

    if !has_changes {
        println!("    {}", "(no changes)".dimmed());
    }
}
