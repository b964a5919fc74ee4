use anyhow::{Result, bail};
use stanzakit::plan::plan_role_edit;

use crate::Context;
use crate::config::{Needs, Prompter};
use crate::dispatch::UreqTransport;
use crate::ui;

/// Replace the imported roles of a role.
pub fn run(
    ctx: &Context,
    role: Option<String>,
    imported: Vec<String>,
    prompter: &dyn Prompter,
) -> Result<()> {
    let settings = super::settings(ctx, Needs::Api, prompter)?;

    let role = match role {
        Some(role) => role,
        None => prompter.input("Role to edit", "")?,
    };
    let imported = if imported.is_empty() {
        split_roles(&prompter.input("Imported roles (comma separated)", "")?)
    } else {
        imported
    };
    if role.is_empty() || imported.is_empty() {
        bail!("A role and at least one imported role are required");
    }

    ui::header(&format!("Edit role {role}"));
    ui::kv("Imported roles", &imported.join(", "));

    let request = plan_role_edit(&role, &imported, ctx.dummy);
    let transport = UreqTransport::new(settings.verify_tls);
    super::dispatch(ctx, &settings, &[request], &transport)?;
    Ok(())
}

fn split_roles(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|role| !role.is_empty())
        .map(str::to_string)
        .collect()
}
