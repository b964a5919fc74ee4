use anyhow::Result;
use stanzakit::disposition::Resolver;
use stanzakit::plan::{self, AppModel, EndpointTable, PlanMode, PlanOptions};
use stanzakit::{Tier, meta};
use std::path::Path;
use std::time::Instant;

use crate::Context;
use crate::apps::{self, SAVEDSEARCHES};
use crate::config::{Needs, Prompter};
use crate::dispatch::UreqTransport;
use crate::ui;

/// Plan and send the requests of one mode for every app.
pub fn run(ctx: &Context, mode: PlanMode, prompter: &dyn Prompter) -> Result<()> {
    let settings = super::settings(ctx, Needs::ApiAndApps, prompter)?;
    let started = Instant::now();

    let title = match mode {
        PlanMode::Enable => "Enable scheduled searches",
        PlanMode::Create => "Create saved searches",
        PlanMode::Metadata => "Apply app permissions",
    };
    ui::header(title);
    log::info!("API url: {}", settings.api_url);

    ui::step(1, 3, "Reading apps");
    let models = match mode {
        PlanMode::Enable | PlanMode::Create => collect_saved_searches(&settings.app_location)?,
        PlanMode::Metadata => collect_metadata(&settings.app_location)?,
    };

    let options = PlanOptions {
        dummy: ctx.dummy,
        endpoints: EndpointTable::builtin().with_overrides(&settings.endpoints),
    };
    ui::step(2, 3, "Planning requests");
    let plan = plan::plan(&models, mode, &options);
    for skipped in &plan.skipped {
        log::info!("Skipping {skipped}");
    }

    if mode == PlanMode::Enable {
        let (enabled, disabled) = plan::disposition_counts(&models);
        ui::kv("Enabled", &enabled.to_string());
        ui::kv("Disabled", &disabled.to_string());
    }
    ui::kv("Apps", &models.len().to_string());
    ui::kv("Requests", &plan.len().to_string());
    if !plan.skipped.is_empty() {
        ui::kv("Skipped", &plan.skipped.len().to_string());
    }

    ui::step(3, 3, "Sending requests");
    let transport = UreqTransport::new(settings.verify_tls);
    super::dispatch(ctx, &settings, &plan.requests, &transport)?;

    ui::info(&format!(
        "Completed in {}. Logfiles are in the working directory",
        ui::format_duration(started.elapsed())
    ));
    Ok(())
}

/// Resolve `savedsearches.conf` of every app.
pub fn collect_saved_searches(location: &Path) -> Result<Vec<AppModel>> {
    let mut models = Vec::new();

    for app in apps::list(location)? {
        let mut resolver = Resolver::new();
        let mut found = false;
        for tier in Tier::all() {
            if let Some(doc) = app.read_conf(tier, SAVEDSEARCHES) {
                resolver.observe_document(tier, &doc);
                found = true;
            }
        }
        if !found {
            log::debug!("No {SAVEDSEARCHES} in {}", app.name);
            continue;
        }

        let resolution = resolver.finish();
        for error in &resolution.errors {
            log::error!("{}: {error}, stanza skipped", app.name);
        }
        models.push(AppModel::resolved(app.name, resolution.stanzas));
    }

    Ok(models)
}

/// Read `default.meta` then `local.meta` of every app.
pub fn collect_metadata(location: &Path) -> Result<Vec<AppModel>> {
    let mut models = Vec::new();

    for app in apps::list(location)? {
        let entries: Vec<_> = Tier::all()
            .into_iter()
            .filter_map(|tier| app.read_meta(tier))
            .flat_map(|doc| meta::entries(&doc))
            .collect();
        if entries.is_empty() {
            continue;
        }
        models.push(AppModel::metadata(app.name, entries));
    }

    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::executor::{ExecuteOptions, execute};
    use crate::dispatch::transport::tests::MockTransport;
    use stanzakit::Disposition;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_collect_saved_searches() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b_app/default/savedsearches.conf", "[x]\ndisabled = 1\n");
        write(dir.path(), "b_app/local/savedsearches.conf", "[x]\nsearch = y\n");
        write(dir.path(), "a_app/local/savedsearches.conf", "[y]\ndisabled = maybe\n[z]\n");
        fs::create_dir_all(dir.path().join("no_searches/default")).unwrap();

        let models = collect_saved_searches(dir.path()).unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a_app", "b_app"]);

        assert_eq!(models[0].stanzas.len(), 1);
        assert_eq!(models[0].stanzas[0].name, "z");
        assert_eq!(models[1].stanzas[0].disposition, Disposition::Disabled);
    }

    #[test]
    fn test_collect_metadata_both_tiers() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app/metadata/default.meta", "[]\nexport = system\n");
        write(dir.path(), "app/metadata/local.meta", "[views/home]\nowner = admin\n");

        let models = collect_metadata(dir.path()).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].meta.len(), 2);
    }

    #[test]
    fn test_enable_end_to_end_against_mock() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "my_app/default/savedsearches.conf", "[search1]\ndisabled = 0\n");
        write(dir.path(), "my_app/local/savedsearches.conf", "[search1]\n");

        let models = collect_saved_searches(dir.path()).unwrap();
        let plan = plan::plan(&models, PlanMode::Enable, &PlanOptions::default());

        let transport = MockTransport::new(200);
        let options = ExecuteOptions {
            base_url: "https://h:8089".to_string(),
            token: "t".to_string(),
            rate: 100,
            show_progress: false,
        };
        let report = execute(&plan.requests, &transport, &options).unwrap();

        assert_eq!(report.succeeded, 1);
        let calls = transport.calls.lock().unwrap();
        assert_eq!(
            calls[0].0,
            "https://h:8089/servicesNS/nobody/my_app/configs/conf-savedsearches/search1"
        );
        assert_eq!(calls[0].1, vec![("disabled".to_string(), "0".to_string())]);
    }
}
