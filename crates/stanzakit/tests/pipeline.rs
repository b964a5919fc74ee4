//! End-to-end runs over an app directory on disk.

use stanzakit::conf::{WriteOptions, apply, parse_file, write_file};
use stanzakit::disposition::resolve;
use stanzakit::plan::{AppModel, PlanMode, PlanOptions, plan};
use stanzakit::policy::EnsureValue;
use stanzakit::{Disposition, meta};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn enable_inherits_default_disposition() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "my_app/default/savedsearches.conf", "[search1]\ndisabled = 0\n");
    write(dir.path(), "my_app/local/savedsearches.conf", "[search1]\n");

    let default = parse_file(&dir.path().join("my_app/default/savedsearches.conf")).unwrap();
    let local = parse_file(&dir.path().join("my_app/local/savedsearches.conf")).unwrap();
    let resolution = resolve(Some(&default), Some(&local));
    assert!(resolution.errors.is_empty());

    let apps = vec![AppModel::resolved("my_app", resolution.stanzas)];
    let plan = plan(&apps, PlanMode::Enable, &PlanOptions::default());

    assert_eq!(plan.len(), 1);
    let request = &plan.requests[0];
    assert_eq!(
        request.endpoint,
        "servicesNS/nobody/my_app/configs/conf-savedsearches/search1"
    );
    assert_eq!(
        serde_json::to_value(&request.payload).unwrap(),
        serde_json::json!({"disabled": "0"})
    );
}

#[test]
fn disable_rewrites_both_tiers() {
    let dir = TempDir::new().unwrap();
    let default_conf = "# shipped\n[a]\nsearch = index=main \\\n| stats count\n\n[b]\ndisabled = 0\n";
    write(dir.path(), "app/default/savedsearches.conf", default_conf);
    write(dir.path(), "app/local/savedsearches.conf", "[a]\ncron_schedule = */5 * * * *\n");

    for tier in ["default", "local"] {
        let path = dir.path().join("app").join(tier).join("savedsearches.conf");
        let doc = parse_file(&path).unwrap();
        let edited = apply(&doc, &EnsureValue::disabled());
        write_file(&edited, &path, &WriteOptions::default()).unwrap();
    }

    let default = fs::read_to_string(dir.path().join("app/default/savedsearches.conf")).unwrap();
    assert_eq!(
        default,
        "# shipped\n[a]\ndisabled = 1\nsearch = index=main \\\n| stats count\n\n[b]\ndisabled = 1\n"
    );

    let default = parse_file(&dir.path().join("app/default/savedsearches.conf")).unwrap();
    let local = parse_file(&dir.path().join("app/local/savedsearches.conf")).unwrap();
    let resolution = resolve(Some(&default), Some(&local));
    assert!(
        resolution
            .stanzas
            .iter()
            .all(|s| s.disposition == Disposition::Disabled)
    );
}

#[test]
fn metadata_plan_from_meta_files() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "app/metadata/default.meta",
        "[]\naccess = read : [ * ], write : [ admin ]\nexport = none\n",
    );

    let doc = parse_file(&dir.path().join("app/metadata/default.meta")).unwrap();
    let apps = vec![AppModel::metadata("app", meta::entries(&doc))];
    let plan = plan(&apps, PlanMode::Metadata, &PlanOptions::default());

    assert_eq!(plan.len(), 1);
    assert_eq!(plan.requests[0].endpoint, "services/apps/local/app/acl");
    assert_eq!(
        plan.requests[0].form(),
        vec![
            ("perms.read".to_string(), "*".to_string()),
            ("perms.write".to_string(), "admin".to_string()),
            ("sharing".to_string(), "app".to_string()),
        ]
    );
}
