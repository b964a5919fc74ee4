//! Dispatch planning: resolved stanzas in, ordered HTTP requests out.
//!
//! Planning is pure. Apps are planned in the order given, stanzas in the order
//! the resolver produced them. Endpoints are relative to the API base URL.

use crate::disposition::{Disposition, ResolvedStanza};
use crate::meta::MetaEntry;
use crate::params::{self, ParamValue, Params};
use crate::policy::{Policy, RenameKey};
use crate::scope::{Scope, encode_segment};
use crate::types::Stanza;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Placeholder for the app name in endpoint templates.
pub const APP_PLACEHOLDER: &str = "{app}";

/// HTTP verb of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    /// Every request is a POST
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("POST")
    }
}

/// What a request does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Set `disabled` on a saved search
    Enable,
    /// Create a saved search
    Create,
    /// Share a created saved search
    CreateAcl,
    /// Apply `.meta` permissions
    MetadataAcl,
    /// Change a role's imported roles
    RoleEdit,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RequestKind::Enable => "enable",
            RequestKind::Create => "create",
            RequestKind::CreateAcl => "create-acl",
            RequestKind::MetadataAcl => "metadata-acl",
            RequestKind::RoleEdit => "role-edit",
        };
        f.write_str(label)
    }
}

/// Identifies a request so a repeated run maps onto the same remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    /// App name, empty for global objects
    pub app: String,
    /// Stanza (or role) name
    pub stanza: String,
    /// Endpoint path
    pub endpoint: String,
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}", self.app, self.stanza, self.endpoint)
    }
}

/// One outbound HTTP call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRequest {
    /// Path relative to the API base URL
    pub endpoint: String,
    /// HTTP verb
    pub method: Method,
    /// Nested payload, flattened to form fields by the transport
    pub payload: Params,
    /// Identity of the remote object
    pub key: IdempotencyKey,
    /// What the request does
    pub kind: RequestKind,
    /// Log instead of sending
    pub dummy: bool,
}

impl DispatchRequest {
    fn new(kind: RequestKind, app: &str, stanza: &str, endpoint: String, payload: Params) -> Self {
        Self {
            key: IdempotencyKey {
                app: app.to_string(),
                stanza: stanza.to_string(),
                endpoint: endpoint.clone(),
            },
            endpoint,
            method: Method::Post,
            payload,
            kind,
            dummy: false,
        }
    }

    /// Payload as dotted form fields.
    pub fn form(&self) -> Vec<(String, String)> {
        params::flatten(&self.payload)
    }
}

/// Which requests to plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    /// Push resolved dispositions
    Enable,
    /// Create saved searches from their parameters
    Create,
    /// Push `.meta` permissions
    Metadata,
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanMode::Enable => write!(f, "enable"),
            PlanMode::Create => write!(f, "create"),
            PlanMode::Metadata => write!(f, "metadata"),
        }
    }
}

/// Conf type to REST endpoint templates. `{app}` is replaced per app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointTable(IndexMap<String, String>);

impl EndpointTable {
    /// The built-in table.
    pub fn builtin() -> Self {
        let entries = [
            ("savedsearches", "servicesNS/nobody/{app}/saved/searches"),
            ("eventtypes", "servicesNS/nobody/{app}/saved/eventtypes"),
            ("macros", "servicesNS/nobody/{app}/admin/macros"),
            ("tags", "servicesNS/nobody/{app}/configs/conf-tags"),
            ("props", "servicesNS/nobody/{app}/configs/conf-props"),
            ("transforms", "servicesNS/nobody/{app}/configs/conf-transforms"),
            ("collections", "servicesNS/nobody/{app}/storage/collections/config"),
            ("datamodels", "servicesNS/nobody/{app}/datamodel/model"),
            ("lookups", "servicesNS/nobody/{app}/data/lookup-table-files"),
            ("views", "servicesNS/nobody/{app}/data/ui/views"),
            ("panels", "servicesNS/nobody/{app}/data/ui/panels"),
            ("nav", "servicesNS/nobody/{app}/data/ui/nav"),
            (
                "workflow_actions",
                "servicesNS/nobody/{app}/data/ui/workflow-actions",
            ),
        ];
        Self(
            entries
                .into_iter()
                .map(|(conf, endpoint)| (conf.to_string(), endpoint.to_string()))
                .collect(),
        )
    }

    /// Built-in table with entries replaced or added.
    pub fn with_overrides(mut self, overrides: &IndexMap<String, String>) -> Self {
        for (conf, endpoint) in overrides {
            self.0.insert(conf.clone(), endpoint.trim_matches('/').to_string());
        }
        self
    }

    /// Endpoint for a conf type in an app. The app name is percent-encoded.
    pub fn resolve(&self, conf: &str, app: &str) -> Option<String> {
        self.0
            .get(conf)
            .map(|template| template.replace(APP_PLACEHOLDER, &encode_segment(app)))
    }
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Planner settings.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Mark every request as dummy
    pub dummy: bool,
    /// Endpoint table for metadata mode
    pub endpoints: EndpointTable,
}

/// Planner input for one app.
#[derive(Debug, Clone, Default)]
pub struct AppModel {
    /// App directory name
    pub name: String,
    /// Resolved `savedsearches.conf` stanzas
    pub stanzas: Vec<ResolvedStanza>,
    /// Metadata stanzas, `default.meta` then `local.meta`
    pub meta: Vec<MetaEntry>,
}

impl AppModel {
    /// App with resolved saved searches.
    pub fn resolved(name: impl Into<String>, stanzas: Vec<ResolvedStanza>) -> Self {
        Self {
            name: name.into(),
            stanzas,
            meta: Vec::new(),
        }
    }

    /// App with metadata entries.
    pub fn metadata(name: impl Into<String>, meta: Vec<MetaEntry>) -> Self {
        Self {
            name: name.into(),
            stanzas: Vec::new(),
            meta,
        }
    }
}

/// A stanza the planner did not turn into a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    /// App name
    pub app: String,
    /// Stanza name
    pub stanza: String,
    /// Why it was skipped
    pub reason: String,
}

impl fmt::Display for Skipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.app, self.stanza, self.reason)
    }
}

/// Planner output.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Requests in dispatch order
    pub requests: Vec<DispatchRequest>,
    /// Stanzas left out
    pub skipped: Vec<Skipped>,
}

impl Plan {
    /// Number of requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn skip(&mut self, app: &str, stanza: &str, reason: impl Into<String>) {
        self.skipped.push(Skipped {
            app: app.to_string(),
            stanza: stanza.to_string(),
            reason: reason.into(),
        });
    }
}

/// Plan requests for every app.
pub fn plan(apps: &[AppModel], mode: PlanMode, options: &PlanOptions) -> Plan {
    let mut out = Plan::default();

    for app in apps {
        match mode {
            PlanMode::Enable => plan_enable(app, &mut out),
            PlanMode::Create => plan_create(app, &mut out),
            PlanMode::Metadata => plan_metadata(app, &options.endpoints, &mut out),
        }
    }

    let mut seen = HashSet::new();
    let mut requests = Vec::with_capacity(out.requests.len());
    for mut request in out.requests {
        if !seen.insert(request.key.clone()) {
            out.skipped.push(Skipped {
                app: request.key.app.clone(),
                stanza: request.key.stanza.clone(),
                reason: format!("duplicate request to {}", request.endpoint),
            });
            continue;
        }
        request.dummy = options.dummy;
        requests.push(request);
    }
    out.requests = requests;

    out
}

fn plan_enable(app: &AppModel, out: &mut Plan) {
    for stanza in &app.stanzas {
        let Some(value) = stanza.disposition.disabled_value() else {
            out.skip(&app.name, &stanza.name, "no disposition");
            continue;
        };
        let endpoint = format!(
            "servicesNS/nobody/{}/configs/conf-savedsearches/{}",
            encode_segment(&app.name),
            encode_segment(&stanza.name)
        );
        out.requests.push(DispatchRequest::new(
            RequestKind::Enable,
            &app.name,
            &stanza.name,
            endpoint,
            params::plain([("disabled", value)]),
        ));
    }
}

fn plan_create(app: &AppModel, out: &mut Plan) {
    for stanza in &app.stanzas {
        if stanza.params.is_empty() {
            out.skip(&app.name, &stanza.name, "no parameters");
            continue;
        }

        let endpoint = format!("servicesNS/nobody/{}/saved/searches", encode_segment(&app.name));
        out.requests.push(DispatchRequest::new(
            RequestKind::Create,
            &app.name,
            &stanza.name,
            endpoint.clone(),
            create_payload(stanza),
        ));

        let acl = format!("{endpoint}/{}/acl", encode_segment(&stanza.name));
        out.requests.push(DispatchRequest::new(
            RequestKind::CreateAcl,
            &app.name,
            &stanza.name,
            acl,
            params::plain([("owner", "nobody"), ("sharing", "app")]),
        ));
    }
}

/// Creation payload: `name` first, then the stanza parameters with the REST
/// API's key names.
fn create_payload(stanza: &ResolvedStanza) -> Params {
    let mut draft = Stanza::new(stanza.name.as_str());
    draft.set("name", stanza.name.as_str());
    for (key, value) in stanza.params.iter().filter(|(key, _)| *key != "name") {
        draft.set(key, value.as_str());
    }
    params::from_stanza(&RenameKey::enable_sched().apply(draft))
}

fn plan_metadata(app: &AppModel, endpoints: &EndpointTable, out: &mut Plan) {
    for entry in &app.meta {
        let endpoint = match &entry.scope {
            Scope::App => format!("services/apps/local/{}/acl", encode_segment(&app.name)),
            Scope::ConfFile { conf } => match endpoints.resolve(conf, &app.name) {
                Some(endpoint) => endpoint,
                None => {
                    out.skip(&app.name, &entry.name, format!("unknown conf type '{conf}'"));
                    continue;
                }
            },
            Scope::Object { conf, name } => match endpoints.resolve(conf, &app.name) {
                Some(endpoint) => format!("{endpoint}/{}/acl", encode_segment(name)),
                None => {
                    out.skip(&app.name, &entry.name, format!("unknown conf type '{conf}'"));
                    continue;
                }
            },
        };

        let payload = entry.acl_payload();
        if payload.is_empty() {
            out.skip(&app.name, &entry.name, "no access settings");
            continue;
        }

        out.requests.push(DispatchRequest::new(
            RequestKind::MetadataAcl,
            &app.name,
            &entry.name,
            endpoint,
            payload,
        ));
    }
}

/// Request replacing a role's imported roles.
pub fn plan_role_edit(role: &str, imported_roles: &[String], dummy: bool) -> DispatchRequest {
    let endpoint = format!("services/authorization/roles/{}", encode_segment(role));
    let mut payload = Params::new();
    payload.insert(
        "imported_roles".to_string(),
        ParamValue::Value(imported_roles.join(",")),
    );

    let mut request = DispatchRequest::new(RequestKind::RoleEdit, "", role, endpoint, payload);
    request.dummy = dummy;
    request
}

/// Number of enabled and disabled stanzas across apps.
pub fn disposition_counts(apps: &[AppModel]) -> (usize, usize) {
    apps.iter()
        .flat_map(|app| &app.stanzas)
        .fold((0, 0), |(enabled, disabled), s| match s.disposition {
            Disposition::Enabled => (enabled + 1, disabled),
            Disposition::Disabled => (enabled, disabled + 1),
            Disposition::Unset => (enabled, disabled),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::parse_string;
    use crate::disposition::resolve;
    use crate::meta;

    fn app(name: &str, default: &str, local: &str) -> AppModel {
        let default = parse_string(default);
        let local = parse_string(local);
        AppModel::resolved(name, resolve(Some(&default), Some(&local)).stanzas)
    }

    #[test]
    fn test_enable_plans_one_request_per_stanza() {
        let apps = vec![app(
            "search_app",
            "[a]\ndisabled = 0\n[b]\ndisabled = 1\n",
            "",
        )];
        let plan = plan(&apps, PlanMode::Enable, &PlanOptions::default());

        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan.requests[0].endpoint,
            "servicesNS/nobody/search_app/configs/conf-savedsearches/a"
        );
        assert_eq!(plan.requests[1].form(), vec![("disabled".to_string(), "1".to_string())]);
        assert!(plan.requests.iter().all(|r| r.method == Method::Post));
    }

    #[test]
    fn test_enable_encodes_names() {
        let apps = vec![app("x", "[Daily / Errors]\n", "")];
        let plan = plan(&apps, PlanMode::Enable, &PlanOptions::default());
        assert_eq!(
            plan.requests[0].endpoint,
            "servicesNS/nobody/x/configs/conf-savedsearches/Daily%20%252F%20Errors"
        );
    }

    #[test]
    fn test_app_names_are_encoded() {
        let apps = vec![app("my app", "[s]\nsearch = x\n", "")];
        let enable = plan(&apps, PlanMode::Enable, &PlanOptions::default());
        assert_eq!(
            enable.requests[0].endpoint,
            "servicesNS/nobody/my%20app/configs/conf-savedsearches/s"
        );
        assert_eq!(enable.requests[0].key.app, "my app");

        let create = plan(&apps, PlanMode::Create, &PlanOptions::default());
        assert_eq!(create.requests[1].endpoint, "servicesNS/nobody/my%20app/saved/searches/s/acl");

        let table = EndpointTable::builtin();
        assert_eq!(
            table.resolve("views", "my app").as_deref(),
            Some("servicesNS/nobody/my%20app/data/ui/views")
        );
    }

    #[test]
    fn test_apps_keep_caller_order() {
        let apps = vec![app("zeta", "[s]\n", ""), app("alpha", "[s]\n", "")];
        let plan = plan(&apps, PlanMode::Enable, &PlanOptions::default());
        let order: Vec<_> = plan.requests.iter().map(|r| r.key.app.as_str()).collect();
        assert_eq!(order, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_dummy_is_copied() {
        let apps = vec![app("x", "[s]\n", "")];
        let options = PlanOptions {
            dummy: true,
            ..PlanOptions::default()
        };
        let plan = plan(&apps, PlanMode::Enable, &options);
        assert!(plan.requests[0].dummy);
    }

    #[test]
    fn test_create_renames_and_names() {
        let apps = vec![app(
            "x",
            "[Nightly]\nsearch = index=main\nenableSched = 1\n[empty]\n",
            "",
        )];
        let plan = plan(&apps, PlanMode::Create, &PlanOptions::default());

        assert_eq!(plan.len(), 2);
        let create = &plan.requests[0];
        assert_eq!(create.kind, RequestKind::Create);
        assert_eq!(create.endpoint, "servicesNS/nobody/x/saved/searches");
        assert_eq!(
            create.form(),
            vec![
                ("name".to_string(), "Nightly".to_string()),
                ("search".to_string(), "index=main".to_string()),
                ("is_scheduled".to_string(), "1".to_string()),
            ]
        );

        let acl = &plan.requests[1];
        assert_eq!(acl.kind, RequestKind::CreateAcl);
        assert_eq!(acl.endpoint, "servicesNS/nobody/x/saved/searches/Nightly/acl");

        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].stanza, "empty");
    }

    #[test]
    fn test_create_name_comes_from_stanza() {
        let apps = vec![app("x", "[Real]\nname = Other\nenableSched = 0\n", "")];
        let plan = plan(&apps, PlanMode::Create, &PlanOptions::default());
        assert_eq!(
            plan.requests[0].form(),
            vec![
                ("name".to_string(), "Real".to_string()),
                ("is_scheduled".to_string(), "0".to_string()),
            ]
        );
    }

    #[test]
    fn test_metadata_scopes() {
        let doc = parse_string(
            "[]\nexport = system\n\
             [savedsearches]\nowner = admin\n\
             [props/my_extract]\naccess.read = *\n\
             [unknown/thing]\nowner = admin\n\
             [views]\n",
        );
        let apps = vec![AppModel::metadata("my_app", meta::entries(&doc))];
        let plan = plan(&apps, PlanMode::Metadata, &PlanOptions::default());

        let endpoints: Vec<_> = plan.requests.iter().map(|r| r.endpoint.as_str()).collect();
        assert_eq!(
            endpoints,
            vec![
                "services/apps/local/my_app/acl",
                "servicesNS/nobody/my_app/saved/searches",
                "servicesNS/nobody/my_app/configs/conf-props/my_extract/acl",
            ]
        );
        assert_eq!(plan.skipped.len(), 2);
    }

    #[test]
    fn test_props_object_encoding() {
        let doc = parse_string("[props/my%2Fextract]\nowner = nobody\n");
        let apps = vec![AppModel::metadata("a", meta::entries(&doc))];
        let plan = plan(&apps, PlanMode::Metadata, &PlanOptions::default());
        assert_eq!(
            plan.requests[0].endpoint,
            "servicesNS/nobody/a/configs/conf-props/my%252Fextract/acl"
        );
    }

    #[test]
    fn test_endpoint_overrides() {
        let mut overrides = IndexMap::new();
        overrides.insert("props".to_string(), "/custom/{app}/props/".to_string());
        let table = EndpointTable::builtin().with_overrides(&overrides);
        assert_eq!(table.resolve("props", "a").as_deref(), Some("custom/a/props"));
        assert!(table.resolve("nope", "a").is_none());
    }

    #[test]
    fn test_role_edit() {
        let request = plan_role_edit("user", &["everyone_adhoc".to_string()], false);
        assert_eq!(request.endpoint, "services/authorization/roles/user");
        assert_eq!(
            request.form(),
            vec![("imported_roles".to_string(), "everyone_adhoc".to_string())]
        );
        assert_eq!(request.kind, RequestKind::RoleEdit);
    }

    #[test]
    fn test_disposition_counts() {
        let apps = vec![app("x", "[a]\ndisabled = 1\n[b]\n", "")];
        assert_eq!(disposition_counts(&apps), (1, 1));
    }
}
