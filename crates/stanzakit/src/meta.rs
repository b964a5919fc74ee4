//! Access-control metadata (`default.meta`, `local.meta`).
//!
//! A `.meta` stanza names what it applies to (see [`determine_scope`]) and
//! carries `access`, `owner` and `export` keys. Access may be written in the
//! native form, `access = read : [ * ], write : [ admin ]`, or as dotted keys,
//! `access.read = *`.

use crate::params::{self, Params};
use crate::policy::{Chain, EnsureValue, Policy, SetNested};
use crate::scope::{Scope, determine_scope};
use crate::types::{ConfigDocument, Stanza};
use indexmap::IndexMap;

/// ACL settings of one metadata stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEntry {
    /// Decoded stanza name
    pub name: String,
    /// What the stanza applies to
    pub scope: Scope,
    /// Readers, comma separated
    pub read: Option<String>,
    /// Writers, comma separated
    pub write: Option<String>,
    /// `owner` value
    pub owner: Option<String>,
    /// `export` value
    pub export: Option<String>,
}

impl MetaEntry {
    /// Build an entry from a stanza's effective parameters.
    pub fn from_params(name: &str, params: &IndexMap<String, String>) -> Self {
        let mut read = None;
        let mut write = None;

        if let Some(access) = params.get("access") {
            for (role, list) in parse_access(access) {
                match role.as_str() {
                    "read" => read = Some(list),
                    "write" => write = Some(list),
                    _ => {}
                }
            }
        }
        if let Some(value) = params.get("access.read") {
            read = Some(value.clone());
        }
        if let Some(value) = params.get("access.write") {
            write = Some(value.clone());
        }

        Self {
            name: name.to_string(),
            scope: determine_scope(name),
            read,
            write,
            owner: params.get("owner").cloned(),
            export: params.get("export").cloned(),
        }
    }

    /// Sharing level implied by `export`: `system` shares globally, anything
    /// else stays in the app.
    pub fn sharing(&self) -> Option<&'static str> {
        self.export.as_deref().map(|export| {
            if export.trim() == "system" {
                "global"
            } else {
                "app"
            }
        })
    }

    /// ACL request payload. Empty when the stanza sets nothing.
    pub fn acl_payload(&self) -> Params {
        let mut edits = Chain::new();
        if let Some(read) = &self.read {
            edits = edits.then(SetNested::new("perms", "read", read.as_str()));
        }
        if let Some(write) = &self.write {
            edits = edits.then(SetNested::new("perms", "write", write.as_str()));
        }
        if let Some(owner) = &self.owner {
            edits = edits.then(EnsureValue::new("owner", owner.as_str()));
        }
        if let Some(sharing) = self.sharing() {
            edits = edits.then(EnsureValue::new("sharing", sharing));
        }

        params::from_stanza(&edits.apply(Stanza::new(self.name.as_str())))
    }
}

/// Read every stanza of a metadata document.
pub fn entries(doc: &ConfigDocument) -> Vec<MetaEntry> {
    doc.stanzas
        .iter()
        .map(|stanza| MetaEntry::from_params(&stanza.name, &stanza.params()))
        .collect()
}

/// Parse `read : [ a, b ], write : [ c ]` into `(role, "a,b")` pairs.
/// Malformed parts are dropped.
pub fn parse_access(value: &str) -> Vec<(String, String)> {
    let mut lists = Vec::new();
    let mut rest = value;

    while let Some(colon) = rest.find(':') {
        let role = rest[..colon].trim().trim_start_matches(',').trim();
        let after = &rest[colon + 1..];
        let Some(open) = after.find('[') else {
            break;
        };
        let Some(close) = after[open..].find(']') else {
            break;
        };
        let members: Vec<&str> = after[open + 1..open + close]
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .collect();
        if !role.is_empty() {
            lists.push((role.to_string(), members.join(",")));
        }
        rest = &after[open + close + 1..];
    }

    lists
}
