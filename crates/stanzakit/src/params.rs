//! Nested parameter payloads.
//!
//! Keys containing a `.` split on the first dot into a group and a field
//! (`access.read` becomes group `access`, field `read`). Dispatch payloads
//! keep that shape; the transport flattens it back to dotted form fields.

use crate::types::Stanza;
use indexmap::IndexMap;
use serde::Serialize;

/// A payload value: plain, or a group of dotted fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// `key = value`
    Value(String),
    /// `key.field = value`; a plain value colliding with the group is kept
    /// under the empty field name
    Group(IndexMap<String, String>),
}

/// Ordered payload mapping.
pub type Params = IndexMap<String, ParamValue>;

/// Build a nested payload from flat key/value pairs.
pub fn nest<'a, I>(pairs: I) -> Params
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut params = Params::new();

    for (key, value) in pairs {
        match key.split_once('.') {
            Some((group, field)) => {
                let slot = params
                    .entry(group.to_string())
                    .or_insert_with(|| ParamValue::Group(IndexMap::new()));
                if let ParamValue::Value(plain) = &mut *slot {
                    let mut fields = IndexMap::new();
                    fields.insert(String::new(), std::mem::take(plain));
                    *slot = ParamValue::Group(fields);
                }
                if let ParamValue::Group(fields) = slot {
                    fields.insert(field.to_string(), value.to_string());
                }
            }
            None => match params.get_mut(key) {
                Some(ParamValue::Group(fields)) => {
                    fields.insert(String::new(), value.to_string());
                }
                _ => {
                    params.insert(key.to_string(), ParamValue::Value(value.to_string()));
                }
            },
        }
    }

    params
}

/// Nested payload from a stanza's effective key/value mapping.
pub fn from_stanza(stanza: &Stanza) -> Params {
    let flat = stanza.params();
    nest(flat.iter().map(|(key, value)| (key.as_str(), value.as_str())))
}

/// Flatten a nested payload to dotted key/value pairs.
pub fn flatten(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        match value {
            ParamValue::Value(v) => pairs.push((key.clone(), v.clone())),
            ParamValue::Group(fields) => {
                for (field, v) in fields {
                    if field.is_empty() {
                        pairs.push((key.clone(), v.clone()));
                    } else {
                        pairs.push((format!("{key}.{field}"), v.clone()));
                    }
                }
            }
        }
    }
    pairs
}

/// Shorthand for a payload of plain values.
pub fn plain<'a, I>(pairs: I) -> Params
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), ParamValue::Value(v.to_string())))
        .collect()
}
