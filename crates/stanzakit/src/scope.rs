//! Stanza name coding and scope detection.
//!
//! Stanza names in `.conf` and `.meta` files may be percent-encoded and may
//! carry a `<conf>/<object>` path. In request URLs the object part is encoded
//! again and its `/` separators are written as `%252F` so the server does not
//! split the path segment.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::fmt;

/// Characters left as-is when encoding a name: alphanumerics, `_.-~` and `/`.
const NAME_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Decode a percent-encoded stanza name. Invalid UTF-8 sequences are replaced.
pub fn decode_name(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Encode a stanza name for use as a single URL path segment.
pub fn encode_segment(name: &str) -> String {
    utf8_percent_encode(name, NAME_SAFE)
        .to_string()
        .replace('/', "%252F")
}

/// What a metadata stanza applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// `[]`: the whole app
    App,
    /// `[props]`: every object of one conf type
    ConfFile {
        /// Conf type, e.g. `props`
        conf: String,
    },
    /// `[props/name]`: a single object
    Object {
        /// Conf type, e.g. `props`
        conf: String,
        /// Object name, may itself contain `/`
        name: String,
    },
}

impl Scope {
    /// Short label of the scope kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Scope::App => "app",
            Scope::ConfFile { .. } => "conf_file",
            Scope::Object { .. } => "object",
        }
    }

    /// Conf type, if any.
    pub fn conf_file(&self) -> Option<&str> {
        match self {
            Scope::App => None,
            Scope::ConfFile { conf } | Scope::Object { conf, .. } => Some(conf),
        }
    }

    /// Object name, if any.
    pub fn object_name(&self) -> Option<&str> {
        match self {
            Scope::Object { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::App => write!(f, "app"),
            Scope::ConfFile { conf } => write!(f, "conf_file:{conf}"),
            Scope::Object { conf, name } => write!(f, "object:{conf}/{name}"),
        }
    }
}

/// Determine the scope of an already decoded stanza name. Only the first `/`
/// separates the conf type from the object name.
pub fn determine_scope(name: &str) -> Scope {
    if name.is_empty() {
        return Scope::App;
    }
    match name.split_once('/') {
        None => Scope::ConfFile {
            conf: name.to_string(),
        },
        Some((conf, object)) => Scope::Object {
            conf: conf.to_string(),
            name: object.to_string(),
        },
    }
}
