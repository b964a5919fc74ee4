//! # stanzakit
//!
//! Pure Rust library for Splunk `.conf` and `.meta` stanza files.
//!
//! This crate provides functionality for:
//! - Parsing stanza files into a lossless document model
//! - Rewriting documents with edit policies, byte-for-byte where untouched
//! - Resolving enabled/disabled state across the `default` and `local` tiers
//! - Planning the REST requests that push that state to a Splunk service
//!
//! ## Example
//!
//! ```
//! use stanzakit::conf::{parse_string, rewrite};
//! use stanzakit::policy::EnsureValue;
//!
//! let doc = parse_string("[Nightly]\nsearch = index=main\n");
//! let output = rewrite(&doc, &EnsureValue::disabled());
//! assert_eq!(output, "[Nightly]\ndisabled = 1\nsearch = index=main\n");
//! ```
//!
//! ## Dispatch planning
//!
//! ```
//! use stanzakit::conf::parse_string;
//! use stanzakit::disposition::resolve;
//! use stanzakit::plan::{AppModel, PlanMode, PlanOptions, plan};
//!
//! let default = parse_string("[search1]\ndisabled = 0\n");
//! let local = parse_string("[search1]\n");
//! let resolution = resolve(Some(&default), Some(&local));
//!
//! let apps = vec![AppModel::resolved("my_app", resolution.stanzas)];
//! let plan = plan(&apps, PlanMode::Enable, &PlanOptions::default());
//! assert_eq!(plan.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conf;
pub mod disposition;
pub mod error;
pub mod meta;
pub mod params;
pub mod plan;
pub mod policy;
pub mod scope;
pub mod types;

pub use disposition::{Disposition, Resolution, ResolvedStanza, Tier, resolve};
pub use error::{Error, ErrorCategory, Result};
pub use params::{ParamValue, Params};
pub use plan::{DispatchRequest, IdempotencyKey, PlanMode, PlanOptions, RequestKind};
pub use policy::Policy;
pub use scope::{Scope, determine_scope};
pub use types::{ConfigDocument, Diagnostic, Entry, Line, Newline, Stanza};
