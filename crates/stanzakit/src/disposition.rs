//! Enabled/disabled resolution across the `default` and `local` tiers.
//!
//! Each stanza name moves through `Unset -> DefaultSeen | LocalSeen ->
//! Resolved`. Tiers must be observed `default` first, then `local`.
//!
//! Rules:
//! - a `disabled` key in `local` is authoritative;
//! - a `local` stanza without the key inherits the `default` disposition;
//! - a missing key in `default` means enabled;
//! - a stanza missing from `default` whose `local` entry has no key is
//!   enabled as well.

use crate::error::Error;
use crate::types::{ConfigDocument, Stanza};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key carrying the disposition.
pub const DISABLED_KEY: &str = "disabled";

/// Resolved or per-tier enabled state of a stanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// `disabled = 0` or `false`
    Enabled,
    /// `disabled = 1` or `true`
    Disabled,
    /// No `disabled` key in this tier
    Unset,
}

impl Disposition {
    /// Parse a `disabled` value. Case-insensitive, surrounding whitespace
    /// ignored. Returns `None` for anything but `0`, `1`, `true`, `false`.
    pub fn from_disabled_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "0" | "false" => Some(Disposition::Enabled),
            "1" | "true" => Some(Disposition::Disabled),
            _ => None,
        }
    }

    /// Disposition declared by a single stanza.
    pub fn of(stanza: &Stanza) -> Result<Self, Error> {
        match stanza.get(DISABLED_KEY) {
            None => Ok(Disposition::Unset),
            Some(value) => {
                Self::from_disabled_value(value).ok_or_else(|| Error::MalformedDisposition {
                    stanza: stanza.name.clone(),
                    value: value.to_string(),
                })
            }
        }
    }

    /// Value for the `disabled` field, `None` when unset.
    pub fn disabled_value(&self) -> Option<&'static str> {
        match self {
            Disposition::Enabled => Some("0"),
            Disposition::Disabled => Some("1"),
            Disposition::Unset => None,
        }
    }

    /// Replace `Unset` with the given fallback.
    pub fn or(self, fallback: Disposition) -> Disposition {
        match self {
            Disposition::Unset => fallback,
            other => other,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Enabled => write!(f, "enabled"),
            Disposition::Disabled => write!(f, "disabled"),
            Disposition::Unset => write!(f, "unset"),
        }
    }
}

/// Precedence layer of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Shipped defaults, `<app>/default`
    Default,
    /// Local overrides, `<app>/local`
    Local,
}

impl Tier {
    /// Directory name of the tier.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Tier::Default => "default",
            Tier::Local => "local",
        }
    }

    /// Both tiers in processing order.
    pub fn all() -> [Tier; 2] {
        [Tier::Default, Tier::Local]
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// What one tier said about a stanza: a disposition, or a malformed value.
type Observation = Result<Disposition, String>;

/// Per-stanza progress through the tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Unset,
    DefaultSeen(Observation),
    LocalSeen {
        default: Option<Observation>,
        local: Observation,
    },
}

#[derive(Debug)]
struct Track {
    state: State,
    params: IndexMap<String, String>,
}

/// A stanza with its final disposition and merged parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStanza {
    /// Decoded stanza name
    pub name: String,
    /// `Enabled` or `Disabled`, never `Unset`
    pub disposition: Disposition,
    /// Tier the decision came from
    pub decided_by: Tier,
    /// `default` parameters overlaid with `local` ones
    pub params: IndexMap<String, String>,
}

/// Outcome of resolving one app.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Resolved stanzas: `default` order, then `local`-only stanzas
    pub stanzas: Vec<ResolvedStanza>,
    /// Stanzas skipped because of malformed values
    pub errors: Vec<Error>,
}

impl Resolution {
    /// Find a resolved stanza by name.
    pub fn get(&self, name: &str) -> Option<&ResolvedStanza> {
        self.stanzas.iter().find(|s| s.name == name)
    }
}

/// Incremental resolver. Observe every stanza of the `default` tier, then
/// every stanza of the `local` tier, then call [`Resolver::finish`].
#[derive(Debug, Default)]
pub struct Resolver {
    tracks: IndexMap<String, Track>,
}

impl Resolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stanza seen in a tier.
    pub fn observe(&mut self, tier: Tier, stanza: &Stanza) {
        let observation = Disposition::of(stanza).map_err(|_| {
            stanza
                .get(DISABLED_KEY)
                .map(str::to_string)
                .unwrap_or_default()
        });

        let track = self
            .tracks
            .entry(stanza.name.clone())
            .or_insert_with(|| Track {
                state: State::Unset,
                params: IndexMap::new(),
            });

        for (key, value) in stanza.params() {
            track.params.insert(key, value);
        }

        let previous = std::mem::replace(&mut track.state, State::Unset);
        track.state = match (tier, previous) {
            (Tier::Default, State::Unset) => State::DefaultSeen(observation),
            // A second default observation cannot happen with merged
            // documents; keep the latest.
            (Tier::Default, State::DefaultSeen(_)) => State::DefaultSeen(observation),
            (Tier::Local, State::Unset) => State::LocalSeen {
                default: None,
                local: observation,
            },
            (Tier::Local, State::DefaultSeen(default)) => State::LocalSeen {
                default: Some(default),
                local: observation,
            },
            (_, State::LocalSeen { default, .. }) => State::LocalSeen {
                default,
                local: observation,
            },
        };
    }

    /// Record every stanza of a document.
    pub fn observe_document(&mut self, tier: Tier, doc: &ConfigDocument) {
        for stanza in &doc.stanzas {
            self.observe(tier, stanza);
        }
    }

    /// Resolve every observed stanza.
    pub fn finish(self) -> Resolution {
        let mut resolution = Resolution::default();

        for (name, track) in self.tracks {
            match resolve_state(&track.state) {
                Ok((disposition, decided_by)) => resolution.stanzas.push(ResolvedStanza {
                    name,
                    disposition,
                    decided_by,
                    params: track.params,
                }),
                Err(value) => resolution
                    .errors
                    .push(Error::MalformedDisposition { stanza: name, value }),
            }
        }

        resolution
    }
}

fn resolve_state(state: &State) -> Result<(Disposition, Tier), String> {
    match state {
        State::Unset => Ok((Disposition::Enabled, Tier::Default)),
        State::DefaultSeen(observation) => observation
            .clone()
            .map(|d| (d.or(Disposition::Enabled), Tier::Default)),
        State::LocalSeen { default, local } => match local {
            Err(value) => Err(value.clone()),
            Ok(Disposition::Unset) => match default {
                Some(Err(value)) => Err(value.clone()),
                Some(Ok(d)) => Ok((d.or(Disposition::Enabled), Tier::Default)),
                None => Ok((Disposition::Enabled, Tier::Local)),
            },
            Ok(d) => Ok((*d, Tier::Local)),
        },
    }
}

/// Resolve the two tiers of one app. Either tier may be absent.
pub fn resolve(default: Option<&ConfigDocument>, local: Option<&ConfigDocument>) -> Resolution {
    let mut resolver = Resolver::new();
    if let Some(doc) = default {
        resolver.observe_document(Tier::Default, doc);
    }
    if let Some(doc) = local {
        resolver.observe_document(Tier::Local, doc);
    }
    resolver.finish()
}
