//! Stanza edit policies.
//!
//! A policy is a pure `Stanza -> Stanza` function. Closures qualify directly;
//! the named policies below cover the edits the CLI needs.

use crate::types::Stanza;

/// An edit applied to every stanza of a document.
pub trait Policy {
    /// Return the edited stanza.
    fn apply(&self, stanza: Stanza) -> Stanza;
}

impl<F> Policy for F
where
    F: Fn(Stanza) -> Stanza,
{
    fn apply(&self, stanza: Stanza) -> Stanza {
        self(stanza)
    }
}

/// Ensure a key holds a value, inserting it after the header when missing.
#[derive(Debug, Clone)]
pub struct EnsureValue {
    key: String,
    value: String,
}

impl EnsureValue {
    /// Ensure `key = value`.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Ensure `disabled = 1`.
    pub fn disabled() -> Self {
        Self::new("disabled", "1")
    }
}

impl Policy for EnsureValue {
    fn apply(&self, mut stanza: Stanza) -> Stanza {
        stanza.set(&self.key, self.value.as_str());
        stanza
    }
}

/// Rename a key, keeping its position and value.
#[derive(Debug, Clone)]
pub struct RenameKey {
    from: String,
    to: String,
}

impl RenameKey {
    /// Rename `from` to `to`.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// `enableSched` is called `is_scheduled` by the REST API.
    pub fn enable_sched() -> Self {
        Self::new("enableSched", "is_scheduled")
    }
}

impl Policy for RenameKey {
    fn apply(&self, mut stanza: Stanza) -> Stanza {
        stanza.rename_key(&self.from, &self.to);
        stanza
    }
}

/// Set a field under the nested-dot convention, `group.field = value`.
#[derive(Debug, Clone)]
pub struct SetNested {
    group: String,
    field: String,
    value: String,
}

impl SetNested {
    /// Set `group.field = value`.
    pub fn new(
        group: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// The flattened key.
    pub fn key(&self) -> String {
        format!("{}.{}", self.group, self.field)
    }
}

impl Policy for SetNested {
    fn apply(&self, mut stanza: Stanza) -> Stanza {
        stanza.set(&self.key(), self.value.as_str());
        stanza
    }
}

/// Run several policies in order.
#[derive(Default)]
pub struct Chain {
    policies: Vec<Box<dyn Policy>>,
}

impl Chain {
    /// Empty chain (identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a policy.
    pub fn then(mut self, policy: impl Policy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }
}

impl Policy for Chain {
    fn apply(&self, stanza: Stanza) -> Stanza {
        self.policies
            .iter()
            .fold(stanza, |stanza, policy| policy.apply(stanza))
    }
}
