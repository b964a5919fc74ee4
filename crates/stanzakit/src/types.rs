//! Core types for stanza documents.

use crate::error::Error;
use indexmap::IndexMap;
use std::fmt;
use std::path::PathBuf;

/// Line terminator style detected in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Newline {
    /// `\n`
    #[default]
    Lf,
    /// `\r\n`
    CrLf,
}

impl Newline {
    /// The terminator as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Newline::Lf => "\n",
            Newline::CrLf => "\r\n",
        }
    }

    /// Detect the style from the first terminated line of `text`.
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(pos) if pos > 0 && text.as_bytes()[pos - 1] == b'\r' => Newline::CrLf,
            _ => Newline::Lf,
        }
    }
}

/// A `key = value` entry inside a stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Trimmed key
    pub key: String,
    /// Logical value; continuation segments are joined with `\n`
    pub value: String,
    /// Physical lines as read, `None` once the entry was edited or created
    pub(crate) raw: Option<String>,
}

impl Entry {
    /// Create a new entry that has no source text.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            raw: None,
        }
    }
}

/// One physical (or, for entries, logical) line of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A key/value entry
    Entry(Entry),
    /// A `#` comment, verbatim
    Comment(String),
    /// An empty or whitespace-only line, verbatim
    Blank(String),
    /// A line the parser could not place, verbatim
    Unparsed(String),
}

/// The header line of a parsed stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Header {
    /// Header line as read, including its terminator
    pub(crate) raw: String,
    /// Decoded name at parse time
    pub(crate) name: String,
}

/// A named section of a configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
    /// Decoded stanza identifier (may contain `/`)
    pub name: String,
    /// Position of the stanza in its document
    pub index: usize,
    pub(crate) header: Option<Header>,
    pub(crate) lines: Vec<Line>,
    /// Entries inserted directly after the header so far
    pub(crate) inserted: usize,
}

impl Stanza {
    /// Create an empty stanza with no source text.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: 0,
            header: None,
            lines: Vec::new(),
            inserted: 0,
        }
    }

    /// Builder-style entry addition.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.lines.push(Line::Entry(Entry::new(key, value)));
        self
    }

    /// All lines of the stanza in order, excluding the header.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Iterate over entries in file order, duplicates included.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry(entry) => Some(entry),
            _ => None,
        })
    }

    /// Effective key/value mapping. Later duplicates overwrite earlier values
    /// but keep the position of the first occurrence.
    pub fn params(&self) -> IndexMap<String, String> {
        let mut map = IndexMap::new();
        for entry in self.entries() {
            map.insert(entry.key.clone(), entry.value.clone());
        }
        map
    }

    /// Effective value of a key (last occurrence wins).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries()
            .filter(|e| e.key == key)
            .last()
            .map(|e| e.value.as_str())
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries().any(|e| e.key == key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.params().len()
    }

    /// Whether the stanza has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    /// Set a key. Every existing occurrence is updated in place; a missing key
    /// is inserted directly after the header, after earlier insertions.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let mut found = false;
        for line in &mut self.lines {
            if let Line::Entry(entry) = line
                && entry.key == key
            {
                found = true;
                if entry.value != value {
                    entry.value = value.clone();
                    entry.raw = None;
                }
            }
        }
        if !found {
            self.lines
                .insert(self.inserted, Line::Entry(Entry::new(key, value)));
            self.inserted += 1;
        }
    }

    /// Remove every occurrence of a key. Returns whether anything was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        let is_match = |line: &Line| matches!(line, Line::Entry(e) if e.key == key);
        let removed_inserted = self.lines[..self.inserted]
            .iter()
            .filter(|line| is_match(line))
            .count();
        self.inserted -= removed_inserted;

        let before = self.lines.len();
        self.lines.retain(|line| !is_match(line));
        before != self.lines.len()
    }

    /// Rename every occurrence of `from` to `to`, keeping positions.
    pub fn rename_key(&mut self, from: &str, to: &str) -> bool {
        let mut renamed = false;
        for line in &mut self.lines {
            if let Line::Entry(entry) = line
                && entry.key == from
            {
                entry.key = to.to_string();
                entry.raw = None;
                renamed = true;
            }
        }
        renamed
    }
}

/// Problems found while parsing. None of them stop parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Key/value line before the first header
    OrphanKey {
        /// Line number (1-indexed)
        line: usize,
        /// Key found on the line
        key: String,
    },
    /// Line that is not a comment, header or key/value pair
    Unparsed {
        /// Line number (1-indexed)
        line: usize,
        /// Trimmed content
        content: String,
    },
    /// A header repeating an earlier stanza; its entries were merged
    DuplicateStanza {
        /// Line number (1-indexed)
        line: usize,
        /// Decoded stanza name
        name: String,
    },
}

impl From<&Diagnostic> for Error {
    fn from(diagnostic: &Diagnostic) -> Self {
        match diagnostic {
            Diagnostic::OrphanKey { line, key } => Error::OrphanKey {
                line: *line,
                key: key.clone(),
            },
            Diagnostic::Unparsed { line, content } => Error::Parse {
                line: *line,
                content: content.clone(),
            },
            Diagnostic::DuplicateStanza { line, name } => Error::Parse {
                line: *line,
                content: format!("[{name}] repeats an earlier stanza"),
            },
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::OrphanKey { line, key } => {
                write!(f, "line {line}: key '{key}' is outside of any stanza, skipped")
            }
            Diagnostic::Unparsed { line, content } => {
                write!(f, "line {line}: cannot parse '{content}', skipped")
            }
            Diagnostic::DuplicateStanza { line, name } => {
                write!(f, "line {line}: stanza '{name}' repeated, merged into the first")
            }
        }
    }
}

/// A parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    /// Path the document was read from
    pub path: Option<PathBuf>,
    /// Stanzas in file order
    pub stanzas: Vec<Stanza>,
    /// Problems found while parsing
    pub diagnostics: Vec<Diagnostic>,
    pub(crate) preamble: Vec<Line>,
    pub(crate) newline: Newline,
}

impl ConfigDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines before the first stanza.
    pub fn preamble(&self) -> &[Line] {
        &self.preamble
    }

    /// Detected line terminator.
    pub fn newline(&self) -> Newline {
        self.newline
    }

    /// Append a stanza.
    pub fn add(&mut self, mut stanza: Stanza) {
        stanza.index = self.stanzas.len();
        self.stanzas.push(stanza);
    }

    /// Find a stanza by decoded name.
    pub fn stanza(&self, name: &str) -> Option<&Stanza> {
        self.stanzas.iter().find(|s| s.name == name)
    }

    /// Stanza names in file order.
    pub fn names(&self) -> Vec<&str> {
        self.stanzas.iter().map(|s| s.name.as_str()).collect()
    }

    /// Whether the document has no stanzas.
    pub fn is_empty(&self) -> bool {
        self.stanzas.is_empty()
    }
}
