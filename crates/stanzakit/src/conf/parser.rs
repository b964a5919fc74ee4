//! Parser for Splunk `.conf` stanza files.
//!
//! Handles the format used by `savedsearches.conf` and the `.meta` files:
//! ```text
//! # comment
//! [My%20Search]
//! search = index=main \
//! | stats count
//! disabled = 1
//! ```
//!
//! Parsing never fails on content. Lines that cannot be placed are kept
//! verbatim and reported through [`ConfigDocument::diagnostics`].

use crate::error::{Error, Result};
use crate::scope::decode_name;
use crate::types::{ConfigDocument, Diagnostic, Entry, Header, Line, Newline, Stanza};
use std::collections::HashMap;
use std::path::Path;

/// Parse a stanza file from a path.
pub fn parse_file(path: &Path) -> Result<ConfigDocument> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let mut doc = parse_string(&content);
    doc.path = Some(path.to_path_buf());
    Ok(doc)
}

/// Parse a stanza file from a string.
pub fn parse_string(content: &str) -> ConfigDocument {
    let mut parser = Parser::new(Newline::detect(content));

    for (idx, raw) in content.split_inclusive('\n').enumerate() {
        parser.feed(idx + 1, raw);
    }

    parser.finish()
}

/// Key/value entry whose value continues on following lines.
struct Continuation {
    key: String,
    segments: Vec<String>,
    raw: String,
    /// Set when the entry started before any stanza
    orphan: bool,
}

struct Parser {
    doc: ConfigDocument,
    current: Option<usize>,
    seen: HashMap<String, usize>,
    pending: Option<Continuation>,
}

impl Parser {
    fn new(newline: Newline) -> Self {
        Self {
            doc: ConfigDocument {
                newline,
                ..ConfigDocument::default()
            },
            current: None,
            seen: HashMap::new(),
            pending: None,
        }
    }

    fn feed(&mut self, line_num: usize, raw: &str) {
        // Inside a continuation nothing is interpreted, not even headers
        if let Some(mut pending) = self.pending.take() {
            pending.raw.push_str(raw);
            let more = continues(raw);
            pending.segments.push(segment(raw, more).to_string());
            if more {
                self.pending = Some(pending);
            } else {
                self.finish_entry(pending);
            }
            return;
        }

        let trimmed = raw.trim();

        if trimmed.is_empty() {
            self.push(Line::Blank(raw.to_string()));
            return;
        }

        if trimmed.starts_with('#') {
            self.push(Line::Comment(raw.to_string()));
            return;
        }

        if let Some(raw_name) = header_name(trimmed) {
            self.open_stanza(line_num, raw, raw_name);
            return;
        }

        if let Some((key, value)) = trimmed.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                let orphan = self.current.is_none();
                if orphan {
                    self.doc.diagnostics.push(Diagnostic::OrphanKey {
                        line: line_num,
                        key: key.to_string(),
                    });
                }

                // Value as it appears on the physical line, terminator removed
                let value = value.trim_start();
                let more = continues(value);
                let pending = Continuation {
                    key: key.to_string(),
                    segments: vec![segment(value, more).to_string()],
                    raw: raw.to_string(),
                    orphan,
                };
                if more {
                    self.pending = Some(pending);
                } else {
                    self.finish_entry(pending);
                }
                return;
            }
        }

        self.doc.diagnostics.push(Diagnostic::Unparsed {
            line: line_num,
            content: trimmed.to_string(),
        });
        self.push(Line::Unparsed(raw.to_string()));
    }

    fn open_stanza(&mut self, line_num: usize, raw: &str, raw_name: &str) {
        let name = decode_name(raw_name);

        if let Some(&existing) = self.seen.get(&name) {
            self.doc.diagnostics.push(Diagnostic::DuplicateStanza {
                line: line_num,
                name,
            });
            self.current = Some(existing);
            return;
        }

        let index = self.doc.stanzas.len();
        self.doc.stanzas.push(Stanza {
            name: name.clone(),
            index,
            header: Some(Header {
                raw: raw.to_string(),
                name: name.clone(),
            }),
            lines: Vec::new(),
            inserted: 0,
        });
        self.seen.insert(name, index);
        self.current = Some(index);
    }

    fn finish_entry(&mut self, pending: Continuation) {
        if pending.orphan {
            self.doc.preamble.push(Line::Unparsed(pending.raw));
            return;
        }
        self.push(Line::Entry(Entry {
            key: pending.key,
            value: pending.segments.join("\n"),
            raw: Some(pending.raw),
        }));
    }

    fn push(&mut self, line: Line) {
        match self.current {
            Some(index) => self.doc.stanzas[index].lines.push(line),
            None => self.doc.preamble.push(line),
        }
    }

    fn finish(mut self) -> ConfigDocument {
        // A file may end in the middle of a continuation
        if let Some(pending) = self.pending.take() {
            self.finish_entry(pending);
        }
        self.doc
    }
}

/// Return the raw stanza name if the trimmed line is a header.
fn header_name(trimmed: &str) -> Option<&str> {
    let inner = trimmed.strip_prefix('[')?.strip_suffix(']')?;
    if inner.contains(['[', ']']) {
        return None;
    }
    Some(inner)
}

/// Whether a value line ends with a continuation marker.
fn continues(text: &str) -> bool {
    text.trim_end().ends_with('\\')
}

/// The logical part of one physical value line.
fn segment(text: &str, continued: bool) -> &str {
    let text = text.trim_end();
    if continued {
        &text[..text.len() - 1]
    } else {
        text
    }
}
