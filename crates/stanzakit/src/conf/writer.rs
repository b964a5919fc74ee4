//! Writer for stanza documents.
//!
//! Entries that were not touched are written from their source text, so a
//! document that needs no change comes out byte-for-byte identical. Edited
//! and inserted entries are rendered as `key = value`, with continuation
//! markers restored for multi-line values.

use crate::policy::Policy;
use crate::types::{ConfigDocument, Entry, Line, Stanza};
use std::path::Path;

/// Options for writing a document.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Drop `#` comment lines
    pub strip_comments: bool,
}

/// Write a document to a file.
pub fn write_file(doc: &ConfigDocument, path: &Path, options: &WriteOptions) -> std::io::Result<()> {
    let content = write_string(doc, options);
    std::fs::write(path, content)
}

/// Write a document to a string.
pub fn write_string(doc: &ConfigDocument, options: &WriteOptions) -> String {
    let nl = doc.newline().as_str();
    let mut output = String::new();

    for line in doc.preamble() {
        write_line(&mut output, line, options, nl);
    }

    for stanza in &doc.stanzas {
        write_stanza(&mut output, stanza, options, nl);
    }

    output
}

/// Apply a policy to every stanza and return the edited document.
pub fn apply(doc: &ConfigDocument, policy: &dyn Policy) -> ConfigDocument {
    let mut edited = doc.clone();
    edited.stanzas = doc
        .stanzas
        .iter()
        .cloned()
        .map(|stanza| {
            let index = stanza.index;
            let mut stanza = policy.apply(stanza);
            stanza.index = index;
            stanza
        })
        .collect();
    edited
}

/// Apply a policy and serialize the result.
pub fn rewrite(doc: &ConfigDocument, policy: &dyn Policy) -> String {
    write_string(&apply(doc, policy), &WriteOptions::default())
}

/// Write a single stanza, header first.
fn write_stanza(output: &mut String, stanza: &Stanza, options: &WriteOptions, nl: &str) {
    match &stanza.header {
        Some(header) if header.name == stanza.name => push_text(output, &header.raw, nl),
        _ => push_text(output, &format!("[{}]{nl}", stanza.name), nl),
    }

    for line in stanza.lines() {
        write_line(output, line, options, nl);
    }
}

fn write_line(output: &mut String, line: &Line, options: &WriteOptions, nl: &str) {
    match line {
        Line::Entry(entry) => match &entry.raw {
            Some(raw) => push_text(output, raw, nl),
            None => push_text(output, &render_entry(entry, nl), nl),
        },
        Line::Comment(raw) => {
            if !options.strip_comments {
                push_text(output, raw, nl);
            }
        }
        Line::Blank(raw) | Line::Unparsed(raw) => push_text(output, raw, nl),
    }
}

/// Render an entry that has no source text.
fn render_entry(entry: &Entry, nl: &str) -> String {
    let value = entry.value.replace('\n', &format!("\\{nl}"));
    format!("{} = {}{nl}", entry.key, value)
}

/// Append text, first terminating a previous line that had no terminator.
fn push_text(output: &mut String, text: &str, nl: &str) {
    if !output.is_empty() && !output.ends_with('\n') {
        output.push_str(nl);
    }
    output.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::parse_string;
    use crate::policy::{EnsureValue, RenameKey};

    const SAMPLE: &str = "# Saved searches\n\
[Errors%20Last%20Hour]\n\
search = index=main error \\\n\
| stats count by host\n\
dispatch.earliest_time = -1h\n\
\n\
# keep me\n\
[]\n\
[quiet]\n";

    #[test]
    fn test_identity_round_trip_is_byte_identical() {
        let doc = parse_string(SAMPLE);
        assert_eq!(write_string(&doc, &WriteOptions::default()), SAMPLE);
        assert_eq!(rewrite(&doc, &|s: Stanza| s), SAMPLE);
    }

    #[test]
    fn test_round_trip_without_final_newline_and_crlf() {
        let content = "[a]\r\nkey = v\r\n[b]\r\nx = y";
        let doc = parse_string(content);
        assert_eq!(write_string(&doc, &WriteOptions::default()), content);
    }

    #[test]
    fn test_disable_inserts_after_header() {
        let doc = parse_string("[s]\nsearch = index=main\n");
        let output = rewrite(&doc, &EnsureValue::disabled());
        assert_eq!(output, "[s]\ndisabled = 1\nsearch = index=main\n");
    }

    #[test]
    fn test_disable_is_idempotent() {
        let doc = parse_string(SAMPLE);
        let once = rewrite(&doc, &EnsureValue::disabled());
        let twice = rewrite(&parse_string(&once), &EnsureValue::disabled());

        assert_eq!(once, twice);
        assert_eq!(once.matches("disabled = 1").count(), 3);
    }

    #[test]
    fn test_disable_updates_existing_value_in_place() {
        let doc = parse_string("[s]\nsearch = x\ndisabled=0\ncron_schedule = * * * * *\n");
        let output = rewrite(&doc, &EnsureValue::disabled());
        assert_eq!(
            output,
            "[s]\nsearch = x\ndisabled = 1\ncron_schedule = * * * * *\n"
        );
    }

    #[test]
    fn test_disable_leaves_already_disabled_bytes() {
        let content = "[s]\ndisabled=1\n";
        let doc = parse_string(content);
        assert_eq!(rewrite(&doc, &EnsureValue::disabled()), content);
    }

    #[test]
    fn test_zero_key_stanza_without_newline() {
        let doc = parse_string("[s]");
        assert_eq!(
            rewrite(&doc, &EnsureValue::disabled()),
            "[s]\ndisabled = 1\n"
        );
    }

    #[test]
    fn test_edited_multiline_value_keeps_continuations() {
        let doc = parse_string("[s]\nsearch = a \\\n| b \\\n| c\n");
        let output = rewrite(&doc, &RenameKey::new("search", "qualifiedSearch"));
        assert_eq!(output, "[s]\nqualifiedSearch = a \\\n| b \\\n| c\n");
    }

    #[test]
    fn test_strip_comments() {
        let doc = parse_string("# a\n[s]\n# b\nkey = v\n");
        let options = WriteOptions {
            strip_comments: true,
        };
        assert_eq!(write_string(&doc, &options), "[s]\nkey = v\n");
    }

    #[test]
    fn test_renamed_stanza_gets_new_header() {
        let doc = parse_string("[old]\nkey = v\n");
        let output = rewrite(&doc, &|mut s: Stanza| {
            s.name = "new".to_string();
            s
        });
        assert_eq!(output, "[new]\nkey = v\n");
    }

    #[test]
    fn test_rewrite_is_deterministic() {
        let doc = parse_string(SAMPLE);
        let outputs: Vec<_> = (0..5)
            .map(|_| rewrite(&doc, &EnsureValue::disabled()))
            .collect();
        assert!(outputs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.conf");
        let doc = parse_string("[s]\nkey = v\n");

        write_file(&doc, &path, &WriteOptions::default()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[s]\nkey = v\n");
    }
}
