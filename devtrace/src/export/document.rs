//! Assembles collected fragments into one parseable trace document.
//!
//! The document is a single JSON array: every record in arrival order,
//! each followed by `,\n`, closed by a trailing empty-object sentinel.
//! Zero collected fragments still produce a parseable `[{ }]`.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use crate::domain::{ExportError, Fragment};

pub struct DocumentWriter {
    legacy_fixups: bool,
}

impl DocumentWriter {
    pub fn new(legacy_fixups: bool) -> Self {
        Self { legacy_fixups }
    }

    /// Persist the wrapped document to `path` (append mode, created if
    /// absent). An I/O failure here is fatal to the run: without the
    /// wrapper no partial document can be safely finalized.
    pub fn write_to_path(&self, fragments: &[Fragment], path: &Path) -> Result<(), ExportError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ExportError::Open { path: path.to_path_buf(), source })?;
        let mut writer = BufWriter::new(file);

        self.write(fragments, &mut writer)
            .and_then(|()| writer.flush())
            .map_err(|source| ExportError::Write { path: path.to_path_buf(), source })?;

        let records: usize = fragments.iter().map(|f| f.records.len()).sum();
        info!("wrote {} records to {}", records, path.display());
        Ok(())
    }

    /// Write the document to any writer, preserving fragment arrival
    /// order.
    pub fn write<W: Write>(&self, fragments: &[Fragment], writer: &mut W) -> std::io::Result<()> {
        writer.write_all(b"[")?;
        for fragment in fragments {
            for record in &fragment.records {
                if self.legacy_fixups {
                    writer.write_all(legacy_normalize(record).as_bytes())?;
                } else {
                    writer.write_all(record.as_bytes())?;
                }
                writer.write_all(b",\n")?;
            }
        }
        writer.write_all(b"{ }]")?;
        Ok(())
    }
}

/// Textual fixups for records rendered by legacy producers.
///
/// Bare `True`/`False` tokens become JSON booleans and single-quote
/// string delimiters become double quotes; a double quote embedded in
/// a formerly single-quoted value is re-escaped, and a single quote
/// embedded in a double-quoted value is data and passes through
/// untouched. Idempotent on text that is already valid JSON.
pub fn legacy_normalize(input: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Bare,
        Single,
        Double,
    }

    let mut out = String::with_capacity(input.len());
    let mut state = State::Bare;
    let mut chars = input.char_indices();

    while let Some((at, c)) = chars.next() {
        match state {
            State::Bare => match c {
                '\'' => {
                    out.push('"');
                    state = State::Single;
                }
                '"' => {
                    out.push('"');
                    state = State::Double;
                }
                'T' if token_at(input, at, "True") => {
                    out.push_str("true");
                    for _ in 1.."True".len() {
                        chars.next();
                    }
                }
                'F' if token_at(input, at, "False") => {
                    out.push_str("false");
                    for _ in 1.."False".len() {
                        chars.next();
                    }
                }
                _ => out.push(c),
            },
            State::Single => match c {
                '\'' => {
                    out.push('"');
                    state = State::Bare;
                }
                // Embedded double quote must be escaped once the
                // delimiter becomes a double quote.
                '"' => out.push_str("\\\""),
                '\\' => match chars.next() {
                    // \' loses its meaning with the new delimiter.
                    Some((_, '\'')) => out.push('\''),
                    Some((_, next)) => {
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                },
                _ => out.push(c),
            },
            State::Double => match c {
                '"' => {
                    out.push('"');
                    state = State::Bare;
                }
                '\\' => {
                    out.push('\\');
                    if let Some((_, next)) = chars.next() {
                        out.push(next);
                    }
                }
                _ => out.push(c),
            },
        }
    }

    out
}

/// True if `token` sits at byte offset `at` as a standalone word.
fn token_at(input: &str, at: usize, token: &str) -> bool {
    if !input[at..].starts_with(token) {
        return false;
    }
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let before_ok = input[..at].chars().next_back().is_none_or(|c| !is_word(c));
    let after_ok = input[at + token.len()..].chars().next().is_none_or(|c| !is_word(c));
    before_ok && after_ok
}
