//! Form field names such as `Items[0].Name` or `a[1][x.v]`.
//!
//! A key is a sequence of parts: names and integer indexes. `[]` is the
//! append slot and parses as index `-1`. Inside brackets `.` is literal;
//! outside it separates names.

use std::fmt::Write;

use crate::error::ResourceError;

/// Index standing for "the next free slot".
pub const APPEND_INDEX: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormKeyPart {
    Name(String),
    Index(i64),
}

impl FormKeyPart {
    pub fn name(s: &str) -> Self {
        FormKeyPart::Name(s.to_string())
    }
}

fn index_part(s: String) -> FormKeyPart {
    if s.is_empty() {
        return FormKeyPart::Index(APPEND_INDEX);
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        let trimmed = s.trim_start_matches('0');
        if trimmed.is_empty() {
            return FormKeyPart::Index(0);
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return FormKeyPart::Index(i);
        }
    }
    FormKeyPart::Name(s)
}

/// Split a form key into its parts.
pub fn parse_form_key(key: &str) -> Result<Vec<FormKeyPart>, ResourceError> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut open: Option<usize> = None;
    let mut after_close = false;

    for (i, c) in key.char_indices() {
        match c {
            '[' => {
                if open.is_some() {
                    return Err(ResourceError::MalformedKey(format!(
                        "un expected char key[{i}] = '['"
                    )));
                }
                if !cur.is_empty() {
                    parts.push(FormKeyPart::Name(std::mem::take(&mut cur)));
                }
                open = Some(i);
                after_close = false;
            }
            ']' => {
                if open.is_none() {
                    return Err(ResourceError::MalformedKey(format!("un expected key[{i}] = ']'")));
                }
                parts.push(index_part(std::mem::take(&mut cur)));
                open = None;
                after_close = true;
            }
            '.' if open.is_some() => cur.push(c),
            '.' => {
                if cur.is_empty() {
                    if after_close {
                        after_close = false;
                        continue;
                    }
                    return Err(ResourceError::MalformedKey(format!("un expected key[{i}] = '.'")));
                }
                parts.push(FormKeyPart::Name(std::mem::take(&mut cur)));
            }
            _ => {
                after_close = false;
                cur.push(c);
            }
        }
    }

    if let Some(start) = open {
        return Err(ResourceError::MalformedKey(format!(
            "unclosed index name started at key[{start}]"
        )));
    }
    if !cur.is_empty() {
        parts.push(FormKeyPart::Name(cur));
    }
    Ok(parts)
}

/// Render parts back into a key. Names holding a `.` are bracketed.
pub fn render_form_key(parts: &[FormKeyPart]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        match part {
            FormKeyPart::Index(APPEND_INDEX) => out.push_str("[]"),
            FormKeyPart::Index(n) => {
                let _ = write!(out, "[{n}]");
            }
            FormKeyPart::Name(n) if n.contains('.') || n.contains('[') || n.contains(']') => {
                let _ = write!(out, "[{n}]");
            }
            FormKeyPart::Name(n) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(n);
            }
        }
    }
    out
}
