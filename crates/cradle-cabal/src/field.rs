//! Locating named fields inside the textual `setup-config` dump.
//!
//! The artifact is one large Haskell `show` rendering, so fields are found by name and their value
//! is recovered by bracket balancing rather than by parsing the whole blob.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("field `{field}` not found{}", substring_hint(.appears_as_substring))]
    NotFound {
        field: String,
        appears_as_substring: bool,
    },
    #[error("no bracketed value follows field `{field}`")]
    NoValue { field: String },
    #[error("value of field `{field}` has unbalanced brackets")]
    Unbalanced { field: String },
}

fn substring_hint(appears_as_substring: &bool) -> &'static str {
    if *appears_as_substring {
        " (the name occurs, but only inside another identifier)"
    } else {
        ""
    }
}

/// Returns the bracketed value following `name`, brackets included.
///
/// The span starts at the first opening bracket (`(`, `[` or `{`) at or after the field name and
/// runs to its matching closer. Brackets inside string and character literals are ignored.
pub fn extract_field<'a>(blob: &'a str, name: &str) -> Result<&'a str, FieldError> {
    let after_name = locate_field(blob, name)? + name.len();
    let open = find_opener(blob, after_name).ok_or_else(|| FieldError::NoValue {
        field: name.to_owned(),
    })?;
    balanced_span(blob, open).ok_or_else(|| FieldError::Unbalanced {
        field: name.to_owned(),
    })
}

/// Returns the raw value of a record field `name = <value>`, up to the next separator at the same
/// nesting depth.
///
/// Unlike [`extract_field`] this also works for bare values such as `Nothing` or `True`.
pub fn field_value<'a>(blob: &'a str, name: &str) -> Result<&'a str, FieldError> {
    let after_name = locate_field(blob, name)? + name.len();
    let rest = &blob[after_name..];
    let trimmed = rest.trim_start();
    let Some(value) = trimmed.strip_prefix('=') else {
        return Err(FieldError::NoValue {
            field: name.to_owned(),
        });
    };
    let start = after_name + (rest.len() - value.len());

    let mut scanner = Scanner::new(blob, start);
    let mut depth: Vec<u8> = Vec::new();
    while let Some((idx, byte)) = scanner.next_structural() {
        match byte {
            b'(' | b'[' | b'{' => depth.push(closer_for(byte)),
            b')' | b']' | b'}' => match depth.last() {
                Some(&expected) if expected == byte => {
                    depth.pop();
                }
                Some(_) => {
                    return Err(FieldError::Unbalanced {
                        field: name.to_owned(),
                    })
                }
                None => return Ok(blob[start..idx].trim()),
            },
            b',' if depth.is_empty() => return Ok(blob[start..idx].trim()),
            _ => {}
        }
    }
    if !depth.is_empty() || scanner.unterminated {
        return Err(FieldError::Unbalanced {
            field: name.to_owned(),
        });
    }
    Ok(blob[start..].trim())
}

/// Byte offset of the first whole-identifier occurrence of `name`.
fn locate_field(blob: &str, name: &str) -> Result<usize, FieldError> {
    let mut seen = false;
    for (idx, _) in blob.match_indices(name) {
        seen = true;
        let before = blob[..idx].chars().next_back();
        let after = blob[idx + name.len()..].chars().next();
        if !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char) {
            return Ok(idx);
        }
    }
    Err(FieldError::NotFound {
        field: name.to_owned(),
        appears_as_substring: seen,
    })
}

fn find_opener(blob: &str, from: usize) -> Option<usize> {
    let mut scanner = Scanner::new(blob, from);
    while let Some((idx, byte)) = scanner.next_structural() {
        if matches!(byte, b'(' | b'[' | b'{') {
            return Some(idx);
        }
    }
    None
}

/// The substring from the opener at `open` through its matching closer.
pub(crate) fn balanced_span(text: &str, open: usize) -> Option<&str> {
    let mut scanner = Scanner::new(text, open);
    let mut stack: Vec<u8> = Vec::new();
    while let Some((idx, byte)) = scanner.next_structural() {
        match byte {
            b'(' | b'[' | b'{' => stack.push(closer_for(byte)),
            b')' | b']' | b'}' => {
                if stack.pop() != Some(byte) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[open..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}

fn closer_for(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\''
}

/// Walks bytes outside of string and character literals.
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    unterminated: bool,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, pos: usize) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos,
            unterminated: false,
        }
    }

    /// Next bracket or comma outside a literal, with its offset.
    fn next_structural(&mut self) -> Option<(usize, u8)> {
        while self.pos < self.bytes.len() {
            let idx = self.pos;
            let byte = self.bytes[idx];
            self.pos += 1;
            match byte {
                b'"' => self.skip_literal(b'"'),
                // A quote directly after an identifier character is a prime (`foo'`), not a
                // character literal.
                b'\'' if idx == 0 || !is_ident_byte(self.bytes[idx - 1]) => {
                    self.skip_literal(b'\'')
                }
                b'(' | b')' | b'[' | b']' | b'{' | b'}' | b',' => return Some((idx, byte)),
                _ => {}
            }
        }
        None
    }

    fn skip_literal(&mut self, quote: u8) {
        while self.pos < self.bytes.len() {
            let byte = self.bytes[self.pos];
            self.pos += 1;
            if byte == b'\\' {
                self.pos += 1;
            } else if byte == quote {
                return;
            }
        }
        self.unterminated = true;
    }
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'\'' || byte >= 0x80
}
