//! Properties-format text handling
//!
//! Security properties are read from `key=value` files in the classic
//! properties syntax, where anything outside basic ASCII travels as a
//! `\uXXXX` escape. Writing a PIN into such a file without escaping it
//! corrupts non-ASCII code points on the way back in.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};

/// Escape a value for a properties file.
///
/// ASCII passes through, except the backslash, control characters and a
/// leading space. Every other code point becomes one `\uXXXX` escape per
/// UTF-16 unit.
pub fn escape_properties_value(text: &str) -> String {
    escape(text, false)
}

/// Escape a key: like a value, plus the `=`, `:`, `#`, `!` and space separators
pub fn escape_properties_key(text: &str) -> String {
    escape(text, true)
}

fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, ch) in text.chars().enumerate() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            ' ' if i == 0 || is_key => out.push_str("\\ "),
            '=' | ':' | '#' | '!' if is_key => {
                out.push('\\');
                out.push(ch);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    // Writing to a String cannot fail
                    let _ = write!(out, "\\u{:04X}", unit);
                }
            }
        }
    }
    out
}

/// Reverse [`escape_properties_value`]
pub fn unescape_properties_value(text: &str) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(text.len());
    let mut chars = text.char_indices();

    while let Some((offset, ch)) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u16; 2];
            units.extend_from_slice(ch.encode_utf16(&mut buf));
            continue;
        }

        let (_, escaped) = chars.next().ok_or(Error::MalformedEscape(offset))?;
        match escaped {
            'u' => {
                let mut value: u16 = 0;
                for _ in 0..4 {
                    let digit = chars
                        .next()
                        .and_then(|(_, d)| d.to_digit(16))
                        .ok_or(Error::MalformedEscape(offset))?;
                    value = (value << 4) | digit as u16;
                }
                units.push(value);
            }
            't' => units.push(u16::from(b'\t')),
            'n' => units.push(u16::from(b'\n')),
            'r' => units.push(u16::from(b'\r')),
            'f' => units.push(0x0c),
            other => {
                let mut buf = [0u16; 2];
                units.extend_from_slice(other.encode_utf16(&mut buf));
            }
        }
    }

    let decoded = String::from_utf16(&units).map_err(|_| Error::MalformedEscape(text.len()));
    units.zeroize();
    decoded
}

/// Parsed properties file. Values are zeroized on drop since they may hold PINs.
#[derive(Default)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse properties text
    pub fn parse(text: &str) -> Result<Self> {
        let mut properties = Self::new();
        for line in logical_lines(text) {
            let (key, value) = split_entry(&line);
            let key = unescape_properties_value(key)?;
            let value = unescape_properties_value(value)?;
            properties.set(key, value);
        }
        Ok(properties)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if let Some(mut old) = self.entries.insert(key.into(), value.into()) {
            old.zeroize();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as `key=value` lines, escaped
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(&escape_properties_key(key));
            out.push('=');
            out.push_str(&escape_properties_value(value));
            out.push('\n');
        }
        out
    }
}

impl Drop for Properties {
    fn drop(&mut self) {
        for value in self.entries.values_mut() {
            value.zeroize();
        }
    }
}

impl std::fmt::Debug for Properties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Properties")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Join continuation lines and drop comments and blanks. Lines may hold PINs.
fn logical_lines(text: &str) -> Vec<Zeroizing<String>> {
    let mut lines = Vec::new();
    let mut current: Option<Zeroizing<String>> = None;

    for raw in text.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let trimmed = raw.trim_start_matches([' ', '\t', '\x0c']);

        if current.is_none() && (trimmed.is_empty() || trimmed.starts_with(['#', '!'])) {
            continue;
        }

        let trailing = trimmed.chars().rev().take_while(|&c| c == '\\').count();
        let continues = trailing % 2 == 1;
        let body = if continues {
            &trimmed[..trimmed.len() - 1]
        } else {
            trimmed
        };

        let line = current.get_or_insert_with(|| Zeroizing::new(String::new()));
        line.push_str(body);

        if !continues {
            if let Some(done) = current.take() {
                lines.push(done);
            }
        }
    }

    if let Some(done) = current.take() {
        lines.push(done);
    }
    lines
}

/// Split a logical line into its still-escaped key and value
fn split_entry(line: &str) -> (&str, &str) {
    let is_space = |c: char| matches!(c, ' ' | '\t' | '\x0c');
    let mut escaped = false;
    let mut key_end = line.len();

    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || is_space(c) {
            key_end = i;
            break;
        }
    }

    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches(is_space);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches(is_space);
    }
    (key, rest)
}
