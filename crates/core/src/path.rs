//! Source and target path grammar.
//!
//! ```text
//! path    := "" | "." | ["$"] first? segment*
//! first   := key
//! segment := "." key | "[" digits "]" | "[*]" | "[\"" quoted "\"]"
//! key     := one or more chars other than . [ ] " and whitespace
//! ```
//!
//! `""` and `"."` address the current scope. A leading `$` anchors the path
//! at the input document root. `[*]` binds an enclosing split index; target
//! paths accept neither `$` nor `[*]`.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {position}")]
pub struct PathError {
    pub message: String,
    pub position: usize,
}

impl PathError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        PathError {
            message: message.into(),
            position,
        }
    }
}

/// An address into the input tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePath {
    pub absolute: bool,
    pub segments: Vec<PathSegment>,
}

/// An address into the output tree, relative to the current output scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetPath {
    pub segments: Vec<PathSegment>,
}

fn is_key_char(c: char) -> bool {
    !matches!(c, '.' | '[' | ']' | '"') && !c.is_whitespace()
}

/// Parse the shared grammar. Returns `(absolute, segments)`.
fn parse_segments(text: &str) -> Result<(bool, Vec<PathSegment>), PathError> {
    if text.is_empty() || text == "." {
        return Ok((false, Vec::new()));
    }
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut i = 0;
    let mut absolute = false;
    let mut segments = Vec::new();

    if chars[0].1 == '$' {
        absolute = true;
        i = 1;
    } else if is_key_char(chars[0].1) {
        let (key, next) = read_key(&chars, 0);
        segments.push(PathSegment::Key(key));
        i = next;
    }

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            '.' => {
                let (key, next) = read_key(&chars, i + 1);
                if key.is_empty() {
                    return Err(PathError::new("expected a key after '.'", pos));
                }
                segments.push(PathSegment::Key(key));
                i = next;
            }
            '[' => {
                let (segment, next) = read_bracket(text, &chars, i)?;
                segments.push(segment);
                i = next;
            }
            c if c.is_whitespace() => {
                return Err(PathError::new("whitespace is not allowed in a path", pos));
            }
            other => {
                return Err(PathError::new(
                    format!("unexpected '{}'; segments start with '.' or '['", other),
                    pos,
                ));
            }
        }
    }
    Ok((absolute, segments))
}

fn read_key(chars: &[(usize, char)], start: usize) -> (String, usize) {
    let mut i = start;
    let mut key = String::new();
    while i < chars.len() && is_key_char(chars[i].1) {
        key.push(chars[i].1);
        i += 1;
    }
    (key, i)
}

fn read_bracket(
    text: &str,
    chars: &[(usize, char)],
    open: usize,
) -> Result<(PathSegment, usize), PathError> {
    let pos = chars[open].0;
    let mut i = open + 1;
    match chars.get(i).map(|(_, c)| *c) {
        Some('*') => {
            if chars.get(i + 1).map(|(_, c)| *c) != Some(']') {
                return Err(PathError::new("expected ']' after '[*'", pos));
            }
            Ok((PathSegment::Wildcard, i + 2))
        }
        Some('"') => {
            i += 1;
            let start = i;
            while i < chars.len() && chars[i].1 != '"' {
                i += 1;
            }
            if i >= chars.len() {
                return Err(PathError::new("unterminated quoted key", pos));
            }
            if chars.get(i + 1).map(|(_, c)| *c) != Some(']') {
                return Err(PathError::new("expected ']' after quoted key", chars[i].0));
            }
            if i == start {
                return Err(PathError::new("empty quoted key", pos));
            }
            let key = text[chars[start].0..chars[i].0].to_string();
            Ok((PathSegment::Key(key), i + 2))
        }
        Some(c) if c.is_ascii_digit() => {
            let start = i;
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
            if chars.get(i).map(|(_, c)| *c) != Some(']') {
                return Err(PathError::new("expected ']' after index", pos));
            }
            let digits = &text[chars[start].0..chars[i].0];
            let index = digits
                .parse::<usize>()
                .map_err(|_| PathError::new(format!("index {} is out of range", digits), pos))?;
            Ok((PathSegment::Index(index), i + 1))
        }
        _ => Err(PathError::new(
            "expected an index, '*' or a quoted key after '['",
            pos,
        )),
    }
}

impl SourcePath {
    pub fn parse(text: &str) -> Result<SourcePath, PathError> {
        let (absolute, segments) = parse_segments(text)?;
        Ok(SourcePath { absolute, segments })
    }

    pub fn wildcard_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PathSegment::Wildcard))
            .count()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            PathSegment::Key(k) => Some(k.as_str()),
            _ => None,
        })
    }
}

impl TargetPath {
    pub fn parse(text: &str) -> Result<TargetPath, PathError> {
        let (absolute, segments) = parse_segments(text)?;
        if absolute {
            return Err(PathError::new(
                "target paths are relative to the output scope and cannot start with '$'",
                0,
            ));
        }
        if segments.iter().any(|s| matches!(s, PathSegment::Wildcard)) {
            return Err(PathError::new("target paths cannot contain '[*]'", 0));
        }
        Ok(TargetPath { segments })
    }

    /// The scope root itself (`""` or `"."`).
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            PathSegment::Key(k) => Some(k.as_str()),
            _ => None,
        })
    }
}

fn needs_quoting(key: &str) -> bool {
    !key.chars().all(is_key_char)
}

fn write_segments(
    f: &mut fmt::Formatter<'_>,
    absolute: bool,
    segments: &[PathSegment],
) -> fmt::Result {
    if absolute {
        f.write_str("$")?;
    } else if segments.is_empty() {
        return f.write_str(".");
    }
    for (i, segment) in segments.iter().enumerate() {
        match segment {
            PathSegment::Key(key) if needs_quoting(key) => write!(f, "[\"{}\"]", key)?,
            PathSegment::Key(key) if i == 0 && !absolute => f.write_str(key)?,
            PathSegment::Key(key) => write!(f, ".{}", key)?,
            PathSegment::Index(index) => write!(f, "[{}]", index)?,
            PathSegment::Wildcard => f.write_str("[*]")?,
        }
    }
    Ok(())
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_segments(f, self.absolute, &self.segments)
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_segments(f, false, &self.segments)
    }
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '.' | '[' | ']')
}

/// Repair a malformed path by dropping whitespace around delimiters, empty
/// segments (`a..b`) and dots in front of brackets or at the end (`a.[0]`,
/// `a.`). Returns the canonical form of the repaired path, or `None` when
/// the text is already well formed or cannot be repaired without guessing.
pub fn repair(text: &str) -> Option<String> {
    if SourcePath::parse(text).is_ok() || text.contains('"') {
        return None;
    }

    let chars: Vec<char> = text.chars().collect();
    let mut cleaned = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        if c.is_whitespace() {
            let prev = cleaned.chars().last();
            let next = chars[i + 1..].iter().copied().find(|c| !c.is_whitespace());
            let at_boundary = prev.map_or(true, is_delimiter) || next.map_or(true, is_delimiter);
            if at_boundary {
                continue;
            }
            // Whitespace inside a key: leave it so the parse below fails.
            cleaned.push(c);
            continue;
        }
        if c == '.' && cleaned.ends_with('.') {
            continue;
        }
        if c == '[' && cleaned.ends_with('.') {
            cleaned.pop();
        }
        cleaned.push(c);
    }
    while cleaned.len() > 1 && cleaned.ends_with('.') {
        cleaned.pop();
    }

    SourcePath::parse(&cleaned).ok().map(|p| p.to_string())
}
