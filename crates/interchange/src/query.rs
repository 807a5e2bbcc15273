//! URL-encoded query codec with bracket notation.
//!
//! `a[b][0]=x` nests objects and arrays, `a[]=x` appends, and a repeated
//! plain key collects its values into an array. Every leaf is a string.
//! Pair decoding is delegated to `serde_urlencoded`; this module only
//! interprets the decoded keys.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::error::{FormatError, ParseError};
use crate::value::{Map, Value};
use crate::{CodecLimits, Format};

/// One bracket segment of a decoded key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Append,
}

/// Intermediate tree. Arrays are sparse while parsing and compacted in
/// index order at the end.
#[derive(Debug)]
enum Node {
    Vacant,
    Leaf(String),
    Object(IndexMap<String, Node>),
    Array(BTreeMap<usize, Node>),
}

impl Node {
    fn into_value(self) -> Value {
        match self {
            Node::Vacant => Value::Null,
            Node::Leaf(s) => Value::String(s),
            Node::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect(),
            ),
            Node::Array(items) => Value::Array(items.into_values().map(Node::into_value).collect()),
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            Node::Vacant => "nothing",
            Node::Leaf(_) => "a value",
            Node::Object(_) => "an object",
            Node::Array(_) => "an array",
        }
    }

    fn insert(&mut self, segments: &[Segment], leaf: String) -> Result<(), String> {
        let Some((segment, rest)) = segments.split_first() else {
            return self.set_leaf(leaf);
        };
        match segment {
            Segment::Key(key) => {
                if matches!(self, Node::Vacant) {
                    *self = Node::Object(IndexMap::new());
                }
                match self {
                    Node::Object(map) => map
                        .entry(key.clone())
                        .or_insert(Node::Vacant)
                        .insert(rest, leaf),
                    other => Err(format!("key '{}' used on {}", key, other.shape())),
                }
            }
            Segment::Index(index) => {
                if matches!(self, Node::Vacant) {
                    *self = Node::Array(BTreeMap::new());
                }
                match self {
                    Node::Array(items) => items.entry(*index).or_insert(Node::Vacant).insert(rest, leaf),
                    other => Err(format!("index [{}] used on {}", index, other.shape())),
                }
            }
            Segment::Append => {
                if matches!(self, Node::Vacant) {
                    *self = Node::Array(BTreeMap::new());
                }
                match self {
                    Node::Array(items) => {
                        let next = items.keys().next_back().map_or(0, |last| last + 1);
                        items.entry(next).or_insert(Node::Vacant).insert(rest, leaf)
                    }
                    other => Err(format!("[] used on {}", other.shape())),
                }
            }
        }
    }

    /// A repeated key turns its slot into an array of the values seen.
    fn set_leaf(&mut self, leaf: String) -> Result<(), String> {
        match self {
            Node::Vacant => {
                *self = Node::Leaf(leaf);
                Ok(())
            }
            Node::Leaf(existing) => {
                let first = std::mem::take(existing);
                let mut items = BTreeMap::new();
                items.insert(0, Node::Leaf(first));
                items.insert(1, Node::Leaf(leaf));
                *self = Node::Array(items);
                Ok(())
            }
            Node::Array(items) if items.values().all(|n| matches!(n, Node::Leaf(_))) => {
                let next = items.keys().next_back().map_or(0, |last| last + 1);
                items.insert(next, Node::Leaf(leaf));
                Ok(())
            }
            other => Err(format!("value assigned to {}", other.shape())),
        }
    }
}

/// Split a decoded key such as `a[b][0][]` into segments.
fn parse_key(key: &str) -> Result<Vec<Segment>, String> {
    let (base, mut rest) = match key.find('[') {
        Some(pos) => key.split_at(pos),
        None => (key, ""),
    };
    if base.is_empty() {
        return Err(format!("key '{}' has no name before its brackets", key));
    }
    if base.contains(']') {
        return Err(format!("unbalanced ']' in key '{}'", key));
    }

    let mut segments = vec![Segment::Key(base.to_string())];
    while !rest.is_empty() {
        let Some(inner_and_tail) = rest.strip_prefix('[') else {
            return Err(format!("unexpected text after ']' in key '{}'", key));
        };
        let Some(close) = inner_and_tail.find(']') else {
            return Err(format!("unclosed '[' in key '{}'", key));
        };
        let inner = &inner_and_tail[..close];
        if inner.contains('[') {
            return Err(format!("nested '[' in key '{}'", key));
        }
        let segment = if inner.is_empty() {
            Segment::Append
        } else if inner.bytes().all(|b| b.is_ascii_digit()) {
            match inner.parse::<usize>() {
                Ok(i) => Segment::Index(i),
                Err(_) => return Err(format!("index [{}] is out of range", inner)),
            }
        } else {
            Segment::Key(inner.to_string())
        };
        segments.push(segment);
        rest = &inner_and_tail[close + 1..];
    }
    Ok(segments)
}

pub fn parse(text: &str, limits: &CodecLimits) -> Result<Value, ParseError> {
    limits.check_size(Format::Query, text)?;

    let (body, base_offset) = match text.strip_prefix('?') {
        Some(stripped) => (stripped, 1),
        None => (text, 0),
    };

    let mut root = Node::Object(IndexMap::new());
    let mut offset = base_offset;
    for piece in body.split('&') {
        let piece_offset = offset;
        offset += piece.len() + 1;
        if piece.is_empty() {
            continue;
        }
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(piece)
            .map_err(|e| ParseError::new(Format::Query, e.to_string(), Some(piece_offset)))?;
        for (key, value) in pairs {
            let segments = parse_key(&key)
                .map_err(|msg| ParseError::new(Format::Query, msg, Some(piece_offset)))?;
            if segments.len() > limits.max_depth {
                return Err(ParseError::new(
                    Format::Query,
                    format!("nesting depth exceeds limit of {}", limits.max_depth),
                    Some(piece_offset),
                ));
            }
            root.insert(&segments, value).map_err(|msg| {
                ParseError::new(
                    Format::Query,
                    format!("conflicting shapes for '{}': {}", key, msg),
                    Some(piece_offset),
                )
            })?;
        }
    }
    Ok(root.into_value())
}

/// Render an object as a query string. Nested containers flatten to
/// bracket keys; empty containers have no query form and are omitted.
pub fn format(value: &Value) -> Result<String, FormatError> {
    let Value::Object(map) = value else {
        return Err(FormatError::new(
            Format::Query,
            format!("root must be an object, found {}", value.kind()),
        ));
    };
    let mut pairs: Vec<(String, String)> = Vec::new();
    flatten_object(map, None, &mut pairs)?;
    serde_urlencoded::to_string(&pairs).map_err(|e| FormatError::new(Format::Query, e.to_string()))
}

fn flatten_object(
    map: &Map,
    prefix: Option<&str>,
    pairs: &mut Vec<(String, String)>,
) -> Result<(), FormatError> {
    for (key, item) in map {
        if key.is_empty() || key.contains(['[', ']']) {
            return Err(FormatError::new(
                Format::Query,
                format!("key '{}' cannot be expressed in bracket notation", key),
            ));
        }
        let name = match prefix {
            Some(p) => format!("{}[{}]", p, key),
            None => key.clone(),
        };
        flatten(item, name, pairs)?;
    }
    Ok(())
}

fn flatten(value: &Value, name: String, pairs: &mut Vec<(String, String)>) -> Result<(), FormatError> {
    match value {
        Value::Object(map) => flatten_object(map, Some(&name), pairs),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten(item, format!("{}[{}]", name, i), pairs)?;
            }
            Ok(())
        }
        scalar => {
            pairs.push((name, scalar.scalar_text().unwrap_or_default()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> Value {
        parse(text, &CodecLimits::default()).unwrap()
    }

    fn s(text: &str) -> Value {
        Value::from(text)
    }

    #[test]
    fn nested_brackets_build_objects_and_arrays() {
        let v = parse_ok("user[name]=Jane+Doe&user[tags][0]=a&user[tags][1]=b&page=2");
        let user = v.get("user").unwrap();
        assert_eq!(user.get("name"), Some(&s("Jane Doe")));
        assert_eq!(user.get("tags"), Some(&Value::Array(vec![s("a"), s("b")])));
        assert_eq!(v.get("page"), Some(&s("2")));
    }

    #[test]
    fn append_and_repeated_keys_make_arrays() {
        let v = parse_ok("?x[]=1&x[]=2&y=a&y=b&y=c");
        assert_eq!(v.get("x"), Some(&Value::Array(vec![s("1"), s("2")])));
        assert_eq!(v.get("y"), Some(&Value::Array(vec![s("a"), s("b"), s("c")])));
    }

    #[test]
    fn sparse_indices_are_compacted_in_order() {
        let v = parse_ok("a[5]=late&a[2]=early");
        assert_eq!(v.get("a"), Some(&Value::Array(vec![s("early"), s("late")])));
    }

    #[test]
    fn append_with_nested_keys() {
        let v = parse_ok("items[][sku]=A&items[][sku]=B");
        let items = v.get("items").unwrap().as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].get("sku"), Some(&s("B")));
    }

    #[test]
    fn percent_decoding_and_empty_values() {
        let v = parse_ok("q=a%26b%3Dc&flag&empty=");
        assert_eq!(v.get("q"), Some(&s("a&b=c")));
        assert_eq!(v.get("flag"), Some(&s("")));
        assert_eq!(v.get("empty"), Some(&s("")));
        assert_eq!(parse_ok(""), Value::object());
    }

    #[test]
    fn malformed_keys_are_parse_errors() {
        for bad in ["a[b=1", "[x]=1", "a]b=1", "a[b]c=1", "a[[b]]=1"] {
            let err = parse(bad, &CodecLimits::default()).unwrap_err();
            assert_eq!(err.format, Format::Query, "{:?}", bad);
            assert!(err.offset.is_some());
        }
    }

    #[test]
    fn conflicting_shapes_are_parse_errors() {
        let err = parse("a=1&a[b]=2", &CodecLimits::default()).unwrap_err();
        assert!(err.message.contains("conflicting"));
        assert_eq!(err.offset, Some(4));
        assert!(parse("a[b]=1&a[0]=2", &CodecLimits::default()).is_err());
        assert!(parse("a[b]=1&a=2", &CodecLimits::default()).is_err());
    }

    #[test]
    fn depth_limit_applies_to_bracket_nesting() {
        let limits = CodecLimits {
            max_bytes: 1024,
            max_depth: 3,
        };
        assert!(parse("a[b][c]=1", &limits).is_ok());
        assert!(parse("a[b][c][d]=1", &limits).is_err());
    }

    #[test]
    fn formats_nested_values_as_bracket_keys() {
        let v = parse_ok("a[b][0]=x&a[b][1]=y&c=z");
        let text = format(&v).unwrap();
        assert_eq!(text, "a%5Bb%5D%5B0%5D=x&a%5Bb%5D%5B1%5D=y&c=z");
    }

    #[test]
    fn formats_scalars_canonically() {
        let mut map = Map::new();
        map.insert("n".to_string(), Value::Number(18.25));
        map.insert("b".to_string(), Value::Bool(true));
        map.insert("z".to_string(), Value::Null);
        map.insert("s".to_string(), s("a b&c"));
        assert_eq!(format(&Value::Object(map)).unwrap(), "n=18.25&b=true&z=&s=a+b%26c");
    }

    #[test]
    fn root_must_be_an_object() {
        assert!(format(&Value::Array(vec![])).is_err());
        assert!(format(&s("x")).is_err());
    }
}
