//! XML codec.
//!
//! The document element becomes a single-key object. Attributes are stored
//! under `@name` keys, text next to attributes or child elements under
//! `#text`, and repeated sibling tags collapse into an array. Text-only
//! elements are typed by inference: `true`/`false`, JSON number syntax,
//! otherwise string.
//!
//! Text is kept byte-exact. Whitespace-only runs between child elements are
//! layout and are dropped; CDATA sections are always kept. Names may carry
//! one namespace prefix (`soap:Body`, `@xmlns:soap`).

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{FormatError, ParseError};
use crate::number::parse_number;
use crate::value::{Map, Value};
use crate::{CodecLimits, Format};

/// Key prefix for attributes.
pub const ATTRIBUTE_PREFIX: char = '@';
/// Key holding an element's own text when it also has attributes or children.
pub const TEXT_KEY: &str = "#text";

const WRAPPER: &str = "root";
const ARRAY_ITEM: &str = "item";

/// A name without a namespace prefix.
fn is_local_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// True when `name` can be used as an element or attribute name: a local
/// name, optionally qualified by a single `prefix:`.
pub fn is_xml_name(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_local_name(prefix) && is_local_name(local),
        None => is_local_name(name),
    }
}

/// True when `key` is a valid object key for XML output: an element name,
/// `@` followed by an attribute name, or exactly `#text`.
pub fn is_xml_key(key: &str) -> bool {
    if key == TEXT_KEY {
        return true;
    }
    match key.strip_prefix(ATTRIBUTE_PREFIX) {
        Some(attr) => is_xml_name(attr),
        None => is_xml_name(key),
    }
}

/// Infer a scalar from element or attribute text.
fn infer(text: &str) -> Value {
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match parse_number(text) {
            Some(n) => Value::Number(n),
            None => Value::String(text.to_string()),
        },
    }
}

/// One character-data run inside an element.
struct TextRun {
    content: String,
    cdata: bool,
}

impl TextRun {
    fn is_layout(&self) -> bool {
        !self.cdata && self.content.chars().all(char::is_whitespace)
    }
}

/// An element under construction.
struct Frame {
    name: String,
    attributes: Map,
    children: Map,
    text: Vec<TextRun>,
}

impl Frame {
    fn open(start: &BytesStart<'_>, offset: usize) -> Result<Frame, ParseError> {
        let name = decode_name(start.name().as_ref(), offset)?;
        let mut attributes = Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ParseError::new(Format::Xml, e.to_string(), Some(offset)))?;
            let key = decode_name(attr.key.as_ref(), offset)?;
            let value = attr
                .unescape_value()
                .map_err(|e| ParseError::new(Format::Xml, e.to_string(), Some(offset)))?;
            attributes.insert(format!("{}{}", ATTRIBUTE_PREFIX, key), infer(&value));
        }
        Ok(Frame {
            name,
            attributes,
            children: Map::new(),
            text: Vec::new(),
        })
    }

    fn add_child(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = std::mem::take(existing);
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.children.insert(name, value);
            }
        }
    }

    /// Character data of the element. Between child elements only
    /// non-layout runs count.
    fn text(&self) -> String {
        let has_children = !self.children.is_empty();
        self.text
            .iter()
            .filter(|run| !(has_children && run.is_layout()))
            .map(|run| run.content.as_str())
            .collect()
    }

    fn close(self) -> (String, Value) {
        let text = self.text();
        let value = if self.attributes.is_empty() && self.children.is_empty() {
            if text.is_empty() {
                Value::Null
            } else {
                infer(&text)
            }
        } else {
            let mut map = self.attributes;
            if !text.is_empty() {
                map.insert(TEXT_KEY.to_string(), infer(&text));
            }
            map.extend(self.children);
            Value::Object(map)
        };
        (self.name, value)
    }
}

fn decode_name(raw: &[u8], offset: usize) -> Result<String, ParseError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| ParseError::new(Format::Xml, e.to_string(), Some(offset)))
}

pub fn parse(text: &str, limits: &CodecLimits) -> Result<Value, ParseError> {
    limits.check_size(Format::Xml, text)?;

    let mut reader = Reader::from_str(text);

    let mut stack: Vec<Frame> = Vec::new();
    let mut document: Option<(String, Value)> = None;

    loop {
        let offset = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| {
            ParseError::new(
                Format::Xml,
                e.to_string(),
                Some(reader.error_position() as usize),
            )
        })?;
        match event {
            Event::Start(start) => {
                if stack.len() >= limits.max_depth {
                    return Err(ParseError::new(
                        Format::Xml,
                        format!("nesting depth exceeds limit of {}", limits.max_depth),
                        Some(offset),
                    ));
                }
                if stack.is_empty() && document.is_some() {
                    return Err(multiple_roots(offset));
                }
                stack.push(Frame::open(&start, offset)?);
            }
            Event::Empty(start) => {
                let frame = Frame::open(&start, offset)?;
                let (name, value) = frame.close();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, value),
                    None if document.is_some() => return Err(multiple_roots(offset)),
                    None => document = Some((name, value)),
                }
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    return Err(ParseError::new(
                        Format::Xml,
                        "unexpected closing tag",
                        Some(offset),
                    ));
                };
                let (name, value) = frame.close();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, value),
                    None => document = Some((name, value)),
                }
            }
            Event::Text(t) => {
                let content = t
                    .unescape()
                    .map_err(|e| ParseError::new(Format::Xml, e.to_string(), Some(offset)))?;
                push_text(&mut stack, content.into_owned(), false, offset)?;
            }
            Event::CData(c) => {
                let content = String::from_utf8(c.into_inner().into_owned())
                    .map_err(|e| ParseError::new(Format::Xml, e.to_string(), Some(offset)))?;
                push_text(&mut stack, content, true, offset)?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctypes
            // carry no payload data.
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::new(
            Format::Xml,
            format!("unclosed element <{}>", open.name),
            Some(text.len()),
        ));
    }
    match document {
        Some((name, value)) => {
            let mut map = Map::new();
            map.insert(name, value);
            Ok(Value::Object(map))
        }
        None => Err(ParseError::new(
            Format::Xml,
            "document has no root element",
            Some(0),
        )),
    }
}

fn push_text(
    stack: &mut [Frame],
    content: String,
    cdata: bool,
    offset: usize,
) -> Result<(), ParseError> {
    if content.is_empty() {
        return Ok(());
    }
    let run = TextRun { content, cdata };
    match stack.last_mut() {
        Some(frame) => {
            frame.text.push(run);
            Ok(())
        }
        None if run.is_layout() => Ok(()),
        None => Err(ParseError::new(
            Format::Xml,
            "text outside the document element",
            Some(offset),
        )),
    }
}

fn multiple_roots(offset: usize) -> ParseError {
    ParseError::new(Format::Xml, "document has more than one root element", Some(offset))
}

/// Render a value as an XML document.
///
/// An object with exactly one non-array entry names the document element.
/// Anything else is wrapped in `<root>`; a bare array becomes `<item>`
/// children of the wrapper.
pub fn format(value: &Value, pretty: bool) -> Result<String, FormatError> {
    let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    if pretty {
        out.push('\n');
    }
    let document_element = match value {
        Value::Object(map) if map.len() == 1 => map
            .iter()
            .next()
            .filter(|(name, content)| !matches!(content, Value::Array(_)) && is_xml_name(name)),
        _ => None,
    };
    if let Some((name, content)) = document_element {
        write_element(&mut out, name, content, pretty, 0)?;
    } else if let Value::Array(items) = value {
        let mut wrapper = Map::new();
        wrapper.insert(ARRAY_ITEM.to_string(), Value::Array(items.clone()));
        write_element(&mut out, WRAPPER, &Value::Object(wrapper), pretty, 0)?;
    } else {
        write_element(&mut out, WRAPPER, value, pretty, 0)?;
    }
    if pretty {
        out.push('\n');
    }
    Ok(out)
}

fn write_element(
    out: &mut String,
    name: &str,
    value: &Value,
    pretty: bool,
    indent: usize,
) -> Result<(), FormatError> {
    if !is_xml_name(name) {
        return Err(FormatError::new(
            Format::Xml,
            format!("'{}' is not a valid element name", name),
        ));
    }
    match value {
        Value::Null => {
            out.push('<');
            out.push_str(name);
            out.push_str("/>");
        }
        Value::Array(_) => {
            return Err(FormatError::new(
                Format::Xml,
                format!("nested array under <{}> has no element form", name),
            ));
        }
        Value::Object(map) => {
            out.push('<');
            out.push_str(name);
            let mut text: Option<String> = None;
            let mut children = Vec::new();
            for (key, item) in map {
                if let Some(attr) = key.strip_prefix(ATTRIBUTE_PREFIX) {
                    if !is_xml_name(attr) {
                        return Err(FormatError::new(
                            Format::Xml,
                            format!("'{}' is not a valid attribute name", attr),
                        ));
                    }
                    let Some(attr_text) = item.scalar_text() else {
                        return Err(FormatError::new(
                            Format::Xml,
                            format!("attribute '{}' must hold a scalar", attr),
                        ));
                    };
                    out.push(' ');
                    out.push_str(attr);
                    out.push_str("=\"");
                    out.push_str(&escape(attr_text.as_str()));
                    out.push('"');
                } else if key == TEXT_KEY {
                    text = Some(item.scalar_text().ok_or_else(|| {
                        FormatError::new(Format::Xml, format!("{} of <{}> must be a scalar", TEXT_KEY, name))
                    })?);
                } else {
                    children.push((key.as_str(), item));
                }
            }

            let text = text.filter(|t| !t.is_empty());
            if children.is_empty() && text.is_none() {
                out.push_str("/>");
                return Ok(());
            }
            // Indenting beside text would add to it.
            let pretty = pretty && text.is_none();
            out.push('>');
            if let Some(t) = &text {
                out.push_str(&escape(t.as_str()));
            }
            for (key, item) in &children {
                write_child(out, key, item, pretty, indent + 1)?;
            }
            if !children.is_empty() && pretty {
                newline(out, indent);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        scalar => {
            let text = scalar.scalar_text().unwrap_or_default();
            out.push('<');
            out.push_str(name);
            if text.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                out.push_str(&escape(text.as_str()));
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
    Ok(())
}

/// A child entry: arrays expand to repeated siblings.
fn write_child(
    out: &mut String,
    name: &str,
    value: &Value,
    pretty: bool,
    indent: usize,
) -> Result<(), FormatError> {
    match value {
        Value::Array(items) => {
            for item in items {
                if pretty {
                    newline(out, indent);
                }
                write_element(out, name, item, pretty, indent)?;
            }
        }
        _ => {
            if pretty {
                newline(out, indent);
            }
            write_element(out, name, value, pretty, indent)?;
        }
    }
    Ok(())
}

fn newline(out: &mut String, indent: usize) {
    out.push('\n');
    for _ in 0..indent {
        out.push_str("  ");
    }
}
