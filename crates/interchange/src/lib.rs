//! acv-interchange: the format-agnostic value model and its codecs.
//!
//! Every payload the engine touches is parsed into a [`Value`] tree and
//! formatted back out of one. No codec-specific type crosses this crate's
//! boundary: JSON, XML and URL-encoded query text all map onto the same
//! closed sum type.
//!
//! # Public API
//!
//! - [`parse()`] -- text in a [`Format`] to a [`Value`], bounded by [`CodecLimits`]
//! - [`format()`] -- a [`Value`] back to text, optionally pretty-printed
//! - [`number::format_number`] -- the canonical number rendering shared by all codecs

pub mod error;
pub mod json;
pub mod number;
pub mod query;
pub mod value;
pub mod xml;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use error::{FormatError, ParseError};
pub use value::{Map, Value, ValueKind};

/// Wire formats the codecs understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Xml,
    Query,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Query => "query",
        }
    }

    /// Pick a codec from a file extension: `.json`, `.xml`, `.txt` (query).
    pub fn from_extension(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Format::Json),
            "xml" => Some(Format::Xml),
            "txt" => Some(Format::Query),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "xml" => Ok(Format::Xml),
            "query" => Ok(Format::Query),
            other => Err(format!(
                "unknown format '{}' (expected json, xml or query)",
                other
            )),
        }
    }
}

/// Size and nesting bounds enforced while parsing untrusted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecLimits {
    pub max_bytes: usize,
    pub max_depth: usize,
}

impl CodecLimits {
    pub const DEFAULT_MAX_BYTES: usize = 8 * 1024 * 1024;
    pub const DEFAULT_MAX_DEPTH: usize = 64;

    pub(crate) fn check_size(&self, format: Format, text: &str) -> Result<(), ParseError> {
        if text.len() > self.max_bytes {
            return Err(ParseError::new(
                format,
                format!(
                    "payload is {} bytes, limit is {} bytes",
                    text.len(),
                    self.max_bytes
                ),
                Some(self.max_bytes),
            ));
        }
        Ok(())
    }
}

impl Default for CodecLimits {
    fn default() -> Self {
        CodecLimits {
            max_bytes: Self::DEFAULT_MAX_BYTES,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Parse `text` in `format` into a value tree.
pub fn parse(text: &str, format: Format, limits: &CodecLimits) -> Result<Value, ParseError> {
    match format {
        Format::Json => json::parse(text, limits),
        Format::Xml => xml::parse(text, limits),
        Format::Query => query::parse(text, limits),
    }
}

/// Format a value tree as `format` text. `pretty` only affects JSON and XML.
pub fn format(value: &Value, format: Format, pretty: bool) -> Result<String, FormatError> {
    match format {
        Format::Json => Ok(json::format(value, pretty)),
        Format::Xml => xml::format(value, pretty),
        Format::Query => query::format(value),
    }
}
