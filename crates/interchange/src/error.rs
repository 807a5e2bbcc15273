use thiserror::Error;

use crate::Format;

/// Malformed input text for the declared format. Fatal to the conversion
/// it belongs to; no partial value is ever returned alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{format} parse error: {message}")]
pub struct ParseError {
    pub format: Format,
    pub message: String,
    /// Byte offset into the input, when the codec can locate the problem.
    pub offset: Option<usize>,
}

impl ParseError {
    pub fn new(format: Format, message: impl Into<String>, offset: Option<usize>) -> Self {
        ParseError {
            format,
            message: message.into(),
            offset,
        }
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "format": self.format.as_str(),
            "message": self.message,
            "offset": self.offset,
        })
    }
}

/// A value tree that has no rendering in the requested format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot format value as {format}: {message}")]
pub struct FormatError {
    pub format: Format,
    pub message: String,
}

impl FormatError {
    pub fn new(format: Format, message: impl Into<String>) -> Self {
        FormatError {
            format,
            message: message.into(),
        }
    }
}
