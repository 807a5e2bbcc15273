//! The transform catalog.
//!
//! Each transform has a fixed name, arity and declared input/output kinds.
//! [`build_op`] validates arguments and produces the compiled operation the
//! engine runs; the compiler and the plan builder share it so a document
//! that validates always lowers.

use acv_interchange::{Value, ValueKind};
use regex::Regex;
use time::format_description::OwnedFormatItem;

use crate::path::SourcePath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    Trim,
    Uppercase,
    Lowercase,
    ToNumber,
    ToString,
    ToBool,
    Round,
    DateFormat,
    Template,
    Default,
    Split,
    Join,
    Replace,
}

const STRING: &[ValueKind] = &[ValueKind::String];
const NUMBER: &[ValueKind] = &[ValueKind::Number];
const ARRAY: &[ValueKind] = &[ValueKind::Array];
const CONVERTIBLE: &[ValueKind] = &[ValueKind::String, ValueKind::Number, ValueKind::Bool];
const SCALAR: &[ValueKind] = &[
    ValueKind::Null,
    ValueKind::Bool,
    ValueKind::Number,
    ValueKind::String,
];

impl TransformKind {
    pub const ALL: [TransformKind; 13] = [
        TransformKind::Trim,
        TransformKind::Uppercase,
        TransformKind::Lowercase,
        TransformKind::ToNumber,
        TransformKind::ToString,
        TransformKind::ToBool,
        TransformKind::Round,
        TransformKind::DateFormat,
        TransformKind::Template,
        TransformKind::Default,
        TransformKind::Split,
        TransformKind::Join,
        TransformKind::Replace,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TransformKind::Trim => "trim",
            TransformKind::Uppercase => "uppercase",
            TransformKind::Lowercase => "lowercase",
            TransformKind::ToNumber => "toNumber",
            TransformKind::ToString => "toString",
            TransformKind::ToBool => "toBool",
            TransformKind::Round => "round",
            TransformKind::DateFormat => "dateFormat",
            TransformKind::Template => "template",
            TransformKind::Default => "default",
            TransformKind::Split => "split",
            TransformKind::Join => "join",
            TransformKind::Replace => "replace",
        }
    }

    /// Exact lookup. Names are case sensitive.
    pub fn from_name(name: &str) -> Option<TransformKind> {
        TransformKind::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Lookup ignoring case and surrounding whitespace, for suggestions and
    /// the doctor's name fix.
    pub fn from_loose_name(name: &str) -> Option<TransformKind> {
        let wanted = name.trim();
        TransformKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(wanted))
    }

    pub fn arity(self) -> usize {
        match self {
            TransformKind::Round
            | TransformKind::Template
            | TransformKind::Default
            | TransformKind::Split
            | TransformKind::Join => 1,
            TransformKind::DateFormat | TransformKind::Replace => 2,
            _ => 0,
        }
    }

    /// Kinds the transform accepts; `None` accepts anything.
    pub fn accepts(self) -> Option<&'static [ValueKind]> {
        match self {
            TransformKind::Trim
            | TransformKind::Uppercase
            | TransformKind::Lowercase
            | TransformKind::DateFormat
            | TransformKind::Split
            | TransformKind::Replace => Some(STRING),
            TransformKind::ToNumber | TransformKind::ToBool => Some(CONVERTIBLE),
            TransformKind::ToString => Some(SCALAR),
            TransformKind::Round => Some(NUMBER),
            TransformKind::Join => Some(ARRAY),
            TransformKind::Template | TransformKind::Default => None,
        }
    }

    /// Kind of the result; `None` when it depends on the input.
    pub fn output(self) -> Option<ValueKind> {
        match self {
            TransformKind::ToNumber | TransformKind::Round => Some(ValueKind::Number),
            TransformKind::ToBool => Some(ValueKind::Bool),
            TransformKind::Split => Some(ValueKind::Array),
            TransformKind::Default => None,
            _ => Some(ValueKind::String),
        }
    }

    pub fn accepts_kind(self, kind: ValueKind) -> bool {
        self.accepts().map_or(true, |kinds| kinds.contains(&kind))
    }
}

/// A `dateFormat` layout.
#[derive(Debug, Clone)]
pub enum DatePattern {
    Rfc3339,
    Description(OwnedFormatItem),
}

impl DatePattern {
    pub fn parse(text: &str) -> Result<DatePattern, String> {
        if text == "rfc3339" {
            return Ok(DatePattern::Rfc3339);
        }
        time::format_description::parse_owned::<1>(text)
            .map(DatePattern::Description)
            .map_err(|e| format!("invalid date format '{}': {}", text, e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    /// `{}` or `{value}`: the value flowing through the pipeline.
    Value,
    /// `{path}`: a value resolved from the current scope.
    Path(SourcePath),
}

/// Parse a template pattern. `{{` and `}}` are literal braces.
pub fn parse_template(pattern: &str) -> Result<Vec<TemplatePart>, String> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => {
                            return Err(format!("unclosed placeholder in template '{}'", pattern))
                        }
                        Some(ch) => name.push(ch),
                    }
                }
                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                }
                let name = name.trim();
                if name.is_empty() || name == "value" {
                    parts.push(TemplatePart::Value);
                } else {
                    let path = SourcePath::parse(name)
                        .map_err(|e| format!("placeholder '{{{}}}': {}", name, e))?;
                    parts.push(TemplatePart::Path(path));
                }
            }
            '}' => return Err(format!("unmatched '}}' in template '{}'", pattern)),
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }
    Ok(parts)
}

/// A compiled transform, ready to run.
#[derive(Debug, Clone)]
pub enum TransformOp {
    Trim,
    Uppercase,
    Lowercase,
    ToNumber,
    ToString,
    ToBool,
    Round(u32),
    DateFormat { from: DatePattern, to: DatePattern },
    Template(Vec<TemplatePart>),
    Default(Value),
    Split(String),
    Join(String),
    Replace { regex: Regex, replacement: String },
}

/// Largest `round` precision; beyond it doubles carry no more digits.
pub const MAX_ROUND_DIGITS: u32 = 15;

fn string_arg<'a>(kind: TransformKind, args: &'a [Value], i: usize) -> Result<&'a str, String> {
    args.get(i).and_then(Value::as_str).ok_or_else(|| {
        format!(
            "argument {} of '{}' must be a string",
            i + 1,
            kind.name()
        )
    })
}

/// Validate `args` for `kind` and compile the operation. Arity is checked
/// by the caller; missing arguments are reported here as invalid.
pub fn build_op(kind: TransformKind, args: &[Value]) -> Result<TransformOp, String> {
    Ok(match kind {
        TransformKind::Trim => TransformOp::Trim,
        TransformKind::Uppercase => TransformOp::Uppercase,
        TransformKind::Lowercase => TransformOp::Lowercase,
        TransformKind::ToNumber => TransformOp::ToNumber,
        TransformKind::ToString => TransformOp::ToString,
        TransformKind::ToBool => TransformOp::ToBool,
        TransformKind::Round => {
            let digits = args
                .first()
                .and_then(Value::as_f64)
                .filter(|d| d.fract() == 0.0 && *d >= 0.0 && *d <= MAX_ROUND_DIGITS as f64)
                .ok_or_else(|| {
                    format!(
                        "'round' takes an integer digit count between 0 and {}",
                        MAX_ROUND_DIGITS
                    )
                })?;
            TransformOp::Round(digits as u32)
        }
        TransformKind::DateFormat => TransformOp::DateFormat {
            from: DatePattern::parse(string_arg(kind, args, 0)?)?,
            to: DatePattern::parse(string_arg(kind, args, 1)?)?,
        },
        TransformKind::Template => TransformOp::Template(parse_template(string_arg(kind, args, 0)?)?),
        TransformKind::Default => TransformOp::Default(args.first().cloned().unwrap_or_default()),
        TransformKind::Split => {
            let sep = string_arg(kind, args, 0)?;
            if sep.is_empty() {
                return Err("'split' separator cannot be empty".to_string());
            }
            TransformOp::Split(sep.to_string())
        }
        TransformKind::Join => TransformOp::Join(string_arg(kind, args, 0)?.to_string()),
        TransformKind::Replace => {
            let pattern = string_arg(kind, args, 0)?;
            let regex = Regex::new(pattern)
                .map_err(|e| format!("invalid regex '{}': {}", pattern, e))?;
            TransformOp::Replace {
                regex,
                replacement: string_arg(kind, args, 1)?.to_string(),
            }
        }
    })
}

/// Source paths read by template placeholders.
pub fn template_paths(op: &TransformOp) -> Vec<&SourcePath> {
    match op {
        TransformOp::Template(parts) => parts
            .iter()
            .filter_map(|p| match p {
                TemplatePart::Path(path) => Some(path),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for k in TransformKind::ALL {
            assert_eq!(TransformKind::from_name(k.name()), Some(k));
        }
        assert_eq!(TransformKind::from_name("Trim"), None);
        assert_eq!(TransformKind::from_loose_name(" TONUMBER "), Some(TransformKind::ToNumber));
        assert_eq!(TransformKind::from_loose_name("frobnicate"), None);
    }

    #[test]
    fn arity_table() {
        assert_eq!(TransformKind::Trim.arity(), 0);
        assert_eq!(TransformKind::Round.arity(), 1);
        assert_eq!(TransformKind::DateFormat.arity(), 2);
        assert_eq!(TransformKind::Replace.arity(), 2);
    }

    #[test]
    fn kind_signatures() {
        assert!(TransformKind::Round.accepts_kind(ValueKind::Number));
        assert!(!TransformKind::Round.accepts_kind(ValueKind::String));
        assert!(TransformKind::Template.accepts_kind(ValueKind::Object));
        assert_eq!(TransformKind::Split.output(), Some(ValueKind::Array));
        assert_eq!(TransformKind::Default.output(), None);
    }

    #[test]
    fn round_digits_are_validated() {
        assert!(matches!(
            build_op(TransformKind::Round, &[Value::Number(2.0)]),
            Ok(TransformOp::Round(2))
        ));
        for bad in [Value::Number(2.5), Value::Number(-1.0), Value::Number(16.0), Value::from("2")] {
            assert!(build_op(TransformKind::Round, &[bad]).is_err());
        }
    }

    #[test]
    fn date_patterns() {
        assert!(matches!(DatePattern::parse("rfc3339"), Ok(DatePattern::Rfc3339)));
        assert!(DatePattern::parse("[year]-[month]-[day]").is_ok());
        assert!(DatePattern::parse("[year]-[bogus]").is_err());
    }

    #[test]
    fn template_parsing() {
        let parts = parse_template("Order {id}: {} {{literal}}").unwrap();
        assert_eq!(
            parts,
            vec![
                TemplatePart::Literal("Order ".to_string()),
                TemplatePart::Path(SourcePath::parse("id").unwrap()),
                TemplatePart::Literal(": ".to_string()),
                TemplatePart::Value,
                TemplatePart::Literal(" {literal}".to_string()),
            ]
        );
        assert!(parse_template("{unclosed").is_err());
        assert!(parse_template("stray }").is_err());
        assert!(parse_template("{a..b}").is_err());
    }

    #[test]
    fn replace_and_split_arguments() {
        assert!(build_op(TransformKind::Replace, &[Value::from("("), Value::from("")]).is_err());
        assert!(build_op(TransformKind::Replace, &[Value::from("-+"), Value::from("-")]).is_ok());
        assert!(build_op(TransformKind::Split, &[Value::from("")]).is_err());
        assert!(build_op(TransformKind::Join, &[Value::Number(1.0)]).is_err());
    }
}
