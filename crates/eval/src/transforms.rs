//! Runtime semantics of the transform catalog.

use std::str::FromStr;

use acv_core::plan::PlanTransform;
use acv_core::transform::{DatePattern, TemplatePart, TransformKind, TransformOp};
use acv_interchange::number::{format_number, parse_number};
use acv_interchange::{json, Value, ValueKind};
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::scope::Scope;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("'{transform}' does not accept {got} input")]
    KindMismatch {
        transform: &'static str,
        got: ValueKind,
    },
    #[error("'{transform}': {message}")]
    Failed {
        transform: &'static str,
        message: String,
    },
}

fn failed(kind: TransformKind, message: impl Into<String>) -> TransformError {
    TransformError::Failed {
        transform: kind.name(),
        message: message.into(),
    }
}

/// Apply one transform to `input`. `scope` serves template placeholders.
pub fn apply(t: &PlanTransform, input: Value, scope: &Scope<'_>) -> Result<Value, TransformError> {
    if !t.kind.accepts_kind(input.kind()) {
        return Err(TransformError::KindMismatch {
            transform: t.kind.name(),
            got: input.kind(),
        });
    }
    let kind = t.kind;
    match (&t.op, input) {
        (TransformOp::Trim, Value::String(s)) => Ok(Value::String(s.trim().to_string())),
        (TransformOp::Uppercase, Value::String(s)) => Ok(Value::String(s.to_uppercase())),
        (TransformOp::Lowercase, Value::String(s)) => Ok(Value::String(s.to_lowercase())),
        (TransformOp::ToNumber, value) => to_number(&value)
            .map(Value::Number)
            .ok_or_else(|| failed(kind, format!("'{}' is not a number", text_of(&value)))),
        (TransformOp::ToString, value) => value
            .scalar_text()
            .map(Value::String)
            .ok_or_else(|| failed(kind, "containers have no string form")),
        (TransformOp::ToBool, value) => to_bool(&value)
            .map(Value::Bool)
            .ok_or_else(|| failed(kind, format!("'{}' is not a boolean", text_of(&value)))),
        (TransformOp::Round(digits), Value::Number(n)) => Ok(Value::Number(round(n, *digits))),
        (TransformOp::DateFormat { from, to }, Value::String(s)) => {
            reformat_date(&s, from, to).map(Value::String).map_err(|m| failed(kind, m))
        }
        (TransformOp::Template(parts), value) => {
            render(parts, &value, scope).map(Value::String).map_err(|m| failed(kind, m))
        }
        (TransformOp::Default(fallback), value) => Ok(if value.is_null() {
            fallback.clone()
        } else {
            value
        }),
        (TransformOp::Split(sep), Value::String(s)) => Ok(Value::Array(if s.is_empty() {
            Vec::new()
        } else {
            s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()
        })),
        (TransformOp::Join(sep), Value::Array(items)) => {
            let parts: Option<Vec<String>> = items.iter().map(Value::scalar_text).collect();
            parts
                .map(|p| Value::String(p.join(sep)))
                .ok_or_else(|| failed(kind, "can only join scalar items"))
        }
        (TransformOp::Replace { regex, replacement }, Value::String(s)) => Ok(Value::String(
            regex.replace_all(&s, replacement.as_str()).into_owned(),
        )),
        (_, value) => Err(TransformError::KindMismatch {
            transform: kind.name(),
            got: value.kind(),
        }),
    }
}

fn text_of(value: &Value) -> String {
    value
        .scalar_text()
        .unwrap_or_else(|| value.kind().as_str().to_string())
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => parse_number(s.trim()),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(*n != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Round half away from zero on the canonical decimal digits, so `1.005`
/// rounds to `1.01` as written rather than as stored.
fn round(n: f64, digits: u32) -> f64 {
    let text = format_number(n);
    let decimal = Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text));
    match decimal {
        Ok(d) => d
            .round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero)
            .to_string()
            .parse::<f64>()
            .unwrap_or(n),
        // Beyond Decimal's range there are no fractional digits left.
        Err(_) => n,
    }
}

fn parse_date(text: &str, pattern: &DatePattern) -> Result<OffsetDateTime, String> {
    match pattern {
        DatePattern::Rfc3339 => OffsetDateTime::parse(text, &Rfc3339)
            .map_err(|e| format!("'{}' is not an RFC 3339 timestamp: {}", text, e)),
        DatePattern::Description(items) => OffsetDateTime::parse(text, items)
            .or_else(|_| PrimitiveDateTime::parse(text, items).map(PrimitiveDateTime::assume_utc))
            .or_else(|_| {
                Date::parse(text, items).map(|d| PrimitiveDateTime::new(d, Time::MIDNIGHT).assume_utc())
            })
            .map_err(|e| format!("'{}' does not match the input date format: {}", text, e)),
    }
}

fn reformat_date(text: &str, from: &DatePattern, to: &DatePattern) -> Result<String, String> {
    let parsed = parse_date(text, from)?;
    match to {
        DatePattern::Rfc3339 => parsed.format(&Rfc3339),
        DatePattern::Description(items) => parsed.format(items),
    }
    .map_err(|e| format!("cannot format date: {}", e))
}

/// Containers inside templates render as compact JSON.
fn placeholder_text(value: &Value) -> String {
    value.scalar_text().unwrap_or_else(|| json::format(value, false))
}

fn render(parts: &[TemplatePart], value: &Value, scope: &Scope<'_>) -> Result<String, String> {
    let mut out = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(text) => out.push_str(text),
            TemplatePart::Value => out.push_str(&placeholder_text(value)),
            TemplatePart::Path(path) => match scope.resolve(path) {
                Some(v) => out.push_str(&placeholder_text(v)),
                None => return Err(format!("placeholder '{{{}}}' resolves to nothing", path)),
            },
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use acv_core::transform::build_op;

    fn run(name: &str, args: &[Value], input: Value) -> Result<Value, TransformError> {
        let kind = TransformKind::from_name(name).unwrap();
        let t = PlanTransform {
            kind,
            op: build_op(kind, args).unwrap(),
        };
        let root = Value::from_json(serde_json::json!({ "name": "Ada", "tags": ["x", "y"] }));
        apply(&t, input, &Scope::new(&root))
    }

    fn s(text: &str) -> Value {
        Value::String(text.to_string())
    }

    #[test]
    fn string_transforms() {
        assert_eq!(run("trim", &[], s("  a b ")).unwrap(), s("a b"));
        assert_eq!(run("uppercase", &[], s("straße")).unwrap(), s("STRASSE"));
        assert_eq!(run("lowercase", &[], s("ÀB")).unwrap(), s("àb"));
        assert_eq!(
            run("replace", &[s("[0-9]+"), s("#")], s("a1b22")).unwrap(),
            s("a#b#")
        );
    }

    #[test]
    fn kind_mismatch_is_an_error_not_a_panic() {
        let err = run("trim", &[], Value::Number(1.0)).unwrap_err();
        assert_eq!(
            err,
            TransformError::KindMismatch {
                transform: "trim",
                got: ValueKind::Number
            }
        );
        assert_eq!(err.to_string(), "'trim' does not accept number input");
    }

    #[test]
    fn conversions() {
        assert_eq!(run("toNumber", &[], s(" 18.25 ")).unwrap(), Value::Number(18.25));
        assert_eq!(run("toNumber", &[], Value::Bool(true)).unwrap(), Value::Number(1.0));
        assert!(run("toNumber", &[], s("12abc")).is_err());
        assert_eq!(run("toString", &[], Value::Number(42.0)).unwrap(), s("42"));
        assert_eq!(run("toString", &[], Value::Null).unwrap(), s(""));
        assert_eq!(run("toBool", &[], s("Yes")).unwrap(), Value::Bool(true));
        assert_eq!(run("toBool", &[], Value::Number(0.0)).unwrap(), Value::Bool(false));
        assert!(run("toBool", &[], s("maybe")).is_err());
    }

    #[test]
    fn round_half_away_from_zero() {
        let two = [Value::Number(2.0)];
        assert_eq!(run("round", &two, Value::Number(1.005)).unwrap(), Value::Number(1.01));
        assert_eq!(run("round", &two, Value::Number(-2.345)).unwrap(), Value::Number(-2.35));
        assert_eq!(
            run("round", &[Value::Number(0.0)], Value::Number(2.5)).unwrap(),
            Value::Number(3.0)
        );
        assert_eq!(run("round", &two, Value::Number(1e300)).unwrap(), Value::Number(1e300));
    }

    #[test]
    fn date_format() {
        let args = [s("[day]/[month]/[year]"), s("[year]-[month]-[day]")];
        assert_eq!(run("dateFormat", &args, s("05/03/2024")).unwrap(), s("2024-03-05"));
        let args = [s("rfc3339"), s("[year]-[month]-[day] [hour]:[minute]")];
        assert_eq!(
            run("dateFormat", &args, s("2024-03-05T10:30:00Z")).unwrap(),
            s("2024-03-05 10:30")
        );
        let args = [s("[year]-[month]-[day]"), s("rfc3339")];
        assert_eq!(run("dateFormat", &args, s("2024-03-05")).unwrap(), s("2024-03-05T00:00:00Z"));
        assert!(run("dateFormat", &args, s("March 5th")).is_err());
    }

    #[test]
    fn template_and_default() {
        assert_eq!(
            run("template", &[s("{name}: {} {tags}")], Value::Number(3.0)).unwrap(),
            s("Ada: 3 [\"x\",\"y\"]")
        );
        assert!(run("template", &[s("{missing}")], Value::Null).is_err());
        assert_eq!(run("default", &[s("n/a")], Value::Null).unwrap(), s("n/a"));
        assert_eq!(run("default", &[s("n/a")], s("set")).unwrap(), s("set"));
    }

    #[test]
    fn split_and_join() {
        assert_eq!(
            run("split", &[s(",")], s("a,b")).unwrap(),
            Value::Array(vec![s("a"), s("b")])
        );
        assert_eq!(run("split", &[s(",")], s("")).unwrap(), Value::Array(Vec::new()));
        assert_eq!(
            run("join", &[s("-")], Value::Array(vec![s("a"), Value::Number(1.0)])).unwrap(),
            s("a-1")
        );
        assert!(run("join", &[s("-")], Value::Array(vec![Value::object()])).is_err());
    }
}
