//! Condition evaluation.
//!
//! A source that does not resolve makes its comparison false. Ordered
//! comparisons between different kinds are also false and leave an
//! ACV-RUN-008 warning behind.

use std::cmp::Ordering;

use acv_core::error::{Diagnostic, DiagnosticCode};
use acv_core::plan::Predicate;
use acv_interchange::Value;

use crate::scope::Scope;

/// Evaluate `pred` in `scope`. `and` and `or` short-circuit left to right.
pub fn evaluate(
    pred: &Predicate,
    scope: &Scope<'_>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    match pred {
        Predicate::Literal(value) => *value,
        Predicate::Not(inner) => !evaluate(inner, scope, path, diagnostics),
        Predicate::And(all) => all.iter().all(|p| evaluate(p, scope, path, diagnostics)),
        Predicate::Or(any) => any.iter().any(|p| evaluate(p, scope, path, diagnostics)),
        Predicate::Exists { source } => scope.resolve(source).is_some_and(|v| !v.is_null()),
        Predicate::Equals { source, value } => {
            scope.resolve(source).is_some_and(|found| found == value)
        }
        Predicate::Matches { source, regex } => match scope.resolve(source) {
            Some(Value::Null) | None => false,
            Some(found) => found
                .scalar_text()
                .is_some_and(|text| regex.is_match(&text)),
        },
        Predicate::GreaterThan { source, value } => {
            compare(pred, scope.resolve(source), value, path, diagnostics) == Some(Ordering::Greater)
        }
        Predicate::LessThan { source, value } => {
            compare(pred, scope.resolve(source), value, path, diagnostics) == Some(Ordering::Less)
        }
    }
}

fn compare(
    pred: &Predicate,
    found: Option<&Value>,
    expected: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Ordering> {
    let found = found?;
    match (found, expected) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::ConditionTypeMismatch,
                path,
                format!(
                    "'{}' compares {} with {}; treated as false",
                    pred.op(),
                    found.kind(),
                    expected.kind()
                ),
            ));
            None
        }
    }
}
