//! The execution engine: one deterministic depth-first pass over a plan.
//!
//! Execution never fails as a whole. Problems are recorded as `ACV-RUN-*`
//! diagnostics local to the node that hit them, and the output is withheld
//! when any of them is an error.

use std::time::Instant;

use acv_core::ast::MergePolicy;
use acv_core::error::{Diagnostic, DiagnosticCode, Severity};
use acv_core::path::TargetPath;
use acv_core::plan::*;
use acv_core::transform::{TransformKind, TransformOp};
use acv_interchange::{CodecLimits, Format, ParseError, Value};
use serde::Serialize;

use crate::merge;
use crate::predicate;
use crate::scope::{self, Scope};
use crate::transforms;

/// Outcome of one conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    /// Present only when no error diagnostic was recorded.
    pub output: Option<Value>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub duration_micros: u64,
}

impl ConversionResult {
    pub fn is_success(&self) -> bool {
        self.output.is_some()
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "output": self.output.as_ref().map(Value::to_json),
            "errors": self.errors.iter().map(Diagnostic::to_json_value).collect::<Vec<_>>(),
            "warnings": self.warnings.iter().map(Diagnostic::to_json_value).collect::<Vec<_>>(),
            "durationMicros": self.duration_micros,
        })
    }
}

/// A transform that failed, with the value it was given. Collected by
/// [`execute_traced`] for the doctor.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformFailure {
    pub path: String,
    pub index: usize,
    pub kind: TransformKind,
    pub input: Value,
}

/// Run `plan` against `input`.
pub fn execute(plan: &CompiledPlan, input: &Value) -> ConversionResult {
    execute_traced(plan, input).0
}

/// [`execute`], also returning every transform failure.
pub fn execute_traced(plan: &CompiledPlan, input: &Value) -> (ConversionResult, Vec<TransformFailure>) {
    let start = Instant::now();
    let mut run = Run {
        input_format: plan.input_format,
        diagnostics: Vec::new(),
        failures: Vec::new(),
    };
    let mut out = Value::object();
    run.exec(
        &plan.root,
        &Scope::for_input(input, plan.input_format),
        &mut out,
        "root",
    );

    let (errors, warnings): (Vec<Diagnostic>, Vec<Diagnostic>) = run
        .diagnostics
        .into_iter()
        .partition(|d| d.severity == Severity::Error);
    let output = errors.is_empty().then_some(out);
    let result = ConversionResult {
        output,
        errors,
        warnings,
        duration_micros: elapsed_micros(start),
    };
    (result, run.failures)
}

pub(crate) fn elapsed_micros(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

struct Run {
    input_format: Format,
    diagnostics: Vec<Diagnostic>,
    failures: Vec<TransformFailure>,
}

impl Run {
    fn report(&mut self, code: DiagnosticCode, path: &str, message: String) {
        self.diagnostics.push(Diagnostic::new(code, path, message));
    }

    fn exec(&mut self, node: &PlanNode, scope: &Scope<'_>, out: &mut Value, path: &str) {
        match node {
            PlanNode::Field(field) => self.field(field, scope, out, path),
            PlanNode::Condition(cond) => {
                let when_path = format!("{}.when", path);
                if predicate::evaluate(&cond.when, scope, &when_path, &mut self.diagnostics) {
                    self.exec(&cond.then, scope, out, &format!("{}.then", path));
                } else if let Some(otherwise) = &cond.otherwise {
                    self.exec(otherwise, scope, out, &format!("{}.else", path));
                }
            }
            PlanNode::Merge(m) => self.merge(m, scope, out, path),
            PlanNode::Split(split) => self.split(split, scope, out, path),
            PlanNode::Sequence(steps) => {
                for (i, step) in steps.iter().enumerate() {
                    self.exec(step, scope, out, &format!("{}.steps[{}]", path, i));
                }
            }
        }
    }

    fn field(&mut self, field: &PlanField, scope: &Scope<'_>, out: &mut Value, path: &str) {
        let resolved = match &field.source {
            PlanSource::Path(source) => scope.resolve(source).cloned(),
            PlanSource::Constant(value) => Some(value.clone()),
        };
        let starts_with_default = matches!(
            field.transforms.first(),
            Some(PlanTransform {
                op: TransformOp::Default(_),
                ..
            })
        );
        let mut value = match resolved {
            Some(v) => v,
            None if starts_with_default => Value::Null,
            None => {
                let source = match &field.source {
                    PlanSource::Path(p) => p.to_string(),
                    PlanSource::Constant(_) => String::new(),
                };
                if field.optional {
                    self.report(
                        DiagnosticCode::OptionalSourceMissing,
                        path,
                        format!("optional source '{}' is absent; '{}' not written", source, field.target),
                    );
                } else {
                    self.report(
                        DiagnosticCode::RequiredSourceMissing,
                        path,
                        format!("required source '{}' is absent; '{}' not written", source, field.target),
                    );
                }
                return;
            }
        };

        for (i, t) in field.transforms.iter().enumerate() {
            match transforms::apply(t, value.clone(), scope) {
                Ok(next) => value = next,
                Err(e) => {
                    self.report(
                        DiagnosticCode::TransformFailed,
                        path,
                        format!("transform {} failed: {}", i + 1, e),
                    );
                    self.failures.push(TransformFailure {
                        path: path.to_string(),
                        index: i,
                        kind: t.kind,
                        input: value,
                    });
                    return;
                }
            }
        }

        self.write(out, &field.target, value, path);
    }

    fn write(&mut self, out: &mut Value, target: &TargetPath, value: Value, path: &str) {
        if let Err(conflict) = scope::write(out, target, value) {
            self.report(
                DiagnosticCode::TargetWriteConflict,
                path,
                format!(
                    "cannot write '{}': '{}' already holds a {}",
                    target, conflict.at, conflict.existing
                ),
            );
        }
    }

    fn merge(&mut self, m: &PlanMerge, scope: &Scope<'_>, out: &mut Value, path: &str) {
        let branches: Vec<Value> = m
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let mut branch = Value::Null;
                self.exec(input, scope, &mut branch, &format!("{}.inputs[{}]", path, i));
                branch
            })
            .collect();
        let combined = merge::combine(m.policy, branches, path, &mut self.diagnostics);
        if combined.is_vacant() && m.policy != MergePolicy::AppendArray {
            return;
        }
        self.write(out, &m.target, combined, path);
    }

    fn split<'a>(&mut self, split: &PlanSplit, scope: &Scope<'a>, out: &mut Value, path: &str) {
        let items: Vec<&'a Value> = match scope.resolve(&split.source) {
            Some(Value::Array(items)) => items.iter().collect(),
            // XML has no array syntax: one element is one item, an empty
            // element is none.
            Some(Value::Null) if self.input_format == Format::Xml => Vec::new(),
            Some(single) if self.input_format == Format::Xml => vec![single],
            Some(other) => {
                self.report(
                    DiagnosticCode::SplitSourceNotArray,
                    path,
                    format!("split source '{}' is a {}, not an array", split.source, other.kind()),
                );
                return;
            }
            None => {
                self.report(
                    DiagnosticCode::SplitSourceNotArray,
                    path,
                    format!("split source '{}' does not resolve", split.source),
                );
                return;
            }
        };

        let mut results = Vec::with_capacity(items.len());
        for (k, item) in items.into_iter().enumerate() {
            let item_scope = scope.enter(item, k);
            let mut result = Value::Null;
            self.exec(&split.item, &item_scope, &mut result, &format!("{}.item[{}]", path, k));
            results.push(result);
        }
        self.write(out, &split.target, Value::Array(results), path);
    }
}

// ── Text in, text out ───────────────────────────────────────────────

/// [`convert`] output: the formatted text (when the conversion succeeded)
/// and the full result.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedText {
    pub text: Option<String>,
    pub result: ConversionResult,
}

/// Parse `text`, execute `plan`, format the output. Input that does not
/// parse is an `Err`; everything after parsing is reported in the result.
pub fn convert(
    plan: &CompiledPlan,
    text: &str,
    input_format: Format,
    output_format: Format,
    pretty: bool,
    limits: &CodecLimits,
) -> Result<ConvertedText, ParseError> {
    let input = acv_interchange::parse(text, input_format, limits)?;
    let mut result = execute(plan, &input);
    let formatted = match &result.output {
        Some(output) => match acv_interchange::format(output, output_format, pretty) {
            Ok(text) => Some(text),
            Err(e) => {
                result.errors.push(Diagnostic::new(
                    DiagnosticCode::OutputNotRepresentable,
                    "root",
                    e.to_string(),
                ));
                result.output = None;
                None
            }
        },
        None => None,
    };
    Ok(ConvertedText {
        text: formatted,
        result,
    })
}
