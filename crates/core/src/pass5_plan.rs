//! Pass 5: lower a checked, inlined document to a [`CompiledPlan`].
//!
//! Passes 2-4 have already reported everything that can fail here, so in
//! practice lowering succeeds; any failure is still returned as a located
//! diagnostic rather than a panic.

use regex::Regex;

use crate::ast::*;
use crate::error::{Diagnostic, DiagnosticCode};
use crate::path::{SourcePath, TargetPath};
use crate::plan::*;
use crate::transform::{build_op, TransformKind};

pub fn build_plan(document: &RulesDocument) -> Result<CompiledPlan, Vec<Diagnostic>> {
    let mut lowerer = Lowerer {
        diagnostics: Vec::new(),
        node_count: 0,
    };
    let root = lowerer.node(&document.root, "root");
    match root {
        Some(root) if lowerer.diagnostics.is_empty() => Ok(CompiledPlan {
            schema_version: document.schema_version.clone(),
            input_format: document.input_format,
            output_format: document.output_format,
            root,
            node_count: lowerer.node_count,
        }),
        _ => Err(lowerer.diagnostics),
    }
}

struct Lowerer {
    diagnostics: Vec<Diagnostic>,
    node_count: usize,
}

impl Lowerer {
    fn fail(&mut self, code: DiagnosticCode, path: &str, message: String) {
        self.diagnostics.push(Diagnostic::new(code, path, message));
    }

    fn source(&mut self, text: &str, path: &str) -> Option<SourcePath> {
        match SourcePath::parse(text) {
            Ok(p) => Some(p),
            Err(e) => {
                self.fail(
                    DiagnosticCode::MalformedSourcePath,
                    path,
                    format!("source path '{}': {}", text, e),
                );
                None
            }
        }
    }

    fn target(&mut self, text: &str, path: &str) -> Option<TargetPath> {
        match TargetPath::parse(text) {
            Ok(p) => Some(p),
            Err(e) => {
                self.fail(
                    DiagnosticCode::MalformedTargetPath,
                    path,
                    format!("target path '{}': {}", text, e),
                );
                None
            }
        }
    }

    fn node(&mut self, node: &RuleNode, path: &str) -> Option<PlanNode> {
        self.node_count += 1;
        match node {
            RuleNode::Field(field) => self.field(field, path).map(PlanNode::Field),
            RuleNode::Condition(cond) => {
                let when = self.predicate(&cond.when, &format!("{}.when", path));
                let then = self.node(&cond.then, &format!("{}.then", path));
                let otherwise = match &cond.otherwise {
                    Some(o) => Some(self.node(o, &format!("{}.else", path))?),
                    None => None,
                };
                Some(PlanNode::Condition(PlanCondition {
                    when: when?,
                    then: Box::new(then?),
                    otherwise: otherwise.map(Box::new),
                }))
            }
            RuleNode::Merge(merge) => {
                let target = self.target(&merge.target, path);
                let inputs: Vec<Option<PlanNode>> = merge
                    .inputs
                    .iter()
                    .enumerate()
                    .map(|(i, input)| self.node(input, &format!("{}.inputs[{}]", path, i)))
                    .collect();
                Some(PlanNode::Merge(PlanMerge {
                    inputs: inputs.into_iter().collect::<Option<Vec<_>>>()?,
                    policy: merge.policy,
                    target: target?,
                }))
            }
            RuleNode::Split(split) => {
                let source = self.source(&split.source, path);
                let target = self.target(&split.target, path);
                let item = self.node(&split.item, &format!("{}.item", path));
                Some(PlanNode::Split(PlanSplit {
                    source: source?,
                    item: Box::new(item?),
                    target: target?,
                }))
            }
            RuleNode::Sequence(seq) => {
                let steps: Vec<Option<PlanNode>> = seq
                    .steps
                    .iter()
                    .enumerate()
                    .map(|(i, step)| self.node(step, &format!("{}.steps[{}]", path, i)))
                    .collect();
                Some(PlanNode::Sequence(
                    steps.into_iter().collect::<Option<Vec<_>>>()?,
                ))
            }
            RuleNode::Fragment(r) => {
                self.fail(
                    DiagnosticCode::UnknownFragment,
                    path,
                    format!("fragment '{}' was not resolved", r.name),
                );
                None
            }
        }
    }

    fn field(&mut self, field: &FieldMapping, path: &str) -> Option<PlanField> {
        let source = match &field.source {
            FieldSource::Path(text) => self.source(text, path).map(PlanSource::Path),
            FieldSource::Constant(value) => Some(PlanSource::Constant(value.clone())),
        };
        let mut transforms = Some(Vec::with_capacity(field.transforms.len()));
        for (i, spec) in field.transforms.iter().enumerate() {
            let at = format!("{}.transforms[{}]", path, i);
            let lowered = match TransformKind::from_name(&spec.name) {
                Some(kind) => match build_op(kind, &spec.args) {
                    Ok(op) => Some(PlanTransform { kind, op }),
                    Err(message) => {
                        self.fail(DiagnosticCode::InvalidTransformArgument, &at, message);
                        None
                    }
                },
                None => {
                    self.fail(
                        DiagnosticCode::UnknownTransform,
                        &at,
                        format!("unknown transform '{}'", spec.name),
                    );
                    None
                }
            };
            match (lowered, transforms.as_mut()) {
                (Some(t), Some(list)) => list.push(t),
                _ => transforms = None,
            }
        }
        let target = self.target(&field.target, path);
        Some(PlanField {
            source: source?,
            transforms: transforms?,
            target: target?,
            optional: field.optional,
        })
    }

    fn predicate(&mut self, expr: &ConditionExpr, path: &str) -> Option<Predicate> {
        match expr {
            ConditionExpr::Equals { source, value } => Some(Predicate::Equals {
                source: self.source(source, path)?,
                value: value.clone(),
            }),
            ConditionExpr::Exists { source } => Some(Predicate::Exists {
                source: self.source(source, path)?,
            }),
            ConditionExpr::Matches { source, pattern } => {
                let source = self.source(source, path);
                let regex = match Regex::new(pattern) {
                    Ok(r) => Some(r),
                    Err(e) => {
                        self.fail(
                            DiagnosticCode::InvalidCondition,
                            path,
                            format!("invalid pattern '{}': {}", pattern, e),
                        );
                        None
                    }
                };
                Some(Predicate::Matches {
                    source: source?,
                    regex: regex?,
                })
            }
            ConditionExpr::And { conditions } => {
                self.predicates(conditions, path).map(Predicate::And)
            }
            ConditionExpr::Or { conditions } => {
                self.predicates(conditions, path).map(Predicate::Or)
            }
            ConditionExpr::Not { condition } => self
                .predicate(condition, &format!("{}.condition", path))
                .map(|p| Predicate::Not(Box::new(p))),
            ConditionExpr::Literal { value } => Some(Predicate::Literal(*value)),
            ConditionExpr::GreaterThan { source, value } => Some(Predicate::GreaterThan {
                source: self.source(source, path)?,
                value: value.clone(),
            }),
            ConditionExpr::LessThan { source, value } => Some(Predicate::LessThan {
                source: self.source(source, path)?,
                value: value.clone(),
            }),
        }
    }

    fn predicates(&mut self, conditions: &[ConditionExpr], path: &str) -> Option<Vec<Predicate>> {
        let lowered: Vec<Option<Predicate>> = conditions
            .iter()
            .enumerate()
            .map(|(i, c)| self.predicate(c, &format!("{}.conditions[{}]", path, i)))
            .collect();
        lowered.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rules;

    fn lower(root: &str) -> Result<CompiledPlan, Vec<Diagnostic>> {
        let text = format!(
            r#"{{ "schemaVersion": "1.1", "inputFormat": "json", "outputFormat": "xml", "root": {} }}"#,
            root
        );
        build_plan(&parse_rules(&text).unwrap())
    }

    #[test]
    fn lowers_every_node_kind() {
        let plan = lower(
            r#"{ "kind": "sequence", "steps": [
                { "kind": "field", "source": "a", "transforms": ["trim"], "target": "b" },
                { "kind": "condition", "when": { "op": "matches", "source": "s", "pattern": "^x" },
                  "then": { "kind": "field", "value": true, "target": "c" } },
                { "kind": "merge", "policy": "firstWins", "inputs": [
                    { "kind": "field", "source": "d", "target": "" } ] },
                { "kind": "split", "source": "rows", "target": "out",
                  "item": { "kind": "field", "source": "id", "target": "id" } } ] }"#,
        )
        .unwrap();
        assert_eq!(plan.schema_version, "1.1");
        assert_eq!(plan.node_count, 8);
        let PlanNode::Sequence(steps) = &plan.root else {
            panic!("expected sequence root");
        };
        assert_eq!(steps.len(), 4);
        let PlanNode::Condition(cond) = &steps[1] else {
            panic!("expected condition");
        };
        assert_eq!(cond.when.op(), "matches");
        assert!(matches!(&steps[2], PlanNode::Merge(m) if m.target.is_root()));
    }

    #[test]
    fn leftover_reference_fails_lowering() {
        let errors = lower(r#"{ "kind": "fragment", "name": "x" }"#).unwrap_err();
        assert_eq!(errors[0].code, DiagnosticCode::UnknownFragment);
    }

    #[test]
    fn bad_path_fails_lowering() {
        let errors = lower(r#"{ "kind": "field", "source": "a[", "target": "b" }"#).unwrap_err();
        assert_eq!(errors[0].code, DiagnosticCode::MalformedSourcePath);
        assert_eq!(errors[0].path, "root");
    }
}
