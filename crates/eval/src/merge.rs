//! Combining merge branches under a collision policy.

use acv_core::ast::MergePolicy;
use acv_core::error::{Diagnostic, DiagnosticCode};
use acv_core::path::{PathSegment, TargetPath};
use acv_interchange::{Map, Value};

/// Combine branch results in input order. Vacant branches (nothing
/// written) contribute nothing under every policy.
pub fn combine(
    policy: MergePolicy,
    branches: Vec<Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Value {
    match policy {
        MergePolicy::AppendArray => append(branches, path, diagnostics),
        _ => {
            let mut acc = Value::Null;
            let mut dropped: Vec<TargetPath> = Vec::new();
            let root = TargetPath { segments: Vec::new() };
            for branch in branches.into_iter().filter(|b| !b.is_vacant()) {
                let mut merger = Merger {
                    policy,
                    path,
                    dropped: &mut dropped,
                    diagnostics: &mut *diagnostics,
                };
                acc = merger.merge_value(acc, branch, &root);
            }
            acc
        }
    }
}

fn append(branches: Vec<Value>, path: &str, diagnostics: &mut Vec<Diagnostic>) -> Value {
    let mut out = Vec::new();
    for (i, branch) in branches.into_iter().enumerate() {
        match branch {
            Value::Array(items) => out.extend(items),
            b if b.is_vacant() => {}
            other => diagnostics.push(Diagnostic::new(
                DiagnosticCode::MergeBranchNotArray,
                format!("{}.inputs[{}]", path, i),
                format!(
                    "appendArray needs every branch to produce an array, got {}; branch dropped",
                    other.kind()
                ),
            )),
        }
    }
    Value::Array(out)
}

struct Merger<'a> {
    policy: MergePolicy,
    path: &'a str,
    /// Keys removed under the `error` policy; later branches cannot
    /// reintroduce them.
    dropped: &'a mut Vec<TargetPath>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl Merger<'_> {
    fn merge_value(&mut self, acc: Value, incoming: Value, at: &TargetPath) -> Value {
        if self.dropped.contains(at) {
            return acc;
        }
        if acc.is_vacant() {
            return incoming;
        }
        match (acc, incoming) {
            (Value::Object(a), Value::Object(b)) => Value::Object(self.merge_maps(a, b, at)),
            (existing, incoming) => match self.policy {
                MergePolicy::FirstWins => existing,
                MergePolicy::Error => {
                    self.collide(at);
                    Value::Null
                }
                _ => incoming,
            },
        }
    }

    fn merge_maps(&mut self, mut acc: Map, incoming: Map, at: &TargetPath) -> Map {
        for (key, value) in incoming {
            let mut child = at.clone();
            child.segments.push(PathSegment::Key(key.clone()));
            if self.dropped.contains(&child) {
                continue;
            }
            match acc.shift_remove_full(&key) {
                None => {
                    acc.insert(key, value);
                }
                Some((index, _, existing)) => {
                    let overlapping = !existing.is_vacant()
                        && !matches!((&existing, &value), (Value::Object(_), Value::Object(_)));
                    if overlapping && self.policy == MergePolicy::Error {
                        self.collide(&child);
                        continue;
                    }
                    let merged = self.merge_value(existing, value, &child);
                    acc.shift_insert(index, key, merged);
                }
            }
        }
        acc
    }

    fn collide(&mut self, at: &TargetPath) {
        self.diagnostics.push(Diagnostic::new(
            DiagnosticCode::MergeKeyCollision,
            self.path,
            format!("merge branches both write '{}'; key dropped", at),
        ));
        self.dropped.push(at.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(policy: MergePolicy, branches: Vec<serde_json::Value>) -> (serde_json::Value, Vec<Diagnostic>) {
        let mut diags = Vec::new();
        let out = combine(
            policy,
            branches.into_iter().map(Value::from_json).collect(),
            "root.steps[0]",
            &mut diags,
        );
        (out.to_json(), diags)
    }

    #[test]
    fn last_and_first_wins_on_scalar_overlap() {
        let branches = vec![json!({ "a": 1, "o": { "x": 1 } }), json!({ "a": 2, "o": { "y": 2 } })];
        let (out, diags) = run(MergePolicy::LastWins, branches.clone());
        assert_eq!(out, json!({ "a": 2, "o": { "x": 1, "y": 2 } }));
        assert!(diags.is_empty());
        let (out, _) = run(MergePolicy::FirstWins, branches);
        assert_eq!(out, json!({ "a": 1, "o": { "x": 1, "y": 2 } }));
    }

    #[test]
    fn error_policy_drops_colliding_keys() {
        let (out, diags) = run(
            MergePolicy::Error,
            vec![
                json!({ "a": 1, "keep": true, "o": { "x": 1 } }),
                json!({ "a": 2, "o": { "x": 2, "y": 3 } }),
                json!({ "a": 3 }),
            ],
        );
        assert_eq!(out, json!({ "keep": true, "o": { "y": 3 } }));
        let messages: Vec<&str> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(diags.len(), 2, "{:?}", messages);
        assert!(messages[0].contains("'a'"));
        assert!(messages[1].contains("'o.x'"));
        assert!(diags.iter().all(|d| d.code == DiagnosticCode::MergeKeyCollision && d.is_error()));
    }

    #[test]
    fn dotted_keys_do_not_alias_nested_paths() {
        let (out, diags) = run(
            MergePolicy::Error,
            vec![
                json!({ "o": { "x": 1 } }),
                json!({ "o": { "x": 2 } }),
                json!({ "o.x": 3, "o": { "y": 4 } }),
            ],
        );
        assert_eq!(out, json!({ "o": { "y": 4 }, "o.x": 3 }));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("'o.x'"));

        let (out, diags) = run(
            MergePolicy::Error,
            vec![
                json!({ "o.x": 1, "o": { "y": 0 } }),
                json!({ "o.x": 2 }),
                json!({ "o": { "x": 5 } }),
            ],
        );
        assert_eq!(out, json!({ "o": { "y": 0, "x": 5 } }));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains(r#"'["o.x"]'"#));
    }

    #[test]
    fn append_requires_arrays() {
        let (out, diags) = run(
            MergePolicy::AppendArray,
            vec![json!([1, 2]), json!({ "no": true }), json!(null), json!([3])],
        );
        assert_eq!(out, json!([1, 2, 3]));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::MergeBranchNotArray);
        assert_eq!(diags[0].path, "root.steps[0].inputs[1]");
    }

    #[test]
    fn vacant_branches_are_ignored() {
        let (out, diags) = run(MergePolicy::Error, vec![json!(null), json!({ "a": 1 }), json!({})]);
        assert_eq!(out, json!({ "a": 1 }));
        assert!(diags.is_empty());
    }
}
