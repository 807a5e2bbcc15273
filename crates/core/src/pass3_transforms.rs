//! Pass 3: transform names, arity and arguments.
//!
//! Diagnostics point at the offending pipeline entry,
//! `<node>.transforms[<i>]`.

use crate::ast::*;
use crate::error::{Diagnostic, DiagnosticCode};
use crate::transform::{build_op, template_paths, TransformKind};
use crate::walk;

pub fn check_transforms(document: &RulesDocument) -> Vec<(usize, Diagnostic)> {
    let mut out = Vec::new();
    for visit in walk::preorder(&document.root, "root") {
        let RuleNode::Field(field) = visit.node else {
            continue;
        };
        for (i, spec) in field.transforms.iter().enumerate() {
            let path = format!("{}.transforms[{}]", visit.path, i);
            for diagnostic in check_one(spec, &path, visit.split_depth) {
                out.push((visit.index, diagnostic));
            }
        }
    }
    out
}

fn check_one(spec: &TransformSpec, path: &str, split_depth: usize) -> Vec<Diagnostic> {
    let Some(kind) = TransformKind::from_name(&spec.name) else {
        let message = match TransformKind::from_loose_name(&spec.name) {
            Some(k) => format!("unknown transform '{}'; did you mean '{}'?", spec.name, k.name()),
            None => format!("unknown transform '{}'", spec.name),
        };
        return vec![Diagnostic::new(DiagnosticCode::UnknownTransform, path, message)];
    };

    if spec.args.len() != kind.arity() {
        return vec![Diagnostic::new(
            DiagnosticCode::TransformArity,
            path,
            format!(
                "'{}' takes {} argument(s), got {}",
                kind.name(),
                kind.arity(),
                spec.args.len()
            ),
        )];
    }

    let op = match build_op(kind, &spec.args) {
        Ok(op) => op,
        Err(message) => {
            return vec![Diagnostic::new(
                DiagnosticCode::InvalidTransformArgument,
                path,
                message,
            )]
        }
    };

    template_paths(&op)
        .into_iter()
        .filter(|p| p.wildcard_count() > split_depth)
        .map(|p| {
            Diagnostic::new(
                DiagnosticCode::WildcardOutsideSplit,
                path,
                format!(
                    "template placeholder '{}' uses a wildcard outside an enclosing split item",
                    p
                ),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rules;

    fn check(transforms: &str) -> Vec<Diagnostic> {
        let text = format!(
            r#"{{ "schemaVersion": "1.2", "inputFormat": "json", "outputFormat": "json",
                 "root": {{ "kind": "field", "source": "a", "target": "b", "transforms": {} }} }}"#,
            transforms
        );
        check_transforms(&parse_rules(&text).unwrap())
            .into_iter()
            .map(|(_, d)| d)
            .collect()
    }

    #[test]
    fn valid_pipeline_passes() {
        let found = check(
            r##"["trim", "toNumber", { "name": "round", "args": [2] },
                { "name": "template", "args": ["#{}"] },
                { "name": "dateFormat", "args": ["[year]-[month]-[day]", "rfc3339"] }]"##,
        );
        assert!(found.is_empty(), "{:?}", found);
    }

    #[test]
    fn unknown_name_suggests_canonical_spelling() {
        let found = check(r#"["trim", "ToNumber"]"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, DiagnosticCode::UnknownTransform);
        assert_eq!(found[0].path, "root.transforms[1]");
        assert!(found[0].message.contains("did you mean 'toNumber'"));
    }

    #[test]
    fn arity_is_checked_before_arguments() {
        let found = check(r#"[{ "name": "replace", "args": ["("] }]"#);
        assert_eq!(found[0].code, DiagnosticCode::TransformArity);
        let found = check(r#"[{ "name": "trim", "args": [1] }]"#);
        assert_eq!(found[0].code, DiagnosticCode::TransformArity);
    }

    #[test]
    fn invalid_arguments() {
        for transforms in [
            r#"[{ "name": "replace", "args": ["(", "x"] }]"#,
            r#"[{ "name": "round", "args": [1.5] }]"#,
            r#"[{ "name": "round", "args": ["2"] }]"#,
            r#"[{ "name": "split", "args": [""] }]"#,
            r#"[{ "name": "dateFormat", "args": ["[yeer]", "rfc3339"] }]"#,
            r#"[{ "name": "template", "args": ["{unclosed"] }]"#,
        ] {
            let found = check(transforms);
            assert_eq!(found.len(), 1, "{}", transforms);
            assert_eq!(found[0].code, DiagnosticCode::InvalidTransformArgument, "{}", transforms);
        }
    }

    #[test]
    fn template_wildcards_need_a_split() {
        let found = check(r#"[{ "name": "template", "args": ["{orders[*].id}"] }]"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, DiagnosticCode::WildcardOutsideSplit);
    }
}
