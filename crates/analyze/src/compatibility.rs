//! Compatibility of a rules document with a target engine version.
//!
//! Every construct a document can use (node kinds, merge policies,
//! condition operators, transforms) has a row in [`FEATURES`] recording
//! when it was introduced and, where it applies, deprecated, removed or
//! changed in behavior. The check only reads the document.

use std::collections::HashSet;

use acv_core::ast::{ConditionExpr, RuleNode, RulesDocument};
use acv_core::version::{SchemaVersion, ENGINE_VERSION};
use acv_core::walk;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    NodeKind,
    MergePolicy,
    ConditionOp,
    Transform,
}

impl Category {
    fn label(self) -> &'static str {
        match self {
            Category::NodeKind => "node kind",
            Category::MergePolicy => "merge policy",
            Category::ConditionOp => "condition operator",
            Category::Transform => "transform",
        }
    }
}

/// One row of the version-feature table.
#[derive(Debug, Clone, Copy)]
pub struct Feature {
    pub category: Category,
    pub name: &'static str,
    pub introduced: SchemaVersion,
    pub deprecated: Option<SchemaVersion>,
    pub removed: Option<SchemaVersion>,
    pub behavior_change: Option<(SchemaVersion, &'static str)>,
}

const fn feature(category: Category, name: &'static str, major: u32, minor: u32) -> Feature {
    Feature {
        category,
        name,
        introduced: SchemaVersion::new(major, minor),
        deprecated: None,
        removed: None,
        behavior_change: None,
    }
}

const fn changed(mut f: Feature, major: u32, minor: u32, what: &'static str) -> Feature {
    f.behavior_change = Some((SchemaVersion::new(major, minor), what));
    f
}

const fn deprecated(mut f: Feature, major: u32, minor: u32) -> Feature {
    f.deprecated = Some(SchemaVersion::new(major, minor));
    f
}

const fn removed(mut f: Feature, major: u32, minor: u32) -> Feature {
    f.removed = Some(SchemaVersion::new(major, minor));
    f
}

use Category::*;

pub const FEATURES: &[Feature] = &[
    feature(NodeKind, "field", 1, 0),
    feature(NodeKind, "condition", 1, 0),
    feature(NodeKind, "merge", 1, 0),
    feature(NodeKind, "sequence", 1, 0),
    feature(NodeKind, "split", 1, 1),
    feature(NodeKind, "fragment", 1, 1),
    feature(MergePolicy, "lastWins", 1, 0),
    deprecated(feature(MergePolicy, "firstWins", 1, 0), 1, 2),
    feature(MergePolicy, "error", 1, 1),
    feature(MergePolicy, "appendArray", 1, 2),
    feature(ConditionOp, "equals", 1, 0),
    feature(ConditionOp, "exists", 1, 0),
    feature(ConditionOp, "and", 1, 0),
    feature(ConditionOp, "or", 1, 0),
    feature(ConditionOp, "not", 1, 0),
    feature(ConditionOp, "matches", 1, 1),
    feature(ConditionOp, "literal", 1, 1),
    feature(ConditionOp, "greaterThan", 1, 2),
    feature(ConditionOp, "lessThan", 1, 2),
    feature(Transform, "trim", 1, 0),
    feature(Transform, "uppercase", 1, 0),
    feature(Transform, "lowercase", 1, 0),
    feature(Transform, "toNumber", 1, 0),
    changed(
        feature(Transform, "toString", 1, 0),
        1,
        1,
        "numbers render in shortest round-trip form",
    ),
    feature(Transform, "default", 1, 0),
    // Superseded by `template` with a case transform; no longer in the catalog.
    removed(deprecated(feature(Transform, "capitalize", 1, 0), 1, 1), 1, 2),
    feature(Transform, "toBool", 1, 1),
    changed(
        feature(Transform, "round", 1, 1),
        1,
        2,
        "halves round away from zero on the written decimal digits",
    ),
    feature(Transform, "template", 1, 1),
    feature(Transform, "dateFormat", 1, 2),
    feature(Transform, "split", 1, 2),
    feature(Transform, "join", 1, 2),
    feature(Transform, "replace", 1, 2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReasonKind {
    /// The document declares a newer schema than the target.
    SchemaVersion,
    /// The target is a major version this engine does not know.
    TargetMajor,
    NotYetIntroduced,
    Removed,
    Deprecated,
    BehaviorChange,
}

impl ReasonKind {
    /// Whether a reason of this kind makes the document incompatible.
    pub fn is_breaking(self) -> bool {
        !matches!(self, ReasonKind::Deprecated | ReasonKind::BehaviorChange)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reason {
    pub kind: ReasonKind,
    pub construct: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityReport {
    pub is_compatible: bool,
    pub reasons: Vec<Reason>,
}

pub fn check_compatibility(document: &RulesDocument, target: SchemaVersion) -> CompatibilityReport {
    let mut reasons = Vec::new();
    if target.major > ENGINE_VERSION.major {
        reasons.push(Reason {
            kind: ReasonKind::TargetMajor,
            construct: format!("target {}", target),
            message: format!(
                "target {} is a newer major version than this engine ({})",
                target, ENGINE_VERSION
            ),
        });
    }
    // Unparsable versions are rejected by the parser.
    let declared = document.schema_version.parse::<SchemaVersion>().ok();
    if let Some(declared) = declared.filter(|d| *d > target) {
        reasons.push(Reason {
            kind: ReasonKind::SchemaVersion,
            construct: format!("schemaVersion {}", declared),
            message: format!("document declares schema {} but the target is {}", declared, target),
        });
    }

    let mut seen: HashSet<(ReasonKind, String)> = HashSet::new();
    for (category, name) in constructs(document) {
        let Some(row) = FEATURES.iter().find(|f| f.category == category && f.name == name) else {
            continue;
        };
        for reason in assess(row, declared, target) {
            if seen.insert((reason.kind, reason.construct.clone())) {
                reasons.push(reason);
            }
        }
    }

    CompatibilityReport {
        is_compatible: !reasons.iter().any(|r| r.kind.is_breaking()),
        reasons,
    }
}

fn assess(row: &Feature, declared: Option<SchemaVersion>, target: SchemaVersion) -> Vec<Reason> {
    let construct = format!("{} '{}'", row.category.label(), row.name);
    let reason = |kind, message: String| Reason {
        kind,
        construct: construct.clone(),
        message,
    };
    let mut out = Vec::new();
    if row.introduced > target {
        out.push(reason(
            ReasonKind::NotYetIntroduced,
            format!("{} was introduced in {}", construct, row.introduced),
        ));
    }
    match (row.removed, row.deprecated) {
        (Some(removed), _) if removed <= target => out.push(reason(
            ReasonKind::Removed,
            format!("{} was removed in {}", construct, removed),
        )),
        (_, Some(deprecated)) if deprecated <= target => out.push(reason(
            ReasonKind::Deprecated,
            format!("{} is deprecated since {}", construct, deprecated),
        )),
        _ => {}
    }
    if let (Some((changed, what)), Some(declared)) = (row.behavior_change, declared) {
        let (low, high) = if declared <= target { (declared, target) } else { (target, declared) };
        if low < changed && changed <= high {
            out.push(reason(
                ReasonKind::BehaviorChange,
                format!("{} changed in {}: {}", construct, changed, what),
            ));
        }
    }
    out
}

/// Constructs used by the document, root first then fragments, each in
/// preorder.
fn constructs(document: &RulesDocument) -> Vec<(Category, String)> {
    let mut trees: Vec<&RuleNode> = vec![&document.root];
    trees.extend(document.fragments.values());

    let mut out = Vec::new();
    for tree in trees {
        for visit in walk::preorder(tree, "root") {
            out.push((NodeKind, visit.node.kind().to_string()));
            match visit.node {
                RuleNode::Field(field) => {
                    out.extend(field.transforms.iter().map(|t| (Transform, t.name.clone())));
                }
                RuleNode::Merge(merge) => out.push((MergePolicy, merge.policy.as_str().to_string())),
                RuleNode::Condition(cond) => {
                    let mut stack: Vec<&ConditionExpr> = vec![&cond.when];
                    while let Some(expr) = stack.pop() {
                        out.push((ConditionOp, expr.op().to_string()));
                        match expr {
                            ConditionExpr::And { conditions } | ConditionExpr::Or { conditions } => {
                                stack.extend(conditions.iter().rev());
                            }
                            ConditionExpr::Not { condition } => stack.push(condition),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
    }
    out
}
