//! The rules model: a parsed, typed rules document.
//!
//! Paths are kept as written so the doctor can repair them and the
//! serializer can write the document back unchanged. They are parsed into
//! [`crate::path`] types during compilation.

use acv_interchange::{Format, Value};
use indexmap::IndexMap;

// ──────────────────────────────────────────────
// Document
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RulesDocument {
    pub schema_version: String,
    pub input_format: Format,
    pub output_format: Format,
    /// Names of external fragment libraries, resolved by the bundler.
    pub includes: Vec<String>,
    pub fragments: IndexMap<String, RuleNode>,
    pub root: RuleNode,
}

/// A fragment library loaded through an `includes` entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Library {
    pub includes: Vec<String>,
    pub fragments: IndexMap<String, RuleNode>,
}

// ──────────────────────────────────────────────
// Nodes
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RuleNode {
    Field(FieldMapping),
    Condition(ConditionNode),
    Merge(MergeNode),
    Split(SplitNode),
    Fragment(FragmentRef),
    Sequence(SequenceNode),
}

impl RuleNode {
    /// The `kind` tag used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            RuleNode::Field(_) => "field",
            RuleNode::Condition(_) => "condition",
            RuleNode::Merge(_) => "merge",
            RuleNode::Split(_) => "split",
            RuleNode::Fragment(_) => "fragment",
            RuleNode::Sequence(_) => "sequence",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub source: FieldSource,
    pub transforms: Vec<TransformSpec>,
    pub target: String,
    pub optional: bool,
}

/// Where a field mapping reads its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    Path(String),
    Constant(Value),
}

/// A transform invocation as written: a name plus positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSpec {
    pub name: String,
    pub args: Vec<Value>,
}

impl TransformSpec {
    pub fn named(name: &str) -> Self {
        TransformSpec {
            name: name.to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionNode {
    pub when: ConditionExpr,
    pub then: Box<RuleNode>,
    pub otherwise: Option<Box<RuleNode>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MergePolicy {
    #[default]
    LastWins,
    FirstWins,
    Error,
    AppendArray,
}

impl MergePolicy {
    pub const ALL: [MergePolicy; 4] = [
        MergePolicy::LastWins,
        MergePolicy::FirstWins,
        MergePolicy::Error,
        MergePolicy::AppendArray,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MergePolicy::LastWins => "lastWins",
            MergePolicy::FirstWins => "firstWins",
            MergePolicy::Error => "error",
            MergePolicy::AppendArray => "appendArray",
        }
    }

    pub fn from_name(name: &str) -> Option<MergePolicy> {
        MergePolicy::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeNode {
    pub inputs: Vec<RuleNode>,
    pub policy: MergePolicy,
    /// Where the merged value is written; `""` is the scope root.
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitNode {
    pub source: String,
    pub item: Box<RuleNode>,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceNode {
    pub steps: Vec<RuleNode>,
}

// ──────────────────────────────────────────────
// Conditions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    Equals { source: String, value: Value },
    Exists { source: String },
    Matches { source: String, pattern: String },
    And { conditions: Vec<ConditionExpr> },
    Or { conditions: Vec<ConditionExpr> },
    Not { condition: Box<ConditionExpr> },
    Literal { value: bool },
    GreaterThan { source: String, value: Value },
    LessThan { source: String, value: Value },
}

impl ConditionExpr {
    /// The `op` tag used on the wire.
    pub fn op(&self) -> &'static str {
        match self {
            ConditionExpr::Equals { .. } => "equals",
            ConditionExpr::Exists { .. } => "exists",
            ConditionExpr::Matches { .. } => "matches",
            ConditionExpr::And { .. } => "and",
            ConditionExpr::Or { .. } => "or",
            ConditionExpr::Not { .. } => "not",
            ConditionExpr::Literal { .. } => "literal",
            ConditionExpr::GreaterThan { .. } => "greaterThan",
            ConditionExpr::LessThan { .. } => "lessThan",
        }
    }

    /// Source paths read by this expression, in evaluation order.
    pub fn sources(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                ConditionExpr::Equals { source, .. }
                | ConditionExpr::Exists { source }
                | ConditionExpr::Matches { source, .. }
                | ConditionExpr::GreaterThan { source, .. }
                | ConditionExpr::LessThan { source, .. } => out.push(source.as_str()),
                ConditionExpr::And { conditions } | ConditionExpr::Or { conditions } => {
                    stack.extend(conditions.iter().rev());
                }
                ConditionExpr::Not { condition } => stack.push(condition),
                ConditionExpr::Literal { .. } => {}
            }
        }
        out
    }

    /// The constant truth value of the expression, when it reads no source.
    pub fn constant_value(&self) -> Option<bool> {
        match self {
            ConditionExpr::Literal { value } => Some(*value),
            ConditionExpr::Not { condition } => condition.constant_value().map(|v| !v),
            ConditionExpr::And { conditions } => {
                let values: Vec<Option<bool>> =
                    conditions.iter().map(ConditionExpr::constant_value).collect();
                if values.contains(&Some(false)) {
                    Some(false)
                } else if values.iter().all(Option::is_some) {
                    Some(true)
                } else {
                    None
                }
            }
            ConditionExpr::Or { conditions } => {
                let values: Vec<Option<bool>> =
                    conditions.iter().map(ConditionExpr::constant_value).collect();
                if values.contains(&Some(true)) {
                    Some(true)
                } else if values.iter().all(Option::is_some) {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}
