//! The compiled execution plan.
//!
//! A plan is the fragment-free, validated form of a rules document with
//! every path parsed and every regex compiled. It is immutable and shared
//! read-only between conversions (`Arc<CompiledPlan>` is `Send + Sync`).

use acv_interchange::{Format, Value};
use regex::Regex;

use crate::ast::MergePolicy;
use crate::path::{SourcePath, TargetPath};
use crate::transform::{TransformKind, TransformOp};

#[derive(Debug, Clone)]
pub struct CompiledPlan {
    pub schema_version: String,
    pub input_format: Format,
    pub output_format: Format,
    pub root: PlanNode,
    /// Number of nodes in the plan tree.
    pub node_count: usize,
}

#[derive(Debug, Clone)]
pub enum PlanNode {
    Field(PlanField),
    Condition(PlanCondition),
    Merge(PlanMerge),
    Split(PlanSplit),
    Sequence(Vec<PlanNode>),
}

#[derive(Debug, Clone)]
pub struct PlanField {
    pub source: PlanSource,
    pub transforms: Vec<PlanTransform>,
    pub target: TargetPath,
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub enum PlanSource {
    Path(SourcePath),
    Constant(Value),
}

#[derive(Debug, Clone)]
pub struct PlanTransform {
    pub kind: TransformKind,
    pub op: TransformOp,
}

#[derive(Debug, Clone)]
pub struct PlanCondition {
    pub when: Predicate,
    pub then: Box<PlanNode>,
    pub otherwise: Option<Box<PlanNode>>,
}

#[derive(Debug, Clone)]
pub struct PlanMerge {
    pub inputs: Vec<PlanNode>,
    pub policy: MergePolicy,
    pub target: TargetPath,
}

#[derive(Debug, Clone)]
pub struct PlanSplit {
    pub source: SourcePath,
    pub item: Box<PlanNode>,
    pub target: TargetPath,
}

/// A compiled condition expression.
#[derive(Debug, Clone)]
pub enum Predicate {
    Equals { source: SourcePath, value: Value },
    Exists { source: SourcePath },
    Matches { source: SourcePath, regex: Regex },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Literal(bool),
    GreaterThan { source: SourcePath, value: Value },
    LessThan { source: SourcePath, value: Value },
}

impl Predicate {
    pub fn op(&self) -> &'static str {
        match self {
            Predicate::Equals { .. } => "equals",
            Predicate::Exists { .. } => "exists",
            Predicate::Matches { .. } => "matches",
            Predicate::And(_) => "and",
            Predicate::Or(_) => "or",
            Predicate::Not(_) => "not",
            Predicate::Literal(_) => "literal",
            Predicate::GreaterThan { .. } => "greaterThan",
            Predicate::LessThan { .. } => "lessThan",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn plan_is_shareable_across_threads() {
        assert_send_sync::<CompiledPlan>();
        assert_send_sync::<std::sync::Arc<CompiledPlan>>();
    }
}
