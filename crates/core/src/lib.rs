//! acv-core: rules model and rule compiler.
//!
//! Takes a rules document from text to a validated, fragment-free
//! [`CompiledPlan`] through numbered passes:
//!
//! - parse ([`parser`]): JSON text to [`RulesDocument`]
//! - pass 1 ([`pass1_bundle`]): includes and fragment inlining
//! - pass 2 ([`pass2_paths`]): path syntax, wildcard scope, format keys
//! - pass 3 ([`pass3_transforms`]): transform names, arity, arguments
//! - pass 4 ([`pass4_structure`]): collisions, conditions, empty merges
//! - pass 5 ([`pass5_plan`]): lowering to the execution plan
//!
//! [`compile()`] runs them all; [`validate()`] wraps the result for
//! reporting. Every problem is a [`Diagnostic`] with a stable code.

pub mod ast;
pub mod compile;
pub mod error;
pub mod parser;
pub mod pass1_bundle;
pub mod pass2_paths;
pub mod pass3_transforms;
pub mod pass4_structure;
pub mod pass5_plan;
pub mod path;
pub mod plan;
pub mod serialize;
pub mod source;
pub mod transform;
pub mod version;
pub mod walk;

// ── Convenience re-exports: key types ────────────────────────────────

pub use ast::{ConditionExpr, FieldMapping, FieldSource, MergePolicy, RuleNode, RulesDocument};
pub use error::{has_errors, Diagnostic, DiagnosticCode, Severity};
pub use path::{PathSegment, SourcePath, TargetPath};
pub use plan::{CompiledPlan, PlanNode};
pub use source::{FileSystemSource, FragmentSource, InMemorySource, SourceError};
pub use transform::TransformKind;
pub use version::{SchemaVersion, ENGINE_VERSION, SUPPORTED_VERSIONS};

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use compile::{compile, compile_document, validate, ValidationReport};
pub use parser::parse_rules;
pub use pass1_bundle::{bundle, bundle_document, BundleOutcome};
pub use serialize::document_to_json;
