//! Rule compiler: rules text -> [`CompiledPlan`].
//!
//! A thin orchestrator over the numbered passes. Unlike a fail-fast
//! pipeline, every check pass runs and contributes diagnostics; a single
//! error anywhere means no plan.

use serde::Serialize;

use crate::ast::RulesDocument;
use crate::error::{has_errors, Diagnostic};
use crate::parser;
use crate::pass1_bundle;
use crate::pass2_paths;
use crate::pass3_transforms;
use crate::pass4_structure;
use crate::pass5_plan;
use crate::plan::CompiledPlan;
use crate::source::FragmentSource;

/// Compile rules text, resolving includes through `source`.
pub fn compile(text: &str, source: &dyn FragmentSource) -> Result<CompiledPlan, Vec<Diagnostic>> {
    // Pass 0: parse
    let document = parser::parse_rules(text)?;
    compile_document(&document, source)
}

pub fn compile_document(
    document: &RulesDocument,
    source: &dyn FragmentSource,
) -> Result<CompiledPlan, Vec<Diagnostic>> {
    // Pass 1: includes and fragments
    let outcome = pass1_bundle::bundle_document(document, source);
    let mut diagnostics = outcome.diagnostics;

    // Passes 2-4: checks over the inlined tree
    diagnostics.extend(check_resolved(&outcome.document));
    if has_errors(&diagnostics) {
        return Err(diagnostics);
    }

    // Pass 5: lowering
    pass5_plan::build_plan(&outcome.document)
}

/// Run passes 2-4 on a fragment-free document. Diagnostics come back in
/// tree order; within one node, in pass order.
pub fn check_resolved(document: &RulesDocument) -> Vec<Diagnostic> {
    check_resolved_indexed(document)
        .into_iter()
        .map(|(_, d)| d)
        .collect()
}

/// [`check_resolved`] with each diagnostic's preorder node index.
pub fn check_resolved_indexed(document: &RulesDocument) -> Vec<(usize, Diagnostic)> {
    let mut found = pass2_paths::check_paths(document);
    found.extend(pass3_transforms::check_transforms(document));
    found.extend(pass4_structure::check_structure(document));
    // Stable: same-node diagnostics keep pass order.
    found.sort_by_key(|(index, _)| *index);
    found
}

/// Result of `rules validate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<Diagnostic>,
}

pub fn validate(text: &str, source: &dyn FragmentSource) -> ValidationReport {
    match compile(text, source) {
        Ok(_) => ValidationReport {
            is_valid: true,
            errors: Vec::new(),
        },
        Err(errors) => ValidationReport {
            is_valid: false,
            errors,
        },
    }
}

impl ValidationReport {
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "isValid": self.is_valid,
            "errors": self.errors.iter().map(Diagnostic::to_json_value).collect::<Vec<_>>(),
        })
    }
}
