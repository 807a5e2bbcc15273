//! Diagnostics and the error-code registry.
//!
//! Every code the engine can emit is a [`DiagnosticCode`] variant. The
//! published reference (`docs/error-codes.md`) lists each of them exactly
//! once; `tests/error_codes.rs` keeps the two in sync.

use std::fmt;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticCode {
    // ── Structural (compile, bundle, lint) ──────────────────────────
    InvalidJson,
    InvalidShape,
    UnknownFormat,
    MalformedSourcePath,
    MalformedTargetPath,
    PathNotValidForFormat,
    UnknownTransform,
    TransformArity,
    InvalidTransformArgument,
    TargetCollision,
    WildcardOutsideSplit,
    UnknownFragment,
    ReferenceCycle,
    InvalidCondition,
    UnsupportedSchemaVersion,
    IncludeUnavailable,
    EmptyMerge,
    DuplicateFragment,
    UnreachableBranch,
    NoOpNode,
    UnusedFragment,
    TransformKindMismatch,
    // ── Runtime (execution) ─────────────────────────────────────────
    OptionalSourceMissing,
    RequiredSourceMissing,
    TransformFailed,
    SplitSourceNotArray,
    MergeKeyCollision,
    MergeBranchNotArray,
    TargetWriteConflict,
    ConditionTypeMismatch,
    OutputNotRepresentable,
}

impl DiagnosticCode {
    pub const ALL: [DiagnosticCode; 31] = [
        DiagnosticCode::InvalidJson,
        DiagnosticCode::InvalidShape,
        DiagnosticCode::UnknownFormat,
        DiagnosticCode::MalformedSourcePath,
        DiagnosticCode::MalformedTargetPath,
        DiagnosticCode::PathNotValidForFormat,
        DiagnosticCode::UnknownTransform,
        DiagnosticCode::TransformArity,
        DiagnosticCode::InvalidTransformArgument,
        DiagnosticCode::TargetCollision,
        DiagnosticCode::WildcardOutsideSplit,
        DiagnosticCode::UnknownFragment,
        DiagnosticCode::ReferenceCycle,
        DiagnosticCode::InvalidCondition,
        DiagnosticCode::UnsupportedSchemaVersion,
        DiagnosticCode::IncludeUnavailable,
        DiagnosticCode::EmptyMerge,
        DiagnosticCode::DuplicateFragment,
        DiagnosticCode::UnreachableBranch,
        DiagnosticCode::NoOpNode,
        DiagnosticCode::UnusedFragment,
        DiagnosticCode::TransformKindMismatch,
        DiagnosticCode::OptionalSourceMissing,
        DiagnosticCode::RequiredSourceMissing,
        DiagnosticCode::TransformFailed,
        DiagnosticCode::SplitSourceNotArray,
        DiagnosticCode::MergeKeyCollision,
        DiagnosticCode::MergeBranchNotArray,
        DiagnosticCode::TargetWriteConflict,
        DiagnosticCode::ConditionTypeMismatch,
        DiagnosticCode::OutputNotRepresentable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::InvalidJson => "ACV-STR-001",
            DiagnosticCode::InvalidShape => "ACV-STR-002",
            DiagnosticCode::UnknownFormat => "ACV-STR-003",
            DiagnosticCode::MalformedSourcePath => "ACV-STR-004",
            DiagnosticCode::MalformedTargetPath => "ACV-STR-005",
            DiagnosticCode::PathNotValidForFormat => "ACV-STR-006",
            DiagnosticCode::UnknownTransform => "ACV-STR-007",
            DiagnosticCode::TransformArity => "ACV-STR-008",
            DiagnosticCode::InvalidTransformArgument => "ACV-STR-009",
            DiagnosticCode::TargetCollision => "ACV-STR-010",
            DiagnosticCode::WildcardOutsideSplit => "ACV-STR-011",
            DiagnosticCode::UnknownFragment => "ACV-STR-012",
            DiagnosticCode::ReferenceCycle => "ACV-STR-013",
            DiagnosticCode::InvalidCondition => "ACV-STR-014",
            DiagnosticCode::UnsupportedSchemaVersion => "ACV-STR-015",
            DiagnosticCode::IncludeUnavailable => "ACV-STR-016",
            DiagnosticCode::EmptyMerge => "ACV-STR-017",
            DiagnosticCode::DuplicateFragment => "ACV-STR-018",
            DiagnosticCode::UnreachableBranch => "ACV-STR-019",
            DiagnosticCode::NoOpNode => "ACV-STR-020",
            DiagnosticCode::UnusedFragment => "ACV-STR-021",
            DiagnosticCode::TransformKindMismatch => "ACV-STR-022",
            DiagnosticCode::OptionalSourceMissing => "ACV-RUN-001",
            DiagnosticCode::RequiredSourceMissing => "ACV-RUN-002",
            DiagnosticCode::TransformFailed => "ACV-RUN-003",
            DiagnosticCode::SplitSourceNotArray => "ACV-RUN-004",
            DiagnosticCode::MergeKeyCollision => "ACV-RUN-005",
            DiagnosticCode::MergeBranchNotArray => "ACV-RUN-006",
            DiagnosticCode::TargetWriteConflict => "ACV-RUN-007",
            DiagnosticCode::ConditionTypeMismatch => "ACV-RUN-008",
            DiagnosticCode::OutputNotRepresentable => "ACV-RUN-009",
        }
    }

    /// One-line description used in the published reference and `--help`.
    pub fn summary(self) -> &'static str {
        match self {
            DiagnosticCode::InvalidJson => "rules text is not valid JSON",
            DiagnosticCode::InvalidShape => "rules document or node has the wrong shape",
            DiagnosticCode::UnknownFormat => "inputFormat or outputFormat is not json, xml or query",
            DiagnosticCode::MalformedSourcePath => "source path does not follow the path grammar",
            DiagnosticCode::MalformedTargetPath => "target path does not follow the path grammar",
            DiagnosticCode::PathNotValidForFormat => "path key cannot be expressed in the declared format",
            DiagnosticCode::UnknownTransform => "transform name is not in the catalog",
            DiagnosticCode::TransformArity => "transform called with the wrong number of arguments",
            DiagnosticCode::InvalidTransformArgument => "transform argument is invalid",
            DiagnosticCode::TargetCollision => "two steps of one sequence write the same target outside a merge",
            DiagnosticCode::WildcardOutsideSplit => "wildcard index used outside an enclosing split item",
            DiagnosticCode::UnknownFragment => "fragment reference names no known fragment",
            DiagnosticCode::ReferenceCycle => "fragment or include references form a cycle",
            DiagnosticCode::InvalidCondition => "condition expression is malformed",
            DiagnosticCode::UnsupportedSchemaVersion => "schemaVersion is not supported by this engine",
            DiagnosticCode::IncludeUnavailable => "included library cannot be loaded or parsed",
            DiagnosticCode::EmptyMerge => "merge node has no inputs",
            DiagnosticCode::DuplicateFragment => "fragment name is defined more than once",
            DiagnosticCode::UnreachableBranch => "branch can never run because its condition is constant",
            DiagnosticCode::NoOpNode => "node has no effect",
            DiagnosticCode::UnusedFragment => "fragment is never referenced",
            DiagnosticCode::TransformKindMismatch => "transform receives a value kind it does not accept",
            DiagnosticCode::OptionalSourceMissing => "optional source is absent; nothing written",
            DiagnosticCode::RequiredSourceMissing => "required source is absent; nothing written",
            DiagnosticCode::TransformFailed => "transform failed; mapping aborted",
            DiagnosticCode::SplitSourceNotArray => "split source is missing or not an array",
            DiagnosticCode::MergeKeyCollision => "merge branches overlap under the error policy; key dropped",
            DiagnosticCode::MergeBranchNotArray => "appendArray merge branch did not produce an array",
            DiagnosticCode::TargetWriteConflict => "write conflicts with a value already in the output",
            DiagnosticCode::ConditionTypeMismatch => "ordered comparison between incompatible kinds",
            DiagnosticCode::OutputNotRepresentable => "output value has no form in the output format",
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            DiagnosticCode::UnreachableBranch
            | DiagnosticCode::NoOpNode
            | DiagnosticCode::UnusedFragment
            | DiagnosticCode::TransformKindMismatch
            | DiagnosticCode::OptionalSourceMissing
            | DiagnosticCode::ConditionTypeMismatch => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn is_runtime(self) -> bool {
        self.as_str().starts_with("ACV-RUN")
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DiagnosticCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A structural or runtime finding, located by node path
/// (`root.steps[2].then`, `fragments.contact`, `includes[0]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    /// A diagnostic at the code's default severity.
    pub fn new(code: DiagnosticCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            severity: code.default_severity(),
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code.as_str(),
            "severity": self.severity.as_str(),
            "path": self.path,
            "message": self.message,
        })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} at {}: {}",
            self.code, self.severity, self.path, self.message
        )
    }
}

/// True when any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique_and_well_formed() {
        let pattern = regex::Regex::new(r"^ACV-(STR|RUN)-\d{3}$").unwrap();
        let mut seen = HashSet::new();
        for code in DiagnosticCode::ALL {
            assert!(pattern.is_match(code.as_str()), "{}", code);
            assert!(seen.insert(code.as_str()), "duplicate {}", code);
        }
    }

    #[test]
    fn runtime_codes_are_flagged() {
        assert!(DiagnosticCode::TransformFailed.is_runtime());
        assert!(!DiagnosticCode::TargetCollision.is_runtime());
    }

    #[test]
    fn serializes_code_as_string() {
        let d = Diagnostic::new(DiagnosticCode::TargetCollision, "root.steps[1]", "target 'status'");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["code"], "ACV-STR-010");
        assert_eq!(json["severity"], "error");
        assert_eq!(json, d.to_json_value());
    }

    #[test]
    fn default_severities() {
        assert_eq!(
            Diagnostic::new(DiagnosticCode::OptionalSourceMissing, "root", "").severity,
            Severity::Warning
        );
        assert!(Diagnostic::new(DiagnosticCode::RequiredSourceMissing, "root", "").is_error());
    }
}
