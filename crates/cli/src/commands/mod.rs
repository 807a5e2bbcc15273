pub(crate) mod benchmark;
pub(crate) mod convert;
pub(crate) mod rules;

use acv_core::Diagnostic;

pub(crate) fn diagnostics_json(diagnostics: &[Diagnostic]) -> serde_json::Value {
    diagnostics.iter().map(Diagnostic::to_json_value).collect()
}
