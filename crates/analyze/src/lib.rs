//! Static tooling over rules documents.
//!
//! - [`lint`]: compiler diagnostics plus advisory warnings
//! - [`doctor`]: diagnosis with an allow-list of safe fixes
//! - [`check_compatibility`]: a document against a target engine version
//!
//! None of these run a conversion except the doctor, and only against a
//! caller-supplied sample.

pub mod compatibility;
pub mod doctor;
pub mod lint;

pub use compatibility::{check_compatibility, CompatibilityReport, Reason, ReasonKind};
pub use doctor::{doctor, DoctorError, DoctorOptions, DoctorReport, Fix, FixKind};
pub use lint::{lint, lint_document, LintReport};
