//! Execution side of the ACV conversion engine.
//!
//! A [`CompiledPlan`](acv_core::plan::CompiledPlan) from `acv-core` is run
//! against an input [`Value`](acv_interchange::Value) in one deterministic
//! depth-first pass. Once the input has parsed, nothing fails a conversion
//! as a whole: problems become `ACV-RUN-*` diagnostics on the
//! [`ConversionResult`].

pub mod cache;
pub mod engine;
pub mod host;
pub mod merge;
pub mod predicate;
pub mod profiler;
pub mod scope;
pub mod transforms;

// ── Re-exports ──────────────────────────────────────────────────────────

pub use cache::PlanCache;
pub use engine::{convert, execute, execute_traced, ConversionResult, ConvertedText, TransformFailure};
pub use host::{
    bootstrap_rules, deliver, Destination, FormatPair, ForwardRequest, ForwardResponse, Forwarder,
    HostError, RulesGenerator,
};
pub use profiler::{profile, ProfileError, ProfileReport};
