//! Boundaries to the services that host the engine.
//!
//! Rule generation and HTTP delivery live outside this workspace. A host
//! plugs them in through [`RulesGenerator`] and [`Forwarder`]; the helpers
//! here only decide what may cross each boundary.

use acv_core::error::Diagnostic;
use acv_core::plan::CompiledPlan;
use acv_core::source::FragmentSource;
use acv_interchange::{CodecLimits, Format, ParseError};
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::engine::{self, ConversionResult};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("rules generator failed: {0}")]
    Generator(String),
    #[error("generated rules do not compile ({} diagnostics)", .0.len())]
    Rejected(Vec<Diagnostic>),
    #[error(transparent)]
    Input(#[from] ParseError),
    /// The conversion produced no output; nothing was forwarded.
    #[error("conversion failed with {} errors; nothing forwarded", .0.errors.len())]
    NotConverted(Box<ConversionResult>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatPair {
    pub input: Format,
    pub output: Format,
}

/// Produces a rules document from an example input and the output it
/// should become.
pub trait RulesGenerator: Send + Sync {
    fn generate(
        &self,
        input_sample: &str,
        output_sample: &str,
        formats: FormatPair,
    ) -> Result<String, HostError>;
}

/// Ask `generator` for rules and keep them only if they compile.
pub fn bootstrap_rules(
    generator: &dyn RulesGenerator,
    input_sample: &str,
    output_sample: &str,
    formats: FormatPair,
    source: &dyn FragmentSource,
) -> Result<(String, CompiledPlan), HostError> {
    let text = generator.generate(input_sample, output_sample, formats)?;
    let plan = acv_core::compile(&text, source).map_err(HostError::Rejected)?;
    Ok((text, plan))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    pub method: String,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardResponse {
    pub status_code: u16,
    pub headers: IndexMap<String, String>,
    pub body: String,
    pub duration_ms: u64,
    /// Transport failure, when the destination could not be reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Delivers a converted payload downstream.
pub trait Forwarder: Send + Sync {
    fn forward(&self, request: &ForwardRequest) -> ForwardResponse;
}

/// Where and how [`deliver`] sends its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub method: String,
    pub url: String,
    pub headers: IndexMap<String, String>,
}

/// Convert `text` with `plan` and forward the result. A conversion with
/// errors is never forwarded.
pub fn deliver(
    forwarder: &dyn Forwarder,
    plan: &CompiledPlan,
    text: &str,
    destination: &Destination,
    limits: &CodecLimits,
) -> Result<(ForwardResponse, ConversionResult), HostError> {
    let converted = engine::convert(plan, text, plan.input_format, plan.output_format, false, limits)?;
    let Some(body) = converted.text else {
        return Err(HostError::NotConverted(Box::new(converted.result)));
    };
    let mut headers = destination.headers.clone();
    headers
        .entry("Content-Type".to_string())
        .or_insert_with(|| content_type(plan.output_format).to_string());
    let request = ForwardRequest {
        method: destination.method.clone(),
        url: destination.url.clone(),
        headers,
        body,
    };
    Ok((forwarder.forward(&request), converted.result))
}

fn content_type(format: Format) -> &'static str {
    match format {
        Format::Json => "application/json",
        Format::Xml => "application/xml",
        Format::Query => "application/x-www-form-urlencoded",
    }
}
