//! Rules text to [`RulesDocument`].
//!
//! The JSON is walked by hand rather than derived so every shape problem
//! becomes a located diagnostic and parsing continues past the first one.

use acv_interchange::{Format, Value};
use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::ast::*;
use crate::error::{Diagnostic, DiagnosticCode};
use crate::version::{SchemaVersion, ENGINE_VERSION};

/// Path used for diagnostics about the document as a whole.
pub const DOCUMENT_PATH: &str = "document";

/// Parse rules text. Any diagnostic is fatal: there is no partial document.
pub fn parse_rules(text: &str) -> Result<RulesDocument, Vec<Diagnostic>> {
    let json: Json = serde_json::from_str(text).map_err(|e| {
        vec![Diagnostic::new(
            DiagnosticCode::InvalidJson,
            DOCUMENT_PATH,
            e.to_string(),
        )]
    })?;
    document_from_json(&json)
}

/// Build a document from already-parsed JSON.
pub fn document_from_json(json: &Json) -> Result<RulesDocument, Vec<Diagnostic>> {
    let mut p = Parser::new("");
    let document = p.document(json);
    match document {
        Some(doc) if p.diagnostics.is_empty() => Ok(doc),
        _ => Err(p.diagnostics),
    }
}

/// Parse a fragment library: `{ "includes": [...], "fragments": {...} }`.
/// Diagnostic paths are prefixed with `<name>:`.
pub fn parse_library(text: &str, name: &str) -> Result<Library, Vec<Diagnostic>> {
    let prefix = format!("{}:", name);
    let json: Json = serde_json::from_str(text).map_err(|e| {
        vec![Diagnostic::new(
            DiagnosticCode::InvalidJson,
            format!("{}{}", prefix, DOCUMENT_PATH),
            e.to_string(),
        )]
    })?;
    let mut p = Parser::new(&prefix);
    let library = p.library(&json);
    match library {
        Some(lib) if p.diagnostics.is_empty() => Ok(lib),
        _ => Err(p.diagnostics),
    }
}

struct Parser {
    prefix: String,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    fn new(prefix: &str) -> Self {
        Parser {
            prefix: prefix.to_string(),
            diagnostics: Vec::new(),
        }
    }

    fn report(&mut self, code: DiagnosticCode, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(
            code,
            format!("{}{}", self.prefix, path),
            message,
        ));
    }

    fn shape(&mut self, path: &str, message: impl Into<String>) {
        self.report(DiagnosticCode::InvalidShape, path, message);
    }

    // ── Document level ──────────────────────────────────────────────

    fn document(&mut self, json: &Json) -> Option<RulesDocument> {
        let Some(obj) = json.as_object() else {
            self.shape(DOCUMENT_PATH, "rules document must be a JSON object");
            return None;
        };

        let schema_version = self.schema_version(obj.get("schemaVersion"));
        let input_format = self.format(obj.get("inputFormat"), "inputFormat");
        let output_format = self.format(obj.get("outputFormat"), "outputFormat");
        let includes = self.includes(obj.get("includes"));
        let fragments = self.fragments(obj.get("fragments"));
        let root = match obj.get("root") {
            Some(root) => self.node(root, "root"),
            None => {
                self.shape(DOCUMENT_PATH, "missing 'root'");
                None
            }
        };

        Some(RulesDocument {
            schema_version: schema_version?,
            input_format: input_format?,
            output_format: output_format?,
            includes,
            fragments,
            root: root?,
        })
    }

    fn library(&mut self, json: &Json) -> Option<Library> {
        let Some(obj) = json.as_object() else {
            self.shape(DOCUMENT_PATH, "fragment library must be a JSON object");
            return None;
        };
        Some(Library {
            includes: self.includes(obj.get("includes")),
            fragments: self.fragments(obj.get("fragments")),
        })
    }

    fn schema_version(&mut self, json: Option<&Json>) -> Option<String> {
        let Some(json) = json else {
            self.shape(DOCUMENT_PATH, "missing 'schemaVersion'");
            return None;
        };
        let Some(text) = json.as_str() else {
            self.shape("schemaVersion", "'schemaVersion' must be a string");
            return None;
        };
        match text.parse::<SchemaVersion>() {
            Ok(v) if v.is_supported() => Some(text.to_string()),
            Ok(v) => {
                self.report(
                    DiagnosticCode::UnsupportedSchemaVersion,
                    "schemaVersion",
                    format!(
                        "schema version {} is not supported (this engine supports up to {})",
                        v, ENGINE_VERSION
                    ),
                );
                None
            }
            Err(e) => {
                self.report(DiagnosticCode::UnsupportedSchemaVersion, "schemaVersion", e);
                None
            }
        }
    }

    fn format(&mut self, json: Option<&Json>, field: &str) -> Option<Format> {
        let Some(json) = json else {
            self.shape(DOCUMENT_PATH, format!("missing '{}'", field));
            return None;
        };
        let Some(text) = json.as_str() else {
            self.shape(field, format!("'{}' must be a string", field));
            return None;
        };
        match text.parse::<Format>() {
            Ok(f) if f.as_str() == text => Some(f),
            _ => {
                self.report(
                    DiagnosticCode::UnknownFormat,
                    field,
                    format!("unknown format '{}' (expected json, xml or query)", text),
                );
                None
            }
        }
    }

    fn includes(&mut self, json: Option<&Json>) -> Vec<String> {
        let Some(json) = json else {
            return Vec::new();
        };
        let Some(items) = json.as_array() else {
            self.shape("includes", "'includes' must be an array of library names");
            return Vec::new();
        };
        let mut names = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(name) if !name.is_empty() => names.push(name.to_string()),
                _ => self.shape(
                    &format!("includes[{}]", i),
                    "library name must be a non-empty string",
                ),
            }
        }
        names
    }

    fn fragments(&mut self, json: Option<&Json>) -> IndexMap<String, RuleNode> {
        let mut out = IndexMap::new();
        let Some(json) = json else {
            return out;
        };
        let Some(obj) = json.as_object() else {
            self.shape("fragments", "'fragments' must be an object of named nodes");
            return out;
        };
        for (name, node) in obj {
            if let Some(node) = self.node(node, &format!("fragments.{}", name)) {
                out.insert(name.clone(), node);
            }
        }
        out
    }

    // ── Nodes ───────────────────────────────────────────────────────

    fn node(&mut self, json: &Json, path: &str) -> Option<RuleNode> {
        let Some(obj) = json.as_object() else {
            self.shape(path, "rule node must be an object");
            return None;
        };
        let Some(kind) = obj.get("kind").and_then(Json::as_str) else {
            self.shape(path, "rule node needs a string 'kind'");
            return None;
        };
        let allowed: &[&str] = match kind {
            "field" => &["kind", "source", "value", "transforms", "target", "optional"],
            "condition" => &["kind", "when", "then", "else"],
            "merge" => &["kind", "inputs", "policy", "target"],
            "split" => &["kind", "source", "item", "target"],
            "fragment" => &["kind", "name"],
            "sequence" => &["kind", "steps"],
            other => {
                self.shape(path, format!("unknown node kind '{}'", other));
                return None;
            }
        };
        for key in obj.keys() {
            if !allowed.contains(&key.as_str()) {
                self.shape(path, format!("unknown field '{}' on {} node", key, kind));
            }
        }

        match kind {
            "field" => self.field(obj, path).map(RuleNode::Field),
            "condition" => self.condition_node(obj, path).map(RuleNode::Condition),
            "merge" => self.merge(obj, path).map(RuleNode::Merge),
            "split" => self.split(obj, path).map(RuleNode::Split),
            "fragment" => self
                .required_str(obj, "name", path)
                .map(|name| RuleNode::Fragment(FragmentRef { name })),
            _ => self.sequence(obj, path).map(RuleNode::Sequence),
        }
    }

    fn required_str(
        &mut self,
        obj: &serde_json::Map<String, Json>,
        field: &str,
        path: &str,
    ) -> Option<String> {
        match obj.get(field) {
            Some(Json::String(s)) => Some(s.clone()),
            Some(_) => {
                self.shape(path, format!("'{}' must be a string", field));
                None
            }
            None => {
                self.shape(path, format!("missing '{}'", field));
                None
            }
        }
    }

    fn field(&mut self, obj: &serde_json::Map<String, Json>, path: &str) -> Option<FieldMapping> {
        let source = match (obj.get("source"), obj.get("value")) {
            (Some(Json::String(s)), None) => Some(FieldSource::Path(s.clone())),
            (Some(_), None) => {
                self.shape(path, "'source' must be a string path");
                None
            }
            (None, Some(v)) => Some(FieldSource::Constant(Value::from_json(v.clone()))),
            (Some(_), Some(_)) => {
                self.shape(path, "field node takes either 'source' or 'value', not both");
                None
            }
            (None, None) => {
                self.shape(path, "field node needs 'source' or 'value'");
                None
            }
        };
        let transforms = self.transforms(obj.get("transforms"), path);
        let target = self.required_str(obj, "target", path);
        let optional = match obj.get("optional") {
            None => Some(false),
            Some(Json::Bool(b)) => Some(*b),
            Some(_) => {
                self.shape(path, "'optional' must be a boolean");
                None
            }
        };
        Some(FieldMapping {
            source: source?,
            transforms: transforms?,
            target: target?,
            optional: optional?,
        })
    }

    fn transforms(&mut self, json: Option<&Json>, path: &str) -> Option<Vec<TransformSpec>> {
        let Some(json) = json else {
            return Some(Vec::new());
        };
        let Some(items) = json.as_array() else {
            self.shape(path, "'transforms' must be an array");
            return None;
        };
        let mut specs = Vec::with_capacity(items.len());
        let mut ok = true;
        for (i, item) in items.iter().enumerate() {
            match item {
                Json::String(name) => specs.push(TransformSpec::named(name)),
                Json::Object(t) => {
                    let name = t.get("name").and_then(Json::as_str);
                    let args = match t.get("args") {
                        None => Some(Vec::new()),
                        Some(Json::Array(args)) => {
                            Some(args.iter().cloned().map(Value::from_json).collect())
                        }
                        Some(_) => None,
                    };
                    let unknown = t.keys().find(|k| *k != "name" && *k != "args");
                    match (name, args, unknown) {
                        (Some(name), Some(args), None) => specs.push(TransformSpec {
                            name: name.to_string(),
                            args,
                        }),
                        _ => {
                            ok = false;
                            self.shape(
                                path,
                                format!(
                                    "transform {} must be a name or {{\"name\": ..., \"args\": [...]}}",
                                    i + 1
                                ),
                            );
                        }
                    }
                }
                _ => {
                    ok = false;
                    self.shape(path, format!("transform {} must be a name or an object", i + 1));
                }
            }
        }
        ok.then_some(specs)
    }

    fn condition_node(
        &mut self,
        obj: &serde_json::Map<String, Json>,
        path: &str,
    ) -> Option<ConditionNode> {
        let when = match obj.get("when") {
            Some(json) => self.condition(json, &format!("{}.when", path)),
            None => {
                self.shape(path, "missing 'when'");
                None
            }
        };
        let then = match obj.get("then") {
            Some(json) => self.node(json, &format!("{}.then", path)),
            None => {
                self.shape(path, "missing 'then'");
                None
            }
        };
        let otherwise = match obj.get("else") {
            Some(json) => Some(self.node(json, &format!("{}.else", path))?),
            None => None,
        };
        Some(ConditionNode {
            when: when?,
            then: Box::new(then?),
            otherwise: otherwise.map(Box::new),
        })
    }

    fn merge(&mut self, obj: &serde_json::Map<String, Json>, path: &str) -> Option<MergeNode> {
        let inputs = match obj.get("inputs") {
            Some(Json::Array(items)) => self.node_list(items, path, "inputs"),
            Some(_) => {
                self.shape(path, "'inputs' must be an array");
                None
            }
            None => {
                self.shape(path, "missing 'inputs'");
                None
            }
        };
        let policy = match obj.get("policy") {
            None => Some(MergePolicy::default()),
            Some(Json::String(name)) => match MergePolicy::from_name(name) {
                Some(p) => Some(p),
                None => {
                    self.shape(
                        path,
                        format!(
                            "unknown merge policy '{}' (expected lastWins, firstWins, error or appendArray)",
                            name
                        ),
                    );
                    None
                }
            },
            Some(_) => {
                self.shape(path, "'policy' must be a string");
                None
            }
        };
        let target = match obj.get("target") {
            None => Some(String::new()),
            Some(_) => self.required_str(obj, "target", path),
        };
        Some(MergeNode {
            inputs: inputs?,
            policy: policy?,
            target: target?,
        })
    }

    fn split(&mut self, obj: &serde_json::Map<String, Json>, path: &str) -> Option<SplitNode> {
        let source = self.required_str(obj, "source", path);
        let item = match obj.get("item") {
            Some(json) => self.node(json, &format!("{}.item", path)),
            None => {
                self.shape(path, "missing 'item'");
                None
            }
        };
        let target = self.required_str(obj, "target", path);
        Some(SplitNode {
            source: source?,
            item: Box::new(item?),
            target: target?,
        })
    }

    fn sequence(&mut self, obj: &serde_json::Map<String, Json>, path: &str) -> Option<SequenceNode> {
        match obj.get("steps") {
            Some(Json::Array(items)) => self
                .node_list(items, path, "steps")
                .map(|steps| SequenceNode { steps }),
            Some(_) => {
                self.shape(path, "'steps' must be an array");
                None
            }
            None => {
                self.shape(path, "missing 'steps'");
                None
            }
        }
    }

    /// Parse every element so all problems are reported, then fail if any did.
    fn node_list(&mut self, items: &[Json], path: &str, field: &str) -> Option<Vec<RuleNode>> {
        let parsed: Vec<Option<RuleNode>> = items
            .iter()
            .enumerate()
            .map(|(i, item)| self.node(item, &format!("{}.{}[{}]", path, field, i)))
            .collect();
        parsed.into_iter().collect()
    }

    // ── Conditions ──────────────────────────────────────────────────

    fn invalid_condition(&mut self, path: &str, message: impl Into<String>) {
        self.report(DiagnosticCode::InvalidCondition, path, message);
    }

    fn condition(&mut self, json: &Json, path: &str) -> Option<ConditionExpr> {
        let Some(obj) = json.as_object() else {
            self.invalid_condition(path, "condition must be an object");
            return None;
        };
        let Some(op) = obj.get("op").and_then(Json::as_str) else {
            self.invalid_condition(path, "condition needs a string 'op'");
            return None;
        };
        let allowed: &[&str] = match op {
            "equals" | "greaterThan" | "lessThan" => &["op", "source", "value"],
            "exists" => &["op", "source"],
            "matches" => &["op", "source", "pattern"],
            "and" | "or" => &["op", "conditions"],
            "not" => &["op", "condition"],
            "literal" => &["op", "value"],
            other => {
                self.invalid_condition(path, format!("unknown condition op '{}'", other));
                return None;
            }
        };
        if let Some(key) = obj.keys().find(|k| !allowed.contains(&k.as_str())) {
            self.invalid_condition(path, format!("unknown field '{}' on '{}' condition", key, op));
            return None;
        }

        let source = |p: &mut Parser| match obj.get("source").and_then(Json::as_str) {
            Some(s) => Some(s.to_string()),
            None => {
                p.invalid_condition(path, format!("'{}' needs a string 'source'", op));
                None
            }
        };
        let value = |p: &mut Parser| match obj.get("value") {
            Some(v) => Some(Value::from_json(v.clone())),
            None => {
                p.invalid_condition(path, format!("'{}' needs a 'value'", op));
                None
            }
        };

        match op {
            "equals" => {
                let (source, value) = (source(self), value(self));
                Some(ConditionExpr::Equals {
                    source: source?,
                    value: value?,
                })
            }
            "greaterThan" => {
                let (source, value) = (source(self), value(self));
                Some(ConditionExpr::GreaterThan {
                    source: source?,
                    value: value?,
                })
            }
            "lessThan" => {
                let (source, value) = (source(self), value(self));
                Some(ConditionExpr::LessThan {
                    source: source?,
                    value: value?,
                })
            }
            "exists" => Some(ConditionExpr::Exists {
                source: source(self)?,
            }),
            "matches" => {
                let source = source(self);
                let pattern = match obj.get("pattern").and_then(Json::as_str) {
                    Some(p) => Some(p.to_string()),
                    None => {
                        self.invalid_condition(path, "'matches' needs a string 'pattern'");
                        None
                    }
                };
                Some(ConditionExpr::Matches {
                    source: source?,
                    pattern: pattern?,
                })
            }
            "and" | "or" => {
                let Some(items) = obj.get("conditions").and_then(Json::as_array) else {
                    self.invalid_condition(path, format!("'{}' needs a 'conditions' array", op));
                    return None;
                };
                let parsed: Vec<Option<ConditionExpr>> = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.condition(item, &format!("{}.conditions[{}]", path, i)))
                    .collect();
                let conditions: Vec<ConditionExpr> = parsed.into_iter().collect::<Option<_>>()?;
                Some(if op == "and" {
                    ConditionExpr::And { conditions }
                } else {
                    ConditionExpr::Or { conditions }
                })
            }
            "not" => {
                let Some(inner) = obj.get("condition") else {
                    self.invalid_condition(path, "'not' needs a 'condition'");
                    return None;
                };
                let inner = self.condition(inner, &format!("{}.condition", path))?;
                Some(ConditionExpr::Not {
                    condition: Box::new(inner),
                })
            }
            _ => match obj.get("value").and_then(Json::as_bool) {
                Some(value) => Some(ConditionExpr::Literal { value }),
                None => {
                    self.invalid_condition(path, "'literal' needs a boolean 'value'");
                    None
                }
            },
        }
    }
}
