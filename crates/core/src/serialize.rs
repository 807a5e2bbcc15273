//! [`RulesDocument`] back to its JSON wire form.
//!
//! Keys are emitted in a fixed order and defaults are omitted, so a parsed
//! document serializes back to an equivalent, stable text.

use serde_json::{json, Map, Value as Json};

use crate::ast::*;

pub fn document_to_json(doc: &RulesDocument) -> Json {
    let mut obj = Map::new();
    obj.insert("schemaVersion".to_string(), json!(doc.schema_version));
    obj.insert("inputFormat".to_string(), json!(doc.input_format.as_str()));
    obj.insert("outputFormat".to_string(), json!(doc.output_format.as_str()));
    if !doc.includes.is_empty() {
        obj.insert("includes".to_string(), json!(doc.includes));
    }
    if !doc.fragments.is_empty() {
        let fragments: Map<String, Json> = doc
            .fragments
            .iter()
            .map(|(name, node)| (name.clone(), node_to_json(node)))
            .collect();
        obj.insert("fragments".to_string(), Json::Object(fragments));
    }
    obj.insert("root".to_string(), node_to_json(&doc.root));
    Json::Object(obj)
}

pub fn node_to_json(node: &RuleNode) -> Json {
    let mut obj = Map::new();
    obj.insert("kind".to_string(), json!(node.kind()));
    match node {
        RuleNode::Field(f) => {
            match &f.source {
                FieldSource::Path(p) => obj.insert("source".to_string(), json!(p)),
                FieldSource::Constant(v) => obj.insert("value".to_string(), v.to_json()),
            };
            if !f.transforms.is_empty() {
                let transforms: Vec<Json> = f.transforms.iter().map(transform_to_json).collect();
                obj.insert("transforms".to_string(), Json::Array(transforms));
            }
            obj.insert("target".to_string(), json!(f.target));
            if f.optional {
                obj.insert("optional".to_string(), json!(true));
            }
        }
        RuleNode::Condition(c) => {
            obj.insert("when".to_string(), condition_to_json(&c.when));
            obj.insert("then".to_string(), node_to_json(&c.then));
            if let Some(otherwise) = &c.otherwise {
                obj.insert("else".to_string(), node_to_json(otherwise));
            }
        }
        RuleNode::Merge(m) => {
            if m.policy != MergePolicy::default() {
                obj.insert("policy".to_string(), json!(m.policy.as_str()));
            }
            if !m.target.is_empty() {
                obj.insert("target".to_string(), json!(m.target));
            }
            obj.insert(
                "inputs".to_string(),
                Json::Array(m.inputs.iter().map(node_to_json).collect()),
            );
        }
        RuleNode::Split(s) => {
            obj.insert("source".to_string(), json!(s.source));
            obj.insert("target".to_string(), json!(s.target));
            obj.insert("item".to_string(), node_to_json(&s.item));
        }
        RuleNode::Fragment(r) => {
            obj.insert("name".to_string(), json!(r.name));
        }
        RuleNode::Sequence(s) => {
            obj.insert(
                "steps".to_string(),
                Json::Array(s.steps.iter().map(node_to_json).collect()),
            );
        }
    }
    Json::Object(obj)
}

fn transform_to_json(t: &TransformSpec) -> Json {
    if t.args.is_empty() {
        json!(t.name)
    } else {
        let args: Vec<Json> = t.args.iter().map(|a| a.to_json()).collect();
        json!({ "name": t.name, "args": args })
    }
}

pub fn condition_to_json(expr: &ConditionExpr) -> Json {
    match expr {
        ConditionExpr::Equals { source, value }
        | ConditionExpr::GreaterThan { source, value }
        | ConditionExpr::LessThan { source, value } => {
            json!({ "op": expr.op(), "source": source, "value": value.to_json() })
        }
        ConditionExpr::Exists { source } => json!({ "op": "exists", "source": source }),
        ConditionExpr::Matches { source, pattern } => {
            json!({ "op": "matches", "source": source, "pattern": pattern })
        }
        ConditionExpr::And { conditions } | ConditionExpr::Or { conditions } => {
            let items: Vec<Json> = conditions.iter().map(condition_to_json).collect();
            json!({ "op": expr.op(), "conditions": items })
        }
        ConditionExpr::Not { condition } => {
            json!({ "op": "not", "condition": condition_to_json(condition) })
        }
        ConditionExpr::Literal { value } => json!({ "op": "literal", "value": value }),
    }
}
