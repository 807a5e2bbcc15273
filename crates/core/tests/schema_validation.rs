//! Validates the conversion vectors' rules files and libraries against the
//! formal rules schema at schema/rules-schema.json, and checks that the
//! schema and the parser agree on documents the parser accepts.

use std::path::{Path, PathBuf};

use acv_core::source::InMemorySource;

fn workspace_path(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..").join(rel)
}

fn validator() -> jsonschema::Validator {
    let schema_path = workspace_path("schema/rules-schema.json");
    let schema_src = std::fs::read_to_string(&schema_path)
        .unwrap_or_else(|e| panic!("Failed to read schema at {}: {}", schema_path.display(), e));
    let schema_value: serde_json::Value = serde_json::from_str(&schema_src).unwrap();
    jsonschema::validator_for(&schema_value).unwrap_or_else(|e| panic!("Failed to compile schema: {}", e))
}

fn collect_rules_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            p.extension().map_or(false, |e| e == "json")
                && !name.contains(".input.")
                && !name.ends_with(".expected.json")
        })
        .collect();
    paths.sort();
    paths
}

#[test]
fn validate_all_conformance_rules_against_schema() {
    let validator = validator();
    let mut tested = 0usize;
    let mut failures = Vec::new();

    for path in collect_rules_files(&workspace_path("conformance/convert")) {
        let instance: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        if let Err(error) = validator.validate(&instance) {
            failures.push(format!("{}: {}", path.display(), error));
        }
        tested += 1;
    }

    assert!(tested > 0, "No conformance rules files found -- check paths");
    assert!(
        failures.is_empty(),
        "Schema validation failed for {} of {} files:\n{}",
        failures.len(),
        tested,
        failures.join("\n")
    );
}

#[test]
fn serialized_documents_match_the_schema() {
    let validator = validator();
    let text = r#"{ "schemaVersion": "1.2", "inputFormat": "json", "outputFormat": "xml",
        "fragments": { "addr": { "kind": "field", "source": "a", "transforms": [" Trim "], "target": "o.a" } },
        "root": { "kind": "sequence", "steps": [
            { "kind": "fragment", "name": "addr" },
            { "kind": "condition",
              "when": { "op": "not", "condition": { "op": "matches", "source": "b", "pattern": "^x" } },
              "then": { "kind": "field", "value": 1, "target": "o.b" },
              "else": { "kind": "merge", "policy": "appendArray", "target": "o.c", "inputs": [
                { "kind": "split", "source": "items", "target": "", "item":
                  { "kind": "field", "source": "id", "target": "" } } ] } } ] } }"#;
    let document = acv_core::parse_rules(text).unwrap();
    let json = acv_core::document_to_json(&document);
    assert!(validator.is_valid(&json), "{:#}", json);

    let bundled = acv_core::bundle(text, &InMemorySource::new()).unwrap();
    assert!(validator.is_valid(&acv_core::document_to_json(&bundled.document)));
}

#[test]
fn schema_rejects_malformed_documents() {
    let validator = validator();
    let bad = [
        // unknown format
        serde_json::json!({ "schemaVersion": "1.2", "inputFormat": "csv", "outputFormat": "json",
            "root": { "kind": "sequence", "steps": [] } }),
        // field with both source and value
        serde_json::json!({ "schemaVersion": "1.2", "inputFormat": "json", "outputFormat": "json",
            "root": { "kind": "field", "source": "a", "value": 1, "target": "b" } }),
        // unknown node kind
        serde_json::json!({ "schemaVersion": "1.2", "inputFormat": "json", "outputFormat": "json",
            "root": { "kind": "loop" } }),
        // literal condition must be boolean
        serde_json::json!({ "schemaVersion": "1.2", "inputFormat": "json", "outputFormat": "json",
            "root": { "kind": "condition", "when": { "op": "literal", "value": "yes" },
                      "then": { "kind": "sequence", "steps": [] } } }),
    ];
    for instance in &bad {
        assert!(!validator.is_valid(instance), "accepted {}", instance);
        assert!(acv_core::parse_rules(&instance.to_string()).is_err());
    }
}
