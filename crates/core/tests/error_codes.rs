//! Keeps `DiagnosticCode`, the crates that emit it and the published
//! reference at docs/error-codes.md in agreement.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use acv_core::DiagnosticCode;

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

fn collect_sources(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in std::fs::read_dir(dir).unwrap().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            collect_sources(&path, out);
        } else if path.extension().map_or(false, |e| e == "rs") {
            out.push(path);
        }
    }
}

/// Text of every `src/` file in every crate, except the file that defines
/// the codes.
fn crate_sources() -> String {
    let crates = workspace_root().join("crates");
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&crates).unwrap().filter_map(|e| e.ok()) {
        let src = entry.path().join("src");
        if src.is_dir() {
            collect_sources(&src, &mut files);
        }
    }
    let definition = crates.join("core").join("src").join("error.rs");
    files
        .iter()
        .filter(|p| **p != definition)
        .map(|p| std::fs::read_to_string(p).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
}

fn variant_name(code: DiagnosticCode) -> String {
    format!("{:?}", code)
}

/// `ACV-XXX-NNN` tokens in the reference, with how often each appears.
fn reference_codes() -> BTreeMap<String, usize> {
    let path = workspace_root().join("docs").join("error-codes.md");
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    let pattern = regex::Regex::new(r"ACV-(?:STR|RUN)-\d{3}").unwrap();
    let mut counts = BTreeMap::new();
    // Only table rows define codes; prose may mention them freely.
    for line in text.lines().filter(|l| l.starts_with("| ACV-")) {
        for m in pattern.find_iter(line) {
            *counts.entry(m.as_str().to_string()).or_insert(0) += 1;
        }
    }
    counts
}

#[test]
fn every_code_is_emitted_somewhere() {
    let sources = crate_sources();
    let unused: Vec<String> = DiagnosticCode::ALL
        .iter()
        .filter(|code| !sources.contains(&format!("DiagnosticCode::{}", variant_name(**code))))
        .map(|code| format!("{} ({})", code.as_str(), variant_name(*code)))
        .collect();
    assert!(unused.is_empty(), "codes never emitted: {:?}", unused);
}

#[test]
fn every_code_is_documented_exactly_once() {
    let documented = reference_codes();
    for code in DiagnosticCode::ALL {
        assert_eq!(
            documented.get(code.as_str()),
            Some(&1),
            "{} must appear in exactly one table row of docs/error-codes.md",
            code.as_str()
        );
    }
}

#[test]
fn reference_lists_no_other_codes() {
    let known: Vec<&str> = DiagnosticCode::ALL.iter().map(|c| c.as_str()).collect();
    let extra: Vec<String> = reference_codes()
        .into_keys()
        .filter(|code| !known.contains(&code.as_str()))
        .collect();
    assert!(extra.is_empty(), "undocumented codes in the reference: {:?}", extra);
}

#[test]
fn codes_are_unique_and_severities_match_the_reference() {
    let path = workspace_root().join("docs").join("error-codes.md");
    let text = std::fs::read_to_string(path).unwrap();
    let mut seen = std::collections::HashSet::new();
    for code in DiagnosticCode::ALL {
        assert!(seen.insert(code.as_str()), "duplicate code {}", code.as_str());
        let row = text
            .lines()
            .find(|l| l.starts_with(&format!("| {} |", code.as_str())))
            .unwrap();
        let severity = row.split('|').nth(2).unwrap().trim();
        assert_eq!(severity, code.default_severity().as_str(), "{}", code.as_str());
    }
}
