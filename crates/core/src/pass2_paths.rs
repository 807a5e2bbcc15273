//! Pass 2: path syntax, wildcard scope and per-format key checks.

use acv_interchange::xml::is_xml_key;
use acv_interchange::Format;

use crate::ast::*;
use crate::error::{Diagnostic, DiagnosticCode};
use crate::path::{PathSegment, SourcePath, TargetPath};
use crate::walk;

/// Check every source and target path of the (bundled) root. Diagnostics
/// are tagged with the preorder index of the node that owns the path.
pub fn check_paths(document: &RulesDocument) -> Vec<(usize, Diagnostic)> {
    let mut out = Vec::new();
    for visit in walk::preorder(&document.root, "root") {
        let mut checker = PathChecker {
            document,
            index: visit.index,
            path: &visit.path,
            split_depth: visit.split_depth,
            out: &mut out,
        };
        match visit.node {
            RuleNode::Field(field) => {
                if let FieldSource::Path(source) = &field.source {
                    checker.source(source, &visit.path);
                }
                checker.target(&field.target);
            }
            RuleNode::Split(split) => {
                checker.source(&split.source, &visit.path);
                checker.target(&split.target);
            }
            RuleNode::Merge(merge) => checker.target(&merge.target),
            RuleNode::Condition(cond) => {
                let when_path = format!("{}.when", visit.path);
                for source in cond.when.sources() {
                    checker.source(source, &when_path);
                }
            }
            RuleNode::Sequence(_) | RuleNode::Fragment(_) => {}
        }
    }
    out
}

struct PathChecker<'a> {
    document: &'a RulesDocument,
    index: usize,
    path: &'a str,
    split_depth: usize,
    out: &'a mut Vec<(usize, Diagnostic)>,
}

impl PathChecker<'_> {
    fn report(&mut self, code: DiagnosticCode, path: &str, message: String) {
        self.out
            .push((self.index, Diagnostic::new(code, path, message)));
    }

    fn source(&mut self, text: &str, at: &str) {
        let parsed = match SourcePath::parse(text) {
            Ok(p) => p,
            Err(e) => {
                self.report(
                    DiagnosticCode::MalformedSourcePath,
                    at,
                    format!("source path '{}': {}", text, e),
                );
                return;
            }
        };
        let wildcards = parsed.wildcard_count();
        if wildcards > self.split_depth {
            self.report(
                DiagnosticCode::WildcardOutsideSplit,
                at,
                format!(
                    "source path '{}' uses {} wildcard(s) but only {} split item(s) enclose it",
                    text, wildcards, self.split_depth
                ),
            );
        }
        if self.document.input_format == Format::Xml {
            self.xml_keys(&parsed.segments, text, at, "input");
        }
    }

    fn target(&mut self, text: &str) {
        let parsed = match TargetPath::parse(text) {
            Ok(p) => p,
            Err(e) => {
                let path = self.path;
                self.report(
                    DiagnosticCode::MalformedTargetPath,
                    path,
                    format!("target path '{}': {}", text, e),
                );
                return;
            }
        };
        let path = self.path;
        match self.document.output_format {
            Format::Xml => self.xml_keys(&parsed.segments, text, path, "output"),
            Format::Query => {
                for key in parsed.keys() {
                    if key.is_empty() || key.contains(['=', '&', '[', ']']) {
                        self.report(
                            DiagnosticCode::PathNotValidForFormat,
                            path,
                            format!(
                                "target key '{}' in '{}' cannot be written as a query parameter",
                                key, text
                            ),
                        );
                    }
                }
            }
            Format::Json => {}
        }
    }

    fn xml_keys(&mut self, segments: &[PathSegment], text: &str, at: &str, side: &str) {
        for segment in segments {
            if let PathSegment::Key(key) = segment {
                if !is_xml_key(key) {
                    self.report(
                        DiagnosticCode::PathNotValidForFormat,
                        at,
                        format!(
                            "key '{}' in '{}' is not an XML name for the {} document",
                            key, text, side
                        ),
                    );
                }
            }
        }
    }
}
