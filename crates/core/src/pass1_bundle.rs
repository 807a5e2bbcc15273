//! Pass 1: include resolution, fragment cycle detection, inlining.
//!
//! Includes are loaded through a [`FragmentSource`] with an explicit
//! worklist and visited set, so include depth is bounded by the heap and
//! not the call stack. Fragment references are checked with an iterative
//! depth-first search, then inlined in post-order. The result is a single
//! self-contained document with no fragments and no includes.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::ast::*;
use crate::error::{Diagnostic, DiagnosticCode};
use crate::parser;
use crate::source::FragmentSource;
use crate::walk;

#[derive(Debug, Clone)]
pub struct BundleOutcome {
    /// The inlined document. References that could not be resolved
    /// (unknown names, members of a cycle) are left in place.
    pub document: RulesDocument,
    pub diagnostics: Vec<Diagnostic>,
}

impl BundleOutcome {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// A fragment together with the path its diagnostics are reported under.
#[derive(Debug, Clone)]
pub struct FragmentEntry {
    pub node: RuleNode,
    pub origin: String,
}

/// Parse `text` and bundle it. Parse failures are returned as `Err`.
pub fn bundle(text: &str, source: &dyn FragmentSource) -> Result<BundleOutcome, Vec<Diagnostic>> {
    let document = parser::parse_rules(text)?;
    Ok(bundle_document(&document, source))
}

pub fn bundle_document(document: &RulesDocument, source: &dyn FragmentSource) -> BundleOutcome {
    let mut diagnostics = Vec::new();
    let table = collect_fragments(document, source, &mut diagnostics);
    check_references(&document.root, &table, &mut diagnostics);
    let order = fragment_order(&table, &mut diagnostics);

    let mut resolved: HashMap<&str, RuleNode> = HashMap::new();
    for name in &order {
        if let Some(entry) = table.get(name.as_str()) {
            let node = inline(&entry.node, &resolved);
            resolved.insert(name.as_str(), node);
        }
    }

    let mut bundled = document.clone();
    bundled.root = inline(&document.root, &resolved);
    bundled.fragments = IndexMap::new();
    bundled.includes = Vec::new();
    BundleOutcome {
        document: bundled,
        diagnostics,
    }
}

/// Build the fragment table: the document's own fragments, then every
/// library reachable through `includes`.
pub fn collect_fragments(
    document: &RulesDocument,
    source: &dyn FragmentSource,
    diagnostics: &mut Vec<Diagnostic>,
) -> IndexMap<String, FragmentEntry> {
    let mut table: IndexMap<String, FragmentEntry> = IndexMap::new();
    for (name, node) in &document.fragments {
        table.insert(
            name.clone(),
            FragmentEntry {
                node: node.clone(),
                origin: format!("fragments.{}", name),
            },
        );
    }

    // (library, include chain that led to it, path of the top-level entry)
    let mut worklist: Vec<(String, Vec<String>, String)> = document
        .includes
        .iter()
        .enumerate()
        .rev()
        .map(|(i, name)| (name.clone(), Vec::new(), format!("includes[{}]", i)))
        .collect();
    let mut visited: HashSet<String> = HashSet::new();

    while let Some((name, chain, path)) = worklist.pop() {
        if chain.contains(&name) {
            let mut cycle = chain.clone();
            cycle.push(name.clone());
            let start = chain.iter().position(|n| *n == name).unwrap_or(0);
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::ReferenceCycle,
                path,
                format!("include cycle: {}", cycle[start..].join(" \u{2192} ")),
            ));
            continue;
        }
        if !visited.insert(name.clone()) {
            continue;
        }

        let text = match source.load(&name) {
            Ok(text) => text,
            Err(e) => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::IncludeUnavailable,
                    path,
                    e.to_string(),
                ));
                continue;
            }
        };
        let library = match parser::parse_library(&text, &name) {
            Ok(lib) => lib,
            Err(errors) => {
                // Already located under `<name>:`.
                diagnostics.extend(errors);
                continue;
            }
        };

        for (fragment, node) in library.fragments {
            let origin = format!("{}:fragments.{}", name, fragment);
            if let Some(existing) = table.get(&fragment) {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::DuplicateFragment,
                    origin,
                    format!(
                        "fragment '{}' is already defined at {}",
                        fragment, existing.origin
                    ),
                ));
                continue;
            }
            table.insert(fragment, FragmentEntry { node, origin });
        }

        let mut next_chain = chain;
        next_chain.push(name);
        for include in library.includes.into_iter().rev() {
            worklist.push((include, next_chain.clone(), path.clone()));
        }
    }
    table
}

/// Names referenced by `node`, in preorder.
pub fn references(node: &RuleNode) -> Vec<&str> {
    walk::preorder(node, "")
        .into_iter()
        .filter_map(|v| match v.node {
            RuleNode::Fragment(r) => Some(r.name.as_str()),
            _ => None,
        })
        .collect()
}

/// Report references to names the table does not define.
fn check_references(
    root: &RuleNode,
    table: &IndexMap<String, FragmentEntry>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut scopes: Vec<(&RuleNode, &str)> = vec![(root, "root")];
    scopes.extend(table.values().map(|e| (&e.node, e.origin.as_str())));
    for (node, base) in scopes {
        for visit in walk::preorder(node, base) {
            if let RuleNode::Fragment(r) = visit.node {
                if !table.contains_key(&r.name) {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticCode::UnknownFragment,
                        visit.path,
                        format!("unknown fragment '{}'", r.name),
                    ));
                }
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Depth-first post-order over the fragment graph. Every cycle is reported
/// once; its members are left out of the order so they are never inlined.
fn fragment_order(
    table: &IndexMap<String, FragmentEntry>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<String> {
    let edges: HashMap<&str, Vec<&str>> = table
        .iter()
        .map(|(name, entry)| {
            let mut refs = references(&entry.node);
            refs.retain(|r| table.contains_key(*r));
            (name.as_str(), refs)
        })
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut in_cycle: HashSet<&str> = HashSet::new();
    let mut order = Vec::new();

    for start in table.keys() {
        if marks.contains_key(start.as_str()) {
            continue;
        }
        // (fragment, index of the next edge to follow)
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
        marks.insert(start.as_str(), Mark::Active);
        while let Some((name, next)) = stack.last().copied() {
            let targets = edges.get(name).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(&target) = targets.get(next) {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match marks.get(target) {
                    None => {
                        marks.insert(target, Mark::Active);
                        stack.push((target, 0));
                    }
                    Some(Mark::Active) => {
                        let start_at = stack.iter().position(|(n, _)| *n == target).unwrap_or(0);
                        let mut cycle: Vec<&str> = stack[start_at..].iter().map(|(n, _)| *n).collect();
                        in_cycle.extend(cycle.iter().copied());
                        cycle.push(target);
                        let origin = table
                            .get(target)
                            .map(|e| e.origin.clone())
                            .unwrap_or_default();
                        diagnostics.push(Diagnostic::new(
                            DiagnosticCode::ReferenceCycle,
                            origin,
                            format!("fragment cycle: {}", cycle.join(" \u{2192} ")),
                        ));
                    }
                    Some(Mark::Done) => {}
                }
            } else {
                stack.pop();
                marks.insert(name, Mark::Done);
                if !in_cycle.contains(name) {
                    order.push(name.to_string());
                }
            }
        }
    }
    order
}

/// Replace resolved references with copies of their fragments.
fn inline(node: &RuleNode, resolved: &HashMap<&str, RuleNode>) -> RuleNode {
    match node {
        RuleNode::Fragment(r) => match resolved.get(r.name.as_str()) {
            Some(body) => body.clone(),
            None => node.clone(),
        },
        RuleNode::Field(_) => node.clone(),
        RuleNode::Sequence(seq) => RuleNode::Sequence(SequenceNode {
            steps: seq.steps.iter().map(|s| inline(s, resolved)).collect(),
        }),
        RuleNode::Condition(cond) => RuleNode::Condition(ConditionNode {
            when: cond.when.clone(),
            then: Box::new(inline(&cond.then, resolved)),
            otherwise: cond
                .otherwise
                .as_ref()
                .map(|o| Box::new(inline(o, resolved))),
        }),
        RuleNode::Merge(merge) => RuleNode::Merge(MergeNode {
            inputs: merge.inputs.iter().map(|i| inline(i, resolved)).collect(),
            policy: merge.policy,
            target: merge.target.clone(),
        }),
        RuleNode::Split(split) => RuleNode::Split(SplitNode {
            source: split.source.clone(),
            item: Box::new(inline(&split.item, resolved)),
            target: split.target.clone(),
        }),
    }
}
