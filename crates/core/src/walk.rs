//! Preorder traversal over rule trees.
//!
//! Every pass that reports per-node diagnostics walks the tree through
//! [`preorder`], so node indices (and therefore diagnostic order) agree
//! across passes. The walk uses an explicit stack.

use crate::ast::RuleNode;

/// One visited node.
#[derive(Debug, Clone)]
pub struct NodeVisit<'a> {
    /// Position in preorder, starting at 0 for the walk root.
    pub index: usize,
    pub path: String,
    pub node: &'a RuleNode,
    /// Number of `split` items enclosing this node.
    pub split_depth: usize,
}

/// Children of a node with their path suffixes, in declaration order.
pub fn children(node: &RuleNode) -> Vec<(String, &RuleNode, bool)> {
    match node {
        RuleNode::Sequence(seq) => seq
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| (format!(".steps[{}]", i), step, false))
            .collect(),
        RuleNode::Condition(cond) => {
            let mut out = vec![(".then".to_string(), cond.then.as_ref(), false)];
            if let Some(otherwise) = &cond.otherwise {
                out.push((".else".to_string(), otherwise.as_ref(), false));
            }
            out
        }
        RuleNode::Merge(merge) => merge
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| (format!(".inputs[{}]", i), input, false))
            .collect(),
        RuleNode::Split(split) => vec![(".item".to_string(), split.item.as_ref(), true)],
        RuleNode::Field(_) | RuleNode::Fragment(_) => Vec::new(),
    }
}

/// Visit `root` and its descendants in preorder.
pub fn preorder<'a>(root: &'a RuleNode, root_path: &str) -> Vec<NodeVisit<'a>> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &'a RuleNode, usize)> = vec![(root_path.to_string(), root, 0)];
    while let Some((path, node, split_depth)) = stack.pop() {
        for (suffix, child, enters_split) in children(node).into_iter().rev() {
            let depth = if enters_split { split_depth + 1 } else { split_depth };
            stack.push((format!("{}{}", path, suffix), child, depth));
        }
        out.push(NodeVisit {
            index: out.len(),
            path,
            node,
            split_depth,
        });
    }
    out
}

/// Find the node at a diagnostic path such as `root.steps[1].item[0].then`.
/// Split item indices added at runtime are ignored.
pub fn find_mut<'a>(root: &'a mut RuleNode, path: &str) -> Option<&'a mut RuleNode> {
    let mut rest = path.strip_prefix("root")?;
    let mut node = root;
    while !rest.is_empty() {
        rest = rest.strip_prefix('.')?;
        let name_end = rest.find(['.', '[']).unwrap_or(rest.len());
        let (name, tail) = rest.split_at(name_end);
        let (index, tail) = match tail.strip_prefix('[') {
            Some(after) => {
                let close = after.find(']')?;
                (Some(after[..close].parse::<usize>().ok()?), &after[close + 1..])
            }
            None => (None, tail),
        };
        rest = tail;
        node = match (name, node) {
            ("steps", RuleNode::Sequence(seq)) => seq.steps.get_mut(index?)?,
            ("inputs", RuleNode::Merge(merge)) => merge.inputs.get_mut(index?)?,
            ("then", RuleNode::Condition(cond)) => cond.then.as_mut(),
            ("else", RuleNode::Condition(cond)) => cond.otherwise.as_deref_mut()?,
            ("item", RuleNode::Split(split)) => split.item.as_mut(),
            _ => return None,
        };
    }
    Some(node)
}

/// Strip runtime split item indices: `x.item[3].y` becomes `x.item.y`.
pub fn static_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(pos) = rest.find(".item[") {
        out.push_str(&rest[..pos + ".item".len()]);
        let after = &rest[pos + ".item[".len()..];
        match after.find(']') {
            Some(close) => rest = &after[close + 1..],
            None => {
                rest = after;
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    fn field(target: &str) -> RuleNode {
        RuleNode::Field(FieldMapping {
            source: FieldSource::Path("a".to_string()),
            transforms: Vec::new(),
            target: target.to_string(),
            optional: false,
        })
    }

    fn tree() -> RuleNode {
        RuleNode::Sequence(SequenceNode {
            steps: vec![
                field("x"),
                RuleNode::Split(SplitNode {
                    source: "orders".to_string(),
                    item: Box::new(RuleNode::Sequence(SequenceNode {
                        steps: vec![field("id")],
                    })),
                    target: "items".to_string(),
                }),
                RuleNode::Condition(ConditionNode {
                    when: ConditionExpr::Literal { value: true },
                    then: Box::new(field("t")),
                    otherwise: Some(Box::new(field("e"))),
                }),
            ],
        })
    }

    #[test]
    fn preorder_paths_and_depths() {
        let root = tree();
        let visits = preorder(&root, "root");
        let paths: Vec<&str> = visits.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "root",
                "root.steps[0]",
                "root.steps[1]",
                "root.steps[1].item",
                "root.steps[1].item.steps[0]",
                "root.steps[2]",
                "root.steps[2].then",
                "root.steps[2].else",
            ]
        );
        assert_eq!(visits[4].split_depth, 1);
        assert_eq!(visits[5].split_depth, 0);
        assert!(visits.iter().enumerate().all(|(i, v)| v.index == i));
    }

    #[test]
    fn find_mut_follows_paths() {
        let mut root = tree();
        let RuleNode::Field(f) = find_mut(&mut root, "root.steps[1].item[3].steps[0]").unwrap() else {
            panic!("expected field");
        };
        assert_eq!(f.target, "id");
        assert!(matches!(find_mut(&mut root, "root.steps[2].else"), Some(RuleNode::Field(_))));
        assert!(find_mut(&mut root, "root.steps[9]").is_none());
        assert!(find_mut(&mut root, "fragments.x").is_none());
        assert!(find_mut(&mut root, "root").is_some());
    }

    #[test]
    fn static_path_drops_item_indices() {
        assert_eq!(
            static_path("root.steps[1].item[0].steps[2].item[11]"),
            "root.steps[1].item.steps[2].item"
        );
        assert_eq!(static_path("root.steps[0]"), "root.steps[0]");
    }
}
