//! Reading from the input tree and writing into the output tree.

use acv_core::path::{PathSegment, SourcePath, TargetPath};
use acv_interchange::{Format, Map, Value};

/// Where relative source paths resolve: the input root, or the item of
/// the innermost enclosing split.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    root: &'a Value,
    /// (item value, item index) per enclosing split, outermost first.
    items: Vec<(&'a Value, usize)>,
    /// XML input: a lone element stands for a one-item array.
    lone_items: bool,
}

impl<'a> Scope<'a> {
    pub fn new(root: &'a Value) -> Self {
        Scope {
            root,
            items: Vec::new(),
            lone_items: false,
        }
    }

    /// A root scope for a document decoded from `format`.
    pub fn for_input(root: &'a Value, format: Format) -> Self {
        Scope {
            lone_items: format == Format::Xml,
            ..Scope::new(root)
        }
    }

    /// A scope one split level deeper.
    pub fn enter(&self, item: &'a Value, index: usize) -> Self {
        let mut items = self.items.clone();
        items.push((item, index));
        Scope {
            root: self.root,
            items,
            lone_items: self.lone_items,
        }
    }

    pub fn current(&self) -> &'a Value {
        self.items.last().map_or(self.root, |(item, _)| *item)
    }

    pub fn depth(&self) -> usize {
        self.items.len()
    }

    /// Resolve `path`. The k wildcards of a path bind, outer to inner, the
    /// k innermost split indices. `None` when any segment is missing.
    pub fn resolve(&self, path: &SourcePath) -> Option<&'a Value> {
        let wildcards = path.wildcard_count();
        if wildcards > self.items.len() {
            return None;
        }
        let mut bound = self.items[self.items.len() - wildcards..]
            .iter()
            .map(|(_, index)| *index);

        let mut node = if path.absolute { self.root } else { self.current() };
        for segment in &path.segments {
            node = match segment {
                PathSegment::Key(key) => node.get(key)?,
                PathSegment::Index(i) => self.item(node, *i)?,
                PathSegment::Wildcard => self.item(node, bound.next()?)?,
            };
        }
        Some(node)
    }

    fn item(&self, node: &'a Value, index: usize) -> Option<&'a Value> {
        match node {
            Value::Array(items) => items.get(index),
            Value::Null => None,
            single if self.lone_items && index == 0 => Some(single),
            _ => None,
        }
    }
}

/// Why a write could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConflict {
    /// Canonical path of the slot that refused the write.
    pub at: String,
    pub existing: &'static str,
}

/// Write `value` at `target` below `out`.
///
/// Missing intermediates are created (objects for keys, arrays padded
/// with nulls for indices). A vacant slot (`null` or `{}`) is filled; an
/// object written onto an object is merged key by key under the same
/// rules. Anything else is a conflict and leaves `out` unchanged.
pub fn write(out: &mut Value, target: &TargetPath, value: Value) -> Result<(), WriteConflict> {
    let mut slot = out;
    let mut walked = TargetPath {
        segments: Vec::with_capacity(target.segments.len()),
    };
    for segment in &target.segments {
        slot = match segment {
            PathSegment::Key(key) => {
                if slot.is_null() {
                    *slot = Value::object();
                }
                match slot {
                    Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                    other => return Err(conflict(&walked, other)),
                }
            }
            PathSegment::Index(i) => {
                if slot.is_vacant() {
                    *slot = Value::Array(Vec::new());
                }
                match slot {
                    Value::Array(items) => {
                        if items.len() <= *i {
                            items.resize(*i + 1, Value::Null);
                        }
                        &mut items[*i]
                    }
                    other => return Err(conflict(&walked, other)),
                }
            }
            // Target paths never contain wildcards.
            PathSegment::Wildcard => return Err(conflict(&walked, slot)),
        };
        walked.segments.push(segment.clone());
    }
    place(slot, value, &walked)
}

fn conflict(at: &TargetPath, existing: &Value) -> WriteConflict {
    WriteConflict {
        at: at.to_string(),
        existing: existing.kind().as_str(),
    }
}

fn place(slot: &mut Value, value: Value, at: &TargetPath) -> Result<(), WriteConflict> {
    if slot.is_vacant() {
        *slot = value;
        return Ok(());
    }
    match (slot, value) {
        (Value::Object(existing), Value::Object(incoming)) => {
            check_extend(existing, &incoming, at)?;
            extend(existing, incoming);
            Ok(())
        }
        (slot, _) => Err(conflict(at, slot)),
    }
}

/// Verify an object-onto-object write before touching anything, so a
/// conflicting write leaves the output as it was.
fn check_extend(existing: &Map, incoming: &Map, at: &TargetPath) -> Result<(), WriteConflict> {
    let mut stack: Vec<(&Map, &Map, TargetPath)> = vec![(existing, incoming, at.clone())];
    while let Some((existing, incoming, at)) = stack.pop() {
        for (key, new) in incoming {
            let Some(old) = existing.get(key) else {
                continue;
            };
            let mut child = at.clone();
            child.segments.push(PathSegment::Key(key.clone()));
            if old.is_vacant() {
                continue;
            }
            match (old, new) {
                (Value::Object(a), Value::Object(b)) => stack.push((a, b, child)),
                _ => return Err(conflict(&child, old)),
            }
        }
    }
    Ok(())
}

fn extend(existing: &mut Map, incoming: Map) {
    for (key, new) in incoming {
        match existing.get_mut(&key) {
            Some(old) if old.is_vacant() => *old = new,
            Some(Value::Object(old)) => {
                if let Value::Object(new) = new {
                    extend(old, new);
                }
            }
            Some(_) => {}
            None => {
                existing.insert(key, new);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(json: serde_json::Value) -> Value {
        Value::from_json(json)
    }

    fn sp(text: &str) -> SourcePath {
        SourcePath::parse(text).unwrap()
    }

    fn tp(text: &str) -> TargetPath {
        TargetPath::parse(text).unwrap()
    }

    #[test]
    fn resolves_relative_and_absolute_paths() {
        let input = v(serde_json::json!({ "a": { "b": [10, 20] }, "rows": [{ "id": 1 }, { "id": 2 }] }));
        let scope = Scope::new(&input);
        assert_eq!(scope.resolve(&sp("a.b[1]")), Some(&Value::Number(20.0)));
        assert_eq!(scope.resolve(&sp("a.c")), None);
        assert_eq!(scope.resolve(&sp("")), Some(&input));

        let rows = input.get("rows").unwrap().as_array().unwrap();
        let inner = scope.enter(&rows[1], 1);
        assert_eq!(inner.resolve(&sp("id")), Some(&Value::Number(2.0)));
        assert_eq!(inner.resolve(&sp("$.a.b[*]")), Some(&Value::Number(20.0)));
        assert_eq!(inner.depth(), 1);
    }

    #[test]
    fn lone_xml_element_is_item_zero() {
        let input = v(serde_json::json!({ "orders": { "order": { "@id": "o-1" }, "empty": null } }));
        let xml = Scope::for_input(&input, Format::Xml);
        assert_eq!(xml.resolve(&sp("orders.order[0].@id")), Some(&Value::from("o-1")));
        assert_eq!(xml.resolve(&sp("orders.order[1]")), None);
        assert_eq!(xml.resolve(&sp("orders.empty[0]")), None);

        let item = Value::Null;
        let inner = xml.enter(&item, 0);
        assert_eq!(inner.resolve(&sp("$.orders.order[*].@id")), Some(&Value::from("o-1")));

        let json = Scope::for_input(&input, Format::Json);
        assert_eq!(json.resolve(&sp("orders.order[0].@id")), None);
    }

    #[test]
    fn wildcards_bind_innermost_indices() {
        let input = v(serde_json::json!({ "m": [[1, 2], [3, 4]] }));
        let item = Value::Null;
        let scope = Scope::new(&input);
        let outer = scope.enter(&item, 1);
        let inner = outer.enter(&item, 0);
        assert_eq!(inner.resolve(&sp("$.m[*][*]")), Some(&Value::Number(3.0)));
        assert_eq!(inner.resolve(&sp("$.m[0][*]")), Some(&Value::Number(1.0)));
        assert_eq!(scope.resolve(&sp("$.m[*]")), None);
    }

    #[test]
    fn writes_create_intermediates() {
        let mut out = Value::Null;
        write(&mut out, &tp("contact.email"), Value::String("x".into())).unwrap();
        write(&mut out, &tp("list[2]"), Value::Bool(true)).unwrap();
        assert_eq!(
            out.to_json(),
            serde_json::json!({ "contact": { "email": "x" }, "list": [null, null, true] })
        );
    }

    #[test]
    fn objects_extend_but_scalars_conflict() {
        let mut out = v(serde_json::json!({ "a": { "x": 1 } }));
        write(&mut out, &tp("a"), v(serde_json::json!({ "y": 2 }))).unwrap();
        assert_eq!(out.to_json(), serde_json::json!({ "a": { "x": 1, "y": 2 } }));

        let before = out.clone();
        let err = write(&mut out, &tp("a"), v(serde_json::json!({ "y": 3, "z": 4 }))).unwrap_err();
        assert_eq!(err.at, "a.y");
        assert_eq!(out, before);

        let err = write(&mut out, &tp("a.x.deeper"), Value::Null).unwrap_err();
        assert_eq!(err.at, "a.x");
        assert_eq!(err.existing, "number");
    }

    #[test]
    fn root_write_fills_vacant_output() {
        let mut out = Value::object();
        write(&mut out, &tp(""), v(serde_json::json!({ "k": "v" }))).unwrap();
        assert_eq!(out.to_json(), serde_json::json!({ "k": "v" }));
    }
}
