use serde_json::{Map, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a template tree node.
///
/// The builder stack, the per-chunk template dictionary and parent dicts all
/// alias the same nodes while a record is being decoded, hence `Rc<RefCell>`.
pub type NodeRef = Rc<RefCell<TemplateNode>>;

/// Positional substitution values for one template instance. `None` marks a
/// skipped (type 0x00) or missing argument.
pub type SubstitutionArray = Vec<Option<Value>>;

/// A node of a partially-built XML subtree.
///
/// The four shapes are mutually exclusive; adding a child upgrades the node
/// to a `Dict`, and a duplicate child key upgrades that entry to an `Array`.
/// A fresh node is a `Substitution` with id 0, which expands to nothing
/// unless an argument vector is in scope.
#[derive(Debug)]
pub enum TemplateNode {
    Substitution { id: u32, value_type: u32 },
    Literal(Value),
    Dict(Vec<(String, NodeRef)>),
    Array(Vec<NodeRef>),
}

impl TemplateNode {
    pub fn new_ref() -> NodeRef {
        Rc::new(RefCell::new(TemplateNode::Substitution {
            id: 0,
            value_type: 0,
        }))
    }

    fn entries_mut(&mut self) -> &mut Vec<(String, NodeRef)> {
        if !matches!(self, TemplateNode::Dict(_)) {
            *self = TemplateNode::Dict(Vec::new());
        }
        match self {
            TemplateNode::Dict(entries) => entries,
            _ => unreachable!("just upgraded to a dict"),
        }
    }

    fn insert(entries: &mut Vec<(String, NodeRef)>, key: &str, node: NodeRef) {
        // Re-setting an existing key keeps its original position.
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = node,
            None => entries.push((key.to_string(), node)),
        }
    }

    pub fn set_literal(&mut self, key: &str, value: Value) {
        let entries = self.entries_mut();

        // Ignore useless xmlns attributes.
        if key == "xmlns" {
            return;
        }

        Self::insert(
            entries,
            key,
            Rc::new(RefCell::new(TemplateNode::Literal(value))),
        );
    }

    pub fn set_expansion(&mut self, key: &str, id: u32, value_type: u32) {
        let entries = self.entries_mut();
        Self::insert(
            entries,
            key,
            Rc::new(RefCell::new(TemplateNode::Substitution { id, value_type })),
        );
    }

    /// Attach a subtree. A repeated key promotes the existing child to an
    /// `Array` and appends (this happens for literal children too).
    pub fn set_nested(&mut self, key: &str, nested: NodeRef) {
        let entries = self.entries_mut();

        if let Some((_, existing)) = entries.iter_mut().find(|(k, _)| k == key) {
            let already_array = matches!(&*existing.borrow(), TemplateNode::Array(_));
            if already_array {
                if let TemplateNode::Array(items) = &mut *existing.borrow_mut() {
                    items.push(nested);
                }
            } else {
                let promoted = TemplateNode::Array(vec![Rc::clone(existing), nested]);
                *existing = Rc::new(RefCell::new(promoted));
            }
            return;
        }

        entries.push((key.to_string(), nested));
    }

    /// Expand the tree against an argument vector.
    ///
    /// Dict children whose expansion is `None` are dropped. The empty-string
    /// key is the node's text body and surfaces as `"Value"`, with two
    /// quirks that downstream consumers rely on:
    /// - a dict whose *only* child is the empty-string key elides the
    ///   `{"Value": x}` wrapper and expands to `x` directly;
    /// - an empty-string child that expands to a dict is merged into the
    ///   parent instead of being nested under `"Value"`.
    pub fn expand(&self, args: Option<&SubstitutionArray>) -> Option<Value> {
        match self {
            TemplateNode::Dict(entries) => {
                let mut result = Map::new();
                for (key, child) in entries {
                    let expanded = child.borrow().expand(args);

                    if key.is_empty() {
                        if entries.len() == 1 {
                            return expanded;
                        }
                        match expanded {
                            Some(Value::Object(nested)) => {
                                for (k, v) in nested {
                                    if !v.is_null() {
                                        result.insert(k, v);
                                    }
                                }
                            }
                            Some(value) => {
                                result.insert("Value".to_string(), value);
                            }
                            None => {}
                        }
                        continue;
                    }

                    if let Some(value) = expanded {
                        result.insert(key.clone(), value);
                    }
                }
                Some(Value::Object(result))
            }

            TemplateNode::Literal(value) => Some(value.clone()),

            TemplateNode::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|item| item.borrow().expand(args).unwrap_or(Value::Null))
                    .collect(),
            )),

            TemplateNode::Substitution { id, .. } => args
                .and_then(|args| args.get(*id as usize))
                .and_then(|slot| slot.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn expand_root(node: &NodeRef, args: Option<&SubstitutionArray>) -> Value {
        node.borrow().expand(args).expect("expands to a value")
    }

    #[test]
    fn test_literal_children_keep_insertion_order() {
        let root = TemplateNode::new_ref();
        {
            let mut node = root.borrow_mut();
            node.set_literal("Zebra", json!(1));
            node.set_literal("Alpha", json!(2));
            node.set_literal("Mike", json!(3));
        }

        assert_eq!(
            expand_root(&root, None),
            json!({"Zebra": 1, "Alpha": 2, "Mike": 3})
        );
    }

    #[test]
    fn test_repeated_key_promotes_to_array() {
        let root = TemplateNode::new_ref();
        for name in ["a", "b", "c"] {
            let child = TemplateNode::new_ref();
            child.borrow_mut().set_literal("Name", json!(name));
            root.borrow_mut().set_nested("Data", child);
        }

        assert_eq!(
            expand_root(&root, None),
            json!({"Data": [{"Name": "a"}, {"Name": "b"}, {"Name": "c"}]})
        );
    }

    #[test]
    fn test_singleton_text_body_elides_value_wrapper() {
        let root = TemplateNode::new_ref();
        root.borrow_mut().set_literal("", json!("Security"));

        assert_eq!(expand_root(&root, None), json!("Security"));
    }

    #[test]
    fn test_text_body_next_to_attribute_becomes_value_key() {
        let root = TemplateNode::new_ref();
        {
            let mut node = root.borrow_mut();
            node.set_literal("Qualifiers", json!("0"));
            node.set_literal("", json!(4624));
        }

        assert_eq!(
            expand_root(&root, None),
            json!({"Qualifiers": "0", "Value": 4624})
        );
    }

    #[test]
    fn test_dict_text_body_merges_into_parent() {
        let nested = TemplateNode::new_ref();
        nested.borrow_mut().set_literal("Inner", json!("x"));

        let root = TemplateNode::new_ref();
        {
            let mut node = root.borrow_mut();
            node.set_literal("Outer", json!("y"));
            node.set_nested("", nested);
        }

        assert_eq!(
            expand_root(&root, None),
            json!({"Outer": "y", "Inner": "x"})
        );
    }

    #[test]
    fn test_xmlns_is_dropped_but_node_becomes_a_dict() {
        let root = TemplateNode::new_ref();
        root.borrow_mut().set_literal("xmlns", json!("http://x"));

        assert_eq!(expand_root(&root, None), json!({}));
    }

    #[test]
    fn test_substitution_expands_positionally() {
        let root = TemplateNode::new_ref();
        {
            let mut node = root.borrow_mut();
            node.set_expansion("User", 1, 0x01);
            node.set_expansion("Domain", 0, 0x01);
        }

        let args: SubstitutionArray = vec![Some(json!("CORP")), Some(json!("alice"))];
        assert_eq!(
            expand_root(&root, Some(&args)),
            json!({"User": "alice", "Domain": "CORP"})
        );
    }

    #[test]
    fn test_missing_substitution_is_dropped_from_dicts() {
        let root = TemplateNode::new_ref();
        {
            let mut node = root.borrow_mut();
            node.set_literal("Kept", json!(true));
            node.set_expansion("Gone", 7, 0x01);
        }

        let args: SubstitutionArray = vec![Some(json!("only one"))];
        assert_eq!(expand_root(&root, Some(&args)), json!({"Kept": true}));

        // Without arguments in scope the substitution also vanishes.
        assert_eq!(expand_root(&root, None), json!({"Kept": true}));
    }

    #[test]
    fn test_missing_substitution_is_null_inside_arrays() {
        let root = TemplateNode::new_ref();
        for id in [0_u32, 9] {
            let child = TemplateNode::new_ref();
            child.borrow_mut().set_expansion("", id, 0x01);
            root.borrow_mut().set_nested("Data", child);
        }

        let args: SubstitutionArray = vec![Some(json!("first"))];
        assert_eq!(
            expand_root(&root, Some(&args)),
            json!({"Data": ["first", null]})
        );
    }

    #[test]
    fn test_expansion_is_idempotent() {
        let root = TemplateNode::new_ref();
        {
            let mut node = root.borrow_mut();
            node.set_literal("Static", json!("s"));
            node.set_expansion("Dynamic", 0, 0x01);
        }

        let args: SubstitutionArray = vec![Some(json!(42))];
        let first = expand_root(&root, Some(&args));
        let second = expand_root(&root, Some(&args));
        assert_eq!(first, second);
        assert_eq!(first, json!({"Static": "s", "Dynamic": 42}));
    }
}
