//! Deep merge of manifest documents
//!
//! Maps merge key by key, lists merge by the `name` field of their map
//! elements, and anything else in the overlay replaces the base value.
//! Callers choose the direction: inheritance merges the child into the
//! parent, application overlay merges the application into a copy of the
//! template.

use crate::document::{Map, Node};

/// Merge `overlay` into `base` in place
pub fn merge(base: &mut Map, overlay: &Map) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Node::Map(existing)), Node::Map(incoming)) => merge(existing, incoming),
            (Some(Node::List(existing)), Node::List(incoming)) => merge_lists(existing, incoming),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Merge list elements by identity.
///
/// Map elements carrying a string `name` merge into the base element with
/// the same name, or into a fresh `{name}` placeholder appended to `base`.
/// Other elements are appended unless an identical element is already
/// present.
pub fn merge_lists(base: &mut Vec<Node>, overlay: &[Node]) {
    for element in overlay {
        match element {
            Node::Map(incoming) => match incoming.get("name").and_then(Node::as_str) {
                Some(name) => merge_named(base, name, incoming),
                None => push_unique(base, element),
            },
            _ => push_unique(base, element),
        }
    }
}

fn merge_named(base: &mut Vec<Node>, name: &str, incoming: &Map) {
    let existing = base.iter_mut().find_map(|node| match node {
        Node::Map(map) if map.get("name").and_then(Node::as_str) == Some(name) => Some(map),
        _ => None,
    });

    match existing {
        Some(map) => merge(map, incoming),
        None => {
            let mut placeholder = Map::new();
            placeholder.insert("name".to_string(), Node::from(name));
            merge(&mut placeholder, incoming);
            base.push(Node::Map(placeholder));
        }
    }
}

fn push_unique(base: &mut Vec<Node>, element: &Node) {
    if !base.contains(element) {
        base.push(element.clone());
    }
}
