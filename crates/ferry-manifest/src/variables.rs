//! `((identifier))` variable substitution

use crate::document::{Map, Node};
use crate::error::{ManifestError, Result};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Variable name to replacement value
pub type Variables = BTreeMap<String, String>;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\(([a-zA-Z]\w+)\)\)").expect("variable regex is valid")
});

/// Replace every `((name))` token in `text`.
///
/// Returns the name of the first variable with no value on failure.
pub fn substitute_str(text: &str, variables: &Variables) -> std::result::Result<String, String> {
    let mut missing = None;
    let replaced = VARIABLE.replace_all(text, |caps: &Captures<'_>| {
        let name = &caps[1];
        match variables.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(name),
        None => Ok(replaced.into_owned()),
    }
}

/// Substitute variables in every string value of a document
pub fn substitute_document(document: &mut Map, variables: &Variables) -> Result<()> {
    let mut location = Vec::new();
    substitute_map(document, variables, &mut location)
}

fn substitute_map(map: &mut Map, variables: &Variables, location: &mut Vec<String>) -> Result<()> {
    for (key, value) in map.iter_mut() {
        location.push(key.clone());
        substitute_node(value, variables, location)?;
        location.pop();
    }
    Ok(())
}

fn substitute_node(node: &mut Node, variables: &Variables, location: &mut Vec<String>) -> Result<()> {
    match node {
        Node::String(text) => {
            *text = substitute_str(text, variables).map_err(|variable| {
                ManifestError::UnresolvedVariable {
                    variable,
                    location: render_location(location),
                }
            })?;
        }
        Node::List(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                location.push(format!("[{}]", index));
                substitute_node(item, variables, location)?;
                location.pop();
            }
        }
        Node::Map(map) => substitute_map(map, variables, location)?,
        Node::Null | Node::Bool(_) | Node::Integer(_) | Node::Float(_) => {}
    }
    Ok(())
}

fn render_location(location: &[String]) -> String {
    let mut rendered = String::new();
    for segment in location {
        if !rendered.is_empty() && !segment.starts_with('[') {
            rendered.push('.');
        }
        rendered.push_str(segment);
    }
    if rendered.is_empty() {
        rendered.push_str("document");
    }
    rendered
}

/// Read a variables document: a flat map with values coerced to strings
pub fn variables_from_document(document: &Map) -> Variables {
    document
        .iter()
        .map(|(key, value)| {
            let value = value.scalar_string().unwrap_or_else(|| match value {
                Node::Null => "null".to_string(),
                other => other.kind().to_string(),
            });
            (key.clone(), value)
        })
        .collect()
}
