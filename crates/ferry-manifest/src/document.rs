//! Loosely-typed document tree
//!
//! Manifests are merged and substituted as plain trees before they are
//! turned into typed records, so the merge algorithm never depends on a
//! particular serialization library.

use std::collections::BTreeMap;

/// Map node with sorted keys
pub type Map = BTreeMap<String, Node>;

/// One node of a manifest document
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Node>),
    Map(Map),
}

impl Node {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(l) => Some(l),
            _ => None,
        }
    }

    /// Scalars rendered as strings; `None` for null and collections
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            Node::Bool(b) => Some(b.to_string()),
            Node::Integer(i) => Some(i.to_string()),
            Node::Float(f) => Some(f.to_string()),
            Node::String(s) => Some(s.clone()),
            Node::Null | Node::List(_) | Node::Map(_) => None,
        }
    }

    /// Short type name for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "boolean",
            Node::Integer(_) => "integer",
            Node::Float(_) => "float",
            Node::String(_) => "string",
            Node::List(_) => "list",
            Node::Map(_) => "map",
        }
    }

    /// Parse a YAML text
    pub fn from_yaml_str(text: &str) -> Result<Node, serde_yaml::Error> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        Ok(Node::from(value))
    }

    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&serde_yaml::Value::from(self.clone()))
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::String(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::String(value)
    }
}

impl From<Map> for Node {
    fn from(value: Map) -> Self {
        Node::Map(value)
    }
}

impl From<serde_yaml::Value> for Node {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value;

        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Node::Integer(i),
                None => Node::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Node::String(s),
            Value::Sequence(items) => Node::List(items.into_iter().map(Node::from).collect()),
            Value::Mapping(mapping) => Node::Map(
                mapping
                    .into_iter()
                    .map(|(k, v)| (key_string(k), Node::from(v)))
                    .collect(),
            ),
            Value::Tagged(tagged) => Node::from(tagged.value),
        }
    }
}

fn key_string(key: serde_yaml::Value) -> String {
    match Node::from(key) {
        Node::String(s) => s,
        other => other.scalar_string().unwrap_or_else(|| "null".to_string()),
    }
}

impl From<Node> for serde_yaml::Value {
    fn from(node: Node) -> Self {
        use serde_yaml::Value;

        match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(b),
            Node::Integer(i) => Value::Number(i.into()),
            Node::Float(f) => Value::Number(f.into()),
            Node::String(s) => Value::String(s),
            Node::List(items) => Value::Sequence(items.into_iter().map(Value::from).collect()),
            Node::Map(map) => Value::Mapping(
                map.into_iter()
                    .map(|(k, v)| (Value::String(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Node::Integer(i),
                None => Node::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Node::String(s),
            Value::Array(items) => Node::List(items.into_iter().map(Node::from).collect()),
            Value::Object(object) => {
                Node::Map(object.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

impl From<Node> for serde_json::Value {
    fn from(node: Node) -> Self {
        use serde_json::Value;

        match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(b),
            Node::Integer(i) => Value::from(i),
            Node::Float(f) => Value::from(f),
            Node::String(s) => Value::String(s),
            Node::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Node::Map(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
