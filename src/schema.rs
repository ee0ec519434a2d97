//! Input schema model: a normalized, language-agnostic description of value shapes.
pub mod parse;
pub mod render;

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Name of an entry in the definitions table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(String);

impl SchemaId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SchemaId {
    fn from(s: &str) -> Self {
        SchemaId(s.to_string())
    }
}

impl From<String> for SchemaId {
    fn from(s: String) -> Self {
        SchemaId(s)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaNode {
    Null,
    Bool,
    Int,
    Float,
    Str(StrConstraints),
    List {
        element: Box<SchemaNode>,
        #[serde(default)]
        min_items: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    Record {
        fields: Vec<Field>,  // declared order is the accepted order
    },
    Union {
        variants: Vec<SchemaNode>,  // order is a tie-break hint only
    },
    Ref {
        id: SchemaId,
    },
}

/// String constraints.
///
/// Only `pattern` and `max_length` map onto a grammar terminal. Anything else a
/// front-end found attached to the string lands in `extra`, and the compiler
/// refuses it rather than accepting a wider language than the schema allows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extra: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: SchemaNode,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl Field {
    pub fn required(name: impl Into<String>, value: SchemaNode) -> Self {
        Field { name: name.into(), value, required: true }
    }

    pub fn optional(name: impl Into<String>, value: SchemaNode) -> Self {
        Field { name: name.into(), value, required: false }
    }
}

impl SchemaNode {
    pub fn str() -> Self {
        SchemaNode::Str(StrConstraints::default())
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        SchemaNode::Str(StrConstraints { pattern: Some(pattern.into()), ..StrConstraints::default() })
    }

    pub fn list(element: SchemaNode) -> Self {
        SchemaNode::List { element: Box::new(element), min_items: 0, max_items: None }
    }

    pub fn bounded_list(element: SchemaNode, min_items: usize, max_items: Option<usize>) -> Self {
        SchemaNode::List { element: Box::new(element), min_items, max_items }
    }

    pub fn record(fields: Vec<Field>) -> Self {
        SchemaNode::Record { fields }
    }

    pub fn union(variants: Vec<SchemaNode>) -> Self {
        SchemaNode::Union { variants }
    }

    /// `T | null`
    pub fn nullable(inner: SchemaNode) -> Self {
        SchemaNode::Union { variants: vec![inner, SchemaNode::Null] }
    }

    pub fn reference(id: impl Into<SchemaId>) -> Self {
        SchemaNode::Ref { id: id.into() }
    }

    /// Short shape name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            SchemaNode::Null => "null",
            SchemaNode::Bool => "bool",
            SchemaNode::Int => "int",
            SchemaNode::Float => "float",
            SchemaNode::Str(_) => "str",
            SchemaNode::List { .. } => "list",
            SchemaNode::Record { .. } => "record",
            SchemaNode::Union { .. } => "union",
            SchemaNode::Ref { .. } => "ref",
        }
    }
}

/// A root node plus the definitions table its refs point into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub root: SchemaNode,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub defs: IndexMap<SchemaId, SchemaNode>,
}

impl Schema {
    pub fn new(root: SchemaNode) -> Self {
        Schema { root, defs: IndexMap::new() }
    }

    pub fn with_def(mut self, id: impl Into<SchemaId>, node: SchemaNode) -> Self {
        self.defs.insert(id.into(), node);
        self
    }

    pub fn def(&self, id: &SchemaId) -> Option<&SchemaNode> {
        self.defs.get(id)
    }
}

impl From<SchemaNode> for Schema {
    fn from(root: SchemaNode) -> Self {
        Schema::new(root)
    }
}
