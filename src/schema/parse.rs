//! JSON-Schema front-end.
//!
//! Reads the dialect emitted by typical model/validator libraries (`$defs`,
//! `$ref`, `anyOf`, `properties` + `required`, `items`, `pattern`, ...) into a
//! [`Schema`]. Property order is taken from the document, so it must be parsed
//! with an order-preserving map (`serde_json/preserve_order`).
//!
//! Anything that would need a wider or different grammar than the compiler can
//! build exactly is reported as `UnsupportedType` instead of being dropped.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::{Field, Schema, SchemaId, SchemaNode, StrConstraints};
use crate::error::{CompileError, Result, SchemaPath};

static REF_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#/(?:\$defs|definitions)/(.+)$").expect("static regex"));

/// Keywords with no effect on the accepted language.
const ANNOTATIONS: &[&str] = &[
    "$schema", "$id", "$comment", "$defs", "definitions",
    "title", "description", "default", "examples", "deprecated", "readOnly", "writeOnly",
];

pub fn from_json_schema(doc: &Value) -> Result<Schema> {
    let mut defs = IndexMap::new();
    for table_key in ["$defs", "definitions"] {
        let Some(table) = doc.get(table_key) else { continue };
        let Value::Object(entries) = table else {
            return Err(CompileError::unsupported(
                &SchemaPath::root(),
                format!("`{table_key}` must be an object"),
            ));
        };
        for (name, sub) in entries {
            let id = SchemaId::from(name.as_str());
            let node = parse_node(sub, &SchemaPath::def(&id))?;
            defs.insert(id, node);
        }
    }
    let root = parse_node(doc, &SchemaPath::root())?;
    Ok(Schema { root, defs })
}

impl Schema {
    pub fn from_json_schema(doc: &Value) -> Result<Schema> {
        from_json_schema(doc)
    }
}

fn parse_node(value: &Value, path: &SchemaPath) -> Result<SchemaNode> {
    let Value::Object(obj) = value else {
        return Err(CompileError::unsupported(path, "boolean or non-object schemas are not supported"));
    };

    if let Some(target) = obj.get("$ref") {
        only_annotations_beside(obj, "$ref", path)?;
        return parse_ref(target, path);
    }

    for combinator in ["anyOf", "oneOf"] {
        if let Some(arms) = obj.get(combinator) {
            only_annotations_beside(obj, combinator, path)?;
            let Value::Array(arms) = arms else {
                return Err(CompileError::unsupported(path, format!("`{combinator}` must be an array")));
            };
            let variants = arms
                .iter()
                .enumerate()
                .map(|(i, arm)| parse_node(arm, &path.variant(i)))
                .collect::<Result<Vec<_>>>()?;
            return Ok(SchemaNode::Union { variants });
        }
    }

    for keyword in ["allOf", "not", "if", "enum", "const"] {
        if obj.contains_key(keyword) {
            return Err(CompileError::unsupported(path, format!("`{keyword}` is not supported")));
        }
    }

    match obj.get("type") {
        Some(Value::String(ty)) => parse_typed(obj, ty, path),
        Some(Value::Array(types)) => {
            let variants = types
                .iter()
                .enumerate()
                .map(|(i, ty)| match ty {
                    Value::String(ty) => parse_typed(obj, ty, &path.variant(i)),
                    other => Err(CompileError::unsupported(path, format!("type name {other} is not a string"))),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(SchemaNode::Union { variants })
        }
        Some(other) => Err(CompileError::unsupported(path, format!("invalid `type` value {other}"))),
        None => Err(CompileError::unsupported(path, "schema has no `type`, `$ref` or `anyOf`")),
    }
}

/// `$ref` and `anyOf`/`oneOf` replace the schema they sit in, so any sibling
/// that narrows the language would be silently dropped.
fn only_annotations_beside(obj: &Map<String, Value>, keyword: &str, path: &SchemaPath) -> Result<()> {
    match obj.keys().find(|k| k.as_str() != keyword && !ANNOTATIONS.contains(&k.as_str())) {
        None => Ok(()),
        Some(sibling) => Err(CompileError::unsupported(
            path,
            format!("keyword `{sibling}` next to `{keyword}` is not supported"),
        )),
    }
}

fn parse_ref(target: &Value, path: &SchemaPath) -> Result<SchemaNode> {
    let target = target
        .as_str()
        .ok_or_else(|| CompileError::unsupported(path, "`$ref` must be a string"))?;
    let caps = REF_TARGET
        .captures(target)
        .ok_or_else(|| CompileError::unsupported(path, format!("only local `#/$defs/...` refs are supported, got `{target}`")))?;
    Ok(SchemaNode::Ref { id: SchemaId::from(&caps[1]) })
}

fn parse_typed(obj: &Map<String, Value>, ty: &str, path: &SchemaPath) -> Result<SchemaNode> {
    match ty {
        "null" => no_extra_keywords(obj, &[], path).map(|_| SchemaNode::Null),
        "boolean" => no_extra_keywords(obj, &[], path).map(|_| SchemaNode::Bool),
        "integer" => no_extra_keywords(obj, &[], path).map(|_| SchemaNode::Int),
        "number" => no_extra_keywords(obj, &[], path).map(|_| SchemaNode::Float),
        "string" => parse_string(obj, path),
        "array" => parse_array(obj, path),
        "object" => parse_object(obj, path),
        other => Err(CompileError::unsupported(path, format!("unknown type `{other}`"))),
    }
}

/// Keywords owned by other `type` arms of a multi-type schema.
fn belongs_to_other_type(key: &str) -> bool {
    matches!(
        key,
        "type" | "items" | "minItems" | "maxItems" | "properties" | "required" | "additionalProperties"
            | "pattern" | "maxLength" | "minLength" | "format"
    )
}

fn no_extra_keywords(obj: &Map<String, Value>, allowed: &[&str], path: &SchemaPath) -> Result<()> {
    for key in obj.keys() {
        let key = key.as_str();
        if ANNOTATIONS.contains(&key) || allowed.contains(&key) || belongs_to_other_type(key) {
            continue;
        }
        return Err(CompileError::unsupported(path, format!("keyword `{key}` is not supported here")));
    }
    Ok(())
}

fn parse_string(obj: &Map<String, Value>, path: &SchemaPath) -> Result<SchemaNode> {
    let mut constraints = StrConstraints::default();
    for (key, value) in obj {
        match key.as_str() {
            "type" => {}
            "pattern" => {
                let pattern = value
                    .as_str()
                    .ok_or_else(|| CompileError::unsupported(path, "`pattern` must be a string"))?;
                constraints.pattern = Some(pattern.to_string());
            }
            "maxLength" => constraints.max_length = Some(as_count(value, "maxLength", path)?),
            k if ANNOTATIONS.contains(&k) => {}
            "items" | "minItems" | "maxItems" | "properties" | "required" | "additionalProperties" => {}
            other => {
                // kept so the compiler can reject it with the field's path
                constraints.extra.insert(other.to_string(), value.clone());
            }
        }
    }
    Ok(SchemaNode::Str(constraints))
}

fn parse_array(obj: &Map<String, Value>, path: &SchemaPath) -> Result<SchemaNode> {
    no_extra_keywords(obj, &[], path)?;
    let items = obj
        .get("items")
        .ok_or_else(|| CompileError::unsupported(path, "array schema without `items`"))?;
    let element = parse_node(items, &path.items())?;
    let min_items = match obj.get("minItems") {
        Some(v) => as_count(v, "minItems", path)?,
        None => 0,
    };
    let max_items = obj
        .get("maxItems")
        .map(|v| as_count(v, "maxItems", path))
        .transpose()?;
    Ok(SchemaNode::List { element: Box::new(element), min_items, max_items })
}

fn parse_object(obj: &Map<String, Value>, path: &SchemaPath) -> Result<SchemaNode> {
    no_extra_keywords(obj, &[], path)?;
    match obj.get("additionalProperties") {
        None | Some(Value::Bool(false)) => {}
        Some(_) => {
            return Err(CompileError::unsupported(path, "`additionalProperties` schemas are not supported"));
        }
    }

    let required: Vec<&str> = match obj.get("required") {
        None => Vec::new(),
        Some(Value::Array(names)) => names
            .iter()
            .map(|n| n.as_str().ok_or_else(|| CompileError::unsupported(path, "`required` entries must be strings")))
            .collect::<Result<_>>()?,
        Some(_) => return Err(CompileError::unsupported(path, "`required` must be an array")),
    };

    let mut fields = Vec::new();
    match obj.get("properties") {
        None => {}
        Some(Value::Object(props)) => {
            for (name, sub) in props {
                let value = parse_node(sub, &path.field(name))?;
                fields.push(Field { name: name.clone(), value, required: required.contains(&name.as_str()) });
            }
        }
        Some(_) => return Err(CompileError::unsupported(path, "`properties` must be an object")),
    }

    if let Some(missing) = required.iter().find(|r| !fields.iter().any(|f| f.name == **r)) {
        return Err(CompileError::unsupported(path, format!("required property `{missing}` is not declared")));
    }
    Ok(SchemaNode::Record { fields })
}

fn as_count(value: &Value, keyword: &str, path: &SchemaPath) -> Result<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| CompileError::unsupported(path, format!("`{keyword}` must be a non-negative integer")))
}
