//! Human-readable JSON-Schema view of a [`Schema`], for embedding in prompts.
//!
//! Not part of the grammar correctness surface; it only has to describe the
//! same shapes the grammar accepts. Unions render as `anyOf`, since an
//! overlapping value is accepted by every matching arm.

use serde_json::{json, Map, Value};

use super::{Schema, SchemaNode};

// ————————————————————————————————————————————————————————————————————————————
// JSON SCHEMA RENDERING
// ————————————————————————————————————————————————————————————————————————————

impl Schema {
    pub fn to_json_schema(&self) -> Value {
        let mut out = render_node(&self.root);
        if !self.defs.is_empty() {
            let defs: Map<String, Value> = self
                .defs
                .iter()
                .map(|(id, node)| (id.to_string(), render_node(node)))
                .collect();
            if let Value::Object(map) = &mut out {
                map.insert("$defs".into(), Value::Object(defs));
            }
        }
        out
    }
}

pub fn render_node(node: &SchemaNode) -> Value {
    match node {
        SchemaNode::Null => json!({ "type": "null" }),
        SchemaNode::Bool => json!({ "type": "boolean" }),
        SchemaNode::Int => json!({ "type": "integer" }),
        SchemaNode::Float => json!({ "type": "number" }),

        SchemaNode::Str(c) => {
            let mut o = json!({ "type": "string" });
            if let Some(rx) = &c.pattern {
                o["pattern"] = Value::from(rx.clone());
            }
            if let Some(n) = c.max_length {
                o["maxLength"] = Value::from(n);
            }
            for (k, v) in &c.extra {
                o[k.as_str()] = v.clone();
            }
            o
        }

        SchemaNode::List { element, min_items, max_items } => {
            let mut o = json!({
                "type": "array",
                "items": render_node(element),
            });
            if *min_items > 0 { o["minItems"] = Value::from(*min_items); }
            if let Some(mx) = *max_items { o["maxItems"] = Value::from(mx); }
            o
        }

        SchemaNode::Record { fields } => {
            let mut props = Map::new();
            for f in fields {
                props.insert(f.name.clone(), render_node(&f.value));
            }
            let required: Vec<Value> = fields
                .iter()
                .filter(|f| f.required)
                .map(|f| Value::from(f.name.clone()))
                .collect();
            let mut o = json!({ "type": "object", "properties": props });
            if !required.is_empty() {
                o["required"] = Value::Array(required);
            }
            o
        }

        SchemaNode::Union { variants } => {
            json!({ "anyOf": variants.iter().map(render_node).collect::<Vec<_>>() })
        }

        SchemaNode::Ref { id } => json!({ "$ref": format!("#/$defs/{id}") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    #[test]
    fn record_lists_required_fields_in_order() {
        let schema = Schema::new(SchemaNode::record(vec![
            Field::required("name", SchemaNode::str()),
            Field::optional("age", SchemaNode::Int),
        ]));
        let out = schema.to_json_schema();
        assert_eq!(out["required"], json!(["name"]));
        assert_eq!(out["properties"]["age"]["type"], "integer");
        let keys: Vec<_> = out["properties"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["name", "age"]);
    }

    #[test]
    fn refs_render_with_defs_table() {
        let schema = Schema::new(SchemaNode::reference("Node")).with_def(
            "Node",
            SchemaNode::record(vec![Field::required("children", SchemaNode::list(SchemaNode::reference("Node")))]),
        );
        let out = schema.to_json_schema();
        assert_eq!(out["$ref"], "#/$defs/Node");
        assert_eq!(out["$defs"]["Node"]["properties"]["children"]["items"]["$ref"], "#/$defs/Node");
    }

    #[test]
    fn overlapping_unions_render_as_any_of() {
        let schema = Schema::new(SchemaNode::union(vec![SchemaNode::Int, SchemaNode::Float]));
        let out = schema.to_json_schema();
        assert_eq!(out, json!({ "anyOf": [{ "type": "integer" }, { "type": "number" }] }));
    }

    #[test]
    fn rendering_parses_back_to_the_same_schema() {
        let schema = Schema::new(SchemaNode::record(vec![
            Field::required("code", SchemaNode::pattern("[A-Z]\\d")),
            Field::required("scores", SchemaNode::bounded_list(SchemaNode::Float, 1, Some(4))),
            Field::optional("note", SchemaNode::nullable(SchemaNode::str())),
        ]));
        let back = Schema::from_json_schema(&schema.to_json_schema()).unwrap();
        assert_eq!(back, schema);
    }
}
