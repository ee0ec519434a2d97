//! Schema → grammar lowering.
//!
//! Serialized form is compact JSON: no insignificant whitespace, `,` between
//! items and fields, `:` after keys. Records accept their fields in declared
//! order only; unions accept the union of their variants.
pub mod primitive;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{CompileError, Result, SchemaPath};
use crate::grammar::{CompiledGrammar, GrammarBuilder, GrammarNode, RuleId};
use crate::resolve::{resolve, ResolvedSchema};
use crate::schema::{Field, Schema, SchemaId, SchemaNode};

pub use primitive::compile_primitive;

/// Knobs for a compile call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Largest `max_items` a bounded list may unroll to. Bounds above this are
    /// refused instead of silently dropped.
    pub max_list_unroll: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { max_list_unroll: 1024 }
    }
}

pub fn compile(schema: &Schema) -> Result<CompiledGrammar> {
    compile_with(schema, &CompileOptions::default())
}

/// Resolve refs, lower every node and seal the rule table.
///
/// Pure: all memoization lives in this call and is dropped when it returns.
pub fn compile_with(schema: &Schema, options: &CompileOptions) -> Result<CompiledGrammar> {
    debug!(root = schema.root.kind(), defs = schema.defs.len(), "compiling schema");
    let resolved = resolve(schema)?;
    let mut compiler = Compiler::new(&resolved, options);
    let root = compiler.lower(resolved.root(), &SchemaPath::root())?;
    let grammar = compiler.finish(root)?;
    debug!(rules = grammar.rules().len(), size = grammar.size(), "compiled grammar");
    Ok(grammar)
}

pub struct Compiler<'a, 's> {
    resolved: &'a ResolvedSchema<'s>,
    options: &'a CompileOptions,
    builder: GrammarBuilder,
    /// Lowered referents of acyclic refs, or the rule they were bound to.
    memo: HashMap<SchemaId, GrammarNode>,
    /// Cycle heads whose body is being lowered right now.
    expanding: HashSet<RuleId>,
}

impl<'a, 's> Compiler<'a, 's> {
    pub fn new(resolved: &'a ResolvedSchema<'s>, options: &'a CompileOptions) -> Self {
        let mut builder = GrammarBuilder::new();
        for (id, rule) in resolved.cycle_heads() {
            let reserved = builder.reserve(id.as_str());
            debug_assert_eq!(reserved, rule);
        }
        Compiler { resolved, options, builder, memo: HashMap::new(), expanding: HashSet::new() }
    }

    pub fn lower(&mut self, node: &'s SchemaNode, path: &SchemaPath) -> Result<GrammarNode> {
        match node {
            SchemaNode::Null | SchemaNode::Bool | SchemaNode::Int | SchemaNode::Float | SchemaNode::Str(_) => {
                compile_primitive(node, path)
            }
            SchemaNode::List { element, min_items, max_items } => self.list(element, *min_items, *max_items, path),
            SchemaNode::Record { fields } => self.record(fields, path),
            SchemaNode::Union { variants } => self.union(variants, path),
            SchemaNode::Ref { id } => self.reference(id, path),
        }
    }

    pub fn finish(self, root: GrammarNode) -> Result<CompiledGrammar> {
        let grammar = self.builder.finish(root).map_err(|id| {
            CompileError::cyclic(&SchemaPath::root(), format!("rule {id} was reserved but never materialized"))
        })?;
        debug_assert!(grammar.validate().is_ok(), "{:?}", grammar.validate());
        Ok(grammar)
    }

    // ———————————————————————————————— refs ————————————————————————————————

    fn reference(&mut self, id: &SchemaId, path: &SchemaPath) -> Result<GrammarNode> {
        if let Some(rule) = self.resolved.rule_for(id) {
            if !self.builder.is_defined(rule) && self.expanding.insert(rule) {
                let target = self.resolved.target(id, path)?;
                let body = self.lower(target, &SchemaPath::def(id))?;
                self.builder.define(rule, body);
                self.expanding.remove(&rule);
                trace!(%id, %rule, "materialized recursive rule");
            }
            return Ok(GrammarNode::Rule(rule));
        }

        if let Some(hit) = self.memo.get(id) {
            trace!(%id, "memo hit");
            return Ok(hit.clone());
        }
        let target = self.resolved.target(id, path)?;
        let mut node = self.lower(target, &SchemaPath::def(id))?;
        if self.resolved.is_shared(id) && !node.is_leaf() {
            // inlining a shared body at every use doubles per level of sharing
            let rule = self.builder.add(id.as_str(), node);
            trace!(%id, %rule, "bound shared referent to rule");
            node = GrammarNode::Rule(rule);
        }
        self.memo.insert(id.clone(), node.clone());
        Ok(node)
    }

    // ———————————————————————————————— unions ————————————————————————————————

    fn union(&mut self, variants: &'s [SchemaNode], path: &SchemaPath) -> Result<GrammarNode> {
        if variants.is_empty() {
            return Err(CompileError::unsupported(path, "union without variants accepts nothing"));
        }
        let arms = variants
            .iter()
            .enumerate()
            .map(|(i, v)| self.lower(v, &path.variant(i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(GrammarNode::alt(arms))
    }

    // ———————————————————————————————— lists ————————————————————————————————

    fn list(
        &mut self,
        element: &'s SchemaNode,
        min_items: usize,
        max_items: Option<usize>,
        path: &SchemaPath,
    ) -> Result<GrammarNode> {
        if let Some(max) = max_items {
            if min_items > max {
                return Err(CompileError::conflict(path, format!("min_items {min_items} exceeds max_items {max}")));
            }
            if max > self.options.max_list_unroll {
                return Err(CompileError::unsupported(
                    path,
                    format!("max_items {max} is above the unroll limit {}", self.options.max_list_unroll),
                ));
            }
            if max == 0 {
                return Ok(GrammarNode::literal("[]"));
            }
        }

        let items_path = path.items();
        let item = self.lower(element, &items_path)?;
        let copies = match max_items {
            Some(max) => max,
            None => min_items + 2,
        };
        let item = if copies > 1 && !item.is_leaf() {
            GrammarNode::Rule(self.builder.add(items_path.to_string(), item))
        } else {
            item
        };

        match max_items {
            None => Ok(self.unbounded_list(item, min_items, &items_path)),
            Some(max) => Ok(bounded_list(item, min_items, max)),
        }
    }

    /// `R = item | item "," R`, with the first `min_items` items spelled out.
    fn unbounded_list(&mut self, item: GrammarNode, min_items: usize, items_path: &SchemaPath) -> GrammarNode {
        let rest = self.builder.reserve(format!("{items_path}+"));
        self.builder.define(rest, GrammarNode::alt([
            item.clone(),
            GrammarNode::concat([item.clone(), GrammarNode::literal(","), GrammarNode::Rule(rest)]),
        ]));

        if min_items == 0 {
            return GrammarNode::concat([
                GrammarNode::literal("["),
                GrammarNode::alt([
                    GrammarNode::literal("]"),
                    GrammarNode::concat([GrammarNode::Rule(rest), GrammarNode::literal("]")]),
                ]),
            ]);
        }

        let mut parts = vec![GrammarNode::literal("["), item.clone()];
        for _ in 1..min_items {
            parts.push(GrammarNode::literal(","));
            parts.push(item.clone());
        }
        parts.push(GrammarNode::alt([
            GrammarNode::literal("]"),
            GrammarNode::concat([GrammarNode::literal(","), GrammarNode::Rule(rest), GrammarNode::literal("]")]),
        ]));
        GrammarNode::concat(parts)
    }

    // ———————————————————————————————— records ————————————————————————————————

    fn record(&mut self, fields: &'s [Field], path: &SchemaPath) -> Result<GrammarNode> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(fields.len());
        for f in fields {
            let field_path = path.field(&f.name);
            if !seen.insert(f.name.as_str()) {
                return Err(CompileError::unsupported(&field_path, "duplicate field name"));
            }
            let key = serde_json::to_string(&f.name)
                .map_err(|e| CompileError::unsupported(&field_path, format!("unencodable field name: {e}")))?;
            let value = self.lower(&f.value, &field_path)?;
            entries.push(GrammarNode::concat([GrammarNode::literal(format!("{key}:")), value]));
        }

        let n = fields.len();
        // fields[..lead] are optional and may be the first one emitted
        let lead = fields.iter().position(|f| f.required).unwrap_or(n);

        // after[j]: fields j.. once some earlier field was emitted
        let mut after_at = vec![GrammarNode::empty(); n + 1];
        let mut after = GrammarNode::empty();
        for j in (0..n).rev() {
            let item = GrammarNode::concat([GrammarNode::literal(","), entries[j].clone()]);
            let item = if fields[j].required { item } else { item.optional() };
            after = GrammarNode::concat([item, after]);
            // shared by the include and omit branches of the leading optionals
            if lead > 0 && (1..=lead + 1).contains(&j) && !after.is_leaf() && !after.is_empty() {
                after = GrammarNode::Rule(self.builder.add(format!("{path}.{}..", fields[j].name), after));
            }
            after_at[j] = after.clone();
        }

        // first[j]: fields j.. with nothing emitted yet
        let mut first = match entries.get(lead) {
            Some(entry) => GrammarNode::concat([entry.clone(), after_at[lead + 1].clone()]),
            None => GrammarNode::empty(),
        };
        for j in (0..lead).rev() {
            let include = GrammarNode::concat([entries[j].clone(), after_at[j + 1].clone()]);
            first = GrammarNode::alt([include, first]);
        }

        Ok(GrammarNode::concat([GrammarNode::literal("{"), first, GrammarNode::literal("}")]))
    }
}

/// `[` up to `max` items `]`, unrolled as nested alternatives.
fn bounded_list(item: GrammarNode, min_items: usize, max_items: usize) -> GrammarNode {
    let mandatory = min_items.max(1);
    let mut tail = GrammarNode::literal("]");
    for _ in 0..(max_items - mandatory) {
        tail = GrammarNode::alt([
            GrammarNode::literal("]"),
            GrammarNode::concat([GrammarNode::literal(","), item.clone(), tail]),
        ]);
    }

    let mut parts = vec![item.clone()];
    for _ in 1..mandatory {
        parts.push(GrammarNode::literal(","));
        parts.push(item.clone());
    }
    parts.push(tail);
    let filled = GrammarNode::concat(parts);

    if min_items == 0 {
        GrammarNode::concat([
            GrammarNode::literal("["),
            GrammarNode::alt([GrammarNode::literal("]"), filled]),
        ])
    } else {
        GrammarNode::concat([GrammarNode::literal("["), filled])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Terminal;

    #[test]
    fn unbounded_list_shape() {
        let g = compile(&SchemaNode::list(SchemaNode::Int).into()).unwrap();
        let int = GrammarNode::Constrained(Terminal::pattern(primitive::INT_PATTERN).min_len(1));
        assert_eq!(g.rules().len(), 1);
        assert_eq!(g.rules()[0].body, GrammarNode::Alt(vec![
            int.clone(),
            GrammarNode::Concat(vec![int, GrammarNode::literal(","), GrammarNode::Rule(RuleId(0))]),
        ]));
        assert_eq!(g.root(), &GrammarNode::Concat(vec![
            GrammarNode::literal("["),
            GrammarNode::Alt(vec![
                GrammarNode::literal("]"),
                GrammarNode::Concat(vec![GrammarNode::Rule(RuleId(0)), GrammarNode::literal("]")]),
            ]),
        ]));
    }

    #[test]
    fn min_items_removes_empty_branch() {
        let g = compile(&SchemaNode::bounded_list(SchemaNode::Null, 2, None).into()).unwrap();
        let GrammarNode::Concat(parts) = g.root() else { panic!("expected concat") };
        assert_eq!(parts[0], GrammarNode::literal("[null,null"));
    }

    #[test]
    fn zero_max_is_empty_list_literal() {
        let g = compile(&SchemaNode::bounded_list(SchemaNode::Int, 0, Some(0)).into()).unwrap();
        assert_eq!(g.root(), &GrammarNode::literal("[]"));
    }

    #[test]
    fn bounded_list_size_grows_linearly() {
        let small = compile(&SchemaNode::bounded_list(SchemaNode::Bool, 0, Some(4)).into()).unwrap();
        let large = compile(&SchemaNode::bounded_list(SchemaNode::Bool, 0, Some(40)).into()).unwrap();
        assert!(large.size() < small.size() * 12);
    }

    #[test]
    fn list_bound_errors() {
        let err = compile(&SchemaNode::bounded_list(SchemaNode::Int, 3, Some(2)).into()).unwrap_err();
        assert!(matches!(err, CompileError::ConstraintConflict { .. }));

        let options = CompileOptions { max_list_unroll: 8 };
        let err = compile_with(&SchemaNode::bounded_list(SchemaNode::Int, 0, Some(9)).into(), &options).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedType { .. }));
    }

    #[test]
    fn required_record_is_flat_concat() {
        let schema = SchemaNode::record(vec![
            Field::required("name", SchemaNode::Null),
            Field::required("age", SchemaNode::Null),
        ]);
        let g = compile(&schema.into()).unwrap();
        assert_eq!(g.root(), &GrammarNode::literal("{\"name\":null,\"age\":null}"));
        assert!(g.rules().is_empty());
    }

    #[test]
    fn optional_fields_grow_linearly() {
        let fields = (0..30).map(|i| Field::optional(format!("f{i}"), SchemaNode::Int)).collect();
        let g = compile(&SchemaNode::record(fields).into()).unwrap();
        assert!(g.size() < 30 * 30, "size {}", g.size());
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let schema = SchemaNode::record(vec![
            Field::required("a", SchemaNode::Int),
            Field::optional("a", SchemaNode::Bool),
        ]);
        let err = compile(&schema.into()).unwrap_err();
        assert_eq!(err.path().to_string(), "$.a");
    }

    #[test]
    fn empty_union_is_unsupported() {
        let err = compile(&SchemaNode::union(vec![]).into()).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedType { .. }));
    }

    #[test]
    fn shared_refs_compile_to_one_rule() {
        let schema = Schema::new(SchemaNode::record(vec![
            Field::required("a", SchemaNode::reference("P")),
            Field::required("b", SchemaNode::reference("P")),
        ]))
        .with_def("P", SchemaNode::Bool);
        let g = compile(&schema).unwrap();
        assert_eq!(g.rules().len(), 1);
        assert_eq!(g.rules()[0].name, "P");
        let text = g.to_string();
        assert_eq!(text.matches("\"true\"").count(), 1);
    }

    #[test]
    fn single_use_refs_inline() {
        let schema = Schema::new(SchemaNode::list(SchemaNode::reference("P"))).with_def("P", SchemaNode::Bool);
        let g = compile(&schema).unwrap();
        assert_eq!(g.rules().len(), 1, "only the list tail");
        assert_ne!(g.rules()[0].name, "P");
    }

    #[test]
    fn layered_shared_refs_stay_linear() {
        let mut schema = Schema::new(SchemaNode::reference("D0")).with_def("D18", SchemaNode::Int);
        for i in 0..18 {
            let next = format!("D{}", i + 1);
            schema = schema.with_def(
                format!("D{i}"),
                SchemaNode::record(vec![
                    Field::required("a", SchemaNode::reference(next.as_str())),
                    Field::required("b", SchemaNode::reference(next.as_str())),
                ]),
            );
        }
        let g = compile(&schema).unwrap();
        assert!(g.size() < 18 * 16, "size {}", g.size());
        assert!(g.validate().is_ok());
    }

    #[test]
    fn recursive_schema_has_fixed_rule_table() {
        let schema = Schema::new(SchemaNode::reference("Node")).with_def(
            "Node",
            SchemaNode::record(vec![Field::required("children", SchemaNode::list(SchemaNode::reference("Node")))]),
        );
        let g = compile(&schema).unwrap();
        assert_eq!(g.rules().len(), 2);
        assert_eq!(g.rules()[0].name, "Node");
        assert_eq!(g.root(), &GrammarNode::Rule(RuleId(0)));
        assert!(g.validate().is_ok());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: CompileOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, CompileOptions::default());
        assert!(serde_json::from_str::<CompileOptions>(r#"{"max_unroll": 3}"#).is_err());
    }
}
