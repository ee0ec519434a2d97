//! Reference resolution and cycle detection.
//!
//! Walks the schema from the root through the definitions table with a stack of
//! in-progress ids. A ref back into that stack marks its target as a *cycle
//! head*; each head gets a [`RuleId`] and becomes a rule boundary during
//! lowering. Every other ref stays a plain marker; the compiler inlines it
//! unless several refs share the target.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{CompileError, Result, SchemaPath};
use crate::grammar::RuleId;
use crate::schema::{Schema, SchemaId, SchemaNode};

/// A schema whose refs are known to resolve, with cycle heads numbered.
#[derive(Debug, Clone)]
pub struct ResolvedSchema<'s> {
    schema: &'s Schema,
    heads: IndexMap<SchemaId, RuleId>,
    reachable: Vec<SchemaId>,
    ref_counts: HashMap<SchemaId, usize>,
}

impl<'s> ResolvedSchema<'s> {
    pub fn root(&self) -> &'s SchemaNode {
        &self.schema.root
    }

    /// Referent of `id`. Only ids seen during resolution are guaranteed present.
    pub fn target(&self, id: &SchemaId, path: &SchemaPath) -> Result<&'s SchemaNode> {
        self.schema
            .def(id)
            .ok_or_else(|| CompileError::RefResolution { path: path.clone(), id: id.clone() })
    }

    /// Rule assigned to `id` if it is the entry point of a cycle.
    pub fn rule_for(&self, id: &SchemaId) -> Option<RuleId> {
        self.heads.get(id).copied()
    }

    /// Cycle heads in rule-id order.
    pub fn cycle_heads(&self) -> impl Iterator<Item = (&SchemaId, RuleId)> {
        self.heads.iter().map(|(id, rule)| (id, *rule))
    }

    /// More than one ref in the reachable schema names `id`.
    pub fn is_shared(&self, id: &SchemaId) -> bool {
        self.ref_counts.get(id).is_some_and(|&n| n > 1)
    }

    /// Definitions reachable from the root, in first-visit order.
    pub fn reachable(&self) -> &[SchemaId] {
        &self.reachable
    }
}

pub fn resolve(schema: &Schema) -> Result<ResolvedSchema<'_>> {
    let mut walk = Walk {
        schema,
        visiting: Vec::new(),
        done: HashSet::new(),
        heads: IndexMap::new(),
        reachable: Vec::new(),
        ref_counts: HashMap::new(),
    };
    walk.node(&schema.root, &SchemaPath::root())?;
    check_productive(schema, &walk.reachable)?;

    trace!(heads = walk.heads.len(), defs = walk.reachable.len(), "resolved schema refs");
    Ok(ResolvedSchema { schema, heads: walk.heads, reachable: walk.reachable, ref_counts: walk.ref_counts })
}

struct Walk<'s> {
    schema: &'s Schema,
    visiting: Vec<SchemaId>,
    done: HashSet<SchemaId>,
    heads: IndexMap<SchemaId, RuleId>,
    reachable: Vec<SchemaId>,
    /// Ref occurrences per target; each reachable body is walked once.
    ref_counts: HashMap<SchemaId, usize>,
}

impl<'s> Walk<'s> {
    fn node(&mut self, node: &'s SchemaNode, path: &SchemaPath) -> Result<()> {
        match node {
            SchemaNode::List { element, .. } => self.node(element, &path.items()),
            SchemaNode::Record { fields } => {
                for f in fields {
                    self.node(&f.value, &path.field(&f.name))?;
                }
                Ok(())
            }
            SchemaNode::Union { variants } => {
                for (i, v) in variants.iter().enumerate() {
                    self.node(v, &path.variant(i))?;
                }
                Ok(())
            }
            SchemaNode::Ref { id } => self.reference(id, path),
            SchemaNode::Null | SchemaNode::Bool | SchemaNode::Int | SchemaNode::Float | SchemaNode::Str(_) => Ok(()),
        }
    }

    fn reference(&mut self, id: &SchemaId, path: &SchemaPath) -> Result<()> {
        let Some(target) = self.schema.def(id) else {
            return Err(CompileError::RefResolution { path: path.clone(), id: id.clone() });
        };
        *self.ref_counts.entry(id.clone()).or_default() += 1;
        if self.visiting.contains(id) {
            let next = RuleId(self.heads.len() as u32);
            self.heads.entry(id.clone()).or_insert(next);
            return Ok(());
        }
        if self.done.contains(id) {
            return Ok(());
        }
        self.visiting.push(id.clone());
        self.reachable.push(id.clone());
        self.node(target, &SchemaPath::def(id))?;
        self.visiting.pop();
        self.done.insert(id.clone());
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PRODUCTIVITY
// ————————————————————————————————————————————————————————————————————————————

/// Refs reachable from `node` without passing through a list or record.
fn transparent_refs<'s>(node: &'s SchemaNode, out: &mut Vec<&'s SchemaId>) {
    match node {
        SchemaNode::Ref { id } => out.push(id),
        SchemaNode::Union { variants } => {
            for v in variants {
                transparent_refs(v, out);
            }
        }
        _ => {}
    }
}

/// A cycle that only passes through refs and union arms re-enters its own
/// rule before consuming any input, so no rule boundary can represent it.
fn check_productive(schema: &Schema, reachable: &[SchemaId]) -> Result<()> {
    let edges: HashMap<&SchemaId, Vec<&SchemaId>> = reachable
        .iter()
        .filter_map(|id| {
            let node = schema.def(id)?;
            let mut out = Vec::new();
            transparent_refs(node, &mut out);
            Some((id, out))
        })
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark { Open, Closed }
    let mut marks: HashMap<&SchemaId, Mark> = HashMap::new();

    fn visit<'a>(
        id: &'a SchemaId,
        edges: &HashMap<&'a SchemaId, Vec<&'a SchemaId>>,
        marks: &mut HashMap<&'a SchemaId, Mark>,
    ) -> Option<&'a SchemaId> {
        match marks.get(id) {
            Some(Mark::Open) => return Some(id),
            Some(Mark::Closed) => return None,
            None => {}
        }
        marks.insert(id, Mark::Open);
        for next in edges.get(id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(culprit) = visit(*next, edges, marks) {
                return Some(culprit);
            }
        }
        marks.insert(id, Mark::Closed);
        None
    }

    for id in reachable {
        if let Some(culprit) = visit(id, &edges, &mut marks) {
            return Err(CompileError::cyclic(
                &SchemaPath::def(culprit),
                format!("`{culprit}` refers back to itself without an enclosing list or record"),
            ));
        }
    }
    Ok(())
}
