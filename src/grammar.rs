//! Grammar IR: the compiled, language-agnostic description of every
//! serialized string a schema admits.
//!
//! The algebra is closed: four structural constructors plus `Rule` indirection.
//! Nodes never point at each other; recursion goes through [`RuleId`] lookups
//! into the rule arena owned by [`CompiledGrammar`], so a grammar is a plain
//! tree of values even when its language is recursive.
pub mod ebnf;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index into [`CompiledGrammar::rules`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u32);

impl RuleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// How the characters of a terminal's run relate to the value they spell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// The run is the value.
    #[default]
    Raw,
    /// The run is the body of a JSON string literal. It ends at the first
    /// unescaped `"`; `pattern` and the length bounds apply to the decoded
    /// value, and every escape must be valid JSON.
    JsonString,
}

impl Encoding {
    fn is_raw(&self) -> bool {
        *self == Encoding::Raw
    }
}

/// Leaf that matches a run of characters instead of fixed text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Terminal {
    /// Unanchored regex the whole (decoded) value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Bounds on the value's length in chars.
    #[serde(default)]
    pub min_len: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Encoding::is_raw")]
    pub encoding: Encoding,
}

impl Terminal {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Terminal { pattern: Some(pattern.into()), min_len: 0, max_len: None, encoding: Encoding::Raw }
    }

    /// Body of a JSON string whose decoded value optionally matches `pattern`.
    pub fn json_string(pattern: Option<String>) -> Self {
        Terminal { pattern, min_len: 0, max_len: None, encoding: Encoding::JsonString }
    }

    pub fn min_len(mut self, n: usize) -> Self {
        self.min_len = n;
        self
    }

    pub fn max_len(mut self, n: Option<usize>) -> Self {
        self.max_len = n;
        self
    }

    /// Length bounds alone, no pattern.
    pub fn accepts_len(&self, len: usize) -> bool {
        len >= self.min_len && self.max_len.is_none_or(|max| len <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GrammarNode {
    Literal(String),
    Constrained(Terminal),
    Concat(Vec<GrammarNode>),
    /// Union of the alternatives' languages; order is a first-match tie-break.
    Alt(Vec<GrammarNode>),
    Rule(RuleId),
}

impl GrammarNode {
    pub fn literal(text: impl Into<String>) -> Self {
        GrammarNode::Literal(text.into())
    }

    /// Matches the empty string.
    pub fn empty() -> Self {
        GrammarNode::Concat(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            GrammarNode::Literal(s) => s.is_empty(),
            GrammarNode::Concat(parts) => parts.iter().all(GrammarNode::is_empty),
            _ => false,
        }
    }

    /// Concatenation with nested concats flattened, empties dropped and
    /// adjacent literals merged.
    pub fn concat(parts: impl IntoIterator<Item = GrammarNode>) -> Self {
        let mut out: Vec<GrammarNode> = Vec::new();
        for part in parts {
            match part {
                GrammarNode::Concat(inner) => {
                    for p in inner {
                        push_concat_part(&mut out, p);
                    }
                }
                other => push_concat_part(&mut out, other),
            }
        }
        match out.len() {
            1 => out.remove(0),
            _ => GrammarNode::Concat(out),
        }
    }

    /// Alternation with nested alts flattened. A single arm is returned as-is.
    pub fn alt(arms: impl IntoIterator<Item = GrammarNode>) -> Self {
        let mut out = Vec::new();
        for arm in arms {
            match arm {
                GrammarNode::Alt(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            1 => out.remove(0),
            _ => GrammarNode::Alt(out),
        }
    }

    /// `self | ε`
    pub fn optional(self) -> Self {
        GrammarNode::alt([self, GrammarNode::empty()])
    }

    /// Leaves are cheap to repeat; anything else is worth binding to a rule
    /// before it gets copied.
    pub fn is_leaf(&self) -> bool {
        matches!(self, GrammarNode::Literal(_) | GrammarNode::Constrained(_) | GrammarNode::Rule(_))
    }

    /// Number of nodes in this tree, not following rule references.
    pub fn size(&self) -> usize {
        match self {
            GrammarNode::Concat(parts) | GrammarNode::Alt(parts) => 1 + parts.iter().map(GrammarNode::size).sum::<usize>(),
            _ => 1,
        }
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a GrammarNode)) {
        f(self);
        if let GrammarNode::Concat(parts) | GrammarNode::Alt(parts) = self {
            for p in parts {
                p.visit(f);
            }
        }
    }
}

fn push_concat_part(out: &mut Vec<GrammarNode>, part: GrammarNode) {
    if part.is_empty() {
        return;
    }
    if let (Some(GrammarNode::Literal(prev)), GrammarNode::Literal(next)) = (out.last_mut(), &part) {
        prev.push_str(next);
        return;
    }
    out.push(part);
}

/// Rule-table entry: binds a body to its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDef {
    pub id: RuleId,
    /// Debug label, e.g. `Node` or `list_item`.
    pub name: String,
    pub body: GrammarNode,
}

/// Output of a compile call: a root plus the arena of rule bodies.
///
/// Immutable once built and safe to share (`Arc`) across any number of
/// matcher sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledGrammar {
    root: GrammarNode,
    rules: Vec<RuleDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("rule {0} is referenced but not defined")]
    UndefinedRule(RuleId),
    #[error("rule table slot {slot} holds rule {id}")]
    MisplacedRule { slot: usize, id: RuleId },
    #[error("empty alternation in {0}")]
    EmptyAlt(String),
    #[error("invalid terminal pattern `{pattern}`: {reason}")]
    BadPattern { pattern: String, reason: String },
    #[error("terminal bounds min_len={min} > max_len={max}")]
    BadBounds { min: usize, max: usize },
}

impl CompiledGrammar {
    pub fn root(&self) -> &GrammarNode {
        &self.root
    }

    pub fn rules(&self) -> &[RuleDef] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> Option<&RuleDef> {
        self.rules.get(id.index())
    }

    /// Total node count over the root and every rule body.
    pub fn size(&self) -> usize {
        self.root.size() + self.rules.iter().map(|r| r.body.size()).sum::<usize>()
    }

    /// Structural checks every grammar handed to a matcher must pass.
    pub fn validate(&self) -> Result<(), GrammarError> {
        for (slot, rule) in self.rules.iter().enumerate() {
            if rule.id.index() != slot {
                return Err(GrammarError::MisplacedRule { slot, id: rule.id });
            }
        }
        let bodies = std::iter::once(("root".to_string(), &self.root))
            .chain(self.rules.iter().map(|r| (format!("{} ({})", r.id, r.name), &r.body)));
        for (owner, body) in bodies {
            let mut failure = None;
            body.visit(&mut |node| {
                if failure.is_some() {
                    return;
                }
                failure = self.check_node(node, &owner).err();
            });
            if let Some(err) = failure {
                return Err(err);
            }
        }
        Ok(())
    }

    fn check_node(&self, node: &GrammarNode, owner: &str) -> Result<(), GrammarError> {
        match node {
            GrammarNode::Rule(id) if self.rule(*id).is_none() => Err(GrammarError::UndefinedRule(*id)),
            GrammarNode::Alt(arms) if arms.is_empty() => Err(GrammarError::EmptyAlt(owner.to_string())),
            GrammarNode::Constrained(t) => {
                match t.max_len {
                    Some(max) if max < t.min_len => {
                        return Err(GrammarError::BadBounds { min: t.min_len, max });
                    }
                    _ => {}
                }
                if let Some(p) = &t.pattern {
                    regex::Regex::new(&format!("^(?:{p})$")).map_err(|e| GrammarError::BadPattern {
                        pattern: p.clone(),
                        reason: e.to_string(),
                    })?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BUILDER
// ————————————————————————————————————————————————————————————————————————————

/// Accumulates rule bodies while a grammar is being lowered.
///
/// Ids are handed out before their bodies exist so that a body can refer to
/// its own rule.
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    slots: Vec<(String, Option<GrammarNode>)>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, name: impl Into<String>) -> RuleId {
        let id = RuleId(self.slots.len() as u32);
        self.slots.push((name.into(), None));
        id
    }

    pub fn define(&mut self, id: RuleId, body: GrammarNode) {
        debug_assert!(self.slots[id.index()].1.is_none(), "rule {id} defined twice");
        self.slots[id.index()].1 = Some(body);
    }

    pub fn is_defined(&self, id: RuleId) -> bool {
        self.slots.get(id.index()).is_some_and(|(_, body)| body.is_some())
    }

    /// Reserve and define in one step.
    pub fn add(&mut self, name: impl Into<String>, body: GrammarNode) -> RuleId {
        let id = self.reserve(name);
        self.define(id, body);
        id
    }

    /// Seal the grammar. Fails with the first reserved id that never got a body.
    pub fn finish(self, root: GrammarNode) -> Result<CompiledGrammar, RuleId> {
        let mut rules = Vec::with_capacity(self.slots.len());
        for (i, (name, body)) in self.slots.into_iter().enumerate() {
            let id = RuleId(i as u32);
            let body = body.ok_or(id)?;
            rules.push(RuleDef { id, name, body });
        }
        Ok(CompiledGrammar { root, rules })
    }
}
