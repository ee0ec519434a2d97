//! EBNF-style text view of a compiled grammar.
//!
//! ```text
//! root ::= "{\"children\":" r1_Node_children "}"
//! r0_Node ::= ...
//! ```
//! Terminals print as `/pattern/{min,max}`, prefixed with `json` when the run
//! is an encoded JSON string body; `ε` is the empty string.

use std::fmt::{self, Write};

use super::{CompiledGrammar, Encoding, GrammarNode, RuleDef, Terminal};

impl fmt::Display for CompiledGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "root ::= {}", render(self.root(), self))?;
        for rule in self.rules() {
            writeln!(f, "{} ::= {}", rule_label(rule), render(&rule.body, self))?;
        }
        Ok(())
    }
}

pub fn render(node: &GrammarNode, grammar: &CompiledGrammar) -> String {
    let mut out = String::new();
    write_node(&mut out, node, grammar, false);
    out
}

fn rule_label(rule: &RuleDef) -> String {
    let name: String = rule
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() { rule.id.to_string() } else { format!("{}_{}", rule.id, name) }
}

fn write_node(out: &mut String, node: &GrammarNode, grammar: &CompiledGrammar, nested: bool) {
    match node {
        GrammarNode::Literal(text) if text.is_empty() => out.push('ε'),
        GrammarNode::Literal(text) => write_quoted(out, text),
        GrammarNode::Constrained(t) => write_terminal(out, t),
        GrammarNode::Rule(id) => match grammar.rule(*id) {
            Some(rule) => out.push_str(&rule_label(rule)),
            None => out.push_str(&id.to_string()),
        },
        GrammarNode::Concat(parts) if parts.is_empty() => out.push('ε'),
        GrammarNode::Concat(parts) => {
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_node(out, p, grammar, true);
            }
        }
        GrammarNode::Alt(arms) => {
            if nested {
                out.push('(');
            }
            for (i, a) in arms.iter().enumerate() {
                if i > 0 {
                    out.push_str(" | ");
                }
                write_node(out, a, grammar, true);
            }
            if nested {
                out.push(')');
            }
        }
    }
}

fn write_quoted(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_terminal(out: &mut String, t: &Terminal) {
    if t.encoding == Encoding::JsonString {
        out.push_str("json");
    }
    let _ = write!(out, "/{}/", t.pattern.as_deref().unwrap_or(".*"));
    match (t.min_len, t.max_len) {
        (0, None) => {}
        (min, None) => {
            let _ = write!(out, "{{{min},}}");
        }
        (min, Some(max)) => {
            let _ = write!(out, "{{{min},{max}}}");
        }
    }
}
