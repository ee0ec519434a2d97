//! Matcher adapter.
//!
//! [`GrammarMatcher`] is the contract a generation engine fulfils against a
//! [`CompiledGrammar`]: classify a prefix as rejected, partial or complete, and
//! filter candidate continuations. [`ReferenceMatcher`] is a straightforward
//! (not fast) implementation used to check compiled grammars.
//!
//! The reference matcher runs the grammar over a char stream holding a set of
//! continuation stacks. Pattern terminals step an anchored dense DFA, which
//! tells us both "can this run still match" (non-dead state) and "does the run
//! match now" (match state after end-of-input). JSON string terminals are
//! decoded as they are read; the DFA and the length bounds only ever see the
//! decoded chars.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use regex_automata::dfa::{dense, Automaton, StartKind};
use regex_automata::util::primitives::StateID;
use regex_automata::{Anchored, Input, MatchKind};
use tracing::trace;

use crate::grammar::{CompiledGrammar, Encoding, GrammarNode, RuleId, Terminal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    /// No continuation of this text is accepted.
    Reject,
    /// Some continuation is accepted, the text itself is not.
    Partial,
    /// The text is a complete match (it may still be extensible).
    Complete,
}

pub trait GrammarMatcher {
    fn match_prefix(&self, text: &str) -> MatchStatus;

    /// Candidates that keep `prefix` alive.
    fn admissible<I>(&self, prefix: &str, candidates: I) -> Vec<char>
    where
        I: IntoIterator<Item = char>,
        Self: Sized,
    {
        let mut buf = String::from(prefix);
        candidates
            .into_iter()
            .filter(|&c| {
                buf.truncate(prefix.len());
                buf.push(c);
                self.match_prefix(&buf) != MatchStatus::Reject
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("cannot build automaton for `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },
}

struct PatternDfa {
    dfa: dense::DFA<Vec<u32>>,
    start: StateID,
}

impl PatternDfa {
    fn build(pattern: &str) -> Result<Self, MatcherError> {
        let err = |reason: String| MatcherError::Pattern { pattern: pattern.to_string(), reason };
        let dfa = dense::Builder::new()
            .configure(dense::Config::new().match_kind(MatchKind::All).start_kind(StartKind::Anchored))
            .build(pattern)
            .map_err(|e| err(e.to_string()))?;
        let start = dfa
            .start_state_forward(&Input::new("").anchored(Anchored::Yes))
            .map_err(|e| err(e.to_string()))?;
        Ok(PatternDfa { dfa, start })
    }

    fn step(&self, mut state: StateID, c: char) -> Option<StateID> {
        let mut buf = [0u8; 4];
        for &byte in c.encode_utf8(&mut buf).as_bytes() {
            state = self.dfa.next_state(state, byte);
            if self.dfa.is_dead_state(state) || self.dfa.is_quit_state(state) {
                return None;
            }
        }
        Some(state)
    }

    fn accepts(&self, state: StateID) -> bool {
        self.dfa.is_match_state(self.dfa.next_eoi_state(state))
    }
}

pub struct ReferenceMatcher<'g> {
    grammar: &'g CompiledGrammar,
    dfas: HashMap<&'g str, PatternDfa>,
}

impl<'g> ReferenceMatcher<'g> {
    pub fn new(grammar: &'g CompiledGrammar) -> Result<Self, MatcherError> {
        let mut dfas = HashMap::new();
        let bodies = std::iter::once(grammar.root()).chain(grammar.rules().iter().map(|r| &r.body));
        for body in bodies {
            collect_patterns(body, &mut |pattern| {
                if !dfas.contains_key(pattern) {
                    dfas.insert(pattern, PatternDfa::build(pattern)?);
                }
                Ok(())
            })?;
        }
        Ok(ReferenceMatcher { grammar, dfas })
    }

    pub fn session(&self) -> MatchSession<'_, 'g> {
        let mut configs = Vec::new();
        self.close(vec![Frame::Node(self.grammar.root())], &mut configs);
        let mut session = MatchSession { matcher: self, configs };
        session.dedup();
        session
    }

    /// Expand `stack` until every resulting configuration either waits on
    /// input (literal or open terminal on top) or is finished (empty).
    fn close(&self, stack: Vec<Frame<'g>>, out: &mut Vec<Vec<Frame<'g>>>) {
        let mut work: Vec<(Vec<Frame<'g>>, Vec<(RuleId, usize)>)> = vec![(stack, Vec::new())];
        while let Some((mut stack, mut entered)) = work.pop() {
            let Some(top) = stack.last().cloned() else {
                out.push(stack);
                continue;
            };
            match top {
                Frame::Literal { .. } => out.push(stack),
                Frame::Open { term, len, state, escape } => {
                    let finished = escape == Escape::Idle && self.can_finish(term, len, state);
                    out.push(stack.clone());
                    if finished {
                        stack.pop();
                        work.push((stack, entered));
                    }
                }
                Frame::Node(node) => {
                    stack.pop();
                    match node {
                        GrammarNode::Literal(text) => {
                            if !text.is_empty() {
                                stack.push(Frame::Literal { text, at: 0 });
                            }
                            work.push((stack, entered));
                        }
                        GrammarNode::Concat(parts) => {
                            stack.extend(parts.iter().rev().map(Frame::Node));
                            work.push((stack, entered));
                        }
                        GrammarNode::Alt(arms) => {
                            for arm in arms.iter().rev() {
                                let mut branch = stack.clone();
                                branch.push(Frame::Node(arm));
                                work.push((branch, entered.clone()));
                            }
                        }
                        GrammarNode::Rule(id) => {
                            // re-entering a rule at the same or a deeper stack
                            // height without consuming input never terminates
                            let height = stack.len();
                            if entered.iter().any(|&(r, h)| r == *id && height >= h) {
                                continue;
                            }
                            let Some(rule) = self.grammar.rule(*id) else { continue };
                            entered.push((*id, height));
                            stack.push(Frame::Node(&rule.body));
                            work.push((stack, entered));
                        }
                        GrammarNode::Constrained(term) => {
                            let state = term.pattern.as_deref().and_then(|p| self.dfas.get(p)).map(|d| d.start);
                            stack.push(Frame::Open { term, len: 0, state, escape: Escape::Idle });
                            work.push((stack, entered));
                        }
                    }
                }
            }
        }
    }

    fn can_finish(&self, term: &Terminal, len: usize, state: Option<StateID>) -> bool {
        if !term.accepts_len(len) {
            return false;
        }
        match (term.pattern.as_deref(), state) {
            (None, _) => true,
            (Some(p), Some(state)) => self.dfas.get(p).is_some_and(|d| d.accepts(state)),
            (Some(_), None) => false,
        }
    }

    /// Advance one configuration over `c`; `None` if it cannot take it.
    fn step(&self, mut stack: Vec<Frame<'g>>, c: char) -> Option<Vec<Frame<'g>>> {
        match stack.pop()? {
            Frame::Literal { text, at } => {
                let rest = &text[at..];
                if !rest.starts_with(c) {
                    return None;
                }
                let at = at + c.len_utf8();
                if at < text.len() {
                    stack.push(Frame::Literal { text, at });
                }
                Some(stack)
            }
            Frame::Open { term, len, state, escape } => {
                let (escape, decoded) = match term.encoding {
                    Encoding::Raw => (escape, Some(c)),
                    Encoding::JsonString => escape.feed(c)?,
                };
                let (len, state) = match decoded {
                    None => (len, state),
                    Some(value) => {
                        if term.max_len.is_some_and(|max| len >= max) {
                            return None;
                        }
                        let state = match (term.pattern.as_deref(), state) {
                            (Some(p), Some(state)) => Some(self.dfas.get(p)?.step(state, value)?),
                            (None, _) => None,
                            (Some(_), None) => return None,
                        };
                        (len + 1, state)
                    }
                };
                stack.push(Frame::Open { term, len, state, escape });
                Some(stack)
            }
            Frame::Node(_) => None,
        }
    }
}

impl GrammarMatcher for ReferenceMatcher<'_> {
    fn match_prefix(&self, text: &str) -> MatchStatus {
        let mut session = self.session();
        for (i, c) in text.char_indices() {
            if !session.advance(c) {
                trace!(offset = i, "prefix rejected");
                return MatchStatus::Reject;
            }
        }
        session.status()
    }
}

/// Incremental matching state over one generated text.
pub struct MatchSession<'m, 'g> {
    matcher: &'m ReferenceMatcher<'g>,
    configs: Vec<Vec<Frame<'g>>>,
}

impl MatchSession<'_, '_> {
    /// Consume one character. Returns `false` (and leaves the session dead)
    /// when nothing accepts it.
    pub fn advance(&mut self, c: char) -> bool {
        let mut next = Vec::new();
        for stack in std::mem::take(&mut self.configs) {
            if let Some(stack) = self.matcher.step(stack, c) {
                self.matcher.close(stack, &mut next);
            }
        }
        self.configs = next;
        self.dedup();
        !self.configs.is_empty()
    }

    pub fn feed(&mut self, text: &str) -> bool {
        text.chars().all(|c| self.advance(c))
    }

    pub fn status(&self) -> MatchStatus {
        if self.configs.is_empty() {
            MatchStatus::Reject
        } else if self.configs.iter().any(Vec::is_empty) {
            MatchStatus::Complete
        } else {
            MatchStatus::Partial
        }
    }

    /// Live configurations, mostly useful to see how ambiguous a grammar is.
    pub fn width(&self) -> usize {
        self.configs.len()
    }

    fn dedup(&mut self) {
        let mut seen = HashSet::new();
        self.configs.retain(|stack| seen.insert(stack.clone()));
    }
}

// ————————————————————————————————————————————————————————————————————————————
// FRAMES
// ————————————————————————————————————————————————————————————————————————————

/// One pending piece of work on a continuation stack. Identity is by address
/// into the grammar, which is what makes two configurations interchangeable.
#[derive(Debug, Clone, Copy)]
enum Frame<'g> {
    Node(&'g GrammarNode),
    Literal { text: &'g str, at: usize },
    Open { term: &'g Terminal, len: usize, state: Option<StateID>, escape: Escape },
}

impl PartialEq for Frame<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Frame::Node(a), Frame::Node(b)) => std::ptr::eq(*a, *b),
            (Frame::Literal { text: a, at: x }, Frame::Literal { text: b, at: y }) => {
                std::ptr::eq(a.as_ptr(), b.as_ptr()) && a.len() == b.len() && x == y
            }
            (
                Frame::Open { term: a, len: x, state: s, escape: e },
                Frame::Open { term: b, len: y, state: t, escape: f },
            ) => std::ptr::eq(*a, *b) && x == y && s == t && e == f,
            _ => false,
        }
    }
}

impl Eq for Frame<'_> {}

impl Hash for Frame<'_> {
    fn hash<H: Hasher>(&self, h: &mut H) {
        match self {
            Frame::Node(n) => (0u8, *n as *const GrammarNode as usize).hash(h),
            Frame::Literal { text, at } => (1u8, text.as_ptr() as usize, *at).hash(h),
            Frame::Open { term, len, state, escape } => {
                (2u8, *term as *const Terminal as usize, *len, *state, *escape).hash(h)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// JSON STRING BODIES
// ————————————————————————————————————————————————————————————————————————————

/// Where the decoder stands inside a JSON string body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Escape {
    Idle,
    Backslash,
    /// `\u` plus `digits` hex digits read so far.
    Unicode { digits: u8, acc: u32 },
    /// A high surrogate was read; its low half must follow as `\uDC00`..`\uDFFF`.
    AwaitLow { high: u32 },
    AwaitLowU { high: u32 },
    Low { high: u32, digits: u8, acc: u32 },
}

impl Escape {
    /// Feed one raw char of the body. Yields the next state and the decoded
    /// char, if this one completed one; `None` if the char is not allowed here.
    /// An unescaped `"` is never part of the body.
    fn feed(self, c: char) -> Option<(Escape, Option<char>)> {
        match self {
            Escape::Idle => match c {
                '"' => None,
                '\\' => Some((Escape::Backslash, None)),
                c if (c as u32) < 0x20 => None,
                c => Some((Escape::Idle, Some(c))),
            },
            Escape::Backslash => {
                let decoded = match c {
                    '"' | '\\' | '/' => c,
                    'b' => '\u{8}',
                    'f' => '\u{c}',
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    'u' => return Some((Escape::Unicode { digits: 0, acc: 0 }, None)),
                    _ => return None,
                };
                Some((Escape::Idle, Some(decoded)))
            }
            Escape::Unicode { digits, acc } => {
                let acc = acc * 16 + c.to_digit(16)?;
                if digits < 3 {
                    return Some((Escape::Unicode { digits: digits + 1, acc }, None));
                }
                match acc {
                    0xD800..=0xDBFF => Some((Escape::AwaitLow { high: acc }, None)),
                    0xDC00..=0xDFFF => None,
                    _ => Some((Escape::Idle, Some(char::from_u32(acc)?))),
                }
            }
            Escape::AwaitLow { high } => (c == '\\').then_some((Escape::AwaitLowU { high }, None)),
            Escape::AwaitLowU { high } => (c == 'u').then_some((Escape::Low { high, digits: 0, acc: 0 }, None)),
            Escape::Low { high, digits, acc } => {
                let acc = acc * 16 + c.to_digit(16)?;
                if digits < 3 {
                    return Some((Escape::Low { high, digits: digits + 1, acc }, None));
                }
                if !(0xDC00..=0xDFFF).contains(&acc) {
                    return None;
                }
                let scalar = 0x10000 + ((high - 0xD800) << 10) + (acc - 0xDC00);
                Some((Escape::Idle, Some(char::from_u32(scalar)?)))
            }
        }
    }
}

fn collect_patterns<'g>(
    node: &'g GrammarNode,
    f: &mut impl FnMut(&'g str) -> Result<(), MatcherError>,
) -> Result<(), MatcherError> {
    match node {
        GrammarNode::Constrained(Terminal { pattern: Some(p), .. }) => f(p),
        GrammarNode::Concat(parts) | GrammarNode::Alt(parts) => {
            for p in parts {
                collect_patterns(p, f)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
