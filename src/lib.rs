//! Compile structured schemas into grammars that accept exactly the compact
//! JSON serializations of values matching the schema.
//!
//! ```
//! use schema_grammar::{compile, Field, GrammarMatcher, MatchStatus, ReferenceMatcher, SchemaNode};
//!
//! let schema = SchemaNode::record(vec![
//!     Field::required("name", SchemaNode::str()),
//!     Field::optional("tags", SchemaNode::list(SchemaNode::str())),
//! ]);
//! let grammar = compile(&schema.into()).unwrap();
//! let matcher = ReferenceMatcher::new(&grammar).unwrap();
//! assert_eq!(matcher.match_prefix(r#"{"name":"Ada","tags":["x"]}"#), MatchStatus::Complete);
//! assert_eq!(matcher.match_prefix(r#"{"tags":[]}"#), MatchStatus::Reject);
//! ```
pub mod cache;
pub mod cli;
pub mod error;
pub mod grammar;
pub mod lower;
pub mod matcher;
pub mod path_de;
pub mod resolve;
pub mod schema;

pub use cache::{GrammarCache, SchemaKey};
pub use error::{CompileError, Result, SchemaPath};
pub use grammar::{
    CompiledGrammar, Encoding, GrammarBuilder, GrammarError, GrammarNode, RuleDef, RuleId, Terminal,
};
pub use lower::{compile, compile_with, CompileOptions};
pub use matcher::{GrammarMatcher, MatchSession, MatchStatus, ReferenceMatcher};
pub use schema::{Field, Schema, SchemaId, SchemaNode, StrConstraints};
