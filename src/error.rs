//! Compile errors and the schema paths they point at.

use std::fmt;
use thiserror::Error;

use crate::schema::SchemaId;

/// Result type alias for compiler operations.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors produced while resolving or lowering a schema.
///
/// Compilation is all-or-nothing: any of these aborts the whole call and no
/// grammar is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Schema shape or combination the compiler cannot represent.
    #[error("unsupported type at {path}: {reason}")]
    UnsupportedType { path: SchemaPath, reason: String },

    /// Constraint combination that cannot map onto a single constrained terminal.
    #[error("constraint conflict at {path}: {reason}")]
    ConstraintConflict { path: SchemaPath, reason: String },

    /// Reference cycle that cannot be turned into a rule boundary.
    #[error("cyclic schema at {path}: {reason}")]
    CyclicSchema { path: SchemaPath, reason: String },

    /// `Ref` whose id has no entry in the definitions table.
    #[error("unresolved reference `{id}` at {path}")]
    RefResolution { path: SchemaPath, id: SchemaId },
}

impl CompileError {
    pub fn unsupported(path: &SchemaPath, reason: impl Into<String>) -> Self {
        CompileError::UnsupportedType { path: path.clone(), reason: reason.into() }
    }

    pub fn conflict(path: &SchemaPath, reason: impl Into<String>) -> Self {
        CompileError::ConstraintConflict { path: path.clone(), reason: reason.into() }
    }

    pub fn cyclic(path: &SchemaPath, reason: impl Into<String>) -> Self {
        CompileError::CyclicSchema { path: path.clone(), reason: reason.into() }
    }

    /// Location inside the source schema the error was raised at.
    pub fn path(&self) -> &SchemaPath {
        match self {
            CompileError::UnsupportedType { path, .. }
            | CompileError::ConstraintConflict { path, .. }
            | CompileError::CyclicSchema { path, .. }
            | CompileError::RefResolution { path, .. } => path,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PATHS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Entry in the definitions table.
    Def(SchemaId),
    /// Named record field.
    Field(String),
    /// List element position.
    Items,
    /// Union alternative by index.
    Variant(usize),
}

/// Position within the original schema, rendered like `$defs.Node.children[*]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SchemaPath {
    segments: Vec<Segment>,
}

impl SchemaPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn def(id: &SchemaId) -> Self {
        Self { segments: vec![Segment::Def(id.clone())] }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn field(&self, name: &str) -> Self {
        self.with(Segment::Field(name.to_string()))
    }

    pub fn items(&self) -> Self {
        self.with(Segment::Items)
    }

    pub fn variant(&self, index: usize) -> Self {
        self.with(Segment::Variant(index))
    }

    fn with(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }
}

impl fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !matches!(self.segments.first(), Some(Segment::Def(_))) {
            f.write_str("$")?;
        }
        for segment in &self.segments {
            match segment {
                Segment::Def(id) => write!(f, "$defs.{id}")?,
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Items => f.write_str("[*]")?,
                Segment::Variant(i) => write!(f, "|{i}")?,
            }
        }
        Ok(())
    }
}
