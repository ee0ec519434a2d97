//! Compiled-grammar cache keyed by schema fingerprint.
//!
//! Compilation is pure, so two structurally identical schemas can share one
//! `Arc<CompiledGrammar>`. Entries are never evicted.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::Result;
use crate::grammar::CompiledGrammar;
use crate::lower::{compile_with, CompileOptions};
use crate::schema::Schema;

/// Deterministic fingerprint of a schema: the hash of its canonical JSON form,
/// with the canonical text kept so a hash collision can never alias two
/// schemas.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaKey {
    hash: u64,
    canonical: String,
}

impl SchemaKey {
    pub fn of(schema: &Schema) -> Self {
        // the IR holds only strings, numbers and maps with string keys
        let canonical = serde_json::to_string(schema).unwrap_or_default();
        let mut h = DefaultHasher::new();
        canonical.hash(&mut h);
        SchemaKey { hash: h.finish(), canonical }
    }

    pub fn fingerprint(&self) -> u64 {
        self.hash
    }
}

#[derive(Debug, Default)]
pub struct GrammarCache {
    options: CompileOptions,
    entries: Mutex<HashMap<SchemaKey, Arc<CompiledGrammar>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

impl GrammarCache {
    pub fn new(options: CompileOptions) -> Self {
        GrammarCache { options, ..Default::default() }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Cached grammar for `schema`, compiling it on first sight. Failed
    /// compiles are not cached.
    pub fn get_or_compile(&self, schema: &Schema) -> Result<Arc<CompiledGrammar>> {
        let key = SchemaKey::of(schema);
        if let Some(hit) = self.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(hit));
        }

        // compile without holding the lock; a racing insert of the same key
        // produces an equal grammar, first one wins
        self.misses.fetch_add(1, Ordering::Relaxed);
        let grammar = Arc::new(compile_with(schema, &self.options)?);
        debug!(key = key.fingerprint(), rules = grammar.rules().len(), "cached new grammar");
        let mut entries = self.lock();
        Ok(Arc::clone(entries.entry(key).or_insert(grammar)))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.lock().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SchemaKey, Arc<CompiledGrammar>>> {
        // a poisoned map still only holds finished grammars
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
