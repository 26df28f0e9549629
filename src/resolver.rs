// Reference Resolver Cache
// Maps catalog identifiers to display labels: served from memory, falls back
// to a remote single-identifier lookup on miss, self-populates from a bulk
// prefetch before processing begins.

use serde::Deserialize;
use std::collections::HashMap;

use crate::error::AuditError;

// ============================================================================
// PERMISSIBLE VALUES
// ============================================================================

/// One entry of a permissible-value catalog as the platform returns it.
///
/// Label preference is `value`, else `attributeValue`, else the decimal id.
/// An empty string counts as absent.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissibleValue {
    pub id: i64,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(rename = "attributeValue", default)]
    pub attribute_value: Option<String>,
}

impl PermissibleValue {
    /// Display label for this catalog entry
    pub fn label(&self) -> String {
        non_empty(&self.value)
            .or_else(|| non_empty(&self.attribute_value))
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

// ============================================================================
// LABEL SOURCE
// ============================================================================

/// Remote fetch capability for a single identifier.
///
/// The REST client implements this against the live catalog; tests implement
/// it with in-memory fakes. A failed fetch never aborts the enclosing row -
/// the resolver degrades to the decimal identifier instead.
pub trait LabelSource {
    fn fetch_label(&self, attribute: &str, id: i64) -> Result<String, AuditError>;
}

// ============================================================================
// LABEL CACHE
// ============================================================================

/// Counters for cache traffic, reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Identifiers answered from memory
    pub hits: u64,
    /// Identifiers answered by a remote fetch
    pub remote_fetches: u64,
    /// Identifiers that degraded to their decimal form
    pub fallbacks: u64,
}

/// In-memory identifier -> label mapping, owned by the run.
///
/// Created once, passed by reference into the value normalizer, and written
/// at most once per identifier under normal operation: after the first
/// successful fetch every later occurrence is a hit.
#[derive(Debug, Default)]
pub struct LabelCache {
    labels: HashMap<i64, String>,
    stats: CacheStats,
}

impl LabelCache {
    pub fn new() -> Self {
        LabelCache::default()
    }

    /// Look up a cached label
    pub fn get(&self, id: i64) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    /// Store a resolved label
    pub fn put(&mut self, id: i64, label: String) {
        self.labels.insert(id, label);
    }

    /// Merge a bulk catalog listing into the cache.
    ///
    /// Used once per attribute category before processing begins so that the
    /// common identifiers never cost a remote round trip. Returns the number
    /// of entries merged.
    pub fn prefetch(&mut self, values: &[PermissibleValue]) -> usize {
        for pv in values {
            self.labels.insert(pv.id, pv.label());
        }
        values.len()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Cache plus fetch capability, borrowed for the duration of one transform.
///
/// Resolution order: cache hit, else remote fetch by (attribute, id) with the
/// result cached, else the identifier's decimal string. Fetch failures are
/// counted but never propagated.
pub struct Resolver<'a> {
    cache: &'a mut LabelCache,
    source: &'a dyn LabelSource,
}

impl<'a> Resolver<'a> {
    pub fn new(cache: &'a mut LabelCache, source: &'a dyn LabelSource) -> Self {
        Resolver { cache, source }
    }

    /// Resolve one identifier to its display label
    pub fn resolve(&mut self, attribute: &str, id: i64) -> String {
        if let Some(label) = self.cache.get(id) {
            let label = label.to_string();
            self.cache.stats.hits += 1;
            return label;
        }

        match self.source.fetch_label(attribute, id) {
            Ok(label) => {
                self.cache.put(id, label.clone());
                self.cache.stats.remote_fetches += 1;
                label
            }
            Err(err) => {
                eprintln!("⚠️  Could not resolve {attribute} id {id}: {err}");
                self.cache.stats.fallbacks += 1;
                id.to_string()
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
