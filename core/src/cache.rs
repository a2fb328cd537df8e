//! Session-scoped cache of read-only tool results with path-aware
//! invalidation. Grounded on the Python original's `ToolResultCache`
//! (LRU + TTL + path invalidation strategies), backed here by the `lru`
//! crate rather than a hand-rolled ordered map.

use std::num::NonZeroUsize;
use std::time::Duration;
use std::time::Instant;

use lru::LruCache;
use serde_json::Value;
use sha1::Digest;
use sha1::Sha1;

const DEFAULT_MAX_SIZE: usize = 100;
const DEFAULT_TTL_SECS: u64 = 300;

#[derive(Debug, Clone)]
struct CacheEntry {
    result: Value,
    /// Path(s) the result is about, used by `invalidate_path`. Populated
    /// from the tool's own `path`/`paths` result fields.
    paths: Vec<String>,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

pub struct ToolResultCache {
    entries: LruCache<String, CacheEntry>,
    ttl: Duration,
    stats: CacheStats,
}

impl ToolResultCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(max_size.max(1)).expect("max_size >= 1")),
            ttl,
            stats: CacheStats::default(),
        }
    }

    fn key(tool: &str, args: &Value) -> String {
        let normalized = normalize_json(args);
        let mut hasher = Sha1::new();
        hasher.update(tool.as_bytes());
        hasher.update(b":");
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up a previously cached result for `(tool, args)`. The caller is
    /// responsible for only calling this for tools it has declared
    /// cacheable (`ToolSpec::cacheable`) — the cache itself has no opinion
    /// on which tool names are read-only.
    pub fn get(&mut self, tool: &str, args: &Value) -> Option<Value> {
        let key = Self::key(tool, args);
        let expired = matches!(self.entries.peek(&key), Some(e) if e.inserted_at.elapsed() > self.ttl);
        if expired {
            self.entries.pop(&key);
        }
        match self.entries.get(&key) {
            Some(entry) => {
                self.stats.hits += 1;
                Some(entry.result.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn set(&mut self, tool: &str, args: &Value, result: Value) {
        let key = Self::key(tool, args);
        let paths = extract_paths(&result);
        self.entries.put(
            key,
            CacheEntry {
                result,
                paths,
                inserted_at: Instant::now(),
            },
        );
        self.stats.size = self.entries.len();
    }

    /// Invalidate any cached entry whose result is about `path` — exact
    /// match, suffix match (`".../path"`), the path's parent directory (so
    /// a stale `list_dir` result is evicted), or a path appearing in a
    /// cached match list (`grep`/`glob_file_search`).
    pub fn invalidate_path(&mut self, path: &str) -> usize {
        if path.is_empty() {
            return 0;
        }
        let norm_path = normalize_path(path);
        let parent_dir = parent_of(&norm_path);

        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.paths.iter().any(|p| {
                    let norm = normalize_path(p);
                    norm == norm_path
                        || norm.ends_with(&format!("/{norm_path}"))
                        || (!parent_dir.is_empty() && norm == parent_dir)
                })
            })
            .map(|(k, _)| k.clone())
            .collect();

        for key in &stale {
            self.entries.pop(key);
        }
        self.stats.invalidations += stale.len() as u64;
        self.stats.size = self.entries.len();
        stale.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats.size = 0;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            ..self.stats
        }
    }
}

impl Default for ToolResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

fn normalize_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .iter()
                .map(|(k, v)| format!("{k:?}:{}", normalize_json(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        Value::Array(items) => {
            let body = items.iter().map(normalize_json).collect::<Vec<_>>().join(",");
            format!("[{body}]")
        }
        other => other.to_string(),
    }
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_matches('/').to_string()
}

fn parent_of(norm_path: &str) -> String {
    match norm_path.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

/// Extract the path(s) a tool result is "about", for invalidation purposes:
/// `path`/`file` fields for single-path results, `matches[].path` for
/// listing/search results.
fn extract_paths(result: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    if let Some(p) = result.get("path").and_then(Value::as_str) {
        paths.push(p.to_string());
    }
    if let Some(p) = result.get("file").and_then(Value::as_str) {
        paths.push(p.to_string());
    }
    if let Some(matches) = result.get("matches").and_then(Value::as_array) {
        for m in matches {
            if let Some(p) = m.as_str() {
                paths.push(p.to_string());
            } else if let Some(p) = m.get("path").and_then(Value::as_str) {
                paths.push(p.to_string());
            }
        }
    }
    paths
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}
