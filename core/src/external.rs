//! Traits for the external collaborators named in spec §6: the vector
//! store and its embedder, the LSP-backed symbol server, the plugin host,
//! and the synchronous confirmation prompter. The core only *consumes*
//! these interfaces — the indexer, the LSP client implementation, and any
//! plugin sandboxing live out of process (spec §1/§5/§9 "decouple: the
//! indexer is an external collaborator with its own lifecycle").
//!
//! Every trait here is optional at the `Session` level: a session built
//! without a `VectorStore` degrades `search_semantic` to an explicit error
//! rather than panicking, and a session without a `SymbolServer` degrades
//! symbol tools the same way (spec §5: "their failures must NOT crash the
//! agent; the agent degrades to non-semantic search and bare-text symbol
//! handling").

use serde_json::Value;

use crate::error::Result;
use crate::tools::SemanticChunk;

/// `search(query_embedding, k) -> [{path, start_line, end_line, text, score}]`
/// per spec §6. Implemented out-of-process by the indexer; this trait is
/// the only surface the core depends on.
pub trait VectorStore: Send + Sync {
    fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SemanticChunk>>;
}

/// Turns a query string into an embedding vector. A real implementation
/// calls out to an embedding model; the core treats it as opaque.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// `definition`, `references`, `symbols`, `search_workspace` per spec §6.
/// Backed by an LSP client out of process; results are passed through as
/// opaque JSON since the core has no opinion on a particular language
/// server's symbol shape.
pub trait SymbolServer: Send + Sync {
    fn definition(&self, path: &str, line: u32, col: u32) -> Result<Value>;
    fn references(&self, path: &str, line: u32, col: u32) -> Result<Value>;
    fn symbols(&self, path: &str) -> Result<Value>;
    fn search_workspace(&self, query: &str) -> Result<Value>;
}

/// Result of invoking a declared plugin (spec §6: `{ok, output, error,
/// exit_code, duration_ms}`). Plugin loading and argument-schema validation
/// live in the host, not here.
#[derive(Debug, Clone)]
pub struct PluginOutcome {
    pub ok: bool,
    pub output: Value,
    pub error: Option<String>,
    pub exit_code: i32,
    pub duration_ms: u64,
}

pub trait PluginHost: Send + Sync {
    fn invoke(&self, plugin: &str, args: &Value) -> Result<PluginOutcome>;
}

/// `ask(message) -> yes|no` per spec §6. Synchronous because a human (or a
/// TUI event loop standing in for one) is expected to answer inline, not on
/// a background task.
pub trait ConfirmPrompter: Send + Sync {
    fn ask(&self, message: &str) -> bool;
}

/// A prompter that always answers the same way, for headless/non-interactive
/// sessions (e.g. `codex exec`-style CI usage) and for tests.
pub struct FixedConfirmPrompter(pub bool);

impl ConfirmPrompter for FixedConfirmPrompter {
    fn ask(&self, _message: &str) -> bool {
        self.0
    }
}
