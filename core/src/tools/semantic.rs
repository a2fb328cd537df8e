//! `search_semantic` (spec §4.A, §6): asks the external vector store for
//! top-k code chunks matching an embedded query. Grounded on the spec's
//! description of the external `VectorStore`/embedder contract; the
//! indexer and embedding model both run out of process (spec §1), so this
//! adapter is a thin translation from `query: String` to
//! `vector_store.search(embedder.embed(query), k)`.

use serde_json::Value;

use crate::error::CoreError;
use crate::error::Result;
use crate::policy::RiskLevel;
use crate::tools::ArgField;
use crate::tools::ArgKind;
use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolPayload;
use crate::tools::ToolSpec;

const DEFAULT_K: usize = 8;

pub struct SearchSemanticTool {
    spec: ToolSpec,
}

impl Default for SearchSemanticTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "search_semantic",
                category: "search",
                args: &[ArgField::required("query", ArgKind::String), ArgField::optional("k", ArgKind::Integer)],
                risk: RiskLevel::Safe,
                requires_confirm_write: false,
                requires_confirm_exec: false,
                needs_network: false,
                needs_workspace: true,
                cacheable: true,
                deprecated: false,
                open_args: false,
            },
        }
    }
}

impl Tool for SearchSemanticTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let query = args["query"].as_str().unwrap_or_default();
        if query.is_empty() {
            return Err(CoreError::InvalidArgs("query must be non-empty".to_string()));
        }
        let k = args.get("k").and_then(Value::as_u64).map(|v| v as usize).unwrap_or(DEFAULT_K);

        let embedder = ctx
            .embedder
            .ok_or_else(|| CoreError::NotFound("no embedder collaborator configured".to_string()))?;
        let store = ctx
            .vector_store
            .ok_or_else(|| CoreError::NotFound("no vector store collaborator configured".to_string()))?;

        let embedding = embedder.embed(query)?;
        let chunks = store.search(&embedding, k)?;
        Ok(ToolPayload::SearchSemantic { chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_apply_patch::PatchEngine;
    use crate::cache::ToolResultCache;
    use crate::external::Embedder;
    use crate::external::VectorStore;
    use crate::tools::SemanticChunk;
    use serde_json::json;
    use tempfile::tempdir;

    struct StubEmbedder;
    impl Embedder for StubEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1, 0.2])
        }
    }

    struct StubStore;
    impl VectorStore for StubStore {
        fn search(&self, _query_embedding: &[f32], k: usize) -> Result<Vec<SemanticChunk>> {
            Ok((0..k.min(2))
                .map(|i| SemanticChunk {
                    path: format!("src/mod_{i}.rs"),
                    start_line: 1,
                    end_line: 10,
                    text: "fn example() {}".to_string(),
                    score: 0.9 - i as f32 * 0.1,
                })
                .collect())
        }
    }

    #[test]
    fn returns_chunks_when_collaborators_are_wired() {
        let dir = tempdir().expect("tempdir");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let embedder = StubEmbedder;
        let store = StubStore;
        let mut ctx = ToolContext::new(dir.path(), &mut engine, &mut cache, 1024)
            .with_embedder(Some(&embedder))
            .with_vector_store(Some(&store));
        let tool = SearchSemanticTool::default();
        let payload = tool.execute(&json!({"query": "TokenBudget", "k": 2}), &mut ctx).expect("search");
        match payload {
            ToolPayload::SearchSemantic { chunks } => assert_eq!(chunks.len(), 2),
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn degrades_to_not_found_without_collaborators() {
        let dir = tempdir().expect("tempdir");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let mut ctx = ToolContext::new(dir.path(), &mut engine, &mut cache, 1024);
        let tool = SearchSemanticTool::default();
        let err = tool.execute(&json!({"query": "x"}), &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
