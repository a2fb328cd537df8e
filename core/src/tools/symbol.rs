//! Optional LSP-backed symbol tool (spec §4.A, §6): `definition`,
//! `references`, `symbols`, `search_workspace`, dispatched through one tool
//! named by an `action` argument rather than four separate registrations,
//! since they share an argument shape and a single external collaborator.
//! The LSP client implementation lives out of process (spec §1); failures
//! here degrade to an explicit error rather than crashing the agent (spec
//! §5).

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

pub struct SymbolTool {
    spec: ToolSpec,
}

impl Default for SymbolTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "symbol",
                category: "lsp",
                args: &[
                    ArgField::required("action", ArgKind::String),
                    ArgField::optional("path", ArgKind::String),
                    ArgField::optional("line", ArgKind::Integer),
                    ArgField::optional("col", ArgKind::Integer),
                    ArgField::optional("query", ArgKind::String),
                ],
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

impl Tool for SymbolTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let server = ctx
            .symbol_server
            .ok_or_else(|| CoreError::NotFound("no symbol server collaborator configured".to_string()))?;
        let action = args["action"].as_str().unwrap_or_default();

        let value = match action {
            "definition" | "references" => {
                let path = args.get("path").and_then(Value::as_str).ok_or_else(missing_path)?;
                let line = args.get("line").and_then(Value::as_u64).unwrap_or(0) as u32;
                let col = args.get("col").and_then(Value::as_u64).unwrap_or(0) as u32;
                if action == "definition" {
                    server.definition(path, line, col)?
                } else {
                    server.references(path, line, col)?
                }
            }
            "symbols" => {
                let path = args.get("path").and_then(Value::as_str).ok_or_else(missing_path)?;
                server.symbols(path)?
            }
            "search_workspace" => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
                server.search_workspace(query)?
            }
            other => {
                return Err(CoreError::InvalidArgs(format!(
                    "unknown symbol action '{other}' (expected definition, references, symbols, or search_workspace)"
                )));
            }
        };

        Ok(ToolPayload::Symbol { value })
    }
}

fn missing_path() -> CoreError {
    CoreError::InvalidArgs("path is required for this symbol action".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_apply_patch::PatchEngine;
    use crate::cache::ToolResultCache;
    use crate::external::SymbolServer;
    use serde_json::json;
    use tempfile::tempdir;

    struct StubSymbolServer;
    impl SymbolServer for StubSymbolServer {
        fn definition(&self, path: &str, line: u32, _col: u32) -> Result<Value> {
            Ok(json!({"path": path, "line": line}))
        }
        fn references(&self, _path: &str, _line: u32, _col: u32) -> Result<Value> {
            Ok(json!([]))
        }
        fn symbols(&self, path: &str) -> Result<Value> {
            Ok(json!({"path": path, "symbols": []}))
        }
        fn search_workspace(&self, query: &str) -> Result<Value> {
            Ok(json!({"query": query, "results": []}))
        }
    }

    #[test]
    fn dispatches_definition_to_the_symbol_server() {
        let dir = tempdir().expect("tempdir");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let server = StubSymbolServer;
        let mut ctx = ToolContext::new(dir.path(), &mut engine, &mut cache, 1024).with_symbol_server(Some(&server));
        let tool = SymbolTool::default();
        let payload = tool
            .execute(&json!({"action": "definition", "path": "src/main.rs", "line": 3, "col": 1}), &mut ctx)
            .expect("definition");
        match payload {
            ToolPayload::Symbol { value } => assert_eq!(value["path"], "src/main.rs"),
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn unknown_action_is_invalid_args() {
        let dir = tempdir().expect("tempdir");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let server = StubSymbolServer;
        let mut ctx = ToolContext::new(dir.path(), &mut engine, &mut cache, 1024).with_symbol_server(Some(&server));
        let tool = SymbolTool::default();
        let err = tool.execute(&json!({"action": "bogus"}), &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgs(_)));
    }
}
