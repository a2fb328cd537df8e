//! Filesystem tools: `list_dir`, `read_file`, `write_file` (spec §4.A).
//! Workspace-scoped — every path argument is resolved through
//! [`crate::util::resolve_in_workspace`] before any I/O happens.

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
use crate::util::resolve_in_workspace;

pub struct ListDirTool {
    spec: ToolSpec,
}

impl Default for ListDirTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "list_dir",
                category: "fs",
                args: &[ArgField::required("path", ArgKind::String)],
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

impl Tool for ListDirTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let path = args["path"].as_str().unwrap_or_default();
        let resolved = resolve_in_workspace(ctx.workspace_root, std::path::Path::new(path))?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&resolved)? {
            let entry = entry?;
            entries.push(entry.file_name().to_string_lossy().into_owned());
        }
        entries.sort();
        Ok(ToolPayload::ListDir { entries })
    }
}

pub struct ReadFileTool {
    spec: ToolSpec,
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "read_file",
                category: "fs",
                args: &[
                    ArgField::required("path", ArgKind::String),
                    ArgField::optional("offset", ArgKind::Integer),
                    ArgField::optional("limit", ArgKind::Integer),
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

impl Tool for ReadFileTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let path = args["path"].as_str().unwrap_or_default();
        if path.is_empty() {
            return Err(CoreError::InvalidArgs("path must be non-empty".to_string()));
        }
        let resolved = resolve_in_workspace(ctx.workspace_root, std::path::Path::new(path))?;
        let bytes = std::fs::read(&resolved)?;
        let total_size = bytes.len();

        let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(ctx.max_file_read_bytes)
            .min(ctx.max_file_read_bytes);

        let start = offset.min(total_size);
        let end = (start + limit).min(total_size);
        let slice = &bytes[start..end];
        let truncated = end < total_size;
        let text = String::from_utf8_lossy(slice).into_owned();

        Ok(ToolPayload::ReadFile {
            read_size: slice.len(),
            total_size,
            offset: start,
            limit,
            truncated,
            text,
        })
    }
}

pub struct WriteFileTool {
    spec: ToolSpec,
}

impl Default for WriteFileTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "write_file",
                category: "fs",
                args: &[ArgField::required("path", ArgKind::String), ArgField::required("text", ArgKind::String)],
                risk: RiskLevel::Medium,
                requires_confirm_write: true,
                requires_confirm_exec: false,
                needs_network: false,
                needs_workspace: true,
                cacheable: false,
                deprecated: false,
                open_args: false,
            },
        }
    }
}

impl Tool for WriteFileTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let path = args["path"].as_str().unwrap_or_default();
        let text = args["text"].as_str().unwrap_or_default();
        let resolved = resolve_in_workspace(ctx.workspace_root, std::path::Path::new(path))?;
        let report = ctx.patch_engine.write_file(&resolved, text)?;
        ctx.invalidate_path(path);
        Ok(ToolPayload::WriteFile {
            undo_id: report.undo_id,
            bytes_written: text.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_apply_patch::PatchEngine;
    use crate::cache::ToolResultCache;
    use serde_json::json;
    use tempfile::tempdir;

    fn ctx<'a>(root: &'a std::path::Path, engine: &'a mut PatchEngine, cache: &'a mut ToolResultCache) -> ToolContext<'a> {
        ToolContext::new(root, engine, cache, 1024 * 1024)
    }

    #[test]
    fn read_file_respects_offset_and_limit() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "0123456789").expect("write");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let tool = ReadFileTool::default();
        let payload = tool
            .execute(&json!({"path": "a.txt", "offset": 2, "limit": 3}), &mut ctx(dir.path(), &mut engine, &mut cache))
            .expect("read");
        match payload {
            ToolPayload::ReadFile { text, truncated, .. } => {
                assert_eq!(text, "234");
                assert!(truncated);
            }
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn list_dir_rejects_path_escape() {
        let dir = tempdir().expect("tempdir");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let tool = ListDirTool::default();
        let err = tool
            .execute(&json!({"path": "../"}), &mut ctx(dir.path(), &mut engine, &mut cache))
            .unwrap_err();
        assert!(matches!(err, CoreError::PathEscape(_)));
    }
}
