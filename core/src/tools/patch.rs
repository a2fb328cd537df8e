//! `apply_patch` and `undo_patch` (spec §4.A, delegating to §4.B). Thin
//! adapters over [`agentcore_apply_patch::PatchEngine`] — all of the
//! exact/fuzzy matching and journal bookkeeping lives in that crate; this
//! module only resolves the workspace-relative path, maps
//! `agentcore_apply_patch::PatchError` onto `CoreError`, and invalidates the
//! cache on success (spec §4.B step 7).

use serde_json::Value;

use crate::error::Result;
use crate::policy::RiskLevel;
use crate::tools::ArgField;
use crate::tools::ArgKind;
use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolPayload;
use crate::tools::ToolSpec;
use crate::util::resolve_in_workspace;

pub struct ApplyPatchTool {
    spec: ToolSpec,
}

impl Default for ApplyPatchTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "apply_patch",
                category: "patch",
                args: &[
                    ArgField::required("path", ArgKind::String),
                    ArgField::required("old", ArgKind::String),
                    ArgField::required("new", ArgKind::String),
                    ArgField::optional("expected_replacements", ArgKind::Integer),
                    ArgField::optional("fuzzy", ArgKind::Boolean),
                    ArgField::optional("min_similarity", ArgKind::Integer),
                ],
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

impl Tool for ApplyPatchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let path = args["path"].as_str().unwrap_or_default();
        let old = args["old"].as_str().unwrap_or_default();
        let new = args["new"].as_str().unwrap_or_default();
        let expected_replacements = args.get("expected_replacements").and_then(Value::as_u64).map(|v| v as usize);
        let fuzzy = args.get("fuzzy").and_then(Value::as_bool).unwrap_or(false);
        // `min_similarity` is declared as an integer arg slot for schema
        // simplicity; callers pass it as a JSON number and we accept either
        // representation since `serde_json` floats satisfy `as_f64` too.
        let min_similarity = args.get("min_similarity").and_then(Value::as_f64);

        let resolved = resolve_in_workspace(ctx.workspace_root, std::path::Path::new(path))?;
        let report = ctx
            .patch_engine
            .apply_patch(&resolved, old, new, expected_replacements, fuzzy, min_similarity)?;
        ctx.invalidate_path(path);

        Ok(ToolPayload::ApplyPatch {
            undo_id: report.undo_id,
            used_fuzzy: report.used_fuzzy,
            similarity: report.similarity,
        })
    }
}

pub struct UndoPatchTool {
    spec: ToolSpec,
}

impl Default for UndoPatchTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "undo_patch",
                category: "patch",
                args: &[
                    ArgField::required("undo_id", ArgKind::String),
                    ArgField::optional("force", ArgKind::Boolean),
                ],
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

impl Tool for UndoPatchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let undo_id = args["undo_id"].as_str().unwrap_or_default();
        let force = args.get("force").and_then(Value::as_bool).unwrap_or(false);

        let record_path = ctx
            .patch_engine
            .journal()
            .find(undo_id)
            .map(|r| r.path.clone());

        let report = ctx.patch_engine.undo_patch(undo_id, force)?;
        if let Some(path) = record_path {
            ctx.invalidate_path(&path.display().to_string());
        }

        Ok(ToolPayload::UndoPatch {
            undo_id: report.undo_id,
            restored: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_apply_patch::PatchEngine;
    use crate::cache::ToolResultCache;
    use crate::error::CoreError;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn apply_then_undo_round_trips_through_the_tool_layer() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "foo\nbar\n").expect("write");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();

        let apply = ApplyPatchTool::default();
        let payload = apply
            .execute(
                &json!({"path": "a.txt", "old": "bar", "new": "baz", "expected_replacements": 1}),
                &mut ToolContext::new(dir.path(), &mut engine, &mut cache, 1024 * 1024),
            )
            .expect("apply");
        let undo_id = match payload {
            ToolPayload::ApplyPatch { undo_id, .. } => undo_id,
            _ => panic!("wrong payload"),
        };
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).expect("read"), "foo\nbaz\n");

        let undo = UndoPatchTool::default();
        undo.execute(
            &json!({"undo_id": undo_id}),
            &mut ToolContext::new(dir.path(), &mut engine, &mut cache, 1024 * 1024),
        )
        .expect("undo");
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).expect("read"), "foo\nbar\n");
    }

    #[test]
    fn expected_replacements_mismatch_surfaces_as_no_match() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "foo\nbar\n").expect("write");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let apply = ApplyPatchTool::default();
        let err = apply
            .execute(
                &json!({"path": "a.txt", "old": "bar", "new": "baz", "expected_replacements": 2}),
                &mut ToolContext::new(dir.path(), &mut engine, &mut cache, 1024 * 1024),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::NoMatch));
    }
}
