//! `display` (spec §4.A): lets the model push a message straight to the
//! user without it being a final answer. The tool itself is a no-op beyond
//! argument validation — it stays stateless (spec §3 "tool adapters are
//! stateless") — the agent loop is the one holding the event subscriber,
//! so it is the loop, not this tool, that turns a successful `display`
//! call into an `EventKind::Display` event (spec §4.H event list).

use serde_json::Value;

use crate::error::Result;
use crate::policy::RiskLevel;
use crate::tools::ArgField;
use crate::tools::ArgKind;
use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolPayload;
use crate::tools::ToolSpec;

pub struct DisplayTool {
    spec: ToolSpec,
}

impl Default for DisplayTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "display",
                category: "ui",
                args: &[
                    ArgField::required("content", ArgKind::String),
                    ArgField::required("level", ArgKind::String),
                    ArgField::optional("title", ArgKind::String),
                ],
                risk: RiskLevel::Safe,
                requires_confirm_write: false,
                requires_confirm_exec: false,
                needs_network: false,
                needs_workspace: false,
                cacheable: false,
                deprecated: false,
                open_args: false,
            },
        }
    }
}

impl Tool for DisplayTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, _args: &Value, _ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        Ok(ToolPayload::Display { acknowledged: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_apply_patch::PatchEngine;
    use crate::cache::ToolResultCache;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn always_acknowledges() {
        let dir = tempdir().expect("tempdir");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let tool = DisplayTool::default();
        let mut ctx = ToolContext::new(dir.path(), &mut engine, &mut cache, 1024);
        let payload = tool
            .execute(&json!({"content": "done", "level": "info"}), &mut ctx)
            .expect("display");
        assert!(matches!(payload, ToolPayload::Display { acknowledged: true }));
    }
}
