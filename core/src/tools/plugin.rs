//! `plugin` (spec §4.A, §6): invokes a declared out-of-process plugin and
//! reports back `{ok, output, error, exit_code, duration_ms}`. The core only
//! consumes the [`crate::external::PluginHost`] interface — discovery,
//! manifests, and the actual subprocess/IPC mechanics are the host's
//! problem, not this crate's (spec §6: "The core only consumes this
//! interface").

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

pub struct PluginTool {
    spec: ToolSpec,
}

impl Default for PluginTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "plugin",
                category: "plugin",
                args: &[ArgField::required("plugin", ArgKind::String), ArgField::optional("args", ArgKind::Object)],
                risk: RiskLevel::Medium,
                requires_confirm_write: false,
                requires_confirm_exec: true,
                needs_network: false,
                needs_workspace: true,
                cacheable: false,
                deprecated: false,
                open_args: false,
            },
        }
    }
}

impl Tool for PluginTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let plugin = args["plugin"].as_str().unwrap_or_default();
        if plugin.is_empty() {
            return Err(CoreError::InvalidArgs("plugin must be non-empty".to_string()));
        }
        let plugin_args = args.get("args").cloned().unwrap_or(Value::Object(Default::default()));

        let host = ctx
            .plugin_host
            .ok_or_else(|| CoreError::NotFound("no plugin host collaborator configured".to_string()))?;

        let outcome = host.invoke(plugin, &plugin_args)?;
        if !outcome.ok {
            return Err(CoreError::Tool(outcome.error.unwrap_or_else(|| format!("plugin '{plugin}' failed"))));
        }

        Ok(ToolPayload::Plugin {
            output: outcome.output,
            exit_code: outcome.exit_code,
            duration_ms: outcome.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_apply_patch::PatchEngine;
    use crate::cache::ToolResultCache;
    use crate::external::PluginHost;
    use crate::external::PluginOutcome;
    use serde_json::json;
    use tempfile::tempdir;

    struct StubPluginHost {
        ok: bool,
    }

    impl PluginHost for StubPluginHost {
        fn invoke(&self, plugin: &str, _args: &Value) -> Result<PluginOutcome> {
            Ok(PluginOutcome {
                ok: self.ok,
                output: json!({"plugin": plugin}),
                error: if self.ok { None } else { Some("boom".to_string()) },
                exit_code: if self.ok { 0 } else { 1 },
                duration_ms: 5,
            })
        }
    }

    #[test]
    fn returns_plugin_output_on_success() {
        let dir = tempdir().expect("tempdir");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let host = StubPluginHost { ok: true };
        let mut ctx = ToolContext::new(dir.path(), &mut engine, &mut cache, 1024).with_plugin_host(Some(&host));
        let tool = PluginTool::default();
        let payload = tool.execute(&json!({"plugin": "linter"}), &mut ctx).expect("invoke");
        match payload {
            ToolPayload::Plugin { output, exit_code, .. } => {
                assert_eq!(output["plugin"], "linter");
                assert_eq!(exit_code, 0);
            }
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn plugin_failure_surfaces_as_tool_error() {
        let dir = tempdir().expect("tempdir");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let host = StubPluginHost { ok: false };
        let mut ctx = ToolContext::new(dir.path(), &mut engine, &mut cache, 1024).with_plugin_host(Some(&host));
        let tool = PluginTool::default();
        let err = tool.execute(&json!({"plugin": "linter"}), &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::Tool(_)));
    }

    #[test]
    fn degrades_to_not_found_without_a_plugin_host() {
        let dir = tempdir().expect("tempdir");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let mut ctx = ToolContext::new(dir.path(), &mut engine, &mut cache, 1024);
        let tool = PluginTool::default();
        let err = tool.execute(&json!({"plugin": "linter"}), &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
