//! `Session`: `{id, workspace root, conversation, plan?, tool registry,
//! patch journal, cache, policy, audit sink}` (spec §3). Grounded on the
//! teacher's `codex::Session` — a single long-lived struct a task owns
//! exclusively — generalized from Codex's approval/sandbox-policy fields to
//! this runtime's context manager, planner, and cache.

use std::path::Path;
use std::path::PathBuf;

use agentcore_apply_patch::PatchEngine;
use uuid::Uuid;

use crate::audit::AuditSink;
use crate::cache::ToolResultCache;
use crate::config::Config;
use crate::context::ContextManager;
use crate::external::Embedder;
use crate::external::PluginHost;
use crate::external::SymbolServer;
use crate::external::VectorStore;
use crate::planner::Plan;
use crate::planner::ReplanBudget;
use crate::policy::RiskLevel;
use crate::tools::ToolRegistry;

/// Threaded into every `Tool::execute` call — the slice of session state a
/// tool adapter is allowed to touch. Never the whole `Session`: tools must
/// not reach into the conversation or plan.
///
/// The external-collaborator fields are `Option` (spec §5: "their failures
/// must NOT crash the agent; the agent degrades ..."), set only when the
/// embedding session wired one in.
pub struct ToolExecContext<'a> {
    pub workspace_root: &'a Path,
    pub patch_engine: &'a mut PatchEngine,
    pub cache: &'a mut ToolResultCache,
    pub max_file_read_bytes: usize,
    pub max_output_bytes: usize,
    pub run_cmd_timeout: std::time::Duration,
    pub vector_store: Option<&'a dyn VectorStore>,
    pub embedder: Option<&'a dyn Embedder>,
    pub symbol_server: Option<&'a dyn SymbolServer>,
    pub plugin_host: Option<&'a dyn PluginHost>,
    pub weather_api_key: Option<&'a str>,
    pub weather_units: &'a str,
    pub weather_lang: &'a str,
}

impl<'a> ToolExecContext<'a> {
    pub fn new(
        workspace_root: &'a Path,
        patch_engine: &'a mut PatchEngine,
        cache: &'a mut ToolResultCache,
        max_file_read_bytes: usize,
    ) -> Self {
        Self {
            workspace_root,
            patch_engine,
            cache,
            max_file_read_bytes,
            max_output_bytes: 256 * 1024,
            run_cmd_timeout: std::time::Duration::from_secs(30),
            vector_store: None,
            embedder: None,
            symbol_server: None,
            plugin_host: None,
            weather_api_key: None,
            weather_units: "metric",
            weather_lang: "en",
        }
    }

    pub fn with_max_output_bytes(mut self, n: usize) -> Self {
        self.max_output_bytes = n;
        self
    }

    pub fn with_run_cmd_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.run_cmd_timeout = timeout;
        self
    }

    pub fn with_vector_store(mut self, store: Option<&'a dyn VectorStore>) -> Self {
        self.vector_store = store;
        self
    }

    pub fn with_embedder(mut self, embedder: Option<&'a dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_symbol_server(mut self, server: Option<&'a dyn SymbolServer>) -> Self {
        self.symbol_server = server;
        self
    }

    pub fn with_plugin_host(mut self, host: Option<&'a dyn PluginHost>) -> Self {
        self.plugin_host = host;
        self
    }

    pub fn with_weather(mut self, api_key: Option<&'a str>, units: &'a str, lang: &'a str) -> Self {
        self.weather_api_key = api_key;
        self.weather_units = units;
        self.weather_lang = lang;
        self
    }

    /// Invalidate cache entries touching `path`, after a write/patch (spec
    /// §4.B step 7).
    pub fn invalidate_path(&mut self, path: &str) -> usize {
        self.cache.invalidate_path(path)
    }
}

/// Risk threshold a session enforces in its `PolicyGate` unless overridden.
/// Exposed so `Session::policy_gate` and the agent loop share one default.
pub const DEFAULT_RISK_THRESHOLD: RiskLevel = RiskLevel::Critical;

/// Session-owned external collaborators (spec §6). Each is independently
/// optional: a session wired without them still runs, degrading the tools
/// that depend on them to an explicit error rather than a panic.
#[derive(Default)]
pub struct Collaborators {
    pub vector_store: Option<Box<dyn VectorStore>>,
    pub embedder: Option<Box<dyn Embedder>>,
    pub symbol_server: Option<Box<dyn SymbolServer>>,
    pub plugin_host: Option<Box<dyn PluginHost>>,
}

pub struct Session {
    pub id: String,
    pub workspace_root: PathBuf,
    pub config: Config,
    pub conversation: ContextManager,
    pub plan: Option<Plan>,
    pub replan_budget: ReplanBudget,
    pub registry: ToolRegistry,
    pub patch_engine: PatchEngine,
    pub cache: ToolResultCache,
    pub audit: AuditSink,
    pub collaborators: Collaborators,
}

impl Session {
    pub fn new(config: Config, registry: ToolRegistry, audit: AuditSink) -> Self {
        let reserved_output = config.llm.max_tokens.min(2048) as usize / 4;
        let context_budget = config.llm.max_tokens.max(1) as usize;
        Self {
            id: Uuid::new_v4().to_string(),
            workspace_root: config.workspace_root.clone(),
            conversation: ContextManager::new(context_budget, reserved_output),
            plan: None,
            replan_budget: ReplanBudget::new(config.limits.max_replans),
            registry,
            patch_engine: PatchEngine::new(),
            cache: ToolResultCache::default(),
            audit,
            collaborators: Collaborators::default(),
            config,
        }
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn tool_ctx(&mut self) -> ToolExecContext<'_> {
        ToolExecContext::new(
            &self.workspace_root,
            &mut self.patch_engine,
            &mut self.cache,
            self.config.limits.max_file_read_bytes as usize,
        )
        .with_max_output_bytes(self.config.limits.max_output_bytes as usize)
        .with_run_cmd_timeout(std::time::Duration::from_secs(self.config.limits.tool_timeout_s))
        .with_vector_store(self.collaborators.vector_store.as_deref())
        .with_embedder(self.collaborators.embedder.as_deref())
        .with_symbol_server(self.collaborators.symbol_server.as_deref())
        .with_plugin_host(self.collaborators.plugin_host.as_deref())
        .with_weather(
            self.config.weather.api_key.as_deref(),
            &self.config.weather.default_units,
            &self.config.weather.default_lang,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditSink;
    use tempfile::tempdir;

    #[tokio::test]
    async fn new_session_has_empty_plan_and_fresh_journal() {
        let dir = tempdir().expect("tempdir");
        let config = Config::for_workspace(dir.path());
        let audit = AuditSink::open(&dir.path().join("audit.jsonl")).await.expect("open");
        let session = Session::new(config, ToolRegistry::new(), audit);
        assert!(session.plan.is_none());
        assert_eq!(session.patch_engine.journal().len(), 0);
    }
}
