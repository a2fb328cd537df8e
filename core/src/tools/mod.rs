//! Tool registry and adapters (spec §4.A). Grounded on the teacher's
//! `openai_tools::OpenAiTool` registry shape (name + JSON-schema parameters)
//! generalized to the explicit `ToolSpec` the spec requires — one that
//! carries risk level, confirmation requirements, and a `cacheable` flag
//! directly rather than sniffing them from the tool's name.

pub mod display;
pub mod fs;
pub mod patch;
pub mod plugin;
pub mod search;
pub mod semantic;
pub mod shell;
pub mod symbol;
pub mod weather;

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::error::Result;
use crate::policy::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Integer,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone)]
pub struct ArgField {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

impl ArgField {
    pub const fn required(name: &'static str, kind: ArgKind) -> Self {
        Self { name, kind, required: true }
    }

    pub const fn optional(name: &'static str, kind: ArgKind) -> Self {
        Self { name, kind, required: false }
    }
}

/// `{name, category, argument schema, risk level, requires_confirm_write,
/// requires_confirm_exec, needs_network, needs_workspace, cacheable,
/// deprecated}` per spec §3.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub category: &'static str,
    pub args: &'static [ArgField],
    pub risk: RiskLevel,
    pub requires_confirm_write: bool,
    pub requires_confirm_exec: bool,
    pub needs_network: bool,
    pub needs_workspace: bool,
    pub cacheable: bool,
    pub deprecated: bool,
    /// When `false`, unknown argument fields are rejected with
    /// `E_INVALID_ARGS` (spec §4.A default); tools that intentionally
    /// accept an open bag of extra fields set this to `true`.
    pub open_args: bool,
}

impl ToolSpec {
    /// Validate `args` against this tool's schema: required fields present,
    /// declared type roughly matches, and (unless `open_args`) no unknown
    /// fields.
    pub fn validate_args(&self, args: &Value) -> Result<()> {
        let obj = args
            .as_object()
            .ok_or_else(|| CoreError::InvalidArgs("arguments must be a JSON object".to_string()))?;

        for field in self.args {
            match obj.get(field.name) {
                Some(value) => {
                    if !kind_matches(field.kind, value) {
                        return Err(CoreError::InvalidArgs(format!(
                            "field '{}' has the wrong type for tool '{}'",
                            field.name, self.name
                        )));
                    }
                }
                None if field.required => {
                    return Err(CoreError::InvalidArgs(format!(
                        "missing required field '{}' for tool '{}'",
                        field.name, self.name
                    )));
                }
                None => {}
            }
        }

        if !self.open_args {
            let known: Vec<&str> = self.args.iter().map(|f| f.name).collect();
            for key in obj.keys() {
                if !known.contains(&key.as_str()) {
                    return Err(CoreError::InvalidArgs(format!(
                        "unknown field '{key}' for tool '{}'",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn kind_matches(kind: ArgKind, value: &Value) -> bool {
    match kind {
        ArgKind::String => value.is_string(),
        ArgKind::Integer => value.is_i64() || value.is_u64(),
        ArgKind::Boolean => value.is_boolean(),
        ArgKind::Array => value.is_array(),
        ArgKind::Object => value.is_object(),
    }
}

/// `{ok, payload, error}` per spec §3. `payload` is a tagged variant per
/// tool rather than a loose string-keyed map (spec §9 open question,
/// resolved in favor of typed variants so callers pattern-match instead of
/// re-parsing JSON).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "tool", content = "payload", rename_all = "snake_case")]
pub enum ToolPayload {
    ListDir { entries: Vec<String> },
    ReadFile { text: String, read_size: usize, total_size: usize, offset: usize, limit: usize, truncated: bool },
    WriteFile { undo_id: String, bytes_written: usize },
    Grep { matches: Vec<GrepHit>, engine: &'static str, truncated: bool },
    GlobFileSearch { matches: Vec<String> },
    ApplyPatch { undo_id: String, used_fuzzy: bool, similarity: Option<f64> },
    UndoPatch { undo_id: String, restored: bool },
    RunCmd { stdout: String, stderr: String, exit_code: i32, truncated: bool },
    SearchSemantic { chunks: Vec<SemanticChunk> },
    Display { acknowledged: bool },
    Symbol { value: Value },
    Plugin { output: Value, exit_code: i32, duration_ms: u64 },
    Weather { value: Value },
}

#[derive(Debug, Clone, Serialize)]
pub struct GrepHit {
    pub path: String,
    pub line: u32,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticChunk {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub ok: bool,
    pub payload: Option<ToolPayload>,
    pub error: Option<ToolError>,
}

impl ToolResult {
    pub fn ok(payload: ToolPayload) -> Self {
        Self {
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(error: CoreError) -> Self {
        Self {
            ok: false,
            payload: None,
            error: Some(ToolError {
                code: error.code(),
                message: error.to_string(),
            }),
        }
    }

    /// Whether the result's `payload` names a path this result is "about",
    /// used by the cache for path-aware invalidation hand-off; JSON shape
    /// only (the cache stores results as [`serde_json::Value`]).
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub type ToolContext<'a> = crate::session::ToolExecContext<'a>;

/// One built-in or plugin-registered tool.
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;
    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload>;
}

/// `register(spec, impl)`, `get(name)`, `list(filters)` per spec §4.A.
pub struct ToolRegistry {
    tools: HashMap<&'static str, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry with nothing registered.
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.spec().name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn list(&self, category: Option<&str>) -> Vec<&ToolSpec> {
        self.tools
            .values()
            .map(|t| t.spec())
            .filter(|spec| category.is_none_or(|c| c == spec.category))
            .collect()
    }

    /// Validate and execute `name` with `args` against `ctx`, in one call
    /// (spec §4.A `validate_args` then `execute`). Callers that need to
    /// gate, cache, or emit events between validation and execution (the
    /// agent loop) drive those two steps separately instead.
    pub fn validate_args(&self, name: &str, args: &Value) -> Result<()> {
        let tool = self.get(name).ok_or_else(|| CoreError::NotFound(format!("unknown tool '{name}'")))?;
        tool.spec().validate_args(args)
    }

    pub fn execute(&self, name: &str, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let tool = self.get(name).ok_or_else(|| CoreError::NotFound(format!("unknown tool '{name}'")))?;
        tool.spec().validate_args(args)?;
        tool.execute(args, ctx)
    }

    /// The built-in tool set (spec §4.A "minimum set"), registered at
    /// `Session::new` time rather than from a process-global registry
    /// (spec §9).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::tools::fs::ListDirTool::default()));
        registry.register(Box::new(crate::tools::fs::ReadFileTool::default()));
        registry.register(Box::new(crate::tools::fs::WriteFileTool::default()));
        registry.register(Box::new(crate::tools::search::GrepTool::default()));
        registry.register(Box::new(crate::tools::search::GlobFileSearchTool::default()));
        registry.register(Box::new(crate::tools::patch::ApplyPatchTool::default()));
        registry.register(Box::new(crate::tools::patch::UndoPatchTool::default()));
        registry.register(Box::new(crate::tools::shell::RunCmdTool::default()));
        registry.register(Box::new(crate::tools::semantic::SearchSemanticTool::default()));
        registry.register(Box::new(crate::tools::symbol::SymbolTool::default()));
        registry.register(Box::new(crate::tools::plugin::PluginTool::default()));
        registry.register(Box::new(crate::tools::display::DisplayTool::default()));
        registry.register(Box::new(crate::tools::weather::WeatherTool::default()));
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_args_rejects_unknown_fields() {
        let spec = ToolSpec {
            name: "read_file",
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
        };
        let err = spec.validate_args(&json!({"path": "a.txt", "extra": 1})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgs(_)));
    }

    #[test]
    fn validate_args_rejects_missing_required_field() {
        let spec = ToolSpec {
            name: "read_file",
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
        };
        assert!(spec.validate_args(&json!({})).is_err());
    }
}
