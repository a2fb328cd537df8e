//! Central error type for the core crate, carrying the `E_*` codes named at
//! the spec boundary (spec §6/§7) so that adapters can translate freely
//! between a Rust `Result` and the `{ok, error: {code, message}}` wire shape
//! the model is fed back.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("path escapes workspace root: {0}")]
    PathEscape(String),

    #[error("no match found")]
    NoMatch,

    #[error("ambiguous match: {0}")]
    Ambiguous(String),

    #[error("content drifted since the patch was recorded")]
    Drift,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("denied: {0}")]
    Denied(String),

    #[error("denied by policy: {0}")]
    PolicyDenied(String),

    #[error("tool blocked: {0}")]
    ToolBlocked(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("no tool call could be parsed from the assistant message")]
    NoTool,

    #[error("tool execution failed: {0}")]
    Tool(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// The stable wire code fed back to the model, per spec §6.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidArgs(_) => "E_INVALID_ARGS",
            CoreError::NotFound(_) => "E_NOT_FOUND",
            CoreError::PathEscape(_) => "E_PATH_ESCAPE",
            CoreError::NoMatch => "E_NO_MATCH",
            CoreError::Ambiguous(_) => "E_AMBIGUOUS",
            CoreError::Drift => "E_DRIFT",
            CoreError::Io(_) => "E_IO",
            CoreError::Denied(_) => "E_DENIED",
            CoreError::PolicyDenied(_) => "E_POLICY_DENIED",
            CoreError::ToolBlocked(_) => "E_TOOL_BLOCKED",
            CoreError::Timeout(_) => "E_TIMEOUT",
            CoreError::NoTool => "E_NO_TOOL",
            CoreError::Tool(_) => "E_TOOL",
            CoreError::Network(_) => "E_NETWORK",
            CoreError::Config(_) => "E_TOOL",
            CoreError::Json(_) => "E_INVALID_ARGS",
        }
    }
}

impl From<agentcore_apply_patch::PatchError> for CoreError {
    fn from(e: agentcore_apply_patch::PatchError) -> Self {
        use agentcore_apply_patch::PatchError::*;
        match e {
            NotFound(p) => CoreError::NotFound(p.display().to_string()),
            NoMatch => CoreError::NoMatch,
            Ambiguous(msg) => CoreError::Ambiguous(msg),
            Drift => CoreError::Drift,
            Io(e) => CoreError::Io(e),
        }
    }
}
