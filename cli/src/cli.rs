//! Argument schema for the thin `agentcore` binary: wires a `Session`,
//! drives one turn end-to-end, prints `Event`s as JSON lines. Grounded on
//! the teacher's `codex-exec` CLI (`exec/src/cli.rs`) — a headless,
//! non-interactive front end with no approval affordances — trimmed to the
//! fields this runtime's `Config` and `AgentLoop` actually take.

use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;

#[derive(Parser, Debug)]
#[command(version, about = "Run one agent turn against a workspace, non-interactively.")]
pub struct Cli {
    /// Initial user request. Reads from stdin when omitted or `-`.
    pub prompt: Option<String>,

    /// Workspace root the agent operates in. Defaults to the current directory.
    #[arg(long = "workspace", short = 'w', value_name = "DIR")]
    pub workspace_root: Option<PathBuf>,

    /// Model the agent should use, overriding `config.toml`.
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible chat-completions endpoint, overriding `config.toml`.
    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Bearer token sent with model requests, if the endpoint requires one.
    #[arg(long = "api-key", env = "AGENTCORE_API_KEY")]
    pub api_key: Option<String>,

    /// Project id state is namespaced under (`.agentcore/projects/<id>/`).
    #[arg(long = "project")]
    pub project_id: Option<String>,

    /// Answer every confirmation prompt automatically instead of asking on stdin.
    ///
    /// This CLI is intended to be headless; without `--yes` a write/exec
    /// confirmation blocks on a line of stdin the way a human would answer.
    #[arg(long = "yes", short = 'y', default_value_t = false)]
    pub auto_confirm: bool,

    /// Upper bound on model/tool iterations within the turn, overriding `config.toml`.
    #[arg(long = "max-iterations")]
    pub max_iterations: Option<u32>,

    /// Output format for emitted events.
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// One human-readable line per event.
    #[default]
    Text,
    /// One JSON-serialized event per line (spec: "prints `Event`s as JSON lines").
    Json,
}
