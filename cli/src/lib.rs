//! Thin front end for `agentcore`: wires a `Session`, drives one turn
//! end-to-end, prints `Event`s as JSON lines. Grounded on the teacher's
//! `codex-exec` (`exec/src/lib.rs`): load config, construct the long-lived
//! collaborators once, submit one prompt, drain events until the turn
//! completes. Everything heavier — a REPL, a TUI, MCP transports — is out
//! of scope per spec §1 and lives outside this crate.

mod cli;
mod event_printer;
mod prompter;

use std::io::IsTerminal;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use agentcore::AgentLoop;
use agentcore::StopReason;
use agentcore::audit::AuditSink;
use agentcore::config::Config;
use agentcore::config::ConfigOverrides;
use agentcore::external::ConfirmPrompter;
use agentcore::external::FixedConfirmPrompter;
use agentcore::message::Message;
use agentcore::message::Priority;
use agentcore::model_client::ModelClient;
use agentcore::paths::ProjectPaths;
use agentcore::session::Session;
use agentcore::tools::ToolRegistry;
use tracing_subscriber::EnvFilter;

pub use cli::Cli;
pub use cli::OutputFormat;
use event_printer::ConsoleEventPrinter;
use prompter::StdinConfirmPrompter;

/// System prompt seeded as the conversation's protected first message
/// (spec §3 invariant: "first message is always of role system"). Names
/// the tool-call grammar the agent loop parses (spec §9) so the model has
/// an explicit contract to target rather than guessing at one.
const SYSTEM_PROMPT: &str = "\
You are a local coding agent with access to a bounded set of tools: \
list_dir, read_file, write_file, grep, glob_file_search, apply_patch, \
undo_patch, run_cmd, search_semantic, display. To call a tool, respond with \
exactly one JSON object of the form {\"tool\": \"<name>\", \"args\": {...}} \
and nothing else. When you are done, respond with plain text and no JSON \
object — that text is treated as your final answer.";

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    init_logging();

    let workspace_root = match &cli.workspace_root {
        Some(p) => p.clone(),
        None => std::env::current_dir()?,
    };

    let prompt = read_prompt(cli.prompt.clone())?;

    let overrides = ConfigOverrides {
        workspace_root: Some(workspace_root.clone()),
        project_id: cli.project_id.clone(),
        model: cli.model.clone(),
        base_url: cli.base_url.clone(),
    };
    let mut config = Config::load(&workspace_root, overrides)?;
    if let Some(n) = cli.max_iterations {
        config.limits.max_iterations = n;
    }

    let paths = ProjectPaths::new(&config.workspace_root, &config.project_id);
    paths.ensure_dirs()?;
    let audit = AuditSink::open(&paths.audit_log()).await?;

    let mut session = Session::new(config, ToolRegistry::with_builtins(), audit);
    session.conversation.add(Message::system(SYSTEM_PROMPT), Priority::Protected);

    let model = ModelClient::new(
        session.config.llm.base_url.clone(),
        cli.api_key.clone(),
        Duration::from_secs(session.config.llm.timeout_s.max(1)),
    )?;

    let subscriber = ConsoleEventPrinter::new(cli.format);
    let prompter: Box<dyn ConfirmPrompter> =
        if cli.auto_confirm { Box::new(FixedConfirmPrompter(true)) } else { Box::new(StdinConfirmPrompter) };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut agent = AgentLoop::new(&mut session, &model, &subscriber, prompter.as_ref()).with_cancel(cancel);
    let outcome = agent.run_turn(&prompt).await;

    if let Some(message) = &outcome.final_message {
        println!("{message}");
    }

    match outcome.stop_reason {
        StopReason::FatalError(e) => {
            eprintln!("agent turn ended with a fatal error: {e}");
            std::process::exit(1);
        }
        StopReason::MaxIterations | StopReason::PolicyDenied | StopReason::UserCancel | StopReason::FinalAnswer => Ok(()),
    }
}

fn init_logging() {
    let default_level = "error";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level)).unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Resolve the initial prompt: a positional argument (unless it is `-`),
/// otherwise stdin (spec's `codex-exec` grounding: reading from a pipe is
/// the headless front end's only other input channel).
fn read_prompt(arg: Option<String>) -> anyhow::Result<String> {
    match arg {
        Some(p) if p != "-" => Ok(p),
        maybe_dash => {
            let force_stdin = maybe_dash.as_deref() == Some("-");
            if std::io::stdin().is_terminal() && !force_stdin {
                anyhow::bail!("no prompt provided; pass one as an argument or pipe it into stdin");
            }
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                anyhow::bail!("no prompt provided via stdin");
            }
            Ok(buffer)
        }
    }
}
