//! `run_cmd` (spec §4.A): policy-gated shell execution with bounded output
//! capture, timeout, and exit code. Grounded on the teacher's
//! `exec::process_exec_tool_call` for the capture-while-draining shape
//! (`MAX_STREAM_OUTPUT`-style ceilings) and `shell::Shell` for resolving the
//! command a user's default shell would actually run it through — trimmed
//! of Codex's macOS seatbelt / Linux seccomp sandboxing, which has no
//! counterpart in this spec: containment here is the policy gate (§4.F)
//! plus the workspace-path boundary, not an OS sandbox.

use std::io::Read;
use std::process::Command;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use std::time::Instant;

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

pub struct RunCmdTool {
    spec: ToolSpec,
}

impl Default for RunCmdTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "run_cmd",
                category: "shell",
                args: &[ArgField::required("command", ArgKind::String), ArgField::optional("cwd", ArgKind::String)],
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

impl Tool for RunCmdTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let command = args["command"].as_str().unwrap_or_default();
        if command.trim().is_empty() {
            return Err(CoreError::InvalidArgs("command must be non-empty".to_string()));
        }
        let cwd = match args.get("cwd").and_then(Value::as_str) {
            Some(cwd) => resolve_in_workspace(ctx.workspace_root, std::path::Path::new(cwd))?,
            None => ctx.workspace_root.to_path_buf(),
        };

        let argv = shlex::split(command).ok_or_else(|| CoreError::InvalidArgs("command failed to lex".to_string()))?;
        if argv.is_empty() {
            return Err(CoreError::InvalidArgs("command must be non-empty".to_string()));
        }

        run_with_timeout(&argv, &cwd, ctx.max_output_bytes, ctx.run_cmd_timeout)
    }
}

fn run_with_timeout(argv: &[String], cwd: &std::path::Path, max_output_bytes: usize, timeout: Duration) -> Result<ToolPayload> {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    cmd.current_dir(cwd);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(CoreError::Io)?;

    let stdout_pipe = child.stdout.take().expect("piped stdout");
    let stderr_pipe = child.stderr.take().expect("piped stderr");
    let stdout_buf = drain_capped(stdout_pipe, max_output_bytes);
    let stderr_buf = drain_capped(stderr_pipe, max_output_bytes);

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().map_err(CoreError::Io)? {
            break Some(status);
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(Duration::from_millis(15));
    };

    let (stdout, stdout_truncated) = stdout_buf.join().unwrap_or_default();
    let (stderr, stderr_truncated) = stderr_buf.join().unwrap_or_default();

    let Some(status) = status else {
        return Err(CoreError::Timeout(timeout));
    };

    Ok(ToolPayload::RunCmd {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        truncated: stdout_truncated || stderr_truncated,
    })
}

/// Spawn a reader thread that fills up to `cap` bytes from `pipe`, then
/// keeps draining (and discarding) the rest so a chatty child never blocks
/// on a full OS pipe buffer while we're busy polling for exit.
fn drain_capped<R: Read + Send + 'static>(mut pipe: R, cap: usize) -> thread::JoinHandle<(Vec<u8>, bool)> {
    let captured = Arc::new(Mutex::new((Vec::new(), false)));
    let captured_thread = Arc::clone(&captured);
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    let mut guard = captured_thread.lock().unwrap_or_else(|e| e.into_inner());
                    if guard.0.len() < cap {
                        let remaining = cap - guard.0.len();
                        guard.0.extend_from_slice(&chunk[..n.min(remaining)]);
                    }
                    if guard.0.len() >= cap || n > cap.saturating_sub(guard.0.len()) {
                        guard.1 = true;
                    }
                }
                Err(_) => break,
            }
        }
        let guard = captured.lock().unwrap_or_else(|e| e.into_inner());
        (guard.0.clone(), guard.1)
    })
}
