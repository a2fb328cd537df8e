//! `ConfirmPrompter` implementations for the thin binary. Grounded on the
//! teacher's distinction between an interactive TUI approval modal and
//! `codex exec`'s headless `AskForApproval::Never` — this binary offers the
//! same two modes as a single `--yes` flag rather than a policy enum.

use agentcore::external::ConfirmPrompter;
use std::io::BufRead;
use std::io::Write;

/// Reads a `y`/`n` answer from stdin, echoing the prompt to stderr so it
/// never interleaves with JSON-lines event output on stdout.
pub struct StdinConfirmPrompter;

impl ConfirmPrompter for StdinConfirmPrompter {
    fn ask(&self, message: &str) -> bool {
        eprint!("{message} [y/N] ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}
