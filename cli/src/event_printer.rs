//! Prints `agentcore::events::Event`s to stdout, text or JSON-lines
//! (`--format`). Grounded on the teacher's `event_processor`/
//! `event_processor_with_json_output` split in `exec/src/`: one
//! `EventSubscriber` impl per format, selected once at startup rather than
//! branching per event.

use agentcore::events::Event;
use agentcore::events::EventKind;
use agentcore::events::EventSubscriber;

use crate::cli::OutputFormat;

pub struct ConsoleEventPrinter {
    json: bool,
}

impl ConsoleEventPrinter {
    pub fn new(format: OutputFormat) -> Self {
        Self { json: matches!(format, OutputFormat::Json) }
    }
}

impl EventSubscriber for ConsoleEventPrinter {
    fn on_event(&self, event: &Event) {
        if self.json {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{line}");
            }
            return;
        }
        print_text(event);
    }
}

fn print_text(event: &Event) {
    match event.kind {
        EventKind::State => {
            let state = event.data.get("state").and_then(|v| v.as_str()).unwrap_or("?");
            println!("-- {state} --");
        }
        EventKind::UserMessage => {
            let text = event.data.get("text").and_then(|v| v.as_str()).unwrap_or("");
            println!("> {text}");
        }
        EventKind::LlmRequest => {
            let n = event.data.get("messages").and_then(|v| v.as_u64()).unwrap_or(0);
            println!("… calling model ({n} messages in context)");
        }
        EventKind::LlmResponse => {
            if let Some(err) = event.data.get("error").and_then(|v| v.as_str()) {
                println!("model error: {err}");
            }
        }
        EventKind::ToolCallParsed => {
            let tool = event.data.get("tool").and_then(|v| v.as_str()).unwrap_or("?");
            let args = event.data.get("args").cloned().unwrap_or_default();
            println!("tool_call: {tool} {args}");
        }
        EventKind::ToolResult => {
            let ok = event.data.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
            if ok {
                println!("tool_result: ok");
            } else {
                let code = event.data.get("error").and_then(|e| e.get("code")).and_then(|v| v.as_str()).unwrap_or("E_TOOL");
                let message = event.data.get("error").and_then(|e| e.get("message")).and_then(|v| v.as_str()).unwrap_or("");
                println!("tool_result: {code}: {message}");
            }
        }
        EventKind::ConfirmWrite | EventKind::ConfirmExec => {
            let tool = event.data.get("tool").and_then(|v| v.as_str()).unwrap_or("?");
            let approved = event.data.get("approved").and_then(|v| v.as_bool()).unwrap_or(false);
            println!("confirm {tool}: {}", if approved { "approved" } else { "declined" });
        }
        EventKind::PolicyDenyCmd => {
            let tool = event.data.get("tool").and_then(|v| v.as_str()).unwrap_or("?");
            let reason = event.data.get("reason").and_then(|v| v.as_str()).unwrap_or("");
            println!("policy denied {tool}: {reason}");
        }
        EventKind::DeniedByUser => {
            let tool = event.data.get("tool").and_then(|v| v.as_str()).unwrap_or("?");
            println!("denied by user: {tool}");
        }
        EventKind::StutteringDetected => {
            println!("(response looked stuck in a loop, truncated)");
        }
        EventKind::PlanGenerated => {
            let title = event.data.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let steps = event.data.get("steps").and_then(|v| v.as_u64()).unwrap_or(0);
            println!("plan: {title} ({steps} steps)");
        }
        EventKind::ReplanGenerated => {
            let title = event.data.get("title").and_then(|v| v.as_str()).unwrap_or("");
            println!("replan: {title}");
        }
        EventKind::PlanStepStart => {
            let step = event.data.get("step").and_then(|v| v.as_str()).unwrap_or("");
            println!("step start: {step}");
        }
        EventKind::PlanStepDone => {
            let step = event.data.get("step").and_then(|v| v.as_str()).unwrap_or("");
            println!("step done: {step}");
        }
        EventKind::PlanStepBlocked => {
            let step = event.data.get("step").and_then(|v| v.as_str()).unwrap_or("");
            println!("step blocked: {step}");
        }
        EventKind::FinalVerify => {
            println!("verifying final state…");
        }
        EventKind::StopReason => {
            let reason = event.data.get("reason").and_then(|v| v.as_str()).unwrap_or("?");
            println!("stopped: {reason}");
        }
        EventKind::Display => {
            let content = event.data.get("content").and_then(|v| v.as_str()).unwrap_or("");
            println!("{content}");
        }
    }
}
