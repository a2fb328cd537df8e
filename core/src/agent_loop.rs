//! Agent orchestration loop (spec §4.H): the planner/executor state machine
//! that alternates between model calls and tool calls, parses tool-call
//! messages from free-form text, enforces iteration and token budgets, and
//! terminates on success, policy denial, or stall.
//!
//! Grounded on the teacher's `codex::run_task` (the long-lived task that
//! drains a submission queue, calls the model, and dispatches tool/function
//! calls) generalized to the explicit state machine spec §4.H names, with
//! the tool-call grammar spec §9 calls out as a design note — "define an
//! explicit tool-call grammar ... the three-way fallback must be preserved
//! for robustness against model drift" — implemented here as three
//! independent extraction strategies reconciled into one candidate.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use serde_json::Value;
use serde_json::json;

use crate::error::CoreError;
use crate::error::Result;
use crate::events::Event;
use crate::events::EventKind;
use crate::events::EventSubscriber;
use crate::external::ConfirmPrompter;
use crate::message::Message;
use crate::message::Priority;
use crate::model_client::ChatParams;
use crate::model_client::ModelClient;
use crate::planner::DEFAULT_MAX_PARSE_RETRIES;
use crate::planner::Plan;
use crate::planner::StepStatus;
use crate::policy::Decision;
use crate::policy::PolicyGate;
use crate::session::Session;
use crate::tools::ToolPayload;
use crate::tools::ToolResult;
use crate::util::new_trace_id;

/// Default hard stop on iterations within a turn (spec §4.H step 7).
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

/// Minimum run length of a single repeated character before a response is
/// considered a stutter/runaway (spec §4.H "stutter/runaway detection").
pub const STUTTER_THRESHOLD: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Intake,
    ContextBuilding,
    Planning,
    Executing,
    Verifying,
    Summarizing,
    Done,
}

impl AgentState {
    fn as_str(self) -> &'static str {
        match self {
            AgentState::Idle => "IDLE",
            AgentState::Intake => "INTAKE",
            AgentState::ContextBuilding => "CONTEXT_BUILDING",
            AgentState::Planning => "PLANNING",
            AgentState::Executing => "EXECUTING",
            AgentState::Verifying => "VERIFYING",
            AgentState::Summarizing => "SUMMARIZING",
            AgentState::Done => "DONE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    FinalAnswer,
    MaxIterations,
    PolicyDenied,
    UserCancel,
    FatalError(String),
}

impl StopReason {
    pub fn reason_code(&self) -> &'static str {
        match self {
            StopReason::FinalAnswer => "final_answer",
            StopReason::MaxIterations => "max_tool_calls_reached",
            StopReason::PolicyDenied => "policy_denied",
            StopReason::UserCancel => "user_cancel",
            StopReason::FatalError(_) => "fatal_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub final_message: Option<String>,
    pub stop_reason: StopReason,
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub args: Value,
}

// ---------------------------------------------------------------------
// Tool-call grammar (spec §4.H step 3, §9)
// ---------------------------------------------------------------------

/// Parse exactly one tool call out of an assistant message, or `None` if
/// the message should be treated as a final answer. Three independent
/// strategies are tried — a bare top-level object, the body of a fenced
/// code block, and the first balanced `{ … }` substring anywhere in the
/// text — and their results reconciled: zero candidates means no tool
/// call, one means use it, and more than one *distinct* candidate is
/// rejected outright (model drift) rather than guessed at.
pub fn parse_tool_call(text: &str) -> Option<ToolCall> {
    let mut candidates: Vec<Value> = Vec::new();

    if let Some(v) = try_parse_tool_call_object(text.trim()) {
        push_unique(&mut candidates, v);
    }
    for block in fenced_code_blocks(text) {
        if let Some(v) = try_parse_tool_call_object(block.trim()) {
            push_unique(&mut candidates, v);
        }
    }
    if let Some(v) = first_brace_object(text) {
        push_unique(&mut candidates, v);
    }

    match candidates.len() {
        1 => value_to_tool_call(candidates.into_iter().next().expect("len checked")),
        _ => None,
    }
}

fn push_unique(candidates: &mut Vec<Value>, v: Value) {
    if !candidates.contains(&v) {
        candidates.push(v);
    }
}

fn try_parse_tool_call_object(text: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(text).ok()?;
    is_tool_call_shape(&value).then_some(value)
}

fn is_tool_call_shape(value: &Value) -> bool {
    value.is_object()
        && value.get("tool").and_then(Value::as_str).is_some()
        && value.get("args").is_some_and(Value::is_object)
}

fn value_to_tool_call(value: Value) -> Option<ToolCall> {
    let tool = value.get("tool")?.as_str()?.to_string();
    let args = value.get("args")?.clone();
    Some(ToolCall { tool, args })
}

fn fenced_code_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after_open = &rest[start + 3..];
        let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
        let body_and_rest = &after_open[body_start..];
        match body_and_rest.find("```") {
            Some(end) => {
                blocks.push(&body_and_rest[..end]);
                rest = &body_and_rest[end + 3..];
            }
            None => break,
        }
    }
    blocks
}

/// Every top-level (non-nested-within-a-sibling) balanced `{ … }`
/// substring in `text`, in order of appearance, skipping braces that occur
/// inside double-quoted strings.
fn brace_objects(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = matching_brace(text, i) {
                out.push(&text[i..=end]);
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    out
}

fn matching_brace(text: &str, open_idx: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (rel_idx, ch) in text[open_idx..].char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open_idx + rel_idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn first_brace_object(text: &str) -> Option<Value> {
    brace_objects(text).into_iter().find_map(try_parse_tool_call_object)
}

/// The first balanced `{ … }` substring in `text` regardless of shape, used
/// to pull a plan JSON object out of a model response that may wrap it in
/// prose or a fenced block.
fn extract_json_object(text: &str) -> &str {
    brace_objects(text).into_iter().next().unwrap_or(text)
}

// ---------------------------------------------------------------------
// Stutter / runaway detection (spec §4.H)
// ---------------------------------------------------------------------

/// If `text` contains a run of the same character at least `threshold`
/// long, return the offending character and `text` truncated just past the
/// end of that run.
pub fn detect_stutter(text: &str, threshold: usize) -> Option<(char, String)> {
    if threshold == 0 {
        return None;
    }
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let mut j = i + 1;
        while j < chars.len() && chars[j] == chars[i] {
            j += 1;
        }
        if j - i >= threshold {
            let truncated: String = chars[..j].iter().collect();
            return Some((chars[i], truncated));
        }
        i = j;
    }
    None
}

/// Heuristic fork between PLANNING and EXECUTING (spec §4.H: "if complex
/// intent"). The source system prompts the model itself for this
/// distinction; approximated here from surface structure so a turn never
/// needs an extra model round-trip just to decide whether to plan.
fn is_complex_intent(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    let conjunction_hits = [" and then ", " after that ", "; then ", ", then "]
        .iter()
        .filter(|kw| lowered.contains(*kw))
        .count();
    let step_markers = lowered.matches("\n- ").count() + lowered.matches("\n1.").count();
    lowered.contains("plan ") || lowered.starts_with("plan") || conjunction_hits >= 1 || step_markers >= 2 || text.split_whitespace().count() > 60
}

// ---------------------------------------------------------------------
// Agent loop
// ---------------------------------------------------------------------

/// Drives one `Session` through a single turn (spec GLOSSARY: "one user
/// message followed by zero or more model/tool iterations up to a final
/// assistant message"). Borrowed, not owned: a CLI/TUI front end
/// constructs one `AgentLoop` per turn over its long-lived `Session`.
pub struct AgentLoop<'a> {
    session: &'a mut Session,
    model: &'a ModelClient,
    subscriber: &'a dyn EventSubscriber,
    prompter: &'a dyn ConfirmPrompter,
    trace_id: String,
    cancel: Option<Arc<AtomicBool>>,
    max_iterations: u32,
    stutter_threshold: usize,
}

impl<'a> AgentLoop<'a> {
    pub fn new(
        session: &'a mut Session,
        model: &'a ModelClient,
        subscriber: &'a dyn EventSubscriber,
        prompter: &'a dyn ConfirmPrompter,
    ) -> Self {
        let max_iterations = session.config.limits.max_iterations.max(1);
        Self {
            session,
            model,
            subscriber,
            prompter,
            trace_id: new_trace_id(),
            cancel: None,
            max_iterations,
            stutter_threshold: STUTTER_THRESHOLD,
        }
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n.max(1);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.load(Ordering::SeqCst))
    }

    async fn emit(&mut self, step_index: u64, kind: EventKind, data: Value) {
        let event = Event::new(self.trace_id.clone(), step_index, kind, data);
        self.subscriber.on_event(&event);
        self.session.audit.record_event(&event).await;
    }

    fn chat_params(&self) -> ChatParams {
        ChatParams {
            model: self.session.config.llm.model.clone(),
            temperature: self.session.config.llm.temperature,
            max_tokens: self.session.config.llm.max_tokens,
            timeout_s: self.session.config.llm.timeout_s,
        }
    }

    /// Run one turn to completion: intake the user's message, optionally
    /// plan, then alternate model calls and tool calls until a final
    /// answer, a hard stop, a policy denial, or cancellation (spec §4.H).
    pub async fn run_turn(&mut self, user_text: &str) -> TurnOutcome {
        self.emit(0, EventKind::State, json!({"state": AgentState::Intake.as_str()})).await;
        self.emit(0, EventKind::UserMessage, json!({"text": user_text})).await;
        self.session.conversation.add(Message::user(user_text, Priority::Recent), Priority::Recent);

        if self.is_cancelled() {
            return self.stop(0, StopReason::UserCancel, None).await;
        }

        self.emit(0, EventKind::State, json!({"state": AgentState::ContextBuilding.as_str()})).await;

        if is_complex_intent(user_text) && self.session.plan.is_none() {
            self.emit(0, EventKind::State, json!({"state": AgentState::Planning.as_str()})).await;
            match self.generate_plan(user_text).await {
                Ok(plan) => {
                    self.emit(0, EventKind::PlanGenerated, json!({"title": plan.title, "steps": plan.steps.len()})).await;
                    self.session.plan = Some(plan);
                }
                Err(e) => {
                    tracing::warn!("planning failed, continuing without a plan: {e}");
                }
            }
        }

        for iteration in 1..=self.max_iterations {
            if self.is_cancelled() {
                return self.stop(iteration, StopReason::UserCancel, None).await;
            }

            self.emit(iteration as u64, EventKind::State, json!({"state": AgentState::Executing.as_str()})).await;

            let messages = self.session.conversation.render();
            let params = self.chat_params();
            self.emit(iteration as u64, EventKind::LlmRequest, json!({"messages": messages.len()})).await;

            let response_text = match self.model.chat(&messages, &params).await {
                Ok(text) => text,
                Err(e) => {
                    self.emit(iteration as u64, EventKind::LlmResponse, json!({"error": e.to_string()})).await;
                    return self.stop(iteration, StopReason::FatalError(e.to_string()), None).await;
                }
            };
            self.emit(iteration as u64, EventKind::LlmResponse, json!({"text": response_text})).await;

            let response_text = if let Some((ch, truncated)) = detect_stutter(&response_text, self.stutter_threshold) {
                self.emit(iteration as u64, EventKind::StutteringDetected, json!({"char": ch.to_string()})).await;
                truncated
            } else {
                response_text
            };

            let Some(tool_call) = parse_tool_call(&response_text) else {
                self.session
                    .conversation
                    .add(Message::assistant(response_text.clone(), Priority::Recent), Priority::Recent);
                self.emit(iteration as u64, EventKind::State, json!({"state": AgentState::Verifying.as_str()})).await;
                self.emit(iteration as u64, EventKind::FinalVerify, json!({"response": response_text})).await;
                self.emit(iteration as u64, EventKind::State, json!({"state": AgentState::Summarizing.as_str()})).await;
                return self.stop(iteration, StopReason::FinalAnswer, Some(response_text)).await;
            };

            self.session
                .conversation
                .add(Message::assistant(response_text.clone(), Priority::Working), Priority::Working);
            self.emit(
                iteration as u64,
                EventKind::ToolCallParsed,
                json!({"tool": tool_call.tool, "args": tool_call.args}),
            )
            .await;

            let outcome = self.dispatch_tool_call(iteration as u64, &tool_call).await;
            if let Some(stop) = outcome {
                return self.stop(iteration, stop, None).await;
            }
            self.emit(iteration as u64, EventKind::State, json!({"state": AgentState::Verifying.as_str()})).await;
        }

        self.stop(self.max_iterations, StopReason::MaxIterations, None).await
    }

    /// Gate, cache, execute, and feed back one tool call. Returns `Some`
    /// only when the turn must end immediately (a hard policy denial with
    /// no useful continuation); on a recoverable denial or a tool error the
    /// result is instead fed back to the model and `None` is returned so
    /// the loop continues.
    async fn dispatch_tool_call(&mut self, step_index: u64, call: &ToolCall) -> Option<StopReason> {
        let Some(spec) = self.session.registry.get(&call.tool).map(|t| t.spec().clone()) else {
            let result = ToolResult::err(CoreError::NotFound(format!("unknown tool '{}'", call.tool)));
            self.emit(step_index, EventKind::ToolResult, result.to_json()).await;
            self.feed_back(&call.tool, &result);
            return None;
        };

        if let Err(e) = spec.validate_args(&call.args) {
            let result = ToolResult::err(e);
            self.emit(step_index, EventKind::ToolResult, result.to_json()).await;
            self.feed_back(&call.tool, &result);
            return None;
        }

        let verdict = {
            let policy = &self.session.config.policy;
            let gate = PolicyGate::new(policy);
            if call.tool == "run_cmd" {
                let command = call.args.get("command").and_then(Value::as_str).unwrap_or_default();
                let argv = shlex::split(command).unwrap_or_default();
                gate.check_command(&call.tool, &argv, &policy.command_allowlist, &policy.command_denylist)
            } else if spec.requires_confirm_write {
                let path = call.args.get("path").and_then(Value::as_str).unwrap_or_default();
                gate.check_write(&call.tool, path, &policy.path_rules)
            } else {
                gate.check_tool(&call.tool)
            }
        };

        match verdict.decision {
            Decision::Deny { code, reason } => {
                self.emit(
                    step_index,
                    EventKind::PolicyDenyCmd,
                    json!({"tool": call.tool, "code": code, "reason": reason}),
                )
                .await;
                let result = ToolResult::err(CoreError::PolicyDenied(reason));
                self.emit(step_index, EventKind::ToolResult, result.to_json()).await;
                self.feed_back(&call.tool, &result);
                return None;
            }
            Decision::RequiresConfirmation => {
                let kind = if call.tool == "run_cmd" { EventKind::ConfirmExec } else { EventKind::ConfirmWrite };
                let approved = self.prompter.ask(&format!("Allow '{}' to proceed?", call.tool));
                self.emit(step_index, kind, json!({"tool": call.tool, "approved": approved})).await;
                if !approved {
                    self.emit(step_index, EventKind::DeniedByUser, json!({"tool": call.tool})).await;
                    let result = ToolResult::err(CoreError::Denied(format!("user declined '{}'", call.tool)));
                    self.emit(step_index, EventKind::ToolResult, result.to_json()).await;
                    self.feed_back(&call.tool, &result);
                    return None;
                }
            }
            Decision::Allow => {}
        }

        let cacheable = spec.cacheable;
        let cached = if cacheable { self.session.cache.get(&call.tool, &call.args) } else { None };

        let (result_json, feedback) = match cached {
            Some(cached_value) => {
                let feedback = format_cached_feedback(&call.tool, &cached_value);
                (cached_value, feedback)
            }
            None => {
                let result = self.execute_and_cache(&call.tool, &call.args, cacheable);
                let feedback = format_tool_feedback(&call.tool, &result);
                (result.to_json(), feedback)
            }
        };

        self.emit(step_index, EventKind::ToolResult, result_json.clone()).await;
        if call.tool == "display" && result_json.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            self.emit(step_index, EventKind::Display, call.args.clone()).await;
        }
        self.advance_plan(&call.tool, &result_json).await;
        self.session.conversation.add(Message::tool_result(feedback, Priority::Working), Priority::Working);
        None
    }

    fn feed_back(&mut self, tool: &str, result: &ToolResult) {
        let summary = format_tool_feedback(tool, result);
        self.session.conversation.add(Message::tool_result(summary, Priority::Working), Priority::Working);
    }

    fn execute_and_cache(&mut self, tool: &str, args: &Value, cacheable: bool) -> ToolResult {
        let mut ctx = self.session.tool_ctx();
        let result = match self.session.registry.execute(tool, args, &mut ctx) {
            Ok(payload) => ToolResult::ok(payload),
            Err(e) => ToolResult::err(e),
        };
        if cacheable && result.ok {
            self.session.cache.set(tool, args, result.to_json());
        }
        result
    }

    /// Advance or block the in-flight plan's matching step from a tool
    /// result's JSON shape (spec §4.H/§4.G): a successful call completes the
    /// ready step expecting this tool, while one of the "content moved out
    /// from under us" error codes blocks the step and may trigger a replan.
    async fn advance_plan(&mut self, tool: &str, result_json: &Value) {
        let ok = result_json.get("ok").and_then(Value::as_bool).unwrap_or(false);
        if self.session.plan.is_none() {
            return;
        }

        if ok {
            let matching_step = self
                .session
                .plan
                .as_ref()
                .expect("checked above")
                .ready_steps()
                .into_iter()
                .find(|s| s.expected_tool.as_deref() == Some(tool))
                .map(|s| s.id.clone());
            if let Some(id) = matching_step {
                self.session.plan.as_mut().expect("checked above").mark(&id, StepStatus::Completed);
                self.emit(0, EventKind::PlanStepDone, json!({"step": id})).await;
            }
            return;
        }

        let code = result_json.get("error").and_then(|e| e.get("code")).and_then(Value::as_str).unwrap_or("");
        if !matches!(code, "E_NOT_FOUND" | "E_DRIFT" | "E_NO_MATCH" | "E_AMBIGUOUS") {
            return;
        }

        let blocked_step = self.session.plan.as_ref().expect("checked above").ready_steps().first().map(|s| s.id.clone());
        let Some(id) = blocked_step else { return };
        self.session.plan.as_mut().expect("checked above").mark(&id, StepStatus::Blocked);
        self.emit(0, EventKind::PlanStepBlocked, json!({"step": id})).await;

        if self.session.replan_budget.try_consume() {
            let reason = result_json.get("error").and_then(|e| e.get("message")).and_then(Value::as_str).unwrap_or("").to_string();
            if let Ok(new_plan) = self.generate_plan(&format!("replan: step '{id}' is blocked ({reason})")).await {
                self.emit(0, EventKind::ReplanGenerated, json!({"title": new_plan.title})).await;
                self.session.plan = Some(new_plan);
            }
        }
    }

    async fn generate_plan(&mut self, request: &str) -> Result<Plan> {
        let params = self.chat_params();
        let mut last_error: Option<String> = None;
        for attempt in 0..=DEFAULT_MAX_PARSE_RETRIES {
            let mut prompt_messages = self.session.conversation.render();
            let mut instruction = format!(
                "Produce a plan for the following request as a single JSON object matching \
                 {{\"title\": string, \"steps\": [{{\"id\": string, \"description\": string, \
                 \"dependencies\": [string]?, \"expected_tool\": string?}}]}}. Request: {request}"
            );
            if let Some(err) = &last_error {
                instruction.push_str(&format!("\nThe previous attempt failed to parse: {err}. Return corrected JSON only."));
            }
            prompt_messages.push(Message::user(instruction, Priority::Working));

            let text = self.model.chat(&prompt_messages, &params).await?;
            match Plan::parse(extract_json_object(&text)) {
                Ok(plan) => return Ok(plan),
                Err(e) => {
                    if attempt == DEFAULT_MAX_PARSE_RETRIES {
                        return Err(e);
                    }
                    last_error = Some(e.to_string());
                }
            }
        }
        unreachable!("loop always returns by the final attempt")
    }

    async fn stop(&mut self, iteration: u32, reason: StopReason, final_message: Option<String>) -> TurnOutcome {
        self.emit(iteration as u64, EventKind::State, json!({"state": AgentState::Done.as_str()})).await;
        self.emit(iteration as u64, EventKind::StopReason, json!({"reason": reason.reason_code()})).await;
        TurnOutcome {
            final_message,
            stop_reason: reason,
            iterations: iteration,
        }
    }
}

/// Compact, summary-only feedback for a tool result (spec §4.H step 6:
/// "a compact feedback message ... never the raw payload"). Long reads and
/// greps are windowed rather than quoted in full.
fn format_tool_feedback(tool: &str, result: &ToolResult) -> String {
    let Some(error) = &result.error else {
        return match result.payload.as_ref() {
            Some(ToolPayload::ListDir { entries }) => {
                format!("[{tool}] {} entries: {}", entries.len(), join_preview(entries, 20))
            }
            Some(ToolPayload::ReadFile { text, read_size, total_size, truncated, .. }) => {
                let window = window_text(text, 800);
                format!("[{tool}] read {read_size}/{total_size} bytes (truncated={truncated}):\n{window}")
            }
            Some(ToolPayload::WriteFile { undo_id, bytes_written }) => {
                format!("[{tool}] wrote {bytes_written} bytes (undo_id={undo_id})")
            }
            Some(ToolPayload::Grep { matches, engine, truncated }) => {
                let preview: Vec<String> = matches.iter().take(20).map(|m| format!("{}:{}: {}", m.path, m.line, m.preview)).collect();
                format!("[{tool}] {} matches via {engine} (truncated={truncated}):\n{}", matches.len(), preview.join("\n"))
            }
            Some(ToolPayload::GlobFileSearch { matches }) => {
                format!("[{tool}] {} matches: {}", matches.len(), join_preview(matches, 20))
            }
            Some(ToolPayload::ApplyPatch { undo_id, used_fuzzy, similarity }) => {
                format!("[{tool}] applied (undo_id={undo_id}, fuzzy={used_fuzzy}, similarity={similarity:?})")
            }
            Some(ToolPayload::UndoPatch { undo_id, restored }) => {
                format!("[{tool}] undone (undo_id={undo_id}, restored={restored})")
            }
            Some(ToolPayload::RunCmd { stdout, stderr, exit_code, truncated }) => {
                format!(
                    "[{tool}] exit={exit_code} truncated={truncated}\nstdout: {}\nstderr: {}",
                    window_text(stdout, 400),
                    window_text(stderr, 400)
                )
            }
            Some(ToolPayload::SearchSemantic { chunks }) => {
                let preview: Vec<String> = chunks.iter().take(8).map(|c| format!("{}:{}-{} ({:.2})", c.path, c.start_line, c.end_line, c.score)).collect();
                format!("[{tool}] {} chunks:\n{}", chunks.len(), preview.join("\n"))
            }
            Some(ToolPayload::Display { .. }) => format!("[{tool}] displayed"),
            Some(ToolPayload::Symbol { value }) => format!("[{tool}] {}", window_text(&value.to_string(), 400)),
            Some(ToolPayload::Plugin { exit_code, duration_ms, .. }) => {
                format!("[{tool}] exit={exit_code} duration_ms={duration_ms}")
            }
            Some(ToolPayload::Weather { value }) => format!("[{tool}] {}", window_text(&value.to_string(), 400)),
            None => format!("[{tool}] done"),
        };
    };
    format!("[{tool}] error {}: {}", error.code, error.message)
}

/// Feedback for a cache hit: the cached entry is a plain [`Value`] (spec
/// §4.C stores JSON, not typed payloads), so this falls back to a compact
/// generic rendering rather than the per-variant formatting
/// [`format_tool_feedback`] gives a freshly executed result.
fn format_cached_feedback(tool: &str, cached: &Value) -> String {
    if cached.get("ok").and_then(Value::as_bool) == Some(false) {
        let code = cached.get("error").and_then(|e| e.get("code")).and_then(Value::as_str).unwrap_or("E_TOOL");
        let message = cached.get("error").and_then(|e| e.get("message")).and_then(Value::as_str).unwrap_or("");
        return format!("[{tool}] error {code}: {message}");
    }
    format!("[{tool}] (cached) {}", window_text(&cached.to_string(), 800))
}

fn join_preview(items: &[String], limit: usize) -> String {
    let shown: Vec<&String> = items.iter().take(limit).collect();
    let mut text = shown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");
    if items.len() > limit {
        text.push_str(&format!(", … ({} more)", items.len() - limit));
    }
    text
}

fn window_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}… [truncated]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditSink;
    use crate::config::Config;
    use crate::events::ChannelEventSubscriber;
    use crate::external::FixedConfirmPrompter;
    use crate::tools::ToolRegistry;
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    #[test]
    fn parses_bare_top_level_tool_call() {
        let text = r#"{"tool": "list_dir", "args": {"path": "src"}}"#;
        let call = parse_tool_call(text).expect("parsed");
        assert_eq!(call.tool, "list_dir");
        assert_eq!(call.args["path"], "src");
    }

    #[test]
    fn parses_fenced_tool_call() {
        let text = "Sure, here:\n```json\n{\"tool\": \"grep\", \"args\": {\"pattern\": \"foo\"}}\n```\nDone.";
        let call = parse_tool_call(text).expect("parsed");
        assert_eq!(call.tool, "grep");
    }

    #[test]
    fn parses_embedded_object_substring() {
        let text = "I'll call it now: {\"tool\": \"read_file\", \"args\": {\"path\": \"a.txt\"}} please wait.";
        let call = parse_tool_call(text).expect("parsed");
        assert_eq!(call.tool, "read_file");
    }

    #[test]
    fn no_tool_call_when_plain_prose() {
        assert!(parse_tool_call("The answer is 42.").is_none());
    }

    #[test]
    fn identical_candidates_across_strategies_are_accepted() {
        let text = "{\"tool\": \"list_dir\", \"args\": {\"path\": \".\"}}";
        let call = parse_tool_call(text).expect("parsed");
        assert_eq!(call.tool, "list_dir");
    }

    #[test]
    fn distinct_candidates_are_rejected() {
        let text = "```json\n{\"tool\": \"grep\", \"args\": {\"pattern\": \"a\"}}\n```\nthen {\"tool\": \"list_dir\", \"args\": {\"path\": \".\"}}";
        assert!(parse_tool_call(text).is_none());
    }

    #[test]
    fn detects_long_repeated_character_run() {
        let text = format!("ok {}", "a".repeat(200));
        let (ch, truncated) = detect_stutter(&text, STUTTER_THRESHOLD).expect("stutter");
        assert_eq!(ch, 'a');
        assert!(truncated.len() < text.len());
    }

    #[test]
    fn short_runs_are_not_flagged_as_stutter() {
        assert!(detect_stutter("aaaa ok", STUTTER_THRESHOLD).is_none());
    }

    struct CollectingSubscriber {
        events: std::sync::Mutex<Vec<Event>>,
    }

    impl CollectingSubscriber {
        fn new() -> Self {
            Self { events: std::sync::Mutex::new(Vec::new()) }
        }
        fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).iter().map(|e| e.kind).collect()
        }
        fn states(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .filter(|e| e.kind == EventKind::State)
                .filter_map(|e| e.data.get("state").and_then(Value::as_str).map(str::to_string))
                .collect()
        }
    }

    impl EventSubscriber for CollectingSubscriber {
        fn on_event(&self, event: &Event) {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
        }
    }

    async fn test_session(dir: &std::path::Path) -> Session {
        let config = Config::for_workspace(dir);
        let audit = AuditSink::open(&dir.join("audit.jsonl")).await.expect("open audit");
        Session::new(config, ToolRegistry::with_builtins(), audit)
    }

    #[tokio::test]
    async fn stops_with_final_answer_when_no_tool_call_is_parsed() {
        let dir = tempdir().expect("tempdir");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "All done, nothing further needed."}}]
            })))
            .mount(&server)
            .await;

        let mut session = test_session(dir.path()).await;
        session.config.llm.model = "test-model".to_string();
        let model = ModelClient::new(server.uri(), None, std::time::Duration::from_secs(5)).expect("client");
        let subscriber = CollectingSubscriber::new();
        let prompter = FixedConfirmPrompter(true);

        let mut agent = AgentLoop::new(&mut session, &model, &subscriber, &prompter);
        let outcome = agent.run_turn("just say hi").await;

        assert_eq!(outcome.stop_reason, StopReason::FinalAnswer);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.final_message.as_deref(), Some("All done, nothing further needed."));
        assert!(subscriber.kinds().contains(&EventKind::StopReason));
        assert!(subscriber.kinds().contains(&EventKind::FinalVerify));
        assert!(subscriber.states().contains(&"SUMMARIZING".to_string()));
    }

    #[tokio::test]
    async fn cancellation_stops_before_any_model_call() {
        let dir = tempdir().expect("tempdir");
        let mut session = test_session(dir.path()).await;
        // Deliberately bogus endpoint: the loop must never reach it.
        let model = ModelClient::new("http://127.0.0.1:1", None, std::time::Duration::from_millis(50)).expect("client");
        let subscriber = CollectingSubscriber::new();
        let prompter = FixedConfirmPrompter(true);
        let cancel = Arc::new(AtomicBool::new(true));

        let mut agent = AgentLoop::new(&mut session, &model, &subscriber, &prompter).with_cancel(cancel);
        let outcome = agent.run_turn("do something").await;

        assert_eq!(outcome.stop_reason, StopReason::UserCancel);
        assert_eq!(outcome.iterations, 0);
    }

    #[tokio::test]
    async fn stops_at_max_iterations_after_one_tool_call() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "hello").expect("write fixture");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"tool\": \"list_dir\", \"args\": {\"path\": \".\"}}"}}]
            })))
            .mount(&server)
            .await;

        let mut session = test_session(dir.path()).await;
        let model = ModelClient::new(server.uri(), None, std::time::Duration::from_secs(5)).expect("client");
        let subscriber = CollectingSubscriber::new();
        let prompter = FixedConfirmPrompter(true);

        let mut agent = AgentLoop::new(&mut session, &model, &subscriber, &prompter).with_max_iterations(1);
        let outcome = agent.run_turn("list files").await;

        assert_eq!(outcome.stop_reason, StopReason::MaxIterations);
        assert_eq!(outcome.iterations, 1);
        assert!(subscriber.kinds().contains(&EventKind::ToolCallParsed));
        assert!(subscriber.kinds().contains(&EventKind::ToolResult));
        assert!(subscriber.states().contains(&"VERIFYING".to_string()));
    }

    #[tokio::test]
    async fn successful_display_call_emits_a_display_event() {
        let dir = tempdir().expect("tempdir");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"tool\": \"display\", \"args\": {\"content\": \"hi there\", \"level\": \"info\"}}"}}]
            })))
            .mount(&server)
            .await;

        let mut session = test_session(dir.path()).await;
        let model = ModelClient::new(server.uri(), None, std::time::Duration::from_secs(5)).expect("client");
        let subscriber = CollectingSubscriber::new();
        let prompter = FixedConfirmPrompter(true);

        let mut agent = AgentLoop::new(&mut session, &model, &subscriber, &prompter).with_max_iterations(1);
        agent.run_turn("say hi to the user").await;

        assert!(subscriber.kinds().contains(&EventKind::Display));
    }

    #[tokio::test]
    async fn policy_denied_network_command_never_spawns_a_process() {
        let dir = tempdir().expect("tempdir");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"tool\": \"run_cmd\", \"args\": {\"command\": \"curl example.com\"}}"}}]
            })))
            .mount(&server)
            .await;

        let mut session = test_session(dir.path()).await;
        assert!(!session.config.policy.allow_network);
        let model = ModelClient::new(server.uri(), None, std::time::Duration::from_secs(5)).expect("client");
        let subscriber = CollectingSubscriber::new();
        let prompter = FixedConfirmPrompter(true);

        let mut agent = AgentLoop::new(&mut session, &model, &subscriber, &prompter).with_max_iterations(1);
        let outcome = agent.run_turn("run curl example.com").await;

        assert_eq!(outcome.stop_reason, StopReason::MaxIterations);
        assert!(subscriber.kinds().contains(&EventKind::PolicyDenyCmd));
        assert!(!subscriber.kinds().contains(&EventKind::ConfirmExec));
    }

    #[tokio::test]
    async fn configured_command_denylist_is_enforced() {
        let dir = tempdir().expect("tempdir");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"tool\": \"run_cmd\", \"args\": {\"command\": \"rm file.txt\"}}"}}]
            })))
            .mount(&server)
            .await;

        let mut session = test_session(dir.path()).await;
        session.config.policy.command_denylist.push("rm *".to_string());
        let model = ModelClient::new(server.uri(), None, std::time::Duration::from_secs(5)).expect("client");
        let subscriber = CollectingSubscriber::new();
        let prompter = FixedConfirmPrompter(true);

        let mut agent = AgentLoop::new(&mut session, &model, &subscriber, &prompter).with_max_iterations(1);
        agent.run_turn("remove file.txt").await;

        assert!(subscriber.kinds().contains(&EventKind::PolicyDenyCmd));
    }
}
