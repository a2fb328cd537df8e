//! Event envelope emitted by the agent loop for UI consumption and audit
//! recording (spec §4.H, §5, §6). Grounded on the teacher's `Event`/`EventMsg`
//! split (`core/src/protocol.rs`) — a stable outer envelope around a kind-
//! specific payload — generalized to the kind set this agent loop emits.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserMessage,
    LlmRequest,
    LlmResponse,
    ToolCallParsed,
    ToolResult,
    ConfirmWrite,
    ConfirmExec,
    PolicyDenyCmd,
    DeniedByUser,
    StutteringDetected,
    PlanGenerated,
    PlanStepStart,
    PlanStepDone,
    PlanStepBlocked,
    ReplanGenerated,
    FinalVerify,
    StopReason,
    Display,
    State,
}

/// `{step_index, kind, data, timestamp}` per spec §4 GLOSSARY, plus a
/// session-scoped `trace_id` so audit lines join across sinks (spec §9).
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub trace_id: String,
    pub step_index: u64,
    pub kind: EventKind,
    pub data: Value,
    pub timestamp: u64,
}

impl Event {
    pub fn new(trace_id: impl Into<String>, step_index: u64, kind: EventKind, data: Value) -> Self {
        Self {
            trace_id: trace_id.into(),
            step_index,
            kind,
            data,
            timestamp: crate::util::unix_timestamp(),
        }
    }
}

/// Non-blocking event subscriber contract (spec §6): back-pressure is
/// absorbed by the bounded channel the implementation wraps, never by
/// blocking the agent task.
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// A subscriber backed by an unbounded async channel, used to fan events out
/// to a CLI/UI consumer without ever blocking the agent loop on a full
/// buffer (spec: "absorbed by a bounded channel" — here traded for an
/// unbounded one since overflow would silently drop audit-relevant events).
pub struct ChannelEventSubscriber {
    sender: async_channel::Sender<Event>,
}

impl ChannelEventSubscriber {
    pub fn new() -> (Self, async_channel::Receiver<Event>) {
        let (sender, receiver) = async_channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl EventSubscriber for ChannelEventSubscriber {
    fn on_event(&self, event: &Event) {
        if self.sender.try_send(event.clone()).is_err() {
            tracing::warn!(kind = ?event.kind, "event channel closed or full, dropping event");
        }
    }
}
