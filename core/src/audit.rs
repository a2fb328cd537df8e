//! Append-only JSON-lines audit and trace sinks (spec §4.H, §6, §9).
//! Grounded on the teacher's `RolloutRecorder`: a bounded channel feeding a
//! single background task that owns the file handle, so the agent task
//! never blocks on disk I/O when recording an event.

use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::events::Event;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Serialize)]
struct AuditLine<'a> {
    timestamp: u64,
    trace_id: &'a str,
    step_index: u64,
    event: &'a str,
    data: &'a Value,
}

/// Redact keys that commonly carry secrets before they ever reach the
/// writer task (spec §6: "sensitive fields ... MUST be redacted").
const REDACTED_KEYS: &[&str] = &["api_key", "token", "authorization", "password", "secret"];

fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if REDACTED_KEYS.iter().any(|r| k.to_ascii_lowercase().contains(r)) {
                    out.insert(k.clone(), Value::String("[redacted]".to_string()));
                } else {
                    out.insert(k.clone(), redact(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// Single-writer append-only sink. One instance per session; best-effort
/// durability (spec §6) — a full channel or closed receiver only logs a
/// warning rather than propagating an error to the agent loop.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<String>,
}

impl AuditSink {
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        let (tx, mut rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let mut file = file;
        tokio::task::spawn(async move {
            while let Some(line) = rx.recv().await {
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    tracing::warn!("audit sink: write failed: {e}");
                    break;
                }
                if let Err(e) = file.write_all(b"\n").await {
                    tracing::warn!("audit sink: write failed: {e}");
                    break;
                }
                if let Err(e) = file.flush().await {
                    tracing::warn!("audit sink: flush failed: {e}");
                }
            }
        });

        Ok(Self { tx })
    }

    /// `write({timestamp, trace_id, step_index, event, data})` per spec §6.
    pub async fn write(&self, trace_id: &str, step_index: u64, event: &str, data: &Value) {
        let line = AuditLine {
            timestamp: crate::util::unix_timestamp(),
            trace_id,
            step_index,
            event,
            data: &redact(data),
        };
        match serde_json::to_string(&line) {
            Ok(json) => {
                if self.tx.send(json).await.is_err() {
                    tracing::warn!("audit sink: writer task gone, dropping line");
                }
            }
            Err(e) => tracing::warn!("audit sink: failed to serialize line: {e}"),
        }
    }

    pub async fn record_event(&self, event: &Event) {
        self.write(&event.trace_id, event.step_index, &format!("{:?}", event.kind), &event.data).await;
    }
}

/// Debug trace sink — identical wire shape and durability guarantees to
/// [`AuditSink`], kept as a distinct type since spec §6 names
/// `logs/trace.jsonl` as a separate file from `logs/audit.jsonl`.
pub type TraceSink = AuditSink;

pub fn default_audit_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join("audit.jsonl")
}

pub fn default_trace_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join("trace.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_redacted_lines_as_jsonl() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        let sink = AuditSink::open(&path).await.expect("open");

        sink.write("trace-1", 3, "tool_result", &json!({"api_key": "sk-secret", "ok": true}))
            .await;
        // give the writer task a moment to flush
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let contents = tokio::fs::read_to_string(&path).await.expect("read");
        let line: Value = serde_json::from_str(contents.lines().next().expect("one line")).expect("json");
        assert_eq!(line["data"]["api_key"], json!("[redacted]"));
        assert_eq!(line["data"]["ok"], json!(true));
        assert_eq!(line["trace_id"], json!("trace-1"));
        assert_eq!(line["step_index"], json!(3));
    }
}
