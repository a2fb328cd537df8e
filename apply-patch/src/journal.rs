use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

use crate::hash::ContentHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchMode {
    Apply,
    Write,
    Undo,
}

/// One entry in the undo journal. `before_content` is kept inline so that
/// `undo` never has to re-derive the prior body from a diff — it can always
/// restore byte-for-byte, matching spec's "before content embedded in the
/// journal" note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRecord {
    pub undo_id: String,
    pub path: PathBuf,
    pub before_hash: ContentHash,
    pub after_hash: ContentHash,
    pub before_content: String,
    pub timestamp: u64,
    pub mode: PatchMode,
}

/// Append-only log of every patch applied in a session. Owned exclusively
/// by the `Session` that created it — never a process-global singleton.
#[derive(Debug, Default)]
pub struct UndoJournal {
    records: Vec<PatchRecord>,
    next_id: u64,
}

impl UndoJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    pub fn find(&self, undo_id: &str) -> Option<&PatchRecord> {
        self.records.iter().rev().find(|r| r.undo_id == undo_id)
    }

    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("undo-{}", self.next_id)
    }

    pub(crate) fn append_apply(
        &mut self,
        path: PathBuf,
        before_hash: ContentHash,
        after_hash: ContentHash,
        before_content: String,
    ) -> String {
        let undo_id = self.fresh_id();
        self.records.push(PatchRecord {
            undo_id: undo_id.clone(),
            path,
            before_hash,
            after_hash,
            before_content,
            timestamp: now(),
            mode: PatchMode::Apply,
        });
        undo_id
    }

    pub(crate) fn append_undo(
        &mut self,
        path: PathBuf,
        before_hash: ContentHash,
        after_hash: ContentHash,
        before_content: String,
    ) -> String {
        let undo_id = self.fresh_id();
        self.records.push(PatchRecord {
            undo_id: undo_id.clone(),
            path,
            before_hash,
            after_hash,
            before_content,
            timestamp: now(),
            mode: PatchMode::Undo,
        });
        undo_id
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
