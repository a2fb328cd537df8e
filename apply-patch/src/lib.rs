//! Content-addressed file patching with an append-only undo journal.
//!
//! Grounded on the atomic-rename write discipline and lenient sequence
//! matching of the teacher's `codex-apply-patch` crate, generalized to the
//! `(path, old, new)` triple-replacement model with an explicit fuzzy
//! fallback and a forward/inverse undo journal.

mod fuzzy;
mod hash;
mod journal;
mod seek_sequence;

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

pub use fuzzy::DEFAULT_MIN_SIMILARITY;
pub use fuzzy::FuzzyError;
pub use hash::ContentHash;
pub use journal::PatchMode;
pub use journal::PatchRecord;
pub use journal::UndoJournal;

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("E_NOT_FOUND: {0}")]
    NotFound(PathBuf),
    #[error("E_NO_MATCH: no occurrence of the given text was found")]
    NoMatch,
    #[error("E_AMBIGUOUS: {0}")]
    Ambiguous(String),
    #[error("E_DRIFT: file changed since the patch was recorded")]
    Drift,
    #[error("E_IO: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub undo_id: String,
    pub before_hash: ContentHash,
    pub after_hash: ContentHash,
    pub used_fuzzy: bool,
    pub similarity: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct UndoReport {
    pub undo_id: String,
    pub restored_hash: ContentHash,
}

/// Patch engine bound to a single workspace root and owning its undo
/// journal. One instance per `Session` — never a process-global.
pub struct PatchEngine {
    journal: UndoJournal,
}

impl Default for PatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchEngine {
    pub fn new() -> Self {
        Self {
            journal: UndoJournal::new(),
        }
    }

    pub fn journal(&self) -> &UndoJournal {
        &self.journal
    }

    /// Apply an exact-or-fuzzy triple replacement to `path`.
    ///
    /// `expected_replacements` defaults to 1: if the exact occurrence count
    /// of `old` doesn't match it, and `fuzzy` is enabled, falls back to
    /// similarity-ratio window matching; otherwise fails with `E_NO_MATCH`
    /// or `E_AMBIGUOUS`.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_patch(
        &mut self,
        path: &Path,
        old: &str,
        new: &str,
        expected_replacements: Option<usize>,
        fuzzy: bool,
        min_similarity: Option<f64>,
    ) -> Result<ApplyReport, PatchError> {
        if !path.is_file() {
            return Err(PatchError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let before_hash = ContentHash::of(content.as_bytes());
        let expected = expected_replacements.unwrap_or(1);

        let exact_count = content.matches(old).count();

        let (new_content, used_fuzzy, similarity) = if exact_count == expected && exact_count > 0 {
            (replace_nth_exact(&content, old, new), false, None)
        } else if exact_count > expected {
            return Err(PatchError::Ambiguous(format!(
                "found {exact_count} exact occurrences, expected {expected}"
            )));
        } else if fuzzy {
            if let Some((start, end)) = lenient_whitespace_match(&content, old) {
                (splice_window(&content, start, end, new), true, Some(1.0))
            } else {
                let min_similarity = min_similarity.unwrap_or(DEFAULT_MIN_SIMILARITY);
                let found = fuzzy::find_best_window(&content, old, min_similarity).map_err(|e| match e {
                    FuzzyError::NoMatch => PatchError::NoMatch,
                    FuzzyError::Ambiguous { best, runner_up, margin } => PatchError::Ambiguous(format!(
                        "best fuzzy match {best:.3} and runner-up {runner_up:.3} are within {margin}"
                    )),
                })?;
                (
                    splice_window(&content, found.start_line, found.end_line, new),
                    true,
                    Some(found.similarity),
                )
            }
        } else {
            return Err(PatchError::NoMatch);
        };

        atomic_write(path, &new_content)?;
        let after_hash = ContentHash::of(new_content.as_bytes());
        let undo_id = self.journal.append_apply(
            path.to_path_buf(),
            before_hash,
            after_hash,
            content,
        );

        Ok(ApplyReport {
            undo_id,
            before_hash,
            after_hash,
            used_fuzzy,
            similarity,
        })
    }

    /// Plain atomic write of `text` to `path`, recorded in the journal with
    /// `mode = write` (used by the `write_file` tool rather than
    /// `apply_patch`).
    pub fn write_file(&mut self, path: &Path, text: &str) -> Result<ApplyReport, PatchError> {
        let before = if path.is_file() {
            fs::read_to_string(path)?
        } else {
            String::new()
        };
        let before_hash = ContentHash::of(before.as_bytes());
        atomic_write(path, text)?;
        let after_hash = ContentHash::of(text.as_bytes());
        let undo_id = self
            .journal
            .append_apply(path.to_path_buf(), before_hash, after_hash, before);
        Ok(ApplyReport {
            undo_id,
            before_hash,
            after_hash,
            used_fuzzy: false,
            similarity: None,
        })
    }

    /// Reverse a previously applied patch. Fails with `E_DRIFT` unless
    /// `force` when the file's current content no longer matches
    /// `after_hash` of the forward record.
    pub fn undo_patch(&mut self, undo_id: &str, force: bool) -> Result<UndoReport, PatchError> {
        let record = self
            .journal
            .find(undo_id)
            .ok_or_else(|| PatchError::NotFound(PathBuf::from(undo_id)))?
            .clone();

        let current = fs::read_to_string(&record.path)?;
        let current_hash = ContentHash::of(current.as_bytes());
        if current_hash != record.after_hash && !force {
            return Err(PatchError::Drift);
        }

        atomic_write(&record.path, &record.before_content)?;
        let restored_hash = ContentHash::of(record.before_content.as_bytes());

        self.journal.append_undo(
            record.path.clone(),
            current_hash,
            restored_hash,
            current,
        );

        Ok(UndoReport {
            undo_id: undo_id.to_string(),
            restored_hash,
        })
    }
}

fn replace_nth_exact(content: &str, old: &str, new: &str) -> String {
    content.replacen(old, new, usize::MAX)
}

/// A deterministic tier between exact and ratio-based fuzzy matching: treat
/// `old` as a sequence of lines and look for it ignoring trailing/leading
/// whitespace drift (the same strictness ladder the teacher's
/// `seek_sequence` walks for its own patch hunks).
fn lenient_whitespace_match(content: &str, old: &str) -> Option<(usize, usize)> {
    let lines: Vec<String> = content.lines().map(str::to_string).collect();
    let pattern: Vec<String> = old.lines().map(str::to_string).collect();
    if pattern.is_empty() {
        return None;
    }
    let start = seek_sequence::seek_sequence(&lines, &pattern, 0, false)?;
    Some((start, start + pattern.len()))
}

fn splice_window(content: &str, start_line: usize, end_line: usize, new: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let before_lines = &lines[..start_line];
    let after_lines = &lines[end_line..];
    let mut rebuilt = String::new();
    for l in before_lines {
        rebuilt.push_str(l);
        rebuilt.push('\n');
    }
    rebuilt.push_str(new);
    if !new.ends_with('\n') && !after_lines.is_empty() {
        rebuilt.push('\n');
    }
    for l in after_lines {
        rebuilt.push_str(l);
        rebuilt.push('\n');
    }
    rebuilt
}

/// Write `text` through a temp file in the same directory, fsync it, then
/// rename over `path` — never leaves a half-written file visible.
fn atomic_write(path: &Path, text: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn exact_apply_and_undo_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo\nbar\n").expect("write");

        let mut engine = PatchEngine::new();
        let report = engine
            .apply_patch(&path, "bar", "baz", Some(1), false, None)
            .expect("apply");
        assert_eq!(fs::read_to_string(&path).expect("read"), "foo\nbaz\n");
        assert_eq!(engine.journal().len(), 1);

        engine.undo_patch(&report.undo_id, false).expect("undo");
        assert_eq!(fs::read_to_string(&path).expect("read"), "foo\nbar\n");
        assert_eq!(engine.journal().len(), 2);
    }

    #[test]
    fn expected_replacements_mismatch_is_no_match() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo\nbar\n").expect("write");

        let mut engine = PatchEngine::new();
        let err = engine
            .apply_patch(&path, "bar", "baz", Some(2), false, None)
            .unwrap_err();
        assert!(matches!(err, PatchError::NoMatch));
    }

    #[test]
    fn undo_detects_drift_unless_forced() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo\nbar\n").expect("write");

        let mut engine = PatchEngine::new();
        let report = engine
            .apply_patch(&path, "bar", "baz", Some(1), false, None)
            .expect("apply");

        fs::write(&path, "foo\nbaz\nextra\n").expect("write again");

        let err = engine.undo_patch(&report.undo_id, false).unwrap_err();
        assert!(matches!(err, PatchError::Drift));

        engine.undo_patch(&report.undo_id, true).expect("forced undo");
        assert_eq!(fs::read_to_string(&path).expect("read"), "foo\nbar\n");
    }

    #[test]
    fn fuzzy_apply_replaces_drifted_window() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        fs::write(&path, "fn main() {\n    let x = 1;\n    println!(\"{}\", x);\n}\n")
            .expect("write");

        let mut engine = PatchEngine::new();
        let report = engine
            .apply_patch(
                &path,
                "let x = 1;\nprintln!(\"{x}\", x);\n",
                "let x = 2;\nprintln!(\"{x}\");\n",
                Some(1),
                true,
                Some(0.5),
            )
            .expect("fuzzy apply");
        assert!(report.used_fuzzy);
        let content = fs::read_to_string(&path).expect("read");
        assert!(content.contains("let x = 2;"));
    }

    #[test]
    fn exact_apply_replaces_all_occurrences_when_count_matches() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        fs::write(&path, "a\na\n").expect("write");

        let mut engine = PatchEngine::new();
        engine
            .apply_patch(&path, "a", "b", Some(2), false, None)
            .expect("apply");
        assert_eq!(fs::read_to_string(&path).expect("read"), "b\nb\n");
    }
}
