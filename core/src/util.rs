//! Small free functions shared across modules. Grounded on the teacher's
//! `core/src/util.rs`, trimmed to the pieces this runtime still needs —
//! the git-repo detector and SIGINT notifier it also carried have no
//! counterpart here.

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::error::CoreError;
use crate::error::Result;

pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Resolve `candidate` (absolute or relative) against `workspace_root` and
/// verify the result stays strictly inside it (spec §8 invariant 6). Purely
/// lexical: does not require the path to exist, so it also guards writes
/// that create new files.
pub fn resolve_in_workspace(workspace_root: &Path, candidate: &Path) -> Result<PathBuf> {
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workspace_root.join(candidate)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(CoreError::PathEscape(candidate.display().to_string()));
                }
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }

    if !normalized.starts_with(workspace_root) {
        return Err(CoreError::PathEscape(candidate.display().to_string()));
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_resolves_inside_root() {
        let root = Path::new("/ws");
        let resolved = resolve_in_workspace(root, Path::new("src/main.rs")).expect("resolve");
        assert_eq!(resolved, PathBuf::from("/ws/src/main.rs"));
    }

    #[test]
    fn parent_dir_escape_is_rejected() {
        let root = Path::new("/ws");
        let err = resolve_in_workspace(root, Path::new("../etc/passwd")).unwrap_err();
        assert!(matches!(err, CoreError::PathEscape(_)));
    }

    #[test]
    fn absolute_path_outside_root_is_rejected() {
        let root = Path::new("/ws");
        let err = resolve_in_workspace(root, Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, CoreError::PathEscape(_)));
    }

    #[test]
    fn dot_dot_that_stays_inside_root_is_allowed() {
        let root = Path::new("/ws");
        let resolved = resolve_in_workspace(root, Path::new("src/../main.rs")).expect("resolve");
        assert_eq!(resolved, PathBuf::from("/ws/main.rs"));
    }
}
