//! `ProjectPaths` is a pure value type: given a workspace root and a
//! project id it derives every on-disk location the runtime persists state
//! under (spec §3, §6). It holds no state of its own and performs no I/O —
//! callers create directories lazily when they first write to them.

use std::path::Path;
use std::path::PathBuf;

const STATE_DIR_NAME: &str = ".agentcore";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub logs_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub vector_db_dir: PathBuf,
    pub registry_dir: PathBuf,
    pub approvals_dir: PathBuf,
    pub prompt_versions_file: PathBuf,
}

impl ProjectPaths {
    pub fn new(workspace_root: &Path, project_id: &str) -> Self {
        let root = workspace_root.join(STATE_DIR_NAME).join("projects").join(project_id);
        Self {
            logs_dir: root.join("logs"),
            sessions_dir: root.join("sessions"),
            cache_dir: root.join("cache"),
            vector_db_dir: root.join("vector_db"),
            registry_dir: workspace_root.join(STATE_DIR_NAME).join("registry"),
            approvals_dir: root.join("approvals"),
            prompt_versions_file: workspace_root
                .join(STATE_DIR_NAME)
                .join("registry")
                .join("prompt_versions.json"),
            root,
        }
    }

    pub fn audit_log(&self) -> PathBuf {
        self.logs_dir.join("audit.jsonl")
    }

    pub fn trace_log(&self) -> PathBuf {
        self.logs_dir.join("trace.jsonl")
    }

    pub fn app_log(&self) -> PathBuf {
        self.logs_dir.join("app.log")
    }

    pub fn session_file(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.json"))
    }

    pub fn markdown_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("markdown")
    }

    pub fn intents_file(&self) -> PathBuf {
        self.registry_dir.join("intents.yaml")
    }

    /// Create every directory this value names, if missing. Best-effort: the
    /// audit sink and cache degrade gracefully if a later write still fails.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.logs_dir,
            &self.sessions_dir,
            &self.cache_dir,
            &self.vector_db_dir,
            &self.registry_dir,
            &self.approvals_dir,
            &self.markdown_cache_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_a_pure_function_of_its_inputs() {
        let root = Path::new("/ws");
        let a = ProjectPaths::new(root, "proj1");
        let b = ProjectPaths::new(root, "proj1");
        assert_eq!(a, b);
        assert_eq!(a.logs_dir, PathBuf::from("/ws/.agentcore/projects/proj1/logs"));
        assert_eq!(a.audit_log(), PathBuf::from("/ws/.agentcore/projects/proj1/logs/audit.jsonl"));
    }

    #[test]
    fn registry_is_shared_across_projects() {
        let root = Path::new("/ws");
        let a = ProjectPaths::new(root, "proj1");
        let b = ProjectPaths::new(root, "proj2");
        assert_eq!(a.registry_dir, b.registry_dir);
    }
}
