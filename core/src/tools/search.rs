//! `grep` and `glob_file_search` (spec §4.A). Grounded on the teacher's
//! `file-search` crate for glob matching style and the spec's note that
//! `grep` "attempts a fast external backend, falls back to in-process
//! scan" — here that backend is `ripgrep` on `PATH`, with a regex-lite
//! scan as the fallback so the tool still works in a sandbox without it.

use std::process::Command;

use regex_lite::Regex;
use serde_json::Value;
use wildmatch::WildMatch;

use crate::error::Result;
use crate::policy::RiskLevel;
use crate::tools::ArgField;
use crate::tools::ArgKind;
use crate::tools::GrepHit;
use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolPayload;
use crate::tools::ToolSpec;
use crate::util::resolve_in_workspace;

const DEFAULT_MAX_HITS: usize = 200;

pub struct GrepTool {
    spec: ToolSpec,
}

impl Default for GrepTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "grep",
                category: "search",
                args: &[
                    ArgField::required("pattern", ArgKind::String),
                    ArgField::optional("path", ArgKind::String),
                    ArgField::optional("ignore_case", ArgKind::Boolean),
                    ArgField::optional("max_hits", ArgKind::Integer),
                ],
                risk: RiskLevel::Safe,
                requires_confirm_write: false,
                requires_confirm_exec: false,
                needs_network: false,
                needs_workspace: true,
                cacheable: true,
                deprecated: false,
                open_args: false,
            },
        }
    }
}

impl Tool for GrepTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let pattern = args["pattern"].as_str().unwrap_or_default();
        let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let ignore_case = args.get("ignore_case").and_then(Value::as_bool).unwrap_or(false);
        let max_hits = args
            .get("max_hits")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_HITS);

        let resolved = resolve_in_workspace(ctx.workspace_root, std::path::Path::new(path))?;

        if let Some((matches, truncated)) = rg_scan(pattern, &resolved, ignore_case, max_hits) {
            return Ok(ToolPayload::Grep { matches, engine: "ripgrep", truncated });
        }

        let (matches, truncated) = in_process_scan(pattern, &resolved, ignore_case, max_hits)?;
        Ok(ToolPayload::Grep { matches, engine: "in_process", truncated })
    }
}

fn rg_scan(pattern: &str, root: &std::path::Path, ignore_case: bool, max_hits: usize) -> Option<(Vec<GrepHit>, bool)> {
    let mut cmd = Command::new("rg");
    cmd.arg("--line-number").arg("--no-heading");
    if ignore_case {
        cmd.arg("-i");
    }
    cmd.arg(pattern).arg(root);
    let output = cmd.output().ok()?;
    if !output.status.success() && output.stdout.is_empty() {
        return Some((Vec::new(), false));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let mut hits = Vec::new();
    for line in text.lines() {
        if hits.len() >= max_hits {
            return Some((hits, true));
        }
        let mut parts = line.splitn(3, ':');
        let (Some(path), Some(line_no), Some(preview)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if let Ok(line_no) = line_no.parse::<u32>() {
            hits.push(GrepHit {
                path: path.to_string(),
                line: line_no,
                preview: preview.to_string(),
            });
        }
    }
    Some((hits, false))
}

fn in_process_scan(
    pattern: &str,
    root: &std::path::Path,
    ignore_case: bool,
    max_hits: usize,
) -> Result<(Vec<GrepHit>, bool)> {
    let regex = if ignore_case {
        Regex::new(&format!("(?i){pattern}"))
    } else {
        Regex::new(pattern)
    }
    .map_err(|e| crate::error::CoreError::InvalidArgs(format!("invalid grep pattern: {e}")))?;

    let mut hits = Vec::new();
    let mut truncated = false;
    walk(root, &mut |path| {
        if hits.len() >= max_hits {
            truncated = true;
            return;
        }
        let Ok(text) = std::fs::read_to_string(path) else {
            return;
        };
        for (i, line) in text.lines().enumerate() {
            if hits.len() >= max_hits {
                truncated = true;
                break;
            }
            if regex.is_match(line) {
                hits.push(GrepHit {
                    path: path.display().to_string(),
                    line: (i + 1) as u32,
                    preview: line.to_string(),
                });
            }
        }
    });
    Ok((hits, truncated))
}

pub struct GlobFileSearchTool {
    spec: ToolSpec,
}

impl Default for GlobFileSearchTool {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: "glob_file_search",
                category: "search",
                args: &[ArgField::required("pattern", ArgKind::String), ArgField::optional("path", ArgKind::String)],
                risk: RiskLevel::Safe,
                requires_confirm_write: false,
                requires_confirm_exec: false,
                needs_network: false,
                needs_workspace: true,
                cacheable: true,
                deprecated: false,
                open_args: false,
            },
        }
    }
}

impl Tool for GlobFileSearchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn execute(&self, args: &Value, ctx: &mut ToolContext<'_>) -> Result<ToolPayload> {
        let pattern = args["pattern"].as_str().unwrap_or_default();
        let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let resolved = resolve_in_workspace(ctx.workspace_root, std::path::Path::new(path))?;
        let matcher = WildMatch::new(pattern);

        let mut matches = Vec::new();
        walk(&resolved, &mut |candidate| {
            let rel = candidate.strip_prefix(&resolved).unwrap_or(candidate);
            if matcher.matches(&rel.display().to_string()) {
                matches.push(candidate.display().to_string());
            }
        });
        matches.sort();
        Ok(ToolPayload::GlobFileSearch { matches })
    }
}

fn walk(root: &std::path::Path, visit: &mut impl FnMut(&std::path::Path)) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
                continue;
            }
            walk(&path, visit);
        } else {
            visit(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_apply_patch::PatchEngine;
    use crate::cache::ToolResultCache;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn in_process_scan_finds_matches() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "hello\nworld\n").expect("write");
        let (hits, truncated) = in_process_scan("world", dir.path(), false, 10).expect("scan");
        assert!(!truncated);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 2);
    }

    #[test]
    fn glob_file_search_matches_extension() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.rs"), "").expect("write");
        std::fs::write(dir.path().join("b.txt"), "").expect("write");
        let mut engine = PatchEngine::new();
        let mut cache = ToolResultCache::default();
        let tool = GlobFileSearchTool::default();
        let mut ctx = ToolContext::new(dir.path(), &mut engine, &mut cache, 1024);
        let payload = tool.execute(&json!({"pattern": "*.rs"}), &mut ctx).expect("glob");
        match payload {
            ToolPayload::GlobFileSearch { matches } => assert_eq!(matches.len(), 1),
            _ => panic!("wrong payload"),
        }
    }
}
