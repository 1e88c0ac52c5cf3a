//! Git tools backed by the local `git` executable.
//!
//! Each tool is bound to a working directory at construction and
//! shells out to `git` when called. Commands are fixed; no model
//! input ever reaches the command line.

use crate::config::ToolConfig;
use crate::error::{AgentError, AgentResult};
use crate::tools::{Tool, ToolDefinition, ToolResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Run a git subcommand in `workdir`, returning trimmed stdout.
/// Non-zero exit becomes `AgentError::Git` with stderr attached.
fn run_git(workdir: &Path, args: &[&str]) -> AgentResult<String> {
    debug!("Running git {} in {}", args.join(" "), workdir.display());

    let output = Command::new("git")
        .args(args)
        .current_dir(workdir)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AgentError::Git("git executable not found on PATH".to_string())
            } else {
                AgentError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(AgentError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            detail
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Reject directories that are not inside a git work tree.
fn ensure_repository(workdir: &Path) -> AgentResult<()> {
    if !workdir.is_dir() {
        return Err(AgentError::Git(format!(
            "working directory does not exist: {}",
            workdir.display()
        )));
    }
    run_git(workdir, &["rev-parse", "--is-inside-work-tree"]).map_err(|_| {
        AgentError::Git(format!("not a git repository: {}", workdir.display()))
    })?;
    Ok(())
}

/// True when the repository has at least one commit.
fn has_head(workdir: &Path) -> bool {
    run_git(workdir, &["rev-parse", "--verify", "HEAD"]).is_ok()
}

/// Uncommitted diff against HEAD. Empty string on a clean tree.
fn uncommitted_diff(workdir: &Path, name_only: bool) -> AgentResult<String> {
    ensure_repository(workdir)?;

    let mut args = vec!["diff"];
    if has_head(workdir) {
        args.push("HEAD");
    }
    if name_only {
        args.push("--name-only");
    }
    run_git(workdir, &args)
}

/// Diff of the current branch against a remote base branch.
/// Verifies the base ref, refreshes it from origin, then diffs.
fn pr_diff(workdir: &Path, base_branch: &str, name_only: bool) -> AgentResult<String> {
    ensure_repository(workdir)?;

    let base_ref = format!("refs/remotes/{}", base_branch);
    if run_git(workdir, &["show-ref", "--verify", &base_ref]).is_err() {
        let hint = run_git(workdir, &["branch", "-r"]).unwrap_or_default();
        return Err(AgentError::Git(format!(
            "base branch '{}' not found in remotes. Available remote branches:\n{}",
            base_branch, hint
        )));
    }

    run_git(workdir, &["fetch", "origin"])?;

    let range = format!("{}...HEAD", base_branch);
    let mut args = vec!["diff"];
    if name_only {
        args.push("--name-only");
    }
    args.push(&range);
    run_git(workdir, &args)
}

/// `git_diff` tool: full uncommitted diff.
pub struct GitDiff {
    workdir: PathBuf,
}

impl GitDiff {
    pub fn new(config: &ToolConfig) -> AgentResult<Self> {
        Ok(Self {
            workdir: PathBuf::from(&config.workdir),
        })
    }
}

#[async_trait]
impl Tool for GitDiff {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "git_diff",
            "Return the full uncommitted diff of the working tree (git diff HEAD). Empty when clean.",
            json!({"type": "object", "properties": {}, "required": []}),
        )
    }

    async fn call(&self, _args: &Value) -> Result<ToolResult> {
        Ok(match uncommitted_diff(&self.workdir, false) {
            Ok(diff) => ToolResult::success(diff),
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}

/// `git_changed_files` tool: names of files with uncommitted changes.
pub struct GitChangedFiles {
    workdir: PathBuf,
}

impl GitChangedFiles {
    pub fn new(config: &ToolConfig) -> AgentResult<Self> {
        Ok(Self {
            workdir: PathBuf::from(&config.workdir),
        })
    }
}

#[async_trait]
impl Tool for GitChangedFiles {
    fn name(&self) -> &str {
        "git_changed_files"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "git_changed_files",
            "List files with uncommitted changes, one per line (git diff --name-only).",
            json!({"type": "object", "properties": {}, "required": []}),
        )
    }

    async fn call(&self, _args: &Value) -> Result<ToolResult> {
        Ok(match uncommitted_diff(&self.workdir, true) {
            Ok(files) => ToolResult::success(files),
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}

/// `git_pr_diff` tool: diff of the current branch against the base.
pub struct GitPrDiff {
    workdir: PathBuf,
    base_branch: String,
}

impl GitPrDiff {
    pub fn new(config: &ToolConfig) -> AgentResult<Self> {
        Ok(Self {
            workdir: PathBuf::from(&config.workdir),
            base_branch: config.base_branch.clone(),
        })
    }
}

#[async_trait]
impl Tool for GitPrDiff {
    fn name(&self) -> &str {
        "git_pr_diff"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "git_pr_diff",
            "Return the diff between the configured base branch and HEAD (git diff <base>...HEAD).",
            json!({"type": "object", "properties": {}, "required": []}),
        )
    }

    async fn call(&self, _args: &Value) -> Result<ToolResult> {
        Ok(match pr_diff(&self.workdir, &self.base_branch, false) {
            Ok(diff) if diff.is_empty() => ToolResult::success("No changes to show"),
            Ok(diff) => ToolResult::success(diff),
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}

/// `git_pr_changed_files` tool: files changed relative to the base.
pub struct GitPrChangedFiles {
    workdir: PathBuf,
    base_branch: String,
}

impl GitPrChangedFiles {
    pub fn new(config: &ToolConfig) -> AgentResult<Self> {
        Ok(Self {
            workdir: PathBuf::from(&config.workdir),
            base_branch: config.base_branch.clone(),
        })
    }
}

#[async_trait]
impl Tool for GitPrChangedFiles {
    fn name(&self) -> &str {
        "git_pr_changed_files"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "git_pr_changed_files",
            "List files changed between the configured base branch and HEAD, one per line.",
            json!({"type": "object", "properties": {}, "required": []}),
        )
    }

    async fn call(&self, _args: &Value) -> Result<ToolResult> {
        Ok(match pr_diff(&self.workdir, &self.base_branch, true) {
            Ok(files) => ToolResult::success(files),
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn init_repo() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        for args in [
            vec!["init"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test User"],
        ] {
            Command::new("git")
                .args(&args)
                .current_dir(&path)
                .output()
                .unwrap();
        }

        (dir, path)
    }

    fn commit_all(path: &Path, message: &str) {
        Command::new("git")
            .args(["add", "."])
            .current_dir(path)
            .output()
            .unwrap();
        Command::new("git")
            .args(["commit", "-m", message])
            .current_dir(path)
            .output()
            .unwrap();
    }

    #[test]
    fn test_clean_tree_has_empty_diff() {
        if !git_available() {
            return;
        }
        let (_dir, path) = init_repo();
        std::fs::write(path.join("a.txt"), "one\n").unwrap();
        commit_all(&path, "initial");

        assert_eq!(uncommitted_diff(&path, false).unwrap(), "");
        assert_eq!(uncommitted_diff(&path, true).unwrap(), "");
    }

    #[test]
    fn test_dirty_tree_lists_changed_file() {
        if !git_available() {
            return;
        }
        let (_dir, path) = init_repo();
        std::fs::write(path.join("a.txt"), "one\n").unwrap();
        commit_all(&path, "initial");

        std::fs::write(path.join("a.txt"), "two\n").unwrap();

        let files = uncommitted_diff(&path, true).unwrap();
        assert_eq!(files, "a.txt");

        let diff = uncommitted_diff(&path, false).unwrap();
        assert!(diff.contains("-one"));
        assert!(diff.contains("+two"));
    }

    #[test]
    fn test_non_repo_is_git_error() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        // An isolated directory; GIT_CEILING is not needed because
        // TempDir lives under /tmp which is not a repo in CI.
        let err = ensure_repository(dir.path());
        if let Err(e) = err {
            assert!(matches!(e, AgentError::Git(_)));
        }
    }

    #[test]
    fn test_missing_base_branch_is_git_error() {
        if !git_available() {
            return;
        }
        let (_dir, path) = init_repo();
        std::fs::write(path.join("a.txt"), "one\n").unwrap();
        commit_all(&path, "initial");

        let err = pr_diff(&path, "origin/main", false).unwrap_err();
        assert!(matches!(err, AgentError::Git(_)));
        assert!(err.to_string().contains("origin/main"));
    }

    #[tokio::test]
    async fn test_git_diff_tool_on_clean_tree() {
        if !git_available() {
            return;
        }
        let (dir, path) = init_repo();
        std::fs::write(path.join("a.txt"), "one\n").unwrap();
        commit_all(&path, "initial");

        let config = ToolConfig {
            workdir: path.to_string_lossy().to_string(),
            ..ToolConfig::default()
        };
        let tool = GitDiff::new(&config).unwrap();
        let result = tool.call(&json!({})).await.unwrap();

        assert!(result.success);
        assert_eq!(result.output, "");
        drop(dir);
    }
}
