//! Tool registry and construction.
//!
//! Maps the `(type, name)` pair of a tool spec onto a concrete tool.
//! Every spec must resolve here before the run touches the network,
//! so a typo in the agent file fails fast with `UnsupportedTool`.

use crate::config::{ToolConfig, ToolSpec};
use crate::error::{AgentError, AgentResult};
use crate::tools::{filesystem, git, github, Tool};
use tracing::debug;

type Builder = fn(&ToolConfig) -> AgentResult<Box<dyn Tool>>;

fn builder_for(kind: &str, name: &str) -> Option<Builder> {
    match (kind, name) {
        ("filesystem", "list_directory") => {
            Some(|c| Ok(Box::new(filesystem::ListDirectory::new(c)?)))
        }
        ("filesystem", "read_file") => Some(|c| Ok(Box::new(filesystem::ReadFile::new(c)?))),
        ("filesystem", "write_file") => Some(|c| Ok(Box::new(filesystem::WriteFile::new(c)?))),
        ("filesystem", "view_file") => Some(|c| Ok(Box::new(filesystem::ViewFile::new(c)?))),
        ("filesystem", "search_in_files") => {
            Some(|c| Ok(Box::new(filesystem::SearchInFiles::new(c)?)))
        }
        ("git", "git_diff") => Some(|c| Ok(Box::new(git::GitDiff::new(c)?))),
        ("git", "git_changed_files") => Some(|c| Ok(Box::new(git::GitChangedFiles::new(c)?))),
        ("git", "git_pr_diff") => Some(|c| Ok(Box::new(git::GitPrDiff::new(c)?))),
        ("git", "git_pr_changed_files") => {
            Some(|c| Ok(Box::new(git::GitPrChangedFiles::new(c)?)))
        }
        ("github", "post_review_comment") => {
            Some(|c| Ok(Box::new(github::PostReviewComment::new(c)?)))
        }
        ("github", "list_review_comments") => {
            Some(|c| Ok(Box::new(github::ListReviewComments::new(c)?)))
        }
        _ => None,
    }
}

/// Build one tool from its spec.
pub fn build(spec: &ToolSpec) -> AgentResult<Box<dyn Tool>> {
    let builder = builder_for(&spec.kind, &spec.name).ok_or_else(|| {
        AgentError::UnsupportedTool {
            kind: spec.kind.clone(),
            name: spec.name.clone(),
        }
    })?;
    debug!("Building tool {} ({})", spec.name, spec.kind);
    builder(&spec.config)
}

/// Build every tool an agent declares, in declaration order.
///
/// Fails on the first unresolvable or misconfigured spec; no tool
/// performs I/O during construction.
pub fn build_tools(specs: &[ToolSpec]) -> AgentResult<Vec<Box<dyn Tool>>> {
    specs.iter().map(build).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, kind: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            kind: kind.to_string(),
            config: ToolConfig::default(),
        }
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        // map(|_| ()) because Box<dyn Tool> has no Debug impl.
        let err = build(&spec("read_file", "database")).map(|_| ()).unwrap_err();
        match err {
            AgentError::UnsupportedTool { kind, name } => {
                assert_eq!(kind, "database");
                assert_eq!(name, "read_file");
            }
            other => panic!("expected UnsupportedTool, got {other}"),
        }
    }

    #[test]
    fn test_known_type_unknown_name_is_unsupported() {
        let err = build(&spec("delete_everything", "filesystem"))
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedTool { .. }));
    }

    #[test]
    fn test_builds_all_registered_tools() {
        let names = [
            ("list_directory", "filesystem"),
            ("read_file", "filesystem"),
            ("write_file", "filesystem"),
            ("view_file", "filesystem"),
            ("search_in_files", "filesystem"),
            ("git_diff", "git"),
            ("git_changed_files", "git"),
            ("git_pr_diff", "git"),
            ("git_pr_changed_files", "git"),
            ("post_review_comment", "github"),
            ("list_review_comments", "github"),
        ];

        let specs: Vec<ToolSpec> = names.iter().map(|(n, k)| spec(n, k)).collect();
        let tools = build_tools(&specs).unwrap();

        assert_eq!(tools.len(), names.len());
        for (tool, (name, _)) in tools.iter().zip(names.iter()) {
            assert_eq!(tool.name(), *name);
        }
    }

    #[test]
    fn test_construction_does_no_io() {
        // A workdir that does not exist must not fail construction;
        // the error surfaces on the first call instead.
        let mut s = spec("read_file", "filesystem");
        s.config.workdir = "/definitely/not/a/real/path".to_string();
        assert!(build(&s).is_ok());
    }

    #[test]
    fn test_build_order_matches_declaration() {
        let specs = vec![spec("git_diff", "git"), spec("read_file", "filesystem")];
        let tools = build_tools(&specs).unwrap();
        assert_eq!(tools[0].name(), "git_diff");
        assert_eq!(tools[1].name(), "read_file");
    }
}
