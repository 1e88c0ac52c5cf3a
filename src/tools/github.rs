//! GitHub pull-request review tools.
//!
//! These tools talk to the GitHub REST API and expect the GitHub
//! Actions environment: `GITHUB_TOKEN`, `GITHUB_REPOSITORY`
//! ("owner/repo"), and `GITHUB_EVENT_PATH` (event JSON carrying the
//! PR number and head SHA). `GITHUB_API_URL` overrides the API base.
//!
//! The environment and event file are read at call time so that
//! tool construction stays side-effect free.

use crate::config::ToolConfig;
use crate::error::{AgentError, AgentResult};
use crate::tools::{Tool, ToolDefinition, ToolResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("agentrun/", env!("CARGO_PKG_VERSION"));

/// Everything needed to address the current pull request.
#[derive(Debug, Clone)]
pub struct PullRequestContext {
    pub token: String,
    pub repository: String,
    pub pr_number: u64,
    pub head_sha: Option<String>,
    pub api_base: String,
}

impl PullRequestContext {
    /// Resolve the context from the GitHub Actions environment.
    pub fn from_env() -> AgentResult<Self> {
        let token = std::env::var("GITHUB_TOKEN").ok();
        let repository = std::env::var("GITHUB_REPOSITORY").ok();
        let event_path = std::env::var("GITHUB_EVENT_PATH").ok();
        let api_base = std::env::var("GITHUB_API_URL").ok();

        Self::from_parts(token, repository, event_path.as_deref(), api_base)
    }

    /// Build a context from explicit values (split out of
    /// `from_env` so tests do not have to mutate the environment).
    fn from_parts(
        token: Option<String>,
        repository: Option<String>,
        event_path: Option<&str>,
        api_base: Option<String>,
    ) -> AgentResult<Self> {
        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AgentError::Auth("GITHUB_TOKEN is not set or empty".to_string()))?;
        let repository = repository.filter(|r| !r.trim().is_empty()).ok_or_else(|| {
            AgentError::config("GITHUB_REPOSITORY is not set (expected 'owner/repo')")
        })?;
        let event_path = event_path
            .ok_or_else(|| AgentError::config("GITHUB_EVENT_PATH is not set"))?;

        let event: Value = serde_json::from_str(
            &std::fs::read_to_string(Path::new(event_path)).map_err(|e| {
                AgentError::config(format!("cannot read event file {}: {}", event_path, e))
            })?,
        )
        .map_err(|e| AgentError::config(format!("invalid event JSON: {}", e)))?;

        let pr_number = pr_number_from_event(&event).ok_or_else(|| {
            AgentError::config("event does not carry a pull request number")
        })?;
        let head_sha = event
            .pointer("/pull_request/head/sha")
            .and_then(|v| v.as_str())
            .map(String::from);

        Ok(Self {
            token,
            repository,
            pr_number,
            head_sha,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_base.trim_end_matches('/'),
            self.repository,
            suffix
        )
    }
}

/// Pull the PR number from a GitHub event payload.
fn pr_number_from_event(event: &Value) -> Option<u64> {
    event
        .pointer("/pull_request/number")
        .and_then(|v| v.as_u64())
        .or_else(|| event.get("number").and_then(|v| v.as_u64()))
}

/// Map an absolute line in the new file to a position within the
/// file's unified diff patch, as the review-comment API expects.
///
/// Positions count context (' ') and added ('+') lines from the
/// start of the patch; removed lines exist only in the old file and
/// are skipped. Returns `None` when the line is not in the patch.
pub fn diff_position(patch: &str, line: u64) -> Option<u64> {
    let mut position = 0u64;
    let mut new_line: Option<u64> = None;

    for raw in patch.lines() {
        if let Some(header) = raw.strip_prefix("@@") {
            new_line = new_start_from_hunk(header);
            continue;
        }

        let counts = raw.starts_with(' ') || raw.starts_with('+');
        if !counts {
            continue;
        }
        if let Some(current) = new_line {
            position += 1;
            if current == line {
                return Some(position);
            }
            new_line = Some(current + 1);
        }
    }

    None
}

/// Extract the new-file start line from a hunk header body, i.e.
/// the `c` of `-a,b +c,d @@`.
fn new_start_from_hunk(header: &str) -> Option<u64> {
    let plus = header.split_whitespace().find(|t| t.starts_with('+'))?;
    plus[1..]
        .split(',')
        .next()
        .and_then(|n| n.parse::<u64>().ok())
}

/// One file of a pull request, as returned by the PR files API.
#[derive(Debug, Deserialize)]
struct PullFile {
    filename: String,
    /// Absent for binary or oversized diffs.
    patch: Option<String>,
}

/// A review comment, flattened to the fields agents care about.
#[derive(Debug, Serialize)]
pub struct ReviewComment {
    pub id: u64,
    pub file: Option<String>,
    pub line: Option<u64>,
    pub body: String,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawReviewComment {
    id: u64,
    path: Option<String>,
    line: Option<u64>,
    original_line: Option<u64>,
    position: Option<u64>,
    original_position: Option<u64>,
    body: String,
    user: Option<RawUser>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

impl From<RawReviewComment> for ReviewComment {
    fn from(raw: RawReviewComment) -> Self {
        ReviewComment {
            id: raw.id,
            file: raw.path,
            line: raw
                .line
                .or(raw.original_line)
                .or(raw.position)
                .or(raw.original_position),
            body: raw.body,
            author: raw.user.map(|u| u.login),
            created_at: raw.created_at,
        }
    }
}

/// Turn a non-success response into the matching error variant.
async fn api_failure(context: &str, response: reqwest::Response) -> AgentError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        AgentError::Auth(format!("{}: GitHub rejected the token ({})", context, status))
    } else {
        AgentError::Api(format!("{}: GitHub API {}: {}", context, status, body))
    }
}

fn network_failure(context: &str, e: reqwest::Error) -> AgentError {
    AgentError::Api(format!("{}: {}", context, e))
}

async fn fetch_pr_files(
    client: &reqwest::Client,
    ctx: &PullRequestContext,
) -> AgentResult<Vec<PullFile>> {
    let url = ctx.url(&format!("pulls/{}/files", ctx.pr_number));
    let response = client
        .get(&url)
        .bearer_auth(&ctx.token)
        .header("Accept", "application/vnd.github+json")
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| network_failure("fetching PR files", e))?;

    if !response.status().is_success() {
        return Err(api_failure("fetching PR files", response).await);
    }
    response
        .json()
        .await
        .map_err(|e| AgentError::Api(format!("decoding PR files: {}", e)))
}

/// Post an inline review comment; fall back to a plain issue
/// comment when no diff position can be computed for the line.
async fn post_review_comment(
    client: &reqwest::Client,
    ctx: &PullRequestContext,
    file: &str,
    line: u64,
    comment: &str,
) -> AgentResult<String> {
    let files = fetch_pr_files(client, ctx).await?;
    let patch = files
        .iter()
        .find(|f| f.filename == file)
        .and_then(|f| f.patch.as_deref());

    let position = patch.and_then(|p| diff_position(p, line));

    if let (Some(position), Some(head_sha)) = (position, ctx.head_sha.as_deref()) {
        let url = ctx.url(&format!("pulls/{}/comments", ctx.pr_number));
        let payload = json!({
            "body": comment,
            "path": file,
            "position": position,
            "commit_id": head_sha,
        });

        let response = client
            .post(&url)
            .bearer_auth(&ctx.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| network_failure("posting review comment", e))?;

        if response.status().is_success() {
            return Ok(format!(
                "Comment added to PR #{}, file {}, line {} (position {})",
                ctx.pr_number, file, line, position
            ));
        }
        warn!(
            "Inline comment rejected ({}), falling back to issue comment",
            response.status()
        );
    } else {
        debug!("No diff position for {}:{}, using issue comment", file, line);
    }

    let url = ctx.url(&format!("issues/{}/comments", ctx.pr_number));
    let fallback = format!("File: {}, line {}\n\n{}", file, line, comment);
    let response = client
        .post(&url)
        .bearer_auth(&ctx.token)
        .header("Accept", "application/vnd.github+json")
        .header("User-Agent", USER_AGENT)
        .json(&json!({ "body": fallback }))
        .send()
        .await
        .map_err(|e| network_failure("posting issue comment", e))?;

    if !response.status().is_success() {
        return Err(api_failure("posting issue comment", response).await);
    }

    Ok(format!(
        "No diff position found for {}:{}; added a general comment to PR #{}",
        file, line, ctx.pr_number
    ))
}

/// List all review comments on the PR as a JSON array.
async fn list_review_comments(
    client: &reqwest::Client,
    ctx: &PullRequestContext,
) -> AgentResult<String> {
    let url = ctx.url(&format!("pulls/{}/comments", ctx.pr_number));
    let response = client
        .get(&url)
        .bearer_auth(&ctx.token)
        .header("Accept", "application/vnd.github+json")
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| network_failure("listing review comments", e))?;

    if !response.status().is_success() {
        return Err(api_failure("listing review comments", response).await);
    }

    let raw: Vec<RawReviewComment> = response
        .json()
        .await
        .map_err(|e| AgentError::Api(format!("decoding review comments: {}", e)))?;

    let comments: Vec<ReviewComment> = raw.into_iter().map(ReviewComment::from).collect();
    serde_json::to_string(&comments)
        .map_err(|e| AgentError::Api(format!("serializing comments: {}", e)))
}

// ---------------------------------------------------------------
// Tool wrappers
// ---------------------------------------------------------------

/// `post_review_comment` tool.
pub struct PostReviewComment {
    client: reqwest::Client,
}

impl PostReviewComment {
    pub fn new(_config: &ToolConfig) -> AgentResult<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl Tool for PostReviewComment {
    fn name(&self) -> &str {
        "post_review_comment"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "post_review_comment",
            "Post a code review comment on the current pull request, inline when the line is part of the diff.",
            json!({
                "type": "object",
                "properties": {
                    "file": {
                        "type": "string",
                        "description": "Repository-relative path of the file to comment on"
                    },
                    "line": {
                        "type": "integer",
                        "description": "1-based line number in the new version of the file"
                    },
                    "comment": {
                        "type": "string",
                        "description": "The review comment text"
                    }
                },
                "required": ["file", "line", "comment"]
            }),
        )
    }

    async fn call(&self, args: &Value) -> Result<ToolResult> {
        let Some(file) = args.get("file").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::error("Missing required parameter: file"));
        };
        let Some(line) = args.get("line").and_then(|v| v.as_u64()).filter(|l| *l > 0) else {
            return Ok(ToolResult::error(
                "The 'line' parameter must be a positive integer",
            ));
        };
        let Some(comment) = args
            .get("comment")
            .and_then(|v| v.as_str())
            .filter(|c| !c.trim().is_empty())
        else {
            return Ok(ToolResult::error(
                "The 'comment' parameter must be a non-empty string",
            ));
        };

        let ctx = match PullRequestContext::from_env() {
            Ok(ctx) => ctx,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        Ok(
            match post_review_comment(&self.client, &ctx, file, line, comment).await {
                Ok(message) => ToolResult::success(message),
                Err(e) => ToolResult::error(e.to_string()),
            },
        )
    }
}

/// `list_review_comments` tool.
pub struct ListReviewComments {
    client: reqwest::Client,
}

impl ListReviewComments {
    pub fn new(_config: &ToolConfig) -> AgentResult<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl Tool for ListReviewComments {
    fn name(&self) -> &str {
        "list_review_comments"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "list_review_comments",
            "List all review comments on the current pull request as a JSON array of {id, file, line, body, author, created_at}.",
            json!({"type": "object", "properties": {}, "required": []}),
        )
    }

    async fn call(&self, _args: &Value) -> Result<ToolResult> {
        let ctx = match PullRequestContext::from_env() {
            Ok(ctx) => ctx,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        Ok(match list_review_comments(&self.client, &ctx).await {
            Ok(body) => ToolResult::success(body),
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}
