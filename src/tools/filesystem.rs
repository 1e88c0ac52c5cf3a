//! Filesystem tools confined to a configured working directory.
//!
//! Every tool in this module is bound to a [`Workspace`]: a root
//! directory the tool may not leave, a set of deny globs, and a
//! byte ceiling for reads. Escaping the workdir or touching a
//! denied path is reported to the model as a tool error, never as
//! a crash.

use crate::config::ToolConfig;
use crate::error::{AgentError, AgentResult};
use crate::tools::{Tool, ToolDefinition, ToolResult};
use anyhow::Result;
use async_trait::async_trait;
use glob::Pattern;
use serde_json::{json, Value};
use std::fs;
use std::io::BufRead;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Cap on entries returned by `list_directory`.
const MAX_DIR_ENTRIES: usize = 500;

/// Default cap on matches returned by `search_in_files`.
const DEFAULT_MAX_MATCHES: usize = 50;

/// Confinement policy shared by the filesystem tools.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    deny: Vec<Pattern>,
    max_bytes: u64,
}

impl Workspace {
    /// Bind a workspace from a tool config. Compiles the deny
    /// globs; performs no filesystem access.
    pub fn new(config: &ToolConfig) -> AgentResult<Self> {
        let mut deny = Vec::with_capacity(config.deny.len());
        for pattern in &config.deny {
            let compiled = Pattern::new(pattern).map_err(|e| {
                AgentError::config(format!("invalid deny pattern '{}': {}", pattern, e))
            })?;
            deny.push(compiled);
        }

        Ok(Self {
            root: PathBuf::from(&config.workdir),
            deny,
            max_bytes: config.max_bytes,
        })
    }

    /// Resolve a relative path inside the workspace.
    ///
    /// Existing paths are canonicalized so symlinks cannot escape;
    /// paths that do not exist yet (write targets) are normalized
    /// lexically before the prefix check.
    fn resolve(&self, rel: &str) -> AgentResult<PathBuf> {
        let candidate = self.root.join(rel);

        let canonical_root = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        let resolved = match fs::canonicalize(&candidate) {
            Ok(p) => p,
            Err(_) => normalize_lexically(&canonical_root.join(rel)),
        };

        if !resolved.starts_with(&canonical_root) {
            return Err(AgentError::PermissionDenied(format!(
                "path is outside the working directory: {}",
                rel
            )));
        }

        if self.is_denied(&resolved, &canonical_root) {
            return Err(AgentError::PermissionDenied(format!(
                "path is excluded by deny policy: {}",
                rel
            )));
        }

        Ok(resolved)
    }

    /// Check a resolved path against the deny globs. Patterns are
    /// matched against both the root-relative path and the bare
    /// file name.
    fn is_denied(&self, path: &Path, canonical_root: &Path) -> bool {
        let rel = path.strip_prefix(canonical_root).unwrap_or(path);
        let rel_str = rel.to_string_lossy();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        self.deny
            .iter()
            .any(|p| p.matches(&rel_str) || p.matches(&name))
    }

    /// List entry names in a directory, sorted, directories marked
    /// with a trailing slash. An empty directory yields an empty
    /// list, not an error. Listings over the entry cap are cut
    /// after sorting and end with a truncation marker.
    pub fn list_directory(&self, rel: &str) -> AgentResult<Vec<String>> {
        let dir = self.resolve(rel)?;

        if !dir.exists() {
            return Err(AgentError::NotFound(format!("directory: {}", rel)));
        }
        if !dir.is_dir() {
            return Err(AgentError::NotFound(format!("not a directory: {}", rel)));
        }

        let canonical_root = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        let mut entries = Vec::new();

        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if self.is_denied(&path, &canonical_root) {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            let suffix = if path.is_dir() { "/" } else { "" };
            entries.push(format!("{}{}", name, suffix));
        }

        entries.sort();
        if entries.len() > MAX_DIR_ENTRIES {
            entries.truncate(MAX_DIR_ENTRIES);
            entries.push("... (output truncated)".to_string());
        }
        Ok(entries)
    }

    /// Read a file, optionally sliced to an inclusive 1-based line
    /// range. Without a line range the configured byte ceiling
    /// applies (overridable per call).
    pub fn read_file(
        &self,
        rel: &str,
        start_line: Option<u64>,
        end_line: Option<u64>,
        max_bytes: Option<u64>,
    ) -> AgentResult<String> {
        let path = self.resolve(rel)?;

        if !path.exists() {
            return Err(AgentError::NotFound(format!("file: {}", rel)));
        }
        if path.is_dir() {
            return Err(AgentError::NotFound(format!(
                "path is a directory, not a file: {}",
                rel
            )));
        }

        let limit = max_bytes.unwrap_or(self.max_bytes);
        let size = fs::metadata(&path)?.len();

        if start_line.is_none() && end_line.is_none() {
            if size > limit {
                return Err(AgentError::SizeLimit {
                    path: rel.to_string(),
                    size,
                    limit,
                });
            }
            let bytes = fs::read(&path).map_err(|e| map_io(e, rel))?;
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }

        // Line range: stream so the cost is bounded by end_line,
        // not by the file size.
        let file = fs::File::open(&path).map_err(|e| map_io(e, rel))?;
        let mut reader = std::io::BufReader::new(file);

        let start = start_line.unwrap_or(1).max(1);
        let end = end_line.unwrap_or(u64::MAX);

        let mut selected = Vec::new();
        let mut buf = Vec::new();
        let mut lineno = 0u64;
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| map_io(e, rel))?;
            if n == 0 {
                break;
            }
            lineno += 1;
            if lineno > end {
                break;
            }
            if lineno < start {
                continue;
            }
            let line = String::from_utf8_lossy(&buf);
            selected.push(line.trim_end_matches(&['\n', '\r'][..]).to_string());
        }

        Ok(selected.join("\n"))
    }

    /// Create or overwrite a file inside the workspace.
    pub fn write_file(&self, rel: &str, content: &str) -> AgentResult<()> {
        let path = self.resolve(rel)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| map_io(e, rel))?;
        }
        fs::write(&path, content).map_err(|e| map_io(e, rel))?;

        debug!("Wrote {} bytes to {}", content.len(), rel);
        Ok(())
    }

    /// Read a file and pair it with a display-language hint.
    pub fn view_file(&self, rel: &str) -> AgentResult<(String, &'static str)> {
        let content = self.read_file(rel, None, None, None)?;
        Ok((content, language_hint(Path::new(rel))))
    }

    /// Lazily search files under `rel` for lines containing
    /// `query`. The returned iterator is finite (capped at
    /// `max_matches`) and restartable: calling this method again
    /// walks the tree from scratch.
    pub fn search_in_files(
        &self,
        rel: &str,
        query: &str,
        file_glob: Option<&str>,
        max_matches: usize,
    ) -> AgentResult<SearchHits> {
        let dir = self.resolve(rel)?;
        if !dir.exists() {
            return Err(AgentError::NotFound(format!("directory: {}", rel)));
        }
        if !dir.is_dir() {
            return Err(AgentError::NotFound(format!("not a directory: {}", rel)));
        }

        let glob = match file_glob {
            Some(g) => Some(Pattern::new(g).map_err(|e| {
                AgentError::config(format!("invalid file glob '{}': {}", g, e))
            })?),
            None => None,
        };

        let canonical_root = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());

        Ok(SearchHits {
            workspace: self.clone(),
            canonical_root,
            walker: WalkDir::new(dir).into_iter(),
            pending: Vec::new(),
            query: query.to_string(),
            glob,
            remaining: max_matches,
            max_bytes: self.max_bytes,
        })
    }
}

/// One search hit: file (root-relative), 1-based line number, and
/// the matched line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub file: String,
    pub line: u64,
    pub text: String,
}

/// Lazy iterator over search hits. Files are read one at a time as
/// the walk advances; dropping the iterator stops the walk.
pub struct SearchHits {
    workspace: Workspace,
    canonical_root: PathBuf,
    walker: walkdir::IntoIter,
    pending: Vec<SearchMatch>,
    query: String,
    glob: Option<Pattern>,
    remaining: usize,
    max_bytes: u64,
}

impl SearchHits {
    fn scan_file(&self, path: &Path) -> Vec<SearchMatch> {
        // Unreadable or binary-looking files are skipped silently.
        if fs::metadata(path).map(|m| m.len() > self.max_bytes).unwrap_or(true) {
            return Vec::new();
        }
        let Ok(bytes) = fs::read(path) else {
            return Vec::new();
        };
        let content = String::from_utf8_lossy(&bytes);

        let rel = path
            .strip_prefix(&self.canonical_root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains(&self.query))
            .map(|(i, line)| SearchMatch {
                file: rel.clone(),
                line: (i as u64) + 1,
                text: line.trim().to_string(),
            })
            .collect()
    }
}

impl Iterator for SearchHits {
    type Item = SearchMatch;

    fn next(&mut self) -> Option<SearchMatch> {
        loop {
            if self.remaining == 0 {
                return None;
            }
            if !self.pending.is_empty() {
                self.remaining -= 1;
                return Some(self.pending.remove(0));
            }

            let entry = loop {
                match self.walker.next()? {
                    Ok(e) => break e,
                    Err(_) => continue,
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if self.workspace.is_denied(path, &self.canonical_root) {
                continue;
            }
            if let Some(ref glob) = self.glob {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if !glob.matches(&name) {
                    continue;
                }
            }

            self.pending = self.scan_file(path);
        }
    }
}

/// Map an IO error to the crate taxonomy, keeping the path.
fn map_io(e: std::io::Error, rel: &str) -> AgentError {
    match e.kind() {
        std::io::ErrorKind::NotFound => AgentError::NotFound(format!("file: {}", rel)),
        std::io::ErrorKind::PermissionDenied => {
            AgentError::PermissionDenied(format!("{}: {}", rel, e))
        }
        _ => AgentError::Io(e),
    }
}

/// Normalize a path lexically: strip `.` and fold `..` without
/// touching the filesystem. Used for paths that do not exist yet.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Display-language hint from a file extension.
fn language_hint(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" => "cpp",
        "rb" => "ruby",
        "sh" | "bash" => "shell",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "json" => "json",
        "md" => "markdown",
        "html" => "html",
        "css" => "css",
        "sql" => "sql",
        _ => "text",
    }
}

// ---------------------------------------------------------------
// Tool wrappers
// ---------------------------------------------------------------

/// `list_directory` tool.
pub struct ListDirectory {
    workspace: Workspace,
}

impl ListDirectory {
    pub fn new(config: &ToolConfig) -> AgentResult<Self> {
        Ok(Self {
            workspace: Workspace::new(config)?,
        })
    }
}

#[async_trait]
impl Tool for ListDirectory {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "list_directory",
            "List directory contents within the working directory. Directories end with '/'.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path relative to the working directory. Use '.' for the root."
                    }
                },
                "required": []
            }),
        )
    }

    async fn call(&self, args: &Value) -> Result<ToolResult> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");

        Ok(match self.workspace.list_directory(path) {
            Ok(entries) => ToolResult::success(entries.join("\n")),
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}

/// `read_file` tool.
pub struct ReadFile {
    workspace: Workspace,
}

impl ReadFile {
    pub fn new(config: &ToolConfig) -> AgentResult<Self> {
        Ok(Self {
            workspace: Workspace::new(config)?,
        })
    }
}

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "read_file",
            "Read a file within the working directory, optionally sliced to a 1-based inclusive line range.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the working directory"
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "First line to read (1-based, optional)"
                    },
                    "end_line": {
                        "type": "integer",
                        "description": "Last line to read (inclusive, optional)"
                    },
                    "max_bytes": {
                        "type": "integer",
                        "description": "Override the configured read size limit"
                    }
                },
                "required": ["path"]
            }),
        )
    }

    async fn call(&self, args: &Value) -> Result<ToolResult> {
        let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::error("Missing required parameter: path"));
        };
        let start_line = args.get("start_line").and_then(|v| v.as_u64());
        let end_line = args.get("end_line").and_then(|v| v.as_u64());
        let max_bytes = args.get("max_bytes").and_then(|v| v.as_u64());

        Ok(
            match self.workspace.read_file(path, start_line, end_line, max_bytes) {
                Ok(content) => ToolResult::success(content),
                Err(e) => ToolResult::error(e.to_string()),
            },
        )
    }
}

/// `write_file` tool.
pub struct WriteFile {
    workspace: Workspace,
}

impl WriteFile {
    pub fn new(config: &ToolConfig) -> AgentResult<Self> {
        Ok(Self {
            workspace: Workspace::new(config)?,
        })
    }
}

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "write_file",
            "Create or overwrite a file within the working directory.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the working directory"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full content to write"
                    }
                },
                "required": ["path", "content"]
            }),
        )
    }

    async fn call(&self, args: &Value) -> Result<ToolResult> {
        let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::error("Missing required parameter: path"));
        };
        let Some(content) = args.get("content").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::error("Missing required parameter: content"));
        };

        Ok(match self.workspace.write_file(path, content) {
            Ok(()) => ToolResult::success(format!("Wrote {} bytes to {}", content.len(), path)),
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}

/// `view_file` tool.
pub struct ViewFile {
    workspace: Workspace,
}

impl ViewFile {
    pub fn new(config: &ToolConfig) -> AgentResult<Self> {
        Ok(Self {
            workspace: Workspace::new(config)?,
        })
    }
}

#[async_trait]
impl Tool for ViewFile {
    fn name(&self) -> &str {
        "view_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "view_file",
            "Read a file and return its content in a fenced block with a language hint for display.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the working directory"
                    }
                },
                "required": ["path"]
            }),
        )
    }

    async fn call(&self, args: &Value) -> Result<ToolResult> {
        let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::error("Missing required parameter: path"));
        };

        Ok(match self.workspace.view_file(path) {
            Ok((content, lang)) => {
                ToolResult::success(format!("{}:\n```{}\n{}\n```", path, lang, content))
            }
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}

/// `search_in_files` tool.
pub struct SearchInFiles {
    workspace: Workspace,
}

impl SearchInFiles {
    pub fn new(config: &ToolConfig) -> AgentResult<Self> {
        Ok(Self {
            workspace: Workspace::new(config)?,
        })
    }
}

#[async_trait]
impl Tool for SearchInFiles {
    fn name(&self) -> &str {
        "search_in_files"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "search_in_files",
            "Search for text within files under a directory. Returns 'file:line: matched line' entries.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Text to search for"
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory relative to the working directory (default '.')"
                    },
                    "file_glob": {
                        "type": "string",
                        "description": "Optional file name pattern, e.g. '*.rs'"
                    },
                    "max_matches": {
                        "type": "integer",
                        "description": "Maximum number of matches to return (default 50)"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn call(&self, args: &Value) -> Result<ToolResult> {
        let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::error("Missing required parameter: query"));
        };
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let file_glob = args.get("file_glob").and_then(|v| v.as_str());
        let max_matches = args
            .get("max_matches")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_MATCHES);

        let hits = match self.workspace.search_in_files(path, query, file_glob, max_matches) {
            Ok(hits) => hits,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        let lines: Vec<String> = hits
            .map(|m| format!("{}:{}: {}", m.file, m.line, m.text))
            .collect();

        Ok(if lines.is_empty() {
            ToolResult::success(format!("No matches for '{}' in {}", query, path))
        } else {
            ToolResult::success(lines.join("\n"))
        })
    }
}
