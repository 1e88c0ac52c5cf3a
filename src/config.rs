//! Agent definition file handling.
//!
//! An agent is described by a YAML document with an `id`, a
//! `description` (used verbatim as the system prompt), and a list
//! of tool specs:
//!
//! ```yaml
//! id: code_reviewer
//! description: You are a careful code reviewer...
//! tools:
//!   - name: read_file
//!     type: filesystem
//!     config:
//!       workdir: .
//!       deny: ["*.pyc", "target"]
//! ```

use crate::error::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A fully loaded agent definition. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSpec {
    /// Short identifier, used in logs.
    pub id: String,

    /// System prompt handed to the model.
    pub description: String,

    /// Tools the agent may call, in declaration order.
    pub tools: Vec<ToolSpec>,
}

/// Declaration of one tool instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSpec {
    /// Tool name, unique within an agent (e.g. `read_file`).
    pub name: String,

    /// Tool family: `filesystem`, `git`, or `github`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Per-tool configuration. Missing keys take defaults.
    #[serde(default)]
    pub config: ToolConfig,
}

/// Configuration bound into a tool at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Directory the tool is confined to.
    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// Glob patterns for paths the tool must not touch.
    #[serde(default)]
    pub deny: Vec<String>,

    /// Byte ceiling for file reads.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Base branch for PR diff tools.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            deny: Vec::new(),
            max_bytes: default_max_bytes(),
            base_branch: default_base_branch(),
        }
    }
}

fn default_workdir() -> String {
    ".".to_string()
}

fn default_max_bytes() -> u64 {
    200_000
}

fn default_base_branch() -> String {
    "origin/main".to_string()
}

impl AgentSpec {
    /// Load and validate an agent definition from a YAML file.
    pub fn load(path: &Path) -> AgentResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse(&content)
            .map_err(|e| AgentError::config(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate an agent definition from YAML text.
    ///
    /// Returns a plain message (without the file path) so `load`
    /// can prefix it.
    pub fn parse(content: &str) -> Result<Self, String> {
        let spec: AgentSpec =
            serde_yaml::from_str(content).map_err(|e| format!("invalid YAML: {}", e))?;
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("'id' must be a non-empty string".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("'description' must be a non-empty string".to_string());
        }
        if self.tools.is_empty() {
            return Err("'tools' must declare at least one tool".to_string());
        }

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err("every tool needs a non-empty 'name'".to_string());
            }
            if tool.kind.trim().is_empty() {
                return Err(format!("tool '{}' needs a non-empty 'type'", tool.name));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(format!("duplicate tool name '{}'", tool.name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
id: reviewer
description: You review pull requests.
tools:
  - name: list_directory
    type: filesystem
    config:
      workdir: ./src
      deny: ["*.lock"]
  - name: git_diff
    type: git
"#;

    #[test]
    fn test_parse_valid_spec() {
        let spec = AgentSpec::parse(VALID).unwrap();
        assert_eq!(spec.id, "reviewer");
        assert_eq!(spec.tools.len(), 2);
        assert_eq!(spec.tools[0].kind, "filesystem");
        assert_eq!(spec.tools[0].config.workdir, "./src");
        assert_eq!(spec.tools[0].config.deny, vec!["*.lock"]);
        // Defaults fill in omitted config.
        assert_eq!(spec.tools[1].config.workdir, ".");
        assert_eq!(spec.tools[1].config.max_bytes, 200_000);
        assert_eq!(spec.tools[1].config.base_branch, "origin/main");
    }

    #[test]
    fn test_missing_tools_is_config_error() {
        let yaml = "id: a\ndescription: b\n";
        assert!(AgentSpec::parse(yaml).is_err());
    }

    #[test]
    fn test_empty_tools_rejected() {
        let yaml = "id: a\ndescription: b\ntools: []\n";
        let err = AgentSpec::parse(yaml).unwrap_err();
        assert!(err.contains("at least one tool"));
    }

    #[test]
    fn test_missing_id_rejected() {
        let yaml = "description: b\ntools:\n  - name: t\n    type: filesystem\n";
        assert!(AgentSpec::parse(yaml).is_err());
    }

    #[test]
    fn test_blank_description_rejected() {
        let yaml = "id: a\ndescription: \"  \"\ntools:\n  - name: t\n    type: filesystem\n";
        let err = AgentSpec::parse(yaml).unwrap_err();
        assert!(err.contains("description"));
    }

    #[test]
    fn test_duplicate_tool_names_rejected() {
        let yaml = r#"
id: a
description: b
tools:
  - name: read_file
    type: filesystem
  - name: read_file
    type: filesystem
"#;
        let err = AgentSpec::parse(yaml).unwrap_err();
        assert!(err.contains("duplicate tool name"));
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        let err = AgentSpec::parse("id: [unclosed").unwrap_err();
        assert!(err.contains("invalid YAML"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AgentSpec::load(Path::new("/nonexistent/agent.yaml")).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
