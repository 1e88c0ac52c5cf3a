//! Error types shared across the crate.
//!
//! Every failure class that can abort a run has its own variant so
//! the CLI can map errors to exit codes without string matching.

use thiserror::Error;

/// Errors surfaced by configuration loading, tool construction,
/// tool execution, and the agent runner.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Agent YAML is missing, unreadable, malformed, or incomplete.
    #[error("Invalid agent configuration: {0}")]
    Config(String),

    /// A declared tool spec has no registered builder.
    #[error("Unsupported tool '{name}' for type '{kind}'")]
    UnsupportedTool { kind: String, name: String },

    /// A path passed to a filesystem tool does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Access denied, either by the OS or by workdir/deny policy.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A file exceeds the configured byte ceiling.
    #[error("File too large ({size} bytes, limit {limit} bytes): {path}")]
    SizeLimit {
        path: String,
        size: u64,
        limit: u64,
    },

    /// The git executable failed or the directory is not a repository.
    #[error("Git error: {0}")]
    Git(String),

    /// Missing or rejected credentials (API key, GitHub token).
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Upstream HTTP API failure (non-2xx response, network, decode).
    #[error("API error: {0}")]
    Api(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create a configuration error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        AgentError::Config(msg.into())
    }

    /// Exit code for this error class.
    ///
    /// Usage, configuration, and credential problems exit with 2;
    /// runtime failures exit with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentError::Config(_)
            | AgentError::UnsupportedTool { .. }
            | AgentError::Auth(_) => 2,
            _ => 1,
        }
    }
}

/// Result type alias for crate operations.
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::UnsupportedTool {
            kind: "nonexistent".into(),
            name: "list_directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported tool 'list_directory' for type 'nonexistent'"
        );

        let err = AgentError::SizeLimit {
            path: "big.bin".into(),
            size: 1000,
            limit: 10,
        };
        assert!(err.to_string().contains("1000 bytes"));
        assert!(err.to_string().contains("big.bin"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(AgentError::config("bad yaml").exit_code(), 2);
        assert_eq!(
            AgentError::Auth("OPENAI_API_KEY is not set".into()).exit_code(),
            2
        );
        assert_eq!(AgentError::Git("non-zero exit".into()).exit_code(), 1);
        assert_eq!(AgentError::NotFound("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AgentError = io_err.into();
        assert!(matches!(err, AgentError::Io(_)));
    }
}
