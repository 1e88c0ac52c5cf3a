//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::io::IsTerminal;
use std::io::Read;
use std::path::PathBuf;

/// agentrun - run a YAML-defined LLM agent against a repository
///
/// Load an agent definition (system prompt + tools) from a YAML file
/// and drive one natural-language request through an OpenAI-compatible
/// chat API with tool calling.
///
/// Examples:
///   agentrun --agent agents/reviewer.yaml "Review the open changes"
///   git diff | agentrun --agent agents/reviewer.yaml
///   agentrun --agent agents/reviewer.yaml --model gpt-4o "Summarize src/"
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the agent definition YAML file
    #[arg(short, long, value_name = "FILE")]
    pub agent: PathBuf,

    /// The request to send to the agent
    ///
    /// Read from stdin when omitted and stdin is not a terminal.
    #[arg(value_name = "TEXT")]
    pub text: Option<String>,

    /// Model to use
    #[arg(short, long, default_value = "gpt-4o-mini", env = "OPENAI_MODEL")]
    pub model: String,

    /// Base URL of the OpenAI-compatible API
    #[arg(
        long,
        default_value = "https://api.openai.com/v1",
        env = "OPENAI_BASE_URL",
        value_name = "URL"
    )]
    pub base_url: String,

    /// Sampling temperature (0.0 - 2.0)
    ///
    /// When omitted, a model-dependent default is used.
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum number of tool-calling rounds before giving up
    #[arg(long, default_value = "10", value_name = "COUNT")]
    pub max_iterations: usize,

    /// Request timeout in seconds
    #[arg(long, default_value = "120", value_name = "SECS")]
    pub timeout: u64,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must start with 'http://' or 'https://'".to_string());
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 2.0".to_string());
            }
        }

        if self.max_iterations == 0 {
            return Err("Max iterations must be at least 1".to_string());
        }

        if self.timeout == 0 {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if !self.agent.exists() {
            return Err(format!(
                "Agent file does not exist: {}",
                self.agent.display()
            ));
        }

        Ok(())
    }

    /// Resolve the request text: the positional argument, or stdin
    /// when piped in.
    pub fn request_text(&self) -> Result<String, String> {
        if let Some(ref text) = self.text {
            if text.trim().is_empty() {
                return Err("Request text is empty".to_string());
            }
            return Ok(text.clone());
        }

        let mut stdin = std::io::stdin();
        if stdin.is_terminal() {
            return Err(
                "No request given: pass it as an argument or pipe it via stdin".to_string(),
            );
        }

        let mut buffer = String::new();
        stdin
            .read_to_string(&mut buffer)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;

        if buffer.trim().is_empty() {
            return Err("Request text is empty".to_string());
        }
        Ok(buffer)
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            agent: PathBuf::from("/"),
            text: Some("review the diff".to_string()),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: None,
            max_iterations: 10,
            timeout: 120,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_valid_args() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_temperature_range() {
        let mut args = make_args();
        args.temperature = Some(2.5);
        assert!(args.validate().is_err());

        args.temperature = Some(-0.1);
        assert!(args.validate().is_err());

        args.temperature = Some(0.0);
        assert!(args.validate().is_ok());

        args.temperature = Some(2.0);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_agent_file() {
        let mut args = make_args();
        args.agent = PathBuf::from("/nonexistent/agent.yaml");
        let err = args.validate().unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn test_validation_invalid_base_url() {
        let mut args = make_args();
        args.base_url = "localhost:8080".to_string();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_iterations() {
        let mut args = make_args();
        args.max_iterations = 0;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_request_text_from_argument() {
        let args = make_args();
        assert_eq!(args.request_text().unwrap(), "review the diff");

        let mut args = make_args();
        args.text = Some("   ".to_string());
        assert!(args.request_text().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
