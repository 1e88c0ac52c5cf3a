//! agentrun - configuration-driven LLM agent CLI
//!
//! Loads an agent definition from a YAML file, builds its declared
//! tools, and drives one request through an OpenAI-compatible chat
//! API with tool calling.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (tool failure, API error, IO)
//!   2 - Usage, configuration, or authentication error

mod agent;
mod cli;
mod config;
mod error;
mod tools;

use agent::{resolve_api_key, AgentRunner, RunnerConfig};
use cli::Args;
use config::AgentSpec;
use error::AgentResult;
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    init_logging(&args);

    debug!("Arguments: {:?}", args);

    match run(&args).await {
        Ok(answer) => {
            println!("{}", answer);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: logging already initialized");
    }
}

/// Load the agent, build its tools, and run the request.
async fn run(args: &Args) -> AgentResult<String> {
    let request = args
        .request_text()
        .map_err(error::AgentError::config)?;

    let spec = AgentSpec::load(&args.agent)?;
    info!("Loaded agent '{}' with {} tool(s)", spec.id, spec.tools.len());

    // Every declared tool must resolve before the model is contacted.
    let tools = tools::build_tools(&spec.tools)?;

    let api_key = resolve_api_key()?;

    let runner = AgentRunner::new(
        RunnerConfig {
            api_key,
            base_url: args.base_url.clone(),
            model: args.model.clone(),
            temperature: args.temperature,
            max_iterations: args.max_iterations,
            timeout_seconds: args.timeout,
        },
        tools,
    )?;

    info!("Running agent '{}' with model {}", spec.id, args.model);
    runner.run(&spec.description, &request).await
}
