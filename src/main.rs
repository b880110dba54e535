//! swebox CLI: operator entry points for the sandbox manager.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use swebox::agent::AgentRun;
use swebox::sandbox::{runtime, DockerSandbox};
use swebox::SandboxConfig;

#[derive(Parser)]
#[command(name = "swebox")]
#[command(
    author,
    version,
    about = "Disposable Docker sandboxes for autonomous coding agents"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the container runtime and image are available
    Check,

    /// Run one task end-to-end: seed, execute the agent, print the patch
    Run {
        /// Problem statement handed to the agent
        #[arg(short, long)]
        problem: String,

        /// JSON file mapping relative paths to seed file contents
        #[arg(long)]
        repo_file: Option<PathBuf>,

        /// Task instance identifier (names the declared patch artifact)
        #[arg(long, default_value = "task")]
        instance_id: String,

        /// Pre-rendered agent config file to hand into the sandbox
        #[arg(long)]
        agent_config: Option<PathBuf>,
    },

    /// Manage the sandbox image
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },
}

#[derive(Subcommand)]
enum ImageAction {
    /// Build the image from the configured build context
    Build,
    /// Show whether the image exists locally
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("swebox=debug")
    } else {
        EnvFilter::new("swebox=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let project_dir = std::env::current_dir().context("Failed to get current directory")?;
    let config = SandboxConfig::load(&project_dir)?;

    match cli.command {
        Commands::Check => check(&config).await,
        Commands::Run {
            problem,
            repo_file,
            instance_id,
            agent_config,
        } => run_task(config, &problem, repo_file, instance_id, agent_config).await,
        Commands::Image { action } => image(&config, &action).await,
    }
}

async fn check(config: &SandboxConfig) -> Result<()> {
    if runtime::runtime_available().await {
        println!("Runtime: available");
    } else {
        println!("Runtime: NOT available (is the Docker daemon running?)");
        return Ok(());
    }

    if runtime::image_exists(&config.image).await {
        println!("Image {}: present", config.image);
    } else {
        println!("Image {}: missing (run: swebox image build)", config.image);
    }
    Ok(())
}

async fn run_task(
    config: SandboxConfig,
    problem: &str,
    repo_file: Option<PathBuf>,
    instance_id: String,
    agent_config: Option<PathBuf>,
) -> Result<()> {
    let repo_content: BTreeMap<String, String> = match repo_file {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read repo file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse repo file: {}", path.display()))?
        }
        None => BTreeMap::new(),
    };

    let agent_config_text = match agent_config {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read agent config: {}", path.display()))?,
        None => String::new(),
    };

    let run = AgentRun {
        instance_id,
        problem_statement: problem.to_string(),
        config: agent_config_text,
    };

    let mut sandbox = DockerSandbox::new(config);
    let outcome = sandbox.run_task(&repo_content, &run).await?;

    println!("Agent exit code: {}", outcome.exit_code);
    match outcome.patch {
        Some(patch) => println!("{patch}"),
        None => println!("(no change produced)"),
    }
    Ok(())
}

async fn image(config: &SandboxConfig, action: &ImageAction) -> Result<()> {
    match action {
        ImageAction::Build => {
            let context = config.build_context.as_deref().context(
                "No build_context configured in swebox.toml; \
                 point it at a directory containing a Dockerfile",
            )?;
            runtime::build_image(&config.image, context).await?;
            println!("Image built: {}", config.image);
        }
        ImageAction::Status => {
            if runtime::image_exists(&config.image).await {
                println!("Image: {}", config.image);
                println!("Status: Found");
            } else {
                println!("Image not found: {}", config.image);
                println!("\nTo build the image, run:");
                println!("  swebox image build");
            }
        }
    }
    Ok(())
}
