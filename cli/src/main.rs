//! Handoff CLI - delegate tasks, run responders and move artifacts through a hub

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::Session;

#[derive(Parser)]
#[command(name = "handoff-cli")]
#[command(about = "CLI client for a Handoff hub")]
#[command(version)]
struct Cli {
    /// Hub URL
    #[arg(long, env = "HANDOFF_HUB", default_value = "http://localhost:3000")]
    hub: String,

    /// Job the delegations belong to (a fresh id when unset)
    #[arg(long, env = "HANDOFF_JOB")]
    job: Option<String>,

    /// Identity of this agent
    #[arg(long, env = "HANDOFF_AGENT", default_value = "cli")]
    agent_id: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delegate one task and print its result
    Delegate {
        /// Target agent
        #[arg(short, long)]
        to: String,

        /// Task description
        #[arg(short, long)]
        description: String,

        /// JSON object payload
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// Timeout in milliseconds (configured default when unset)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Re-issue a timed out delegation this many more times
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Delegate several tasks concurrently and print every result in order
    Fanout {
        /// Target agent; repeat once per task to address tasks individually
        #[arg(short, long = "to", required = true)]
        targets: Vec<String>,

        /// Task descriptions, one task each
        #[arg(short, long = "task", required = true)]
        tasks: Vec<String>,

        /// JSON object payload shared by every task
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// Shared timeout in milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },

    /// Answer tasks from this agent's inbox by echoing them back
    Respond {
        /// Exit after answering one task
        #[arg(long)]
        once: bool,

        /// Give up after this many milliseconds without a task
        #[arg(long)]
        idle_ms: Option<u64>,
    },

    /// Store a file (or stdin) as an artifact and print its reference
    Put {
        #[arg(short, long)]
        bucket: String,

        /// File to upload; stdin when omitted
        file: Option<PathBuf>,
    },

    /// Fetch an artifact by its reference JSON
    Get {
        /// Reference as printed by `put`
        reference: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "handoff_cli=info,handoff=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let session = Session::connect(&cli.hub, cli.job, cli.agent_id)?;

    match cli.command {
        Commands::Delegate {
            to,
            description,
            payload,
            timeout_ms,
            retries,
        } => {
            session
                .delegate(&to, &description, &payload, timeout_ms, retries)
                .await
        }
        Commands::Fanout {
            targets,
            tasks,
            payload,
            timeout_ms,
        } => session.fanout(targets, tasks, &payload, timeout_ms).await,
        Commands::Respond { once, idle_ms } => session.respond(once, idle_ms).await,
        Commands::Put { bucket, file } => session.put(&bucket, file).await,
        Commands::Get { reference, output } => session.get(&reference, output).await,
    }
}
