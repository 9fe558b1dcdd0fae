//! Command-line interface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;

use crate::agent::ConversationMessage;
use crate::commands::CommandCatalog;
use crate::config::{Config, ContextConfig};
use crate::jobs::{JobManager, JobRequest, JobStatus};
use crate::server::{self, AppState, StreamEvent, StreamGateway};

#[derive(Parser, Debug)]
#[command(name = "oape", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP job server
    Serve {
        /// Address to bind (overrides OAPE_HOST)
        #[arg(long, env = "OAPE_HOST")]
        host: Option<String>,

        /// Port to bind (overrides OAPE_PORT)
        #[arg(long, env = "OAPE_PORT")]
        port: Option<u16>,
    },

    /// Run one command in the foreground and print its transcript
    Run {
        /// Command name, e.g. "api-implement"
        command: String,

        /// Command argument, usually an enhancement PR URL
        prompt: String,

        /// Repository to operate on (defaults to the current directory)
        #[arg(short = 'C', long)]
        working_dir: Option<PathBuf>,
    },

    /// List the supported commands
    Commands,
}

pub async fn run_serve(
    config: Config,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let jobs = JobManager::from_config(&config).context("Failed to create model provider")?;
    let streams = StreamGateway::new(&config.server);
    let state = AppState::new(Arc::new(jobs), Arc::new(streams));

    server::serve(state, addr)
        .await
        .with_context(|| format!("Server on {} failed", addr))
}

/// Run a job to completion, printing each transcript entry as it arrives.
pub async fn run_once(
    config: Config,
    command: String,
    prompt: String,
    working_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let working_dir = match working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };

    let jobs = JobManager::from_config(&config).context("Failed to create model provider")?;
    let streams = StreamGateway::new(&config.server);

    let id = jobs
        .submit(JobRequest {
            command,
            prompt,
            working_dir,
        })
        .await?;
    let job = jobs.get(&id).await?;
    let mut events = Box::pin(
        streams
            .subscribe(job, 0)
            .context("Stream limit reached")?,
    );

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Message { message, .. } => print_message(&message),
            StreamEvent::Keepalive => {}
            StreamEvent::Complete(snapshot) => {
                println!();
                println!(
                    "Job {} {} (input tokens: {}, output tokens: {}, cost: ${})",
                    snapshot.id,
                    snapshot.status,
                    snapshot.input_tokens,
                    snapshot.output_tokens,
                    snapshot.cost_usd.unwrap_or_default()
                );
                if snapshot.status != JobStatus::Success {
                    anyhow::bail!(
                        "Agent execution failed: {}",
                        snapshot.error.unwrap_or_else(|| "unknown error".to_string())
                    );
                }
            }
        }
    }
    Ok(())
}

pub fn list_commands() {
    let catalog = CommandCatalog::new(&ContextConfig::default());
    let width = catalog.all().iter().map(|c| c.name.len()).max().unwrap_or(0);
    for info in catalog.all() {
        println!("  {:width$}  {}", info.name, info.description, width = width);
    }
}

fn print_message(message: &ConversationMessage) {
    match message {
        ConversationMessage::User { content } => println!("> {}", content),
        ConversationMessage::Text { content } => println!("{}", content),
        ConversationMessage::Thinking { content } => println!("[thinking] {}", content),
        ConversationMessage::ToolUse {
            tool_name,
            tool_input,
            ..
        } => println!("[{}] {}", tool_name, tool_input),
        ConversationMessage::ToolResult {
            tool_name,
            content,
            is_error,
            ..
        } => {
            let preview: String = content.chars().take(500).collect();
            let tag = if *is_error { "error" } else { "result" };
            println!("[{} {}] {}", tool_name, tag, preview);
        }
        ConversationMessage::Result { .. } => {}
    }
}
