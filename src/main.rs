use clap::Parser;
use tracing_subscriber::EnvFilter;

use oape::cli::{self, Cli, Command};
use oape::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    // Logs go to stderr so `oape run` output stays clean on stdout.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("oape=info,tower_http=info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match args.command {
        Command::Commands => {
            cli::list_commands();
            Ok(())
        }
        Command::Serve { host, port } => {
            let config = Config::from_env()?;
            cli::run_serve(config, host, port).await
        }
        Command::Run {
            command,
            prompt,
            working_dir,
        } => {
            let config = Config::from_env()?;
            cli::run_once(config, command, prompt, working_dir).await
        }
    }
}
