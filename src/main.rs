// monofetch command-line entry point.
// Runs one of the query handlers against the configured service and prints the view.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use monofetch::{Config, FetchOrchestrator, UserView, logging};

#[derive(Parser)]
#[command(name = "monofetch", version, about = "Fetch a money record from the downstream service")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// After printing, wait this long and print the view again.
    #[arg(long)]
    linger_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Blocking fetch with no deadline.
    Normal {
        #[arg(long)]
        user_id: i32,
    },
    /// Cached fetch with a deadline, plus fire-and-observe subscriptions.
    Timeout,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::discover(cli.config.as_deref())?;
    logging::init(&config.logging.filter);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.runtime.worker_threads)
        .thread_name("monofetch-worker")
        .enable_all()
        .build()?;

    tracing::info!(
        base_url = %config.downstream.base_url,
        ttl_secs = config.cache.ttl_secs,
        deadline_secs = config.resolve.deadline_secs,
        "configuration loaded"
    );

    let orchestrator = FetchOrchestrator::new(config, runtime.handle().clone())?;
    let view = match cli.command {
        Command::Normal { user_id } => orchestrator.query_single_money(user_id)?,
        Command::Timeout => orchestrator.query_with_timeout()?,
    };
    print_view(&view)?;

    if let Some(ms) = cli.linger_ms {
        std::thread::sleep(Duration::from_millis(ms));
        print_view(&view)?;
    }

    Ok(())
}

fn print_view(view: &UserView) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(view)?);
    Ok(())
}
