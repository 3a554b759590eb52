use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use leadflow::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "leadflow",
    about = "Capture, distribute and follow call-center leads",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Assign confirmed leads that are still waiting for an agent
    Distribute(DistributeArgs),
    /// Walk through capture, confirmation, distribution and reassignment
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// JSON snapshot used to seed the store (defaults to the demo call center)
    #[arg(long)]
    pub(crate) state: Option<PathBuf>,
    /// Register a global webhook subscription for every lead event
    #[arg(long, requires = "webhook_secret")]
    pub(crate) webhook_url: Option<String>,
    /// Secret used to sign payloads for --webhook-url
    #[arg(long)]
    pub(crate) webhook_secret: Option<String>,
    /// Run batch distribution on this interval, in seconds
    #[arg(long)]
    pub(crate) sweep_interval_secs: Option<u64>,
}

#[derive(Args, Debug)]
pub(crate) struct DistributeArgs {
    /// JSON snapshot to distribute from; rewritten in place afterwards
    #[arg(long)]
    pub(crate) state: PathBuf,
    /// Maximum number of leads examined in this run
    #[arg(long, default_value_t = 100)]
    pub(crate) limit: usize,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Distribute(args) => server::distribute(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
