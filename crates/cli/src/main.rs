use clap::Parser;
use ilweave_cli::commands::{Cmd, Command};

/// ilweave CLI
///
/// ilweave rewrites method bodies at load time: it assembles methods from text, applies
/// declarative patch plans through the patch registry and runs the results in an in-memory host.
#[derive(Parser)]
#[command(name = "ilweave")]
#[command(about = "ilweave: load-time IR patching")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

/// Runs the ilweave CLI with the provided arguments.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.command.execute().await
}
