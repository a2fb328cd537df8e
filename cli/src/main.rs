//! Entry point for the `agentcore` binary: a thin front end that wires one
//! `Session` and drives one turn.

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = agentcore_cli::Cli::parse();
    agentcore_cli::run_main(cli).await
}
