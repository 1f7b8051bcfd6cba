use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = taskdeck::cli::Cli::parse();
    taskdeck::run(cli)
}
