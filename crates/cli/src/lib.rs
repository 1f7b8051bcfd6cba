pub mod cli;
pub mod commands;
pub mod config;
pub mod format;
pub mod logging;

use anyhow::{Context, Result};

pub use taskdeck_core as core;
pub use taskdeck_core::capture;
pub use taskdeck_core::memory;
pub use taskdeck_core::model;
pub use taskdeck_core::parser;
pub use taskdeck_core::session;
pub use taskdeck_core::store;
pub use taskdeck_core::views;

pub use taskdeck_core::{AppConfig, GatewayError, GatewayOp, TaskGateway};

use crate::cli::{Cli, CliCommand, ListArgs};
use crate::commands::App;
use crate::views::Section;

/// Run one CLI invocation to completion on its own Tokio runtime.
pub fn run(cli: Cli) -> Result<()> {
    logging::init_tracing(cli.log_filter.as_deref())?;
    let config = config::from_cli(&cli)?;
    let command = cli.command.unwrap_or(CliCommand::List(ListArgs {
        section: Section::Inbox,
        ranked: false,
        json: false,
    }));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let app = App::connect(&config)?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    runtime.block_on(commands::execute(&app, command, &mut handle))
}
