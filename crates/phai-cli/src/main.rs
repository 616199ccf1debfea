//! phai - semantic search over a personal photo and video library
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

use anyhow::Result;
use std::io;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

mod cli;
mod handlers;

use clap::Parser as _;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phai=info,phai_index=info,phai_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let config = handlers::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Index { root, full, json } => {
            handlers::handle_index(config, &root, full, json).await?;
        }
        Commands::Search {
            text,
            limit,
            threshold,
            json,
        } => {
            handlers::handle_search(config, text, limit, threshold, json).await?;
        }
        Commands::Stats { json } => {
            handlers::handle_stats(config, json).await?;
        }
        Commands::Config { full } => {
            handlers::handle_config(&config, full)?;
        }
    }

    Ok(())
}
