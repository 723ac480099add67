use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use caldav_mcp_server::http::{self, HttpState};
use caldav_mcp_server::{AppConfig, CalendarMcp, LibDavServiceFactory, ServiceFactory};
use clap::{Parser, Subcommand};
use rmcp::{ServiceExt, transport::stdio};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "caldav-mcp")]
#[command(about = "CalDAV calendar tools for MCP clients", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve one MCP session over stdin/stdout (default)
    Stdio,
    /// Serve MCP sessions over streamable HTTP at /mcp
    Http {
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Close sessions with no requests for this many seconds
        #[arg(long, default_value_t = 1800)]
        idle_timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the stdio protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load configuration")?;
    let default_timezone = config.default_timezone;
    let factory = LibDavServiceFactory::new(config);

    match cli.command.unwrap_or(Commands::Stdio) {
        Commands::Stdio => {
            let service = factory
                .create()
                .await
                .context("Failed to initialize calendar service")?;

            info!("Serving MCP over stdio");
            let running = CalendarMcp::new(Arc::new(service), default_timezone)
                .serve(stdio())
                .await?;
            running.waiting().await?;
        }
        Commands::Http { bind, idle_timeout } => {
            let state = HttpState::new(Arc::new(factory), default_timezone);
            http::spawn_idle_sweeper(state.sessions.clone(), Duration::from_secs(idle_timeout));
            let app = http::router(state);

            let listener = tokio::net::TcpListener::bind(bind).await?;
            info!(%bind, "Serving MCP over HTTP at /mcp");
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
