//! Google Calendar MCP Server - Rust Implementation
//!
//! A Model Context Protocol (MCP) server for Google Calendar.
//! Provides tools for listing, creating and updating calendar events.

use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use gcal_mcp_server_rust::calendar::auth::GoogleOAuth;
use gcal_mcp_server_rust::calendar::client::CalendarClient;
use gcal_mcp_server_rust::calendar::credentials::{CredentialManager, CredentialStore};
use gcal_mcp_server_rust::config::Config;
use gcal_mcp_server_rust::error::Result;
use gcal_mcp_server_rust::mcp::server::McpServer;

/// Google Calendar MCP Server
#[derive(Parser)]
#[command(name = "gcal-mcp-server")]
#[command(author, version, about = "Google Calendar MCP Server - A Model Context Protocol server for Google Calendar")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize access to Google Calendar (optional; the server authorizes on first use)
    Auth {
        /// Discard any stored token and run the consent flow again
        #[arg(long)]
        force: bool,
    },
    /// Show where credentials live and whether the stored token is usable
    Status,
    /// Remove the stored token
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::new()?;

    init_logging(config.log_file.as_deref());

    match cli.command {
        Some(Commands::Auth { force }) => {
            let manager = credential_manager(&config)?;
            if force {
                manager.invalidate().await?;
            }
            let handle = manager.acquire_handle(&config.scopes).await?;
            eprintln!("Authorized. Token saved to {}", config.token_path.display());
            if let Some(expires_at) = handle.expires_at() {
                eprintln!("Access token valid until {}", expires_at.to_rfc3339());
            }
        }
        Some(Commands::Status) => print_status(&config).await,
        Some(Commands::Logout) => {
            CredentialStore::new(&config.token_path).clear().await?;
            eprintln!("Removed {}", config.token_path.display());
        }
        None => run_server(config).await?,
    }

    Ok(())
}

/// Log to stderr (stdout carries the protocol) and optionally to a file
fn init_logging(log_file: Option<&Path>) {
    let file_layer = log_file.and_then(|path| {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!("Could not open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn credential_manager(config: &Config) -> Result<Arc<CredentialManager>> {
    let provider = GoogleOAuth::new(config)?;
    let store = CredentialStore::new(&config.token_path);
    Ok(Arc::new(CredentialManager::new(store, Arc::new(provider))))
}

async fn print_status(config: &Config) {
    if let Err(e) = config.find_and_copy_client_secret() {
        tracing::warn!("Could not copy client credentials into {}: {}", config.config_dir.display(), e);
    }

    let secret = if config.client_secret_exists() {
        "found"
    } else {
        "missing"
    };
    eprintln!("Client credentials: {} ({})", config.credentials_path.display(), secret);

    let token = if !config.token_exists() {
        "not authorized".to_string()
    } else {
        token_state(config).await
    };
    eprintln!("Token: {} ({})", config.token_path.display(), token);
    eprintln!("Calendar: {}", config.calendar_id);
}

async fn token_state(config: &Config) -> String {
    match CredentialStore::new(&config.token_path).load().await {
        Ok(None) => "not authorized".to_string(),
        Ok(Some(c)) if !c.has_scopes(&config.scopes) => "missing calendar scope".to_string(),
        Ok(Some(c)) if c.is_expired() && c.refresh_token.is_some() => {
            "expired (will refresh on next use)".to_string()
        }
        Ok(Some(c)) if c.is_expired() => "expired (re-authorization required)".to_string(),
        Ok(Some(c)) => match c.expires_at {
            Some(at) => format!("valid until {}", at.to_rfc3339()),
            None => "valid".to_string(),
        },
        Err(e) => format!("unreadable: {}", e),
    }
}

async fn run_server(config: Config) -> Result<()> {
    config.find_and_copy_client_secret()?;

    // Check for the OAuth client descriptor
    if !config.client_secret_exists() {
        eprintln!("Error: OAuth client credentials not found.");
        eprintln!(
            "Please place credentials.json in the current directory or {}",
            config.config_dir.display()
        );
        std::process::exit(1);
    }

    let credentials = credential_manager(&config)?;
    let calendar_client = Arc::new(CalendarClient::new(credentials, &config));

    tracing::info!("Starting Google Calendar MCP server");
    let mut server = McpServer::new(calendar_client);
    server.run_stdio().await?;

    tracing::info!("Google Calendar MCP server shutting down");
    Ok(())
}
