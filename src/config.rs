//! Configuration management for the Calendar MCP Server
//!
//! Handles paths, environment variables, and configuration loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CalendarMcpError, ConfigError, Result};

/// Configuration for the Calendar MCP Server
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for storing configuration files
    pub config_dir: PathBuf,

    /// Path to the OAuth client descriptor downloaded from Google Cloud Console
    pub credentials_path: PathBuf,

    /// Path to the stored token (access/refresh tokens)
    pub token_path: PathBuf,

    /// OAuth callback port (0 picks a free port)
    pub oauth_callback_port: u16,

    /// How long the interactive flow waits for the browser callback
    pub auth_timeout: Duration,

    /// Calendar to operate on
    pub calendar_id: String,

    /// Calendar API base URL
    pub api_base_url: String,

    /// Optional log file, in addition to stderr
    pub log_file: Option<PathBuf>,

    /// Calendar API scopes
    pub scopes: Vec<String>,
}

impl Config {
    /// Create a new configuration from the environment, with default paths
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var("GCAL_MCP_CONFIG_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => Self::default_config_dir()?,
        };
        Self::ensure_dir(&config_dir)?;

        let mut config = Self::from_dir(config_dir);

        if let Ok(path) = std::env::var("GCAL_CREDENTIALS_PATH") {
            config.credentials_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("GCAL_TOKEN_PATH") {
            config.token_path = PathBuf::from(path);
        }

        if let Some(port) = std::env::var("GCAL_OAUTH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            config.oauth_callback_port = port;
        }

        if let Some(secs) = std::env::var("GCAL_AUTH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.auth_timeout = Duration::from_secs(secs);
        }

        if let Ok(id) = std::env::var("GCAL_CALENDAR_ID") {
            config.calendar_id = id;
        }

        if let Ok(url) = std::env::var("GCAL_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }

        config.log_file = std::env::var("GCAL_MCP_LOG_FILE").ok().map(PathBuf::from);

        Ok(config)
    }

    /// Build a configuration rooted at `config_dir` without consulting the environment
    pub fn from_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();

        Self {
            credentials_path: config_dir.join(calendar::CREDENTIALS_FILE),
            token_path: config_dir.join(calendar::TOKEN_FILE),
            config_dir,
            oauth_callback_port: 0,
            auth_timeout: Duration::from_secs(calendar::AUTH_TIMEOUT_SECS),
            calendar_id: calendar::PRIMARY_CALENDAR.to_string(),
            api_base_url: calendar::API_BASE_URL.to_string(),
            log_file: None,
            scopes: vec![calendar::SCOPE.to_string()],
        }
    }

    /// Get the default configuration directory
    fn default_config_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| {
                CalendarMcpError::Config(ConfigError::DirNotFound {
                    path: "~".to_string(),
                })
            })?
            .join(".gcal-mcp"))
    }

    fn ensure_dir(dir: &Path) -> Result<()> {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|_| {
                CalendarMcpError::Config(ConfigError::DirCreationFailed {
                    path: dir.display().to_string(),
                })
            })?;
        }
        Ok(())
    }

    /// Check if the OAuth client descriptor exists
    pub fn client_secret_exists(&self) -> bool {
        self.credentials_path.exists()
    }

    /// Check if a token file exists
    pub fn token_exists(&self) -> bool {
        self.token_path.exists()
    }

    /// Try to find the client descriptor in the current directory and copy it to the config dir
    pub fn find_and_copy_client_secret(&self) -> Result<bool> {
        let local = std::env::current_dir()
            .map_err(CalendarMcpError::Io)?
            .join(calendar::CREDENTIALS_FILE);

        if local.exists() && !self.client_secret_exists() && local != self.credentials_path {
            std::fs::copy(&local, &self.credentials_path).map_err(CalendarMcpError::Io)?;
            tracing::info!(
                "Copied {} into {}",
                local.display(),
                self.credentials_path.display()
            );
            return Ok(true);
        }

        Ok(false)
    }
}

/// Google Calendar constants
pub mod calendar {
    /// Base URL for the Calendar v3 API
    pub const API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

    /// Full read/write calendar scope
    pub const SCOPE: &str = "https://www.googleapis.com/auth/calendar";

    /// The authenticated user's primary calendar
    pub const PRIMARY_CALENDAR: &str = "primary";

    pub const CREDENTIALS_FILE: &str = "credentials.json";
    pub const TOKEN_FILE: &str = "token.json";

    /// Default wait for the consent callback (5 minutes)
    pub const AUTH_TIMEOUT_SECS: u64 = 300;

    /// Path the loopback listener serves the OAuth redirect on
    pub const CALLBACK_PATH: &str = "/oauth2callback";
}
