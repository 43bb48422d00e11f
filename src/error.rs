//! Error types for the Calendar MCP Server
//!
//! This module defines the error hierarchy for all operations in the server.

use thiserror::Error;

/// Main error type for the Calendar MCP Server
#[derive(Error, Debug)]
pub enum CalendarMcpError {
    /// OAuth authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Token persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Google Calendar API errors
    #[error("Calendar API error: {0}")]
    Calendar(#[from] CalendarApiError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level failures talking to Google (unreachable, timed out, reset)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl CalendarMcpError {
    /// Stable machine-readable tag, surfaced to MCP clients in error data
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(AuthError::AuthorizationDenied { .. }) => "authorization_denied",
            Self::Auth(AuthError::AuthorizationTimeout { .. }) => "authorization_timeout",
            Self::Auth(AuthError::ProviderUnavailable { .. }) => "network",
            Self::Auth(_) => "authentication",
            Self::Storage(_) => "storage",
            Self::Calendar(CalendarApiError::EventNotFound { .. }) => "not_found",
            Self::Calendar(CalendarApiError::RemoteService { .. }) => "remote_service",
            Self::Config(_) => "configuration",
            Self::Validation(_) => "validation",
            Self::Mcp(_) => "protocol",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Network(_) => "network",
        }
    }

    /// Whether the caller may reasonably retry the same invocation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Auth(AuthError::ProviderUnavailable { .. })
        )
    }
}

/// OAuth authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("OAuth client credentials file not found: {path}")]
    ClientSecretNotFound { path: String },

    #[error("Invalid OAuth client credentials: {message}")]
    InvalidClientSecret { message: String },

    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    #[error("Timed out after {seconds}s waiting for the authorization callback")]
    AuthorizationTimeout { seconds: u64 },

    #[error("OAuth state mismatch in authorization callback")]
    StateMismatch,

    #[error("Failed to refresh access token: {message}")]
    TokenRefreshFailed { message: String },

    #[error("Token exchange failed: {message}")]
    TokenExchangeFailed { message: String },

    #[error("Identity provider unavailable ({status}): {message}")]
    ProviderUnavailable { status: u16, message: String },

    #[error("OAuth callback error: {message}")]
    CallbackError { message: String },
}

/// Token file errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read token file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Token file {path} is malformed: {message}")]
    Malformed { path: String, message: String },

    #[error("Failed to write token file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Google Calendar API errors
#[derive(Error, Debug)]
pub enum CalendarApiError {
    #[error("Event not found: {event_id}")]
    EventNotFound { event_id: String },

    #[error("Calendar API request failed ({code}): {message}")]
    RemoteService { code: u16, message: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found: {path}")]
    DirNotFound { path: String },

    #[error("Failed to create config directory: {path}")]
    DirCreationFailed { path: String },
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Event end ({end}) must be after its start ({start})")]
    InvalidTimeRange { start: String, end: String },

    #[error("Invalid date '{input}': {message}")]
    InvalidDate { input: String, message: String },

    #[error("Invalid email address: {email}")]
    InvalidEmail { email: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Unknown prompt: {name}")]
    UnknownPrompt { name: String },

    #[error("Unknown resource: {uri}")]
    UnknownResource { uri: String },

    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },
}

/// Result type alias for Calendar MCP operations
pub type Result<T> = std::result::Result<T, CalendarMcpError>;
