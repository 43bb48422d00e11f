//! Google Calendar MCP Server Library
//!
//! A Model Context Protocol (MCP) server for Google Calendar.
//! Provides tools for listing, creating and updating events, a per-day
//! event resource and scheduling prompts.

pub mod calendar;
pub mod config;
pub mod error;
pub mod mcp;

pub use config::Config;
pub use error::{CalendarMcpError, Result};
