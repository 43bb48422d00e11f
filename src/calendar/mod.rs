//! Google Calendar module
//!
//! Contains types, credential lifecycle, OAuth, and the client for the Calendar v3 API.

pub mod auth;
pub mod client;
pub mod credentials;
pub mod dates;
pub mod types;
pub mod utils;
