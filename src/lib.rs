/// Productivity MCP Server Implementation
///
/// This crate provides an MCP (Model Context Protocol) server that gives an
/// assistant access to Gmail, Google Calendar, Google Drive and Notion.
///
/// # Features
///
/// - Per-provider OAuth credentials with refresh and interactive consent
/// - Optional encryption of stored tokens
/// - Email triage views: importance ranking, sender rollups, weekly insights
/// - Calendar agenda, weekly summary, search, availability and event edits
/// - Drive listing, search, metadata, activity and download
/// - Notion page listing, lookup and creation
pub mod auth;
pub mod calendar_api;
pub mod config;
pub mod drive_api;
pub mod errors;
pub mod gmail_api;
pub mod logging;
pub mod models;
pub mod notion_api;
pub mod oauth;
pub mod server;
pub mod session;
pub mod token_store;
pub mod tools;
pub mod utils;
pub mod views;

// Re-export key types for use in tests
pub use crate::auth::{Credential, CredentialManager, CredentialState};
pub use crate::config::{Config, Provider, ProviderConfig};
pub use crate::errors::{ApiError, AuthError, ConfigError};
pub use crate::logging::setup_logging;
pub use crate::server::ProductivityServer;
pub use crate::session::{Session, SessionProvider};
pub use crate::token_store::{FileTokenStore, TokenStore};
