//! Google Calendar target calendar.
//!
//! [`GoogleCalendar`] lists, creates and deletes the synced events of one
//! Google calendar through the Calendar API v3.
//!
//! # Features
//!
//! - OAuth 2.0 PKCE authorization flow with loopback redirect
//! - Token persistence with owner-only file permissions
//! - Automatic token refresh
//! - Recurring event expansion (server-side)
//!
//! # Authentication Flow
//!
//! 1. User provides their own OAuth client ID/secret (required by Google)
//! 2. A local HTTP listener is bound on the first free port in the range
//! 3. The browser opens Google's authorization page with a PKCE challenge
//! 4. Google redirects to the listener with the authorization code
//! 5. The code is exchanged for access and refresh tokens
//! 6. Tokens are persisted and reused on the next run
//!
//! # Example
//!
//! ```ignore
//! use calsync_providers::google::{GoogleCalendar, GoogleConfig, OAuthCredentials};
//!
//! let credentials = OAuthCredentials::from_file("client_secret.json")?;
//! let config = GoogleConfig::new("team@group.calendar.google.com", credentials);
//!
//! let target = GoogleCalendar::connect(config).await?;
//! let synced = target.list_events(&window).await?;
//! ```

mod client;
mod config;
mod oauth;
mod provider;
mod tokens;

pub use config::{CALENDAR_API_BASE, GOOGLE_TOKEN_URL, GoogleConfig, OAuthCredentials};
pub use provider::GoogleCalendar;
pub use tokens::{TokenInfo, TokenStorage};
