//! Exchange Web Services source calendar.
//!
//! [`ExchangeCalendar`] reads the occurrences of the mailbox's default
//! calendar over EWS SOAP.
//!
//! # Features
//!
//! - HTTP Basic and Digest authentication, negotiated from the 401 challenge
//! - `FindItem` calendar views, which expand recurring series on the server
//! - `GetItem` batches for subject, location, times and attendees
//! - TLS verification can be disabled for self-signed servers
//!
//! # Example
//!
//! ```ignore
//! use calsync_providers::exchange::{ExchangeCalendar, ExchangeConfig};
//!
//! let config = ExchangeConfig::new("https://mail.example.com/EWS/Exchange.asmx", "DOM\\me", pw)?;
//! let source = ExchangeCalendar::new(config)?;
//! let events = source.list_events(&window).await?;
//! ```

mod auth;
mod client;
mod config;
mod provider;
mod xml;

pub use config::ExchangeConfig;
pub use provider::ExchangeCalendar;
