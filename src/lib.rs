//! # mail-watch
//!
//! Async IMAP mailbox watcher: retrieves newly arrived messages, extracts their header fields
//! and reports the ones matching user-defined rules to a notification sink.
//!
//! This crate provides:
//! - A [`MailboxSession`] that retrieves messages by sequence range, by count or back to a
//!   checkpoint, and reconnects once on transient failures
//! - A [`Message`] model built from the raw header block
//! - [`WatchRule`]s matching header fields against regular expressions
//! - A [`MailboxWatcher`] running poll cycles and handing matches to a [`Notifier`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use mail_watch::{LogNotifier, MailboxConfig, MailboxWatcher};
//! use std::time::Duration;
//!
//! # async fn example() -> mail_watch::Result<()> {
//! let config = MailboxConfig::builder()
//!     .email("user@gmail.com")
//!     .password("app-password") // Use app-specific password for Gmail
//!     .poll_interval(Duration::from_secs(30))
//!     .build()?;
//!
//! let mut watcher = MailboxWatcher::connect(config, LogNotifier).await?;
//! watcher.register_patterns("invoices", [("Subject", "(?i)invoice")])?;
//! watcher.register_patterns("boss", [("From", "boss@example\\.com")])?;
//!
//! // First cycle primes with the latest messages, later cycles only see new ones
//! let report = watcher.poll().await?;
//! println!("{} fetched, {} matched", report.fetched, report.matched);
//!
//! watcher.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Direct Retrieval
//!
//! ```no_run
//! use mail_watch::{MailboxConfig, MailboxSession};
//!
//! # async fn example() -> mail_watch::Result<()> {
//! # let config = MailboxConfig::builder().email("user@gmail.com").password("x").build()?;
//! let mut session = MailboxSession::open(&config).await?;
//!
//! for message in session.fetch_last_k(5, "INBOX").await? {
//!     println!("{} {}", message.date(), message.subject().unwrap_or("(no subject)"));
//! }
//!
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Forwarding Matches
//!
//! ```no_run
//! use mail_watch::{ChannelNotifier, MailboxConfig, MailboxWatcher};
//!
//! # async fn example() -> mail_watch::Result<()> {
//! # let config = MailboxConfig::builder().email("user@gmail.com").password("x").build()?;
//! let (notifier, mut matches) = ChannelNotifier::channel(16);
//! let mut watcher = MailboxWatcher::connect(config, notifier).await?;
//!
//! tokio::spawn(async move {
//!     while let Some(batch) = matches.recv().await {
//!         for m in batch {
//!             println!("{}: {:?}", m.rule, m.message.subject());
//!         }
//!     }
//! });
//!
//! watcher.run_until(tokio::signal::ctrl_c()).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All errors implement `std::error::Error` and provide context. Use [`Error::is_retryable`]
//! to see whether the session would reconnect for it, and [`Error::category`] for logging:
//!
//! ```
//! use mail_watch::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_retryable() {
//!         println!("Transient {} error: {}", error.category(), error);
//!     } else {
//!         println!("Permanent {} error: {}", error.category(), error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. All major operations emit spans with
//! structured fields.
//!
//! ### Span Naming Convention
//!
//! - `MailboxWatcher::poll` - One poll cycle
//! - `MailboxWatcher::run_until` - The polling loop
//! - `MailboxSession::fetch_range`, `fetch_until`, `fetch_last_k`, `fetch_since` - Retrievals
//! - `MailboxSession::reconnect` - Recovery after a transient failure
//! - `ImapConnector::connect` - TLS connection and login
//! - `ImapConnection::close` - Leaving the selected folder
//! - `connection::establish_tls` - TLS handshake
//!
//! ### Standard Fields
//!
//! - `email` - Email address
//! - `imap_host` - IMAP server hostname
//! - `folder` - Watched folder
//! - `sequence` - Message sequence number
//! - `rule` - Name of a matching rule

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod error;
pub mod known_servers;
pub mod notifier;
pub mod rule;
pub mod transport;

// Internal modules
mod checkpoint;
mod connection;
mod imap;
mod message;
mod session;
mod watcher;

#[cfg(test)]
mod testing;

// Re-exports for ergonomic API
pub use checkpoint::{Checkpoint, Watermark};
pub use config::{
    MailboxConfig, MailboxConfigBuilder, MailboxCredentials, PollingConfig, TimeoutConfig,
    DEFAULT_FOLDER,
};
pub use email_address::EmailAddress;
pub use error::{Error, ErrorCategory, NotifyError, Result};
pub use imap::{ImapConnection, ImapConnector};
pub use known_servers::{Provider, ProviderRegistry};
pub use message::{parse_date, Message, HEADER_FIELDS};
pub use notifier::{ChannelNotifier, LogNotifier, Notifier, RuleMatch};
pub use rule::WatchRule;
pub use session::{MailboxSession, DEFAULT_SCAN_LIMIT};
pub use transport::{MailConnection, MailConnector, RawMessage};
pub use watcher::{MailboxWatcher, PollReport, WatcherState};
