//! Mailbox protocol seam.
//!
//! [`MailboxSession`](crate::MailboxSession) only needs a handful of folder-based operations:
//! log in, select a folder read-only, fetch by sequence number, close and log out. They are
//! expressed as traits so the session's retrieval and recovery logic does not depend on a
//! live server. [`ImapConnector`](crate::ImapConnector) is the production implementation.

use crate::config::MailboxCredentials;
use crate::error::Result;
use async_trait::async_trait;
use std::ops::RangeInclusive;

/// One message as returned by the server, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// 1-based sequence number within the selected folder.
    pub sequence: u32,
    /// Full RFC 822 message.
    pub body: Vec<u8>,
    /// Space-separated flags, e.g. `\Seen \Flagged`.
    pub flags: String,
}

/// Opens authenticated connections.
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Connection type produced by this connector.
    type Connection: MailConnection;

    /// Connects to the credentials' host and logs in.
    ///
    /// Implementations return [`Error::InvalidCredentials`](crate::Error::InvalidCredentials)
    /// when the server rejects the login.
    async fn connect(&self, credentials: &MailboxCredentials) -> Result<Self::Connection>;
}

/// An authenticated connection. Not safe for concurrent use: every call takes `&mut self`.
#[async_trait]
pub trait MailConnection: Send {
    /// Selects a folder read-only and returns its message count.
    async fn examine(&mut self, folder: &str) -> Result<u32>;

    /// Fetches the messages whose sequence numbers fall in `range`, in any order.
    ///
    /// Sequence numbers the server does not return are simply missing from the result.
    async fn fetch(&mut self, range: RangeInclusive<u32>) -> Result<Vec<RawMessage>>;

    /// Releases the selected folder.
    async fn close(&mut self) -> Result<()>;

    /// Ends the connection.
    async fn logout(&mut self) -> Result<()>;
}
