//! IMAP implementation of the transport traits, built on async-imap over rustls.
//!
//! Every step is bounded by the matching [`TimeoutConfig`] deadline. Timeouts surface as
//! retryable errors, so a hung server is handled by the session's reconnect policy.

use crate::config::{MailboxConfig, MailboxCredentials, TimeoutConfig};
use crate::connection::{self, TlsStream};
use crate::error::{Error, Result};
use crate::transport::{MailConnection, MailConnector, RawMessage};
use async_imap::types::{Fetch, Flag};
use async_imap::Session;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::borrow::Cow;
use std::ops::RangeInclusive;
use tracing::{debug, instrument};

/// Type alias for IMAP session over TLS.
type ImapSession = Session<TlsStream>;

/// Fetch query: flags plus the full message, without setting `\Seen`.
const FETCH_QUERY: &str = "(FLAGS BODY.PEEK[])";

/// Opens IMAP-over-TLS connections.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    port: u16,
    timeouts: TimeoutConfig,
}

impl ImapConnector {
    /// Creates a connector for the given port.
    #[must_use]
    pub fn new(port: u16, timeouts: TimeoutConfig) -> Self {
        Self { port, timeouts }
    }

    /// Creates a connector from a mailbox configuration.
    #[must_use]
    pub fn from_config(config: &MailboxConfig) -> Self {
        Self::new(config.imap_port, config.timeouts.clone())
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    type Connection = ImapConnection;

    #[instrument(
        name = "ImapConnector::connect",
        skip_all,
        fields(email = %credentials.email(), imap_host = %credentials.imap_host(), port = self.port)
    )]
    async fn connect(&self, credentials: &MailboxCredentials) -> Result<ImapConnection> {
        let host = credentials.imap_host();

        let tls_stream = tokio::time::timeout(
            self.timeouts.connect,
            connection::establish_tls_connection(host, self.port),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: format!("{host}:{}", self.port),
            timeout: self.timeouts.connect,
        })??;

        debug!("TLS connection established");

        let session = tokio::time::timeout(self.timeouts.auth, authenticate(tls_stream, credentials))
            .await
            .map_err(|_| Error::AuthTimeout {
                email: credentials.email().to_string(),
                timeout: self.timeouts.auth,
            })??;

        debug!("Authenticated");

        Ok(ImapConnection {
            session,
            timeouts: self.timeouts.clone(),
        })
    }
}

/// Logs in on a fresh TLS stream.
async fn authenticate(tls_stream: TlsStream, credentials: &MailboxCredentials) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    client
        .login(credentials.email(), credentials.password())
        .await
        .map_err(|(source, _client)| match source {
            async_imap::error::Error::No(reason) => Error::InvalidCredentials {
                email: credentials.email().to_string(),
                reason,
            },
            source => Error::Login {
                email: credentials.email().to_string(),
                source,
            },
        })
}

/// An authenticated IMAP connection.
pub struct ImapConnection {
    session: ImapSession,
    timeouts: TimeoutConfig,
}

impl std::fmt::Debug for ImapConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnection")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MailConnection for ImapConnection {
    #[instrument(name = "ImapConnection::examine", skip(self))]
    async fn examine(&mut self, folder: &str) -> Result<u32> {
        let timeout = self.timeouts.select;

        let mailbox = tokio::time::timeout(timeout, self.session.examine(folder))
            .await
            .map_err(|_| Error::SelectTimeout {
                folder: folder.to_string(),
                timeout,
            })?
            .map_err(|source| Error::SelectFolder {
                folder: folder.to_string(),
                source,
            })?;

        debug!(exists = mailbox.exists, "Folder examined");
        Ok(mailbox.exists)
    }

    #[instrument(name = "ImapConnection::fetch", skip(self))]
    async fn fetch(&mut self, range: RangeInclusive<u32>) -> Result<Vec<RawMessage>> {
        let sequence_set = sequence_set(&range);
        let timeout = self.timeouts.fetch;
        let session = &mut self.session;

        let fetches = async {
            let stream = session
                .fetch(&sequence_set, FETCH_QUERY)
                .await
                .map_err(|source| Error::Fetch {
                    range: sequence_set.clone(),
                    source,
                })?;

            stream
                .map_err(|source| Error::FetchMessage { source })
                .try_collect::<Vec<Fetch>>()
                .await
        };

        let fetches = tokio::time::timeout(timeout, fetches)
            .await
            .map_err(|_| Error::FetchTimeout {
                range: sequence_set.clone(),
                timeout,
            })??;

        let messages: Vec<RawMessage> = fetches.iter().filter_map(to_raw_message).collect();
        debug!(count = messages.len(), "Fetched messages");
        Ok(messages)
    }

    #[instrument(name = "ImapConnection::close", skip(self))]
    async fn close(&mut self) -> Result<()> {
        let timeout = self.timeouts.logout;
        tokio::time::timeout(timeout, self.session.close())
            .await
            .map_err(|_| Error::LogoutTimeout { timeout })?
            .map_err(|source| Error::Close { source })
    }

    #[instrument(name = "ImapConnection::logout", skip(self))]
    async fn logout(&mut self) -> Result<()> {
        let timeout = self.timeouts.logout;
        tokio::time::timeout(timeout, self.session.logout())
            .await
            .map_err(|_| Error::LogoutTimeout { timeout })?
            .map_err(|source| Error::Logout { source })
    }
}

/// IMAP sequence set for an inclusive range: `7` or `3:7`.
fn sequence_set(range: &RangeInclusive<u32>) -> String {
    if range.start() == range.end() {
        range.start().to_string()
    } else {
        format!("{}:{}", range.start(), range.end())
    }
}

fn to_raw_message(fetch: &Fetch) -> Option<RawMessage> {
    let Some(body) = fetch.body() else {
        debug!(sequence = fetch.message, "Message has no body");
        return None;
    };

    let flags: Vec<Cow<'_, str>> = fetch.flags().map(|flag| flag_name(&flag)).collect();

    Some(RawMessage {
        sequence: fetch.message,
        body: body.to_vec(),
        flags: flags.join(" "),
    })
}

fn flag_name(flag: &Flag<'_>) -> Cow<'static, str> {
    match flag {
        Flag::Seen => Cow::Borrowed("\\Seen"),
        Flag::Answered => Cow::Borrowed("\\Answered"),
        Flag::Flagged => Cow::Borrowed("\\Flagged"),
        Flag::Deleted => Cow::Borrowed("\\Deleted"),
        Flag::Draft => Cow::Borrowed("\\Draft"),
        Flag::Recent => Cow::Borrowed("\\Recent"),
        Flag::MayCreate => Cow::Borrowed("\\*"),
        Flag::Custom(name) => Cow::Owned(name.to_string()),
    }
}
