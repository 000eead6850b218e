//! Mailbox session: one authenticated connection and the retrievals made through it.
//!
//! Every retrieval goes through `run_with_one_reconnect_retry`. A retryable failure (see
//! [`Error::is_retryable`]) makes the session reconnect with its stored credentials and repeat
//! the same retrieval once. A second failure is reported as [`Error::Session`].

use crate::checkpoint::Checkpoint;
use crate::config::{MailboxConfig, MailboxCredentials};
use crate::error::{Error, Result};
use crate::imap::ImapConnector;
use crate::message::Message;
use crate::transport::{MailConnection, MailConnector, RawMessage};
use tracing::{debug, info, instrument, warn};

/// Maximum number of messages examined by a checkpoint scan unless configured otherwise.
pub const DEFAULT_SCAN_LIMIT: u32 = 50;

/// A retrieval, described as data so it can be replayed after reconnecting.
enum Retrieval<'a> {
    Range {
        min_exclusive: u32,
        max_inclusive: u32,
    },
    LastK(u32),
    SinceSequence(u32),
    Until {
        start: Option<u32>,
        predicate: &'a (dyn Fn(&Message) -> bool + Sync),
        max_count: u32,
    },
}

/// An authenticated connection to one mailbox.
///
/// Retrievals take `&mut self`: a session serves one call at a time.
///
/// Dropping the session closes the socket without a LOGOUT; call
/// [`disconnect`](Self::disconnect) for a clean shutdown.
pub struct MailboxSession<C: MailConnector = ImapConnector> {
    connector: C,
    credentials: MailboxCredentials,
    connection: Option<C::Connection>,
    selected: Option<String>,
    scan_limit: u32,
}

impl<C: MailConnector> std::fmt::Debug for MailboxSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxSession")
            .field("credentials", &self.credentials)
            .field("connected", &self.connection.is_some())
            .field("selected", &self.selected)
            .field("scan_limit", &self.scan_limit)
            .finish_non_exhaustive()
    }
}

impl MailboxSession<ImapConnector> {
    /// Connects over IMAP using a mailbox configuration.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::connect`].
    pub async fn open(config: &MailboxConfig) -> Result<Self> {
        let session =
            Self::connect(ImapConnector::from_config(config), config.credentials.clone()).await?;
        Ok(session.with_scan_limit(config.polling.scan_limit))
    }
}

impl<C: MailConnector> MailboxSession<C> {
    /// Connects and authenticates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCredentials`] if the server rejects the login, or the
    /// transport error that prevented connecting.
    #[instrument(
        name = "MailboxSession::connect",
        skip_all,
        fields(email = %credentials.email(), imap_host = %credentials.imap_host())
    )]
    pub async fn connect(connector: C, credentials: MailboxCredentials) -> Result<Self> {
        let connection = connector.connect(&credentials).await?;
        info!("Mailbox session established");

        Ok(Self {
            connector,
            credentials,
            connection: Some(connection),
            selected: None,
            scan_limit: DEFAULT_SCAN_LIMIT,
        })
    }

    /// Sets how many messages [`fetch_since`](Self::fetch_since) examines at most.
    ///
    /// A limit of zero is raised to one.
    #[must_use]
    pub fn with_scan_limit(mut self, scan_limit: u32) -> Self {
        if scan_limit == 0 {
            warn!("Scan limit of 0 would never reach the checkpoint, using 1");
        }
        self.scan_limit = scan_limit.max(1);
        self
    }

    /// Maximum number of messages examined by a checkpoint scan.
    #[must_use]
    pub fn scan_limit(&self) -> u32 {
        self.scan_limit
    }

    /// The credentials used to (re)connect.
    #[must_use]
    pub fn credentials(&self) -> &MailboxCredentials {
        &self.credentials
    }

    /// Returns `true` while a connection is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Closes the selected folder, if any, and logs out.
    ///
    /// The connection is released even if either command fails. Calling this on a
    /// disconnected session does nothing.
    ///
    /// # Errors
    ///
    /// Returns the first CLOSE or LOGOUT failure.
    #[instrument(name = "MailboxSession::disconnect", skip(self))]
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        let closed = match self.selected.take() {
            Some(folder) => {
                debug!(folder = %folder, "Closing folder");
                connection.close().await
            }
            None => Ok(()),
        };
        let logged_out = connection.logout().await;

        info!("Disconnected");
        closed.and(logged_out)
    }

    /// Drops the current connection and logs in again with the stored credentials.
    ///
    /// Errors from the old connection are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns the error that prevented connecting again.
    #[instrument(name = "MailboxSession::reconnect", skip(self))]
    pub async fn reconnect(&mut self) -> Result<()> {
        if let Err(err) = self.disconnect().await {
            warn!(error = %err, "Ignoring error from the previous connection");
        }

        let connection = self.connector.connect(&self.credentials).await?;
        self.connection = Some(connection);
        info!("Reconnected");
        Ok(())
    }

    /// Fetches the messages with sequence numbers in `(min_exclusive, max_inclusive]`,
    /// newest first.
    ///
    /// `max_inclusive` is clamped to the folder's message count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the retrieval failed again after reconnecting.
    #[instrument(name = "MailboxSession::fetch_range", skip(self))]
    pub async fn fetch_range(
        &mut self,
        min_exclusive: u32,
        max_inclusive: u32,
        folder: &str,
    ) -> Result<Vec<Message>> {
        let request = Retrieval::Range {
            min_exclusive,
            max_inclusive,
        };
        self.run_with_one_reconnect_retry(folder, &request).await
    }

    /// Walks backwards from `start` (the newest message when `None`) and collects messages
    /// while `predicate` holds.
    ///
    /// The scan stops before the first message the predicate rejects, or once `max_count`
    /// messages have been examined. Messages that fail to parse are skipped but count as
    /// examined.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the retrieval failed again after reconnecting.
    #[instrument(name = "MailboxSession::fetch_until", skip(self, predicate))]
    pub async fn fetch_until<P>(
        &mut self,
        start: Option<u32>,
        predicate: P,
        max_count: u32,
        folder: &str,
    ) -> Result<Vec<Message>>
    where
        P: Fn(&Message) -> bool + Send + Sync,
    {
        let request = Retrieval::Until {
            start,
            predicate: &predicate,
            max_count,
        };
        self.run_with_one_reconnect_retry(folder, &request).await
    }

    /// Fetches the `k` most recent messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the retrieval failed again after reconnecting.
    #[instrument(name = "MailboxSession::fetch_last_k", skip(self))]
    pub async fn fetch_last_k(&mut self, k: u32, folder: &str) -> Result<Vec<Message>> {
        self.run_with_one_reconnect_retry(folder, &Retrieval::LastK(k))
            .await
    }

    /// Fetches the messages after a checkpoint, newest first.
    ///
    /// A [`Checkpoint::Timestamp`] scan examines at most [`scan_limit`](Self::scan_limit)
    /// messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the retrieval failed again after reconnecting.
    #[instrument(name = "MailboxSession::fetch_since", skip(self))]
    pub async fn fetch_since(
        &mut self,
        checkpoint: &Checkpoint,
        folder: &str,
    ) -> Result<Vec<Message>> {
        match checkpoint {
            Checkpoint::Sequence(sequence) => {
                self.run_with_one_reconnect_retry(folder, &Retrieval::SinceSequence(*sequence))
                    .await
            }
            Checkpoint::Timestamp(watermark) => {
                let admits = |message: &Message| watermark.admits(message);
                let request = Retrieval::Until {
                    start: None,
                    predicate: &admits,
                    max_count: self.scan_limit,
                };
                self.run_with_one_reconnect_retry(folder, &request).await
            }
        }
    }

    /// Runs a retrieval, reconnecting and repeating it once on a retryable failure.
    async fn run_with_one_reconnect_retry(
        &mut self,
        folder: &str,
        request: &Retrieval<'_>,
    ) -> Result<Vec<Message>> {
        let err = match self.attempt(folder, request).await {
            Ok(messages) => return Ok(messages),
            Err(err) if err.is_retryable() => err,
            Err(err) => return Err(err),
        };

        warn!(error = %err, category = %err.category(), "Retrieval failed, reconnecting");

        if let Err(err) = self.reconnect().await {
            warn!(error = %err, "Reconnect failed");
            return Err(Error::session(err));
        }

        self.attempt(folder, request).await.map_err(|err| {
            warn!(error = %err, "Retrieval failed again after reconnecting");
            Error::session(err)
        })
    }

    async fn attempt(&mut self, folder: &str, request: &Retrieval<'_>) -> Result<Vec<Message>> {
        let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;

        let total = connection.examine(folder).await?;
        self.selected = Some(folder.to_string());
        debug!(folder, total, "Folder selected");

        match *request {
            Retrieval::Range {
                min_exclusive,
                max_inclusive,
            } => fetch_range(connection, min_exclusive, max_inclusive.min(total)).await,
            Retrieval::LastK(k) => fetch_range(connection, total.saturating_sub(k), total).await,
            Retrieval::SinceSequence(sequence) => fetch_range(connection, sequence, total).await,
            Retrieval::Until {
                start,
                predicate,
                max_count,
            } => {
                let start = start.map_or(total, |start| start.min(total));
                fetch_until(connection, start, predicate, max_count).await
            }
        }
    }
}

async fn fetch_range<T: MailConnection>(
    connection: &mut T,
    min_exclusive: u32,
    max_inclusive: u32,
) -> Result<Vec<Message>> {
    if max_inclusive <= min_exclusive {
        return Ok(Vec::new());
    }

    let mut fetched = connection.fetch(min_exclusive + 1..=max_inclusive).await?;
    fetched.sort_unstable_by(|a, b| b.sequence.cmp(&a.sequence));

    Ok(fetched.iter().filter_map(parse_raw).collect())
}

async fn fetch_until<T: MailConnection>(
    connection: &mut T,
    start: u32,
    predicate: &(dyn Fn(&Message) -> bool + Sync),
    max_count: u32,
) -> Result<Vec<Message>> {
    let mut kept = Vec::new();

    for (examined, sequence) in (1..=start).rev().enumerate() {
        if examined >= max_count as usize {
            debug!(max_count, "Scan limit reached");
            break;
        }

        let fetched = connection.fetch(sequence..=sequence).await?;
        let Some(message) = fetched
            .iter()
            .find(|raw| raw.sequence == sequence)
            .and_then(parse_raw)
        else {
            continue;
        };

        if !predicate(&message) {
            debug!(sequence, "Reached an already processed message");
            break;
        }
        kept.push(message);
    }

    Ok(kept)
}

/// Parses a fetched message, logging and skipping it on failure.
fn parse_raw(raw: &RawMessage) -> Option<Message> {
    let text = String::from_utf8_lossy(&raw.body);
    match Message::parse(&text, raw.flags.as_str()) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(sequence = raw.sequence, error = %err, "Skipping unparseable message");
            None
        }
    }
}
