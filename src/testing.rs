//! Scripted in-memory mailbox used by unit tests.

use crate::config::MailboxCredentials;
use crate::error::{Error, Result};
use crate::known_servers::ProviderRegistry;
use crate::message::Message;
use crate::transport::{MailConnection, MailConnector, RawMessage};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};

/// Password the fake server refuses.
pub(crate) const WRONG_PASSWORD: &str = "wrong";

/// Wed, 1 Jan 2020 10:00:00 +0000.
pub(crate) fn base_time() -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0)
        .unwrap()
        .fixed_offset()
}

/// Raw message with id `<{id}@test>` sent `minute` minutes after [`base_time`].
pub(crate) fn raw_with_subject(id: u32, minute: i64, subject: &str) -> String {
    let date = base_time() + Duration::minutes(minute);
    format!(
        "From: Sender {id} <sender{id}@example.com>\r\n\
         To: user@gmail.com\r\n\
         Subject: {subject}\r\n\
         Date: {}\r\n\
         Message-ID: <{id}@test>\r\n\
         \r\n\
         body {id}\r\n",
        date.format("%a, %d %b %Y %H:%M:%S %z")
    )
}

/// Raw message without a `Message-ID`, sent `minute` minutes after [`base_time`].
pub(crate) fn raw_anonymous_at(subject: &str, minute: i64) -> String {
    let date = base_time() + Duration::minutes(minute);
    format!(
        "From: Anonymous <anon@example.com>\r\n\
         Subject: {subject}\r\n\
         Date: {}\r\n\
         \r\n\
         no id\r\n",
        date.format("%a, %d %b %Y %H:%M:%S %z")
    )
}

pub(crate) fn anonymous_message_at(subject: &str, minute: i64) -> Message {
    Message::parse(&raw_anonymous_at(subject, minute), "").unwrap()
}

pub(crate) fn raw_at(id: u32, minute: i64) -> String {
    raw_with_subject(id, minute, &format!("Message {id}"))
}

pub(crate) fn message_at(id: u32, minute: i64) -> Message {
    Message::parse(&raw_at(id, minute), "").unwrap()
}

pub(crate) fn credentials() -> MailboxCredentials {
    credentials_with_password("secret")
}

pub(crate) fn credentials_with_password(password: &str) -> MailboxCredentials {
    MailboxCredentials::new("user@gmail.com", password, &ProviderRegistry::with_defaults()).unwrap()
}

fn connection_reset() -> async_imap::error::Error {
    async_imap::error::Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    ))
}

/// Server-side state shared by the fake connector and its connections.
#[derive(Debug, Default)]
pub(crate) struct MailboxState {
    /// Raw bodies; sequence number = index + 1.
    pub messages: Vec<String>,
    /// Number of upcoming fetch calls that fail with a dropped connection.
    pub failing_fetches: u32,
    /// Number of upcoming connects that fail at the TCP level.
    pub failing_connects: u32,
    /// Makes every fetch fail with a non-retryable error.
    pub corrupt: bool,
    pub connects: u32,
    pub fetches: u32,
    pub closes: u32,
    pub logouts: u32,
    pub examined: Vec<String>,
}

/// Fake [`MailConnector`] backed by a shared [`MailboxState`].
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl FakeMailbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A mailbox holding messages `1..=count`, message `n` sent `n` minutes after [`base_time`].
    pub(crate) fn with_messages(count: u32) -> Self {
        let mailbox = Self::new();
        for id in 1..=count {
            mailbox.push(raw_at(id, i64::from(id)));
        }
        mailbox
    }

    pub(crate) fn push(&self, raw: impl Into<String>) {
        self.state().messages.push(raw.into());
    }

    pub(crate) fn fail_next_fetches(&self, count: u32) {
        self.state().failing_fetches = count;
    }

    pub(crate) fn fail_next_connects(&self, count: u32) {
        self.state().failing_connects = count;
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl MailConnector for FakeMailbox {
    type Connection = FakeConnection;

    async fn connect(&self, credentials: &MailboxCredentials) -> Result<FakeConnection> {
        let mut state = self.state();

        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(Error::TcpConnect {
                target: format!("{}:993", credentials.imap_host()),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }

        if credentials.password() == WRONG_PASSWORD {
            return Err(Error::InvalidCredentials {
                email: credentials.email().to_string(),
                reason: "[AUTHENTICATIONFAILED] Invalid credentials".into(),
            });
        }

        state.connects += 1;
        Ok(FakeConnection {
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeConnection {
    state: Arc<Mutex<MailboxState>>,
}

impl FakeConnection {
    fn state(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl MailConnection for FakeConnection {
    async fn examine(&mut self, folder: &str) -> Result<u32> {
        let mut state = self.state();
        state.examined.push(folder.to_string());
        Ok(u32::try_from(state.messages.len()).unwrap())
    }

    async fn fetch(&mut self, range: RangeInclusive<u32>) -> Result<Vec<RawMessage>> {
        let mut state = self.state();
        state.fetches += 1;

        if state.corrupt {
            return Err(Error::MissingDate);
        }

        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(Error::Fetch {
                range: format!("{}:{}", range.start(), range.end()),
                source: connection_reset(),
            });
        }

        // Servers answer in ascending order; the session must not rely on it.
        Ok(range
            .filter_map(|sequence| {
                let body = state.messages.get(usize::try_from(sequence).ok()?.checked_sub(1)?)?;
                Some(RawMessage {
                    sequence,
                    body: body.clone().into_bytes(),
                    flags: "\\Seen".into(),
                })
            })
            .collect())
    }

    async fn close(&mut self) -> Result<()> {
        self.state().closes += 1;
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.state().logouts += 1;
        Ok(())
    }
}
