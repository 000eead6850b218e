//! Checkpoints marking how far a mailbox has been processed.

use crate::message::Message;
use chrono::{DateTime, FixedOffset};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Where [`MailboxSession::fetch_since`](crate::MailboxSession::fetch_since) scans back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// Everything after this sequence number.
    ///
    /// Sequence numbers shift when messages are expunged, so this is only reliable within
    /// one session.
    Sequence(u32),
    /// Everything newer than the watermark.
    Timestamp(Watermark),
}

impl From<u32> for Checkpoint {
    fn from(sequence: u32) -> Self {
        Checkpoint::Sequence(sequence)
    }
}

impl From<Watermark> for Checkpoint {
    fn from(watermark: Watermark) -> Self {
        Checkpoint::Timestamp(watermark)
    }
}

impl From<DateTime<FixedOffset>> for Checkpoint {
    fn from(timestamp: DateTime<FixedOffset>) -> Self {
        Checkpoint::Timestamp(Watermark::new(timestamp))
    }
}

/// The most recent message timestamp already processed, plus the ids processed at exactly
/// that timestamp.
///
/// Several messages can share a `Date` down to the second. Keeping the ids seen at the
/// boundary lets a later cycle pick up a message stamped with the same second without
/// delivering the earlier ones twice.
///
/// ```
/// use mail_watch::{Message, Watermark};
///
/// let seen = Message::parse("Message-ID: <a@x>\r\nDate: Wed, 1 Jan 2020 10:00:00 +0000\r\n\r\n", "").unwrap();
/// let twin = Message::parse("Message-ID: <b@x>\r\nDate: Wed, 1 Jan 2020 10:00:00 +0000\r\n\r\n", "").unwrap();
///
/// let watermark = Watermark::advance(None, std::slice::from_ref(&seen)).unwrap();
/// assert!(!watermark.admits(&seen));
/// assert!(watermark.admits(&twin));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    timestamp: DateTime<FixedOffset>,
    seen_ids: BTreeSet<String>,
}

impl Watermark {
    /// A watermark with no ids recorded at its timestamp.
    #[must_use]
    pub fn new(timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            timestamp,
            seen_ids: BTreeSet::new(),
        }
    }

    /// A watermark that already processed `ids` at `timestamp`.
    ///
    /// Use this to restore a persisted watermark.
    #[must_use]
    pub fn with_seen_ids<I, S>(timestamp: DateTime<FixedOffset>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            timestamp,
            seen_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Timestamp of the newest processed message.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// Identities (see [`Message::identity`]) processed at exactly [`Self::timestamp`].
    pub fn seen_ids(&self) -> impl Iterator<Item = &str> {
        self.seen_ids.iter().map(String::as_str)
    }

    /// Returns `true` if the message has not been processed yet.
    ///
    /// Newer messages are admitted, older ones are not. At the boundary instant only messages
    /// whose [`Message::identity`] was not recorded are admitted.
    #[must_use]
    pub fn admits(&self, message: &Message) -> bool {
        match message.date().cmp(&self.timestamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => !self.seen_ids.contains(&message.identity()),
        }
    }

    /// Moves `current` forward over a processed batch.
    ///
    /// Returns `current` unchanged for an empty batch and never moves backwards.
    #[must_use]
    pub fn advance(current: Option<&Watermark>, batch: &[Message]) -> Option<Watermark> {
        let Some(newest) = batch.iter().map(Message::date).max() else {
            return current.cloned();
        };

        let boundary_ids = batch
            .iter()
            .filter(|message| message.date() == newest)
            .map(Message::identity);

        match current {
            Some(current) if current.timestamp > newest => Some(current.clone()),
            Some(current) if current.timestamp == newest => {
                let mut merged = current.clone();
                merged.seen_ids.extend(boundary_ids);
                Some(merged)
            }
            _ => Some(Watermark {
                timestamp: newest,
                seen_ids: boundary_ids.collect(),
            }),
        }
    }
}
