//! Message model and header parsing.
//!
//! A [`Message`] is built from the raw RFC 822 text the server returns. Only the header block
//! is inspected, one line per field: folded (multi-line) and MIME-encoded header values are
//! not decoded.

use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Header fields extracted from every message.
pub const HEADER_FIELDS: &[&str] = &[
    "From",
    "To",
    "Cc",
    "Reply-To",
    "Subject",
    "Date",
    "Message-ID",
    "In-Reply-To",
    "Return-Path",
    "Content-Type",
];

/// Format of the `Date` header once any `(Zone)` annotation is removed.
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Compiled `field -> pattern` table built from [`HEADER_FIELDS`].
static FIELD_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    HEADER_FIELDS
        .iter()
        .map(|&field| {
            let pattern = format!(r"(?im)^{}: ([^\r\n]*)", regex::escape(field));
            (field, Regex::new(&pattern).expect("header pattern is valid"))
        })
        .collect()
});

/// Trailing comment such as `(UTC)` or `(Pacific Standard Time)`.
static ZONE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*$").expect("zone comment pattern is valid"));

/// A parsed email message.
///
/// Every field of [`HEADER_FIELDS`] is present in the header map; fields missing from the
/// raw text hold `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    headers: BTreeMap<&'static str, Option<String>>,
    date: DateTime<FixedOffset>,
    flags: String,
}

impl Message {
    /// Parses a raw message and the flags the server reported for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDate`] if there is no `Date` header and
    /// [`Error::DateParse`] if its value is malformed.
    ///
    /// # Example
    ///
    /// ```
    /// use mail_watch::Message;
    ///
    /// let raw = "Message-ID: <abc@x>\r\nDate: Wed, 1 Jan 2020 10:00:00 +0000 (UTC)\r\n\r\nHi";
    /// let message = Message::parse(raw, "\\Seen").unwrap();
    ///
    /// assert_eq!(message.id(), Some("<abc@x>"));
    /// assert_eq!(message.get("Subject"), None);
    /// ```
    pub fn parse(raw: &str, flags: impl Into<String>) -> Result<Self> {
        let block = header_block(raw);

        let headers: BTreeMap<&'static str, Option<String>> = FIELD_PATTERNS
            .iter()
            .map(|(field, pattern)| {
                let value = pattern
                    .captures(block)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().trim_end().to_string());
                if value.is_none() {
                    debug!(field, "Header field not found");
                }
                (*field, value)
            })
            .collect();

        let raw_date = headers
            .get("Date")
            .and_then(Option::as_deref)
            .ok_or(Error::MissingDate)?;
        let date = parse_date(raw_date)?;

        Ok(Self {
            headers,
            date,
            flags: flags.into(),
        })
    }

    /// Returns the value of a header field.
    ///
    /// Field names are matched case-insensitively. Returns `None` for absent fields and for
    /// fields outside [`HEADER_FIELDS`].
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .and_then(|(_, value)| value.as_deref())
    }

    /// Returns all recognized fields with their values.
    pub fn headers(&self) -> impl Iterator<Item = (&'static str, Option<&str>)> + '_ {
        self.headers
            .iter()
            .map(|(name, value)| (*name, value.as_deref()))
    }

    /// The `Message-ID` value.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.get("Message-ID")
    }

    /// Key telling this message apart from others sent in the same second.
    ///
    /// This is the `Message-ID` when present. Messages without one fall back to their
    /// `From`, `Subject` and raw `Date` values, which never look like a bracketed id.
    #[must_use]
    pub fn identity(&self) -> String {
        match self.id() {
            Some(id) => id.to_string(),
            None => format!(
                "{}\u{1f}{}\u{1f}{}",
                self.from().unwrap_or_default(),
                self.subject().unwrap_or_default(),
                self.get("Date").unwrap_or_default()
            ),
        }
    }

    /// The `Subject` value.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get("Subject")
    }

    /// The `From` value.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.get("From")
    }

    /// When the message was sent.
    #[must_use]
    pub fn date(&self) -> DateTime<FixedOffset> {
        self.date
    }

    /// Flags as reported by the server, e.g. `\Seen \Flagged`.
    #[must_use]
    pub fn flags(&self) -> &str {
        &self.flags
    }
}

/// Text before the first empty line.
fn header_block(raw: &str) -> &str {
    let crlf = raw.find("\r\n\r\n");
    let lf = raw.find("\n\n");
    let end = match (crlf, lf) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => raw.len(),
    };
    &raw[..end]
}

/// Parses an RFC 2822 style date, ignoring a trailing `(Zone)` annotation.
///
/// # Errors
///
/// Returns [`Error::DateParse`] carrying the raw value.
pub fn parse_date(raw: &str) -> Result<DateTime<FixedOffset>> {
    let cleaned = ZONE_COMMENT.replace(raw, "");
    DateTime::parse_from_str(cleaned.trim(), DATE_FORMAT).map_err(|source| {
        warn!(raw_date = %raw, error = %source, "Failed to parse Date header");
        Error::DateParse {
            raw: raw.to_string(),
            source,
        }
    })
}
