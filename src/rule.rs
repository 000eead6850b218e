//! Watch rules: named predicates over message header fields.
//!
//! A [`WatchRule`] holds one regular expression per header field. A message matches when every
//! pattern finds a match in the corresponding field value. An absent field is matched as the
//! empty string, so a pattern such as `^$` selects messages without that field.
//!
//! # Example
//!
//! ```
//! use mail_watch::{Message, WatchRule};
//!
//! let rule = WatchRule::from_patterns("invoices", [("Subject", "(?i)invoice")]).unwrap();
//!
//! let raw = "Subject: Your INVOICE #42\r\nDate: Wed, 1 Jan 2020 10:00:00 +0000\r\n\r\n";
//! let message = Message::parse(raw, "").unwrap();
//! assert!(rule.matches(&message));
//! ```

use crate::error::{Error, Result};
use crate::message::Message;
use regex::Regex;

/// A named set of per-field patterns.
#[derive(Debug, Clone)]
pub struct WatchRule {
    name: String,
    fields: Vec<(String, Regex)>,
}

impl WatchRule {
    /// Creates a rule with no patterns. It matches every message until fields are added.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a compiled pattern for a header field, replacing any previous pattern for it.
    ///
    /// Field names are compared case-insensitively.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>, pattern: Regex) -> Self {
        let field = field.into();
        match self
            .fields
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&field))
        {
            Some(slot) => slot.1 = pattern,
            None => self.fields.push((field, pattern)),
        }
        self
    }

    /// Compiles `(field, pattern)` pairs into a rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] naming the first field whose pattern does not compile.
    pub fn from_patterns<I, F, P>(name: impl Into<String>, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (F, P)>,
        F: Into<String>,
        P: AsRef<str>,
    {
        patterns
            .into_iter()
            .try_fold(Self::new(name), |rule, (field, pattern)| {
                let field = field.into();
                match Regex::new(pattern.as_ref()) {
                    Ok(regex) => Ok(rule.field(field, regex)),
                    Err(source) => Err(Error::InvalidPattern { field, source }),
                }
            })
    }

    /// The rule's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The constrained fields and their patterns, in insertion order.
    pub fn patterns(&self) -> impl Iterator<Item = (&str, &Regex)> {
        self.fields
            .iter()
            .map(|(field, regex)| (field.as_str(), regex))
    }

    /// Returns `true` if every pattern matches its field.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        self.fields
            .iter()
            .all(|(field, regex)| regex.is_match(message.get(field).unwrap_or("")))
    }
}
