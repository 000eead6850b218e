//! Notification sinks for rule matches.
//!
//! The watcher hands every cycle's matches to a [`Notifier`] in a single call. Delivery is the
//! sink's business: an error aborts the cycle, and the same messages are matched again on the
//! next one.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use mail_watch::{NotifyError, Notifier, RuleMatch};
//!
//! struct Stdout;
//!
//! #[async_trait]
//! impl Notifier for Stdout {
//!     async fn notify(&self, matches: &[RuleMatch]) -> Result<(), NotifyError> {
//!         for m in matches {
//!             println!("[{}] {}", m.rule, m.message.subject().unwrap_or(""));
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use crate::error::NotifyError;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// A message and the name of a rule it matched.
///
/// A message matching several rules produces one `RuleMatch` per rule, sharing the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// The matched message.
    pub message: Arc<Message>,
    /// Name of the rule that matched.
    pub rule: String,
}

/// Receives the matches of each poll cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one cycle's matches, possibly none.
    async fn notify(&self, matches: &[RuleMatch]) -> Result<(), NotifyError>;
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    async fn notify(&self, matches: &[RuleMatch]) -> Result<(), NotifyError> {
        (**self).notify(matches).await
    }
}

/// Logs each match at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, matches: &[RuleMatch]) -> Result<(), NotifyError> {
        for m in matches {
            info!(
                rule = %m.rule,
                id = m.message.id().unwrap_or_default(),
                subject = m.message.subject().unwrap_or_default(),
                from = m.message.from().unwrap_or_default(),
                "Rule matched"
            );
        }
        Ok(())
    }
}

/// Forwards non-empty batches into a channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<Vec<RuleMatch>>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiving end of its channel.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<RuleMatch>>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Wraps an existing sender.
    #[must_use]
    pub fn new(sender: mpsc::Sender<Vec<RuleMatch>>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, matches: &[RuleMatch]) -> Result<(), NotifyError> {
        if matches.is_empty() {
            return Ok(());
        }
        self.sender.send(matches.to_vec()).await?;
        Ok(())
    }
}
