//! Poll-driven mailbox watcher.
//!
//! The [`MailboxWatcher`] is the main entry point for this crate. Each poll cycle:
//!
//! 1. fetches the messages newer than the checkpoint (the most recent messages on the first
//!    cycle),
//! 2. evaluates every registered [`WatchRule`] against every fetched message,
//! 3. hands all matches to the [`Notifier`] in one call,
//! 4. advances the checkpoint to the newest fetched message.
//!
//! A cycle that fails before step 4 leaves the checkpoint untouched, so its messages are
//! fetched and delivered again by the next cycle.
//!
//! # Example
//!
//! ```no_run
//! use mail_watch::{LogNotifier, MailboxConfig, MailboxWatcher};
//!
//! # async fn example() -> mail_watch::Result<()> {
//! let config = MailboxConfig::builder()
//!     .email("user@gmail.com")
//!     .password("app-password")
//!     .build()?;
//!
//! let mut watcher = MailboxWatcher::connect(config, LogNotifier).await?;
//! watcher.register_patterns("invoices", [("Subject", "(?i)invoice")])?;
//!
//! watcher.run_until(tokio::signal::ctrl_c()).await;
//! watcher.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::checkpoint::{Checkpoint, Watermark};
use crate::config::{MailboxConfig, PollingConfig};
use crate::error::{Error, Result};
use crate::imap::ImapConnector;
use crate::notifier::{Notifier, RuleMatch};
use crate::rule::WatchRule;
use crate::session::MailboxSession;
use crate::transport::MailConnector;
use chrono::{DateTime, FixedOffset};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Where the watcher stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// No checkpoint yet. The next cycle primes.
    Uninitialized,
    /// The priming cycle is running.
    Priming,
    /// A checkpoint exists; cycles fetch what arrived after it.
    Steady,
}

/// Outcome of one successful poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Number of messages retrieved.
    pub fetched: usize,
    /// Number of (message, rule) matches delivered.
    pub matched: usize,
    /// Checkpoint timestamp after the cycle.
    pub checkpoint: Option<DateTime<FixedOffset>>,
}

/// Watches one mailbox folder and reports messages matching registered rules.
///
/// Create using [`MailboxWatcher::connect`], or [`MailboxWatcher::new`] with an existing
/// session.
///
/// # Lifecycle
///
/// 1. Register rules with [`register_rule`](Self::register_rule) or
///    [`register_patterns`](Self::register_patterns)
/// 2. Call [`poll`](Self::poll) yourself, or let [`run_until`](Self::run_until) drive it
/// 3. Call [`shutdown`](Self::shutdown) when done
pub struct MailboxWatcher<N, C: MailConnector = ImapConnector> {
    session: MailboxSession<C>,
    notifier: N,
    rules: Vec<WatchRule>,
    polling: PollingConfig,
    state: WatcherState,
    checkpoint: Option<Watermark>,
}

impl<N: Notifier> MailboxWatcher<N> {
    /// Connects to the configured mailbox over IMAP.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCredentials`] if the login is rejected, or the transport error
    /// that prevented connecting.
    #[instrument(
        name = "MailboxWatcher::connect",
        skip_all,
        fields(email = %config.credentials.email(), folder = %config.polling.folder)
    )]
    pub async fn connect(config: MailboxConfig, notifier: N) -> Result<Self> {
        let session = MailboxSession::open(&config).await?;
        Self::new(session, notifier, config.polling)
    }
}

impl<N: Notifier, C: MailConnector> MailboxWatcher<N, C> {
    /// Creates a watcher over an existing session.
    ///
    /// The session's scan limit is set from `polling`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `polling.prime_batch` or `polling.scan_limit` is
    /// zero.
    pub fn new(session: MailboxSession<C>, notifier: N, polling: PollingConfig) -> Result<Self> {
        polling.validate()?;
        Ok(Self {
            session: session.with_scan_limit(polling.scan_limit),
            notifier,
            rules: Vec::new(),
            polling,
            state: WatcherState::Uninitialized,
            checkpoint: None,
        })
    }

    /// Adds a rule, or replaces the rule with the same name in place.
    pub fn register_rule(&mut self, rule: WatchRule) {
        match self.rules.iter_mut().find(|r| r.name() == rule.name()) {
            Some(existing) => {
                debug!(rule = %rule.name(), "Replacing rule");
                *existing = rule;
            }
            None => {
                debug!(rule = %rule.name(), "Registering rule");
                self.rules.push(rule);
            }
        }
    }

    /// Compiles `(field, pattern)` pairs into a rule and registers it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if a pattern does not compile. The rule set is left
    /// unchanged.
    pub fn register_patterns<I, F, P>(&mut self, name: impl Into<String>, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = (F, P)>,
        F: Into<String>,
        P: AsRef<str>,
    {
        let rule = WatchRule::from_patterns(name, patterns)?;
        self.register_rule(rule);
        Ok(())
    }

    /// Removes a rule by name.
    pub fn remove_rule(&mut self, name: &str) -> Option<WatchRule> {
        let index = self.rules.iter().position(|r| r.name() == name)?;
        Some(self.rules.remove(index))
    }

    /// Registered rules, in registration order.
    #[must_use]
    pub fn rules(&self) -> &[WatchRule] {
        &self.rules
    }

    /// Sets the delay between cycles used by [`run_until`](Self::run_until).
    pub fn set_poll_period(&mut self, period: Duration) {
        self.polling.interval = period;
    }

    /// Delay between cycles.
    #[must_use]
    pub fn poll_period(&self) -> Duration {
        self.polling.interval
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// The checkpoint, for callers that persist it.
    #[must_use]
    pub fn checkpoint(&self) -> Option<&Watermark> {
        self.checkpoint.as_ref()
    }

    /// Resumes from a previously saved checkpoint, or forgets it with `None`.
    pub fn restore_checkpoint(&mut self, checkpoint: Option<Watermark>) {
        self.state = if checkpoint.is_some() {
            WatcherState::Steady
        } else {
            WatcherState::Uninitialized
        };
        self.checkpoint = checkpoint;
    }

    /// Runs one poll cycle.
    ///
    /// The notifier is called even when nothing matched.
    ///
    /// # Errors
    ///
    /// Returns the retrieval error ([`Error::Session`] once the reconnect is spent) or
    /// [`Error::Notify`]. The checkpoint is unchanged in both cases.
    #[instrument(
        name = "MailboxWatcher::poll",
        skip(self),
        fields(folder = %self.polling.folder, state = ?self.state)
    )]
    pub async fn poll(&mut self) -> Result<PollReport> {
        if self.checkpoint.is_none() {
            self.state = WatcherState::Priming;
        }

        let result = self.cycle().await;

        self.state = if self.checkpoint.is_some() {
            WatcherState::Steady
        } else {
            WatcherState::Uninitialized
        };
        result
    }

    async fn cycle(&mut self) -> Result<PollReport> {
        let folder = self.polling.folder.as_str();
        let messages = match &self.checkpoint {
            None => {
                self.session
                    .fetch_last_k(self.polling.prime_batch, folder)
                    .await?
            }
            Some(watermark) => {
                let checkpoint = Checkpoint::Timestamp(watermark.clone());
                self.session.fetch_since(&checkpoint, folder).await?
            }
        };

        let next_checkpoint = Watermark::advance(self.checkpoint.as_ref(), &messages);
        let fetched = messages.len();
        let messages: Vec<Arc<_>> = messages.into_iter().map(Arc::new).collect();

        let matches: Vec<RuleMatch> = self
            .rules
            .iter()
            .flat_map(|rule| {
                messages
                    .iter()
                    .filter(|message| rule.matches(message))
                    .map(|message| RuleMatch {
                        message: Arc::clone(message),
                        rule: rule.name().to_string(),
                    })
            })
            .collect();

        for m in &matches {
            debug!(rule = %m.rule, id = m.message.id().unwrap_or_default(), "Matched");
        }

        self.notifier
            .notify(&matches)
            .await
            .map_err(|source| Error::Notify { source })?;

        self.checkpoint = next_checkpoint;
        let checkpoint = self.checkpoint.as_ref().map(Watermark::timestamp);

        info!(fetched, matched = matches.len(), "Poll cycle complete");

        Ok(PollReport {
            fetched,
            matched: matches.len(),
            checkpoint,
        })
    }

    /// Polls until `shutdown` resolves.
    ///
    /// Cycles run back to back, separated by the poll period. A failed cycle is logged and
    /// the loop continues. `shutdown` is only observed between cycles.
    #[instrument(name = "MailboxWatcher::run_until", skip_all)]
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future,
    {
        tokio::pin!(shutdown);

        loop {
            if let Err(err) = self.poll().await {
                warn!(error = %err, category = %err.category(), "Poll cycle failed");
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                () = tokio::time::sleep(self.polling.interval) => {}
            }
        }

        info!("Watcher stopped");
    }

    /// Closes the mailbox session.
    ///
    /// # Errors
    ///
    /// Returns the CLOSE or LOGOUT failure. The connection is released regardless.
    #[instrument(name = "MailboxWatcher::shutdown", skip(self))]
    pub async fn shutdown(&mut self) -> Result<()> {
        self.session.disconnect().await
    }
}

impl<N, C: MailConnector> std::fmt::Debug for MailboxWatcher<N, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rules: Vec<&str> = self.rules.iter().map(WatchRule::name).collect();
        f.debug_struct("MailboxWatcher")
            .field("session", &self.session)
            .field("rules", &rules)
            .field("polling", &self.polling)
            .field("state", &self.state)
            .field("checkpoint", &self.checkpoint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::message::Message;
    use crate::testing::{credentials, raw_anonymous_at, raw_at, raw_with_subject, FakeMailbox};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records delivered batches; can be switched to refuse them.
    #[derive(Debug, Default)]
    struct RecordingNotifier {
        calls: AtomicUsize,
        failing: AtomicBool,
        batches: Mutex<Vec<Vec<RuleMatch>>>,
    }

    impl RecordingNotifier {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn last_ids(&self) -> Vec<String> {
            self.batches
                .lock()
                .unwrap()
                .last()
                .map(|batch| {
                    batch
                        .iter()
                        .filter_map(|m| m.message.id().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    impl RecordingNotifier {
        fn last_subjects(&self) -> Vec<String> {
            self.batches
                .lock()
                .unwrap()
                .last()
                .map(|batch| {
                    batch
                        .iter()
                        .filter_map(|m| m.message.subject().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, matches: &[RuleMatch]) -> std::result::Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err("sink unavailable".into());
            }
            self.batches.lock().unwrap().push(matches.to_vec());
            Ok(())
        }
    }

    type TestWatcher = MailboxWatcher<Arc<RecordingNotifier>, FakeMailbox>;

    async fn watcher(mailbox: &FakeMailbox) -> (TestWatcher, Arc<RecordingNotifier>) {
        let session = MailboxSession::connect(mailbox.clone(), credentials())
            .await
            .unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut watcher =
            MailboxWatcher::new(session, Arc::clone(&notifier), PollingConfig::default()).unwrap();
        watcher.register_rule(WatchRule::new("everything"));
        (watcher, notifier)
    }

    fn checkpoint_id_set(watcher: &TestWatcher) -> Vec<String> {
        watcher
            .checkpoint()
            .map(|w| w.seen_ids().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_prime_then_incremental() {
        let mailbox = FakeMailbox::with_messages(12);
        let (mut watcher, notifier) = watcher(&mailbox).await;
        assert_eq!(watcher.state(), WatcherState::Uninitialized);

        let report = watcher.poll().await.unwrap();
        assert_eq!(report.fetched, 10);
        assert_eq!(report.matched, 10);
        assert_eq!(watcher.state(), WatcherState::Steady);
        assert_eq!(notifier.last_ids().first().map(String::as_str), Some("<12@test>"));
        assert_eq!(checkpoint_id_set(&watcher), vec!["<12@test>"]);

        let report = watcher.poll().await.unwrap();
        assert_eq!(report.fetched, 0);
        assert_eq!(notifier.calls(), 2);
        assert!(notifier.last_ids().is_empty());

        mailbox.push(raw_at(13, 13));
        mailbox.push(raw_at(14, 14));
        let report = watcher.poll().await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(notifier.last_ids(), vec!["<14@test>", "<13@test>"]);
        assert_eq!(checkpoint_id_set(&watcher), vec!["<14@test>"]);
    }

    #[tokio::test]
    async fn test_empty_mailbox_stays_uninitialized() {
        let mailbox = FakeMailbox::new();
        let (mut watcher, notifier) = watcher(&mailbox).await;

        let report = watcher.poll().await.unwrap();
        assert_eq!(report.fetched, 0);
        assert_eq!(report.checkpoint, None);
        assert_eq!(watcher.state(), WatcherState::Uninitialized);
        assert_eq!(notifier.calls(), 1);

        mailbox.push(raw_at(1, 1));
        watcher.poll().await.unwrap();
        assert_eq!(watcher.state(), WatcherState::Steady);
        assert_eq!(notifier.last_ids(), vec!["<1@test>"]);
    }

    #[tokio::test]
    async fn test_single_fetch_failure_is_invisible() {
        let mailbox = FakeMailbox::with_messages(3);
        let (mut watcher, notifier) = watcher(&mailbox).await;
        watcher.poll().await.unwrap();

        mailbox.push(raw_at(4, 4));
        mailbox.fail_next_fetches(1);
        let report = watcher.poll().await.unwrap();

        assert_eq!(report.fetched, 1);
        assert_eq!(notifier.last_ids(), vec!["<4@test>"]);
        assert_eq!(mailbox.state().connects, 2);
    }

    #[tokio::test]
    async fn test_repeated_fetch_failure_keeps_checkpoint() {
        let mailbox = FakeMailbox::with_messages(3);
        let (mut watcher, notifier) = watcher(&mailbox).await;
        watcher.poll().await.unwrap();
        let before = watcher.checkpoint().cloned();

        mailbox.push(raw_at(4, 4));
        mailbox.fail_next_fetches(2);
        let err = watcher.poll().await.unwrap_err();

        assert!(matches!(err, Error::Session { .. }));
        assert_eq!(watcher.checkpoint().cloned(), before);
        assert_eq!(watcher.state(), WatcherState::Steady);
        assert_eq!(notifier.calls(), 1);

        watcher.poll().await.unwrap();
        assert_eq!(notifier.last_ids(), vec!["<4@test>"]);
    }

    #[tokio::test]
    async fn test_failed_priming_returns_to_uninitialized() {
        let mailbox = FakeMailbox::with_messages(3);
        let (mut watcher, _notifier) = watcher(&mailbox).await;

        mailbox.fail_next_fetches(2);
        assert!(watcher.poll().await.is_err());
        assert_eq!(watcher.state(), WatcherState::Uninitialized);
        assert!(watcher.checkpoint().is_none());
    }

    #[tokio::test]
    async fn test_same_second_arrival_is_delivered_once() {
        let mailbox = FakeMailbox::with_messages(3);
        let (mut watcher, notifier) = watcher(&mailbox).await;
        watcher.poll().await.unwrap();

        // Same Date as message 3.
        mailbox.push(raw_at(4, 3));
        watcher.poll().await.unwrap();
        assert_eq!(notifier.last_ids(), vec!["<4@test>"]);
        assert_eq!(checkpoint_id_set(&watcher), vec!["<3@test>", "<4@test>"]);

        let report = watcher.poll().await.unwrap();
        assert_eq!(report.fetched, 0);
    }

    #[tokio::test]
    async fn test_same_second_arrival_without_message_id() {
        let mailbox = FakeMailbox::new();
        mailbox.push(raw_anonymous_at("first", 3));
        let (mut watcher, notifier) = watcher(&mailbox).await;
        watcher.poll().await.unwrap();
        assert_eq!(notifier.calls(), 1);

        mailbox.push(raw_anonymous_at("second", 3));
        let report = watcher.poll().await.unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(notifier.last_subjects(), vec!["second"]);
        assert_eq!(checkpoint_id_set(&watcher).len(), 2);

        let report = watcher.poll().await.unwrap();
        assert_eq!(report.fetched, 0);
        assert_eq!(notifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_batch_sizes_are_rejected() {
        let mailbox = FakeMailbox::with_messages(3);

        for polling in [
            PollingConfig {
                prime_batch: 0,
                ..PollingConfig::default()
            },
            PollingConfig {
                scan_limit: 0,
                ..PollingConfig::default()
            },
        ] {
            let session = MailboxSession::connect(mailbox.clone(), credentials())
                .await
                .unwrap();
            let notifier = Arc::new(RecordingNotifier::default());
            let result = MailboxWatcher::new(session, notifier, polling);
            assert!(matches!(result, Err(Error::InvalidConfig { .. })));
        }
    }

    #[tokio::test]
    async fn test_failing_notifier_keeps_checkpoint() {
        let mailbox = FakeMailbox::with_messages(3);
        let (mut watcher, notifier) = watcher(&mailbox).await;

        notifier.set_failing(true);
        let err = watcher.poll().await.unwrap_err();
        assert!(matches!(err, Error::Notify { .. }));
        assert_eq!(watcher.state(), WatcherState::Uninitialized);

        notifier.set_failing(false);
        watcher.poll().await.unwrap();
        let checkpoint = watcher.checkpoint().cloned();

        mailbox.push(raw_at(4, 4));
        notifier.set_failing(true);
        assert!(watcher.poll().await.is_err());
        assert_eq!(watcher.checkpoint().cloned(), checkpoint);

        notifier.set_failing(false);
        watcher.poll().await.unwrap();
        assert_eq!(notifier.last_ids(), vec!["<4@test>"]);
    }

    #[tokio::test]
    async fn test_matches_follow_rule_order() {
        let mailbox = FakeMailbox::new();
        mailbox.push(raw_with_subject(1, 1, "Invoice #1"));
        mailbox.push(raw_with_subject(2, 2, "Weekly meeting notes"));
        mailbox.push(raw_with_subject(3, 3, "Invoice #2 and meeting notes"));
        let (mut watcher, notifier) = watcher(&mailbox).await;
        watcher.remove_rule("everything");

        watcher
            .register_patterns("invoices", [("Subject", "(?i)invoice")])
            .unwrap();
        watcher
            .register_patterns("notes", [("Subject", "meeting notes")])
            .unwrap();

        let report = watcher.poll().await.unwrap();
        assert_eq!(report.matched, 4);

        let batch = notifier.batches.lock().unwrap().last().cloned().unwrap();
        let pairs: Vec<(&str, Option<&str>)> = batch
            .iter()
            .map(|m| (m.rule.as_str(), m.message.id()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("invoices", Some("<3@test>")),
                ("invoices", Some("<1@test>")),
                ("notes", Some("<3@test>")),
                ("notes", Some("<2@test>")),
            ]
        );
    }

    #[tokio::test]
    async fn test_register_replaces_by_name() {
        let mailbox = FakeMailbox::new();
        let (mut watcher, _notifier) = watcher(&mailbox).await;

        watcher.register_patterns("a", [("Subject", "x")]).unwrap();
        watcher.register_patterns("b", [("Subject", "y")]).unwrap();
        watcher.register_patterns("a", [("Subject", "z")]).unwrap();

        let names: Vec<&str> = watcher.rules().iter().map(WatchRule::name).collect();
        assert_eq!(names, vec!["everything", "a", "b"]);
        let (_, pattern) = watcher.rules()[1].patterns().next().unwrap();
        assert_eq!(pattern.as_str(), "z");

        assert!(watcher.register_patterns("c", [("Subject", "(")]).is_err());
        assert_eq!(watcher.rules().len(), 3);

        assert!(watcher.remove_rule("a").is_some());
        assert!(watcher.remove_rule("a").is_none());
    }

    #[tokio::test]
    async fn test_restore_checkpoint() {
        let mailbox = FakeMailbox::with_messages(5);
        let (mut watcher, notifier) = watcher(&mailbox).await;

        let third = Message::parse(&raw_at(3, 3), "").unwrap();
        watcher.restore_checkpoint(Watermark::advance(None, &[third]));
        assert_eq!(watcher.state(), WatcherState::Steady);

        watcher.poll().await.unwrap();
        assert_eq!(notifier.last_ids(), vec!["<5@test>", "<4@test>"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_survives_failures_and_stops() {
        let mailbox = FakeMailbox::with_messages(3);
        let (mut watcher, notifier) = watcher(&mailbox).await;
        watcher.set_poll_period(Duration::from_secs(60));
        notifier.set_failing(true);

        watcher
            .run_until(tokio::time::sleep(Duration::from_secs(150)))
            .await;

        // Cycles at 0s, 60s and 120s.
        assert_eq!(notifier.calls(), 3);
        assert!(watcher.checkpoint().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_disconnects() {
        let mailbox = FakeMailbox::with_messages(1);
        let (mut watcher, _notifier) = watcher(&mailbox).await;
        watcher.poll().await.unwrap();

        watcher.shutdown().await.unwrap();
        assert_eq!(mailbox.state().closes, 1);
        assert_eq!(mailbox.state().logouts, 1);
    }
}
