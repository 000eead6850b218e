//! Error types for the mail-watch crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Errors are categorized by their retryability - see [`Error::is_retryable`]. A retryable
//! error raised inside a retrieval makes the session reconnect once and repeat the call.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by notification sinks.
pub type NotifyError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while watching a mailbox.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// The email address failed syntactic validation.
    #[error("invalid email address: {email}")]
    InvalidAddress {
        /// The rejected address.
        email: String,
    },

    /// The address's domain has no registered provider.
    #[error("domain '{domain}' not recognized, must be one of: {known}")]
    UnrecognizedDomain {
        /// The domain label taken from the address.
        domain: String,
        /// Comma-separated list of registered provider keys.
        known: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// A rule pattern failed to compile.
    #[error("invalid pattern for field '{field}'")]
    InvalidPattern {
        /// Header field the pattern was meant for.
        field: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Authentication errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// The server rejected the login.
    #[error("credentials rejected for {email}: {reason}")]
    InvalidCredentials {
        /// The email address used for login.
        email: String,
        /// Server response text.
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Network / connection errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Timeout errors (mixed retryability)
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {email} after {timeout:?}")]
    AuthTimeout {
        /// The email address used for authentication.
        email: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Folder selection timeout.
    #[error("folder selection timeout for '{folder}' after {timeout:?}")]
    SelectTimeout {
        /// The folder name.
        folder: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Message fetch timeout.
    #[error("message fetch timeout for sequence set {range} after {timeout:?}")]
    FetchTimeout {
        /// The sequence set being fetched.
        range: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Logout timeout (not critical).
    #[error("logout timeout after {timeout:?}")]
    LogoutTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IMAP protocol errors (RETRYABLE - session may have expired server-side)
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP login failed for a reason other than rejected credentials.
    #[error("IMAP login failed for {email}")]
    Login {
        /// The email address used for login.
        email: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to select a folder.
    #[error("failed to select folder '{folder}'")]
    SelectFolder {
        /// The folder name.
        folder: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP fetch failed.
    #[error("IMAP fetch failed for sequence set {range}")]
    Fetch {
        /// The sequence set that failed.
        range: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to read a message from the fetch stream.
    #[error("failed to fetch message from stream")]
    FetchMessage {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP CLOSE failed.
    #[error("IMAP close failed")]
    Close {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// A retrieval was attempted without a live connection.
    #[error("no live mailbox connection")]
    NotConnected,

    /// IMAP logout failed.
    #[error("IMAP logout failed")]
    Logout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Session errors (NOT retryable - the reconnect attempt is already spent)
    // ─────────────────────────────────────────────────────────────────────────
    /// A retrieval failed again after reconnecting.
    #[error("mailbox session failed after reconnecting")]
    Session {
        /// The last failure.
        #[source]
        source: Box<Error>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Message parsing errors (NOT retryable - malformed content won't change)
    // ─────────────────────────────────────────────────────────────────────────
    /// The message has no `Date` header.
    #[error("message has no Date header")]
    MissingDate,

    /// The `Date` header did not parse.
    #[error("failed to parse date '{raw}'")]
    DateParse {
        /// The raw header value.
        raw: String,
        /// The underlying chrono error.
        #[source]
        source: chrono::ParseError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Notification errors (NOT retryable - the sink owns its retry policy)
    // ─────────────────────────────────────────────────────────────────────────
    /// The notification sink refused the batch.
    #[error("notification sink failed")]
    Notify {
        /// The sink's error.
        #[source]
        source: NotifyError,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on retry.
    ///
    /// The session uses this to decide whether to reconnect:
    ///
    /// ```
    /// use mail_watch::Error;
    ///
    /// let err = Error::NotConnected;
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::MissingDate;
    /// assert!(!err.is_retryable());
    /// ```
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            // RETRYABLE errors: network, connection timeouts, IMAP operations
            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::SelectTimeout { .. }
            | Error::FetchTimeout { .. }
            | Error::Login { .. }
            | Error::SelectFolder { .. }
            | Error::Fetch { .. }
            | Error::FetchMessage { .. }
            | Error::Close { .. }
            | Error::NotConnected => true,

            // NOT retryable: config, credentials, logout, exhausted session, parsing, sink
            Error::InvalidAddress { .. }
            | Error::UnrecognizedDomain { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidPattern { .. }
            | Error::InvalidDnsName { .. }
            | Error::InvalidCredentials { .. }
            | Error::LogoutTimeout { .. }
            | Error::Logout { .. }
            | Error::Session { .. }
            | Error::MissingDate
            | Error::DateParse { .. }
            | Error::Notify { .. } => false,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidAddress { .. }
            | Error::UnrecognizedDomain { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidPattern { .. }
            | Error::InvalidDnsName { .. } => ErrorCategory::Configuration,

            Error::InvalidCredentials { .. } => ErrorCategory::Authentication,

            Error::TcpConnect { .. } | Error::TlsConnect { .. } => ErrorCategory::Network,

            Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::SelectTimeout { .. }
            | Error::FetchTimeout { .. }
            | Error::LogoutTimeout { .. } => ErrorCategory::Timeout,

            Error::Login { .. }
            | Error::SelectFolder { .. }
            | Error::Fetch { .. }
            | Error::FetchMessage { .. }
            | Error::Close { .. }
            | Error::NotConnected
            | Error::Logout { .. } => ErrorCategory::Protocol,

            Error::Session { .. } => ErrorCategory::Session,

            Error::MissingDate | Error::DateParse { .. } => ErrorCategory::Parse,

            Error::Notify { .. } => ErrorCategory::Notification,
        }
    }

    /// Wraps the last failure of a retried retrieval.
    pub(crate) fn session(source: Error) -> Self {
        Error::Session {
            source: Box::new(source),
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// The server rejected the credentials.
    Authentication,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Protocol,
    /// Retrieval failed even after reconnecting.
    Session,
    /// Message parsing errors.
    Parse,
    /// Notification sink errors.
    Notification,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Authentication => write!(f, "authentication"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Session => write!(f, "session"),
            ErrorCategory::Parse => write!(f, "parse"),
            ErrorCategory::Notification => write!(f, "notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        // Configuration errors are not retryable
        let err = Error::InvalidAddress {
            email: "bad".into(),
        };
        assert!(!err.is_retryable());

        // Rejected credentials won't improve by reconnecting
        let err = Error::InvalidCredentials {
            email: "user@gmail.com".into(),
            reason: "AUTHENTICATIONFAILED".into(),
        };
        assert!(!err.is_retryable());

        // Network errors are retryable
        let err = Error::TcpConnect {
            target: "imap.gmail.com:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.is_retryable());

        // Dropped sessions are retryable
        let err = Error::Fetch {
            range: "12".into(),
            source: async_imap::error::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
        };
        assert!(err.is_retryable());

        // The reconnect budget is spent once wrapped
        let err = Error::session(Error::NotConnected);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        let err = Error::UnrecognizedDomain {
            domain: "yahoo".into(),
            known: "gmail, hotmail".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = Error::ConnectTimeout {
            target: "imap.gmail.com:993".into(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.category(), ErrorCategory::Timeout);

        assert_eq!(Error::MissingDate.category(), ErrorCategory::Parse);
        assert_eq!(
            Error::session(Error::NotConnected).category(),
            ErrorCategory::Session
        );
    }

    #[test]
    fn test_unrecognized_domain_lists_known_providers() {
        let err = Error::UnrecognizedDomain {
            domain: "yahoo".into(),
            known: "gmail, hotmail".into(),
        };
        let message = err.to_string();
        assert!(message.contains("yahoo"));
        assert!(message.contains("gmail, hotmail"));
    }

    #[test]
    fn test_session_error_keeps_source() {
        let err = Error::session(Error::NotConnected);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("no live mailbox connection"));
    }
}
