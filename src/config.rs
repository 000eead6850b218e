//! Configuration for watching a mailbox.
//!
//! Use [`MailboxConfigBuilder`] to create a configuration with sensible defaults:
//!
//! ```
//! use mail_watch::MailboxConfig;
//!
//! let config = MailboxConfig::builder()
//!     .email("user@gmail.com")
//!     .password("app-password")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.credentials.imap_host(), "imap.gmail.com");
//! ```

use crate::error::{Error, Result};
use crate::known_servers::ProviderRegistry;
use crate::session::DEFAULT_SCAN_LIMIT;
use email_address::EmailAddress;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::LazyLock;
use std::time::Duration;

/// Folder watched when none is configured.
pub const DEFAULT_FOLDER: &str = "INBOX";

/// Strict address shape: letters, digits and dots, `@`, host, dot, lowercase TLD.
static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[.0-9a-zA-Z]+@[a-zA-Z0-9]+\.[a-z]+$").expect("address pattern is valid")
});

/// Validated login data for one mailbox.
///
/// Note: the password is stored as a [`SecretString`] to prevent accidental
/// logging of credentials.
#[derive(Clone)]
pub struct MailboxCredentials {
    email: EmailAddress,
    password: SecretString,
    provider: String,
    imap_host: String,
}

impl std::fmt::Debug for MailboxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxCredentials")
            .field("email", &self.email.as_str())
            .field("password", &"[REDACTED]")
            .field("provider", &self.provider)
            .field("imap_host", &self.imap_host)
            .finish()
    }
}

impl MailboxCredentials {
    /// Validates the address and resolves its provider.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] if the address fails syntactic validation
    /// - [`Error::UnrecognizedDomain`] if the registry has no provider for its domain
    pub fn new(
        email: &str,
        password: impl Into<String>,
        providers: &ProviderRegistry,
    ) -> Result<Self> {
        let email = validate_email(email)?;
        let provider = providers.resolve(email.as_str())?;

        tracing::debug!(
            email = %email,
            provider = %provider.name,
            imap_host = %provider.imap_host,
            "Mapped address to provider"
        );

        Ok(Self {
            provider: provider.name.clone(),
            imap_host: provider.imap_host.clone(),
            email,
            password: SecretString::from(password.into()),
        })
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Exposes the password for login. Do not log it.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the provider name (`gmail`, `outlook`, ...).
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Returns the IMAP hostname.
    #[must_use]
    pub fn imap_host(&self) -> &str {
        &self.imap_host
    }
}

/// Validates an email address format.
fn validate_email(email: &str) -> Result<EmailAddress> {
    let invalid = || Error::InvalidAddress {
        email: email.to_string(),
    };

    if !ADDRESS_PATTERN.is_match(email) {
        return Err(invalid());
    }

    EmailAddress::parse_with_options(email, email_address::Options::default())
        .map_err(|_| invalid())
}

/// Timeout configuration for IMAP operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for selecting a folder.
    pub select: Duration,
    /// Timeout for fetching message content.
    pub fetch: Duration,
    /// Timeout for close and logout.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            fetch: Duration::from_secs(30),
            logout: Duration::from_secs(5),
        }
    }
}

/// Polling configuration for the watcher.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Delay between two poll cycles.
    pub interval: Duration,
    /// Number of recent messages fetched by the first cycle.
    pub prime_batch: u32,
    /// Maximum number of messages examined when scanning back to the checkpoint.
    pub scan_limit: u32,
    /// Folder to watch.
    pub folder: String,
}

impl PollingConfig {
    /// Checks that the batch sizes are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `prime_batch` or `scan_limit` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.prime_batch == 0 || self.scan_limit == 0 {
            return Err(Error::InvalidConfig {
                message: "prime_batch and scan_limit must be positive".into(),
            });
        }
        Ok(())
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            prime_batch: 10,
            scan_limit: DEFAULT_SCAN_LIMIT,
            folder: DEFAULT_FOLDER.to_string(),
        }
    }
}

/// Configuration for connecting to and watching one mailbox.
///
/// Create using [`MailboxConfig::builder()`].
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Validated login data.
    pub credentials: MailboxCredentials,
    /// IMAP server port (default: 993 for IMAPS).
    pub imap_port: u16,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
    /// Polling configuration.
    pub polling: PollingConfig,
}

impl MailboxConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> MailboxConfigBuilder {
        MailboxConfigBuilder::default()
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.credentials.imap_host(), self.imap_port)
    }
}

/// Builder for [`MailboxConfig`].
#[derive(Debug, Default)]
pub struct MailboxConfigBuilder {
    email: Option<String>,
    password: Option<String>,
    imap_port: Option<u16>,
    providers: Option<ProviderRegistry>,
    timeouts: Option<TimeoutConfig>,
    polling: Option<PollingConfig>,
}

impl MailboxConfigBuilder {
    /// Sets the email address (required).
    ///
    /// The first label of its domain selects the provider.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the password (required).
    ///
    /// For Gmail/Outlook, use an app-specific password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the IMAP server port.
    ///
    /// Default is 993 (IMAPS with TLS).
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets the provider table used to resolve the IMAP host.
    ///
    /// Defaults to [`ProviderRegistry::with_defaults`].
    ///
    /// # Example
    ///
    /// ```
    /// use mail_watch::{MailboxConfig, ProviderRegistry};
    ///
    /// let mut providers = ProviderRegistry::with_defaults();
    /// providers.register("mycompany", "corp", "mail.internal.mycompany.com");
    ///
    /// let config = MailboxConfig::builder()
    ///     .email("user@mycompany.com")
    ///     .password("secret")
    ///     .providers(providers)
    ///     .build()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.credentials.imap_host(), "mail.internal.mycompany.com");
    /// ```
    #[must_use]
    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the fetch timeout.
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .fetch = timeout;
        self
    }

    /// Sets polling configuration.
    #[must_use]
    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = Some(polling);
        self
    }

    /// Sets the delay between poll cycles.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .interval = interval;
        self
    }

    /// Sets how many recent messages the first cycle fetches.
    #[must_use]
    pub fn prime_batch(mut self, count: u32) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .prime_batch = count;
        self
    }

    /// Sets how many messages a checkpoint scan examines at most.
    #[must_use]
    pub fn scan_limit(mut self, limit: u32) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .scan_limit = limit;
        self
    }

    /// Sets the folder to watch.
    #[must_use]
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .folder = folder.into();
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a required field is missing or a polling value
    /// is zero, [`Error::InvalidAddress`] or [`Error::UnrecognizedDomain`] if the address
    /// cannot be mapped to a provider.
    pub fn build(self) -> Result<MailboxConfig> {
        let email = self.email.ok_or_else(|| Error::InvalidConfig {
            message: "email is required".into(),
        })?;

        let password = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "password is required".into(),
        })?;

        let providers = self.providers.unwrap_or_default();
        let credentials = MailboxCredentials::new(&email, password, &providers)?;

        let polling = self.polling.unwrap_or_default();
        polling.validate()?;

        Ok(MailboxConfig {
            credentials,
            imap_port: self.imap_port.unwrap_or(993),
            timeouts: self.timeouts.unwrap_or_default(),
            polling,
        })
    }
}
