//! Mail provider discovery from email domains.
//!
//! An address like `user@gmail.com` is resolved by its first domain label (`gmail`) to a
//! [`Provider`] carrying the IMAP host to connect to. Unlike a best-effort guess, an
//! unregistered label is an error: watching a mailbox on an unknown host is a
//! misconfiguration.
//!
//! # Example
//!
//! ```
//! use mail_watch::known_servers::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::with_defaults();
//! assert_eq!(registry.resolve("user@gmail.com").unwrap().imap_host, "imap.gmail.com");
//! assert_eq!(registry.resolve("user@hotmail.fr").unwrap().name, "outlook");
//!
//! registry.register("mycompany", "mycompany", "mail.mycompany.com");
//! assert_eq!(registry.resolve("user@mycompany.com").unwrap().imap_host, "mail.mycompany.com");
//!
//! assert!(registry.resolve("user@yahoo.com").is_err());
//! ```

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Built-in domain labels and the providers serving them.
static KNOWN_PROVIDERS: LazyLock<BTreeMap<&'static str, Provider>> = LazyLock::new(|| {
    let mut m = BTreeMap::new();

    // Google
    m.insert("gmail", Provider::new("gmail", "imap.gmail.com"));

    // Microsoft
    m.insert("hotmail", Provider::new("outlook", "imap.outlook.com"));

    m
});

/// A mail service and the IMAP endpoint it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    /// Provider name, e.g. `outlook` for hotmail addresses.
    pub name: String,
    /// IMAP server hostname.
    pub imap_host: String,
}

impl Provider {
    /// Creates a provider entry.
    #[must_use]
    pub fn new(name: impl Into<String>, imap_host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            imap_host: imap_host.into(),
        }
    }
}

/// A customizable table of domain labels to providers.
///
/// Passed to [`MailboxConfigBuilder::providers`](crate::MailboxConfigBuilder::providers)
/// so new providers can be added without touching the session.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    custom: BTreeMap<String, Provider>,
    use_defaults: bool,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry without built-in providers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            custom: BTreeMap::new(),
            use_defaults: false,
        }
    }

    /// Creates a registry that includes the built-in providers.
    ///
    /// Entries added via [`Self::register`] override them.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            custom: BTreeMap::new(),
            use_defaults: true,
        }
    }

    /// Registers a domain label, overriding any existing entry.
    pub fn register(
        &mut self,
        label: impl Into<String>,
        provider: impl Into<String>,
        imap_host: impl Into<String>,
    ) {
        self.custom.insert(
            label.into().to_lowercase(),
            Provider::new(provider, imap_host),
        );
    }

    /// Removes a custom entry. Built-in providers are unaffected.
    pub fn unregister(&mut self, label: &str) -> Option<Provider> {
        self.custom.remove(&label.to_lowercase())
    }

    /// Looks up a domain label (`gmail`, `hotmail`, ...).
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Provider> {
        let label = label.to_lowercase();
        self.custom.get(&label).or_else(|| {
            if self.use_defaults {
                KNOWN_PROVIDERS.get(label.as_str())
            } else {
                None
            }
        })
    }

    /// Resolves the provider for an email address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address has no domain part and
    /// [`Error::UnrecognizedDomain`] if its first domain label is not registered.
    pub fn resolve(&self, email: &str) -> Result<&Provider> {
        let label = domain_label(email).ok_or_else(|| Error::InvalidAddress {
            email: email.to_string(),
        })?;

        self.get(label).ok_or_else(|| Error::UnrecognizedDomain {
            domain: label.to_lowercase(),
            known: self.labels().join(", "),
        })
    }

    /// Returns `true` if the label has a provider.
    #[must_use]
    pub fn is_known(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    /// Returns all registered labels in sorted order.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.custom.keys().map(String::as_str).collect();

        if self.use_defaults {
            for &label in KNOWN_PROVIDERS.keys() {
                if !self.custom.contains_key(label) {
                    labels.push(label);
                }
            }
        }

        labels.sort_unstable();
        labels
    }

    /// Returns the number of registered labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels().len()
    }

    /// Returns `true` if the registry has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// First label of the address's domain: `gmail` for `user@gmail.com`.
fn domain_label(email: &str) -> Option<&str> {
    let (_, domain) = email.split_once('@')?;
    domain.split('.').next().filter(|label| !label.is_empty())
}
