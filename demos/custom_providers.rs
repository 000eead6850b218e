//! Demo: Register a self-hosted provider and handle configuration errors.
//!
//! Runs offline: it only builds configurations.
//!
//! ```bash
//! cargo run --example custom_providers
//! ```

use mail_watch::{Error, MailboxConfig, ProviderRegistry};

fn main() {
    let mut providers = ProviderRegistry::with_defaults();
    providers.register("mycompany", "mycompany", "imap.mycompany.com");
    println!("Known providers: {}", providers.labels().join(", "));

    for email in [
        "alice@mycompany.com",
        "bob@gmail.com",
        "carol@hotmail.fr",
        "dave@yahoo.com",
        "not-an-address",
    ] {
        let result = MailboxConfig::builder()
            .email(email)
            .password("secret")
            .providers(providers.clone())
            .build();

        match result {
            Ok(config) => println!(
                "{email:<22} -> {} ({})",
                config.server_address(),
                config.credentials.provider()
            ),
            Err(err @ Error::UnrecognizedDomain { .. }) => {
                println!("{email:<22} -> unknown provider: {err}");
            }
            Err(err) => println!("{email:<22} -> {} error: {err}", err.category()),
        }
    }
}
