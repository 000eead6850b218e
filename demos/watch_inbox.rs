//! Demo: Watch the inbox and log messages matching a few rules.
//!
//! The first cycle primes with the 10 most recent messages, later cycles only report what
//! arrived since. Matches are printed from a channel.
//!
//! # Usage
//!
//! ```bash
//! export EMAIL_ADDRESS="your@gmail.com"
//! export EMAIL_PASSWORD="your-app-password"
//! # Set log level (trace, debug, info, warn, error)
//! export RUST_LOG=mail_watch=debug
//!
//! cargo run --example watch_inbox
//! ```
//!
//! For Gmail, you'll need to use an [App Password](https://support.google.com/accounts/answer/185833).

use mail_watch::{ChannelNotifier, MailboxConfig, MailboxWatcher};
use std::env;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> mail_watch::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mail_watch=info")),
        )
        .with_target(true)
        .init();

    dotenvy::dotenv().ok();
    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    let config = MailboxConfig::builder()
        .email(&email)
        .password(password)
        .poll_interval(Duration::from_secs(30))
        .build()?;

    let (notifier, mut matches) = ChannelNotifier::channel(32);
    let mut watcher = MailboxWatcher::connect(config, notifier).await?;

    watcher.register_patterns("invoices", [("Subject", "(?i)invoice|receipt")])?;
    watcher.register_patterns("security", [("Subject", "(?i)security alert|sign-in")])?;
    watcher.register_patterns("self", [("From", regex::escape(&email))])?;

    let printer = tokio::spawn(async move {
        while let Some(batch) = matches.recv().await {
            for m in batch {
                println!(
                    "[{}] {} | {} | {}",
                    m.rule,
                    m.message.date(),
                    m.message.from().unwrap_or("?"),
                    m.message.subject().unwrap_or("(no subject)")
                );
            }
        }
    });

    println!("Watching {email}, press Ctrl+C to stop");
    watcher
        .run_until(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;

    if let Some(checkpoint) = watcher.checkpoint() {
        println!("Stopped at {}", checkpoint.timestamp());
    }
    watcher.shutdown().await?;
    drop(watcher);
    printer.await.ok();

    Ok(())
}
