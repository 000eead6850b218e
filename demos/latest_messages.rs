//! Demo: Print the headers of the most recent messages.
//!
//! # Usage
//!
//! ```bash
//! export EMAIL_ADDRESS="your@gmail.com"
//! export EMAIL_PASSWORD="your-app-password"
//! cargo run --example latest_messages -- 5
//! ```

use mail_watch::{MailboxConfig, MailboxSession, DEFAULT_FOLDER};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> mail_watch::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mail_watch=warn")),
        )
        .init();

    dotenvy::dotenv().ok();
    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");
    let count: u32 = env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(10);

    let config = MailboxConfig::builder()
        .email(email)
        .password(password)
        .build()?;

    println!("Connecting to {}...", config.server_address());
    let mut session = MailboxSession::open(&config).await?;

    for message in session.fetch_last_k(count, DEFAULT_FOLDER).await? {
        println!("─────────────────────────────────────────");
        for (field, value) in message.headers() {
            if let Some(value) = value {
                println!("{field:>12}: {value}");
            }
        }
        println!("{:>12}: {}", "Flags", message.flags());
    }

    session.disconnect().await?;
    Ok(())
}
