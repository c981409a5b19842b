//! Intent daemon
//!
//! Boots the intent executor with the default factory handlers and speaks a
//! JSON-line protocol on stdin / stdout. Expired confirmations are purged on a
//! fixed interval.

mod command;
mod demo;

use intent_core::{bootstrap, HandlerRegistry, IntentConfig};
use intent_handlers::{default_definitions, register_default_handlers};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[intent-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = IntentConfig::load()?;
    let mut registry = HandlerRegistry::new();
    register_default_handlers(&mut registry, &demo::demo_services())?;
    let executor = Arc::new(bootstrap(&config, registry, default_definitions())?);

    tracing::info!(
        backend = ?config.storage_backend,
        ttl_secs = config.confirmation_ttl_secs,
        purge_interval_secs = config.purge_interval_secs,
        factory = demo::DEMO_FACTORY,
        "intent daemon started"
    );

    let mut purge = tokio::time::interval(config.purge_interval());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            _ = purge.tick() => {
                match executor.purge_expired_confirmations() {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "expired confirmations purged"),
                    Err(e) => tracing::warn!(error = %e, "confirmation purge failed"),
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("stdin closed; shutting down daemon");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = command::handle_line(&executor, &line).await;
                stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down daemon");
                break;
            }
        }
    }
    Ok(())
}
