mod cli;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use inbox_relay::core::config::RelayConfig;
use inbox_relay::core::error::SyncError;
use inbox_relay::infrastructure::imap::ImapMailbox;
use inbox_relay::infrastructure::logging::init_logging;
use inbox_relay::services::sync::{HttpImporter, Mailbox, SmtpNotifier, SyncEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(path) = &cli.env_file {
        dotenv::from_path(path).ok();
    }

    init_logging("inbox-relay")?;

    let config = RelayConfig::from_env()?;
    info!(
        "Starting inbox-relay for {} on {}:{}",
        config.username, config.imap_server, config.imap_port
    );

    if cli.check {
        return check(&config).await;
    }

    let (watchdog_tx, watchdog_rx) = mpsc::channel::<Option<SyncError>>(8);
    tokio::spawn(monitor_liveness(watchdog_rx, config.liveness_window()));

    let importer = Arc::new(HttpImporter::new(&config));
    let notifier = Arc::new(SmtpNotifier::new(&config));
    let mut engine = SyncEngine::new(&config, ImapMailbox::new(&config), importer, notifier);

    loop {
        let err = engine.run(watchdog_tx.clone()).await;
        match err {
            SyncError::Auth(_) => {
                error!("Credentials rejected, not retrying: {}", err);
                return Err(err.into());
            }
            other => {
                error!(
                    "Sync loop ended: {}; reconnecting in {:?}",
                    other, RECONNECT_DELAY
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Connectivity check: authenticate, LIST every folder, log out.
async fn check(config: &RelayConfig) -> Result<()> {
    let mut mailbox = ImapMailbox::new(config);
    mailbox.connect().await?;
    for name in mailbox.list_folders().await? {
        info!("Folder: {}", name);
    }
    mailbox.logout().await?;
    info!("Connectivity check passed");
    Ok(())
}

/// Reads the watchdog channel; silence for a full liveness window means the
/// loop is stuck in a protocol operation that never came back.
async fn monitor_liveness(mut rx: mpsc::Receiver<Option<SyncError>>, window: Duration) {
    loop {
        match tokio::time::timeout(window, rx.recv()).await {
            Ok(Some(None)) => debug!("Watchdog pulse received"),
            Ok(Some(Some(e))) => warn!("Watchdog error pulse: {}", e),
            Ok(None) => {
                debug!("Watchdog channel closed");
                return;
            }
            Err(_) => error!(
                "No watchdog pulse within {:?}; sync loop may be hung",
                window
            ),
        }
    }
}
