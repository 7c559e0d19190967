use crate::core::config::RelayConfig;
use crate::core::error::{SyncError, SyncResult};
use crate::services::sync::importer::MessageImporter;
use crate::services::sync::mailbox::{Mailbox, MessageMeta, Uid};
use crate::services::sync::notifier::Notifier;
use crate::services::sync::relocate::relocate;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Liveness channel fed by the loop. One `None` per fully completed pass;
/// the supervisor reads silence as a hang.
pub type WatchdogTx = mpsc::Sender<Option<SyncError>>;

/// Terminal state of one intake. Quarantine is a successful outcome: the
/// failure has been handled by relocating the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntakeOutcome {
    Imported,
    Quarantined,
}

/// The top-level driver: drains the inbox through the intake pipeline, then
/// blocks on the idle wait until new activity or the fallback timeout.
pub struct SyncEngine<M: Mailbox> {
    config: RelayConfig,
    mailbox: M,
    importer: Arc<dyn MessageImporter>,
    notifier: Arc<dyn Notifier>,
}

impl<M: Mailbox> SyncEngine<M> {
    pub fn new(
        config: &RelayConfig,
        mailbox: M,
        importer: Arc<dyn MessageImporter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config: config.clone(),
            mailbox,
            importer,
            notifier,
        }
    }

    pub fn mailbox(&self) -> &M {
        &self.mailbox
    }

    /// Runs until the session fails. Returns the fatal error; the caller
    /// decides whether to restart with a fresh session.
    pub async fn run(&mut self, watchdog: WatchdogTx) -> SyncError {
        loop {
            let pass = AssertUnwindSafe(self.run_pass(&watchdog)).catch_unwind().await;
            match pass {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let _ = self.mailbox.logout().await;
                    return e;
                }
                Err(panic) => {
                    // The session that panicked is as dead as one that errored.
                    let _ = self.mailbox.logout().await;
                    return SyncError::Panic(panic_message(panic));
                }
            }
        }
    }

    /// One full pass: session, listing, intake of every pending ref, idle
    /// wait, watchdog pulse.
    async fn run_pass(&mut self, watchdog: &WatchdogTx) -> SyncResult<()> {
        self.mailbox.connect().await?;
        let view = self.mailbox.select(&self.config.folder_inbox).await?;
        info!(
            "Selected {:?}: {} messages",
            self.config.folder_inbox, view.exists
        );

        let refs = self.mailbox.search_pending().await?;
        info!("{} pending messages", refs.len());

        for uid in refs {
            match self.intake(uid).await {
                Ok(IntakeOutcome::Imported) => info!("uid {}: imported and moved", uid),
                Ok(IntakeOutcome::Quarantined) => info!("uid {}: quarantined", uid),
                // One malformed message must not block the whole mailbox;
                // the ref stays pending and is retried on the next pass.
                Err(e) => error!("uid {}: intake failed: {}", uid, e),
            }
        }

        self.mailbox.idle_wait(self.config.idle_timeout).await?;

        // Fire-and-forget; a full buffer must never stall the loop.
        if watchdog.try_send(None).is_err() {
            warn!("Watchdog channel full or closed, pulse dropped");
        }
        Ok(())
    }

    /// The intake pipeline for exactly one message: fetch metadata, apply the
    /// size gate, fetch and import the body, then relocate. Every terminal
    /// branch ends in a relocation, so the inbox never silently accumulates a
    /// processed-but-not-moved message.
    async fn intake(&mut self, uid: Uid) -> SyncResult<IntakeOutcome> {
        let meta = self
            .mailbox
            .fetch_meta(uid)
            .await?
            .ok_or_else(|| SyncError::Fetch(format!("uid {}: no envelope returned", uid)))?;
        info!(
            "uid {}: size={} flags={:?} id={} subject={:?}",
            uid, meta.size, meta.flags, meta.message_id, meta.subject
        );

        if meta.size > self.config.max_message_size {
            info!(
                "uid {}: message too big ({} > {} bytes), quarantining",
                uid, meta.size, self.config.max_message_size
            );
            self.notify_quarantine(
                &meta,
                &format!("Message too big: {} bytes\nsubject={}", meta.size, meta.subject),
            )
            .await;
            relocate(&mut self.mailbox, &[uid], &self.config.folder_quarantine).await?;
            return Ok(IntakeOutcome::Quarantined);
        }

        let body = self
            .mailbox
            .fetch_body(uid)
            .await?
            .ok_or_else(|| SyncError::Fetch(format!("uid {}: no body returned", uid)))?;

        if let Err(e) = self.importer.import(&body).await {
            warn!("uid {}: importer rejected message, quarantining: {}", uid, e);
            self.notify_quarantine(
                &meta,
                &format!("Import error: {}\nsubject={}", e, meta.subject),
            )
            .await;
            relocate(&mut self.mailbox, &[uid], &self.config.folder_quarantine).await?;
            return Ok(IntakeOutcome::Quarantined);
        }

        relocate(&mut self.mailbox, &[uid], &self.config.folder_moved).await?;
        Ok(IntakeOutcome::Imported)
    }

    async fn notify_quarantine(&self, meta: &MessageMeta, body: &str) {
        let subject = format!("Moving message to quarantine mid={}", meta.message_id);
        if let Err(e) = self.notifier.notify(&subject, body).await {
            warn!("Notification failed (continuing): {}", e);
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
