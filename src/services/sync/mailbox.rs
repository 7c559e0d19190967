use crate::core::error::SyncResult;
use async_trait::async_trait;
use std::time::Duration;

/// Server-assigned message identifier, valid only within the current folder
/// selection (one UIDVALIDITY generation).
pub type Uid = u32;

/// Envelope data for one message; fetched on demand, never cached across
/// passes.
#[derive(Clone, Debug)]
pub struct MessageMeta {
    pub subject: String,
    pub message_id: String,
    pub flags: Vec<String>,
    pub size: u32,
}

/// Snapshot of the selected folder at selection time. Stale as soon as
/// messages arrive or are moved; refreshed only by re-selecting.
#[derive(Clone, Copy, Debug)]
pub struct MailboxView {
    pub exists: u32,
}

/// How an idle wait ended. Both outcomes hand control back to the loop for a
/// fresh listing pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleOutcome {
    /// The server pushed a change notification before the budget elapsed.
    Notified,
    /// The budget elapsed with no activity; liveness check forced.
    TimedOut,
}

/// Operations the engine needs from one authenticated IMAP connection.
///
/// Implementations own the session exclusively; no caller holds a session
/// reference across passes. The real implementation is
/// [`crate::infrastructure::imap::ImapMailbox`].
#[async_trait]
pub trait Mailbox: Send {
    /// Establish the connection and authenticate. No-op when already live.
    async fn connect(&mut self) -> SyncResult<()>;

    /// Release the connection on all exit paths.
    async fn logout(&mut self) -> SyncResult<()>;

    async fn select(&mut self, folder: &str) -> SyncResult<MailboxView>;

    /// UIDs of messages awaiting intake in the selected folder, newest first.
    async fn search_pending(&mut self) -> SyncResult<Vec<Uid>>;

    /// Envelope, flags and size for one message. `None` when the server
    /// returns no data for the UID.
    async fn fetch_meta(&mut self, uid: Uid) -> SyncResult<Option<MessageMeta>>;

    /// Full raw RFC822 content for one message.
    async fn fetch_body(&mut self, uid: Uid) -> SyncResult<Option<Vec<u8>>>;

    async fn copy(&mut self, refs: &[Uid], target: &str) -> SyncResult<()>;

    async fn mark_deleted(&mut self, refs: &[Uid]) -> SyncResult<()>;

    /// Permanently removes every `\Deleted` message in the selected folder,
    /// including ones flagged by earlier interrupted relocations.
    async fn expunge(&mut self) -> SyncResult<()>;

    /// Block on server change notifications, bounded by `budget`.
    async fn idle_wait(&mut self, budget: Duration) -> SyncResult<IdleOutcome>;
}
