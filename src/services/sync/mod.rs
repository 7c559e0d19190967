pub mod engine;
pub mod idle;
pub mod importer;
pub mod mailbox;
pub mod notifier;
pub mod relocate;

pub use engine::{IntakeOutcome, SyncEngine, WatchdogTx};
pub use importer::{HttpImporter, ImportError, MessageImporter};
pub use mailbox::{IdleOutcome, Mailbox, MailboxView, MessageMeta, Uid};
pub use notifier::{Notifier, SmtpNotifier};
pub use relocate::relocate;
