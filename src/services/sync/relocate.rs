//! Folder relocation: the copy → mark `\Deleted` → expunge sequence that
//! moves messages between folders. This is the only mechanism that removes a
//! message from the inbox, and therefore the commit point for declaring a
//! message processed.

use crate::core::error::MoveError;
use crate::services::sync::mailbox::{Mailbox, Uid};
use tracing::{debug, info};

/// Moves `refs` into `target`. Three sequential remote steps; each must fully
/// succeed before the next begins, and a failing step aborts the sequence.
///
/// An empty ref set is a no-op: skipping the expunge keeps unrelated
/// `\Deleted` messages untouched, which makes re-invocation on an
/// already-expunged set safe.
pub async fn relocate<M>(mailbox: &mut M, refs: &[Uid], target: &str) -> Result<(), MoveError>
where
    M: Mailbox + ?Sized,
{
    if refs.is_empty() {
        debug!("relocate: empty ref set, nothing to do");
        return Ok(());
    }

    info!("relocate: copy {:?} to {:?}...", refs, target);
    mailbox.copy(refs, target).await.map_err(|e| MoveError::Copy {
        folder: target.to_string(),
        reason: e.to_string(),
    })?;

    info!("relocate: mark \\Deleted...");
    mailbox
        .mark_deleted(refs)
        .await
        .map_err(|e| MoveError::MarkDeleted {
            reason: e.to_string(),
        })?;

    info!("relocate: expunge...");
    mailbox.expunge().await.map_err(|e| MoveError::Expunge {
        reason: e.to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{SyncError, SyncResult};
    use crate::services::sync::mailbox::{IdleOutcome, MailboxView, MessageMeta};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Records the remote steps taken and fails on request.
    #[derive(Default)]
    struct StepRecorder {
        steps: Vec<&'static str>,
        fail_on: Option<&'static str>,
    }

    impl StepRecorder {
        fn step(&mut self, name: &'static str) -> SyncResult<()> {
            self.steps.push(name);
            if self.fail_on == Some(name) {
                Err(SyncError::Fetch(format!("{} refused", name)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Mailbox for StepRecorder {
        async fn connect(&mut self) -> SyncResult<()> {
            unimplemented!()
        }
        async fn logout(&mut self) -> SyncResult<()> {
            unimplemented!()
        }
        async fn select(&mut self, _folder: &str) -> SyncResult<MailboxView> {
            unimplemented!()
        }
        async fn search_pending(&mut self) -> SyncResult<Vec<Uid>> {
            unimplemented!()
        }
        async fn fetch_meta(&mut self, _uid: Uid) -> SyncResult<Option<MessageMeta>> {
            unimplemented!()
        }
        async fn fetch_body(&mut self, _uid: Uid) -> SyncResult<Option<Vec<u8>>> {
            unimplemented!()
        }
        async fn copy(&mut self, _refs: &[Uid], _target: &str) -> SyncResult<()> {
            self.step("copy")
        }
        async fn mark_deleted(&mut self, _refs: &[Uid]) -> SyncResult<()> {
            self.step("mark")
        }
        async fn expunge(&mut self) -> SyncResult<()> {
            self.step("expunge")
        }
        async fn idle_wait(&mut self, _budget: Duration) -> SyncResult<IdleOutcome> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let mut mailbox = StepRecorder::default();
        relocate(&mut mailbox, &[4, 2], "Moved").await.unwrap();
        assert_eq!(mailbox.steps, vec!["copy", "mark", "expunge"]);
    }

    #[tokio::test]
    async fn test_empty_ref_set_is_a_no_op() {
        let mut mailbox = StepRecorder::default();
        relocate(&mut mailbox, &[], "Moved").await.unwrap();
        assert!(mailbox.steps.is_empty());
    }

    #[tokio::test]
    async fn test_copy_failure_aborts_before_mark() {
        let mut mailbox = StepRecorder {
            fail_on: Some("copy"),
            ..Default::default()
        };
        let err = relocate(&mut mailbox, &[1], "Quarantine").await.unwrap_err();
        assert_eq!(err.step(), "copy");
        assert_eq!(mailbox.steps, vec!["copy"]);
    }

    #[tokio::test]
    async fn test_mark_failure_aborts_before_expunge() {
        let mut mailbox = StepRecorder {
            fail_on: Some("mark"),
            ..Default::default()
        };
        let err = relocate(&mut mailbox, &[1], "Quarantine").await.unwrap_err();
        assert_eq!(err.step(), "mark-deleted");
        assert_eq!(mailbox.steps, vec!["copy", "mark"]);
    }
}
