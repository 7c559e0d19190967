use thiserror::Error;

/// Errors surfaced by the synchronization engine.
///
/// Fetch and import problems are absorbed at the intake boundary whenever the
/// message can still be quarantined; everything else propagates to the loop
/// and ends the current session.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("connect: {0}")]
    Connect(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("fetch: {0}")]
    Fetch(String),

    #[error("{op}: {reason}")]
    Command { op: &'static str, reason: String },

    #[error(transparent)]
    Move(#[from] MoveError),

    #[error("idle: {0}")]
    Idle(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("recovered panic in sync loop: {0}")]
    Panic(String),
}

/// A relocation failure, naming the step that broke off the sequence.
///
/// Copy/mark/expunge are strictly ordered; the caller must not assume any
/// later step ran. A message that was copied and marked but not expunged is
/// in transit, not lost: it stays out of the pending set (search is
/// `UNDELETED`) and the next successful expunge sweeps it.
#[derive(Error, Debug)]
pub enum MoveError {
    #[error("copy to {folder:?} failed: {reason}")]
    Copy { folder: String, reason: String },

    #[error("mark \\Deleted failed: {reason}")]
    MarkDeleted { reason: String },

    #[error("expunge failed: {reason}")]
    Expunge { reason: String },
}

impl MoveError {
    /// The relocation step that failed.
    pub fn step(&self) -> &'static str {
        match self {
            MoveError::Copy { .. } => "copy",
            MoveError::MarkDeleted { .. } => "mark-deleted",
            MoveError::Expunge { .. } => "expunge",
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_error_names_step() {
        let err = MoveError::Copy {
            folder: "Quarantine".into(),
            reason: "NO [TRYCREATE]".into(),
        };
        assert_eq!(err.step(), "copy");
        assert!(err.to_string().contains("Quarantine"));

        let err = MoveError::Expunge {
            reason: "connection reset".into(),
        };
        assert_eq!(err.step(), "expunge");
    }

    #[test]
    fn test_command_error_names_the_operation() {
        let err = SyncError::Command {
            op: "expunge",
            reason: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "expunge: connection reset");
    }

    #[test]
    fn test_move_error_converts_to_sync_error() {
        let err: SyncError = MoveError::MarkDeleted {
            reason: "BAD".into(),
        }
        .into();
        assert!(matches!(err, SyncError::Move(MoveError::MarkDeleted { .. })));
    }
}
