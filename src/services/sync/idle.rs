//! The race at the heart of the idle wait.
//!
//! Three events compete while the session idles: the server pushes a change
//! notification, the configured budget elapses, or the long-poll operation
//! completes on its own (normally after a stop request, or due to its own
//! error). Exactly one terminal signal ends the wait: the long-poll
//! completing. The budget branch only *requests* a stop, by dropping the stop
//! handle, and then still waits for the long-poll to finish.

use std::future::Future;
use std::time::Duration;

/// Drives `poll` to completion, racing it against `budget`.
///
/// Dropping `stop` asks the long-poll to wind down; the request is
/// fire-and-forget and harmless if the poll already completed. Returns the
/// poll's own output plus whether the budget elapsed first.
pub async fn await_long_poll<P, S>(poll: P, stop: S, budget: Duration) -> (P::Output, bool)
where
    P: Future,
{
    tokio::pin!(poll);
    tokio::select! {
        out = &mut poll => {
            drop(stop);
            (out, false)
        }
        _ = tokio::time::sleep(budget) => {
            drop(stop);
            (poll.await, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    /// Resolves the fake long-poll when dropped, like an IDLE stop source.
    struct StopGuard(Option<oneshot::Sender<()>>);

    impl Drop for StopGuard {
        fn drop(&mut self) {
            if let Some(tx) = self.0.take() {
                let _ = tx.send(());
            }
        }
    }

    #[tokio::test]
    async fn test_notification_wins_the_race() {
        let (tx, rx) = oneshot::channel::<&str>();
        tx.send("new mail").unwrap();
        let poll = async move { rx.await.unwrap() };

        let started = std::time::Instant::now();
        let (out, timed_out) =
            await_long_poll(poll, StopGuard(None), Duration::from_secs(60)).await;

        assert_eq!(out, "new mail");
        assert!(!timed_out);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_budget_elapses_then_poll_terminates() {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let poll = async move {
            stop_rx.await.ok();
            "interrupted"
        };

        let (out, timed_out) = await_long_poll(
            poll,
            StopGuard(Some(stop_tx)),
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(out, "interrupted");
        assert!(timed_out);
    }

    #[tokio::test]
    async fn test_poll_error_is_the_terminal_signal() {
        let poll = async { Err::<(), &str>("connection reset") };
        let (out, timed_out) =
            await_long_poll(poll, StopGuard(None), Duration::from_secs(60)).await;

        assert_eq!(out, Err("connection reset"));
        assert!(!timed_out);
    }
}
