// SPDX-License-Identifier: GPL-3.0-only

//! One-shot bridge from native completion callbacks to awaitable futures
//!
//! A [`Completer`] is handed to the backend together with a request; the
//! backend calls [`Completer::complete`] from whatever thread its native
//! callback fires on. The session keeps the matching [`Completion`] and
//! awaits it.
//!
//! Only the first `complete` counts. Duplicate native callbacks are dropped.
//!
//! Waiting with a token that gets cancelled detaches the waiter but leaves the
//! completion pending: the native operation keeps running, and the session can
//! wait on the same `Completion` again to run its cleanup.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Create a linked completer/completion pair
pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    let completer = Completer {
        slot: Arc::new(Mutex::new(Some(tx))),
    };
    let completion = Completion {
        rx,
        value: None,
        finished: false,
    };
    (completer, completion)
}

/// Resolving side, owned by the backend
///
/// Cloneable so a backend can hand it to several native callbacks; the first
/// to fire wins.
pub struct Completer<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Completer<T> {
    /// Resolve the bridge. Returns false if it was already resolved.
    ///
    /// A value delivered after the waiting side went away is dropped.
    pub fn complete(&self, value: T) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            Some(tx) => {
                if tx.send(value).is_err() {
                    debug!("Completion resolved after its waiter was dropped");
                }
                true
            }
            None => {
                debug!("Ignoring duplicate completion");
                false
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl<T> std::fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// How a wait on a [`Completion`] ended
#[derive(Debug, PartialEq)]
pub enum Outcome<T> {
    /// The backend resolved the bridge
    Resolved(T),
    /// The caller's token fired first; the bridge is still pending
    Cancelled,
    /// The session's abort token fired first (device torn down)
    Aborted,
    /// The wait deadline passed; the bridge is still pending
    TimedOut,
    /// Every completer was dropped without resolving
    Abandoned,
}

/// Awaiting side, owned by the session
pub struct Completion<T> {
    rx: oneshot::Receiver<T>,
    // Value already taken off the channel but not yet handed out
    value: Option<T>,
    // Channel has yielded its value or closed; it must not be polled again
    finished: bool,
}

impl<T> Completion<T> {
    /// Wait for resolution, giving up on cancel, abort or deadline
    ///
    /// Giving up never resolves the bridge; call again to keep waiting.
    pub async fn wait(
        &mut self,
        cancel: &CancellationToken,
        abort: &CancellationToken,
        deadline: Duration,
    ) -> Outcome<T> {
        if let Some(value) = self.value.take() {
            return Outcome::Resolved(value);
        }
        if self.finished {
            return Outcome::Abandoned;
        }

        tokio::select! {
            biased;
            result = &mut self.rx => {
                self.finished = true;
                match result {
                    Ok(value) => Outcome::Resolved(value),
                    Err(_) => Outcome::Abandoned,
                }
            }
            _ = abort.cancelled() => Outcome::Aborted,
            _ = cancel.cancelled() => Outcome::Cancelled,
            _ = tokio::time::sleep(deadline) => Outcome::TimedOut,
        }
    }

    /// Wait ignoring caller cancellation (used once a native operation
    /// can no longer be abandoned)
    pub async fn wait_uncancellable(
        &mut self,
        abort: &CancellationToken,
        deadline: Duration,
    ) -> Outcome<T> {
        // A token nobody else holds never fires
        self.wait(&CancellationToken::new(), abort, deadline).await
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("buffered", &self.value.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_resolves_once() {
        let (completer, mut completion) = completion::<u32>();
        assert!(completer.complete(1));
        assert!(!completer.complete(2));
        assert!(completer.is_completed());

        let none = CancellationToken::new();
        assert_eq!(completion.wait(&none, &none, LONG).await, Outcome::Resolved(1));
    }

    #[tokio::test]
    async fn test_resolves_from_native_thread() {
        let (completer, mut completion) = completion::<&'static str>();
        let clone = completer.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            clone.complete("done");
        });
        let none = CancellationToken::new();
        assert_eq!(
            completion.wait(&none, &none, LONG).await,
            Outcome::Resolved("done")
        );
        assert!(!completer.complete("late"));
    }

    #[tokio::test]
    async fn test_cancel_detaches_without_resolving() {
        let (completer, mut completion) = completion::<u32>();
        let cancel = CancellationToken::new();
        let abort = CancellationToken::new();
        cancel.cancel();

        assert_eq!(completion.wait(&cancel, &abort, LONG).await, Outcome::Cancelled);
        assert!(!completer.is_completed());

        // Still resolvable, and the session can keep waiting for it
        assert!(completer.complete(7));
        assert_eq!(
            completion.wait_uncancellable(&abort, LONG).await,
            Outcome::Resolved(7)
        );
    }

    #[tokio::test]
    async fn test_resolved_value_wins_over_cancel() {
        let (completer, mut completion) = completion::<u32>();
        completer.complete(3);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let abort = CancellationToken::new();
        assert_eq!(completion.wait(&cancel, &abort, LONG).await, Outcome::Resolved(3));
    }

    #[tokio::test]
    async fn test_dropped_completer_is_abandoned() {
        let (completer, mut completion) = completion::<u32>();
        drop(completer);
        let none = CancellationToken::new();
        assert_eq!(completion.wait(&none, &none, LONG).await, Outcome::Abandoned);
    }

    #[tokio::test]
    async fn test_deadline_and_abort() {
        let (_completer, mut completion) = completion::<u32>();
        let none = CancellationToken::new();
        assert_eq!(
            completion.wait(&none, &none, Duration::from_millis(10)).await,
            Outcome::TimedOut
        );

        let abort = CancellationToken::new();
        abort.cancel();
        assert_eq!(completion.wait(&none, &abort, LONG).await, Outcome::Aborted);
    }
}
