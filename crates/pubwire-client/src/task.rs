//! Non-blocking publish calls.
//!
//! A spawned publish runs its dispatch on a Tokio task. The caller keeps a
//! [`PublishTask`] to await the outcome, or hands a completion handler to
//! [`PublishBuilder::spawn_with`](crate::PublishBuilder::spawn_with) and
//! keeps only a [`CancelHandle`].
//!
//! Completion and cancellation race for the same slot: whichever claims it
//! first wins. Once [`CancelHandle::cancel`] returns `true` the handler
//! will never run, and [`PublishTask::wait`] resolves to
//! [`PublishError::Cancelled`].

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use pubwire_protocol::PublishResponse;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{PublishError, PublishResult};

/// Receives the outcome of a non-blocking publish.
pub type CompletionHandler = Box<dyn FnOnce(PublishResult<PublishResponse>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Completed,
    Cancelled,
}

struct Slot {
    phase: Phase,
    handler: Option<CompletionHandler>,
}

struct Shared {
    slot: Mutex<Slot>,
    cancel_tx: watch::Sender<bool>,
}

impl Shared {
    fn new(handler: Option<CompletionHandler>) -> Arc<Self> {
        let (cancel_tx, _) = watch::channel(false);
        Arc::new(Self {
            slot: Mutex::new(Slot {
                phase: Phase::Pending,
                handler,
            }),
            cancel_tx,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel(&self) -> bool {
        let dropped = {
            let mut slot = self.lock();
            if slot.phase != Phase::Pending {
                return false;
            }
            slot.phase = Phase::Cancelled;
            slot.handler.take()
        };
        // Handler is dropped outside the lock.
        drop(dropped);
        let _ = self.cancel_tx.send(true);
        true
    }

    /// Claims completion. Returns `None` if the call was cancelled first.
    fn complete(&self) -> Option<Option<CompletionHandler>> {
        let mut slot = self.lock();
        if slot.phase != Phase::Pending {
            return None;
        }
        slot.phase = Phase::Completed;
        Some(slot.handler.take())
    }

    fn phase(&self) -> Phase {
        self.lock().phase
    }
}

/// Cancels a non-blocking publish.
///
/// Cloning the handle shares the same call. Cancelling is idempotent and a
/// no-op once the call has completed.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    /// Cancels the call.
    ///
    /// Returns `true` if this invocation cancelled a pending call, `false`
    /// if it had already completed or been cancelled.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.cancel();
        if cancelled {
            debug!("Publish cancelled");
        }
        cancelled
    }

    /// Returns true if the call was cancelled before completing.
    pub fn is_cancelled(&self) -> bool {
        self.shared.phase() == Phase::Cancelled
    }

    /// Returns true if the call completed, successfully or not.
    pub fn is_completed(&self) -> bool {
        self.shared.phase() == Phase::Completed
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("phase", &self.shared.phase())
            .finish()
    }
}

/// A publish running in the background.
#[derive(Debug)]
pub struct PublishTask {
    cancel: CancelHandle,
    join: JoinHandle<PublishResult<PublishResponse>>,
}

impl PublishTask {
    /// Cancels the call. See [`CancelHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Returns a handle that can cancel the call from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns true once the call has finished or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Cancelled`] if the call was cancelled, or
    /// the pipeline's error otherwise.
    pub async fn wait(self) -> PublishResult<PublishResponse> {
        match self.join.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(PublishError::Cancelled),
        }
    }
}

/// Runs `work` until it finishes or the call is cancelled, then claims
/// completion. Returns `None` if cancellation won.
async fn race<F>(
    shared: &Shared,
    mut cancel_rx: watch::Receiver<bool>,
    work: F,
) -> Option<(PublishResult<PublishResponse>, Option<CompletionHandler>)>
where
    F: Future<Output = PublishResult<PublishResponse>>,
{
    let result = tokio::select! {
        biased;
        _ = cancel_rx.wait_for(|cancelled| *cancelled) => return None,
        result = work => result,
    };
    shared.complete().map(|handler| (result, handler))
}

/// Runs `work` on a Tokio task; the outcome is read through [`PublishTask::wait`].
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub(crate) fn spawn<F>(work: F) -> PublishTask
where
    F: Future<Output = PublishResult<PublishResponse>> + Send + 'static,
{
    let shared = Shared::new(None);
    let cancel_rx = shared.cancel_tx.subscribe();
    let task_shared = Arc::clone(&shared);

    let join = tokio::spawn(async move {
        match race(&task_shared, cancel_rx, work).await {
            Some((result, _)) => result,
            None => Err(PublishError::Cancelled),
        }
    });

    PublishTask {
        cancel: CancelHandle { shared },
        join,
    }
}

/// Runs `work` on a Tokio task and hands the outcome to `handler`, unless
/// the call is cancelled first.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub(crate) fn spawn_with<F>(work: F, handler: CompletionHandler) -> CancelHandle
where
    F: Future<Output = PublishResult<PublishResponse>> + Send + 'static,
{
    let shared = Shared::new(Some(handler));
    let cancel_rx = shared.cancel_tx.subscribe();
    let task_shared = Arc::clone(&shared);

    tokio::spawn(async move {
        if let Some((result, Some(handler))) = race(&task_shared, cancel_rx, work).await {
            handler(result);
        }
    });

    CancelHandle { shared }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    fn sent() -> PublishResponse {
        PublishResponse::new("14598111595318003", "Sent")
    }

    #[tokio::test]
    async fn wait_returns_result() {
        let task = spawn(async { Ok(sent()) });
        let response = task.wait().await.unwrap();
        assert_eq!(response.timetoken, "14598111595318003");
    }

    #[tokio::test]
    async fn handler_receives_result() {
        let (tx, rx) = oneshot::channel();
        let handle = spawn_with(
            async { Ok(sent()) },
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        let delivered = rx.await.unwrap().unwrap();
        assert_eq!(delivered.description, "Sent");
        assert!(handle.is_completed());
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn cancelled_handler_never_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let handle = spawn_with(
            async move {
                let _ = release_rx.await;
                Ok(sent())
            },
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(handle.cancel());
        assert!(!handle.cancel());
        let _ = release_tx.send(());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_cancelled());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_work() {
        let task = spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(sent())
        });

        let handle = task.cancel_handle();
        assert!(handle.cancel());

        let result = tokio::time::timeout(Duration::from_secs(5), task.wait())
            .await
            .unwrap();
        assert!(matches!(result, Err(PublishError::Cancelled)));
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_after_completion_is_noop() {
        let task = spawn(async { Ok(sent()) });
        let handle = task.cancel_handle();
        let response = task.wait().await.unwrap();

        assert_eq!(response, sent());
        assert!(!handle.cancel());
        assert!(!handle.is_cancelled());
        assert!(handle.is_completed());
    }

    #[tokio::test]
    async fn errors_go_through_handler() {
        let (tx, rx) = oneshot::channel();
        let _handle = spawn_with(
            async { Err(PublishError::Transport(crate::TransportError::timeout("slow"))) },
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        let delivered = rx.await.unwrap();
        assert!(matches!(delivered, Err(PublishError::Transport(_))));
    }
}
