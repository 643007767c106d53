use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Creates a connected abort handle and signal.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx: Arc::new(tx) }, AbortSignal { rx })
}

/// Requests cancellation of an in-flight streamed call.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Signals cancellation. Returns `true` only for the call that actually
    /// flipped the signal; later calls are no-ops.
    pub fn abort(&self) -> bool {
        self.tx.send_if_modified(|aborted| {
            if *aborted {
                false
            } else {
                *aborted = true;
                true
            }
        })
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Cancellation token handed to the transport and checked at every
/// suspension point of a streamed call.
#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested.
    ///
    /// Never resolves if every handle is dropped without aborting.
    pub async fn aborted(&mut self) {
        if self.rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Owned variant of [`AbortSignal::aborted`], for combinators that need a
    /// `'static` future.
    pub async fn into_aborted(mut self) {
        self.aborted().await;
    }
}

/// Deadline timer armed for the lifetime of one streamed call.
///
/// When the timeout elapses the timer aborts the call's [`AbortHandle`]
/// exactly once. Disarming (explicitly or by drop) cancels the timer, so it
/// can never fire after the call has concluded.
pub struct Deadline {
    timer: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
    started: Instant,
    timeout: Duration,
}

impl Deadline {
    pub fn arm(timeout: Duration, handle: AbortHandle) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let timer_fired = Arc::clone(&fired);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timer_fired.store(true, Ordering::SeqCst);
            if handle.abort() {
                debug!(
                    event = "stream.deadline_fired",
                    timeout_ms = timeout.as_millis() as u64
                );
            }
        });
        Self {
            timer: Some(timer),
            fired,
            started: Instant::now(),
            timeout,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.disarm();
    }
}
