//! Cooperative cancellation.
//!
//! A `CancellationToken` is both a flag (cheap to poll between chunks of a
//! copy) and a channel that disconnects when the token fires, so blocking
//! queue operations can `select!` on it and wake up immediately.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::EngineError;

/// Shared cancellation signal. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    // Never sent on; dropping it disconnects `signal`.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        CancellationToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Request cancellation. Idempotent and safe to call from any thread,
    /// including a signal handler thread.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            let mut trigger = self
                .inner
                .trigger
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            trigger.take();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that becomes ready (disconnected) once the token fires.
    ///
    /// Use it as an extra arm in `crossbeam_channel::select!`.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Return `EngineError::Cancelled` for `path` if the token has fired.
    pub fn check(&self, path: &Path) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled {
                path: path.to_path_buf(),
            })
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::select;
    use std::time::Duration;

    #[test]
    fn test_cancel_sets_flag_on_all_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());

        // Second call is a no-op
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_signal_wakes_blocked_select() {
        let token = CancellationToken::new();
        let (_tx, rx) = bounded::<u32>(1);

        let waiter = {
            let token = token.clone();
            std::thread::spawn(move || {
                select! {
                    recv(rx) -> _ => false,
                    recv(token.signal()) -> _ => true,
                }
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(waiter.join().expect("waiter panicked"));
    }

    #[test]
    fn test_check_reports_path() {
        let token = CancellationToken::new();
        assert!(token.check(Path::new("a.jpg")).is_ok());

        token.cancel();
        let err = token.check(Path::new("a.jpg")).unwrap_err();
        assert!(err.is_cancelled());
    }
}
