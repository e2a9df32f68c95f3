use std::fmt;
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use crossbeam_utils::atomic::AtomicCell;

/// Why an operation was abandoned. Stored in the connection's cancellation
/// slot so the failing I/O path can report it instead of the socket error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    Canceled,
    TimedOut,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Canceled => f.write_str("canceled"),
            CancelCause::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Host-side cancellation handle passed alongside `*_ctx` commands.
///
/// Cloning is cheap; every clone observes the same cancellation. Dropping
/// all clones without calling [`cancel`](CancelToken::cancel) does nothing.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    cause: AtomicCell<Option<CancelCause>>,
    // Dropped on cancel so every receiver observes the disconnect.
    guard: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(TokenInner {
                cause: AtomicCell::new(None),
                guard: Mutex::new(Some(tx)),
                done: rx,
            }),
        }
    }

    pub fn cancel(&self) {
        self.cancel_with(CancelCause::Canceled);
    }

    /// Cancel with an explicit cause, e.g. [`CancelCause::TimedOut`] from a
    /// caller-side deadline. The first cause wins.
    pub fn cancel_with(&self, cause: CancelCause) {
        if self
            .inner
            .cause
            .compare_exchange(None, Some(cause))
            .is_ok()
        {
            if let Ok(mut guard) = self.inner.guard.lock() {
                guard.take();
            }
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.cause.load().is_some()
    }

    pub fn cause(&self) -> Option<CancelCause> {
        self.inner.cause.load()
    }

    /// Channel that disconnects when the token fires.
    pub(crate) fn done(&self) -> Receiver<()> {
        self.inner.done.clone()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cause", &self.cause())
            .finish()
    }
}

/// One registered operation: the token to watch and a channel that
/// disconnects when the operation completes.
pub(crate) struct WatchRequest {
    pub token: CancelToken,
    pub finished: Receiver<()>,
}

/// Keeps the watcher subscribed to an operation; dropping it signals
/// completion.
#[derive(Debug)]
pub(crate) struct FinishGuard {
    _tx: Sender<()>,
}

impl FinishGuard {
    pub fn new(tx: Sender<()>) -> Self {
        Self { _tx: tx }
    }
}

/// Spawn the per-connection cancellation watcher.
///
/// Cancellation cannot interrupt a blocking protocol read, so the watcher
/// holds its own handle to the raw socket and forces a socket-level error
/// from outside: it stores the cause in `canceled`, shuts the socket down,
/// and the foreground I/O path reports the cause instead of the I/O error.
pub(crate) fn spawn_watcher(
    raw: TcpStream,
    canceled: Arc<AtomicCell<Option<CancelCause>>>,
    closed: Receiver<()>,
) -> Sender<WatchRequest> {
    let (tx, rx) = bounded::<WatchRequest>(1);
    thread::spawn(move || loop {
        let req = select! {
            recv(rx) -> req => match req {
                Ok(req) => req,
                Err(_) => return,
            },
            recv(closed) -> _ => return,
        };
        let done = req.token.done();
        select! {
            recv(done) -> _ => {
                // Fires when the token's sender is dropped. A token dropped
                // without cancel has no cause and is treated as finished.
                if let Some(cause) = req.token.cause() {
                    canceled.store(Some(cause));
                    let _ = raw.shutdown(Shutdown::Both);
                }
            }
            recv(req.finished) -> _ => {}
            recv(closed) -> _ => return,
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_fires_once_with_first_cause() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());
        assert!(token.cause().is_none());

        token.cancel_with(CancelCause::TimedOut);
        token.cancel();
        assert!(token.is_canceled());
        assert_eq!(token.cause(), Some(CancelCause::TimedOut));
    }

    #[test]
    fn done_disconnects_on_cancel() {
        let token = CancelToken::new();
        let done = token.done();
        assert!(done.try_recv().is_err()); // empty, still connected
        token.cancel();
        // Disconnected now: recv returns immediately.
        assert!(done.recv().is_err());
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_canceled());
    }
}
