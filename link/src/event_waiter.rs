//! Response correlator.
//!
//! Pairs a push event from the server with the caller waiting for it, keyed
//! by a tag (the channel id for subscribe). A signal wakes every waiter
//! registered for the tag at that moment, each exactly once, and then
//! forgets the tag. Waiters registered later wait for the next signal.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{LeapError, Result};

struct Inner<T> {
    waiters: HashMap<String, Vec<oneshot::Sender<Result<T>>>>,
    terminal: Option<LeapError>,
}

/// Tag keyed table of pending waits.
pub struct EventWaiter<T> {
    inner: Mutex<Inner<T>>,
}

/// A registered wait. Dropping it abandons the wait.
pub struct Waiter<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Waiter<T> {
    /// Wait for the signal or close that targets this waiter's tag.
    pub async fn recv(self) -> Result<T> {
        self.rx.await.unwrap_or(Err(LeapError::ConnectionClosed))
    }
}

impl<T: Clone> Default for EventWaiter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> EventWaiter<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                waiters: HashMap::new(),
                terminal: None,
            }),
        }
    }

    /// Register interest in `tag` without waiting yet.
    ///
    /// After [`shutdown`](Self::shutdown) the waiter resolves immediately
    /// with the terminal error.
    pub fn register(&self, tag: &str) -> Waiter<T> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        if let Some(err) = &inner.terminal {
            let _ = tx.send(Err(err.clone()));
            return Waiter { rx };
        }
        let entry = inner.waiters.entry(tag.to_string()).or_default();
        entry.retain(|waiter| !waiter.is_closed());
        entry.push(tx);
        Waiter { rx }
    }

    /// Register and wait in one go.
    pub async fn wait(&self, tag: &str) -> Result<T> {
        self.register(tag).recv().await
    }

    /// Deliver `result` to every waiter on `tag` and forget the tag.
    ///
    /// Returns `false` when nobody received it, so the caller can fall back
    /// to broadcasting.
    pub fn signal(&self, tag: &str, result: Result<T>) -> bool {
        let Some(waiters) = self.inner.lock().waiters.remove(tag) else {
            return false;
        };
        let mut delivered = false;
        for waiter in waiters {
            delivered |= waiter.send(result.clone()).is_ok();
        }
        delivered
    }

    /// Fail every outstanding waiter with `err`. New waiters are accepted.
    pub fn close(&self, err: LeapError) {
        let waiters: Vec<_> = self.inner.lock().waiters.drain().collect();
        for (_, senders) in waiters {
            for waiter in senders {
                let _ = waiter.send(Err(err.clone()));
            }
        }
    }

    /// Like [`close`](Self::close), and every later waiter gets `err` too.
    pub fn shutdown(&self, err: LeapError) {
        self.inner.lock().terminal = Some(err.clone());
        self.close(err);
    }

    /// Number of live waiters registered for `tag`.
    pub fn waiting_count(&self, tag: &str) -> usize {
        self.inner
            .lock()
            .waiters
            .get(tag)
            .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}
