//! Observable single-value holder.
//!
//! Each listener gets its own [`QueueDispatcher`], so it sees every value in
//! the order `set` was called and runs off the setter's task. There is no
//! ordering between different listeners.

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::queue_dispatcher::QueueDispatcher;

/// Thread-safe value with ordered, per-listener change notification.
pub struct StateCell<T> {
    value: watch::Sender<T>,
    listeners: Mutex<Vec<QueueDispatcher<T>>>,
}

impl<T: Clone + Send + Sync + 'static> StateCell<T> {
    pub fn new(initial: T) -> Self {
        let (value, _) = watch::channel(initial);
        Self {
            value,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Replace the value and notify every listener.
    pub fn set(&self, value: T) {
        // Holding the listener lock across replace + dispatch keeps every
        // listener's queue in `set` order.
        let listeners = self.listeners.lock();
        self.value.send_replace(value.clone());
        for listener in listeners.iter() {
            listener.dispatch(value.clone());
        }
    }

    /// Register a listener for future values.
    pub fn add_listener<F>(&self, f: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.listeners.lock().push(QueueDispatcher::callback(f));
    }

    /// Watch the value from async code.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.value.subscribe()
    }
}
