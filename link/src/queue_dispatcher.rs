//! Ordered, non-blocking fan-out to a single consumer.
//!
//! The read loop calls [`QueueDispatcher::dispatch`] for every event. The
//! event lands in a pending buffer and at most one drain task per dispatcher
//! pushes the buffer into the consumer. A slow consumer only ever stalls its
//! own drain task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Capacity of consumer channels. One is the closest tokio gets to an
/// unbuffered channel; the pending buffer absorbs bursts.
pub const CONSUMER_CHANNEL_CAPACITY: usize = 1;

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

enum Delivery<T> {
    Channel(mpsc::Sender<T>),
    Callback(Callback<T>),
}

impl<T> Clone for Delivery<T> {
    fn clone(&self) -> Self {
        match self {
            Delivery::Channel(tx) => Delivery::Channel(tx.clone()),
            Delivery::Callback(f) => Delivery::Callback(Arc::clone(f)),
        }
    }
}

struct Shared<T> {
    pending: Mutex<Vec<T>>,
    active: AtomicBool,
    target: Mutex<Option<Delivery<T>>>,
}

/// Per-consumer delivery queue. Cloning yields another handle to the same
/// queue.
pub struct QueueDispatcher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for QueueDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> QueueDispatcher<T> {
    fn with_target(target: Delivery<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(Vec::new()),
                active: AtomicBool::new(false),
                target: Mutex::new(Some(target)),
            }),
        }
    }

    /// A dispatcher feeding a fresh channel. The receiver is the consumer's
    /// to read; only [`close`](Self::close) ends the stream.
    pub fn channel() -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(CONSUMER_CHANNEL_CAPACITY);
        (Self::with_target(Delivery::Channel(tx)), rx)
    }

    /// A dispatcher invoking `f` once per event, in order, off the caller's
    /// task.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::with_target(Delivery::Callback(Arc::new(f)))
    }

    /// Queue an event. Never waits on the consumer.
    ///
    /// Events queued after [`close`](Self::close) are dropped.
    pub fn dispatch(&self, event: T) {
        if self.is_closed() {
            return;
        }
        self.shared.pending.lock().push(event);

        if self.shared.active.swap(true, Ordering::AcqRel) {
            // A drain task is running and will pick the event up.
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(drain(Arc::clone(&self.shared)));
            },
            Err(_) => {
                log::warn!("[leap] No tokio runtime to deliver events on, dropping them");
                self.shared.pending.lock().clear();
                self.shared.active.store(false, Ordering::Release);
            },
        }
    }

    /// End the stream. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        let closed = self.shared.target.lock().take().is_some();
        self.shared.pending.lock().clear();
        closed
    }

    /// Whether the dispatcher was closed or its consumer went away.
    pub fn is_closed(&self) -> bool {
        match &*self.shared.target.lock() {
            None => true,
            Some(Delivery::Channel(tx)) => tx.is_closed(),
            Some(Delivery::Callback(_)) => false,
        }
    }

    /// Number of events waiting for the drain task.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }
}

async fn drain<T: Send + 'static>(shared: Arc<Shared<T>>) {
    loop {
        let batch = std::mem::take(&mut *shared.pending.lock());

        if batch.is_empty() {
            shared.active.store(false, Ordering::Release);
            // An event may have been queued between the take and the store,
            // after its producer saw `active == true`.
            if shared.pending.lock().is_empty() || shared.active.swap(true, Ordering::AcqRel) {
                return;
            }
            continue;
        }

        for event in batch {
            // Re-read the target per event so a close takes effect mid-batch.
            let target = shared.target.lock().clone();
            match target {
                None => break,
                Some(Delivery::Callback(f)) => {
                    // Off the runtime threads so a blocking callback stalls
                    // only this queue.
                    if let Err(e) = tokio::task::spawn_blocking(move || f(event)).await {
                        log::warn!("[leap] Event callback failed: {}", e);
                    }
                },
                Some(Delivery::Channel(tx)) => {
                    if tx.send(event).await.is_err() {
                        log::debug!("[leap] Event consumer dropped, closing its queue");
                        shared.target.lock().take();
                        shared.pending.lock().clear();
                        break;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_events_arrive_in_order_with_slow_consumer() {
        let (dispatcher, mut rx) = QueueDispatcher::channel();

        for i in 0..200 {
            dispatcher.dispatch(i);
        }

        let mut received = Vec::new();
        while received.len() < 200 {
            if received.len() % 50 == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            received.push(rx.recv().await.unwrap());
        }
        assert_eq!(received, (0..200).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dispatch_interleaved_with_consumption() {
        let (dispatcher, mut rx) = QueueDispatcher::channel();

        let mut received = Vec::new();
        for round in 0..20 {
            for i in 0..5 {
                dispatcher.dispatch(round * 5 + i);
            }
            received.push(rx.recv().await.unwrap());
            tokio::task::yield_now().await;
        }
        while received.len() < 100 {
            received.push(rx.recv().await.unwrap());
        }
        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dispatch_does_not_wait_for_consumer() {
        let (dispatcher, _rx) = QueueDispatcher::<u32>::channel();

        // Nobody reads: every dispatch must still return immediately.
        let started = std::time::Instant::now();
        for i in 0..10_000 {
            dispatcher.dispatch(i);
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_slow_consumer_does_not_stall_sibling() {
        let (slow, _slow_rx) = QueueDispatcher::channel();
        let (fast, mut fast_rx) = QueueDispatcher::channel();

        for i in 0..10 {
            slow.dispatch(i);
            fast.dispatch(i);
        }
        for i in 0..10 {
            let got = tokio::time::timeout(Duration::from_secs(1), fast_rx.recv())
                .await
                .unwrap();
            assert_eq!(got, Some(i));
        }
    }

    #[tokio::test]
    async fn test_close_ends_stream_once() {
        let (dispatcher, mut rx) = QueueDispatcher::<u32>::channel();

        assert!(dispatcher.close());
        assert!(!dispatcher.close());
        assert!(dispatcher.is_closed());
        assert_eq!(rx.recv().await, None);

        dispatcher.dispatch(1);
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_consumer_marks_closed() {
        let (dispatcher, rx) = QueueDispatcher::channel();
        drop(rx);
        assert!(dispatcher.is_closed());

        dispatcher.dispatch(1u8);
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_callback_receives_events_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = QueueDispatcher::callback(move |n: u32| {
            let _ = tx.send(n);
        });

        for i in 0..50 {
            dispatcher.dispatch(i);
        }
        for i in 0..50 {
            assert_eq!(rx.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn test_panicking_callback_keeps_queue_alive() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = QueueDispatcher::callback(move |n: u32| {
            if n == 0 {
                panic!("listener failure");
            }
            let _ = tx.send(n);
        });

        dispatcher.dispatch(0);
        dispatcher.dispatch(1);
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert_eq!(got.unwrap(), Some(1));

        // The drain task went idle normally and a new dispatch restarts it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        dispatcher.dispatch(2);
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert_eq!(got.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_blocking_callback_does_not_stall_sibling() {
        let blocked = QueueDispatcher::callback(|_: u32| {
            std::thread::sleep(Duration::from_millis(1500));
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sibling = QueueDispatcher::callback(move |n: u32| {
            let _ = tx.send(n);
        });

        blocked.dispatch(1);
        sibling.dispatch(1);
        let got = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert_eq!(got.unwrap(), Some(1));
    }
}
