//! Thread-safe blocking FIFO used between pipeline stages.
//!
//! The channel uses one [`BlockingQueue`] per hand-off:
//! - packet source → decoder thread (`EncodedPacket`)
//! - decoder thread → playback driver (`DecodedFrame`)
//!
//! Items are moved in on `push` and moved out on `pop`, so exactly one owner holds
//! each item at any time. Shutdown is signal-driven: `set_active(false)` wakes every
//! waiter and no call blocks on an inactive queue again.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Returned by [`BlockingQueue::push`] when the queue is inactive.
///
/// Carries the rejected item back so the caller stays responsible for it.
pub struct Inactive<T>(pub T);

impl<T> Inactive<T> {
    /// Take the rejected item back.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Inactive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Inactive(..)")
    }
}

/// Thread-safe FIFO of owned items with an active flag.
///
/// ## Design
/// - **Multiple producers / multiple consumers**: safe to call from many threads.
/// - **Optionally bounded**: with a non-zero capacity `push` blocks while full.
/// - Uses a single [`Condvar`] as a general “state changed” signal.
/// - The `active` flag lives *under the same mutex* as the items so a wakeup can never be missed.
///
/// ## Inactive semantics
/// - `push` is rejected and hands the item back ([`Inactive`]).
/// - `pop` never blocks: it yields whatever is still queued, then `None`.
/// - Nothing is dropped by deactivation; whoever drains at shutdown releases leftovers.
pub struct BlockingQueue<T> {
    inner: Mutex<QueueInner<T>>,
    cv: Condvar,
    capacity: usize,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    active: bool,
}

impl<T> BlockingQueue<T> {
    /// Create an inactive queue. `capacity == 0` means unbounded.
    ///
    /// Queues start inactive; the owner activates them when playback starts.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                active: false,
            }),
            cv: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, g: MutexGuard<'a, QueueInner<T>>) -> MutexGuard<'a, QueueInner<T>> {
        self.cv.wait(g).unwrap_or_else(PoisonError::into_inner)
    }

    fn is_full(&self, g: &QueueInner<T>) -> bool {
        self.capacity > 0 && g.items.len() >= self.capacity
    }

    /// Maximum queued items, `0` when unbounded.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue `item`, blocking while the queue is full.
    ///
    /// Returns the item inside [`Inactive`] if the queue is (or becomes) inactive.
    pub fn push(&self, item: T) -> Result<(), Inactive<T>> {
        let mut g = self.lock();
        while g.active && self.is_full(&g) {
            g = self.wait(g);
        }
        if !g.active {
            return Err(Inactive(item));
        }
        g.items.push_back(item);
        drop(g);
        self.cv.notify_all();
        Ok(())
    }

    /// Dequeue the oldest item, blocking while the queue is active and empty.
    ///
    /// Returns `None` once the queue is inactive and empty.
    pub fn pop(&self) -> Option<T> {
        let mut g = self.lock();
        while g.active && g.items.is_empty() {
            g = self.wait(g);
        }
        let item = g.items.pop_front();
        drop(g);
        if item.is_some() {
            self.cv.notify_all();
        }
        item
    }

    /// Toggle the active flag and wake every waiter.
    ///
    /// Idempotent and safe to call from any thread.
    pub fn set_active(&self, active: bool) {
        let mut g = self.lock();
        g.active = active;
        drop(g);
        self.cv.notify_all();
    }

    /// Whether the queue currently accepts pushes.
    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Current queued items (best-effort snapshot).
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Take every queued item, oldest first, and wake blocked producers.
    pub fn drain(&self) -> Vec<T> {
        let mut g = self.lock();
        let out: Vec<T> = g.items.drain(..).collect();
        drop(g);
        self.cv.notify_all();
        out
    }

    /// Block the current thread until the queue is inactive and fully drained.
    ///
    /// The controller uses this to wait for end of stream without polling.
    pub fn wait_until_drained(&self) {
        let mut g = self.lock();
        while g.active || !g.items.is_empty() {
            g = self.wait(g);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    struct Tracked(Arc<AtomicUsize>);

    impl Tracked {
        fn new(live: &Arc<AtomicUsize>) -> Self {
            live.fetch_add(1, Ordering::SeqCst);
            Tracked(live.clone())
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn active_queue<T>(capacity: usize) -> BlockingQueue<T> {
        let q = BlockingQueue::new(capacity);
        q.set_active(true);
        q
    }

    #[test]
    fn new_queue_starts_inactive_and_rejects_push() {
        let q = BlockingQueue::new(4);
        assert!(!q.is_active());
        let rejected = q.push(7).unwrap_err();
        assert_eq!(rejected.into_inner(), 7);
        assert!(q.is_empty());
    }

    #[test]
    fn pop_preserves_fifo_order() {
        let q = active_queue(0);
        for i in 0..5 {
            q.push(i).unwrap();
        }
        let out: Vec<i32> = (0..5).map(|_| q.pop().unwrap()).collect();
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn pop_on_inactive_drains_then_returns_none() {
        let q = active_queue(0);
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.set_active(false);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn deactivation_wakes_blocked_pop() {
        let q = Arc::new(active_queue::<u32>(0));
        let q_pop = q.clone();
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let start = barrier.clone();

        let handle = thread::spawn(move || {
            start.wait();
            q_pop.pop()
        });

        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        q.set_active(false);

        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn bounded_push_blocks_until_pop() {
        let q = Arc::new(active_queue(1));
        q.push(1).unwrap();
        let q_push = q.clone();
        let (tx, rx) = std::sync::mpsc::channel();

        let handle = thread::spawn(move || {
            let res = q_push.push(2);
            tx.send(()).unwrap();
            res.is_ok()
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(q.pop(), Some(1));
        assert!(handle.join().unwrap());
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn deactivation_wakes_blocked_push_and_returns_item() {
        let q = Arc::new(active_queue(1));
        q.push(1).unwrap();
        let q_push = q.clone();

        let handle = thread::spawn(move || q_push.push(2).map_err(Inactive::into_inner));

        thread::sleep(Duration::from_millis(20));
        q.set_active(false);

        assert_eq!(handle.join().unwrap(), Err(2));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn drain_releases_leftovers_to_caller() {
        let live = Arc::new(AtomicUsize::new(0));
        let q = active_queue(0);
        for _ in 0..3 {
            q.push(Tracked::new(&live)).unwrap();
        }
        q.set_active(false);
        assert_eq!(live.load(Ordering::SeqCst), 3);

        let leftovers = q.drain();
        assert_eq!(leftovers.len(), 3);
        drop(leftovers);
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert!(q.pop().is_none());
    }

    #[test]
    fn dropping_queue_releases_items() {
        let live = Arc::new(AtomicUsize::new(0));
        {
            let q = active_queue(0);
            q.push(Tracked::new(&live)).unwrap();
            q.push(Tracked::new(&live)).unwrap();
        }
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn wait_until_drained_returns_after_close_and_pop() {
        let q = Arc::new(active_queue(0));
        q.push(1u8).unwrap();
        q.set_active(false);
        let q_pop = q.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            q_pop.pop()
        });

        q.wait_until_drained();
        assert_eq!(handle.join().unwrap(), Some(1));
        assert!(q.is_empty());
    }
}
