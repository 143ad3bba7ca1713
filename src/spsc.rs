//! Bounded single-producer single-consumer ring buffer with a blocking pop.
//!
//! Capacity is a power of two so wrap-around is a bitwise mask instead of a
//! modulus. One slot stays reserved to distinguish full from empty, so a
//! queue of capacity `N` stores at most `N - 1` elements.
//!
//! Head is published with release and observed with acquire; tail likewise.
//! A consumer that sees an advanced head therefore also sees the element
//! write that preceded it. The same fence pairing is what publishes handler
//! registrations made before a push to the thread that pops the frame.
//!
//! The lock-free fast path is augmented by a companion mutex + condvar so
//! the consumer can sleep on an empty queue: `push` signals after every
//! successful store, `wait_and_pop` re-checks the queue under the lock
//! before sleeping, which tolerates spurious wakeups and lost races.
//!
//! Head and tail live on separate cache lines to avoid false sharing
//! between the producer and consumer cores.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// Pads an atomic counter out to its own cache line.
#[repr(align(64))]
struct CacheAligned<T>(T);

/// Fixed-capacity SPSC queue.
///
/// The type is `Sync`, but the access discipline is part of the contract:
/// at any time exactly one thread may call [`push`](Self::push) and exactly
/// one thread may call [`pop`](Self::pop) / [`wait_and_pop`](Self::wait_and_pop).
/// Role handoff requires a happens-before edge between the old and new
/// holder (a thread join, or an atomic flag the old holder no longer pushes
/// after clearing).
pub struct SpscQueue<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// Producer index: next slot to write. Stored pre-wrapped.
    head: CacheAligned<AtomicUsize>,
    /// Consumer index: next slot to read. Stored pre-wrapped.
    tail: CacheAligned<AtomicUsize>,
    lock: Mutex<()>,
    ready: Condvar,
}

// Safety: the buffer is a raw slot array; a given slot is touched by the
// producer only while it is outside the [tail, head) window and by the
// consumer only while inside it, with the release/acquire pair on head
// ordering the element write before the consumer's read (and the pair on
// tail ordering the consumer's read before slot reuse). With the one
// producer / one consumer discipline above, no slot is ever accessed from
// two threads at once.
#[expect(unsafe_code)]
unsafe impl<T: Send> Send for SpscQueue<T> {}
#[expect(unsafe_code)]
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T> SpscQueue<T> {
    /// Create a queue storing up to `capacity - 1` elements.
    ///
    /// # Panics
    /// Panics unless `capacity` is a power of two, at least 2.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "capacity must be a power of two >= 2, got {capacity}"
        );
        let buf = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            buf,
            mask: capacity - 1,
            head: CacheAligned(AtomicUsize::new(0)),
            tail: CacheAligned(AtomicUsize::new(0)),
            lock: Mutex::new(()),
            ready: Condvar::new(),
        }
    }

    /// Number of slots (one more than the maximum element count).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Enqueue a value. Producer only.
    ///
    /// Returns the value back when the queue is full; the caller decides
    /// whether that drop is worth a log line. Never blocks.
    #[inline]
    #[expect(unsafe_code)]
    pub fn push(&self, v: T) -> Result<(), T> {
        let h = self.head.0.load(Ordering::Relaxed);
        let next = (h + 1) & self.mask;
        if next == self.tail.0.load(Ordering::Acquire) {
            return Err(v);
        }
        // Safety: slot `h` is outside [tail, head), so the consumer will not
        // touch it until the release store below makes it visible.
        unsafe {
            (*self.buf[h].get()).write(v);
        }
        // Release: the element write above becomes visible before the index.
        self.head.0.store(next, Ordering::Release);

        // Wake a sleeping consumer. Taking and dropping the lock first
        // ensures the consumer is either before its empty re-check (and will
        // see the element) or already parked (and will get the notify).
        drop(self.lock.lock().unwrap());
        self.ready.notify_one();
        Ok(())
    }

    /// Dequeue the oldest value, or `None` when empty. Consumer only.
    #[inline]
    #[must_use]
    #[expect(unsafe_code)]
    pub fn pop(&self) -> Option<T> {
        let t = self.tail.0.load(Ordering::Relaxed);
        if t == self.head.0.load(Ordering::Acquire) {
            return None;
        }
        // Safety: slot `t` is inside [tail, head); the acquire load above
        // synchronized with the producer's release store, so the element is
        // fully written. The store below hands the slot back to the producer.
        let v = unsafe { (*self.buf[t].get()).assume_init_read() };
        self.tail.0.store((t + 1) & self.mask, Ordering::Release);
        Some(v)
    }

    /// Block until an element is available, then dequeue it. Consumer only.
    pub fn wait_and_pop(&self) -> T {
        // Fast path: no syscall when data is already queued.
        if let Some(v) = self.pop() {
            return v;
        }
        let mut guard = self.lock.lock().unwrap();
        loop {
            // Re-check under the lock -- a push between the fast path and
            // the lock acquisition must not be missed.
            if let Some(v) = self.pop() {
                drop(guard);
                return v;
            }
            guard = self.ready.wait(guard).unwrap();
        }
    }

    /// Observational emptiness check; may be stale by the time it returns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tail.0.load(Ordering::Acquire) == self.head.0.load(Ordering::Acquire)
    }
}

impl<T> Drop for SpscQueue<T> {
    fn drop(&mut self) {
        // Drain so undelivered elements run their destructors.
        while self.pop().is_some() {}
    }
}
