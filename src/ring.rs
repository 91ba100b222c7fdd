//! Single-producer single-consumer bounded lock-free ring, grounded on
//! `include/cc_ring_array.h`: a fixed-capacity array with separate read and
//! write cursors, one slot always kept empty to distinguish full from
//! empty without a separate counter.
//!
//! Explicitly SPSC — do not widen to multiple producers or consumers (see
//! Design Notes). The server thread is the sole producer (handing off
//! accepted connections); the worker thread is the sole consumer.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default capacity mirrored from the source's `RING_ARRAY_DEFAULT_CAP`.
pub const DEFAULT_CAPACITY: usize = 1024;

pub struct RingArray<T> {
    /// `cap` total slots; at most `cap - 1` are ever occupied at once.
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    cap: usize,
    rpos: AtomicUsize,
    wpos: AtomicUsize,
}

// Safety: access to `slots` is disciplined by the SPSC protocol below —
// the producer only ever touches the slot at `wpos`, the consumer only
// the slot at `rpos`, and the atomics with acquire/release ordering
// establish a happens-before edge between a push and the matching pop.
unsafe impl<T: Send> Sync for RingArray<T> {}
unsafe impl<T: Send> Send for RingArray<T> {}

impl<T> RingArray<T> {
    /// `capacity` is the number of items that can be held; the backing
    /// array is sized `capacity + 1` per the source's convention.
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(1) + 1;
        let mut slots = Vec::with_capacity(cap);
        for _ in 0..cap {
            slots.push(UnsafeCell::new(MaybeUninit::uninit()));
        }
        Self {
            slots: slots.into_boxed_slice(),
            cap,
            rpos: AtomicUsize::new(0),
            wpos: AtomicUsize::new(0),
        }
    }

    fn next(&self, pos: usize) -> usize {
        (pos + 1) % self.cap
    }

    /// Producer-only. Pushes `item`, returning it back on `Err` if the
    /// ring is full (caller counts this as a dropped connection).
    pub fn push(&self, item: T) -> Result<(), T> {
        let w = self.wpos.load(Ordering::Relaxed);
        let next_w = self.next(w);
        if next_w == self.rpos.load(Ordering::Acquire) {
            return Err(item);
        }
        // Safety: the producer is the sole writer of slot `w`; the
        // consumer cannot observe it until `wpos` is published below.
        unsafe {
            (*self.slots[w].get()).write(item);
        }
        self.wpos.store(next_w, Ordering::Release);
        Ok(())
    }

    /// Consumer-only. Pops the oldest item, or `None` if empty.
    pub fn pop(&self) -> Option<T> {
        let r = self.rpos.load(Ordering::Relaxed);
        if r == self.wpos.load(Ordering::Acquire) {
            return None;
        }
        // Safety: `wpos`'s Acquire load synchronizes-with the producer's
        // Release store, so the write into slot `r` is visible here.
        let item = unsafe { (*self.slots[r].get()).assume_init_read() };
        self.rpos.store(self.next(r), Ordering::Release);
        Some(item)
    }

    pub fn is_empty(&self) -> bool {
        self.rpos.load(Ordering::Acquire) == self.wpos.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.cap - 1
    }
}

impl<T> Drop for RingArray<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_pop_single_threaded() {
        let ring: RingArray<u32> = RingArray::new(4);
        assert!(ring.push(1).is_ok());
        assert!(ring.push(2).is_ok());
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn push_fails_when_full() {
        let ring: RingArray<u32> = RingArray::new(2);
        assert!(ring.push(1).is_ok());
        assert!(ring.push(2).is_ok());
        assert_eq!(ring.push(3), Err(3));
        assert_eq!(ring.pop(), Some(1));
        assert!(ring.push(3).is_ok());
    }

    #[test]
    fn fifo_order_preserved_across_wraparound() {
        let ring: RingArray<u32> = RingArray::new(3);
        for round in 0..10u32 {
            ring.push(round).unwrap();
            assert_eq!(ring.pop(), Some(round));
        }
    }

    #[test]
    fn spsc_handoff_across_threads() {
        let ring = Arc::new(RingArray::<u32>::new(16));
        let producer_ring = ring.clone();
        let producer = thread::spawn(move || {
            for i in 0..1000u32 {
                loop {
                    if producer_ring.push(i).is_ok() {
                        break;
                    }
                    thread::yield_now();
                }
            }
        });
        let mut received = Vec::with_capacity(1000);
        while received.len() < 1000 {
            if let Some(v) = ring.pop() {
                received.push(v);
            } else {
                thread::yield_now();
            }
        }
        producer.join().unwrap();
        assert_eq!(received, (0..1000).collect::<Vec<_>>());
    }
}
