//! Ingestion ring queue
//!
//! ## Purpose
//!
//! Hands classified transactions from the admission path to one worker
//! thread without locks or blocking. Each worker owns exactly one queue's
//! consumer side; any number of feed threads may push concurrently.
//!
//! ## Design
//!
//! Bounded ring with per-slot sequence numbers. A producer claims the tail
//! with a CAS before touching the slot, so concurrent feed threads never
//! collide on a write; the slot's sequence is bumped with a release store
//! once the value is in place, which is what makes it visible to the
//! consumer. The single consumer advances `head` with plain stores.
//! Capacity is rounded up to a power of two so slot indexing is a mask,
//! not a modulo. `push` on a full queue hands the item back immediately;
//! capacity exhaustion is a counted event upstream, never an error that
//! stalls the pipeline.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cursor on its own cache line so producers and the consumer do not
/// false-share.
#[repr(align(64))]
struct PaddedCursor(AtomicUsize);

struct Slot<T> {
    /// Equal to the slot's position when free for a producer, one past it
    /// when holding a value for the consumer.
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Fixed-capacity multi-producer single-consumer ring buffer.
///
/// Safety contract: at most one thread calls `pop` at any time. The engine
/// upholds this by giving each worker exclusive ownership of its consumer
/// side; `push` may be called from any number of threads.
pub struct IngestionQueue<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    head: PaddedCursor,
    tail: PaddedCursor,
}

unsafe impl<T: Send> Send for IngestionQueue<T> {}
unsafe impl<T: Send> Sync for IngestionQueue<T> {}

impl<T> IngestionQueue<T> {
    /// `capacity` is rounded up to the next power of two (minimum 2).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let buffer = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            buffer,
            mask: capacity - 1,
            head: PaddedCursor(AtomicUsize::new(0)),
            tail: PaddedCursor(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Producer side. Never blocks; a full queue hands the item back in
    /// `Err` so the caller can count the overflow. Safe to call from
    /// multiple threads concurrently.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut tail = self.tail.0.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[tail & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let dist = seq as isize - tail as isize;
            if dist == 0 {
                // Free slot; claim it before writing.
                match self.tail.0.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe {
                            (*slot.value.get()).write(item);
                        }
                        slot.sequence.store(tail.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(observed) => tail = observed,
                }
            } else if dist < 0 {
                // The consumer has not freed the slot one lap behind.
                return Err(item);
            } else {
                // Another producer claimed this slot; chase the tail.
                tail = self.tail.0.load(Ordering::Relaxed);
            }
        }
    }

    /// Consumer side. `None` when empty; never blocks. Must only be
    /// called from the owning worker thread.
    pub fn pop(&self) -> Option<T> {
        let head = self.head.0.load(Ordering::Relaxed);
        let slot = &self.buffer[head & self.mask];
        let seq = slot.sequence.load(Ordering::Acquire);
        if (seq as isize) - (head.wrapping_add(1) as isize) < 0 {
            return None;
        }
        let item = unsafe { (*slot.value.get()).assume_init_read() };
        // Mark the slot free for the producer one lap ahead.
        slot.sequence
            .store(head.wrapping_add(self.capacity()), Ordering::Release);
        self.head.0.store(head.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    /// Approximate occupancy; exact only when the queue is quiescent.
    pub fn len(&self) -> usize {
        let tail = self.tail.0.load(Ordering::Acquire);
        let head = self.head.0.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for IngestionQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        let queue = IngestionQueue::<u32>::with_capacity(1000);
        assert_eq!(queue.capacity(), 1024);
    }

    #[test]
    fn push_fails_when_full_and_recovers() {
        let queue = IngestionQueue::with_capacity(4);
        for i in 0..4 {
            assert!(queue.push(i).is_ok());
        }
        assert_eq!(queue.push(99), Err(99));
        assert_eq!(queue.pop(), Some(0));
        assert!(queue.push(99).is_ok());
    }

    #[test]
    fn pop_on_empty_returns_none() {
        let queue = IngestionQueue::<u32>::with_capacity(8);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn fifo_order_preserved() {
        let queue = IngestionQueue::with_capacity(16);
        for i in 0..10 {
            queue.push(i).unwrap();
        }
        for i in 0..10 {
            assert_eq!(queue.pop(), Some(i));
        }
    }

    #[test]
    fn spsc_no_items_lost_or_duplicated() {
        const COUNT: u64 = 100_000;
        let queue = Arc::new(IngestionQueue::with_capacity(256));
        let producer_queue = Arc::clone(&queue);

        let producer = std::thread::spawn(move || {
            let mut next = 0u64;
            while next < COUNT {
                if producer_queue.push(next).is_ok() {
                    next += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
        });

        let mut expected = 0u64;
        while expected < COUNT {
            if let Some(value) = queue.pop() {
                assert_eq!(value, expected, "out of order or duplicated item");
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_producers_never_collide() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 20_000;
        let queue = Arc::new(IngestionQueue::with_capacity(128));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let value = p * PER_PRODUCER + i;
                        while queue.push(value).is_err() {
                            std::hint::spin_loop();
                        }
                    }
                })
            })
            .collect();

        let total = PRODUCERS * PER_PRODUCER;
        let mut seen = vec![false; total as usize];
        let mut received = 0u64;
        while received < total {
            if let Some(value) = queue.pop() {
                assert!(!seen[value as usize], "item {value} delivered twice");
                seen[value as usize] = true;
                received += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        for producer in producers {
            producer.join().unwrap();
        }
        assert!(queue.is_empty());
    }

    proptest! {
        #[test]
        fn mixed_push_pop_keeps_fifo(ops in proptest::collection::vec(any::<bool>(), 1..256)) {
            let queue = IngestionQueue::with_capacity(32);
            let mut next_in = 0u32;
            let mut next_out = 0u32;
            for is_push in ops {
                if is_push {
                    if queue.push(next_in).is_ok() {
                        next_in += 1;
                    }
                } else if let Some(v) = queue.pop() {
                    prop_assert_eq!(v, next_out);
                    next_out += 1;
                }
            }
            while let Some(v) = queue.pop() {
                prop_assert_eq!(v, next_out);
                next_out += 1;
            }
            prop_assert_eq!(next_in, next_out);
        }
    }
}
