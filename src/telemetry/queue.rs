//! Bounded FIFO that never blocks its producer.
//!
//! On overflow the oldest entry is evicted and counted.  Records the flush
//! worker could not write go back to the front so order is preserved; if
//! the queue refilled in the meantime the requeued record is the one that
//! is dropped (it is the oldest).

use heapless::Deque;

use super::record::LogRecord;

/// Run-log backlog capacity.
pub const LOG_QUEUE_CAPACITY: usize = 8;

pub type LogQueue = DropOldestQueue<LogRecord, LOG_QUEUE_CAPACITY>;

#[derive(Debug)]
pub struct DropOldestQueue<T, const N: usize> {
    items: Deque<T, N>,
    dropped: u32,
}

impl<T, const N: usize> Default for DropOldestQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> DropOldestQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            items: Deque::new(),
            dropped: 0,
        }
    }

    /// Append, evicting the oldest entry when full.  Returns `true` if an
    /// entry was evicted.
    pub fn push(&mut self, item: T) -> bool {
        let mut evicted = false;
        if self.items.is_full() {
            self.items.pop_front();
            self.dropped = self.dropped.saturating_add(1);
            evicted = true;
        }
        // cannot fail: a slot was freed above
        let _ = self.items.push_back(item);
        evicted
    }

    /// Put an unwritten entry back at the head.
    pub fn requeue(&mut self, item: T) {
        if self.items.push_front(item).is_err() {
            self.dropped = self.dropped.saturating_add(1);
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Empty the queue and zero the drop counter (run start).
    pub fn reset(&mut self) {
        self.items.clear();
        self.dropped = 0;
    }

    /// Discard everything still queued, counting it as dropped.
    pub fn discard(&mut self) {
        self.dropped = self.dropped.saturating_add(self.items.len() as u32);
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_under_capacity() {
        let mut q: DropOldestQueue<u8, 4> = DropOldestQueue::new();
        assert!(!q.push(1));
        assert!(!q.push(2));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
        assert_eq!(q.dropped(), 0);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut q: DropOldestQueue<u8, 2> = DropOldestQueue::new();
        q.push(1);
        q.push(2);
        assert!(q.push(3));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
    }

    #[test]
    fn requeue_goes_to_front_or_is_dropped() {
        let mut q: DropOldestQueue<u8, 2> = DropOldestQueue::new();
        q.push(2);
        q.requeue(1);
        assert_eq!(q.pop(), Some(1));
        q.push(3);
        q.requeue(9);
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn discard_counts_remaining() {
        let mut q: DropOldestQueue<u8, 4> = DropOldestQueue::new();
        q.push(1);
        q.push(2);
        q.discard();
        assert!(q.is_empty());
        assert_eq!(q.dropped(), 2);
        q.reset();
        assert_eq!(q.dropped(), 0);
    }
}
