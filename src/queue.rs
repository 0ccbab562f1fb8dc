//! Pending-item buffers.
//!
//! Producers enqueue from any number of threads; only the thread currently
//! owning the drain loop dequeues. Both shapes come from `crossbeam-queue`,
//! which gives the required multi-producer safety without locks.

use crossbeam_queue::{ArrayQueue, SegQueue};

/// Admission policy for a buffering link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
  /// Reject items beyond `capacity`; rejection is a terminal overflow.
  Bounded(usize),
  /// Accept every item, growing as needed.
  Unbounded,
}

/// FIFO buffer between producers and the draining thread.
pub enum EventQueue<T> {
  Bounded(ArrayQueue<T>),
  Unbounded(SegQueue<T>),
}

impl<T> EventQueue<T> {
  pub fn new(policy: BufferPolicy) -> Self {
    match policy {
      BufferPolicy::Bounded(capacity) => {
        assert!(capacity > 0, "bounded buffer requires capacity > 0");
        EventQueue::Bounded(ArrayQueue::new(capacity))
      }
      BufferPolicy::Unbounded => EventQueue::Unbounded(SegQueue::new()),
    }
  }

  /// Enqueue `item`, handing it back if the buffer is full.
  pub fn push(&self, item: T) -> Result<(), T> {
    match self {
      EventQueue::Bounded(q) => q.push(item),
      EventQueue::Unbounded(q) => {
        q.push(item);
        Ok(())
      }
    }
  }

  pub fn pop(&self) -> Option<T> {
    match self {
      EventQueue::Bounded(q) => q.pop(),
      EventQueue::Unbounded(q) => q.pop(),
    }
  }

  pub fn is_empty(&self) -> bool {
    match self {
      EventQueue::Bounded(q) => q.is_empty(),
      EventQueue::Unbounded(q) => q.is_empty(),
    }
  }

  pub fn len(&self) -> usize {
    match self {
      EventQueue::Bounded(q) => q.len(),
      EventQueue::Unbounded(q) => q.len(),
    }
  }

  pub fn clear(&self) {
    while self.pop().is_some() {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bounded_rejects_at_capacity() {
    let queue = EventQueue::new(BufferPolicy::Bounded(2));
    assert_eq!(queue.push(1), Ok(()));
    assert_eq!(queue.push(2), Ok(()));
    assert_eq!(queue.push(3), Err(3));
    assert_eq!(queue.len(), 2);
  }

  #[test]
  fn delivery_preserves_enqueue_order() {
    let queue = EventQueue::new(BufferPolicy::Unbounded);
    for i in 0..100 {
      queue.push(i).unwrap();
    }
    for i in 0..100 {
      assert_eq!(queue.pop(), Some(i));
    }
    assert!(queue.is_empty());
  }

  #[test]
  fn clear_drains_everything() {
    let queue = EventQueue::new(BufferPolicy::Bounded(8));
    for i in 0..8 {
      queue.push(i).unwrap();
    }
    queue.clear();
    assert!(queue.is_empty());
    assert_eq!(queue.pop(), None);
  }
}
