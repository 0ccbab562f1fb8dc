//! Small internal primitives.

use std::{
  ptr,
  sync::atomic::{AtomicPtr, Ordering},
};

/// Lock-free cell holding at most one value, handed out exactly once.
///
/// Whichever thread wins the `take` owns the value; every later `take`
/// observes an empty cell. Used to pass a terminal error, or the downstream
/// observer itself, to the single thread elected to deliver it.
pub(crate) struct TakeSlot<T> {
  slot: AtomicPtr<T>,
}

impl<T> TakeSlot<T> {
  pub fn empty() -> Self { TakeSlot { slot: AtomicPtr::new(ptr::null_mut()) } }

  pub fn filled(value: T) -> Self {
    TakeSlot { slot: AtomicPtr::new(Box::into_raw(Box::new(value))) }
  }

  /// Store `value` if the cell is empty; hand it back otherwise.
  pub fn set(&self, value: T) -> Result<(), T> {
    let raw = Box::into_raw(Box::new(value));
    match self.slot.compare_exchange(
      ptr::null_mut(),
      raw,
      Ordering::AcqRel,
      Ordering::Acquire,
    ) {
      Ok(_) => Ok(()),
      Err(_) => {
        // SAFETY: `raw` came from Box::into_raw above and was never
        // published, so this thread still owns it.
        Err(*unsafe { Box::from_raw(raw) })
      }
    }
  }

  /// Remove and return the value; `None` if empty or already taken.
  pub fn take(&self) -> Option<T> {
    let raw = self.slot.swap(ptr::null_mut(), Ordering::AcqRel);
    if raw.is_null() {
      None
    } else {
      // SAFETY: the swap transferred exclusive ownership of `raw` to this
      // thread; no other thread can observe the pointer again.
      Some(*unsafe { Box::from_raw(raw) })
    }
  }

  pub fn is_empty(&self) -> bool {
    self.slot.load(Ordering::Acquire).is_null()
  }
}

impl<T> Drop for TakeSlot<T> {
  fn drop(&mut self) { drop(self.take()); }
}

// SAFETY: the value is only ever moved through the cell, never shared; the
// AtomicPtr swap transfers ownership to exactly one thread at a time, so
// `T: Send` is the only requirement in either direction.
unsafe impl<T: Send> Send for TakeSlot<T> {}
unsafe impl<T: Send> Sync for TakeSlot<T> {}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{
    sync::{
      atomic::{AtomicUsize, Ordering},
      Arc, Barrier,
    },
    thread,
  };

  #[test]
  fn set_then_take() {
    let slot = TakeSlot::empty();
    assert!(slot.is_empty());
    assert!(slot.set(41).is_ok());
    assert_eq!(slot.set(42), Err(42));
    assert_eq!(slot.take(), Some(41));
    assert_eq!(slot.take(), None);
  }

  #[test]
  fn drop_releases_unclaimed_value() {
    struct Tracked(Arc<AtomicUsize>);
    impl Drop for Tracked {
      fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
      }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    drop(TakeSlot::filled(Tracked(drops.clone())));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn racing_takers_get_the_value_exactly_once() {
    for _ in 0..100 {
      let slot = Arc::new(TakeSlot::filled(7u32));
      let barrier = Arc::new(Barrier::new(4));
      let winners = Arc::new(AtomicUsize::new(0));
      let mut handles = vec![];
      for _ in 0..4 {
        let slot = slot.clone();
        let barrier = barrier.clone();
        let winners = winners.clone();
        handles.push(thread::spawn(move || {
          barrier.wait();
          if slot.take().is_some() {
            winners.fetch_add(1, Ordering::SeqCst);
          }
        }));
      }
      for handle in handles {
        handle.join().unwrap();
      }
      assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
  }
}
