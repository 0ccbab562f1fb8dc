//! Atomically swappable cancellation action.
//!
//! A `CancelSlot` wraps at most one active [`Cancel`] action and moves
//! through three observable states: *empty*, *armed* (holding an action)
//! and *disposed*. Disposed is terminal: the winning `dispose` call cancels
//! whatever was armed, and any action swapped in afterwards is cancelled
//! immediately instead of being stored, which is what prevents resource
//! leaks when a `set` races a `dispose`.
//!
//! Every operation is a compare-and-swap retry loop over a copy-on-write
//! slot; nothing here blocks.

use crate::{error::ProtocolError, hook, subscription::Cancel};
use arc_swap::ArcSwapOption;
use std::sync::Arc;

enum Slot<T: ?Sized> {
  Armed(Box<T>),
  Disposed,
}

/// Holder for the cancellation action of one link.
///
/// `T` is the capability the slot hands back out: plain [`Cancel`] by
/// default, or [`crate::subscription::Subscription`] where the holder must
/// also forward demand upstream.
pub struct CancelSlot<T: ?Sized = dyn Cancel + Send + Sync> {
  slot: ArcSwapOption<Slot<T>>,
}

fn same<T: ?Sized>(
  a: Option<&Arc<Slot<T>>>,
  b: Option<&Arc<Slot<T>>>,
) -> bool {
  match (a, b) {
    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
    (None, None) => true,
    _ => false,
  }
}

fn cancel_armed<T: Cancel + ?Sized>(slot: &Arc<Slot<T>>) {
  if let Slot::Armed(action) = &**slot {
    action.cancel();
  }
}

impl<T: Cancel + Send + Sync + ?Sized + 'static> CancelSlot<T> {
  pub fn new() -> Self { CancelSlot { slot: ArcSwapOption::empty() } }

  /// Adopt `action` iff the slot is empty.
  ///
  /// An armed slot means the link was subscribed to twice: the new action
  /// is cancelled and the misuse is reported through the global hook. A
  /// disposed slot cancels the new action silently. Returns whether the
  /// action was adopted.
  pub fn set_once(&self, action: Box<T>) -> bool {
    let armed = Arc::new(Slot::Armed(action));
    loop {
      let current = self.slot.load_full();
      match current.as_deref() {
        None => {
          let previous =
            self.slot.compare_and_swap(&current, Some(armed.clone()));
          if same((*previous).as_ref(), current.as_ref()) {
            return true;
          }
        }
        Some(Slot::Disposed) => {
          cancel_armed(&armed);
          return false;
        }
        Some(Slot::Armed(_)) => {
          cancel_armed(&armed);
          hook::report(ProtocolError::AlreadySubscribed);
          return false;
        }
      }
    }
  }

  /// Swap in `action` without cancelling the previous one, which the caller
  /// is expected to supersede. Returns `false` (cancelling `action`) iff
  /// the slot was already disposed.
  pub fn replace(&self, action: Box<T>) -> bool {
    let armed = Arc::new(Slot::Armed(action));
    loop {
      let current = self.slot.load_full();
      if matches!(current.as_deref(), Some(Slot::Disposed)) {
        cancel_armed(&armed);
        return false;
      }
      let previous = self.slot.compare_and_swap(&current, Some(armed.clone()));
      if same((*previous).as_ref(), current.as_ref()) {
        return true;
      }
    }
  }

  /// Swap in `action`, cancelling the previously armed action. Returns
  /// `false` (cancelling `action`) iff the slot was already disposed.
  pub fn set(&self, action: Box<T>) -> bool {
    let armed = Arc::new(Slot::Armed(action));
    loop {
      let current = self.slot.load_full();
      if matches!(current.as_deref(), Some(Slot::Disposed)) {
        cancel_armed(&armed);
        return false;
      }
      let previous = self.slot.compare_and_swap(&current, Some(armed.clone()));
      if same((*previous).as_ref(), current.as_ref()) {
        if let Some(old) = current {
          cancel_armed(&old);
        }
        return true;
      }
    }
  }

  /// Swap in the disposed marker. Exactly one caller wins the swap and
  /// cancels the previously armed action; everyone else observes disposed
  /// and does nothing. Returns whether this call won.
  pub fn dispose(&self) -> bool {
    let disposed = Arc::new(Slot::Disposed);
    loop {
      let current = self.slot.load_full();
      if matches!(current.as_deref(), Some(Slot::Disposed)) {
        return false;
      }
      let previous =
        self.slot.compare_and_swap(&current, Some(disposed.clone()));
      if same((*previous).as_ref(), current.as_ref()) {
        log::trace!("cancel slot disposed");
        if let Some(old) = current {
          cancel_armed(&old);
        }
        return true;
      }
    }
  }

  pub fn is_disposed(&self) -> bool {
    matches!(self.slot.load().as_deref(), Some(Slot::Disposed))
  }

  /// Run `f` against the currently armed action, if any.
  pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
    let guard = self.slot.load();
    match guard.as_deref() {
      Some(Slot::Armed(action)) => Some(f(action)),
      _ => None,
    }
  }
}

impl<T: Cancel + Send + Sync + ?Sized + 'static> Default for CancelSlot<T> {
  fn default() -> Self { Self::new() }
}

impl<T: ?Sized> std::fmt::Debug for CancelSlot<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = match self.slot.load().as_deref() {
      None => "empty",
      Some(Slot::Armed(_)) => "armed",
      Some(Slot::Disposed) => "disposed",
    };
    f.debug_struct("CancelSlot").field("state", &state).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{hook::ScopedHook, subscription::CancelFn};
  use std::{
    sync::{
      atomic::{AtomicUsize, Ordering},
      Arc, Barrier,
    },
    thread,
  };

  fn counting_action(
    hits: &Arc<AtomicUsize>,
  ) -> Box<dyn Cancel + Send + Sync> {
    let hits = hits.clone();
    Box::new(CancelFn::new(move || {
      hits.fetch_add(1, Ordering::SeqCst);
    }))
  }

  #[test]
  fn set_once_adopts_then_rejects() {
    let (_guard, seen) = ScopedHook::capture();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let slot = CancelSlot::new();

    assert!(slot.set_once(counting_action(&first)));
    assert!(!slot.set_once(counting_action(&second)));

    // The loser is cancelled immediately, the winner untouched, and the
    // double subscription is reported.
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(
      *seen.lock().unwrap(),
      vec![ProtocolError::AlreadySubscribed]
    );
  }

  #[test]
  fn replace_keeps_the_previous_action_alive() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let slot = CancelSlot::new();

    assert!(slot.set_once(counting_action(&first)));
    assert!(slot.replace(counting_action(&second)));
    assert_eq!(first.load(Ordering::SeqCst), 0);

    slot.dispose();
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn set_cancels_the_previous_action() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let slot = CancelSlot::new();

    assert!(slot.set_once(counting_action(&first)));
    assert!(slot.set(counting_action(&second)));
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn dispose_is_idempotent() {
    let hits = Arc::new(AtomicUsize::new(0));
    let slot = CancelSlot::new();
    slot.set_once(counting_action(&hits));

    assert!(slot.dispose());
    assert!(!slot.dispose());
    assert!(!slot.dispose());
    assert!(slot.is_disposed());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn set_after_dispose_cancels_immediately() {
    let late = Arc::new(AtomicUsize::new(0));
    let slot = CancelSlot::new();
    slot.dispose();

    assert!(!slot.set_once(counting_action(&late)));
    assert_eq!(late.load(Ordering::SeqCst), 1);
    let later = Arc::new(AtomicUsize::new(0));
    assert!(!slot.replace(counting_action(&later)));
    assert!(!slot.set(counting_action(&later)));
    assert_eq!(later.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn with_reaches_the_armed_action() {
    let slot: CancelSlot = CancelSlot::new();
    assert_eq!(slot.with(|_| ()), None);
    slot.set_once(Box::new(CancelFn::new(|| {})));
    assert_eq!(slot.with(|_| 42), Some(42));
    slot.dispose();
    assert_eq!(slot.with(|_| 42), None);
  }

  #[test]
  fn racing_disposers_cancel_exactly_once() {
    for _ in 0..100 {
      let hits = Arc::new(AtomicUsize::new(0));
      let slot = Arc::new(CancelSlot::new());
      slot.set_once(counting_action(&hits));

      let barrier = Arc::new(Barrier::new(4));
      let wins = Arc::new(AtomicUsize::new(0));
      let mut handles = vec![];
      for _ in 0..4 {
        let slot = slot.clone();
        let barrier = barrier.clone();
        let wins = wins.clone();
        handles.push(thread::spawn(move || {
          barrier.wait();
          if slot.dispose() {
            wins.fetch_add(1, Ordering::SeqCst);
          }
        }));
      }
      for handle in handles {
        handle.join().unwrap();
      }
      assert_eq!(hits.load(Ordering::SeqCst), 1);
      assert_eq!(wins.load(Ordering::SeqCst), 1);
    }
  }
}
