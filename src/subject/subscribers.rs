//! Copy-on-write subscriber registry with a terminal latch.
//!
//! The registry never mutates a published snapshot: every add/remove swaps
//! in a freshly built array via compare-and-swap, so readers always observe
//! a consistent (if momentarily stale) set. Termination swaps in a
//! distinguished terminated snapshot; the single caller that wins that swap
//! receives the set of subscribers that were live at termination time and
//! owns fanning the terminal payload out to them.

use arc_swap::ArcSwap;
use smallvec::SmallVec;
use std::sync::Arc;

type Snapshot<S> = SmallVec<[Arc<S>; 2]>;

struct Entries<S> {
  subs: Snapshot<S>,
  terminated: bool,
}

/// Lock-free set of subscriber handles.
///
/// Empty and terminated are distinct states: an empty registry still
/// accepts `add`, a terminated one never does again.
pub struct SubscriberList<S> {
  entries: ArcSwap<Entries<S>>,
}

impl<S> SubscriberList<S> {
  pub fn new() -> Self {
    SubscriberList {
      entries: ArcSwap::from_pointee(Entries {
        subs: SmallVec::new(),
        terminated: false,
      }),
    }
  }

  /// Append `sub`; fails iff the registry is terminated.
  pub fn add(&self, sub: Arc<S>) -> bool {
    loop {
      let current = self.entries.load_full();
      if current.terminated {
        return false;
      }
      let mut subs = current.subs.clone();
      subs.push(sub.clone());
      let next = Arc::new(Entries { subs, terminated: false });
      let previous = self.entries.compare_and_swap(&current, next);
      if Arc::ptr_eq(&*previous, &current) {
        return true;
      }
    }
  }

  /// Remove `sub` by identity, compacting the snapshot. No-op if the
  /// registry is terminated or `sub` is not present.
  pub fn remove(&self, sub: &Arc<S>) {
    loop {
      let current = self.entries.load_full();
      if current.terminated
        || !current.subs.iter().any(|s| Arc::ptr_eq(s, sub))
      {
        return;
      }
      let subs = current
        .subs
        .iter()
        .filter(|s| !Arc::ptr_eq(s, sub))
        .cloned()
        .collect();
      let next = Arc::new(Entries { subs, terminated: false });
      let previous = self.entries.compare_and_swap(&current, next);
      if Arc::ptr_eq(&*previous, &current) {
        return;
      }
    }
  }

  /// Swap in the terminated state. Exactly one caller receives
  /// `Some(snapshot)` with the subscribers live at termination time, and
  /// with it the duty of delivering the terminal payload to each of them.
  pub fn terminate(&self) -> Option<Vec<Arc<S>>> {
    let terminated =
      Arc::new(Entries { subs: SmallVec::new(), terminated: true });
    loop {
      let current = self.entries.load_full();
      if current.terminated {
        return None;
      }
      let previous =
        self.entries.compare_and_swap(&current, terminated.clone());
      if Arc::ptr_eq(&*previous, &current) {
        log::trace!(
          "registry terminated with {} live subscriber(s)",
          current.subs.len()
        );
        return Some(current.subs.to_vec());
      }
    }
  }

  pub fn is_terminated(&self) -> bool { self.entries.load().terminated }

  pub fn len(&self) -> usize { self.entries.load().subs.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl<S> Default for SubscriberList<S> {
  fn default() -> Self { Self::new() }
}
