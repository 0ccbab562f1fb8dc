//! Capability traits for the consumer side of a link.
//!
//! `Cancel` is the bare ability to stop an ongoing operation; `Subscription`
//! adds demand signalling on top. Both take `&self`: cancellation and
//! requests race with emission by design, so implementations synchronize
//! internally (every implementation in this crate does so with atomics).

/// Ability to stop an ongoing operation.
///
/// Cancellation is a request to stop producing, not a guarantee that no
/// further signal is in flight. The surrounding machinery invokes `cancel`
/// at most once per held action.
pub trait Cancel {
  fn cancel(&self);
}

/// Consumer-facing contract of an active link: pull-based demand plus
/// cancellation.
pub trait Subscription: Cancel {
  /// Permit the producer to deliver `n` more items. `n == 0` is a protocol
  /// violation, reported through the global hook and otherwise ignored.
  fn request(&self, n: u64);
}

pub type BoxCancel = Box<dyn Cancel + Send + Sync>;
pub type BoxSubscription = Box<dyn Subscription + Send + Sync>;

impl<T: Cancel + ?Sized> Cancel for Box<T> {
  #[inline]
  fn cancel(&self) { (**self).cancel() }
}

impl<T: Subscription + ?Sized> Subscription for Box<T> {
  #[inline]
  fn request(&self, n: u64) { (**self).request(n) }
}

impl<T: Cancel + ?Sized> Cancel for std::sync::Arc<T> {
  #[inline]
  fn cancel(&self) { (**self).cancel() }
}

impl<T: Subscription + ?Sized> Subscription for std::sync::Arc<T> {
  #[inline]
  fn request(&self, n: u64) { (**self).request(n) }
}

/// Adapter turning a closure into a [`Cancel`] action.
pub struct CancelFn<F>(F);

impl<F: Fn()> CancelFn<F> {
  pub fn new(f: F) -> Self { CancelFn(f) }
}

impl<F: Fn()> Cancel for CancelFn<F> {
  #[inline]
  fn cancel(&self) { (self.0)() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  #[test]
  fn cancel_fn_runs_the_closure() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let action = CancelFn::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    action.cancel();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn boxed_subscription_delegates() {
    struct Probe(Arc<AtomicUsize>);
    impl Cancel for Probe {
      fn cancel(&self) {}
    }
    impl Subscription for Probe {
      fn request(&self, n: u64) {
        self.0.fetch_add(n as usize, Ordering::SeqCst);
      }
    }

    let total = Arc::new(AtomicUsize::new(0));
    let boxed: BoxSubscription = Box::new(Probe(total.clone()));
    boxed.request(3);
    boxed.request(4);
    assert_eq!(total.load(Ordering::SeqCst), 7);
  }
}
