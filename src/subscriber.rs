//! Closure-backed consumer endpoint.

use crate::{
  cancel::CancelSlot,
  demand::UNBOUNDED,
  observer::Observer,
  subscription::{BoxSubscription, Cancel, Subscription},
};
use std::marker::PhantomData;

/// Terminal consumer built from three closures, holding its upstream in a
/// [`CancelSlot`].
///
/// Once a terminal signal is consumed (or the subscriber is cancelled) the
/// slot is disposed, so any later upstream handed to
/// [`on_subscribe`](Self::on_subscribe) is cancelled on arrival and further
/// signals are ignored.
pub struct LambdaSubscriber<Item, Err, N, E, C> {
  on_next: N,
  on_error: E,
  on_complete: C,
  upstream: CancelSlot<dyn Subscription + Send + Sync>,
  _marker: PhantomData<fn(Item, Err)>,
}

impl<Item, Err, N, E, C> LambdaSubscriber<Item, Err, N, E, C>
where
  N: FnMut(Item),
  E: FnMut(Err),
  C: FnMut(),
{
  pub fn new(on_next: N, on_error: E, on_complete: C) -> Self {
    LambdaSubscriber {
      on_next,
      on_error,
      on_complete,
      upstream: CancelSlot::new(),
      _marker: PhantomData,
    }
  }

  /// Adopt the upstream subscription and ask it for unbounded delivery.
  /// A duplicate upstream is cancelled and reported by the slot.
  pub fn on_subscribe(&self, upstream: BoxSubscription) {
    if self.upstream.set_once(upstream) {
      self.upstream.with(|s| s.request(UNBOUNDED));
    }
  }

  pub fn is_stopped(&self) -> bool { self.upstream.is_disposed() }
}

impl<Item, Err, N, E, C> Observer for LambdaSubscriber<Item, Err, N, E, C>
where
  N: FnMut(Item),
  E: FnMut(Err),
  C: FnMut(),
{
  type Item = Item;
  type Err = Err;

  fn next(&mut self, value: Item) {
    if !self.upstream.is_disposed() {
      (self.on_next)(value);
    }
  }

  fn error(&mut self, err: Err) {
    if !self.upstream.is_disposed() {
      self.upstream.dispose();
      (self.on_error)(err);
    }
  }

  fn complete(&mut self) {
    if !self.upstream.is_disposed() {
      self.upstream.dispose();
      (self.on_complete)();
    }
  }
}

impl<Item, Err, N, E, C> Cancel for LambdaSubscriber<Item, Err, N, E, C>
where
  N: FnMut(Item),
  E: FnMut(Err),
  C: FnMut(),
{
  fn cancel(&self) { self.upstream.dispose(); }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
  };

  fn counting_subscriber() -> (
    LambdaSubscriber<
      i32,
      String,
      impl FnMut(i32),
      impl FnMut(String),
      impl FnMut(),
    >,
    Arc<Mutex<Vec<i32>>>,
    Arc<Mutex<Vec<String>>>,
    Arc<AtomicUsize>,
  ) {
    let values = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let completions = Arc::new(AtomicUsize::new(0));
    let (v, e, c) = (values.clone(), errors.clone(), completions.clone());
    let subscriber = LambdaSubscriber::new(
      move |value| v.lock().unwrap().push(value),
      move |err| e.lock().unwrap().push(err),
      move || {
        c.fetch_add(1, Ordering::SeqCst);
      },
    );
    (subscriber, values, errors, completions)
  }

  struct StubUpstream(Arc<AtomicUsize>);

  impl Cancel for StubUpstream {
    fn cancel(&self) {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }

  impl Subscription for StubUpstream {
    fn request(&self, _n: u64) {}
  }

  #[test]
  fn routes_signals_to_the_closures() {
    let (mut subscriber, values, errors, completions) = counting_subscriber();
    subscriber.next(1);
    subscriber.next(2);
    subscriber.complete();

    assert_eq!(*values.lock().unwrap(), vec![1, 2]);
    assert!(errors.lock().unwrap().is_empty());
    assert_eq!(completions.load(Ordering::SeqCst), 1);

    // Terminal reached: everything afterwards is ignored.
    subscriber.next(3);
    subscriber.error("late".to_string());
    assert_eq!(*values.lock().unwrap(), vec![1, 2]);
    assert!(errors.lock().unwrap().is_empty());
  }

  #[test]
  fn error_is_terminal_too() {
    let (mut subscriber, _values, errors, completions) =
      counting_subscriber();
    subscriber.error("boom".to_string());
    subscriber.complete();

    assert_eq!(*errors.lock().unwrap(), vec!["boom".to_string()]);
    assert_eq!(completions.load(Ordering::SeqCst), 0);
    assert!(subscriber.is_stopped());
  }

  #[test]
  fn cancel_releases_the_upstream_and_mutes_signals() {
    let (mut subscriber, values, _errors, _completions) =
      counting_subscriber();
    let cancels = Arc::new(AtomicUsize::new(0));
    subscriber.on_subscribe(Box::new(StubUpstream(cancels.clone())));

    subscriber.cancel();
    assert_eq!(cancels.load(Ordering::SeqCst), 1);
    subscriber.cancel();
    assert_eq!(cancels.load(Ordering::SeqCst), 1);

    subscriber.next(1);
    assert!(values.lock().unwrap().is_empty());
  }

  #[test]
  fn upstream_arriving_after_cancel_is_cancelled_on_arrival() {
    let (subscriber, _values, _errors, _completions) = counting_subscriber();
    subscriber.cancel();

    let cancels = Arc::new(AtomicUsize::new(0));
    subscriber.on_subscribe(Box::new(StubUpstream(cancels.clone())));
    assert_eq!(cancels.load(Ordering::SeqCst), 1);
  }
}
