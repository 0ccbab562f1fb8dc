//! Multicast primitive that replays the last value at completion.
//!
//! A `LastValueSubject` consumes one upstream and serves many downstream
//! subscribers. While the upstream is live, incoming values only overwrite
//! an internal slot; nothing is forwarded. At termination the subject
//! latches its terminal payload (the most recent value plus completion, or
//! the error) exactly once, fans it out to every subscriber registered at
//! that instant, and replays it to every subscriber that arrives later,
//! without ever adding those to the live registry.
//!
//! Each subscriber owns a tiny state machine reconciling two independent
//! events, "the value became available" and "demand arrived", so that the
//! delivery happens exactly once no matter which event comes second, or on
//! which thread.

use crate::{
  cancel::CancelSlot,
  demand::{self, UNBOUNDED},
  error::ProtocolError,
  hook,
  observer::{BoxObserver, Observer},
  subject::subscribers::SubscriberList,
  subscription::{BoxSubscription, Cancel, Subscription},
  util::TakeSlot,
};
use once_cell::sync::OnceCell;
use std::{
  fmt,
  sync::atomic::{AtomicBool, AtomicU8, Ordering},
  sync::{Arc, Weak},
};

use arc_swap::ArcSwapOption;

enum Terminal<Item, Err> {
  /// Completed, with the last value seen (if any).
  Completed(Option<Arc<Item>>),
  Failed(Err),
}

struct Core<Item, Err> {
  subscribers: SubscriberList<ReplaySubscription<Item, Err>>,
  /// Overwritten by every `on_next`; read once at completion.
  latest: ArcSwapOption<Item>,
  /// Latched before the registry is terminated, so a failed `add` always
  /// finds the payload in place.
  terminal: OnceCell<Terminal<Item, Err>>,
  done: AtomicBool,
  upstream: CancelSlot<dyn Subscription + Send + Sync>,
}

/// Hot multicast source emitting the very last value followed by
/// completion, or the received error, to every subscriber.
///
/// Cloning the subject clones a handle to the same underlying state.
///
/// # Example
///
/// ```rust
/// use rxcore::prelude::*;
/// use std::sync::{Arc, Mutex};
///
/// let subject: LastValueSubject<i32, ()> = LastValueSubject::new();
/// subject.on_next(1);
/// subject.on_next(42);
/// subject.on_complete();
///
/// // A late subscriber still receives the captured terminal value.
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// let subscription = subject.subscribe(LambdaSubscriber::new(
///   move |v: i32| sink.lock().unwrap().push(v),
///   |_err: ()| {},
///   || {},
/// ));
/// subscription.request(1);
/// assert_eq!(*seen.lock().unwrap(), vec![42]);
/// ```
pub struct LastValueSubject<Item, Err> {
  core: Arc<Core<Item, Err>>,
}

impl<Item, Err> Clone for LastValueSubject<Item, Err> {
  fn clone(&self) -> Self { LastValueSubject { core: self.core.clone() } }
}

impl<Item, Err> LastValueSubject<Item, Err>
where
  Item: Clone + Send + Sync + 'static,
  Err: Clone + fmt::Debug + Send + Sync + 'static,
{
  pub fn new() -> Self {
    LastValueSubject {
      core: Arc::new(Core {
        subscribers: SubscriberList::new(),
        latest: ArcSwapOption::empty(),
        terminal: OnceCell::new(),
        done: AtomicBool::new(false),
        upstream: CancelSlot::new(),
      }),
    }
  }

  /// Attach the upstream feeding this subject. Cancels it right away if
  /// the subject already terminated, otherwise adopts it (set-once, a
  /// duplicate is reported) and requests unbounded delivery.
  pub fn on_subscribe(&self, upstream: BoxSubscription) {
    if self.core.done.load(Ordering::Acquire) {
      upstream.cancel();
      return;
    }
    if self.core.upstream.set_once(upstream) {
      self.core.upstream.with(|s| s.request(UNBOUNDED));
    }
  }

  /// Overwrite the pending value. Nothing is forwarded until termination.
  pub fn on_next(&self, value: Item) {
    if self.core.done.load(Ordering::Acquire) {
      hook::report(ProtocolError::SignalAfterTerminal);
      return;
    }
    self.core.latest.store(Some(Arc::new(value)));
  }

  /// Latch the error and fan it out. Errors are delivered to subscribers
  /// without waiting for demand.
  pub fn on_error(&self, err: Err) {
    if self.core.done.swap(true, Ordering::AcqRel) {
      hook::report(ProtocolError::DroppedError(format!("{err:?}")));
      return;
    }
    let _ = self.core.terminal.set(Terminal::Failed(err.clone()));
    if let Some(subs) = self.core.subscribers.terminate() {
      log::trace!("multicast failed, notifying {} subscriber(s)", subs.len());
      for sub in subs {
        sub.deliver_error(err.clone());
      }
    }
  }

  /// Latch the last value (if any) and fan out completion.
  pub fn on_complete(&self) {
    if self.core.done.swap(true, Ordering::AcqRel) {
      hook::report(ProtocolError::SignalAfterTerminal);
      return;
    }
    let value = self.core.latest.load_full();
    let _ = self.core.terminal.set(Terminal::Completed(value.clone()));
    if let Some(subs) = self.core.subscribers.terminate() {
      log::trace!(
        "multicast completed, notifying {} subscriber(s)",
        subs.len()
      );
      for sub in subs {
        sub.value_ready(value.clone());
      }
    }
  }

  /// Register `observer`. If the subject already terminated, the latched
  /// payload is replayed directly and the observer is never added to the
  /// live registry.
  pub fn subscribe<O>(&self, observer: O) -> SubjectSubscription<Item, Err>
  where
    O: Observer<Item = Item, Err = Err> + Send + 'static,
  {
    let replay = Arc::new(ReplaySubscription {
      state: AtomicU8::new(NO_REQUEST_NO_VALUE),
      actual: TakeSlot::filled(Box::new(observer) as BoxObserver<Item, Err>),
      core: Arc::downgrade(&self.core),
    });
    if self.core.subscribers.add(replay.clone()) {
      // A cancellation may have raced the insertion; compact if so.
      if replay.is_done() {
        self.core.subscribers.remove(&replay);
      }
    } else {
      match self.core.terminal.get() {
        Some(Terminal::Failed(err)) => replay.deliver_error(err.clone()),
        Some(Terminal::Completed(value)) => replay.value_ready(value.clone()),
        None => {}
      }
    }
    SubjectSubscription { inner: replay }
  }

  pub fn has_observers(&self) -> bool { !self.core.subscribers.is_empty() }

  pub fn is_terminated(&self) -> bool {
    self.core.subscribers.is_terminated()
  }

  pub fn is_completed(&self) -> bool {
    matches!(self.core.terminal.get(), Some(Terminal::Completed(_)))
  }

  pub fn terminal_error(&self) -> Option<Err> {
    match self.core.terminal.get() {
      Some(Terminal::Failed(err)) => Some(err.clone()),
      _ => None,
    }
  }

  pub fn has_value(&self) -> bool {
    match self.core.terminal.get() {
      Some(Terminal::Completed(value)) => value.is_some(),
      Some(Terminal::Failed(_)) => false,
      None => self.core.latest.load().is_some(),
    }
  }

  /// The value a subscriber would currently receive at completion.
  pub fn latest_value(&self) -> Option<Item> {
    let value = match self.core.terminal.get() {
      Some(Terminal::Completed(value)) => value.clone(),
      Some(Terminal::Failed(_)) => None,
      None => self.core.latest.load_full(),
    };
    value.map(|v| (*v).clone())
  }
}

impl<Item, Err> Default for LastValueSubject<Item, Err>
where
  Item: Clone + Send + Sync + 'static,
  Err: Clone + fmt::Debug + Send + Sync + 'static,
{
  fn default() -> Self { Self::new() }
}

/// The subject can sit downstream of any other stage.
impl<Item, Err> Observer for LastValueSubject<Item, Err>
where
  Item: Clone + Send + Sync + 'static,
  Err: Clone + fmt::Debug + Send + Sync + 'static,
{
  type Item = Item;
  type Err = Err;

  fn next(&mut self, value: Item) { self.on_next(value) }

  fn error(&mut self, err: Err) { self.on_error(err) }

  fn complete(&mut self) { self.on_complete() }
}

// Per-subscriber reconciliation states. "value" below means the terminal
// payload became available, not an individual emission.
const NO_REQUEST_NO_VALUE: u8 = 0;
const NO_REQUEST_HAS_VALUE: u8 = 1;
const HAS_REQUEST_NO_VALUE: u8 = 2;
const HAS_REQUEST_HAS_VALUE: u8 = 3;

struct ReplaySubscription<Item, Err> {
  state: AtomicU8,
  /// Handed to whichever thread wins the delivery race.
  actual: TakeSlot<BoxObserver<Item, Err>>,
  core: Weak<Core<Item, Err>>,
}

impl<Item, Err> ReplaySubscription<Item, Err>
where
  Item: Clone + Send + Sync + 'static,
  Err: Clone + fmt::Debug + Send + Sync + 'static,
{
  /// The terminal value is available; deliver it if demand already arrived,
  /// otherwise just record that half of the state.
  fn value_ready(&self, value: Option<Arc<Item>>) {
    loop {
      match self.state.load(Ordering::Acquire) {
        NO_REQUEST_HAS_VALUE | HAS_REQUEST_HAS_VALUE => return,
        NO_REQUEST_NO_VALUE => {
          if self
            .state
            .compare_exchange(
              NO_REQUEST_NO_VALUE,
              NO_REQUEST_HAS_VALUE,
              Ordering::AcqRel,
              Ordering::Acquire,
            )
            .is_ok()
          {
            return;
          }
        }
        _ => {
          // HAS_REQUEST_NO_VALUE: demand was already granted. value_ready
          // runs at most once, so the plain store cannot race another
          // delivery path.
          self.state.store(HAS_REQUEST_HAS_VALUE, Ordering::Release);
          if let Some(mut actual) = self.actual.take() {
            if let Some(value) = &value {
              actual.next((**value).clone());
            }
            actual.complete();
          }
          return;
        }
      }
    }
  }

  fn deliver_error(&self, err: Err) {
    let previous = self.state.swap(HAS_REQUEST_HAS_VALUE, Ordering::AcqRel);
    if previous != HAS_REQUEST_HAS_VALUE {
      if let Some(mut actual) = self.actual.take() {
        actual.error(err);
      }
    }
  }

  fn request(&self, n: u64) {
    if !demand::validate(n) {
      return;
    }
    loop {
      match self.state.load(Ordering::Acquire) {
        HAS_REQUEST_NO_VALUE | HAS_REQUEST_HAS_VALUE => return,
        NO_REQUEST_NO_VALUE => {
          if self
            .state
            .compare_exchange(
              NO_REQUEST_NO_VALUE,
              HAS_REQUEST_NO_VALUE,
              Ordering::AcqRel,
              Ordering::Acquire,
            )
            .is_ok()
          {
            return;
          }
        }
        _ => {
          // NO_REQUEST_HAS_VALUE: the payload is latched; we deliver.
          if self
            .state
            .compare_exchange(
              NO_REQUEST_HAS_VALUE,
              HAS_REQUEST_HAS_VALUE,
              Ordering::AcqRel,
              Ordering::Acquire,
            )
            .is_ok()
          {
            let value = self.core.upgrade().and_then(|core| {
              match core.terminal.get() {
                Some(Terminal::Completed(value)) => value.clone(),
                _ => None,
              }
            });
            if let Some(mut actual) = self.actual.take() {
              if let Some(value) = &value {
                actual.next((**value).clone());
              }
              actual.complete();
            }
            return;
          }
        }
      }
    }
  }

  fn is_done(&self) -> bool {
    self.state.load(Ordering::Acquire) == HAS_REQUEST_HAS_VALUE
  }
}

/// Handle returned by [`LastValueSubject::subscribe`].
pub struct SubjectSubscription<Item, Err> {
  inner: Arc<ReplaySubscription<Item, Err>>,
}

impl<Item, Err> Clone for SubjectSubscription<Item, Err> {
  fn clone(&self) -> Self {
    SubjectSubscription { inner: self.inner.clone() }
  }
}

impl<Item, Err> SubjectSubscription<Item, Err> {
  /// Whether no further signal can reach the observer, either because the
  /// subscription was cancelled or because delivery already happened.
  pub fn is_closed(&self) -> bool {
    self.inner.state.load(Ordering::Acquire) == HAS_REQUEST_HAS_VALUE
      && self.inner.actual.is_empty()
  }
}

impl<Item, Err> Cancel for SubjectSubscription<Item, Err>
where
  Item: Clone + Send + Sync + 'static,
  Err: Clone + fmt::Debug + Send + Sync + 'static,
{
  fn cancel(&self) {
    let previous =
      self.inner.state.swap(HAS_REQUEST_HAS_VALUE, Ordering::AcqRel);
    if previous != HAS_REQUEST_HAS_VALUE {
      drop(self.inner.actual.take());
      if let Some(core) = self.inner.core.upgrade() {
        core.subscribers.remove(&self.inner);
      }
    }
  }
}

impl<Item, Err> Subscription for SubjectSubscription<Item, Err>
where
  Item: Clone + Send + Sync + 'static,
  Err: Clone + fmt::Debug + Send + Sync + 'static,
{
  fn request(&self, n: u64) { self.inner.request(n) }
}
