//! Serialized queue draining.
//!
//! `QueueDrain` is the engine behind every buffering link: any number of
//! threads push items or terminal signals, each trying to enter the drain
//! loop; the work-in-progress counter elects exactly one of them to run
//! the emission loop against the downstream observer. The elected
//! thread replays queued items against the demand the consumer has granted,
//! then releases ownership only if no new work arrived while it was busy.
//!
//! Ownership election is a single `fetch_add`: the thread that moves the
//! counter 0 -> 1 owns the loop; everyone else just leaves the counter
//! raised, which the owner notices before it can release. A terminal
//! observation returns without lowering the counter at all, latching it
//! non-zero so every later entry attempt bounces off.
//!
//! # Example
//!
//! ```rust
//! use rxcore::prelude::*;
//! use std::sync::{Arc, Mutex};
//!
//! struct Sink(Arc<Mutex<Vec<u32>>>);
//!
//! impl Observer for Sink {
//!   type Item = u32;
//!   type Err = BufferOverflow;
//!
//!   fn next(&mut self, value: u32) { self.0.lock().unwrap().push(value); }
//!   fn error(&mut self, _err: BufferOverflow) {}
//!   fn complete(&mut self) {}
//! }
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let drain = Arc::new(QueueDrain::new(
//!   Sink(seen.clone()),
//!   BufferPolicy::Unbounded,
//!   false,
//! ));
//!
//! drain.on_next(1);
//! drain.on_next(2); // buffered: the consumer granted no demand yet
//! assert!(seen.lock().unwrap().is_empty());
//!
//! drain.request(1); // demand lets exactly one item through
//! assert_eq!(*seen.lock().unwrap(), vec![1]);
//!
//! drain.request(10);
//! drain.on_complete();
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
//! ```

use crate::{
  cancel::CancelSlot,
  demand::{self, Demand, UNBOUNDED},
  error::{BoxError, BufferOverflow, ProtocolError},
  hook,
  observer::Observer,
  queue::{BufferPolicy, EventQueue},
  subscription::{BoxSubscription, Cancel, Subscription},
  util::TakeSlot,
};
use std::{
  cell::UnsafeCell,
  fmt,
  sync::atomic::{AtomicBool, AtomicUsize, Ordering},
  sync::Arc,
};

/// Invoked synchronously when a bounded buffer rejects an item; an `Err`
/// return becomes the `source` of the synthesized [`BufferOverflow`].
pub type OverflowAction = Box<dyn Fn() -> Result<(), BoxError> + Send + Sync>;

/// Buffering link between concurrent producers and one consumer.
///
/// Producer side: [`on_subscribe`](Self::on_subscribe),
/// [`on_next`](Self::on_next), [`on_error`](Self::on_error),
/// [`on_complete`](Self::on_complete), all callable from any thread.
/// Consumer side: the [`Subscription`] impl (`request`/`cancel`).
///
/// With `delay_error == true`, every item accepted into the buffer is
/// delivered before a concurrently arriving error is surfaced; with
/// `false`, an observed error preempts whatever is still buffered.
pub struct QueueDrain<O: Observer> {
  /// Only the thread owning `wip` may touch the observer.
  actual: UnsafeCell<O>,
  queue: EventQueue<O::Item>,
  requested: Demand,
  wip: AtomicUsize,
  cancelled: AtomicBool,
  done: AtomicBool,
  error: TakeSlot<O::Err>,
  delay_error: bool,
  upstream: CancelSlot<dyn Subscription + Send + Sync>,
  on_overflow: Option<OverflowAction>,
}

// SAFETY: every field other than `actual` is thread-safe on its own. The
// observer inside `actual` is reached exclusively by the thread that won
// the 0 -> 1 transition of `wip` (see `drain`), so handing the whole link
// to another thread, or sharing it, needs no more than `O: Send`, the
// same contract a mutex would impose.
unsafe impl<O: Observer + Send> Send for QueueDrain<O>
where
  O::Item: Send,
  O::Err: Send,
{
}
unsafe impl<O: Observer + Send> Sync for QueueDrain<O>
where
  O::Item: Send,
  O::Err: Send,
{
}

impl<O> QueueDrain<O>
where
  O: Observer,
  O::Err: From<BufferOverflow> + fmt::Debug,
{
  pub fn new(actual: O, policy: BufferPolicy, delay_error: bool) -> Self {
    QueueDrain {
      actual: UnsafeCell::new(actual),
      queue: EventQueue::new(policy),
      requested: Demand::new(),
      wip: AtomicUsize::new(0),
      cancelled: AtomicBool::new(false),
      done: AtomicBool::new(false),
      error: TakeSlot::empty(),
      delay_error,
      upstream: CancelSlot::new(),
      on_overflow: None,
    }
  }

  /// Configure the action to run when the bounded buffer rejects an item.
  pub fn with_overflow_action<F>(mut self, action: F) -> Self
  where
    F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
  {
    self.on_overflow = Some(Box::new(action));
    self
  }

  /// Attach the upstream subscription. The buffer decouples demand, so the
  /// upstream is immediately asked for unbounded delivery. A second call is
  /// the "already subscribed" misuse: the new subscription is cancelled and
  /// the violation reported.
  pub fn on_subscribe(&self, upstream: BoxSubscription) {
    if self.upstream.set_once(upstream) {
      self.upstream.with(|s| s.request(UNBOUNDED));
    }
  }

  /// Enqueue an item and trigger a drain pass.
  ///
  /// On a full bounded buffer: the upstream is cancelled, the overflow
  /// action (if any) runs once, and a [`BufferOverflow`] is delivered
  /// through the regular terminal path.
  pub fn on_next(&self, item: O::Item) {
    if self.cancelled.load(Ordering::Acquire) {
      return;
    }
    if self.done.load(Ordering::Acquire) {
      hook::report(ProtocolError::SignalAfterTerminal);
      return;
    }
    if self.queue.push(item).is_err() {
      self.upstream.dispose();
      log::debug!("bounded buffer rejected an item, terminating with overflow");
      let overflow = match &self.on_overflow {
        Some(action) => match action() {
          Ok(()) => BufferOverflow::new(),
          Err(cause) => BufferOverflow::with_cause(cause),
        },
        None => BufferOverflow::new(),
      };
      self.on_error(O::Err::from(overflow));
      return;
    }
    self.drain();
  }

  /// Record the terminal error and trigger a drain pass. At most one
  /// terminal signal is honored; later ones are dropped and reported.
  pub fn on_error(&self, err: O::Err) {
    if self.cancelled.load(Ordering::Acquire)
      || self.done.load(Ordering::Acquire)
    {
      hook::report(ProtocolError::DroppedError(format!("{err:?}")));
      return;
    }
    if let Err(err) = self.error.set(err) {
      hook::report(ProtocolError::DroppedError(format!("{err:?}")));
      return;
    }
    self.done.store(true, Ordering::Release);
    self.drain();
  }

  /// Record completion and trigger a drain pass.
  pub fn on_complete(&self) {
    if self.cancelled.load(Ordering::Acquire) {
      return;
    }
    if self.done.load(Ordering::Acquire) {
      hook::report(ProtocolError::SignalAfterTerminal);
      return;
    }
    self.done.store(true, Ordering::Release);
    self.drain();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Acquire)
  }

  fn drain(&self) {
    if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
      // Someone owns the loop; the raised counter is our work ticket and
      // the owner re-checks before it can release.
      return;
    }
    let mut missed = 1;
    loop {
      // SAFETY: the 0 -> 1 transition above (or a non-zero `missed` below)
      // makes this thread the sole owner of the loop until it decrements
      // `wip` back to zero, so no other thread can be here.
      let actual = unsafe { &mut *self.actual.get() };

      if self.check_terminated(
        self.done.load(Ordering::Acquire),
        self.queue.is_empty(),
        actual,
      ) {
        return;
      }

      let r = self.requested.current();
      let mut e: u64 = 0;
      while e != r {
        let d = self.done.load(Ordering::Acquire);
        let item = self.queue.pop();
        let empty = item.is_none();

        if self.check_terminated(d, empty, actual) {
          return;
        }
        let Some(item) = item else { break };

        actual.next(item);
        e += 1;
      }

      if e != 0 && r != UNBOUNDED {
        self.requested.produced(e);
      }

      missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
      if missed == 0 {
        return;
      }
    }
  }

  /// Decide whether the loop is over. Returning `true` means a terminal
  /// condition was handled and `wip` stays raised forever, so no thread
  /// re-enters the emission section.
  fn check_terminated(&self, done: bool, empty: bool, actual: &mut O) -> bool {
    if self.cancelled.load(Ordering::Acquire) {
      self.queue.clear();
      self.upstream.dispose();
      if let Some(err) = self.error.take() {
        hook::report(ProtocolError::DroppedError(format!("{err:?}")));
      }
      return true;
    }
    if done {
      if self.delay_error {
        if empty {
          match self.error.take() {
            Some(err) => actual.error(err),
            None => actual.complete(),
          }
          return true;
        }
      } else if let Some(err) = self.error.take() {
        self.queue.clear();
        actual.error(err);
        return true;
      } else if empty {
        actual.complete();
        return true;
      }
    }
    false
  }
}

impl<O> Cancel for QueueDrain<O>
where
  O: Observer,
  O::Err: From<BufferOverflow> + fmt::Debug,
{
  /// Stop the link. Items already handed to the observer are not recalled;
  /// no new ownership cycle will emit after this returns.
  fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      // Raising wip here either wins the loop (then we clean up directly)
      // or hands the cleanup to the current owner, which re-checks the
      // cancelled flag. Either way the counter never returns to zero.
      if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
        self.queue.clear();
        self.upstream.dispose();
      }
    }
  }
}

impl<O> Subscription for QueueDrain<O>
where
  O: Observer,
  O::Err: From<BufferOverflow> + fmt::Debug,
{
  fn request(&self, n: u64) {
    if demand::validate(n) {
      self.requested.add(n);
      self.drain();
    }
  }
}

/// A shared drain can itself stand downstream of another link.
impl<O> Observer for Arc<QueueDrain<O>>
where
  O: Observer,
  O::Err: From<BufferOverflow> + fmt::Debug,
{
  type Item = O::Item;
  type Err = O::Err;

  fn next(&mut self, value: Self::Item) { self.on_next(value) }

  fn error(&mut self, err: Self::Err) { self.on_error(err) }

  fn complete(&mut self) { self.on_complete() }
}

impl<O: Observer> fmt::Debug for QueueDrain<O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueueDrain")
      .field("wip", &self.wip.load(Ordering::Relaxed))
      .field("buffered", &self.queue.len())
      .field("done", &self.done.load(Ordering::Relaxed))
      .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
      .finish()
  }
}
