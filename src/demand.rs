//! Backpressure demand accounting.
//!
//! A `Demand` counts the items a consumer currently permits a producer to
//! deliver. Consumers add to it through `request`; the drain loop subtracts
//! what it has emitted. The counter saturates at [`UNBOUNDED`], which means
//! "unlimited": once there, every later operation is a no-op.

use crate::{error::ProtocolError, hook};
use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel for unlimited demand.
pub const UNBOUNDED: u64 = u64::MAX;

/// Validate a request amount, reporting non-positive amounts as protocol
/// violations. Returns `false` if the request must be ignored.
pub fn validate(n: u64) -> bool {
  if n == 0 {
    hook::report(ProtocolError::InvalidRequest(n));
    return false;
  }
  true
}

/// Shared requested-but-not-yet-emitted counter.
#[derive(Debug, Default)]
pub struct Demand(AtomicU64);

impl Demand {
  pub fn new() -> Self { Demand(AtomicU64::new(0)) }

  pub fn unbounded() -> Self { Demand(AtomicU64::new(UNBOUNDED)) }

  /// Add `n` to the counter, saturating at [`UNBOUNDED`]. Returns the
  /// previous value, so callers can detect the 0 -> n transition that means
  /// emission may resume.
  pub fn add(&self, n: u64) -> u64 {
    let mut current = self.0.load(Ordering::Relaxed);
    loop {
      if current == UNBOUNDED {
        return UNBOUNDED;
      }
      let next = current.saturating_add(n);
      match self.0.compare_exchange_weak(
        current,
        next,
        Ordering::AcqRel,
        Ordering::Relaxed,
      ) {
        Ok(previous) => return previous,
        Err(actual) => current = actual,
      }
    }
  }

  /// Subtract `n` items just emitted. Only the link currently holding drain
  /// ownership may call this. A no-op at [`UNBOUNDED`]; clamps at zero and
  /// reports instead of wrapping if a producer overshoots.
  pub fn produced(&self, n: u64) {
    let mut current = self.0.load(Ordering::Relaxed);
    loop {
      if current == UNBOUNDED {
        return;
      }
      let next = match current.checked_sub(n) {
        Some(next) => next,
        None => {
          hook::report(ProtocolError::MoreProducedThanRequested);
          0
        }
      };
      match self.0.compare_exchange_weak(
        current,
        next,
        Ordering::AcqRel,
        Ordering::Relaxed,
      ) {
        Ok(_) => return,
        Err(actual) => current = actual,
      }
    }
  }

  pub fn current(&self) -> u64 { self.0.load(Ordering::Acquire) }

  pub fn is_unbounded(&self) -> bool { self.current() == UNBOUNDED }
}
