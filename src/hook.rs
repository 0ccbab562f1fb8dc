//! Process-wide error-reporting hook.
//!
//! Protocol violations and undeliverable errors cannot travel back through
//! the data path: the call that caused them has often already returned, and
//! throwing from a signal method would break the producer contract. They are
//! funnelled through a single replaceable callback instead. The default
//! hook logs the violation and returns; it never panics.
//!
//! Tests install a capturing hook through [`ScopedHook`], which also
//! serializes hook access across tests in the same binary.

use crate::error::ProtocolError;
use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type BoxedHook = Box<dyn Fn(&ProtocolError) + Send + Sync>;

static HOOK: Lazy<ArcSwap<BoxedHook>> =
  Lazy::new(|| ArcSwap::from_pointee(default_hook()));

fn default_hook() -> BoxedHook {
  Box::new(|violation| log::error!("rxcore protocol violation: {violation}"))
}

/// Replace the global hook.
///
/// The hook must not panic; it may be invoked concurrently from any thread
/// that touches a stream.
pub fn set_error_hook<F>(hook: F)
where
  F: Fn(&ProtocolError) + Send + Sync + 'static,
{
  HOOK.store(Arc::new(Box::new(hook)));
}

/// Restore the default logging hook.
pub fn reset_error_hook() { HOOK.store(Arc::new(default_hook())); }

/// Report a violation to whichever hook is currently installed.
pub fn report(violation: ProtocolError) {
  let hook = HOOK.load();
  (**hook)(&violation);
}

static SCOPE: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Installs a hook for the lifetime of the guard and restores the default
/// on drop. Holding the guard gives exclusive use of the global hook, so
/// concurrently running tests cannot observe each other's violations.
#[must_use]
pub struct ScopedHook {
  _exclusive: MutexGuard<'static, ()>,
}

impl ScopedHook {
  pub fn install<F>(hook: F) -> Self
  where
    F: Fn(&ProtocolError) + Send + Sync + 'static,
  {
    let exclusive = SCOPE.lock().unwrap_or_else(PoisonError::into_inner);
    set_error_hook(hook);
    ScopedHook { _exclusive: exclusive }
  }

  /// Convenience: capture every reported violation into a shared vector.
  pub fn capture() -> (Self, Arc<Mutex<Vec<ProtocolError>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let guard = Self::install(move |violation| {
      sink.lock().unwrap().push(violation.clone());
    });
    (guard, seen)
  }
}

impl Drop for ScopedHook {
  fn drop(&mut self) { reset_error_hook(); }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_hook_swallows_violations() {
    let _guard = ScopedHook::install(|_| {});
    reset_error_hook();
    // On the default hook: reporting must not panic.
    report(ProtocolError::AlreadySubscribed);
  }

  #[test]
  fn scoped_hook_captures_and_restores() {
    let (_guard, seen) = ScopedHook::capture();
    report(ProtocolError::InvalidRequest(0));
    report(ProtocolError::SignalAfterTerminal);
    assert_eq!(
      *seen.lock().unwrap(),
      vec![
        ProtocolError::InvalidRequest(0),
        ProtocolError::SignalAfterTerminal
      ]
    );

    // Swapping back mid-scope must leave reporting functional.
    reset_error_hook();
    report(ProtocolError::AlreadySubscribed);
    assert_eq!(seen.lock().unwrap().len(), 2);
  }
}
