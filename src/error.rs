//! Error types shared across the core.

use thiserror::Error;

/// Boxed error used wherever a collaborator hands us an opaque failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Synthesized when a bounded buffer rejects an item.
///
/// If the configured overflow action itself failed, its error is carried as
/// the `source` of this one.
#[derive(Debug, Default, Error)]
#[error("buffer is full")]
pub struct BufferOverflow {
  #[source]
  pub cause: Option<BoxError>,
}

impl BufferOverflow {
  pub fn new() -> Self { Self { cause: None } }

  pub fn with_cause(cause: BoxError) -> Self { Self { cause: Some(cause) } }
}

/// Protocol violations and undeliverable signals.
///
/// These are never surfaced on the data path. They are handed to the global
/// hook (see [`crate::hook`]) and the offending call returns normally, since
/// by the time a violation is detected the original call site may already
/// have returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
  /// A link was subscribed to twice.
  #[error("subscription already set")]
  AlreadySubscribed,
  /// `request` was called with a non-positive amount.
  #[error("request amount must be positive, got {0}")]
  InvalidRequest(u64),
  /// A producer emitted more items than the consumer had requested.
  #[error("more items produced than requested")]
  MoreProducedThanRequested,
  /// A signal arrived after a terminal signal was already accepted.
  #[error("signal received after the stream terminated")]
  SignalAfterTerminal,
  /// A terminal error had nowhere to go and was discarded.
  #[error("terminal error dropped: {0}")]
  DroppedError(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn overflow_carries_its_cause() {
    let plain = BufferOverflow::new();
    assert!(plain.cause.is_none());
    assert_eq!(plain.to_string(), "buffer is full");

    let cause: BoxError = "overflow action failed".into();
    let chained = BufferOverflow::with_cause(cause);
    assert!(std::error::Error::source(&chained).is_some());
  }

  #[test]
  fn violation_messages_name_the_misuse() {
    assert_eq!(
      ProtocolError::InvalidRequest(0).to_string(),
      "request amount must be positive, got 0"
    );
    assert_eq!(
      ProtocolError::AlreadySubscribed.to_string(),
      "subscription already set"
    );
  }
}
