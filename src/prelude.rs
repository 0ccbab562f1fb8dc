//! Convenience re-exports of the whole public surface.

pub use crate::{
  cancel::CancelSlot,
  demand::{Demand, UNBOUNDED},
  drain::{OverflowAction, QueueDrain},
  error::{BoxError, BufferOverflow, ProtocolError},
  hook::{reset_error_hook, set_error_hook, ScopedHook},
  observer::{BoxObserver, Observer},
  queue::{BufferPolicy, EventQueue},
  subject::{LastValueSubject, SubjectSubscription, SubscriberList},
  subscriber::LambdaSubscriber,
  subscription::{
    BoxCancel, BoxSubscription, Cancel, CancelFn, Subscription,
  },
};
