//! Multicast primitives: one upstream, many downstream subscribers, and a
//! terminal payload that is latched exactly once and replayed to anyone who
//! arrives late.

pub mod last_value;
pub mod subscribers;

pub use last_value::{LastValueSubject, SubjectSubscription};
pub use subscribers::SubscriberList;
