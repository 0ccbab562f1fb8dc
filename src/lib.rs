//! # rxcore: the concurrency core of a reactive-streams runtime
//!
//! Producers emit values over time to consumers that may live on other
//! threads, under a pull-based flow-control protocol. This crate is not an
//! operator library; it is the substrate operators are built on, and every
//! piece of it is lock-free:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Demand`] | Saturating accounting of requested-but-not-emitted items |
//! | [`CancelSlot`] | Swappable cancellation action with a terminal disposed state |
//! | [`QueueDrain`] | Work-counter serialization of emission onto one consumer |
//! | [`SubscriberList`] | Copy-on-write subscriber registry with a terminal latch |
//! | [`LastValueSubject`] | Multicast with exactly-once terminal capture and late replay |
//!
//! Misuse of the protocol (double subscription, a zero-amount request, a
//! signal after the terminal one) is never thrown back at the caller; it is
//! routed to a process-wide replaceable hook (see [`hook`]).
//!
//! ## Quick start
//!
//! ```rust
//! use rxcore::prelude::*;
//! use std::sync::{Arc, Mutex};
//!
//! let subject: LastValueSubject<i32, ()> = LastValueSubject::new();
//!
//! // Publish while nobody is listening; the last value wins.
//! subject.on_next(1);
//! subject.on_next(2);
//! subject.on_complete();
//!
//! // A late subscriber still receives the captured terminal value, as
//! // soon as it grants demand.
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let subscription = subject.subscribe(LambdaSubscriber::new(
//!   move |v: i32| sink.lock().unwrap().push(v),
//!   |_err: ()| {},
//!   || {},
//! ));
//! subscription.request(1);
//! assert_eq!(*seen.lock().unwrap(), vec![2]);
//! ```
//!
//! [`Demand`]: prelude::Demand
//! [`CancelSlot`]: prelude::CancelSlot
//! [`QueueDrain`]: prelude::QueueDrain
//! [`SubscriberList`]: prelude::SubscriberList
//! [`LastValueSubject`]: prelude::LastValueSubject

pub mod cancel;
pub mod demand;
pub mod drain;
pub mod error;
pub mod hook;
pub mod observer;
pub mod prelude;
pub mod queue;
pub mod subject;
pub mod subscriber;
pub mod subscription;
mod util;

pub use prelude::*;
