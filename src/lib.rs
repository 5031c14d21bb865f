//! tentacle-streams - push-based, cancellable value streams
//!
//! A `Stream` is a lazy, composable description of a value/event sequence.
//! Producers push values through an `Emitter`, operators transform them
//! inline, and a `Scheduler` chosen per subscription (or per stage via
//! `deliver_on`) decides where the consumer callbacks actually run. A
//! `Subscription` owns the whole chain: cancelling it releases every
//! producer, timer and sibling input created for it.
//!
//! ```
//! use tentacle_streams::{ManualScheduler, Stream};
//! use std::sync::{Arc, Mutex};
//!
//! let scheduler = ManualScheduler::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let seen_sink = seen.clone();
//!
//! let subscription = Stream::from_iter(1..=10)
//!     .map(|n| n * 2)
//!     .filter(|n| n % 3 == 0)
//!     .subscribe_values(scheduler.clone(), move |n| {
//!         seen_sink.lock().unwrap().push(n);
//!     });
//!
//! scheduler.run_until_idle();
//! assert_eq!(*seen.lock().unwrap(), vec![6, 12, 18]);
//! drop(subscription);
//! ```

pub mod error;
pub mod future;
pub mod scheduler;
pub mod stream;
pub mod subscription;

pub use error::{StreamError, StreamResult};
pub use future::{join_all, Deferred, Promise};
pub use scheduler::{InlineScheduler, ManualScheduler, Scheduler, Task, WorkerScheduler};
pub use stream::{Emitter, Stream};
pub use subscription::{Subscription, SubscriptionState};
