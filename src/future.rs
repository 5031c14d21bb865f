//! One-shot asynchronous values with cancel-on-drop semantics
//!
//! A [`Promise`] is the producer half of a single future value, a
//! [`Deferred`] the consumer half. The pair is "weak" in the sense that
//! dropping every `Promise` clone before fulfilment cancels the
//! `Deferred` instead of leaving it pending forever, so a consumer
//! always learns the outcome: `Some(value)` or `None` for cancellation.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::scheduler::InlineScheduler;
use crate::stream::core::{Stage, Stream};
use crate::subscription::Subscription;

type Continuation<T> = Box<dyn FnOnce(Option<T>) + Send>;

enum Outcome<T> {
    Pending,
    Value(T),
    Cancelled,
    /// The settled outcome was already handed to the consumer
    Taken,
}

struct FutureState<T> {
    outcome: Outcome<T>,
    continuation: Option<Continuation<T>>,
    waker: Option<Waker>,
}

struct FutureShared<T> {
    state: Mutex<FutureState<T>>,
    promises: AtomicUsize,
}

impl<T> FutureShared<T> {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, FutureState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Settle with `Some(value)` or `None` for cancellation. The first
    /// settle wins; later calls return false and change nothing.
    fn settle(&self, value: Option<T>) -> bool {
        let (continuation, waker, value) = {
            let mut state = self.lock_state();
            if !matches!(state.outcome, Outcome::Pending) {
                return false;
            }
            let waker = state.waker.take();
            match state.continuation.take() {
                Some(continuation) => {
                    state.outcome = Outcome::Taken;
                    (Some(continuation), waker, value)
                }
                None => {
                    state.outcome = match value {
                        Some(value) => Outcome::Value(value),
                        None => Outcome::Cancelled,
                    };
                    (None, waker, None)
                }
            }
        };
        if let Some(continuation) = continuation {
            continuation(value);
        }
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    fn is_settled(&self) -> bool {
        !matches!(self.lock_state().outcome, Outcome::Pending)
    }
}

/// Producer half of a one-shot value.
///
/// Clones share the same slot. When the last clone is dropped without
/// having produced a value, the consumer side is cancelled.
pub struct Promise<T> {
    shared: Arc<FutureShared<T>>,
}

impl<T> Promise<T> {
    /// Create a connected promise/deferred pair
    pub fn new() -> (Promise<T>, Deferred<T>) {
        let shared = Arc::new(FutureShared {
            state: Mutex::new(FutureState {
                outcome: Outcome::Pending,
                continuation: None,
                waker: None,
            }),
            promises: AtomicUsize::new(1),
        });
        (
            Promise {
                shared: Arc::clone(&shared),
            },
            Deferred { shared },
        )
    }

    /// Fulfil the promise. Returns false if it was already settled.
    pub fn set(&self, value: T) -> bool {
        self.shared.settle(Some(value))
    }

    /// Cancel the consumer side. No-op if already settled.
    pub fn cancel(&self) {
        self.shared.settle(None);
    }

    /// Whether a value or cancellation has been recorded
    pub fn is_settled(&self) -> bool {
        self.shared.is_settled()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        self.shared.promises.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if self.shared.promises.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Last producer gone without a value: cancel rather than leak
            self.shared.settle(None);
        }
    }
}

/// Consumer half of a one-shot value.
///
/// The outcome is consumed exactly once, through `then`, a combinator or
/// `await`; `None` means the producer side cancelled (or disappeared).
pub struct Deferred<T> {
    shared: Arc<FutureShared<T>>,
}

impl<T: Send + 'static> Deferred<T> {
    /// Run `continuation` with the outcome, immediately if it is already
    /// settled.
    pub fn then<F>(self, continuation: F)
    where
        F: FnOnce(Option<T>) + Send + 'static,
    {
        let value = {
            let mut state = self.shared.lock_state();
            match std::mem::replace(&mut state.outcome, Outcome::Taken) {
                Outcome::Pending => {
                    state.outcome = Outcome::Pending;
                    state.continuation = Some(Box::new(continuation));
                    return;
                }
                Outcome::Value(value) => Some(value),
                Outcome::Cancelled | Outcome::Taken => None,
            }
        };
        continuation(value);
    }

    /// Chain a transform that runs only on success; cancellation
    /// propagates to the returned deferred.
    pub fn and_then<U, F>(self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (promise, deferred) = Promise::new();
        self.then(move |outcome| match outcome {
            Some(value) => {
                promise.set(f(value));
            }
            None => promise.cancel(),
        });
        deferred
    }

    /// Observe cancellation while passing a successful value through
    /// unchanged.
    pub fn or_else<F>(self, f: F) -> Deferred<T>
    where
        F: FnOnce() + Send + 'static,
    {
        let (promise, deferred) = Promise::new();
        self.then(move |outcome| match outcome {
            Some(value) => {
                promise.set(value);
            }
            None => {
                f();
                promise.cancel();
            }
        });
        deferred
    }

    /// Whether a value or cancellation has been recorded
    pub fn is_settled(&self) -> bool {
        self.shared.is_settled()
    }

    /// Adapt into a stream that emits the value (if any) and completes.
    ///
    /// Cancellation completes the stream without emitting. The deferred
    /// is consumed by the first subscription; a second subscription
    /// fails with `InvalidSource`.
    pub fn into_stream(self) -> Stream<T> {
        let cell = Arc::new(Mutex::new(Some(self)));
        Stream::from_attach(move |stage: Stage<T>| {
            let taken = {
                let mut cell = cell.lock().unwrap_or_else(|e| e.into_inner());
                cell.take()
            };
            let Some(deferred) = taken else {
                stage.sink.error(crate::error::StreamError::InvalidSource);
                return;
            };
            let emitter = crate::stream::core::Emitter::new(stage);
            deferred.then(move |outcome| {
                if let Some(value) = outcome {
                    emitter.emit(value);
                }
                emitter.complete();
            });
        })
    }
}

impl<T: Send + 'static> Future for Deferred<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.lock_state();
        match std::mem::replace(&mut state.outcome, Outcome::Taken) {
            Outcome::Pending => {
                state.outcome = Outcome::Pending;
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Outcome::Value(value) => Poll::Ready(Some(value)),
            Outcome::Cancelled | Outcome::Taken => Poll::Ready(None),
        }
    }
}

/// Wait for every deferred in `items`.
///
/// Resolves once each input has settled, to one `Option` per input in
/// input order (`None` where that input was cancelled). An empty input
/// list resolves immediately.
pub fn join_all<T: Send + 'static>(items: Vec<Deferred<T>>) -> Deferred<Vec<Option<T>>> {
    let (promise, deferred) = Promise::new();
    if items.is_empty() {
        promise.set(Vec::new());
        return deferred;
    }
    let gathered = Arc::new(Mutex::new(JoinState {
        slots: (0..items.len()).map(|_| None).collect(),
        remaining: items.len(),
    }));
    for (index, item) in items.into_iter().enumerate() {
        let gathered = Arc::clone(&gathered);
        let promise = promise.clone();
        item.then(move |outcome| {
            let finished = {
                let mut state = gathered.lock().unwrap_or_else(|e| e.into_inner());
                state.slots[index] = Some(outcome);
                state.remaining -= 1;
                if state.remaining == 0 {
                    Some(state.slots.drain(..).map(|slot| slot.flatten()).collect())
                } else {
                    None
                }
            };
            if let Some(results) = finished {
                promise.set(results);
            }
        });
    }
    deferred
}

struct JoinState<T> {
    slots: Vec<Option<Option<T>>>,
    remaining: usize,
}

impl<T: Send + 'static> Stream<T> {
    /// Resolve to the first value this stream produces.
    ///
    /// Subscribes immediately; the subscription is released as soon as
    /// the value arrives. A stream that terminates without a value, or a
    /// cancellation of the underlying subscription, cancels the deferred.
    pub fn first(&self) -> Deferred<T> {
        let (promise, deferred) = Promise::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let value_promise = promise.clone();
        let value_slot = Arc::clone(&slot);
        let error_promise = promise.clone();
        let complete_promise = promise.clone();
        let subscription = self.subscribe(
            InlineScheduler::shared(),
            move |value| {
                if value_promise.set(value) {
                    let taken = {
                        let mut slot = value_slot.lock().unwrap_or_else(|e| e.into_inner());
                        slot.take()
                    };
                    if let Some(subscription) = taken {
                        subscription.cancel();
                    }
                }
            },
            move |_error| error_promise.cancel(),
            move || complete_promise.cancel(),
        );

        // A consumer-side cancel should settle the deferred too.
        let release_promise = promise.clone();
        subscription.on_release(move || release_promise.cancel());

        if promise.is_settled() {
            subscription.cancel();
        } else {
            let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some(subscription);
        }
        deferred
    }
}
