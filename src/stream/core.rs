//! Core stream type, subscription wiring and the emitter handle
//!
//! A `Stream<T>` is nothing but an attach function behind an `Arc`; no
//! state exists until `subscribe` walks the operator chain and wires
//! per-subscription sinks downstream-to-upstream. Producers push into an
//! [`Emitter`], values flow inline through operator sinks on the emitting
//! thread, and the scheduler chosen at the subscribe call (or at a
//! `deliver_on` hop) mediates the actual consumer invocation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::StreamError;
use crate::scheduler::Scheduler;
use crate::subscription::{Subscription, SubscriptionCore};

/// Receiver side of one operator stage. Implementations forward to the
/// next stage inline or hand the signal to a scheduler.
pub(crate) trait Sink<T>: Send + Sync {
    fn value(&self, value: T);
    fn error(&self, error: StreamError);
    fn done(&self);
}

/// Everything an upstream stage needs to deliver into its downstream:
/// the shared lifecycle core, the scheduler mediating this stage's
/// deliveries, and the downstream sink itself.
pub(crate) struct Stage<T> {
    pub(crate) core: Arc<SubscriptionCore>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) sink: Arc<dyn Sink<T>>,
}

impl<T> Clone for Stage<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            scheduler: Arc::clone(&self.scheduler),
            sink: Arc::clone(&self.sink),
        }
    }
}

type AttachFn<T> = dyn Fn(Stage<T>) + Send + Sync;

/// A lazy, composable description of a value/event sequence.
///
/// Streams are immutable and cheap to clone; subscribing to the same
/// stream twice yields two fully independent subscriptions with
/// independent operator state.
pub struct Stream<T> {
    attach: Arc<AttachFn<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            attach: Arc::clone(&self.attach),
        }
    }
}

impl<T: Send + 'static> Stream<T> {
    pub(crate) fn from_attach<F>(attach: F) -> Self
    where
        F: Fn(Stage<T>) + Send + Sync + 'static,
    {
        Self {
            attach: Arc::new(attach),
        }
    }

    pub(crate) fn attach_stage(&self, stage: Stage<T>) {
        (self.attach)(stage);
    }

    /// Build a stream from a producer function.
    ///
    /// The producer runs once per subscription and receives an [`Emitter`]
    /// it may clone, move to other threads and push into until it signals
    /// completion or failure.
    pub fn source<F>(producer: F) -> Self
    where
        F: Fn(Emitter<T>) + Send + Sync + 'static,
    {
        Stream::from_attach(move |stage: Stage<T>| {
            producer(Emitter::new(stage));
        })
    }

    /// Attach a consumer and start the stream.
    ///
    /// All three callbacks are invoked through `scheduler`. No callback
    /// fires before `subscribe` returns unless the source is synchronous
    /// and the scheduler immediate, in which case first delivery happens
    /// during the call (see the constructor docs).
    pub fn subscribe<V, E, C>(
        &self,
        scheduler: Arc<dyn Scheduler>,
        on_value: V,
        on_error: E,
        on_complete: C,
    ) -> Subscription
    where
        V: FnMut(T) + Send + 'static,
        E: FnOnce(StreamError) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let core = SubscriptionCore::new();
        let sink: Arc<dyn Sink<T>> = Arc::new(ConsumerSink {
            core: Arc::clone(&core),
            scheduler: Arc::clone(&scheduler),
            callbacks: Arc::new(Mutex::new(Some(Callbacks {
                on_value: Box::new(on_value),
                on_error: Some(Box::new(on_error)),
                on_complete: Some(Box::new(on_complete)),
            }))),
            terminated: AtomicBool::new(false),
        });
        self.attach_stage(Stage {
            core: Arc::clone(&core),
            scheduler,
            sink,
        });
        Subscription::new(core)
    }

    /// Subscribe with a value callback only; errors and completion are
    /// discarded.
    pub fn subscribe_values<V>(&self, scheduler: Arc<dyn Scheduler>, on_value: V) -> Subscription
    where
        V: FnMut(T) + Send + 'static,
    {
        self.subscribe(scheduler, on_value, |_| {}, || {})
    }

    /// Route deliveries of the stages upstream of this point through
    /// `scheduler` instead of the subscribe-time one.
    ///
    /// Signals cross one extra FIFO queue, so relative order is preserved.
    pub fn deliver_on(self, scheduler: Arc<dyn Scheduler>) -> Stream<T> {
        Stream::from_attach(move |stage: Stage<T>| {
            let hop: Arc<dyn Sink<T>> = Arc::new(HopSink {
                core: Arc::clone(&stage.core),
                scheduler: Arc::clone(&scheduler),
                down: Arc::clone(&stage.sink),
            });
            self.attach_stage(Stage {
                core: stage.core,
                scheduler: Arc::clone(&scheduler),
                sink: hop,
            });
        })
    }
}

// ================================
// Consumer sink
// ================================

struct Callbacks<T> {
    on_value: Box<dyn FnMut(T) + Send>,
    on_error: Option<Box<dyn FnOnce(StreamError) + Send>>,
    on_complete: Option<Box<dyn FnOnce() + Send>>,
}

type SharedCallbacks<T> = Arc<Mutex<Option<Callbacks<T>>>>;

/// Final stage: hands every signal to the subscription's scheduler. The
/// scheduled closure re-checks liveness right before invoking the
/// consumer, so a cancellation makes queued deliveries no-ops.
struct ConsumerSink<T> {
    core: Arc<SubscriptionCore>,
    scheduler: Arc<dyn Scheduler>,
    callbacks: SharedCallbacks<T>,
    terminated: AtomicBool,
}

fn lock_callbacks<T>(
    callbacks: &SharedCallbacks<T>,
) -> std::sync::MutexGuard<'_, Option<Callbacks<T>>> {
    callbacks.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T: Send + 'static> Sink<T> for ConsumerSink<T> {
    fn value(&self, value: T) {
        if self.terminated.load(Ordering::Acquire) || !self.core.is_live() {
            return;
        }
        let core = Arc::clone(&self.core);
        let callbacks = Arc::clone(&self.callbacks);
        self.scheduler.schedule(Box::new(move || {
            let mut guard = lock_callbacks(&callbacks);
            if !core.is_live() {
                guard.take();
                return;
            }
            if let Some(cbs) = guard.as_mut() {
                (cbs.on_value)(value);
            }
        }));
    }

    fn error(&self, error: StreamError) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        let core = Arc::clone(&self.core);
        let callbacks = Arc::clone(&self.callbacks);
        self.scheduler.schedule(Box::new(move || {
            let mut guard = lock_callbacks(&callbacks);
            let Some(cbs) = guard.take() else { return };
            // Cancellation may have won the race; then nothing fires.
            if !core.fail() {
                return;
            }
            if let Some(on_error) = cbs.on_error {
                on_error(error);
            }
        }));
    }

    fn done(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        let core = Arc::clone(&self.core);
        let callbacks = Arc::clone(&self.callbacks);
        self.scheduler.schedule(Box::new(move || {
            let mut guard = lock_callbacks(&callbacks);
            let Some(cbs) = guard.take() else { return };
            if !core.complete() {
                return;
            }
            if let Some(on_complete) = cbs.on_complete {
                on_complete();
            }
        }));
    }
}

// ================================
// Scheduler hop sink
// ================================

/// Mid-chain stage inserted by `deliver_on`: transfers every signal onto
/// its scheduler's queue before forwarding downstream.
struct HopSink<T> {
    core: Arc<SubscriptionCore>,
    scheduler: Arc<dyn Scheduler>,
    down: Arc<dyn Sink<T>>,
}

impl<T: Send + 'static> Sink<T> for HopSink<T> {
    fn value(&self, value: T) {
        let core = Arc::clone(&self.core);
        let down = Arc::clone(&self.down);
        self.scheduler.schedule(Box::new(move || {
            if core.is_live() {
                down.value(value);
            }
        }));
    }

    fn error(&self, error: StreamError) {
        let down = Arc::clone(&self.down);
        self.scheduler.schedule(Box::new(move || {
            down.error(error);
        }));
    }

    fn done(&self) {
        let down = Arc::clone(&self.down);
        self.scheduler.schedule(Box::new(move || {
            down.done();
        }));
    }
}

// ================================
// Emitter
// ================================

/// Producer-side handle used to push values, errors and completion into a
/// stream's subscribers.
///
/// Clones share one terminal latch: after `fail` or `complete`, further
/// pushes from any clone are silent no-ops and never deliver twice.
pub struct Emitter<T> {
    stage: Stage<T>,
    terminated: Arc<AtomicBool>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage.clone(),
            terminated: Arc::clone(&self.terminated),
        }
    }
}

impl<T: Send + 'static> Emitter<T> {
    pub(crate) fn new(stage: Stage<T>) -> Self {
        Self {
            stage,
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Push a value downstream.
    ///
    /// Returns false once the stream has terminated or the subscription
    /// is gone, which is the producer's cue to stop working.
    pub fn emit(&self, value: T) -> bool {
        if self.terminated.load(Ordering::Acquire) || !self.stage.core.is_live() {
            return false;
        }
        self.stage.sink.value(value);
        true
    }

    /// Terminate the stream with an error. No-op after a terminal signal.
    pub fn fail(&self, error: StreamError) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stage.sink.error(error);
    }

    /// Terminate the stream normally. No-op after a terminal signal.
    pub fn complete(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stage.sink.done();
    }

    /// Whether pushes can still reach the subscriber
    pub fn is_live(&self) -> bool {
        !self.terminated.load(Ordering::Acquire) && self.stage.core.is_live()
    }

    /// Register producer teardown to run when the subscription ends for
    /// any reason (cancellation or a terminal signal). Runs immediately
    /// if it already has.
    pub fn on_release<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.stage.core.on_release(Box::new(hook));
    }
}
