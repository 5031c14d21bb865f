//! Timing combinators: debounce
//!
//! Debounce keeps only the newest value seen within the window. The
//! window timer is scheduled through the stage scheduler, so under a
//! virtual-clock scheduler the operator is fully deterministic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::StreamError;
use crate::scheduler::Scheduler;
use crate::stream::core::{Sink, Stage, Stream};
use crate::subscription::SubscriptionCore;

impl<T: Send + 'static> Stream<T> {
    /// Deliver a value only after `window` has elapsed without a newer
    /// one arriving.
    ///
    /// Each value restarts the window; a value still pending when the
    /// upstream completes is flushed before the completion signal.
    pub fn debounce(self, window: Duration) -> Stream<T> {
        assert!(
            !window.is_zero(),
            "debounce: window must be greater than zero"
        );
        Stream::from_attach(move |stage: Stage<T>| {
            let sink: Arc<dyn Sink<T>> = Arc::new(DebounceSink {
                down: Arc::clone(&stage.sink),
                core: Arc::clone(&stage.core),
                scheduler: Arc::clone(&stage.scheduler),
                window,
                state: Arc::new(Mutex::new(DebounceState {
                    pending: None,
                    generation: 0,
                })),
            });
            self.attach_stage(Stage {
                core: stage.core,
                scheduler: stage.scheduler,
                sink,
            });
        })
    }
}

struct DebounceState<T> {
    pending: Option<T>,
    generation: u64,
}

type SharedDebounceState<T> = Arc<Mutex<DebounceState<T>>>;

fn lock_state<T>(state: &SharedDebounceState<T>) -> std::sync::MutexGuard<'_, DebounceState<T>> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

struct DebounceSink<T> {
    down: Arc<dyn Sink<T>>,
    core: Arc<SubscriptionCore>,
    scheduler: Arc<dyn Scheduler>,
    window: Duration,
    state: SharedDebounceState<T>,
}

impl<T: Send + 'static> DebounceSink<T> {
    /// Take the pending value out of the window, invalidating any timer
    /// still in flight.
    fn flush(&self) -> Option<T> {
        let mut state = lock_state(&self.state);
        state.generation += 1;
        state.pending.take()
    }
}

impl<T: Send + 'static> Sink<T> for DebounceSink<T> {
    fn value(&self, value: T) {
        let generation = {
            let mut state = lock_state(&self.state);
            state.generation += 1;
            state.pending = Some(value);
            state.generation
        };
        let down = Arc::clone(&self.down);
        let core = Arc::clone(&self.core);
        let state = Arc::clone(&self.state);
        self.scheduler.schedule_after(
            self.window,
            Box::new(move || {
                if !core.is_live() {
                    return;
                }
                let flushed = {
                    let mut state = lock_state(&state);
                    // A newer value restarted the window; let its timer win.
                    if state.generation != generation {
                        return;
                    }
                    state.pending.take()
                };
                if let Some(value) = flushed {
                    down.value(value);
                }
            }),
        );
    }

    fn error(&self, error: StreamError) {
        self.flush();
        self.down.error(error);
    }

    fn done(&self) {
        if let Some(value) = self.flush() {
            self.down.value(value);
        }
        self.down.done();
    }
}
