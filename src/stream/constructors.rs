//! Stream constructors: empty, emit, from_iter, never, fail, emit_after
//!
//! The synchronous constructors (`empty`, `emit`, `from_iter`, `fail`)
//! push everything during attachment; combined with an immediate
//! scheduler, their first delivery happens inside the `subscribe` call.

use std::time::Duration;

use crate::error::StreamError;
use crate::stream::core::{Stage, Stream};

impl<T: Send + 'static> Stream<T> {
    /// A stream that completes immediately without emitting
    pub fn empty() -> Stream<T> {
        Stream::from_attach(|stage: Stage<T>| {
            stage.sink.done();
        })
    }

    /// A stream that never emits and never terminates
    pub fn never() -> Stream<T> {
        Stream::from_attach(|_stage: Stage<T>| {})
    }

    /// A stream that fails immediately with `error`
    pub fn fail(error: StreamError) -> Stream<T> {
        Stream::from_attach(move |stage: Stage<T>| {
            stage.sink.error(error.clone());
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Stream<T> {
    /// Emit a single value, then complete
    pub fn emit(value: T) -> Stream<T> {
        Stream::from_attach(move |stage: Stage<T>| {
            stage.sink.value(value.clone());
            stage.sink.done();
        })
    }

    /// Emit `value` after `delay` on the stage scheduler's clock, then
    /// complete
    pub fn emit_after(value: T, delay: Duration) -> Stream<T> {
        Stream::from_attach(move |stage: Stage<T>| {
            let value = value.clone();
            let core = stage.core;
            let sink = stage.sink;
            stage.scheduler.schedule_after(
                delay,
                Box::new(move || {
                    if core.is_live() {
                        sink.value(value);
                        sink.done();
                    }
                }),
            );
        })
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Emit every item of the iterator in order, then complete.
    ///
    /// The iterator source is cloned per subscription, so subscribing
    /// twice replays the sequence independently.
    pub fn from_iter<I>(iter: I) -> Stream<T>
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    {
        Stream::from_attach(move |stage: Stage<T>| {
            for item in iter.clone() {
                if !stage.core.is_live() {
                    return;
                }
                stage.sink.value(item);
            }
            stage.sink.done();
        })
    }
}
