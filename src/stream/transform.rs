//! Per-value transforms: map, try_map, filter, try_filter
//!
//! Transform stages run inline on the emitting thread; they hold no
//! per-value state and delegate all scheduling to the stage downstream.
//! The `try_` variants are the fallible forms: an `Err` from the user
//! function terminates the subscription with `OperatorFailure` and
//! releases everything upstream.

use std::fmt;
use std::sync::Arc;

use crate::error::StreamError;
use crate::stream::core::{Sink, Stage, Stream};

impl<T: Send + 'static> Stream<T> {
    /// Transform every value with `f`
    pub fn map<U, F>(self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Stream::from_attach(move |stage: Stage<U>| {
            let sink: Arc<dyn Sink<T>> = Arc::new(MapSink {
                down: Arc::clone(&stage.sink),
                f: Arc::clone(&f),
            });
            self.attach_stage(Stage {
                core: stage.core,
                scheduler: stage.scheduler,
                sink,
            });
        })
    }

    /// Transform every value with a fallible `f`.
    ///
    /// The first `Err` becomes a terminal `OperatorFailure` for the
    /// subscription and cancels the upstream chain.
    pub fn try_map<U, E, F>(self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        E: fmt::Display,
        F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
    {
        let f = Arc::new(move |value: T| {
            f(value).map_err(|e| StreamError::OperatorFailure(e.to_string()))
        });
        Stream::from_attach(move |stage: Stage<U>| {
            let sink: Arc<dyn Sink<T>> = Arc::new(TryMapSink {
                down: Arc::clone(&stage.sink),
                f: Arc::clone(&f),
            });
            self.attach_stage(Stage {
                core: stage.core,
                scheduler: stage.scheduler,
                sink,
            });
        })
    }

    /// Keep only the values matching `predicate`
    pub fn filter<P>(self, predicate: P) -> Stream<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        Stream::from_attach(move |stage: Stage<T>| {
            let sink: Arc<dyn Sink<T>> = Arc::new(FilterSink {
                down: Arc::clone(&stage.sink),
                predicate: Arc::clone(&predicate),
            });
            self.attach_stage(Stage {
                core: stage.core,
                scheduler: stage.scheduler,
                sink,
            });
        })
    }

    /// Keep only the values matching a fallible `predicate`.
    ///
    /// The first `Err` becomes a terminal `OperatorFailure` for the
    /// subscription and cancels the upstream chain.
    pub fn try_filter<E, P>(self, predicate: P) -> Stream<T>
    where
        E: fmt::Display,
        P: Fn(&T) -> Result<bool, E> + Send + Sync + 'static,
    {
        let predicate = Arc::new(move |value: &T| {
            predicate(value).map_err(|e| StreamError::OperatorFailure(e.to_string()))
        });
        Stream::from_attach(move |stage: Stage<T>| {
            let sink: Arc<dyn Sink<T>> = Arc::new(TryFilterSink {
                down: Arc::clone(&stage.sink),
                predicate: Arc::clone(&predicate),
            });
            self.attach_stage(Stage {
                core: stage.core,
                scheduler: stage.scheduler,
                sink,
            });
        })
    }
}

struct MapSink<U, F> {
    down: Arc<dyn Sink<U>>,
    f: Arc<F>,
}

impl<T, U, F> Sink<T> for MapSink<U, F>
where
    T: Send,
    U: Send,
    F: Fn(T) -> U + Send + Sync,
{
    fn value(&self, value: T) {
        self.down.value((self.f)(value));
    }

    fn error(&self, error: StreamError) {
        self.down.error(error);
    }

    fn done(&self) {
        self.down.done();
    }
}

struct TryMapSink<U, F> {
    down: Arc<dyn Sink<U>>,
    f: Arc<F>,
}

impl<T, U, F> Sink<T> for TryMapSink<U, F>
where
    T: Send,
    U: Send,
    F: Fn(T) -> Result<U, StreamError> + Send + Sync,
{
    fn value(&self, value: T) {
        match (self.f)(value) {
            Ok(mapped) => self.down.value(mapped),
            Err(e) => self.down.error(e),
        }
    }

    fn error(&self, error: StreamError) {
        self.down.error(error);
    }

    fn done(&self) {
        self.down.done();
    }
}

struct FilterSink<T, P> {
    down: Arc<dyn Sink<T>>,
    predicate: Arc<P>,
}

impl<T, P> Sink<T> for FilterSink<T, P>
where
    T: Send,
    P: Fn(&T) -> bool + Send + Sync,
{
    fn value(&self, value: T) {
        if (self.predicate)(&value) {
            self.down.value(value);
        }
    }

    fn error(&self, error: StreamError) {
        self.down.error(error);
    }

    fn done(&self) {
        self.down.done();
    }
}

struct TryFilterSink<T, P> {
    down: Arc<dyn Sink<T>>,
    predicate: Arc<P>,
}

impl<T, P> Sink<T> for TryFilterSink<T, P>
where
    T: Send,
    P: Fn(&T) -> Result<bool, StreamError> + Send + Sync,
{
    fn value(&self, value: T) {
        match (self.predicate)(&value) {
            Ok(true) => self.down.value(value),
            Ok(false) => {}
            Err(e) => self.down.error(e),
        }
    }

    fn error(&self, error: StreamError) {
        self.down.error(error);
    }

    fn done(&self) {
        self.down.done();
    }
}
