//! Fan-in combinators: merge and combine_latest
//!
//! Both operators attach to several upstream inputs under one shared
//! subscription core, so a consumer-side cancel or a terminal error
//! releases every input at once. Upstream notifications can arrive
//! concurrently from different producer threads, so the shared
//! per-subscription state (completion counters, last-seen values) is
//! guarded by a mutex, and combined emission happens under that lock to
//! keep pairs ordered consistently with their triggering input.

use std::sync::{Arc, Mutex};

use crate::error::StreamError;
use crate::stream::core::{Sink, Stage, Stream};

impl<T: Send + 'static> Stream<T> {
    /// Merge this stream with another, forwarding values in arrival order
    pub fn merge(self, other: Stream<T>) -> Stream<T> {
        Stream::merge_all(vec![self, other])
    }

    /// Merge any number of input streams.
    ///
    /// Values are forwarded in arrival order across inputs with no
    /// re-ordering buffer. The merged stream completes once every input
    /// has completed; the first error from any input terminates the
    /// subscription and releases the remaining inputs. An empty input set
    /// fails with `InvalidSource`.
    pub fn merge_all(sources: Vec<Stream<T>>) -> Stream<T> {
        Stream::from_attach(move |stage: Stage<T>| {
            if sources.is_empty() {
                stage.sink.error(StreamError::InvalidSource);
                return;
            }
            let remaining = Arc::new(Mutex::new(sources.len()));
            for source in &sources {
                let sink: Arc<dyn Sink<T>> = Arc::new(MergeSink {
                    down: Arc::clone(&stage.sink),
                    remaining: Arc::clone(&remaining),
                });
                source.attach_stage(Stage {
                    core: Arc::clone(&stage.core),
                    scheduler: Arc::clone(&stage.scheduler),
                    sink,
                });
            }
        })
    }
}

struct MergeSink<T> {
    down: Arc<dyn Sink<T>>,
    remaining: Arc<Mutex<usize>>,
}

impl<T: Send> Sink<T> for MergeSink<T> {
    fn value(&self, value: T) {
        self.down.value(value);
    }

    fn error(&self, error: StreamError) {
        // First error wins; the downstream terminal latch drops the rest.
        self.down.error(error);
    }

    fn done(&self) {
        let all_done = {
            let mut remaining = self.remaining.lock().unwrap_or_else(|e| e.into_inner());
            *remaining = remaining.saturating_sub(1);
            *remaining == 0
        };
        if all_done {
            self.down.done();
        }
    }
}

impl<A: Send + 'static> Stream<A> {
    /// Combine the latest values of two streams with `combine`.
    ///
    /// Nothing is emitted until both inputs have produced at least one
    /// value; from then on every input value re-emits, synchronously with
    /// the triggering input's delivery. The combined stream completes
    /// when both inputs have completed and errors eagerly on the first
    /// error from either input.
    pub fn combine_latest_with<B, C, F>(self, other: Stream<B>, combine: F) -> Stream<C>
    where
        B: Send + 'static,
        C: Send + 'static,
        F: Fn(&A, &B) -> C + Send + Sync + 'static,
    {
        let combine = Arc::new(combine);
        Stream::from_attach(move |stage: Stage<C>| {
            let shared = Arc::new(CombineShared {
                down: Arc::clone(&stage.sink),
                combine: Arc::clone(&combine),
                state: Mutex::new(CombineState {
                    left: None,
                    right: None,
                    left_done: false,
                    right_done: false,
                }),
            });
            let left: Arc<dyn Sink<A>> = Arc::new(CombineLeftSink {
                shared: Arc::clone(&shared),
            });
            self.attach_stage(Stage {
                core: Arc::clone(&stage.core),
                scheduler: Arc::clone(&stage.scheduler),
                sink: left,
            });
            let right: Arc<dyn Sink<B>> = Arc::new(CombineRightSink { shared });
            other.attach_stage(Stage {
                core: Arc::clone(&stage.core),
                scheduler: Arc::clone(&stage.scheduler),
                sink: right,
            });
        })
    }
}

impl<A: Clone + Send + 'static> Stream<A> {
    /// Combine the latest values of two streams into pairs.
    ///
    /// See [`Stream::combine_latest_with`] for the emission and
    /// termination rules.
    pub fn combine_latest<B>(self, other: Stream<B>) -> Stream<(A, B)>
    where
        B: Clone + Send + 'static,
    {
        self.combine_latest_with(other, |a, b| (a.clone(), b.clone()))
    }
}

struct CombineState<A, B> {
    left: Option<A>,
    right: Option<B>,
    left_done: bool,
    right_done: bool,
}

struct CombineShared<A, B, C, F> {
    down: Arc<dyn Sink<C>>,
    combine: Arc<F>,
    state: Mutex<CombineState<A, B>>,
}

impl<A, B, C, F> CombineShared<A, B, C, F>
where
    A: Send,
    B: Send,
    C: Send,
    F: Fn(&A, &B) -> C + Send + Sync,
{
    fn lock_state(&self) -> std::sync::MutexGuard<'_, CombineState<A, B>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn left_value(&self, value: A) {
        let state = &mut *self.lock_state();
        state.left = Some(value);
        if let (Some(a), Some(b)) = (state.left.as_ref(), state.right.as_ref()) {
            self.down.value((self.combine)(a, b));
        }
    }

    fn right_value(&self, value: B) {
        let state = &mut *self.lock_state();
        state.right = Some(value);
        if let (Some(a), Some(b)) = (state.left.as_ref(), state.right.as_ref()) {
            self.down.value((self.combine)(a, b));
        }
    }

    fn input_done(&self, left: bool) {
        let all_done = {
            let mut state = self.lock_state();
            if left {
                state.left_done = true;
            } else {
                state.right_done = true;
            }
            state.left_done && state.right_done
        };
        if all_done {
            self.down.done();
        }
    }

    fn input_error(&self, error: StreamError) {
        self.down.error(error);
    }
}

struct CombineLeftSink<A, B, C, F> {
    shared: Arc<CombineShared<A, B, C, F>>,
}

impl<A, B, C, F> Sink<A> for CombineLeftSink<A, B, C, F>
where
    A: Send,
    B: Send,
    C: Send,
    F: Fn(&A, &B) -> C + Send + Sync,
{
    fn value(&self, value: A) {
        self.shared.left_value(value);
    }

    fn error(&self, error: StreamError) {
        self.shared.input_error(error);
    }

    fn done(&self) {
        self.shared.input_done(true);
    }
}

struct CombineRightSink<A, B, C, F> {
    shared: Arc<CombineShared<A, B, C, F>>,
}

impl<A, B, C, F> Sink<B> for CombineRightSink<A, B, C, F>
where
    A: Send,
    B: Send,
    C: Send,
    F: Fn(&A, &B) -> C + Send + Sync,
{
    fn value(&self, value: B) {
        self.shared.right_value(value);
    }

    fn error(&self, error: StreamError) {
        self.shared.input_error(error);
    }

    fn done(&self) {
        self.shared.input_done(false);
    }
}
