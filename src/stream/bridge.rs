//! Adapters between push streams and the `futures` ecosystem
//!
//! `from_futures` drives a pull-based `futures` stream on a Tokio task
//! and pushes its items through the operator chain; `into_futures_stream`
//! goes the other way, buffering deliveries in a channel that a pull
//! consumer can await.

use std::sync::{Arc, Mutex};

use async_stream::stream;
use futures::channel::mpsc;
use futures_util::{pin_mut, StreamExt};
use tokio::runtime::Handle;

use crate::error::{StreamError, StreamResult};
use crate::scheduler::InlineScheduler;
use crate::stream::core::{Emitter, Stage, Stream};

enum BridgeEvent<T> {
    Value(T),
    Error(StreamError),
    Complete,
}

impl<T: Send + 'static> Stream<T> {
    /// Adapt a `futures` stream into a push stream.
    ///
    /// The inner stream is consumed by the first subscription, which
    /// drives it on a spawned Tokio task; the task is aborted when the
    /// subscription is released. A second subscription finds the source
    /// gone and fails with `InvalidSource`. Subscribing outside a Tokio
    /// runtime fails the subscription with a `Custom` error.
    pub fn from_futures<S>(source: S) -> Stream<T>
    where
        S: futures_core::Stream<Item = T> + Send + 'static,
    {
        let cell = Arc::new(Mutex::new(Some(source)));
        Stream::from_attach(move |stage: Stage<T>| {
            let taken = {
                let mut cell = cell.lock().unwrap_or_else(|e| e.into_inner());
                cell.take()
            };
            let Some(source) = taken else {
                stage.sink.error(StreamError::InvalidSource);
                return;
            };
            let Ok(handle) = Handle::try_current() else {
                stage.sink.error(StreamError::Custom(
                    "from_futures requires a Tokio runtime".into(),
                ));
                return;
            };
            let core = Arc::clone(&stage.core);
            let emitter = Emitter::new(stage);
            let driver = handle.spawn(async move {
                pin_mut!(source);
                while let Some(item) = source.next().await {
                    if !emitter.emit(item) {
                        return;
                    }
                }
                emitter.complete();
            });
            core.on_release(Box::new(move || driver.abort()));
        })
    }

    /// Adapt this stream into a pull-based `futures` stream of
    /// `StreamResult` items.
    ///
    /// The subscription lives as long as the returned stream; dropping
    /// the stream cancels it. An error ends the stream after yielding
    /// `Err`; completion ends it silently.
    pub fn into_futures_stream(
        self,
    ) -> impl futures_core::Stream<Item = StreamResult<T>> + Send + 'static {
        let (tx, mut rx) = mpsc::unbounded::<BridgeEvent<T>>();
        let value_tx = tx.clone();
        let error_tx = tx.clone();
        let complete_tx = tx;
        let subscription = self.subscribe(
            InlineScheduler::shared(),
            move |value| {
                let _ = value_tx.unbounded_send(BridgeEvent::Value(value));
            },
            move |error| {
                let _ = error_tx.unbounded_send(BridgeEvent::Error(error));
            },
            move || {
                let _ = complete_tx.unbounded_send(BridgeEvent::Complete);
            },
        );
        stream! {
            // Held so that dropping the stream cancels the subscription
            let _subscription = subscription;
            while let Some(event) = rx.next().await {
                match event {
                    BridgeEvent::Value(value) => yield Ok(value),
                    BridgeEvent::Error(error) => {
                        yield Err(error);
                        break;
                    }
                    BridgeEvent::Complete => break,
                }
            }
        }
    }
}
