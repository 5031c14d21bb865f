use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tentacle_streams::{Emitter, ManualScheduler, Stream, StreamError};

const WINDOW: Duration = Duration::from_millis(100);

struct DebounceHarness {
    scheduler: Arc<ManualScheduler>,
    emitter: Emitter<i32>,
    values: Arc<Mutex<Vec<i32>>>,
    errors: Arc<Mutex<Vec<StreamError>>>,
    completions: Arc<AtomicUsize>,
}

fn debounce_harness() -> DebounceHarness {
    let scheduler = ManualScheduler::new();
    let emitter_cell: Arc<Mutex<Option<Emitter<i32>>>> = Arc::new(Mutex::new(None));
    let captured = emitter_cell.clone();
    let source = Stream::source(move |emitter| {
        *captured.lock().unwrap() = Some(emitter);
    });

    let values = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let completions = Arc::new(AtomicUsize::new(0));
    let values_sink = values.clone();
    let errors_sink = errors.clone();
    let completions_sink = completions.clone();
    source
        .debounce(WINDOW)
        .subscribe(
            scheduler.clone(),
            move |value| values_sink.lock().unwrap().push(value),
            move |error| errors_sink.lock().unwrap().push(error),
            move || {
                completions_sink.fetch_add(1, Ordering::SeqCst);
            },
        )
        .detach();

    let emitter = emitter_cell.lock().unwrap().clone().expect("source attached");
    DebounceHarness {
        scheduler,
        emitter,
        values,
        errors,
        completions,
    }
}

#[test]
fn debounce_delivers_only_the_newest_value_in_the_window() {
    let harness = debounce_harness();

    // Values at t=0, t=30 and t=60; the window is 100ms
    harness.emitter.emit(1);
    harness.scheduler.advance(Duration::from_millis(30));
    harness.emitter.emit(2);
    harness.scheduler.advance(Duration::from_millis(30));
    harness.emitter.emit(3);

    assert!(harness.values.lock().unwrap().is_empty());

    // t=160: the t=60 value has been quiet for a full window
    harness.scheduler.advance(Duration::from_millis(100));
    assert_eq!(*harness.values.lock().unwrap(), vec![3]);

    // A value at t=200 is delivered at t=300
    harness.scheduler.advance(Duration::from_millis(40));
    harness.emitter.emit(4);
    harness.scheduler.advance(Duration::from_millis(100));
    assert_eq!(*harness.values.lock().unwrap(), vec![3, 4]);
}

#[test]
fn debounce_flushes_the_pending_value_on_completion() {
    let harness = debounce_harness();

    harness.emitter.emit(9);
    harness.scheduler.advance(Duration::from_millis(10));
    harness.emitter.complete();
    harness.scheduler.run_until_idle();

    assert_eq!(*harness.values.lock().unwrap(), vec![9]);
    assert_eq!(harness.completions.load(Ordering::SeqCst), 1);

    // The superseded timer must stay silent
    harness.scheduler.advance(Duration::from_millis(200));
    assert_eq!(*harness.values.lock().unwrap(), vec![9]);
}

#[test]
fn debounce_drops_the_pending_value_on_error() {
    let harness = debounce_harness();

    harness.emitter.emit(9);
    harness.emitter.fail(StreamError::Upstream("producer died".into()));
    harness.scheduler.run_until_idle();

    assert!(harness.values.lock().unwrap().is_empty());
    assert_eq!(
        *harness.errors.lock().unwrap(),
        vec![StreamError::Upstream("producer died".into())]
    );

    harness.scheduler.advance(Duration::from_millis(200));
    assert!(harness.values.lock().unwrap().is_empty());
}

#[test]
fn emit_after_fires_on_the_virtual_clock() {
    let scheduler = ManualScheduler::new();
    let values = Arc::new(Mutex::new(Vec::new()));
    let completions = Arc::new(AtomicUsize::new(0));
    let values_sink = values.clone();
    let completions_sink = completions.clone();
    Stream::emit_after(42, Duration::from_millis(50))
        .subscribe(
            scheduler.clone(),
            move |value| values_sink.lock().unwrap().push(value),
            |_| {},
            move || {
                completions_sink.fetch_add(1, Ordering::SeqCst);
            },
        )
        .detach();

    scheduler.advance(Duration::from_millis(49));
    assert!(values.lock().unwrap().is_empty());

    scheduler.advance(Duration::from_millis(1));
    assert_eq!(*values.lock().unwrap(), vec![42]);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[test]
fn cancelled_subscription_silences_pending_debounce_timer() {
    let scheduler = ManualScheduler::new();
    let emitter_cell: Arc<Mutex<Option<Emitter<i32>>>> = Arc::new(Mutex::new(None));
    let captured = emitter_cell.clone();
    let values = Arc::new(Mutex::new(Vec::new()));
    let values_sink = values.clone();
    let subscription = Stream::source(move |emitter| {
        *captured.lock().unwrap() = Some(emitter);
    })
    .debounce(WINDOW)
    .subscribe_values(scheduler.clone(), move |value| {
        values_sink.lock().unwrap().push(value)
    });

    let emitter = emitter_cell.lock().unwrap().clone().expect("source attached");
    emitter.emit(1);
    subscription.cancel();
    scheduler.advance(Duration::from_millis(200));

    assert!(values.lock().unwrap().is_empty());
}
