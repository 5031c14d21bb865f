use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tentacle_streams::{
    InlineScheduler, ManualScheduler, Scheduler, Stream, StreamError, WorkerScheduler,
};
use tokio::sync::oneshot;

#[test]
fn inline_scheduler_runs_immediately() {
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_task = ran.clone();
    InlineScheduler::shared().schedule(Box::new(move || {
        ran_task.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn manual_scheduler_runs_nothing_until_pumped() {
    let scheduler = ManualScheduler::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..5 {
        let order_task = order.clone();
        scheduler.schedule(Box::new(move || order_task.lock().unwrap().push(i)));
    }
    assert!(order.lock().unwrap().is_empty());
    assert_eq!(scheduler.pending(), 5);

    scheduler.run_until_idle();
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn manual_scheduler_tasks_can_schedule_more_work() {
    let scheduler = ManualScheduler::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let order_outer = order.clone();
    let scheduler_inner = scheduler.clone();
    scheduler.schedule(Box::new(move || {
        order_outer.lock().unwrap().push("outer");
        let order_inner = order_outer.clone();
        scheduler_inner.schedule(Box::new(move || {
            order_inner.lock().unwrap().push("inner");
        }));
    }));

    let ran = scheduler.run_until_idle();
    assert_eq!(ran, 2);
    assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
}

#[test]
fn manual_scheduler_fires_timers_in_deadline_order() {
    let scheduler = ManualScheduler::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for (delay_ms, label) in [(30u64, "late"), (10, "early"), (20, "middle")] {
        let order_task = order.clone();
        scheduler.schedule_after(
            Duration::from_millis(delay_ms),
            Box::new(move || order_task.lock().unwrap().push(label)),
        );
    }

    scheduler.advance(Duration::from_millis(15));
    assert_eq!(*order.lock().unwrap(), vec!["early"]);
    assert_eq!(scheduler.now(), Duration::from_millis(15));

    scheduler.advance(Duration::from_millis(15));
    assert_eq!(*order.lock().unwrap(), vec!["early", "middle", "late"]);
}

#[test]
fn closed_manual_scheduler_drops_tasks() {
    let scheduler = ManualScheduler::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_before = ran.clone();
    scheduler.schedule(Box::new(move || {
        ran_before.fetch_add(1, Ordering::SeqCst);
    }));

    scheduler.close();

    let ran_after = ran.clone();
    scheduler.schedule(Box::new(move || {
        ran_after.fetch_add(1, Ordering::SeqCst);
    }));
    scheduler.run_until_idle();
    scheduler.advance(Duration::from_millis(100));

    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn worker_scheduler_preserves_submission_order() {
    let scheduler = WorkerScheduler::spawn().expect("runtime available");
    let order = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = oneshot::channel();

    for i in 0..100 {
        let order_task = order.clone();
        scheduler.schedule(Box::new(move || order_task.lock().unwrap().push(i)));
    }
    scheduler.schedule(Box::new(move || {
        let _ = done_tx.send(());
    }));

    done_rx.await.expect("drain task alive");
    let order = order.lock().unwrap();
    assert_eq!(*order, (0..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn shut_down_worker_drops_tasks() {
    let scheduler = WorkerScheduler::spawn().expect("runtime available");
    scheduler.shutdown();
    assert!(scheduler.is_shut_down());

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_task = ran.clone();
    scheduler.schedule(Box::new(move || {
        ran_task.fetch_add(1, Ordering::SeqCst);
    }));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn worker_scheduler_needs_a_runtime() {
    assert_eq!(
        WorkerScheduler::spawn().err(),
        Some(StreamError::SchedulerUnavailable)
    );
}

#[tokio::test]
async fn cross_thread_emission_delivers_on_the_worker() {
    let scheduler = WorkerScheduler::spawn().expect("runtime available");
    let values = Arc::new(Mutex::new(Vec::new()));
    let values_sink = values.clone();
    let (done_tx, done_rx) = oneshot::channel();
    let done_tx = Arc::new(Mutex::new(Some(done_tx)));

    let subscription = Stream::source(|emitter| {
        std::thread::spawn(move || {
            for i in 0..50 {
                if !emitter.emit(i) {
                    return;
                }
            }
            emitter.complete();
        });
    })
    .subscribe(
        scheduler.clone(),
        move |value: i32| values_sink.lock().unwrap().push(value),
        |_| {},
        move || {
            if let Some(tx) = done_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        },
    );

    done_rx.await.expect("completion delivered");
    assert_eq!(*values.lock().unwrap(), (0..50).collect::<Vec<_>>());
    drop(subscription);
}

#[test]
fn deliver_on_reroutes_upstream_stages() {
    let producer_side = ManualScheduler::new();
    let consumer_side = ManualScheduler::new();
    let values = Arc::new(Mutex::new(Vec::new()));
    let values_sink = values.clone();

    Stream::from_iter(vec![1, 2, 3])
        .deliver_on(producer_side.clone())
        .map(|n| n * 10)
        .subscribe_values(consumer_side.clone(), move |value| {
            values_sink.lock().unwrap().push(value)
        })
        .detach();

    // Nothing moves until the hop's queue is pumped
    assert!(values.lock().unwrap().is_empty());
    producer_side.run_until_idle();
    assert!(values.lock().unwrap().is_empty());

    consumer_side.run_until_idle();
    assert_eq!(*values.lock().unwrap(), vec![10, 20, 30]);
}
