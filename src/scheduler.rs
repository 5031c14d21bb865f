//! Schedulers decide where and in what order deliveries run
//!
//! Every delivery for a subscription is funneled through one `Scheduler`
//! instance, which guarantees FIFO execution relative to other closures
//! scheduled on the same instance. Timers also live here: `schedule_after`
//! is what `debounce` and `emit_after` build on, which is why a virtual
//! clock scheduler makes them fully deterministic in tests.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::{StreamError, StreamResult};

/// A unit of work handed to a scheduler
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An execution context for delivery closures.
///
/// Closures scheduled on the same instance run in submission order. No
/// ordering is promised across different instances. A scheduler whose
/// target context has been torn down drops tasks silently instead of
/// running them on a dead context.
pub trait Scheduler: Send + Sync + 'static {
    /// Enqueue or immediately run `task` according to this scheduler's policy
    fn schedule(&self, task: Task);

    /// Run `task` after `delay` on this scheduler's clock
    fn schedule_after(&self, delay: Duration, task: Task);
}

// ================================
// Inline scheduler
// ================================

/// Runs tasks synchronously on the calling thread.
///
/// This is the default for subscriptions that want delivery on whatever
/// thread the producer emits from. Delayed tasks hop onto the ambient
/// Tokio runtime; without one they are dropped.
pub struct InlineScheduler;

lazy_static::lazy_static! {
    static ref SHARED_INLINE: Arc<InlineScheduler> = Arc::new(InlineScheduler);
}

impl InlineScheduler {
    /// Process-wide shared instance
    pub fn shared() -> Arc<dyn Scheduler> {
        SHARED_INLINE.clone()
    }
}

impl Scheduler for InlineScheduler {
    fn schedule(&self, task: Task) {
        task();
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    task();
                });
            }
            Err(_) => {
                log::debug!("inline scheduler: no runtime for delayed task, dropping it");
            }
        }
    }
}

// ================================
// Worker scheduler
// ================================

/// A background context: a FIFO queue drained by a single Tokio task.
///
/// Because one task drains the queue, closures run strictly in submission
/// order and never concurrently with each other. After `shutdown` the
/// queue is gone and newly scheduled tasks are dropped.
pub struct WorkerScheduler {
    tx: mpsc::UnboundedSender<Task>,
    handle: Handle,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl WorkerScheduler {
    /// Spawn the drain task on the current Tokio runtime.
    ///
    /// Fails with `SchedulerUnavailable` when called outside a runtime.
    pub fn spawn() -> StreamResult<Arc<Self>> {
        let handle = Handle::try_current().map_err(|_| StreamError::SchedulerUnavailable)?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let worker = handle.spawn(async move {
            while let Some(task) = rx.recv().await {
                task();
            }
        });
        Ok(Arc::new(Self {
            tx,
            handle,
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// Tear down the drain task. Undelivered and future tasks are dropped.
    pub fn shutdown(&self) {
        let worker = {
            let mut guard = self.worker.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(worker) = worker {
            worker.abort();
            log::debug!("worker scheduler shut down");
        }
    }

    /// Whether the drain task has been shut down
    pub fn is_shut_down(&self) -> bool {
        let guard = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        guard.is_none()
    }
}

impl Scheduler for WorkerScheduler {
    fn schedule(&self, task: Task) {
        if self.is_shut_down() || self.tx.send(task).is_err() {
            log::debug!("worker scheduler target is gone, dropping delivery");
        }
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        let tx = self.tx.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(task).is_err() {
                log::debug!("worker scheduler target is gone, dropping delayed delivery");
            }
        });
    }
}

// ================================
// Manual scheduler
// ================================

struct TimerEntry {
    deadline: Duration,
    seq: u64,
    task: Task,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed so the BinaryHeap pops the earliest deadline first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then(other.seq.cmp(&self.seq))
    }
}

struct ManualQueue {
    now: Duration,
    seq: u64,
    ready: VecDeque<Task>,
    timers: BinaryHeap<TimerEntry>,
}

/// An explicitly pumped queue with a virtual clock.
///
/// Nothing runs until the owner calls `run_until_idle` or `advance`, which
/// makes this both the main-thread integration point (pump once per frame)
/// and the deterministic scheduler for timing-sensitive tests.
pub struct ManualScheduler {
    queue: Mutex<ManualQueue>,
    closed: AtomicBool,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(ManualQueue {
                now: Duration::ZERO,
                seq: 0,
                ready: VecDeque::new(),
                timers: BinaryHeap::new(),
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Run queued tasks until the immediate queue is empty.
    ///
    /// Tasks scheduled by a running task are picked up in the same pump.
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = {
                let mut queue = self.lock_queue();
                queue.ready.pop_front()
            };
            // Run outside the lock so the task can schedule more work
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Move the virtual clock forward by `by`, firing due timers in
    /// deadline order. Tasks released by each timer run before later
    /// timers fire. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = {
            let queue = self.lock_queue();
            queue.now + by
        };
        let mut ran = 0;
        loop {
            ran += self.run_until_idle();
            let task = {
                let mut queue = self.lock_queue();
                let due = queue
                    .timers
                    .peek()
                    .map(|entry| entry.deadline <= target)
                    .unwrap_or(false);
                match queue.timers.pop() {
                    Some(entry) if due => {
                        queue.now = queue.now.max(entry.deadline);
                        Some(entry.task)
                    }
                    Some(entry) => {
                        queue.timers.push(entry);
                        queue.now = target;
                        None
                    }
                    None => {
                        queue.now = target;
                        None
                    }
                }
            };
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        ran += self.run_until_idle();
        ran
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.lock_queue().now
    }

    /// Number of tasks waiting in the immediate queue
    pub fn pending(&self) -> usize {
        self.lock_queue().ready.len()
    }

    /// Tear down the context. Queued and future tasks are dropped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut queue = self.lock_queue();
        queue.ready.clear();
        queue.timers.clear();
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, ManualQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task) {
        if self.closed.load(Ordering::Acquire) {
            log::debug!("manual scheduler is closed, dropping delivery");
            return;
        }
        self.lock_queue().ready.push_back(task);
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        if self.closed.load(Ordering::Acquire) {
            log::debug!("manual scheduler is closed, dropping delayed delivery");
            return;
        }
        let mut queue = self.lock_queue();
        let deadline = queue.now + delay;
        queue.seq += 1;
        let seq = queue.seq;
        queue.timers.push(TimerEntry {
            deadline,
            seq,
            task,
        });
    }
}
