//! Subscription lifecycle and cancellation
//!
//! One `Subscription` represents one consumer attached to one stream. The
//! whole operator chain built for that consumer shares a single
//! [`SubscriptionCore`]: cancelling it, or delivering a terminal signal,
//! runs every release hook registered along the chain, which is how
//! producers, timers and sibling inputs get torn down in one step.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

const ACTIVE: u8 = 0;
const CANCELLED: u8 = 1;
const COMPLETED: u8 = 2;
const FAILED: u8 = 3;

/// Lifecycle state of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Deliveries may still reach the consumer
    Active,
    /// The consumer cancelled; nothing is delivered anymore
    Cancelled,
    /// The stream completed normally
    Completed,
    /// The stream terminated with an error
    Failed,
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Shared lifecycle state of one subscription's operator chain.
///
/// The state moves out of `Active` exactly once. Release hooks registered
/// while active run when that single transition happens; hooks registered
/// afterwards run immediately on the caller's thread.
pub(crate) struct SubscriptionCore {
    id: Uuid,
    state: AtomicU8,
    releases: Mutex<Vec<ReleaseHook>>,
}

impl SubscriptionCore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            state: AtomicU8::new(ACTIVE),
            releases: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn is_live(&self) -> bool {
        self.state.load(Ordering::Acquire) == ACTIVE
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        match self.state.load(Ordering::Acquire) {
            CANCELLED => SubscriptionState::Cancelled,
            COMPLETED => SubscriptionState::Completed,
            FAILED => SubscriptionState::Failed,
            _ => SubscriptionState::Active,
        }
    }

    /// Register cleanup to run when this subscription leaves `Active`.
    ///
    /// The state is re-checked under the hook lock so a hook can never be
    /// stranded by a concurrent transition.
    pub(crate) fn on_release(&self, hook: ReleaseHook) {
        {
            let mut releases = self.releases.lock().unwrap_or_else(|e| e.into_inner());
            if self.is_live() {
                releases.push(hook);
                return;
            }
        }
        hook();
    }

    pub(crate) fn cancel(&self) -> bool {
        let cancelled = self.transition(CANCELLED);
        if cancelled {
            log::debug!("subscription {} cancelled", self.id);
        }
        cancelled
    }

    pub(crate) fn complete(&self) -> bool {
        self.transition(COMPLETED)
    }

    pub(crate) fn fail(&self) -> bool {
        self.transition(FAILED)
    }

    fn transition(&self, to: u8) -> bool {
        if self
            .state
            .compare_exchange(ACTIVE, to, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let hooks = {
            let mut releases = self.releases.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *releases)
        };
        for hook in hooks {
            hook();
        }
        true
    }
}

/// A live handle representing one consumer's attachment to a stream.
///
/// Dropping the handle cancels the subscription; call [`Subscription::detach`]
/// to keep it running without holding the handle.
pub struct Subscription {
    core: Arc<SubscriptionCore>,
    cancel_on_drop: bool,
}

impl Subscription {
    pub(crate) fn new(core: Arc<SubscriptionCore>) -> Self {
        Self {
            core,
            cancel_on_drop: true,
        }
    }

    /// Unique id of this subscription
    pub fn id(&self) -> Uuid {
        self.core.id()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SubscriptionState {
        self.core.state()
    }

    /// Whether deliveries may still reach the consumer
    pub fn is_active(&self) -> bool {
        self.core.is_live()
    }

    /// Stop all further delivery to the consumer.
    ///
    /// Upstream producers and timers created for this subscription are
    /// released, and already-scheduled deliveries become no-ops when they
    /// run. Cancelling twice has no further effect.
    pub fn cancel(&self) {
        self.core.cancel();
    }

    /// Register cleanup to run when the subscription ends for any reason
    /// (cancellation, completion or failure). Runs immediately if the
    /// subscription has already ended.
    pub fn on_release<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.on_release(Box::new(hook));
    }

    /// Let the subscription keep running after the handle is dropped.
    ///
    /// The stream then stays attached until it completes or fails on its
    /// own; there is no way to cancel it afterwards.
    pub fn detach(mut self) {
        self.cancel_on_drop = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.cancel_on_drop {
            self.core.cancel();
        }
    }
}
