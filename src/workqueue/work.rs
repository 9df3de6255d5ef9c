use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;

use kspin::SpinNoIrq;

use super::gate::{ExecGate, GateState};
use super::queue::{WorkEvent, WorkQueue};

static TOKEN: AtomicUsize = AtomicUsize::new(1);

type WorkFn = Box<dyn Fn() + Send + Sync + 'static>;

/// State shared between a [`DelayedWork`] handle and its queued instances.
pub(super) struct WorkInner {
    pub(super) token: usize,
    body: WorkFn,
    gate: ExecGate,
    /// Generation of the pending instance, 0 when none is pending.
    pending: AtomicU64,
    next_generation: AtomicU64,
    /// Set by [`DelayedWork::kick`], consumed by the queue.
    kicked: AtomicBool,
    /// Serializes cancel-then-schedule. Taken with local interrupts off.
    lock: SpinNoIrq<()>,
}

impl WorkInner {
    /// Runs the body for the instance of `generation`, unless the gate is shut.
    pub(super) fn fire(&self, generation: u64) {
        let _ = self
            .pending
            .compare_exchange(generation, 0, Ordering::AcqRel, Ordering::Acquire);
        self.run();
    }

    /// Consumes a kick, dropping the delayed instance it replaces.
    pub(super) fn take_kick(&self, queue: &WorkQueue) -> bool {
        let _guard = self.lock.lock();
        if !self.kicked.swap(false, Ordering::AcqRel) {
            return false;
        }
        queue.cancel(self.token);
        self.pending.store(0, Ordering::Release);
        true
    }

    pub(super) fn run(&self) {
        if !self.gate.try_enter() {
            trace!("work {} fired while {:?}, skipped", self.token, self.gate.state());
            return;
        }
        (self.body)();
        self.gate.exit();
    }
}

/// A single delayed work item bound to one body.
///
/// At most one instance is pending at any time: [`DelayedWork::schedule`]
/// cancels the pending instance and queues a new one under an IRQ-safe
/// spinlock, so the delay always counts from the most recent call.
///
/// [`DelayedWork::kick`] is the lock-free variant for interrupt context.
pub struct DelayedWork {
    inner: Arc<WorkInner>,
    queue: Arc<WorkQueue>,
}

impl DelayedWork {
    /// Creates an idle work item running `body` on `queue`.
    pub fn new<F>(queue: Arc<WorkQueue>, body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(WorkInner {
            token: TOKEN.fetch_add(1, Ordering::Relaxed),
            body: Box::new(body),
            gate: ExecGate::new(),
            pending: AtomicU64::new(0),
            next_generation: AtomicU64::new(1),
            kicked: AtomicBool::new(false),
            lock: SpinNoIrq::new(()),
        });
        queue.attach(&inner);
        Self { inner, queue }
    }

    /// Cancels any pending instance and queues a new one `delay` from now.
    ///
    /// Returns `false` without queueing if the item is being cancelled or
    /// has been disabled.
    pub fn schedule(&self, delay: Duration) -> bool {
        let _guard = self.inner.lock.lock();
        if !self.inner.gate.is_enabled() {
            debug!("work {} not scheduled: {:?}", self.inner.token, self.inner.gate.state());
            return false;
        }

        self.queue.cancel(self.inner.token);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        self.inner.pending.store(generation, Ordering::Release);
        self.queue.enqueue(
            delay,
            WorkEvent {
                token: self.inner.token,
                generation,
                work: Arc::clone(&self.inner),
            },
        );
        true
    }

    /// Requests a run on the next poll of the queue.
    ///
    /// Touches only atomics, so it never waits and may be called from
    /// interrupt context, even while this CPU holds a queue or item lock.
    /// The queue drops the pending delayed instance when it picks the kick
    /// up; a later [`DelayedWork::schedule`] does not withdraw the kick.
    ///
    /// Returns `false` if the item is being cancelled or has been disabled.
    pub fn kick(&self) -> bool {
        if !self.inner.gate.is_enabled() {
            return false;
        }
        self.inner.kicked.store(true, Ordering::Release);
        self.queue.raise_kick();
        true
    }

    /// Drops the pending instance, if any, without waiting for a running one.
    ///
    /// Returns `true` if an instance was pending.
    pub fn cancel(&self) -> bool {
        let _guard = self.inner.lock.lock();
        self.drop_pending()
    }

    /// Drops the pending instance and waits for a running one to finish.
    ///
    /// Schedules issued meanwhile, including by the body itself, are refused.
    /// The item is usable again afterwards, unless it was disabled in the
    /// meantime. Must not be called from the body.
    ///
    /// Returns `true` if an instance was pending.
    pub fn cancel_sync(&self) -> bool {
        let (drained, was_pending) = {
            let _guard = self.inner.lock.lock();
            (self.inner.gate.begin_drain(), self.drop_pending())
        };
        self.inner.gate.wait_idle();
        // Only the canceller that started the drain ends it.
        if drained {
            self.inner.gate.reenable();
        }
        was_pending
    }

    /// Like [`DelayedWork::cancel_sync`], but the item stays disabled:
    /// it never runs or queues again.
    pub fn disable_sync(&self) -> bool {
        let was_pending = {
            let _guard = self.inner.lock.lock();
            self.inner.gate.disable();
            self.drop_pending()
        };
        self.inner.gate.wait_idle();
        was_pending
    }

    /// Returns `true` if an instance is queued or kicked and not yet run.
    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire) != 0 || self.inner.kicked.load(Ordering::Acquire)
    }

    /// Returns `true` if the body is running right now.
    pub fn is_running(&self) -> bool {
        self.inner.gate.running() > 0
    }

    /// Scheduling state of the item.
    pub fn state(&self) -> GateState {
        self.inner.gate.state()
    }

    fn drop_pending(&self) -> bool {
        self.queue.cancel(self.inner.token);
        let kicked = self.inner.kicked.swap(false, Ordering::AcqRel);
        self.inner.pending.swap(0, Ordering::AcqRel) != 0 || kicked
    }
}

impl Drop for DelayedWork {
    fn drop(&mut self) {
        self.queue.cancel(self.inner.token);
        self.queue.detach(self.inner.token);
    }
}

impl core::fmt::Debug for DelayedWork {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DelayedWork")
            .field("token", &self.inner.token)
            .field("pending", &self.is_pending())
            .field("gate", &self.inner.gate)
            .finish()
    }
}
