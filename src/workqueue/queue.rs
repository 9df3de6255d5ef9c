use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use kspin::SpinNoIrq;
use timer_list::{TimeValue, TimerEvent, TimerList};

use super::work::WorkInner;

/// Monotonic time source driving the work queue.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> TimeValue;
}

/// One scheduled instance of a delayed work item.
pub(super) struct WorkEvent {
    pub(super) token: usize,
    pub(super) generation: u64,
    pub(super) work: Arc<WorkInner>,
}

impl TimerEvent for WorkEvent {
    fn callback(self, _now: TimeValue) {
        self.work.fire(self.generation)
    }
}

/// Deadline-ordered queue of delayed work instances.
///
/// The host drives it: it calls [`WorkQueue::run_expired`] from its worker
/// context whenever the deadline reported by [`WorkQueue::next_deadline`]
/// has passed.
///
/// Kicked items ([`super::DelayedWork::kick`]) run first on each poll, ahead
/// of timed instances.
pub struct WorkQueue {
    timer_list: SpinNoIrq<TimerList<WorkEvent>>,
    works: SpinNoIrq<BTreeMap<usize, Weak<WorkInner>>>,
    kicked: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl WorkQueue {
    /// Constructs an empty queue reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            timer_list: SpinNoIrq::new(TimerList::new()),
            works: SpinNoIrq::new(BTreeMap::new()),
            kicked: AtomicBool::new(false),
            clock,
        }
    }

    pub(super) fn attach(&self, work: &Arc<WorkInner>) {
        self.works.lock().insert(work.token, Arc::downgrade(work));
    }

    pub(super) fn detach(&self, token: usize) {
        self.works.lock().remove(&token);
    }

    pub(super) fn raise_kick(&self) {
        self.kicked.store(true, Ordering::Release);
    }

    /// Current time according to the queue's clock.
    pub fn now(&self) -> TimeValue {
        self.clock.now()
    }

    /// Queues `event` to fire `delay` from now. Deadlines past the end of
    /// time are clamped to [`Duration::MAX`].
    pub(super) fn enqueue(&self, delay: Duration, event: WorkEvent) {
        let deadline = self.clock.now().saturating_add(delay);
        trace!("queue work {} gen {} at {:?}", event.token, event.generation, deadline);
        self.timer_list.lock().set(deadline, event);
    }

    /// Drops every queued instance of the work item identified by `token`.
    pub(super) fn cancel(&self, token: usize) {
        self.timer_list.lock().cancel(|event| event.token == token);
    }

    /// Deadline of the earliest queued instance; the current time while a
    /// kick is outstanding.
    pub fn next_deadline(&self) -> Option<TimeValue> {
        if self.kicked.load(Ordering::Acquire) {
            return Some(self.clock.now());
        }
        self.timer_list.lock().next_deadline()
    }

    /// Returns `true` if nothing is queued or kicked.
    pub fn is_empty(&self) -> bool {
        !self.kicked.load(Ordering::Acquire) && self.timer_list.lock().is_empty()
    }

    /// Runs the outstanding kicks, or else the earliest instance if it is due.
    ///
    /// # Returns
    /// `true` if anything was run.
    pub fn check_event(&self) -> bool {
        if self.run_kicks() > 0 {
            return true;
        }
        let now = self.clock.now();
        let expired = self.timer_list.lock().expire_one(now);
        if let Some((_deadline, event)) = expired {
            trace!("run work {} due at {:?}", event.token, _deadline);
            event.callback(now);
            true
        } else {
            false
        }
    }

    /// Runs the outstanding kicks, then every instance due at the time of
    /// the call.
    ///
    /// Instances are taken off the list before any of them runs, so work
    /// rescheduled or kicked by a running body waits for the next call even
    /// with a zero delay. No queue lock is held while bodies run.
    ///
    /// # Returns
    /// The number of instances run.
    pub fn run_expired(&self) -> usize {
        let kicked = self.run_kicks();
        let now = self.clock.now();
        let expired: Vec<_> = {
            let mut timer_list = self.timer_list.lock();
            core::iter::from_fn(|| timer_list.expire_one(now)).collect()
        };

        let count = expired.len();
        for (_deadline, event) in expired {
            trace!("run work {} due at {:?}", event.token, _deadline);
            event.callback(now);
        }
        kicked + count
    }

    fn run_kicks(&self) -> usize {
        if !self.kicked.swap(false, Ordering::AcqRel) {
            return 0;
        }
        let works: Vec<Arc<WorkInner>> = self.works.lock().values().filter_map(Weak::upgrade).collect();

        let mut count = 0;
        for work in works.iter().filter(|work| work.take_kick(self)) {
            trace!("run kicked work {}", work.token);
            work.run();
            count += 1;
        }
        count
    }
}

impl core::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}
